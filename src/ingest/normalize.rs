use anyhow::{anyhow, Result};

/// Interleaved pixel layouts accepted at the ingest boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Gray8,
    Rgb24,
    Rgba32,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(Self::Gray8),
            3 => Some(Self::Rgb24),
            4 => Some(Self::Rgba32),
            _ => None,
        }
    }

    fn expected_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            Self::Gray8 => Some(pixels),
            Self::Rgb24 => pixels.checked_mul(3),
            Self::Rgba32 => pixels.checked_mul(4),
            Self::Nv12 => pixels.checked_add(pixels / 2),
        }
    }
}

/// Check a raw buffer against its declared dimensions.
pub(crate) fn validate_len(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> std::result::Result<(), String> {
    // Chroma is subsampled 2x2.
    if format == PixelFormat::Nv12 && (width % 2 != 0 || height % 2 != 0) {
        return Err(format!(
            "Nv12 frames need even dimensions, got {}x{}",
            width, height
        ));
    }
    let expected = format
        .expected_len(width, height)
        .ok_or_else(|| format!("{:?} frame dimensions overflow", format))?;
    if pixels.len() != expected {
        return Err(format!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    validate_len(pixels, width, height, format).map_err(|e| anyhow!(e))?;
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Gray8 => Ok(pixels.iter().flat_map(|&p| [p, p, p]).collect()),
        PixelFormat::Rgba32 => Ok(pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width, height)),
    }
}

/// BT.601 luminance, one value per pixel. `pixels` must already be validated.
pub(crate) fn luma_plane(pixels: &[u8], format: PixelFormat) -> Vec<f32> {
    match format {
        PixelFormat::Gray8 => pixels.iter().map(|&p| p as f32).collect(),
        PixelFormat::Rgb24 => pixels.chunks_exact(3).map(luma_of).collect(),
        PixelFormat::Rgba32 => pixels.chunks_exact(4).map(luma_of).collect(),
        // Y plane comes first.
        PixelFormat::Nv12 => {
            let y_len = pixels.len() * 2 / 3;
            pixels[..y_len].iter().map(|&p| p as f32).collect()
        }
    }
}

fn luma_of(px: &[u8]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn nv12_odd_dimensions_are_rejected() {
        assert!(validate_len(&[0u8; 4], 3, 1, PixelFormat::Nv12).is_err());
        assert!(normalize_to_rgb(&[0u8; 13], 3, 3, PixelFormat::Nv12).is_err());
    }

    #[test]
    fn rgb_length_is_validated() {
        assert!(normalize_to_rgb(&[1u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert!(validate_len(&[1u8; 9], 1, 3, PixelFormat::Rgb24).is_ok());
    }

    #[test]
    fn rgba_drops_alpha() -> Result<()> {
        let rgb = normalize_to_rgb(&[10, 20, 30, 255], 1, 1, PixelFormat::Rgba32)?;
        assert_eq!(rgb, vec![10, 20, 30]);
        Ok(())
    }

    #[test]
    fn luma_weights_sum_to_one() {
        let luma = luma_plane(&[200, 200, 200, 0, 0, 0], PixelFormat::Rgb24);
        assert!((luma[0] - 200.0).abs() < 0.01);
        assert_eq!(luma[1], 0.0);
    }
}
