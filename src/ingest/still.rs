//! Still image source.
//!
//! A single uploaded image is treated as a one-frame sequence. Decoding goes
//! through the `image` crate and always yields RGB24.

use anyhow::{Context, Result};
use image::GenericImageView;
use std::path::Path;
use std::time::Duration;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;
use crate::PipelineError;

pub struct ImageSource {
    location: String,
    bytes: Vec<u8>,
    emitted: bool,
}

impl ImageSource {
    /// Source over raw encoded bytes (e.g. an upload body).
    pub fn from_bytes(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            location: label.into(),
            bytes,
            emitted: false,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))
            .map_err(|e| PipelineError::decode(format!("{:#}", e)))?;
        Ok(Self::from_bytes(path.display().to_string(), bytes))
    }
}

impl FrameSource for ImageSource {
    fn name(&self) -> &str {
        "image"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("ImageSource: loaded {} ({} bytes)", self.location, self.bytes.len());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        let (pixels, width, height) = decode_image(&self.bytes).map_err(|e| PipelineError::Decode {
            frame_index: Some(0),
            reason: format!("{}: {:#}", self.location, e),
        })?;
        // Pixels are no longer needed once decoded.
        self.bytes = Vec::new();
        Frame::new(0, Duration::ZERO, width, height, 3, pixels).map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_produced: u64::from(self.emitted),
            location: self.location.clone(),
        }
    }
}

fn decode_image(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = image::load_from_memory(bytes).context("decode image")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([40, 80, 120]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn still_image_is_a_one_frame_sequence() {
        let mut source = ImageSource::from_bytes("upload.png", png_bytes(6, 4));
        source.connect().unwrap();

        let frame = source.next_frame().unwrap().expect("one frame");
        assert_eq!(frame.index(), 0);
        assert_eq!((frame.width(), frame.height(), frame.channels()), (6, 4, 3));
        assert_eq!(&frame.pixels()[..3], &[40, 80, 120]);

        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_produced, 1);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let mut source = ImageSource::from_bytes("broken.jpg", b"not an image".to_vec());
        let err = source.next_frame().unwrap_err();
        assert!(matches!(
            crate::pipeline_error(&err),
            Some(PipelineError::Decode { .. })
        ));
    }
}
