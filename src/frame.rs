//! Frame and mask containers.
//!
//! - `Frame`: immutable raster with sequence index and timestamp. Pixel bytes
//!   are shared (`Arc<[u8]>`) so handing a frame between the ingest thread and
//!   the orchestrator never copies pixel data.
//! - `ForegroundMask`: binary per-pixel classification of one frame.
//! - `ReorderBuffer`: restores frame-index order before frames reach the
//!   tracker.

use anyhow::Result;
use image::GrayImage;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::normalize::{self, PixelFormat};
use crate::PipelineError;

/// Mask value for a foreground pixel.
pub const FOREGROUND: u8 = 255;
/// Mask value for a background pixel.
pub const BACKGROUND: u8 = 0;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Frame {
    index: u64,
    timestamp: Duration,
    width: u32,
    height: u32,
    channels: u8,
    data: Arc<[u8]>,
}

impl Frame {
    /// Build a frame from interleaved 8-bit pixels (1, 3 or 4 channels).
    ///
    /// Buffer/dimension mismatches are decode errors.
    pub fn new(
        index: u64,
        timestamp: Duration,
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self> {
        let format = PixelFormat::from_channels(channels).ok_or_else(|| PipelineError::Decode {
            frame_index: Some(index),
            reason: format!("unsupported channel count {}", channels),
        })?;
        normalize::validate_len(&data, width, height, format).map_err(|reason| {
            PipelineError::Decode {
                frame_index: Some(index),
                reason,
            }
        })?;
        if width == 0 || height == 0 {
            return Err(PipelineError::Decode {
                frame_index: Some(index),
                reason: "frame has zero area".to_string(),
            }
            .into());
        }
        Ok(Self {
            index,
            timestamp,
            width,
            height,
            channels,
            data: data.into(),
        })
    }

    /// Build a frame from NV12 planes, converting to RGB24.
    pub fn from_nv12(
        index: u64,
        timestamp: Duration,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<Self> {
        let rgb = normalize::normalize_to_rgb(data, width, height, PixelFormat::Nv12).map_err(
            |e| PipelineError::Decode {
                frame_index: Some(index),
                reason: e.to_string(),
            },
        )?;
        Self::new(index, timestamp, width, height, 3, rgb)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Luminance plane (BT.601), one value per pixel in raster order.
    pub fn luma(&self) -> Vec<f32> {
        let format = PixelFormat::from_channels(self.channels).unwrap_or(PixelFormat::Gray8);
        normalize::luma_plane(&self.data, format)
    }

}

// ----------------------------------------------------------------------------
// ForegroundMask
// ----------------------------------------------------------------------------

/// Binary mask with the dimensions of its source frame. Foreground pixels are
/// `FOREGROUND`, everything else `BACKGROUND`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForegroundMask {
    frame_index: u64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ForegroundMask {
    /// All-background mask.
    pub fn empty(frame_index: u64, width: u32, height: u32) -> Self {
        Self {
            frame_index,
            width,
            height,
            pixels: vec![BACKGROUND; width as usize * height as usize],
        }
    }

    /// Build from one flag per pixel in raster order.
    pub fn from_flags(
        frame_index: u64,
        width: u32,
        height: u32,
        flags: impl IntoIterator<Item = bool>,
    ) -> Self {
        let pixels: Vec<u8> = flags
            .into_iter()
            .map(|fg| if fg { FOREGROUND } else { BACKGROUND })
            .collect();
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            frame_index,
            width,
            height,
            pixels,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.pixels[(y * self.width + x) as usize] == FOREGROUND
    }

    pub fn set(&mut self, x: u32, y: u32, foreground: bool) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] =
                if foreground { FOREGROUND } else { BACKGROUND };
        }
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p == FOREGROUND).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    pub fn from_gray_image(frame_index: u64, image: &GrayImage) -> Self {
        let pixels = image
            .as_raw()
            .iter()
            .map(|&p| if p > 0 { FOREGROUND } else { BACKGROUND })
            .collect();
        Self {
            frame_index,
            width: image.width(),
            height: image.height(),
            pixels,
        }
    }
}

// ----------------------------------------------------------------------------
// ReorderBuffer
// ----------------------------------------------------------------------------

/// Releases frames strictly in ascending index order.
///
/// Frames may be decoded out of order (parallel decoders, batched
/// preprocessing). The buffer holds early frames until the expected index
/// arrives. When `capacity` frames are waiting the gap is declared lost and
/// the lowest waiting frame is released, so a dropped frame never stalls the
/// run. Frames older than the last released index are discarded.
pub struct ReorderBuffer {
    pending: BTreeMap<u64, Frame>,
    next_index: u64,
    capacity: usize,
    dropped: u64,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::starting_at(capacity, 0)
    }

    pub fn starting_at(capacity: usize, first_index: u64) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_index: first_index,
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queue a frame. Returns false when the frame is stale or duplicated.
    pub fn push(&mut self, frame: Frame) -> bool {
        let index = frame.index();
        if index < self.next_index || self.pending.contains_key(&index) {
            log::warn!(
                "reorder buffer: discarding stale frame {} (expecting {})",
                index,
                self.next_index
            );
            self.dropped += 1;
            return false;
        }
        self.pending.insert(index, frame);
        true
    }

    /// Next frame in order, if it can be released.
    pub fn pop_ready(&mut self) -> Option<Frame> {
        if let Some(frame) = self.pending.remove(&self.next_index) {
            self.next_index += 1;
            return Some(frame);
        }
        if self.pending.len() >= self.capacity {
            let (&lowest, _) = self.pending.iter().next()?;
            log::warn!(
                "reorder buffer: frames {}..{} never arrived, skipping ahead",
                self.next_index,
                lowest
            );
            let frame = self.pending.remove(&lowest)?;
            self.next_index = lowest + 1;
            return Some(frame);
        }
        None
    }

    /// Release everything still waiting, in order. Used at end of stream.
    pub fn drain(&mut self) -> Vec<Frame> {
        let frames: Vec<Frame> = std::mem::take(&mut self.pending).into_values().collect();
        if let Some(last) = frames.last() {
            self.next_index = last.index() + 1;
        }
        frames
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Stale or duplicate frames discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(index: u64) -> Frame {
        Frame::new(index, Duration::ZERO, 4, 2, 1, vec![0u8; 8]).unwrap()
    }

    #[test]
    fn frame_rejects_length_mismatch() {
        let err = Frame::new(3, Duration::ZERO, 4, 4, 3, vec![0u8; 10]).unwrap_err();
        match crate::pipeline_error(&err) {
            Some(PipelineError::Decode { frame_index, .. }) => assert_eq!(*frame_index, Some(3)),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn frame_rejects_unknown_channel_count() {
        assert!(Frame::new(0, Duration::ZERO, 1, 1, 2, vec![0u8; 2]).is_err());
    }

    #[test]
    fn nv12_frame_with_odd_size_is_a_decode_error() {
        let err = Frame::from_nv12(0, Duration::ZERO, 3, 1, &[0u8; 4]).unwrap_err();
        assert!(matches!(
            crate::pipeline_error(&err),
            Some(PipelineError::Decode { frame_index: Some(0), .. })
        ));

        let frame = Frame::from_nv12(1, Duration::ZERO, 2, 2, &[128u8; 6]).unwrap();
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.pixels(), &[128u8; 12][..]);
    }

    #[test]
    fn luma_of_rgb_frame() {
        let frame = Frame::new(0, Duration::ZERO, 1, 1, 3, vec![255, 255, 255]).unwrap();
        let luma = frame.luma();
        assert_eq!(luma.len(), 1);
        assert!((luma[0] - 255.0).abs() < 0.01);
    }

    #[test]
    fn mask_round_trips_through_gray_image() {
        let mut mask = ForegroundMask::empty(5, 3, 3);
        mask.set(1, 1, true);
        let image = mask.to_gray_image();
        let back = ForegroundMask::from_gray_image(5, &image);
        assert_eq!(back, mask);
        assert_eq!(back.count(), 1);
        assert!(back.is_foreground(1, 1));
        assert!(!back.is_foreground(9, 9));
    }

    #[test]
    fn reorder_buffer_restores_order() {
        let mut buf = ReorderBuffer::new(8);
        buf.push(gray_frame(2));
        buf.push(gray_frame(0));
        buf.push(gray_frame(1));

        let order: Vec<u64> = std::iter::from_fn(|| buf.pop_ready())
            .map(|f| f.index())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(buf.is_empty());
    }

    #[test]
    fn reorder_buffer_skips_lost_frame_when_full() {
        let mut buf = ReorderBuffer::new(2);
        buf.push(gray_frame(1));
        assert!(buf.pop_ready().is_none());
        buf.push(gray_frame(2));
        assert_eq!(buf.pop_ready().map(|f| f.index()), Some(1));
        assert_eq!(buf.pop_ready().map(|f| f.index()), Some(2));
        // Frame 0 shows up late and is discarded.
        assert!(!buf.push(gray_frame(0)));
        assert_eq!(buf.dropped(), 1);
    }

    #[test]
    fn reorder_buffer_drains_in_order() {
        let mut buf = ReorderBuffer::new(16);
        buf.push(gray_frame(7));
        buf.push(gray_frame(4));
        let drained: Vec<u64> = buf.drain().iter().map(|f| f.index()).collect();
        assert_eq!(drained, vec![4, 7]);
    }
}
