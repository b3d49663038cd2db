//! Frame ingestion sources.
//!
//! Every input kind is normalized to the same ordered `Frame` sequence behind
//! the `FrameSource` trait, so nothing downstream special-cases stills versus
//! video:
//! - Still images (`.jpg`, `.png`, `.bmp`): a one-frame sequence
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic scenes (`stub://<scene>`), for tests and demos
//! - In-memory frame sequences supplied by an embedding caller
//!
//! Ingestion is offline/local only. Remote URLs are rejected.
//!
//! A source reports end of sequence with `Ok(None)`. Any `Err` it returns is
//! treated as a decode failure and aborts the run.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::config::IngestSettings;
use crate::frame::Frame;
use crate::PipelineError;

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
pub mod memory;
pub(crate) mod normalize;
pub mod still;
pub mod synthetic;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::VideoSource;
pub use memory::MemorySource;
pub use still::ImageSource;
pub use synthetic::{SceneObject, SyntheticScene, SyntheticSource};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Ordered producer of frames.
pub trait FrameSource: Send {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Open the underlying input. Called once before the first `next_frame`.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame in sequence, or `None` at end of input.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

/// Ingestion counters for a source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub frames_produced: u64,
    pub location: String,
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Input kinds recognised by `open_source`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Synthetic,
    Image,
    Video,
}

/// Classify a location string without opening it.
pub fn classify_input(location: &str) -> Result<InputKind> {
    if location.trim().is_empty() {
        return Err(PipelineError::decode("empty input location").into());
    }
    if location.starts_with("stub://") {
        return Ok(InputKind::Synthetic);
    }
    if location.contains("://") {
        return Err(PipelineError::decode(format!(
            "only local files are supported, got {}",
            location
        ))
        .into());
    }
    let ext = Path::new(location)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(InputKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(InputKind::Video)
    } else {
        Err(PipelineError::decode(format!("unrecognised input type for {}", location)).into())
    }
}

/// Open the right source for `location`.
pub fn open_source(location: &str, settings: &IngestSettings) -> Result<Box<dyn FrameSource>> {
    match classify_input(location)? {
        InputKind::Synthetic => {
            let name = location.trim_start_matches("stub://");
            let scene = SyntheticScene::named(name).ok_or_else(|| {
                PipelineError::decode(format!("unknown synthetic scene '{}'", name))
            })?;
            Ok(Box::new(SyntheticSource::new(scene)))
        }
        InputKind::Image => Ok(Box::new(ImageSource::from_path(location)?)),
        InputKind::Video => open_video(location, settings),
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(location: &str, settings: &IngestSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(VideoSource::new(location, settings.fps)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(location: &str, _settings: &IngestSettings) -> Result<Box<dyn FrameSource>> {
    Err(PipelineError::decode(format!(
        "video input {} requires the ingest-file-ffmpeg feature",
        location
    ))
    .into())
}

/// Timestamp for frame `index` at a nominal frame rate.
pub(crate) fn nominal_timestamp(index: u64, fps: u32) -> std::time::Duration {
    let fps = fps.max(1) as u64;
    std::time::Duration::from_micros(index * 1_000_000 / fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_inputs_by_extension() {
        assert_eq!(classify_input("clip.MP4").unwrap(), InputKind::Video);
        assert_eq!(classify_input("frame.jpeg").unwrap(), InputKind::Image);
        assert_eq!(classify_input("stub://walker").unwrap(), InputKind::Synthetic);
        assert!(classify_input("notes.txt").is_err());
    }

    #[test]
    fn rejects_remote_urls() {
        let err = classify_input("rtsp://camera/stream").unwrap_err();
        assert!(matches!(
            crate::pipeline_error(&err),
            Some(PipelineError::Decode { .. })
        ));
    }

    #[test]
    fn opens_named_synthetic_scene() {
        let source = open_source("stub://walker", &IngestSettings::default()).unwrap();
        assert_eq!(source.name(), "synthetic");
        assert!(open_source("stub://nope", &IngestSettings::default()).is_err());
    }

    #[test]
    fn nominal_timestamps_follow_fps() {
        assert_eq!(nominal_timestamp(25, 25).as_millis(), 1000);
        assert_eq!(nominal_timestamp(0, 0).as_millis(), 0);
    }
}
