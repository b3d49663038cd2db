use anyhow::Result;
use std::collections::VecDeque;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Frames handed over by an embedding caller, replayed in the given order.
pub struct MemorySource {
    label: String,
    frames: VecDeque<Frame>,
    produced: u64,
}

impl MemorySource {
    pub fn new(label: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            label: label.into(),
            frames: frames.into(),
            produced: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.produced += 1;
        }
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_produced: self.produced,
            location: self.label.clone(),
        }
    }
}
