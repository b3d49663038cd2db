//! Local video file source using FFmpeg.
//!
//! Frames are decoded in presentation order, scaled to RGB24 and numbered
//! from zero. Timestamps come from the stream when present, otherwise from
//! the nominal frame rate.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::Duration;

use super::{nominal_timestamp, FrameSource, SourceStats};
use crate::frame::Frame;
use crate::PipelineError;

pub struct VideoSource {
    path: String,
    fps: u32,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    eof_sent: bool,
}

impl VideoSource {
    pub fn new(path: &str, fps: u32) -> Result<Self> {
        Self::open(path, fps).map_err(|e| PipelineError::decode(format!("{:#}", e)).into())
    }

    fn open(path: &str, fps: u32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("{} has no video track", path))?;
        let stream_index = input_stream.index();
        let time_base = input_stream.time_base();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            fps,
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            frame_count: 0,
            eof_sent: false,
        })
    }

    /// Pull one already-decoded frame out of the decoder, if any.
    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

        let index = self.frame_count;
        self.frame_count += 1;
        let timestamp = decoded
            .timestamp()
            .and_then(|pts| pts_to_duration(pts, self.time_base))
            .unwrap_or_else(|| nominal_timestamp(index, self.fps));
        Frame::new(index, timestamp, width, height, 3, pixels).map(Some)
    }

    fn decode_next(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.receive()? {
            return Ok(Some(frame));
        }
        if self.eof_sent {
            return Ok(None);
        }

        loop {
            let next = self
                .input
                .packets()
                .find(|(stream, _)| stream.index() == self.stream_index);
            let Some((_, packet)) = next else {
                break;
            };
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
        }

        self.decoder.send_eof().context("flush ffmpeg decoder")?;
        self.eof_sent = true;
        self.receive()
    }
}

impl FrameSource for VideoSource {
    fn name(&self) -> &str {
        "video"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "VideoSource: opened {} ({}x{})",
            self.path,
            self.decoder.width(),
            self.decoder.height()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let index = self.frame_count;
        self.decode_next().map_err(|e| {
            if crate::pipeline_error(&e).is_some() {
                return e;
            }
            PipelineError::Decode {
                frame_index: Some(index),
                reason: format!("{}: {:#}", self.path, e),
            }
            .into()
        })
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_produced: self.frame_count,
            location: self.path.clone(),
        }
    }
}

fn pts_to_duration(pts: i64, time_base: ffmpeg::Rational) -> Option<Duration> {
    if pts < 0 || time_base.denominator() == 0 {
        return None;
    }
    let micros = pts as i128 * time_base.numerator() as i128 * 1_000_000
        / time_base.denominator() as i128;
    u64::try_from(micros).ok().map(Duration::from_micros)
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let plane = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame plane is truncated")?;
        return Ok((plane.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
