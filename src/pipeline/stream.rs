//! Threaded streaming runner.
//!
//! A producer thread decodes frames into a bounded channel; once
//! `buffer_frames` decoded frames are waiting, decoding blocks until the
//! orchestrator catches up. The consumer restores frame-index order with a
//! `ReorderBuffer` before any frame reaches the tracker.
//!
//! Cancellation: `StopHandle::stop` makes the producer stop decoding. Frames
//! already in flight are still processed in order, then every buffer is
//! dropped.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread;

use super::{log_completion, FrameResult, Pipeline, RunSummary};
use crate::config::PipelineConfig;
use crate::frame::{Frame, ReorderBuffer};
use crate::ingest::{FrameSource, SourceStats};

/// Caller-side cancellation for a streaming run.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Run `source` through a fresh pipeline, calling `on_result` for every
/// processed frame in index order.
///
/// A decode failure ends the run and is reported in `RunSummary::aborted`;
/// results already delivered stay valid. An error from `on_result` stops the
/// run and is returned.
pub fn run_streaming<S, F>(
    source: S,
    config: PipelineConfig,
    stop: StopHandle,
    mut on_result: F,
) -> Result<RunSummary>
where
    S: FrameSource + 'static,
    F: FnMut(&FrameResult) -> Result<()>,
{
    let mut pipeline = streaming_pipeline(config)?;
    stream_into(&mut pipeline, source, stop, on_result)
}

/// Results go to the caller only; the pipeline keeps none of them.
fn streaming_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    Ok(Pipeline::new(config)?.retain_results(false))
}

fn stream_into<S, F>(
    pipeline: &mut Pipeline,
    source: S,
    stop: StopHandle,
    mut on_result: F,
) -> Result<RunSummary>
where
    S: FrameSource + 'static,
    F: FnMut(&FrameResult) -> Result<()>,
{
    let buffer_frames = pipeline.config().ingest.buffer_frames.max(1);
    let max_frames = pipeline.config().ingest.max_frames;

    let (tx, rx) = sync_channel::<Result<Frame>>(buffer_frames);
    let producer_stop = stop.clone();
    let producer = thread::Builder::new()
        .name("motionwatch-ingest".to_string())
        .spawn(move || produce(source, tx, producer_stop, max_frames))?;

    let mut reorder = ReorderBuffer::new(buffer_frames);
    let mut callback_error = None;
    let mut halted = false;

    for message in rx.iter() {
        let frame = match message {
            Ok(frame) => frame,
            Err(e) => {
                // Frames decoded before the failure are still valid.
                for frame in reorder.drain() {
                    if !deliver(pipeline, &frame, &mut on_result, &mut callback_error) {
                        break;
                    }
                }
                pipeline.record_abort(&e);
                halted = true;
                break;
            }
        };
        reorder.push(frame);
        while let Some(ready) = reorder.pop_ready() {
            if !deliver(pipeline, &ready, &mut on_result, &mut callback_error) {
                halted = true;
                break;
            }
        }
        if halted {
            break;
        }
    }

    if !halted {
        for frame in reorder.drain() {
            if !deliver(pipeline, &frame, &mut on_result, &mut callback_error) {
                break;
            }
        }
    }

    // Unblock a producer waiting on a full channel before joining it.
    drop(rx);
    drop(reorder);
    let source_stats = producer
        .join()
        .map_err(|_| anyhow!("ingest thread panicked"))?;

    if stop.is_stopped() {
        log::info!(
            "run cancelled after {} frames from {}",
            source_stats.frames_produced,
            source_stats.location
        );
    }
    if let Some(e) = callback_error {
        return Err(e);
    }
    let summary = pipeline.summary();
    log_completion(&source_stats.location, &summary);
    Ok(summary)
}

/// Process one frame and hand its result to the caller. Returns false when
/// the run must stop.
fn deliver<F>(
    pipeline: &mut Pipeline,
    frame: &Frame,
    on_result: &mut F,
    callback_error: &mut Option<anyhow::Error>,
) -> bool
where
    F: FnMut(&FrameResult) -> Result<()>,
{
    match pipeline.process_frame(frame) {
        Ok(Some(result)) => match on_result(&result) {
            Ok(()) => true,
            Err(e) => {
                *callback_error = Some(e);
                false
            }
        },
        Ok(None) => true,
        Err(_) => false,
    }
}

fn produce<S: FrameSource>(
    mut source: S,
    tx: SyncSender<Result<Frame>>,
    stop: StopHandle,
    max_frames: u64,
) -> SourceStats {
    if let Err(e) = source.connect() {
        let _ = tx.send(Err(e));
        return source.stats();
    }
    let mut sent = 0u64;
    loop {
        if stop.is_stopped() {
            log::info!("stop requested; {} stops decoding", source.name());
            break;
        }
        if max_frames > 0 && sent >= max_frames {
            log::info!("frame limit {} reached", max_frames);
            break;
        }
        match source.next_frame() {
            Ok(Some(frame)) => {
                if tx.send(Ok(frame)).is_err() {
                    // Consumer has finished.
                    break;
                }
                sent += 1;
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
    source.stats()
}
