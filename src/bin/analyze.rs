//! analyze - run the surveillance pipeline over a video, image or synthetic scene
//!
//! Writes one JSON line per processed frame, then a final line with the run
//! summary. Ctrl-C stops decoding; frames already decoded are still
//! processed before the summary is written.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::PathBuf;

use motionwatch::{open_source, run_streaming, PipelineConfig, StopHandle};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input: local video/image path or stub://<scene>.
    #[arg(long)]
    input: String,
    /// Pipeline configuration file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "MOTIONWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Output file for JSON lines (defaults to stdout).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Only write frames that have at least one track.
    #[arg(long, default_value_t = false)]
    tracked_only: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, stdout_is_tty && args.out.is_none());

    let config = {
        let _stage = ui.stage("Load configuration");
        PipelineConfig::load_from(args.config.as_deref())?
    };
    let source = {
        let _stage = ui.stage("Open input");
        open_source(&args.input, &config.ingest)?
    };

    let mut sink: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let stop = StopHandle::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, draining in-flight frames");
        handler_stop.stop();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let summary = {
        let mut progress = ui.frames("Analyze", 100);
        run_streaming(source, config, stop, |result| {
            progress.frame(result.frame_index, result.active_tracks);
            if args.tracked_only && result.tracks.is_empty() {
                return Ok(());
            }
            serde_json::to_writer(&mut sink, result)?;
            sink.write_all(b"\n")?;
            Ok(())
        })?
    };

    serde_json::to_writer(&mut sink, &serde_json::json!({ "summary": &summary }))?;
    sink.write_all(b"\n")?;
    sink.flush()?;

    if let Some(path) = &args.out {
        eprintln!("results written to {}", path.display());
    }
    match &summary.aborted {
        Some(reason) => Err(anyhow!("run aborted: {}", reason)),
        None => Ok(()),
    }
}
