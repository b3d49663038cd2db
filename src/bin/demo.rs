//! demo - end-to-end synthetic run of the motionwatch pipeline

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;

use motionwatch::ingest::SyntheticScene;
use motionwatch::{Activity, Pipeline, PipelineConfig, SyntheticSource};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Synthetic scene to render (walker, runner, crossing, idle, empty).
    #[arg(long, default_value = "walker")]
    scene: String,
    /// Override the scene length in frames.
    #[arg(long)]
    frames: Option<u64>,
    /// Deterministic seed for sensor noise.
    #[arg(long)]
    seed: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, false);

    let mut scene = SyntheticScene::named(&args.scene).ok_or_else(|| {
        anyhow!(
            "unknown scene '{}' (expected one of: {})",
            args.scene,
            SyntheticScene::names().join(", ")
        )
    })?;
    if let Some(frames) = args.frames {
        if frames == 0 {
            return Err(anyhow!("frames must be >= 1"));
        }
        scene = scene.with_frames(frames);
    }
    if let Some(seed) = args.seed {
        scene = scene.with_seed(seed);
    }

    let config = {
        let _stage = ui.stage("Load configuration");
        PipelineConfig::load()?
    };
    let mut pipeline = Pipeline::new(config)?;
    let summary = {
        let _stage = ui.stage(&format!("Run scene {}", args.scene));
        pipeline.run(&mut SyntheticSource::new(scene))?
    };

    println!("scene: {}", args.scene);
    println!(
        "frames: {} processed, {} warm-up, {} skipped",
        summary.frames_processed, summary.warmup_frames, summary.frames_skipped
    );
    println!(
        "tracks: {} created, {} confirmed, {} terminated (peak {} active)",
        summary.tracks_created,
        summary.tracks_confirmed,
        summary.tracks_terminated,
        summary.peak_tracks
    );
    for activity in Activity::ALL {
        println!("  {:<9} {}", activity.as_str(), summary.labels.get(activity));
    }
    if let Some(last) = pipeline.results().last() {
        for track in &last.tracks {
            let label = track
                .label
                .as_ref()
                .map_or("-".to_string(), |l| format!("{} ({:.2})", l.activity, l.confidence));
            println!("  track {} [{}] {}", track.id, track.state.as_str(), label);
        }
    }
    println!("digest: {}", summary.digest);
    if let Some(reason) = &summary.aborted {
        return Err(anyhow!("run aborted: {}", reason));
    }
    Ok(())
}
