//! Video moderation CLI
//!
//! Samples frames from a video file, classifies each through Claude on
//! Bedrock, and prints the aggregate moderation report as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use video_moderation_classifier::{BedrockClassifier, ClaudeModel};
use video_moderation_pipeline::{PipelineConfig, VideoModerator};

#[derive(Parser)]
#[command(name = "video-moderation")]
#[command(about = "Frame-sampled video content moderation with Claude on Bedrock")]
struct Args {
    /// Path to the video file to analyze
    video: PathBuf,

    /// Number of frames to sample across the video
    #[arg(long, default_value_t = 10)]
    frames: usize,

    /// Claude model (claude-sonnet-3.5-v2, sonnet, claude-haiku-3.5, haiku)
    #[arg(long, default_value = "claude-sonnet-3.5-v2", value_parser = ClaudeModel::from_str)]
    model: ClaudeModel,

    /// AWS region override
    #[arg(long)]
    region: Option<String>,

    /// Concurrent classification calls (1 = sequential)
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Write the JSON report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();

    let video = std::fs::read(&args.video)
        .with_context(|| format!("failed to read {}", args.video.display()))?;

    let classifier = match args.region.as_deref() {
        Some(region) => BedrockClassifier::new_with_region(region, args.model).await,
        None => BedrockClassifier::new(args.model).await,
    };

    let mut config = PipelineConfig::default();
    config.sampler.target_samples = args.frames;
    config.concurrency = args.concurrency;

    let moderator = VideoModerator::with_config(classifier, config);
    let report = moderator.analyze(video).await?;

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
