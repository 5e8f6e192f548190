use anyhow::{Context, Result};
use clap::Parser;
use ffconvert::batch::{BatchDirs, BatchDriver, FileOutcome};
use ffconvert::constants::{DEFAULT_AUDIO_CODEC, DEFAULT_ENCODER, DEFAULT_VIDEO_CODEC};
use ffconvert::encoder::{CodecSettings, Encoder};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Convert every video in a source directory to MP4 and archive the originals.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory holding source/, converted/ and archive/
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    #[arg(long)]
    source: Option<PathBuf>,

    #[arg(long)]
    converted: Option<PathBuf>,

    #[arg(long)]
    archive: Option<PathBuf>,

    /// FFmpeg executable
    #[arg(long, default_value = DEFAULT_ENCODER)]
    encoder: PathBuf,

    #[arg(long, default_value = DEFAULT_VIDEO_CODEC)]
    video_codec: String,

    #[arg(long, default_value = DEFAULT_AUDIO_CODEC)]
    audio_codec: String,
}

impl Args {
    fn dirs(&self) -> BatchDirs {
        let defaults = BatchDirs::under(&self.base_dir);
        BatchDirs {
            source: self.source.clone().unwrap_or(defaults.source),
            converted: self.converted.clone().unwrap_or(defaults.converted),
            archive: self.archive.clone().unwrap_or(defaults.archive),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let encoder = Encoder::new(
        &args.encoder,
        CodecSettings {
            video_codec: args.video_codec.clone(),
            audio_codec: args.audio_codec.clone(),
        },
    );
    let driver = BatchDriver::new(encoder, args.dirs());

    match driver.preflight().await {
        Ok(version) => tracing::info!("Using {}", version),
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    }

    let summary = driver
        .run()
        .await
        .with_context(|| format!("batch conversion in '{}' failed", driver.dirs().source.display()))?;

    if summary.reports.is_empty() {
        println!("No video files found in '{}'.", driver.dirs().source.display());
        return Ok(ExitCode::SUCCESS);
    }

    for report in &summary.reports {
        let name = report.input.display();
        match &report.outcome {
            FileOutcome::Converted { output, archive } => {
                println!("OK      {} -> {}", name, output.display());
                match archive {
                    Ok(path) => println!("        archived to {}", path.display()),
                    Err(e) => println!("        not archived: {}", e),
                }
            }
            FileOutcome::Failed { reason, diagnostics } => {
                println!("FAILED  {}: {}", name, reason);
                for line in diagnostics.lines() {
                    println!("        {}", line);
                }
            }
        }
    }
    println!(
        "{} converted, {} failed, {} not archived",
        summary.converted(),
        summary.failed(),
        summary.archive_failures()
    );

    Ok(ExitCode::SUCCESS)
}
