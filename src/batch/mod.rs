//! Headless sweep of a source directory.
//!
//! Files are converted one at a time. A failed file is reported and left
//! where it is; the sweep moves on to the next one.

use crate::constants::{
    BATCH_ARCHIVE_DIR, BATCH_CONVERTED_DIR, BATCH_OUTPUT_EXTENSION, BATCH_SOURCE_DIR,
    DIAGNOSTIC_TAIL_LINES,
};
use crate::encoder::{Encoder, EncoderError};
use crate::services::{FileError, FileService};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Source directory '{0}' does not exist")]
    SourceMissing(String),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    File(#[from] FileError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDirs {
    pub source: PathBuf,
    pub converted: PathBuf,
    pub archive: PathBuf,
}

impl BatchDirs {
    pub fn under(base: &Path) -> Self {
        Self {
            source: base.join(BATCH_SOURCE_DIR),
            converted: base.join(BATCH_CONVERTED_DIR),
            archive: base.join(BATCH_ARCHIVE_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Converted. `archive` holds where the original went, or why it could
    /// not be moved.
    Converted {
        output: PathBuf,
        archive: Result<PathBuf, String>,
    },
    Failed {
        reason: String,
        diagnostics: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub input: PathBuf,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    pub fn converted(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| matches!(report.outcome, FileOutcome::Converted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.converted()
    }

    pub fn archive_failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| {
                matches!(
                    report.outcome,
                    FileOutcome::Converted {
                        archive: Err(_),
                        ..
                    }
                )
            })
            .count()
    }
}

pub struct BatchDriver {
    encoder: Encoder,
    dirs: BatchDirs,
}

impl BatchDriver {
    pub fn new(encoder: Encoder, dirs: BatchDirs) -> Self {
        Self { encoder, dirs }
    }

    pub fn dirs(&self) -> &BatchDirs {
        &self.dirs
    }

    /// Returns the encoder's version line.
    pub async fn preflight(&self) -> Result<String, BatchError> {
        Ok(self.encoder.probe_async().await?)
    }

    pub async fn run(&self) -> Result<BatchSummary, BatchError> {
        FileService::ensure_dir(&self.dirs.converted).await?;
        FileService::ensure_dir(&self.dirs.archive).await?;

        let files = match FileService::collect_video_files(&self.dirs.source).await {
            Ok(files) => files,
            Err(FileError::NotFound { path }) => return Err(BatchError::SourceMissing(path)),
            Err(e) => return Err(e.into()),
        };

        let mut summary = BatchSummary::default();
        if files.is_empty() {
            tracing::info!("No video files found in '{}'", self.dirs.source.display());
            return Ok(summary);
        }

        tracing::info!("Found {} files to convert", files.len());
        for input in files {
            let outcome = self.convert_one(&input).await;
            summary.reports.push(FileReport { input, outcome });
        }

        tracing::info!(
            "Batch finished: {} converted, {} failed",
            summary.converted(),
            summary.failed()
        );
        Ok(summary)
    }

    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        self.dirs
            .converted
            .join(format!("{}.{}", stem, BATCH_OUTPUT_EXTENSION))
    }

    async fn convert_one(&self, input: &Path) -> FileOutcome {
        let output = self.output_path_for(input);
        tracing::info!("Converting '{}' to '{}'...", input.display(), output.display());

        let result = self
            .encoder
            .async_conversion_command(input, &output)
            .output()
            .await;

        let process_output = match result {
            Ok(process_output) => process_output,
            Err(e) => {
                tracing::error!("Failed to start FFmpeg for '{}': {}", input.display(), e);
                return FileOutcome::Failed {
                    reason: format!("failed to start FFmpeg: {}", e),
                    diagnostics: String::new(),
                };
            }
        };

        if !process_output.status.success() {
            let diagnostics = tail_lines(&String::from_utf8_lossy(&process_output.stderr));
            tracing::error!(
                "Error converting '{}': FFmpeg exited with {}",
                input.display(),
                process_output.status
            );
            return FileOutcome::Failed {
                reason: format!("FFmpeg exited with {}", process_output.status),
                diagnostics,
            };
        }
        tracing::info!("Conversion successful: {}", output.display());

        FileOutcome::Converted {
            archive: self.archive(input).await,
            output,
        }
    }

    async fn archive(&self, input: &Path) -> Result<PathBuf, String> {
        let Some(file_name) = input.file_name() else {
            return Err(format!("'{}' has no file name", input.display()));
        };
        let destination = self.dirs.archive.join(file_name);

        match FileService::move_file(input, &destination).await {
            Ok(()) => {
                tracing::info!("Archived original file to: {}", destination.display());
                Ok(destination)
            }
            Err(e) => {
                tracing::error!("Failed to archive '{}': {}", input.display(), e);
                Err(e.to_string())
            }
        }
    }
}

fn tail_lines(text: &str) -> String {
    let lines: Vec<&str> = text
        .split(|c: char| c == '\n' || c == '\r')
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[start..].join("\n")
}
