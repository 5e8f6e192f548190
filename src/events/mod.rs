use crate::state::JobState;
use thiserror::Error;
use uuid::Uuid;

/// Why a job that got past preflight did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobFailure {
    #[error("FFmpeg exited with {status}:\n{diagnostics}")]
    ConversionFailed { status: String, diagnostics: String },
    #[error("Failed to start FFmpeg: {0}")]
    SpawnFailure(String),
    #[error("Process error: {0}")]
    ProcessError(String),
}

impl JobFailure {
    /// Diagnostic text to show in a log pane.
    pub fn diagnostics(&self) -> &str {
        match self {
            JobFailure::ConversionFailed { diagnostics, .. } => diagnostics,
            JobFailure::SpawnFailure(message) | JobFailure::ProcessError(message) => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded,
    Failed(JobFailure),
    /// Cancelled by the user. Any partial output file is left in place.
    Aborted,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Aborted => JobState::Aborted,
        }
    }
}

/// Sent from the worker thread; drained by the controller on its own turn.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    DurationDiscovered { job_id: Uuid, seconds: f64 },
    Progress { job_id: Uuid, position: f64, percent: f64 },
    Finished { job_id: Uuid, outcome: JobOutcome },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::DurationDiscovered { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Finished { job_id, .. } => *job_id,
        }
    }
}

pub type EventSender = std::sync::mpsc::Sender<JobEvent>;
pub type EventReceiver = std::sync::mpsc::Receiver<JobEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    std::sync::mpsc::channel()
}
