use std::fmt;

/// Lifecycle of one conversion job.
///
/// `Idle -> Running -> {Succeeded, Failed, Aborted} -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_idle(&self) -> bool {
        matches!(self, JobState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Aborted
        )
    }

    pub fn transition_to_running(self) -> Option<Self> {
        match self {
            JobState::Idle => Some(JobState::Running),
            _ => None,
        }
    }

    pub fn transition_to_finished(self, outcome: JobState) -> Option<Self> {
        match self {
            JobState::Running if outcome.is_finished() => Some(outcome),
            _ => None,
        }
    }

    pub fn reset_to_idle(self) -> Option<Self> {
        if self.is_finished() {
            Some(JobState::Idle)
        } else {
            None
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
