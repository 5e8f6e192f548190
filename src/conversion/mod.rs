mod worker;

use crate::encoder::{CodecSettings, Encoder, EncoderError};
use crate::events::{create_event_channel, EventReceiver, JobEvent, JobFailure, JobOutcome};
use crate::state::JobState;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use worker::{ProcessSlot, WorkerContext};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartError {
    #[error("FFmpeg not found at '{path}': {reason}")]
    EncoderMissing { path: String, reason: String },
    #[error("A conversion is already running")]
    AlreadyRunning,
}

impl From<EncoderError> for StartError {
    fn from(error: EncoderError) -> Self {
        match error {
            EncoderError::NotFound { path, reason } => StartError::EncoderMissing { path, reason },
            EncoderError::ProbeFailed { path, status } => StartError::EncoderMissing {
                path,
                reason: format!("version probe exited with {}", status),
            },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResetError {
    #[error("Cannot reset a job that is {0}")]
    NotFinished(JobState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: Uuid,
}

/// One conversion attempt, from `start` until `reset`.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub input: PathBuf,
    pub output: PathBuf,
    pub encoder_path: PathBuf,
    pub state: JobState,
    pub total_duration: Option<f64>,
    pub last_position: Option<f64>,
    pub last_percent: Option<f64>,
    pub failure: Option<JobFailure>,
    cancel: Arc<AtomicBool>,
    process: ProcessSlot,
    worker: Option<JoinHandle<()>>,
}

/// Runs at most one encoder process at a time on a background thread.
///
/// The worker never touches caller state. Everything it learns is queued as
/// [`JobEvent`]s and applied only when the caller drains them with
/// [`poll_events`](Self::poll_events) or [`wait`](Self::wait).
pub struct JobController {
    codecs: CodecSettings,
    job: Option<Job>,
    events: Option<EventReceiver>,
    pending: VecDeque<JobEvent>,
}

impl Default for JobController {
    fn default() -> Self {
        Self::new(CodecSettings::default())
    }
}

impl JobController {
    pub fn new(codecs: CodecSettings) -> Self {
        Self {
            codecs,
            job: None,
            events: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.job.as_ref().map(|job| job.state).unwrap_or_default()
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn last_failure(&self) -> Option<&JobFailure> {
        self.job.as_ref().and_then(|job| job.failure.as_ref())
    }

    pub fn is_cancelling(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| job.state.is_running() && job.cancel.load(Ordering::SeqCst))
    }

    /// Pid of the live encoder, if the worker still holds one.
    pub fn process_id(&self) -> Option<u32> {
        let job = self.job.as_ref()?;
        worker::lock_slot(&job.process).as_ref().map(|child| child.id())
    }

    pub fn start(
        &mut self,
        encoder_path: impl Into<PathBuf>,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Result<JobHandle, StartError> {
        if self.state().is_running() {
            tracing::warn!("Refusing to start a conversion while another is running");
            return Err(StartError::AlreadyRunning);
        }

        let encoder = Encoder::new(encoder_path, self.codecs.clone());
        let version = encoder.probe()?;
        tracing::info!("Using {}", version);

        if self.state().is_finished() {
            self.clear_job();
        }
        let state = self
            .state()
            .transition_to_running()
            .ok_or(StartError::AlreadyRunning)?;

        let input = input_path.into();
        let output = output_path.into();
        let job_id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let process = ProcessSlot::default();
        let (sender, receiver) = create_event_channel();

        let context = WorkerContext {
            job_id,
            command: encoder.conversion_command(&input, &output),
            cancel: cancel.clone(),
            process: process.clone(),
            events: sender,
        };

        let mut job = Job {
            id: job_id,
            input,
            output,
            encoder_path: encoder.binary().to_path_buf(),
            state,
            total_duration: None,
            last_position: None,
            last_percent: None,
            failure: None,
            cancel,
            process,
            worker: None,
        };
        tracing::info!(
            "Conversion {} requested: {} -> {}",
            job_id,
            job.input.display(),
            job.output.display()
        );

        match thread::Builder::new()
            .name(format!("conversion-{}", job_id))
            .spawn(move || worker::run(context))
        {
            Ok(handle) => job.worker = Some(handle),
            Err(e) => {
                // The sender went down with the closure, so report here.
                self.pending.push_back(JobEvent::Finished {
                    job_id,
                    outcome: JobOutcome::Failed(JobFailure::SpawnFailure(format!(
                        "could not start worker thread: {}",
                        e
                    ))),
                });
            }
        }

        self.job = Some(job);
        self.events = Some(receiver);
        Ok(JobHandle { id: job_id })
    }

    /// Requests termination of the running encoder.
    ///
    /// The job stays `Running` until the worker has reaped the process and
    /// its `Finished` event has been drained; then it becomes `Aborted`.
    pub fn cancel(&mut self) {
        let Some(job) = self.job.as_ref().filter(|job| job.state.is_running()) else {
            tracing::debug!("Cancel requested with no running conversion");
            return;
        };

        if job.cancel.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Aborting conversion {}", job.id);
        if let Err(e) = worker::terminate(&job.process) {
            tracing::warn!("Failed to signal encoder for conversion {}: {}", job.id, e);
        }
    }

    pub fn reset(&mut self) -> Result<(), ResetError> {
        let state = self.state();
        match state.reset_to_idle() {
            Some(_) => {
                self.clear_job();
                Ok(())
            }
            None => Err(ResetError::NotFinished(state)),
        }
    }

    /// Applies and returns every event queued since the last call.
    pub fn poll_events(&mut self) -> Vec<JobEvent> {
        let mut received: Vec<JobEvent> = self.pending.drain(..).collect();
        let mut disconnected = false;

        if let Some(receiver) = &self.events {
            loop {
                match receiver.try_recv() {
                    Ok(event) => received.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        let mut events = Vec::with_capacity(received.len());
        for event in received {
            if self.apply(&event) {
                events.push(event);
            }
        }

        if disconnected {
            events.extend(self.worker_lost());
        }
        events
    }

    /// Blocks until the job finishes or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Vec<JobEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll_events();

        while self.state().is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(receiver) = &self.events else {
                break;
            };

            match receiver.recv_timeout(remaining) {
                Ok(event) => {
                    if self.apply(&event) {
                        events.push(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    events.extend(self.worker_lost());
                    break;
                }
            }
        }
        events
    }

    fn apply(&mut self, event: &JobEvent) -> bool {
        let Some(job) = self.job.as_mut().filter(|job| job.id == event.job_id()) else {
            tracing::debug!("Dropping event for stale conversion {}", event.job_id());
            return false;
        };

        match event {
            JobEvent::DurationDiscovered { seconds, .. } => {
                tracing::info!("Total duration: {:.2}s", seconds);
                job.total_duration = Some(*seconds);
            }
            JobEvent::Progress {
                position, percent, ..
            } => {
                job.last_position = Some(*position);
                job.last_percent = Some(*percent);
            }
            JobEvent::Finished { outcome, .. } => {
                let Some(next) = job.state.transition_to_finished(outcome.state()) else {
                    return false;
                };
                job.state = next;
                if let JobOutcome::Failed(failure) = outcome {
                    job.failure = Some(failure.clone());
                }
                if let Some(handle) = job.worker.take() {
                    // The worker sends Finished as its last act, or died.
                    if handle.join().is_err() {
                        tracing::error!("Conversion worker {} panicked", job.id);
                    }
                }
                self.events = None;
            }
        }
        true
    }

    fn worker_lost(&mut self) -> Option<JobEvent> {
        let job = self.job.as_ref().filter(|job| job.state.is_running())?;
        let event = JobEvent::Finished {
            job_id: job.id,
            outcome: JobOutcome::Failed(JobFailure::ProcessError(
                "conversion worker exited without reporting a result".to_string(),
            )),
        };
        tracing::error!("Conversion worker {} disconnected unexpectedly", job.id);
        self.apply(&event).then_some(event)
    }

    fn clear_job(&mut self) {
        if let Some(mut job) = self.job.take() {
            if let Some(handle) = job.worker.take() {
                let _ = handle.join();
            }
        }
        self.events = None;
        self.pending.clear();
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        // Don't leave an orphaned encoder behind; the worker reaps it.
        self.cancel();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::constants::TERMINATION_GRACE_MS;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(20);

    /// Writes a shell script that answers `-version` and otherwise runs `body`.
    fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-ffmpeg");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then\n  echo \"ffmpeg version 6.0-test\"\n  exit 0\nfi\n{}\n",
            body
        );
        std::fs::write(&path, script).unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).unwrap();
        path
    }

    fn start_with(controller: &mut JobController, encoder: &Path, dir: &TempDir) -> JobHandle {
        controller
            .start(encoder, dir.path().join("input.mkv"), dir.path().join("output.mp4"))
            .unwrap()
    }

    fn percents(events: &[JobEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|event| match event {
                JobEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    fn wait_for_process(controller: &JobController) {
        let deadline = Instant::now() + TIMEOUT;
        while controller.process_id().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_progress_sequence_and_success() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            r#"echo "  Duration: 00:10:00.00, start: 0.000000, bitrate: 1205 kb/s" >&2
printf 'frame=  100 fps=25 time=00:02:30.00 speed=1x\r' >&2
printf 'frame=  200 fps=25 time=00:05:00.00 speed=1x\r' >&2
printf 'frame=  300 fps=25 time=00:10:00.00 speed=1x\n' >&2
exit 0"#,
        );

        let mut controller = JobController::default();
        let handle = start_with(&mut controller, &encoder, &dir);
        assert_eq!(controller.state(), JobState::Running);

        let events = controller.wait(TIMEOUT);

        assert_eq!(percents(&events), vec![25.0, 50.0, 100.0]);
        assert!(events.contains(&JobEvent::DurationDiscovered {
            job_id: handle.id,
            seconds: 600.0
        }));
        assert_eq!(
            events.last(),
            Some(&JobEvent::Finished {
                job_id: handle.id,
                outcome: JobOutcome::Succeeded
            })
        );
        assert_eq!(controller.state(), JobState::Succeeded);

        let job = controller.job().unwrap();
        assert_eq!(job.total_duration, Some(600.0));
        assert_eq!(job.last_percent, Some(100.0));
        assert_eq!(controller.process_id(), None);
    }

    #[test]
    fn test_success_without_progress_lines() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(dir.path(), "exit 0");

        let mut controller = JobController::default();
        start_with(&mut controller, &encoder, &dir);
        let events = controller.wait(TIMEOUT);

        assert!(percents(&events).is_empty());
        assert_eq!(controller.state(), JobState::Succeeded);
        assert_eq!(controller.process_id(), None);
    }

    #[test]
    fn test_nonzero_exit_fails_with_diagnostics() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            r#"echo "input.mkv: No such file or directory" >&2
exit 1"#,
        );

        let mut controller = JobController::default();
        start_with(&mut controller, &encoder, &dir);
        controller.wait(TIMEOUT);

        assert_eq!(controller.state(), JobState::Failed);
        match controller.last_failure() {
            Some(JobFailure::ConversionFailed { diagnostics, .. }) => {
                assert!(diagnostics.contains("No such file or directory"));
            }
            other => panic!("unexpected failure: {:?}", other),
        }
        assert_eq!(controller.process_id(), None);
    }

    #[test]
    fn test_silent_failure_still_has_diagnostics() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(dir.path(), "exit 3");

        let mut controller = JobController::default();
        start_with(&mut controller, &encoder, &dir);
        controller.wait(TIMEOUT);

        assert_eq!(controller.state(), JobState::Failed);
        let failure = controller.last_failure().unwrap();
        assert!(!failure.diagnostics().trim().is_empty());
    }

    #[test]
    fn test_cancel_aborts_and_releases_process() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            r#"echo "  Duration: 00:10:00.00" >&2
exec sleep 30"#,
        );

        let mut controller = JobController::default();
        start_with(&mut controller, &encoder, &dir);
        wait_for_process(&controller);

        let cancelled_at = Instant::now();
        controller.cancel();
        assert!(controller.is_cancelling());
        assert_eq!(controller.state(), JobState::Running);

        controller.wait(TIMEOUT);

        assert_eq!(controller.state(), JobState::Aborted);
        assert_eq!(controller.process_id(), None);
        assert!(controller.last_failure().is_none());
        assert!(cancelled_at.elapsed() < Duration::from_millis(TERMINATION_GRACE_MS));
    }

    #[test]
    fn test_encoder_ignoring_sigterm_is_killed() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            r#"echo "  Duration: 00:10:00.00" >&2
trap '' TERM
exec sleep 60"#,
        );

        let mut controller = JobController::default();
        start_with(&mut controller, &encoder, &dir);
        wait_for_process(&controller);

        let cancelled_at = Instant::now();
        controller.cancel();
        controller.wait(TIMEOUT);

        assert_eq!(controller.state(), JobState::Aborted);
        assert_eq!(controller.process_id(), None);
        assert!(cancelled_at.elapsed() >= Duration::from_millis(TERMINATION_GRACE_MS));
    }

    #[test]
    fn test_out_of_range_fields_do_not_break_the_job() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            r#"echo "Input #0, matroska, from 'time=9999999999999999:00:00.00.mkv':" >&2
echo "  Duration: 99999999999999999999:00:00.00, start: 0.000000" >&2
echo "  Duration: 00:00:10.00, start: 0.000000" >&2
printf 'frame=  50 time=00:00:05.00 speed=1x\r' >&2
exit 0"#,
        );

        let mut controller = JobController::default();
        start_with(&mut controller, &encoder, &dir);
        let events = controller.wait(TIMEOUT);

        assert_eq!(percents(&events), vec![50.0]);
        assert_eq!(controller.state(), JobState::Succeeded);
        assert_eq!(controller.job().and_then(|job| job.total_duration), Some(10.0));
        assert_eq!(controller.process_id(), None);
    }

    #[test]
    fn test_worker_dying_mid_run_fails_job_and_reaps_encoder() {
        use super::worker::SlotReaper;

        let (sender, receiver) = create_event_channel();
        let job_id = Uuid::new_v4();
        let process = ProcessSlot::default();
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        *worker::lock_slot(&process) = Some(child);

        let worker_slot = process.clone();
        let handle = thread::spawn(move || {
            let _events = sender;
            let _reaper = SlotReaper::new(worker_slot);
            panic!("worker died mid-run");
        });

        let mut controller = JobController::default();
        controller.job = Some(Job {
            id: job_id,
            input: PathBuf::from("input.mkv"),
            output: PathBuf::from("output.mp4"),
            encoder_path: PathBuf::from("ffmpeg"),
            state: JobState::Running,
            total_duration: None,
            last_position: None,
            last_percent: None,
            failure: None,
            cancel: Arc::new(AtomicBool::new(false)),
            process,
            worker: Some(handle),
        });
        controller.events = Some(receiver);

        controller.wait(TIMEOUT);

        assert_eq!(controller.state(), JobState::Failed);
        assert!(matches!(
            controller.last_failure(),
            Some(JobFailure::ProcessError(_))
        ));
        assert_eq!(controller.process_id(), None);
    }

    #[test]
    fn test_start_while_running_is_refused() {
        let dir = TempDir::new().unwrap();
        let encoder = fake_encoder(dir.path(), "exec sleep 30");

        let mut controller = JobController::default();
        let first = start_with(&mut controller, &encoder, &dir);

        let second = controller.start(&encoder, dir.path().join("other.avi"), dir.path().join("other.mp4"));
        assert_eq!(second, Err(StartError::AlreadyRunning));
        assert_eq!(controller.state(), JobState::Running);
        assert_eq!(controller.job().map(|job| job.id), Some(first.id));
        assert!(!controller.is_cancelling());

        controller.cancel();
        controller.wait(TIMEOUT);
        assert_eq!(controller.state(), JobState::Aborted);
    }

    #[test]
    fn test_missing_encoder_creates_no_job() {
        let dir = TempDir::new().unwrap();
        let mut controller = JobController::default();

        let result = controller.start(
            dir.path().join("no-such-ffmpeg"),
            dir.path().join("input.mkv"),
            dir.path().join("output.mp4"),
        );

        assert!(matches!(result, Err(StartError::EncoderMissing { .. })));
        assert_eq!(controller.state(), JobState::Idle);
        assert!(controller.job().is_none());
    }

    #[test]
    fn test_failing_probe_is_encoder_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken-ffmpeg");
        std::fs::write(&path, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut controller = JobController::default();
        let result = controller.start(&path, dir.path().join("in.mkv"), dir.path().join("out.mp4"));

        assert!(matches!(result, Err(StartError::EncoderMissing { .. })));
        assert!(controller.job().is_none());
    }

    #[test]
    fn test_cancel_when_not_running_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut controller = JobController::default();

        controller.cancel();
        assert_eq!(controller.state(), JobState::Idle);

        let encoder = fake_encoder(dir.path(), "exit 0");
        start_with(&mut controller, &encoder, &dir);
        controller.wait(TIMEOUT);
        assert_eq!(controller.state(), JobState::Succeeded);

        controller.cancel();
        assert_eq!(controller.state(), JobState::Succeeded);
        assert!(!controller.is_cancelling());
    }

    #[test]
    fn test_reset_only_from_terminal_state() {
        let dir = TempDir::new().unwrap();
        let mut controller = JobController::default();
        assert_eq!(controller.reset(), Err(ResetError::NotFinished(JobState::Idle)));

        let encoder = fake_encoder(dir.path(), "exit 0");
        start_with(&mut controller, &encoder, &dir);
        controller.wait(TIMEOUT);

        assert_eq!(controller.reset(), Ok(()));
        assert_eq!(controller.state(), JobState::Idle);
        assert!(controller.job().is_none());
    }

    #[test]
    fn test_restart_after_failure() {
        let dir = TempDir::new().unwrap();
        let failing = fake_encoder(dir.path(), "exit 1");

        let mut controller = JobController::default();
        let first = start_with(&mut controller, &failing, &dir);
        controller.wait(TIMEOUT);
        assert_eq!(controller.state(), JobState::Failed);

        let succeeding_dir = TempDir::new().unwrap();
        let succeeding = fake_encoder(succeeding_dir.path(), "exit 0");
        let second = start_with(&mut controller, &succeeding, &dir);
        assert_ne!(first.id, second.id);

        controller.wait(TIMEOUT);
        assert_eq!(controller.state(), JobState::Succeeded);
        assert!(controller.last_failure().is_none());
    }

    #[test]
    fn test_spawn_failure_is_reported_through_events() {
        let (sender, receiver) = create_event_channel();
        let job_id = Uuid::new_v4();
        let context = WorkerContext {
            job_id,
            command: std::process::Command::new("/nonexistent/ffmpeg-binary"),
            cancel: Arc::new(AtomicBool::new(false)),
            process: ProcessSlot::default(),
            events: sender,
        };

        worker::run(context);

        match receiver.recv().unwrap() {
            JobEvent::Finished {
                job_id: id,
                outcome: JobOutcome::Failed(JobFailure::SpawnFailure(message)),
            } => {
                assert_eq!(id, job_id);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
