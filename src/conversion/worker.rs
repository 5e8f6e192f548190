use crate::constants::{DIAGNOSTIC_TAIL_LINES, REAP_POLL_INTERVAL_MS, TERMINATION_GRACE_MS};
use crate::events::{EventSender, JobEvent, JobFailure, JobOutcome};
use crate::progress::{DiagnosticLines, ProgressTracker};
use std::collections::VecDeque;
use std::io::{self, BufReader};
use std::process::{Child, ChildStderr, Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// The running encoder. Shared so the controlling thread can signal it;
/// only the worker ever waits on it, and it empties the slot when it does.
pub(crate) type ProcessSlot = Arc<Mutex<Option<Child>>>;

pub(crate) struct WorkerContext {
    pub job_id: Uuid,
    pub command: Command,
    pub cancel: Arc<AtomicBool>,
    pub process: ProcessSlot,
    pub events: EventSender,
}

pub(crate) fn lock_slot(slot: &ProcessSlot) -> MutexGuard<'_, Option<Child>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kills and waits for whatever is still in the slot when dropped, so an
/// early return or a panic in the worker cannot leave the encoder running.
pub(crate) struct SlotReaper(ProcessSlot);

impl SlotReaper {
    pub fn new(slot: ProcessSlot) -> Self {
        Self(slot)
    }
}

impl Drop for SlotReaper {
    fn drop(&mut self) {
        if let Some(mut child) = lock_slot(&self.0).take() {
            tracing::warn!("Killing encoder pid {} left behind by its worker", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Asks the encoder to exit. SIGTERM on unix; elsewhere there is no
/// graceful equivalent for a console process, so it is killed.
pub(crate) fn terminate(slot: &ProcessSlot) -> io::Result<()> {
    match lock_slot(slot).as_mut() {
        Some(child) => request_termination(child),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "process id out of range"))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    child.kill()
}

pub(crate) fn run(mut ctx: WorkerContext) {
    let outcome = execute(&mut ctx);

    match &outcome {
        JobOutcome::Succeeded => tracing::info!("Conversion {} completed successfully", ctx.job_id),
        JobOutcome::Failed(failure) => tracing::error!("Conversion {} failed: {}", ctx.job_id, failure),
        JobOutcome::Aborted => tracing::info!("Conversion {} aborted by user", ctx.job_id),
    }

    let _ = ctx.events.send(JobEvent::Finished {
        job_id: ctx.job_id,
        outcome,
    });
}

fn execute(ctx: &mut WorkerContext) -> JobOutcome {
    let mut child = match ctx.command.spawn() {
        Ok(child) => child,
        Err(e) => return JobOutcome::Failed(JobFailure::SpawnFailure(e.to_string())),
    };
    tracing::info!("Conversion {} started encoder (pid {})", ctx.job_id, child.id());

    let stderr = child.stderr.take();
    *lock_slot(&ctx.process) = Some(child);
    let _reaper = SlotReaper::new(ctx.process.clone());

    let mut tracker = ProgressTracker::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    let mut read_error = None;

    if let Some(stderr) = stderr {
        let lines = match spawn_reader(ctx.job_id, stderr) {
            Ok(lines) => lines,
            Err(e) => {
                return JobOutcome::Failed(JobFailure::ProcessError(format!(
                    "could not start stderr reader: {}",
                    e
                )))
            }
        };
        let poll = Duration::from_millis(REAP_POLL_INTERVAL_MS);

        loop {
            if ctx.cancel.load(Ordering::SeqCst) {
                break;
            }

            let line = match lines.recv_timeout(poll) {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => {
                    tracing::warn!("Conversion {}: failed to read encoder output: {}", ctx.job_id, e);
                    read_error = Some(e);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let observation = tracker.observe(&line);
            if let Some(seconds) = observation.duration {
                let _ = ctx.events.send(JobEvent::DurationDiscovered {
                    job_id: ctx.job_id,
                    seconds,
                });
            }
            if let Some(sample) = observation.progress {
                let _ = ctx.events.send(JobEvent::Progress {
                    job_id: ctx.job_id,
                    position: sample.position,
                    percent: sample.percent,
                });
            }

            if tail.len() == DIAGNOSTIC_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    if ctx.cancel.load(Ordering::SeqCst) {
        // cancel() may have raced the spawn and found the slot empty.
        if let Err(e) = terminate(&ctx.process) {
            tracing::warn!("Conversion {}: failed to signal encoder: {}", ctx.job_id, e);
        }
    }

    let status = match reap(&ctx.process, &ctx.cancel) {
        Ok(status) => status,
        Err(e) => return JobOutcome::Failed(JobFailure::ProcessError(e.to_string())),
    };
    tracing::debug!("Conversion {} encoder exited with {}", ctx.job_id, status);

    if ctx.cancel.load(Ordering::SeqCst) {
        return JobOutcome::Aborted;
    }

    if status.success() {
        return JobOutcome::Succeeded;
    }

    let mut diagnostics = tail.into_iter().collect::<Vec<_>>().join("\n");
    if let Some(e) = read_error {
        if !diagnostics.is_empty() {
            diagnostics.push('\n');
        }
        diagnostics.push_str(&format!("(reading encoder output failed: {})", e));
    }
    if diagnostics.trim().is_empty() {
        diagnostics = format!("FFmpeg exited with {} without diagnostic output", status);
    }

    JobOutcome::Failed(JobFailure::ConversionFailed {
        status: status.to_string(),
        diagnostics,
    })
}

/// Reads stderr on its own thread. The worker only ever waits on the
/// returned channel with a timeout, so it keeps seeing the cancel flag
/// while the encoder is silent.
fn spawn_reader(job_id: Uuid, stderr: ChildStderr) -> io::Result<Receiver<io::Result<String>>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("conversion-{}-stderr", job_id))
        .spawn(move || {
            for line in DiagnosticLines::new(BufReader::new(stderr)) {
                let failed = line.is_err();
                if sender.send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(receiver)
}

/// Waits for the encoder to exit and releases its handle.
///
/// Polls instead of blocking in `wait()` so the child stays in the slot,
/// where `cancel()` can still reach it. Once cancellation is requested the
/// process gets `TERMINATION_GRACE_MS` before it is killed.
fn reap(slot: &ProcessSlot, cancel: &AtomicBool) -> io::Result<ExitStatus> {
    let grace = Duration::from_millis(TERMINATION_GRACE_MS);
    let mut cancel_seen_at: Option<Instant> = None;

    loop {
        {
            let mut guard = lock_slot(slot);
            let child = guard.as_mut().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "encoder process handle already released")
            })?;

            let result = match child.try_wait() {
                Ok(Some(status)) => Some(Ok(status)),
                Ok(None) if cancel.load(Ordering::SeqCst) => {
                    let since = *cancel_seen_at.get_or_insert_with(Instant::now);
                    if since.elapsed() >= grace {
                        tracing::warn!("Encoder ignored termination request; killing pid {}", child.id());
                        Some(child.kill().and_then(|_| child.wait()))
                    } else {
                        None
                    }
                }
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            };

            if let Some(result) = result {
                guard.take();
                return result;
            }
        }
        thread::sleep(Duration::from_millis(REAP_POLL_INTERVAL_MS));
    }
}
