//! Progress scraping for the encoder's stderr.
//!
//! FFmpeg does not promise a stable diagnostic format, so everything here is
//! best-effort telemetry. A job's outcome is decided by the exit status alone;
//! a line that fails to parse only means one less progress update.

use crate::constants::MAX_DIAGNOSTIC_LINE_BYTES;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::io::BufRead;

static DURATION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration: (\d{2,}):(\d{2}):(\d{2})\.(\d{2})").unwrap());
static TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d{2,}):(\d{2}):(\d{2})\.(\d{2})").unwrap());

/// Total duration announced in the encoder's input banner, in seconds.
pub fn observe_duration(line: &str) -> Option<f64> {
    DURATION_REGEX.captures(line).and_then(|caps| sample_seconds(&caps))
}

/// Current output position from a stats line, in seconds.
pub fn observe_position(line: &str) -> Option<f64> {
    TIME_REGEX.captures(line).and_then(|caps| sample_seconds(&caps))
}

/// Percentage of `total` reached at `position`.
///
/// Returns `None` when the total is unknown or not a positive finite number.
/// The result is not clamped.
pub fn percent(total: Option<f64>, position: f64) -> Option<f64> {
    match total {
        Some(total) if total.is_finite() && total > 0.0 => Some(position / total * 100.0),
        _ => None,
    }
}

fn sample_seconds(caps: &Captures<'_>) -> Option<f64> {
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    let hundredths: u64 = caps[4].parse().ok()?;

    // Integer hundredths first so the single division rounds exactly once.
    // The hour field is unbounded; an absurd value is a non-match.
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?
        .checked_mul(100)?
        .checked_add(hundredths)?;
    Some(total as f64 / 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub position: f64,
    pub percent: f64,
}

/// What a single line contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    pub duration: Option<f64>,
    pub progress: Option<ProgressSample>,
}

impl Observation {
    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && self.progress.is_none()
    }
}

/// Caller-side parser state: whether the duration has been seen and the
/// last position reported.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    total: Option<f64>,
    last_position: Option<f64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> Option<f64> {
        self.total
    }

    pub fn last_position(&self) -> Option<f64> {
        self.last_position
    }

    pub fn observe(&mut self, line: &str) -> Observation {
        let mut observation = Observation::default();

        // First Duration wins; later ones belong to other inputs or outputs.
        if self.total.is_none() {
            if let Some(total) = observe_duration(line) {
                self.total = Some(total);
                observation.duration = Some(total);
            }
        }

        if let Some(position) = observe_position(line) {
            self.last_position = Some(position);
            if let Some(percent) = percent(self.total, position) {
                observation.progress = Some(ProgressSample { position, percent });
            }
        }

        observation
    }
}

/// Splits a diagnostic byte stream into lines on `\n`, `\r` or `\r\n`.
///
/// FFmpeg rewrites its stats line in place by ending it with a bare `\r`,
/// so splitting on `\n` alone would only surface progress at exit.
/// A line longer than the limit is cut and the rest becomes the next line.
pub struct DiagnosticLines<R> {
    reader: R,
    pending: Vec<u8>,
    max_line: usize,
    done: bool,
}

impl<R: BufRead> DiagnosticLines<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line(reader, MAX_DIAGNOSTIC_LINE_BYTES)
    }

    pub fn with_max_line(reader: R, max_line: usize) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            max_line: max_line.max(1),
            done: false,
        }
    }

    fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

impl<R: BufRead> Iterator for DiagnosticLines<R> {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return self.take_pending().map(Ok);
            }

            let (consumed, line_complete) = {
                let buf = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                };

                if buf.is_empty() {
                    self.done = true;
                    continue;
                }

                let room = self.max_line - self.pending.len();
                match buf.iter().take(room).position(|b| *b == b'\n' || *b == b'\r') {
                    Some(index) => {
                        self.pending.extend_from_slice(&buf[..index]);
                        (index + 1, true)
                    }
                    None => {
                        let taken = buf.len().min(room);
                        self.pending.extend_from_slice(&buf[..taken]);
                        (taken, self.pending.len() >= self.max_line)
                    }
                }
            };
            self.reader.consume(consumed);

            if line_complete {
                // "\r\n" yields an empty fragment between the two bytes.
                if let Some(line) = self.take_pending() {
                    return Some(Ok(line));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parsing() {
        assert_eq!(observe_duration("Duration: 01:02:03.45"), Some(3723.45));
        assert_eq!(
            observe_duration("  Duration: 00:10:00.00, start: 0.000000, bitrate: 1205 kb/s"),
            Some(600.0)
        );
        assert_eq!(observe_duration("Duration: N/A, bitrate: N/A"), None);
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!(
            observe_position("frame=  750 fps= 50 q=28.0 size=    1024kB time=00:30:00.00 bitrate= 279.6kbits/s speed=2.0x"),
            Some(1800.0)
        );
        assert_eq!(observe_position("time=N/A"), None);
        assert_eq!(observe_position("Duration: 00:10:00.00"), None);
    }

    #[test]
    fn test_out_of_range_hours_are_ignored() {
        let line = "Input #0, matroska, from 'time=9999999999999999:00:00.00.mkv':";
        assert_eq!(observe_position(line), None);
        assert_eq!(observe_duration("Duration: 99999999999999999999:00:00.00"), None);
        assert_eq!(observe_duration("Duration: 120:00:00.50"), Some(432000.5));

        let mut tracker = ProgressTracker::new();
        assert!(tracker.observe(line).is_empty());
        assert_eq!(tracker.last_position(), None);
    }

    #[test]
    fn test_percent() {
        let position = observe_position("time=00:30:00.00").unwrap();
        assert_eq!(percent(Some(3600.0), position), Some(50.0));
        assert_eq!(percent(Some(0.0), position), None);
        assert_eq!(percent(None, position), None);
        assert_eq!(percent(Some(f64::NAN), position), None);
    }

    #[test]
    fn test_noise_lines_leave_tracker_unchanged() {
        let mut tracker = ProgressTracker::new();
        for line in [
            "",
            "ffmpeg version 6.0 Copyright (c) 2000-2023 the FFmpeg developers",
            "  Stream #0:0: Video: h264 (High), yuv420p, 1920x1080",
            "Durat",
            "ion: 00:01",
            "time=00:0",
            "\u{fffd}\u{fffd} garbage",
        ] {
            assert!(tracker.observe(line).is_empty());
        }
        assert_eq!(tracker.total(), None);
        assert_eq!(tracker.last_position(), None);
    }

    #[test]
    fn test_first_duration_wins() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe("Duration: 00:10:00.00").duration, Some(600.0));
        assert_eq!(tracker.observe("Duration: 00:20:00.00").duration, None);
        assert_eq!(tracker.total(), Some(600.0));
    }

    #[test]
    fn test_position_before_duration_has_no_percent() {
        let mut tracker = ProgressTracker::new();
        let observation = tracker.observe("time=00:00:05.00");
        assert_eq!(observation.progress, None);
        assert_eq!(tracker.last_position(), Some(5.0));
    }

    #[test]
    fn test_percent_sequence() {
        let mut tracker = ProgressTracker::new();
        tracker.observe("Duration: 00:10:00.00");

        let percents: Vec<f64> = ["time=00:02:30.00", "time=00:05:00.00", "time=00:10:00.00"]
            .iter()
            .filter_map(|line| tracker.observe(line).progress)
            .map(|sample| sample.percent)
            .collect();

        assert_eq!(percents, vec![25.0, 50.0, 100.0]);
    }

    #[test]
    fn test_diagnostic_lines_split_on_carriage_return() {
        let input: &[u8] =
            b"Input #0\r\n  Duration: 00:10:00.00\nframe=1 time=00:02:30.00\rframe=2 time=00:05:00.00\rtail";
        let lines: Vec<String> = DiagnosticLines::new(input)
            .collect::<std::io::Result<_>>()
            .unwrap();

        assert_eq!(
            lines,
            vec![
                "Input #0",
                "  Duration: 00:10:00.00",
                "frame=1 time=00:02:30.00",
                "frame=2 time=00:05:00.00",
                "tail",
            ]
        );
    }

    #[test]
    fn test_diagnostic_lines_across_small_buffers() {
        let input: &[u8] = b"Duration: 00:00:10.00\rtime=00:00:05.00\n";
        let reader = std::io::BufReader::with_capacity(3, input);
        let lines: Vec<String> = DiagnosticLines::new(reader)
            .collect::<std::io::Result<_>>()
            .unwrap();

        assert_eq!(lines, vec!["Duration: 00:00:10.00", "time=00:00:05.00"]);
    }

    #[test]
    fn test_overlong_line_is_cut() {
        let input: &[u8] = b"abcdefghij\nxy";
        let lines: Vec<String> = DiagnosticLines::with_max_line(input, 4)
            .collect::<std::io::Result<_>>()
            .unwrap();

        assert_eq!(lines, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn test_unterminated_stream_is_bounded() {
        let input = vec![b'a'; MAX_DIAGNOSTIC_LINE_BYTES * 2 + 10];
        let lengths: Vec<usize> = DiagnosticLines::new(input.as_slice())
            .map(|line| line.unwrap().len())
            .collect();

        assert_eq!(
            lengths,
            vec![MAX_DIAGNOSTIC_LINE_BYTES, MAX_DIAGNOSTIC_LINE_BYTES, 10]
        );
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let input: &[u8] = b"\xff\xfe time=00:00:01.00\n";
        let lines: Vec<String> = DiagnosticLines::new(input)
            .collect::<std::io::Result<_>>()
            .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(observe_position(&lines[0]), Some(1.0));
    }
}
