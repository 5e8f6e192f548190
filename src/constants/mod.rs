// App Constants
pub const APP_NAME: &str = "FFmpeg Video Converter";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CONFIG_DIR_NAME: &str = "ffconvert";

// Encoder Constants
pub const DEFAULT_ENCODER: &str = "ffmpeg";
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

/// Lines of encoder stderr kept for failure reports.
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Longest stderr line kept whole; longer runs without a line break are cut.
pub const MAX_DIAGNOSTIC_LINE_BYTES: usize = 64 * 1024;

/// How long an aborted encoder gets to exit after SIGTERM before it is killed.
pub const TERMINATION_GRACE_MS: u64 = 5000;
pub const REAP_POLL_INTERVAL_MS: u64 = 50;

// UI
pub const PROGRESS_REPAINT_INTERVAL_MS: u64 = 100;
pub const MAX_LOG_LINES: usize = 1000;

// File handling
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "avi", "mov", "flv", "wmv", "webm", "mp4", "ts"];

// Batch layout, relative to the base directory
pub const BATCH_SOURCE_DIR: &str = "source";
pub const BATCH_CONVERTED_DIR: &str = "converted";
pub const BATCH_ARCHIVE_DIR: &str = "archive";
pub const BATCH_OUTPUT_EXTENSION: &str = "mp4";

pub const CONVERTED_SUFFIX: &str = "_converted";
