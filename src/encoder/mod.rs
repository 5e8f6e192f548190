use crate::constants::{DEFAULT_AUDIO_CODEC, DEFAULT_ENCODER, DEFAULT_VIDEO_CODEC};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncoderError {
    #[error("FFmpeg not found at '{path}': {reason}")]
    NotFound { path: String, reason: String },
    #[error("FFmpeg at '{path}' returned an error ({status})")]
    ProbeFailed { path: String, status: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    pub video_codec: String,
    pub audio_codec: String,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
        }
    }
}

/// An external FFmpeg binary and the codecs every conversion forces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoder {
    binary: PathBuf,
    codecs: CodecSettings,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_ENCODER, CodecSettings::default())
    }
}

impl Encoder {
    pub fn new(binary: impl Into<PathBuf>, codecs: CodecSettings) -> Self {
        Self {
            binary: binary.into(),
            codecs,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn codecs(&self) -> &CodecSettings {
        &self.codecs
    }

    /// `-y -i <input> -c:v <video> -c:a <audio> <output>`
    pub fn conversion_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-c:v".into(),
            self.codecs.video_codec.clone().into(),
            "-c:a".into(),
            self.codecs.audio_codec.clone().into(),
            output.as_os_str().to_owned(),
        ]
    }

    /// Conversion command with stdin and stdout detached and stderr piped.
    pub fn conversion_command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.conversion_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        hide_console_window(&mut cmd);
        cmd
    }

    /// Async variant used by the batch driver.
    pub fn async_conversion_command(&self, input: &Path, output: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(self.conversion_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    }

    /// Runs `<encoder> -version` and returns the first line of its banner.
    pub fn probe(&self) -> Result<String, EncoderError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-version").stdin(Stdio::null());
        hide_console_window(&mut cmd);

        let output = cmd.output().map_err(|e| EncoderError::NotFound {
            path: self.binary.display().to_string(),
            reason: e.to_string(),
        })?;
        self.interpret_probe(output)
    }

    pub async fn probe_async(&self) -> Result<String, EncoderError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("-version").stdin(Stdio::null());
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let output = cmd.output().await.map_err(|e| EncoderError::NotFound {
            path: self.binary.display().to_string(),
            reason: e.to_string(),
        })?;
        self.interpret_probe(output)
    }

    fn interpret_probe(&self, output: std::process::Output) -> Result<String, EncoderError> {
        if !output.status.success() {
            return Err(EncoderError::ProbeFailed {
                path: self.binary.display().to_string(),
                status: output.status.to_string(),
            });
        }

        let banner = String::from_utf8_lossy(&output.stdout);
        let version = banner.lines().next().unwrap_or_default().trim().to_string();
        tracing::debug!("Encoder probe succeeded: {}", version);
        Ok(version)
    }
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}
