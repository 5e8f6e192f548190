use crate::config::AppConfig;
use crate::constants::{MAX_LOG_LINES, VIDEO_EXTENSIONS};
use crate::conversion::JobController;
use crate::events::{JobEvent, JobOutcome};
use crate::formats::OutputFormat;
use crate::services::{FileService, ValidationService};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Modal message waiting for the user to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    Info { title: String, message: String },
    Error { title: String, message: String },
}

pub struct ConverterApp {
    pub encoder_path: String,
    pub input_file: String,
    pub output_file: String,
    pub format: OutputFormat,
    /// 0.0..=1.0 for the progress bar.
    pub progress: f32,
    pub log: VecDeque<String>,
    pub dialog: Option<Dialog>,
    pub controller: JobController,
    pub config: AppConfig,
    persist_config: bool,
}

impl Default for ConverterApp {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterApp {
    pub fn new() -> Self {
        let mut app = Self::with_config(AppConfig::load());
        app.persist_config = true;
        app
    }

    /// Builds the app around `config` without ever writing it back to disk.
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            encoder_path: config.encoder_path.clone(),
            input_file: String::new(),
            output_file: String::new(),
            format: config.default_format,
            progress: 0.0,
            log: VecDeque::new(),
            dialog: None,
            controller: JobController::new(config.codecs.clone()),
            config,
            persist_config: false,
        }
    }

    pub fn is_converting(&self) -> bool {
        self.controller.state().is_running()
    }

    pub fn can_start(&self) -> bool {
        !self.is_converting()
            && ValidationService::check_form(
                &self.encoder_path,
                &self.input_file,
                &self.output_file,
                self.format,
            )
            .is_ok()
    }

    pub fn can_abort(&self) -> bool {
        self.is_converting() && !self.controller.is_cancelling()
    }

    pub fn log(&mut self, message: impl Into<String>) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(message.into());
    }

    pub fn select_encoder(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .set_title("Select FFmpeg Executable")
            .pick_file()
        {
            self.encoder_path = path.to_string_lossy().to_string();
        }
    }

    pub fn select_input(&mut self) {
        let mut dialog = rfd::FileDialog::new()
            .set_title("Open a file")
            .add_filter("Video files", VIDEO_EXTENSIONS);

        if let Some(ref dir) = self.config.last_input_dir {
            dialog = dialog.set_directory(dir);
        }

        if let Some(path) = dialog.pick_file() {
            self.config.update_last_input_dir(&path);
            self.set_input(&path);
        }
    }

    pub fn select_output(&mut self) {
        let extension = self.format.extension();
        let mut dialog = rfd::FileDialog::new()
            .set_title("Save as")
            .add_filter(format!("{} files", self.format.display_name()), &[extension])
            .add_filter("All files", &["*"]);

        if let Some(ref dir) = self.config.last_output_dir {
            dialog = dialog.set_directory(dir);
        }

        if let Some(mut path) = dialog.save_file() {
            if path.extension().is_none() {
                path.set_extension(extension);
            }
            self.config.update_last_output_dir(&path);
            self.output_file = path.to_string_lossy().to_string();
        }
    }

    pub fn set_input(&mut self, path: &Path) {
        self.input_file = path.to_string_lossy().to_string();
        self.generate_default_output();
    }

    fn generate_default_output(&mut self) {
        if let Some(output) = FileService::default_output_path(Path::new(&self.input_file), self.format) {
            self.output_file = output.to_string_lossy().to_string();
        }
    }

    /// Called after the format selection changes.
    pub fn update_output_extension(&mut self) {
        if !self.output_file.is_empty() {
            let output = FileService::with_format_extension(Path::new(&self.output_file), self.format);
            self.output_file = output.to_string_lossy().to_string();
        } else if !self.input_file.is_empty() {
            self.generate_default_output();
        }
    }

    pub fn start_conversion(&mut self) {
        if let Err(e) = ValidationService::validate_request(
            &self.encoder_path,
            &self.input_file,
            &self.output_file,
            self.format,
        ) {
            self.show_error("Error", e.to_string());
            return;
        }

        let result = self.controller.start(
            PathBuf::from(self.encoder_path.trim()),
            PathBuf::from(&self.input_file),
            PathBuf::from(&self.output_file),
        );

        match result {
            Ok(_) => {
                self.progress = 0.0;
                self.log.clear();
                self.log(format!("Starting conversion to {}...", self.format));
                self.remember_settings();
            }
            Err(e) => {
                tracing::warn!("Conversion not started: {}", e);
                self.show_error(
                    "Error",
                    format!(
                        "{}\nPlease install FFmpeg or point to the correct executable.",
                        e
                    ),
                );
            }
        }
    }

    pub fn abort_conversion(&mut self) {
        if self.can_abort() {
            self.log("Aborting conversion...");
            self.controller.cancel();
        }
    }

    /// Drains controller events; called once per frame.
    pub fn update_status(&mut self) {
        for event in self.controller.poll_events() {
            match event {
                JobEvent::DurationDiscovered { seconds, .. } => {
                    self.log(format!("Total duration: {:.2}s", seconds));
                }
                JobEvent::Progress { percent, .. } => {
                    self.progress = (percent / 100.0).clamp(0.0, 1.0) as f32;
                }
                JobEvent::Finished { outcome, .. } => self.finish(outcome),
            }
        }
    }

    fn finish(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => {
                self.progress = 1.0;
                self.log("Conversion successful!");
                self.dialog = Some(Dialog::Info {
                    title: "Success".to_string(),
                    message: "Video conversion completed successfully.".to_string(),
                });
            }
            JobOutcome::Failed(failure) => {
                self.log("Conversion failed.");
                for line in failure.to_string().lines() {
                    self.log(line.to_string());
                }
                self.show_error("Error", "Video conversion failed. Check logs.");
            }
            JobOutcome::Aborted => {
                self.log("Conversion aborted by user.");
                self.acknowledge();
            }
        }
    }

    fn show_error(&mut self, title: &str, message: impl Into<String>) {
        self.dialog = Some(Dialog::Error {
            title: title.to_string(),
            message: message.into(),
        });
    }

    /// Dismisses the dialog and returns a finished controller to idle.
    pub fn acknowledge(&mut self) {
        self.dialog = None;
        if self.controller.state().is_finished() {
            if let Err(e) = self.controller.reset() {
                tracing::warn!("{}", e);
            }
        }
    }

    fn remember_settings(&mut self) {
        self.config.encoder_path = self.encoder_path.trim().to_string();
        self.config.default_format = self.format;
        if self.persist_config {
            self.config.save();
        }
    }
}
