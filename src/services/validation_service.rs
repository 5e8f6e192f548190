use crate::formats::OutputFormat;
use crate::services::FileService;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Please select an input file")]
    MissingInputFile,
    #[error("Input file does not exist: {path}")]
    InputFileNotFound { path: String },
    #[error("Please select an output location")]
    MissingOutputFile,
    #[error("Please set the FFmpeg location")]
    MissingEncoder,
    #[error("Input is already {format}; choose a different output format")]
    SameFormat { format: OutputFormat },
    #[error("Input and output files cannot be the same")]
    SameInputOutput,
}

/// Checks performed before a conversion request reaches the controller.
pub struct ValidationService;

impl ValidationService {
    /// Cheap checks that gate the Convert button on every frame.
    pub fn check_form(
        encoder: &str,
        input: &str,
        output: &str,
        format: OutputFormat,
    ) -> Result<(), ValidationError> {
        if input.trim().is_empty() {
            return Err(ValidationError::MissingInputFile);
        }
        if output.trim().is_empty() {
            return Err(ValidationError::MissingOutputFile);
        }
        if encoder.trim().is_empty() {
            return Err(ValidationError::MissingEncoder);
        }

        let input_ext = FileService::extension_lowercase(Path::new(input));
        if input_ext.as_deref() == Some(format.extension()) {
            return Err(ValidationError::SameFormat { format });
        }

        if Path::new(input) == Path::new(output) {
            return Err(ValidationError::SameInputOutput);
        }

        Ok(())
    }

    /// Full validation run when the user presses Convert.
    pub fn validate_request(
        encoder: &str,
        input: &str,
        output: &str,
        format: OutputFormat,
    ) -> Result<(), ValidationError> {
        Self::check_form(encoder, input, output, format)?;

        if !Path::new(input).is_file() {
            return Err(ValidationError::InputFileNotFound {
                path: input.to_string(),
            });
        }

        Ok(())
    }
}
