pub mod file_service;
pub mod validation_service;

pub use file_service::{FileError, FileService};
pub use validation_service::{ValidationError, ValidationService};
