//! Video container conversion driven by an external FFmpeg binary.
//!
//! [`conversion::JobController`] runs one encoder process at a time and
//! reports progress scraped from its stderr; [`batch::BatchDriver`] sweeps a
//! directory synchronously.

pub mod app;
pub mod batch;
pub mod config;
pub mod constants;
pub mod conversion;
pub mod encoder;
pub mod events;
pub mod formats;
pub mod progress;
pub mod services;
pub mod state;
pub mod ui;
