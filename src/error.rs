//! Error handling for fluxrun operations.
//!
//! Every condition that aborts a run is a variant here. Per-file problems
//! (a corrupt archive, a filename that does not parse) never become errors;
//! the stages log them and carry on.

use std::path::PathBuf;
use thiserror::Error;

use crate::constants::FATAL_EXIT_CODE;

#[derive(Error, Debug)]
pub enum FluxRunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Settings error: {message}")]
    Settings { message: String },

    #[error("Settings file could not be parsed: {path} - {reason}")]
    SettingsParse { path: PathBuf, reason: String },

    #[error("No raw data files found in {dir} matching {pattern}. Please check settings.")]
    NoRawDataFiles { dir: PathBuf, pattern: String },

    #[error("No *.metadata file with name {expected} was found in {dir}")]
    MetadataFileMissing { dir: PathBuf, expected: String },

    #[error("Template file not found: {path}")]
    TemplateMissing { path: PathBuf },

    #[error("Executable {name} was not found in folder {dir}")]
    ExecutableMissing { name: String, dir: PathBuf },

    #[error("Operating system {os} is not supported by the bundled EddyPro executables")]
    UnsupportedPlatform { os: String },

    #[error("Numeric validation failed for file: {path} - {reason}")]
    NumericValidationFailed { path: PathBuf, reason: String },

    #[error("Failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl FluxRunError {
    /// Attach the offending path to an I/O error
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Create a settings validation error
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }

    /// Process exit status reported for this error
    ///
    /// All errors that reach the entry point abort the run, so they share
    /// one status.
    pub fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }
}

pub type Result<T> = std::result::Result<T, FluxRunError>;
