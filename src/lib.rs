//! fluxrun Library
//!
//! A Rust library for running EddyPro flux calculations over eddy
//! covariance raw data files.
//!
//! This library provides tools for:
//! - Compiling filename datetime formats into search and parse patterns
//! - Finding raw data files and selecting them by the time in their names
//! - Decompressing and staging raw data into a self-contained run folder
//! - Replacing non-numeric raw data values with the missing-value marker
//! - Rendering EddyPro project files and running the EddyPro executables
//! - Writing availability, aggregate and result diagnostics

pub mod cli;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod ini;
pub mod layout;
pub mod logging;
pub mod models;
pub mod pattern;
pub mod processor;

// Re-export commonly used types
pub use config::Settings;
pub use error::{FluxRunError, Result};
pub use models::{RunContext, RunId, RunSummary};
pub use processor::RunOrchestrator;
