//! Core data structures of a run.
//!
//! Defines the run identifier, the candidate file collections produced by
//! discovery, the per-run context handed to every stage, and the summary
//! returned when a run finishes.

use crate::config::Settings;
use crate::constants::{RUN_ID_FORMAT, RUN_ID_PREFIX};
use crate::layout::RunDirectoryLayout;
use crate::pattern::FilenamePatterns;
use chrono::{Local, NaiveDateTime};
use colored::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifier of one run, `FR-%Y%m%d-%H%M%S`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Identifier for a run starting now (local time)
    pub fn now() -> Self {
        Self::from_timestamp(&Local::now().naive_local())
    }

    pub fn from_timestamp(timestamp: &NaiveDateTime) -> Self {
        Self(format!("{}{}", RUN_ID_PREFIX, timestamp.format(RUN_ID_FORMAT)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file whose name matched the compiled glob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub path: PathBuf,
    /// Set by the time-window filter
    pub timestamp: Option<NaiveDateTime>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            timestamp: None,
        }
    }
}

/// Candidate files keyed by filename, in discovery order
///
/// Inserting a name that is already present replaces the entry but keeps
/// its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<CandidateFile>,
    index: HashMap<String, usize>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, returning the entry it replaced
    pub fn insert(&mut self, file: CandidateFile) -> Option<CandidateFile> {
        match self.index.get(&file.name) {
            Some(&pos) => Some(std::mem::replace(&mut self.files[pos], file)),
            None => {
                self.index.insert(file.name.clone(), self.files.len());
                self.files.push(file);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CandidateFile> {
        self.index.get(name).map(|&pos| &self.files[pos])
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateFile> {
        self.files.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }

    /// Entry with the latest parsed timestamp
    pub fn newest(&self) -> Option<&CandidateFile> {
        self.files
            .iter()
            .filter(|f| f.timestamp.is_some())
            .max_by_key(|f| f.timestamp)
    }
}

impl FromIterator<CandidateFile> for FileSet {
    fn from_iter<I: IntoIterator<Item = CandidateFile>>(iter: I) -> Self {
        let mut set = FileSet::new();
        for file in iter {
            set.insert(file);
        }
        set
    }
}

impl IntoIterator for FileSet {
    type Item = CandidateFile;
    type IntoIter = std::vec::IntoIter<CandidateFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Paths resolved while the run progresses; never persisted
#[derive(Debug, Clone)]
pub struct DerivedPaths {
    pub layout: RunDirectoryLayout,
    /// Folder handed to EddyPro as `data_path`
    pub data_path: Option<PathBuf>,
    /// Rendered `ini/processing.eddypro`
    pub processing_file: Option<PathBuf>,
    /// Rendered `ini/processing.metadata`
    pub metadata_file: Option<PathBuf>,
    /// Executables staged into `bin/`
    pub raw_processing_exe: Option<PathBuf>,
    pub flux_correction_exe: Option<PathBuf>,
}

impl DerivedPaths {
    pub fn new(layout: RunDirectoryLayout) -> Self {
        Self {
            layout,
            data_path: None,
            processing_file: None,
            metadata_file: None,
            raw_processing_exe: None,
            flux_correction_exe: None,
        }
    }
}

/// Everything a stage needs to know about the current run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub settings: Settings,
    pub run_id: RunId,
    pub patterns: FilenamePatterns,
    pub derived: DerivedPaths,
}

impl RunContext {
    pub fn new(settings: Settings, run_id: RunId) -> Self {
        let settings = settings.with_absolute_paths();
        let patterns = FilenamePatterns::compile(
            &settings.rawdata.filename_datetime_format,
            &settings.rawdata.site,
            settings.rawdata.compression,
        );
        let layout =
            RunDirectoryLayout::new(&settings.output.outdir, settings.prefix_or_site(), &run_id);

        Self {
            settings,
            run_id,
            patterns,
            derived: DerivedPaths::new(layout),
        }
    }

    pub fn layout(&self) -> &RunDirectoryLayout {
        &self.derived.layout
    }

    /// `{prefix_or_site}_{run_id}`
    pub fn project_id(&self) -> String {
        format!("{}_{}", self.settings.prefix_or_site(), self.run_id)
    }

    pub fn run_dir(&self) -> &Path {
        &self.derived.layout.root
    }
}

/// Result of one EddyPro phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseOutcome {
    #[default]
    Skipped,
    Succeeded,
    Failed {
        exit_code: Option<i32>,
    },
}

impl PhaseOutcome {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => PhaseOutcome::Succeeded,
            exit_code => PhaseOutcome::Failed { exit_code },
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, PhaseOutcome::Succeeded)
    }
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseOutcome::Skipped => write!(f, "skipped"),
            PhaseOutcome::Succeeded => write!(f, "succeeded"),
            PhaseOutcome::Failed {
                exit_code: Some(code),
            } => write!(f, "failed (exit code {})", code),
            PhaseOutcome::Failed { exit_code: None } => write!(f, "failed (terminated)"),
        }
    }
}

/// Run statistics
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub run_dir: PathBuf,
    pub files_found: usize,
    pub files_outside_window: usize,
    pub files_staged: usize,
    pub files_failed: usize,
    pub columns_corrected: usize,
    pub raw_processing: PhaseOutcome,
    pub flux_correction: PhaseOutcome,
    pub full_output: Option<PathBuf>,
    pub files_deleted: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(run_id: RunId, run_dir: PathBuf) -> Self {
        Self {
            run_id,
            run_dir,
            files_found: 0,
            files_outside_window: 0,
            files_staged: 0,
            files_failed: 0,
            columns_corrected: 0,
            raw_processing: PhaseOutcome::default(),
            flux_correction: PhaseOutcome::default(),
            full_output: None,
            files_deleted: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Print the run summary to stdout
    pub fn print(&self) {
        println!("\n{}", "Run Summary".bright_green().bold());
        println!("  {} {}", "Run id:".bright_cyan(), self.run_id.to_string().bright_white());
        println!("  {} {}", "Run folder:".bright_cyan(), self.run_dir.display());
        println!(
            "  {} {:.1}s",
            "Time elapsed:".bright_cyan(),
            self.elapsed.as_secs_f64()
        );
        println!(
            "  {} {} ({} outside time range)",
            "Files found:".bright_cyan(),
            self.files_found.to_string().bright_white().bold(),
            self.files_outside_window
        );
        println!(
            "  {} {}",
            "Files staged:".bright_cyan(),
            self.files_staged.to_string().bright_white()
        );
        if self.files_failed > 0 {
            println!(
                "  {} {}",
                "Files failed:".bright_red(),
                self.files_failed.to_string().bright_red().bold()
            );
        }
        if self.columns_corrected > 0 {
            println!(
                "  {} {}",
                "Columns corrected:".bright_yellow(),
                self.columns_corrected.to_string().bright_yellow()
            );
        }
        println!("  {} {}", "Raw processing:".bright_cyan(), self.raw_processing);
        println!("  {} {}", "Flux correction:".bright_cyan(), self.flux_correction);
        if let Some(full_output) = &self.full_output {
            println!("  {} {}", "Results:".bright_cyan(), full_output.display());
        }
        if self.files_deleted > 0 {
            println!(
                "  {} {}",
                "Staged files deleted:".bright_cyan(),
                self.files_deleted
            );
        }
    }
}
