//! Raw data file discovery
//!
//! Finds files matching the compiled filename glob anywhere below a folder
//! and narrows them to the configured time range using the timestamp in
//! each filename.

use crate::error::Result;
use crate::models::{CandidateFile, FileSet};
use crate::pattern::CompiledPattern;
use chrono::NaiveDateTime;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Recursive filename search below one root folder
#[derive(Debug)]
pub struct FileLocator {
    root: PathBuf,
    matcher: Pattern,
}

impl FileLocator {
    pub fn new(root: impl Into<PathBuf>, pattern: &CompiledPattern) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            matcher: pattern.matcher()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collect all files whose name matches the glob
    ///
    /// The walk visits entries sorted by name, not in filesystem enumeration
    /// order, so the result is the same on every platform. Entries that
    /// cannot be read are skipped; a missing root gives an empty set.
    pub fn locate(&self) -> FileSet {
        if !self.root.is_dir() {
            warn!("Search folder {} does not exist", self.root.display());
            return FileSet::new();
        }

        info!(
            "Searching for {} files in {}",
            self.matcher.as_str(),
            self.root.display()
        );

        let mut files = FileSet::new();
        let entries = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    None
                }
            });

        for entry in entries {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !self.matcher.matches(name) {
                continue;
            }

            let name = name.to_string();
            let path = entry.into_path();
            if let Some(previous) = files.insert(CandidateFile::new(name, path)) {
                debug!(
                    "Duplicate filename {}, replacing {}",
                    previous.name,
                    previous.path.display()
                );
            }
        }

        info!(
            "Found {} files matching {} in {}",
            files.len(),
            self.matcher.as_str(),
            self.root.display()
        );
        files
    }
}

/// Result of applying the time range to a file set
#[derive(Debug, Clone, Default)]
pub struct WindowOutcome {
    /// Files inside the range, timestamps annotated
    pub retained: FileSet,
    /// Files with a parsed timestamp outside the range
    pub outside: Vec<CandidateFile>,
    /// Files whose name did not parse with the datetime format
    pub unparsable: Vec<CandidateFile>,
}

impl WindowOutcome {
    pub fn rejected_count(&self) -> usize {
        self.outside.len() + self.unparsable.len()
    }
}

/// Inclusive `[start, end]` range on filename timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        self.start <= *timestamp && *timestamp <= self.end
    }

    /// Parse every filename and keep those inside the range
    pub fn apply(&self, files: FileSet, pattern: &CompiledPattern) -> WindowOutcome {
        let mut outcome = WindowOutcome::default();

        for mut file in files {
            match pattern.parse_timestamp(&file.name) {
                Some(timestamp) => {
                    file.timestamp = Some(timestamp);
                    if self.contains(&timestamp) {
                        debug!(
                            "Date of file {} ({}) is inside the selected time range",
                            file.name, timestamp
                        );
                        outcome.retained.insert(file);
                    } else {
                        info!(
                            "Date of file {} ({}) is outside the selected time range (between {} and {})",
                            file.name, timestamp, self.start, self.end
                        );
                        outcome.outside.push(file);
                    }
                }
                None => {
                    debug!(
                        "Filename {} does not match the datetime format {}",
                        file.name, pattern.parse
                    );
                    outcome.unparsable.push(file);
                }
            }
        }

        if !outcome.unparsable.is_empty() {
            info!(
                "{} files do not match the filename datetime format and are not used",
                outcome.unparsable.len()
            );
        }
        info!(
            "{} files between {} and {} ({} outside the time range)",
            outcome.retained.len(),
            self.start,
            self.end,
            outcome.outside.len()
        );

        outcome
    }
}
