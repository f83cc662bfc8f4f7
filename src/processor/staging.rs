//! Raw data staging
//!
//! Brings the selected raw data files into the run's staging folder:
//! gzip archives are extracted, plain files are copied. Every file is
//! handled on its own; a broken file is reported and the batch goes on.

use crate::constants::{GZIP_EXTENSION, STAGING_README_NAME};
use crate::error::{FluxRunError, Result};
use crate::models::{CandidateFile, FileSet};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A file that could not be staged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingFailure {
    pub source: PathBuf,
    pub reason: String,
}

/// Outcome of one staging batch
#[derive(Debug, Clone, Default)]
pub struct StagingReport {
    /// Paths written into the staging folder
    pub staged: Vec<PathBuf>,
    pub failed: Vec<StagingFailure>,
}

/// How a single file is brought into the staging folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMode {
    /// Extract a gzip archive, dropping the `.gz` suffix
    Decompress,
    /// Copy as-is so the source stays untouched
    Copy,
}

/// Writes raw data files into the staging folder
#[derive(Debug)]
pub struct Stager {
    staging_dir: PathBuf,
    mode: StagingMode,
    show_progress: bool,
}

impl Stager {
    pub fn new(staging_dir: impl Into<PathBuf>, mode: StagingMode) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            mode,
            show_progress: false,
        }
    }

    /// Show a progress bar on the console
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Name of the staged copy of `name`
    pub fn staged_name<'a>(&self, name: &'a str) -> &'a str {
        match self.mode {
            StagingMode::Decompress => name.strip_suffix(GZIP_EXTENSION).unwrap_or(name),
            StagingMode::Copy => name,
        }
    }

    /// Stage every file of the set
    pub fn stage(&self, files: &FileSet) -> StagingReport {
        let progress_bar = self.show_progress.then(|| {
            let pb = ProgressBar::new(files.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        });

        let mut report = StagingReport::default();

        for file in files.iter() {
            if let Some(pb) = &progress_bar {
                pb.set_message(file.name.clone());
            }

            let target = self.staging_dir.join(self.staged_name(&file.name));
            match self.stage_file(file, &target) {
                Ok(()) => {
                    debug!("Staged {} -> {}", file.path.display(), target.display());
                    report.staged.push(target);
                }
                Err(e) => {
                    warn!("Could not stage file {}: {}", file.path.display(), e);
                    if target.exists() {
                        if let Err(remove_err) = fs::remove_file(&target) {
                            debug!(
                                "Could not remove partial file {}: {}",
                                target.display(),
                                remove_err
                            );
                        }
                    }
                    report.failed.push(StagingFailure {
                        source: file.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            if let Some(pb) = &progress_bar {
                pb.inc(1);
            }
        }

        if let Some(pb) = &progress_bar {
            pb.finish_and_clear();
        }

        info!(
            "Staged {} files into {} ({} failed)",
            report.staged.len(),
            self.staging_dir.display(),
            report.failed.len()
        );
        report
    }

    fn stage_file(&self, file: &CandidateFile, target: &Path) -> io::Result<()> {
        match self.mode {
            StagingMode::Decompress => {
                let mut decoder = GzDecoder::new(BufReader::new(File::open(&file.path)?));
                let mut writer = BufWriter::new(File::create(target)?);
                io::copy(&mut decoder, &mut writer)?;
                writer.flush()
            }
            StagingMode::Copy => fs::copy(&file.path, target).map(|_| ()),
        }
    }
}

/// Leave a note in the staging folder when the source files are used directly
pub fn write_in_place_readme(staging_dir: &Path, source_dir: &Path) -> Result<PathBuf> {
    let path = staging_dir.join(STAGING_README_NAME);
    let text = format!(
        "Raw data files were not compressed and numeric validation was disabled.\n\
         The files were used directly from their source folder:\n\
         {}\n",
        source_dir.display()
    );
    fs::write(&path, text).map_err(|e| FluxRunError::io_at(&path, e))?;
    Ok(path)
}
