//! Run orchestration.
//!
//! Drives one run through its stages in a fixed order, using specialized
//! modules for file discovery, staging, numeric validation, EddyPro
//! preparation and process execution.

pub mod discovery;
pub mod external;
pub mod runner;
pub mod staging;
pub mod validation;

#[cfg(test)]
pub mod tests;

use self::discovery::{FileLocator, TimeWindow};
use self::external::{ExecutableStager, render_project_files};
use self::runner::ProcessRunner;
use self::staging::{Stager, StagingMode, write_in_place_readme};
use self::validation::NumericValidator;

use crate::config::{Compression, Settings};
use crate::constants::{ASCII_EXTENSION, FULL_OUTPUT_PATTERN, SETTINGS_FILE_NAME};
use crate::diagnostics::{CsvDiagnostics, DiagnosticsSink};
use crate::error::{FluxRunError, Result};
use crate::logging::RunLogFiles;
use crate::models::{FileSet, PhaseOutcome, RunContext, RunId, RunSummary};
use crate::pattern::CompiledPattern;

use colored::*;
use glob::Pattern;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    RawDataDiscovery,
    Decompression,
    NumericValidation,
    AvailabilityPlot,
    AggregatePlot,
    ExternalToolPreparation,
    FluxProcessingPhase1,
    OutputExistenceCheck,
    FluxProcessingPhase2,
    SummaryPlot,
    Cleanup,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "SETUP",
            Stage::RawDataDiscovery => "RAW DATA DISCOVERY",
            Stage::Decompression => "RAW DATA STAGING",
            Stage::NumericValidation => "NUMERIC VALIDATION",
            Stage::AvailabilityPlot => "RAW DATA AVAILABILITY",
            Stage::AggregatePlot => "RAW DATA AGGREGATES",
            Stage::ExternalToolPreparation => "EDDYPRO PREPARATION",
            Stage::FluxProcessingPhase1 => "EDDYPRO RAW PROCESSING",
            Stage::OutputExistenceCheck => "EDDYPRO OUTPUT CHECK",
            Stage::FluxProcessingPhase2 => "EDDYPRO FLUX CORRECTION",
            Stage::SummaryPlot => "FLUX SUMMARY",
            Stage::Cleanup => "CLEANUP",
            Stage::Finalize => "FINALIZE",
        };
        f.write_str(name)
    }
}

fn stage_start(stage: Stage) {
    info!("{}", "=".repeat(60));
    info!("START {}", stage);
    info!("{}", "=".repeat(60));
}

fn stage_end(stage: Stage) {
    info!("END {}", stage);
}

/// First `*_full_output_*.csv` in the results folder
pub fn find_full_output(results_dir: &Path) -> Option<PathBuf> {
    let pattern = Pattern::new(FULL_OUTPUT_PATTERN).ok()?;
    let mut matches: Vec<PathBuf> = fs::read_dir(results_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| entry.file_name().to_str().is_some_and(|n| pattern.matches(n)))
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Runs the whole pipeline for one settings document
pub struct RunOrchestrator {
    ctx: RunContext,
    log_files: Option<RunLogFiles>,
    diagnostics: Box<dyn DiagnosticsSink>,
    executables: Option<ExecutableStager>,
    show_progress: bool,
}

impl RunOrchestrator {
    /// Create an orchestrator for a run starting now
    pub fn new(settings: Settings) -> Self {
        Self::with_run_id(settings, RunId::now())
    }

    pub fn with_run_id(settings: Settings, run_id: RunId) -> Self {
        let ctx = RunContext::new(settings, run_id);
        let diagnostics = Box::new(CsvDiagnostics::new(ctx.layout(), &ctx.run_id));

        Self {
            ctx,
            log_files: None,
            diagnostics,
            executables: None,
            show_progress: false,
        }
    }

    /// Attach the run log files once the log folder exists
    pub fn with_log_files(mut self, log_files: RunLogFiles) -> Self {
        self.log_files = Some(log_files);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Box<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Use a specific executable bundle instead of the host default
    pub fn with_executables(mut self, executables: ExecutableStager) -> Self {
        self.executables = Some(executables);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Execute every stage in order
    ///
    /// Stops at the first fatal error. A failing EddyPro phase is not
    /// fatal; it is reported in the summary.
    pub async fn run(mut self) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::new(self.ctx.run_id.clone(), self.ctx.run_dir().to_path_buf());

        println!("{}", "Starting fluxrun".bright_green().bold());
        println!("  {} {}", "Run id:".bright_cyan(), self.ctx.run_id);
        println!("  {} {}", "Run folder:".bright_cyan(), self.ctx.run_dir().display());

        stage_start(Stage::Setup);
        self.setup()?;
        stage_end(Stage::Setup);

        stage_start(Stage::RawDataDiscovery);
        let selected = self.discover_source_files(&mut summary)?;
        stage_end(Stage::RawDataDiscovery);

        stage_start(Stage::Decompression);
        let files = self.stage_raw_data(selected, &mut summary)?;
        stage_end(Stage::Decompression);

        let settings = self.ctx.settings.clone();

        if settings.rawdata.validate_numeric {
            stage_start(Stage::NumericValidation);
            let report = NumericValidator::new(settings.rawdata.header_format)
                .validate_files(&files)?;
            summary.columns_corrected = report.columns_corrected();
            stage_end(Stage::NumericValidation);
        }

        if settings.rawdata.plot_rawdata_availability {
            stage_start(Stage::AvailabilityPlot);
            if let Err(e) = self.diagnostics.availability(&files) {
                warn!("Could not write raw data availability: {}", e);
            }
            stage_end(Stage::AvailabilityPlot);
        }

        if settings.rawdata.plot_rawdata_aggregates {
            stage_start(Stage::AggregatePlot);
            let header_rows = settings.rawdata.header_format.header_rows();
            if let Err(e) = self.diagnostics.aggregates(&files, header_rows) {
                warn!("Could not write raw data aggregates: {}", e);
            }
            stage_end(Stage::AggregatePlot);
        }

        if settings.flux_processing.run_flux_calcs {
            self.run_flux_processing(&mut summary).await?;
        } else {
            info!("Flux calculations are disabled, EddyPro is not run");
        }

        if settings.output.plot_summary {
            stage_start(Stage::SummaryPlot);
            match &summary.full_output {
                Some(full_output) => {
                    if let Err(e) = self.diagnostics.summary(full_output) {
                        warn!("Could not write flux summary: {}", e);
                    }
                }
                None => warn!(
                    "No {} file found in {}, flux summary is skipped",
                    FULL_OUTPUT_PATTERN,
                    self.ctx.layout().eddypro_results.display()
                ),
            }
            stage_end(Stage::SummaryPlot);
        }

        if settings.after_processing.delete_uncompressed_ascii_after_processing {
            stage_start(Stage::Cleanup);
            summary.files_deleted = self.cleanup()?;
            stage_end(Stage::Cleanup);
        }

        stage_start(Stage::Finalize);
        summary.elapsed = start_time.elapsed();
        info!(
            "Run {} finished in {:.1}s",
            summary.run_id,
            summary.elapsed.as_secs_f64()
        );
        stage_end(Stage::Finalize);

        Ok(summary)
    }

    fn setup(&mut self) -> Result<()> {
        let layout = self.ctx.layout().clone();
        layout.create()?;

        if let Some(log_files) = &self.log_files {
            log_files.attach(&layout.log, &self.ctx.run_id)?;
        }

        let archive = layout.root.join(SETTINGS_FILE_NAME);
        self.ctx.settings.save(&archive)?;
        info!("Settings saved to {}", archive.display());
        Ok(())
    }

    fn window(&self) -> TimeWindow {
        TimeWindow::new(
            self.ctx.settings.rawdata.start_date,
            self.ctx.settings.rawdata.end_date,
        )
    }

    /// Locate and window-filter files below `dir`; none at all is fatal
    fn select_files(&self, dir: &Path, pattern: &CompiledPattern) -> Result<(FileSet, usize)> {
        let found = FileLocator::new(dir, pattern)?.locate();
        let outcome = self.window().apply(found, pattern);

        if outcome.retained.is_empty() {
            return Err(FluxRunError::NoRawDataFiles {
                dir: dir.to_path_buf(),
                pattern: pattern.glob.clone(),
            });
        }

        let rejected = outcome.rejected_count();
        Ok((outcome.retained, rejected))
    }

    fn discover_source_files(&mut self, summary: &mut RunSummary) -> Result<FileSet> {
        let indir = self.ctx.settings.rawdata.indir.clone();
        let pattern = self.ctx.patterns.source.clone();
        let (files, rejected) = self.select_files(&indir, &pattern)?;

        summary.files_found = files.len();
        summary.files_outside_window = rejected;
        Ok(files)
    }

    /// Bring the selected files into the run, returning the files to process
    fn stage_raw_data(&mut self, selected: FileSet, summary: &mut RunSummary) -> Result<FileSet> {
        let rawdata = &self.ctx.settings.rawdata;
        let staging_dir = self.ctx.layout().rawdata_ascii.clone();

        let mode = match (rawdata.compression, rawdata.validate_numeric) {
            (Compression::Gzip, _) => StagingMode::Decompress,
            (Compression::None, true) => StagingMode::Copy,
            (Compression::None, false) => {
                let readme = write_in_place_readme(&staging_dir, &rawdata.indir)?;
                info!(
                    "Using raw data files directly from {} (see {})",
                    rawdata.indir.display(),
                    readme.display()
                );
                self.ctx.derived.data_path = Some(rawdata.indir.clone());
                summary.files_staged = selected.len();
                return Ok(selected);
            }
        };

        let report = Stager::new(&staging_dir, mode)
            .with_progress(self.show_progress)
            .stage(&selected);
        summary.files_failed = report.failed.len();

        let pattern = self.ctx.patterns.staged.clone();
        let (files, _) = self.select_files(&staging_dir, &pattern)?;
        summary.files_staged = files.len();
        self.ctx.derived.data_path = Some(staging_dir);
        Ok(files)
    }

    async fn run_flux_processing(&mut self, summary: &mut RunSummary) -> Result<()> {
        stage_start(Stage::ExternalToolPreparation);
        let (processing_file, metadata_file) = render_project_files(&self.ctx)?;
        self.ctx.derived.processing_file = Some(processing_file);
        self.ctx.derived.metadata_file = Some(metadata_file);

        let stager = match self.executables.take() {
            Some(stager) => stager,
            None => ExecutableStager::for_host(
                self.ctx.settings.flux_processing.eddypro_app_dir.as_deref(),
            )?,
        };
        let bin_dir = self.ctx.layout().eddypro_bin.clone();
        let (raw_processing, flux_correction) = stager.stage(&bin_dir)?;
        self.ctx.derived.raw_processing_exe = Some(raw_processing.clone());
        self.ctx.derived.flux_correction_exe = Some(flux_correction.clone());
        stage_end(Stage::ExternalToolPreparation);

        stage_start(Stage::FluxProcessingPhase1);
        let outcome = ProcessRunner::new(&raw_processing, &bin_dir).run().await?;
        summary.raw_processing = PhaseOutcome::from_exit_code(outcome.exit_code);
        stage_end(Stage::FluxProcessingPhase1);

        stage_start(Stage::OutputExistenceCheck);
        let results_dir = self.ctx.layout().eddypro_results.clone();
        summary.full_output = find_full_output(&results_dir);
        match &summary.full_output {
            Some(path) => info!("Found EddyPro full output file {}", path.display()),
            None => info!("No full output file in {} yet", results_dir.display()),
        }
        stage_end(Stage::OutputExistenceCheck);

        if !summary.raw_processing.succeeded() {
            warn!(
                "Raw processing {}, flux correction is skipped",
                summary.raw_processing
            );
        } else if summary.full_output.is_some() {
            warn!("Full output already exists, flux correction is not needed");
        } else {
            stage_start(Stage::FluxProcessingPhase2);
            let outcome = ProcessRunner::new(&flux_correction, &bin_dir).run().await?;
            summary.flux_correction = PhaseOutcome::from_exit_code(outcome.exit_code);
            summary.full_output = find_full_output(&results_dir);
            stage_end(Stage::FluxProcessingPhase2);
        }

        Ok(())
    }

    /// Delete staged ASCII files, keeping the newest one
    ///
    /// Source files used in place are never deleted.
    fn cleanup(&self) -> Result<usize> {
        let staging_dir = &self.ctx.layout().rawdata_ascii;
        if self.ctx.derived.data_path.as_deref() != Some(staging_dir.as_path()) {
            info!("Raw data files were used in place, nothing to delete");
            return Ok(0);
        }

        let pattern = &self.ctx.patterns.staged;
        let files: FileSet = FileLocator::new(staging_dir, pattern)?
            .locate()
            .into_iter()
            .map(|mut file| {
                file.timestamp = pattern.parse_timestamp(&file.name);
                file
            })
            .collect();
        let Some(keep) = files.newest().map(|f| f.name.clone()) else {
            warn!(
                "No staged file name in {} carries a readable date, nothing is deleted",
                staging_dir.display()
            );
            return Ok(0);
        };

        let mut deleted = 0;
        for file in files.iter() {
            if file.name == keep || !file.name.ends_with(ASCII_EXTENSION) {
                continue;
            }
            info!("Deleting uncompressed ASCII file {}", file.path.display());
            fs::remove_file(&file.path).map_err(|e| FluxRunError::io_at(&file.path, e))?;
            deleted += 1;
        }

        info!("Kept newest ASCII file {}", keep);
        Ok(deleted)
    }
}
