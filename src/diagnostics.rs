//! Run diagnostics.
//!
//! Three optional products describe the data of a run: which raw data files
//! were available, per-file aggregate statistics of every raw variable, and
//! summary statistics of the final EddyPro results. They are produced
//! through [`DiagnosticsSink`]; [`CsvDiagnostics`] writes them as tables.

use crate::constants::MISSING_VALUE;
use crate::error::{FluxRunError, Result};
use crate::layout::RunDirectoryLayout;
use crate::models::{FileSet, RunId};
use crate::processor::validation::{read_body, read_header_lines};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Receiver of the diagnostics of one run
pub trait DiagnosticsSink {
    /// Record which files were found for the time range
    fn availability(&mut self, files: &FileSet) -> Result<PathBuf>;

    /// Record aggregate statistics of every variable in every file
    fn aggregates(&mut self, files: &FileSet, header_rows: usize) -> Result<PathBuf>;

    /// Record statistics of the EddyPro full_output results
    fn summary(&mut self, full_output: &Path) -> Result<PathBuf>;
}

/// Statistics of one numeric column, missing values excluded
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
}

impl ColumnStats {
    /// Statistics of the numeric content of a text column
    ///
    /// Returns `None` when the column holds no usable number.
    pub fn from_column(column: &Column) -> Result<Option<Self>> {
        let numeric = column
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        let values: Float64Chunked = numeric
            .f64()?
            .into_iter()
            .filter(|v| v.is_some_and(|x| x != MISSING_VALUE && x.is_finite()))
            .collect();

        if values.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            count: values.len(),
            mean: values.mean(),
            min: values.min(),
            max: values.max(),
            std: values.std(1),
            median: values.median(),
        }))
    }
}

/// Column-oriented buffer for a statistics table
#[derive(Debug, Default)]
struct StatsTable {
    file: Vec<String>,
    variable: Vec<String>,
    count: Vec<u64>,
    mean: Vec<Option<f64>>,
    min: Vec<Option<f64>>,
    max: Vec<Option<f64>>,
    std: Vec<Option<f64>>,
    median: Vec<Option<f64>>,
}

impl StatsTable {
    fn push(&mut self, file: &str, variable: &str, stats: ColumnStats) {
        self.file.push(file.to_string());
        self.variable.push(variable.to_string());
        self.count.push(stats.count as u64);
        self.mean.push(stats.mean);
        self.min.push(stats.min);
        self.max.push(stats.max);
        self.std.push(stats.std);
        self.median.push(stats.median);
    }

    fn into_frame(self, with_file: bool) -> Result<DataFrame> {
        let mut df = df!(
            "variable" => self.variable,
            "count" => self.count,
            "mean" => self.mean,
            "min" => self.min,
            "max" => self.max,
            "std" => self.std,
            "median" => self.median,
        )?;
        if with_file {
            df.insert_column(0, Column::new("file".into(), self.file))?;
        }
        Ok(df)
    }
}

fn write_frame(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path).map_err(|e| FluxRunError::io_at(path, e))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!("Wrote {} ({} rows)", path.display(), df.height());
    Ok(())
}

/// Writes diagnostics as CSV tables into the run folders
#[derive(Debug, Clone)]
pub struct CsvDiagnostics {
    availability_dir: PathBuf,
    aggregates_dir: PathBuf,
    summary_dir: PathBuf,
    run_id: RunId,
}

impl CsvDiagnostics {
    pub fn new(layout: &RunDirectoryLayout, run_id: &RunId) -> Self {
        Self {
            availability_dir: layout.plots_availability.clone(),
            aggregates_dir: layout.plots_aggregates.clone(),
            summary_dir: layout.plots_summary.clone(),
            run_id: run_id.clone(),
        }
    }

    fn output_path(&self, dir: &Path, product: &str) -> PathBuf {
        dir.join(format!("{}_{}.csv", self.run_id, product))
    }
}

impl DiagnosticsSink for CsvDiagnostics {
    fn availability(&mut self, files: &FileSet) -> Result<PathBuf> {
        let mut names = Vec::with_capacity(files.len());
        let mut timestamps = Vec::with_capacity(files.len());
        let mut sizes = Vec::with_capacity(files.len());

        for file in files.iter() {
            names.push(file.name.clone());
            timestamps.push(
                file.timestamp
                    .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string()),
            );
            sizes.push(fs::metadata(&file.path).ok().map(|m| m.len()));
        }

        let mut df = df!(
            "file" => names,
            "timestamp" => timestamps,
            "size_bytes" => sizes,
        )?;

        let path = self.output_path(&self.availability_dir, "rawdata_availability");
        write_frame(&path, &mut df)?;
        Ok(path)
    }

    fn aggregates(&mut self, files: &FileSet, header_rows: usize) -> Result<PathBuf> {
        let mut table = StatsTable::default();

        for file in files.iter() {
            let (header, has_body) = read_header_lines(&file.path, header_rows)?;
            if !has_body {
                debug!("No data rows in {}", file.path.display());
                continue;
            }
            let variables: Vec<String> = header
                .first()
                .map(|line| line.trim_end().split(',').map(|v| v.trim().to_string()).collect())
                .unwrap_or_default();

            let df = read_body(&file.path, header_rows)?;
            for (idx, column) in df.get_columns().iter().enumerate() {
                let variable = variables
                    .get(idx)
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .unwrap_or_else(|| column.name().to_string());
                if let Some(stats) = ColumnStats::from_column(column)? {
                    table.push(&file.name, &variable, stats);
                }
            }
        }

        let mut df = table.into_frame(true)?;
        let path = self.output_path(&self.aggregates_dir, "rawdata_aggregates");
        write_frame(&path, &mut df)?;
        Ok(path)
    }

    fn summary(&mut self, full_output: &Path) -> Result<PathBuf> {
        // full_output: group row, variable names, units, then data
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_skip_rows(1)
            .with_skip_rows_after_header(1)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(full_output.to_path_buf()))?
            .finish()?;

        let mut table = StatsTable::default();
        let source = full_output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for column in df.get_columns() {
            if let Some(stats) = ColumnStats::from_column(column)? {
                table.push(&source, column.name(), stats);
            }
        }

        let mut df = table.into_frame(false)?;
        let path = self.output_path(&self.summary_dir, "flux_summary");
        write_frame(&path, &mut df)?;
        Ok(path)
    }
}
