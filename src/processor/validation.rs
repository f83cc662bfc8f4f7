//! Numeric content validation of staged raw data files
//!
//! EddyPro stops on the first non-numeric cell it meets in a raw data
//! file. Before handing files over, every body cell of every staged file is
//! checked; cells that are not numbers are replaced with the missing-value
//! marker and the file is rewritten in place with its header lines intact.

use crate::config::HeaderFormat;
use crate::constants::MISSING_VALUE_TEXT;
use crate::error::{FluxRunError, Result};
use crate::models::FileSet;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A file whose columns had to be coerced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedFile {
    pub path: PathBuf,
    /// Variable names (from the first header line) of the coerced columns
    pub columns: Vec<String>,
}

/// Validation results of one run
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub files_checked: usize,
    pub corrected: Vec<CorrectedFile>,
}

impl ValidationReport {
    pub fn columns_corrected(&self) -> usize {
        self.corrected.iter().map(|f| f.columns.len()).sum()
    }
}

fn is_numeric(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

/// Read the first `count` lines verbatim, line endings included
///
/// Also reports whether any content follows the header.
pub fn read_header_lines(path: &Path, count: usize) -> Result<(Vec<String>, bool)> {
    let file = File::open(path).map_err(|e| FluxRunError::io_at(path, e))?;
    let mut reader = BufReader::new(file);
    let mut lines = Vec::with_capacity(count);

    for _ in 0..count {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| FluxRunError::io_at(path, e))?;
        if read == 0 {
            return Ok((lines, false));
        }
        lines.push(line);
    }

    let mut rest = String::new();
    loop {
        rest.clear();
        let read = reader
            .read_line(&mut rest)
            .map_err(|e| FluxRunError::io_at(path, e))?;
        if read == 0 {
            return Ok((lines, false));
        }
        if !rest.trim().is_empty() {
            return Ok((lines, true));
        }
    }
}

/// Read the data body below the header, every column as text
pub fn read_body(path: &Path, header_rows: usize) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_skip_rows(header_rows)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Names of the columns holding at least one non-numeric or empty cell
fn non_numeric_columns(df: &DataFrame) -> Result<Vec<PlSmallStr>> {
    let mut names = Vec::new();
    for column in df.get_columns() {
        let values = column.as_materialized_series().str()?;
        let has_bad_cell = values
            .into_iter()
            .any(|cell| !cell.is_some_and(is_numeric));
        if has_bad_cell {
            names.push(column.name().clone());
        }
    }
    Ok(names)
}

/// Variable names from the first header line
fn header_variables(header: &[String]) -> Vec<String> {
    header
        .first()
        .map(|line| {
            line.trim_end()
                .split(',')
                .map(|name| name.trim().trim_matches('"').to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Checks staged files and coerces non-numeric cells
#[derive(Debug, Clone)]
pub struct NumericValidator {
    header_rows: usize,
}

impl NumericValidator {
    pub fn new(header_format: HeaderFormat) -> Self {
        Self {
            header_rows: header_format.header_rows(),
        }
    }

    /// Validate every file of the set
    pub fn validate_files(&self, files: &FileSet) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        for file in files.iter() {
            let columns = self.validate_file(&file.path)?;
            report.files_checked += 1;
            if !columns.is_empty() {
                report.corrected.push(CorrectedFile {
                    path: file.path.clone(),
                    columns,
                });
            }
        }

        info!(
            "Checked {} files for non-numeric data, {} needed corrections",
            report.files_checked,
            report.corrected.len()
        );
        Ok(report)
    }

    /// Validate one file, returning the names of coerced columns
    ///
    /// Files without issues are not touched. A file that still holds
    /// non-numeric cells after rewriting is an error.
    pub fn validate_file(&self, path: &Path) -> Result<Vec<String>> {
        let (header, has_body) = read_header_lines(path, self.header_rows)?;
        if !has_body {
            debug!("No data rows in {}", path.display());
            return Ok(Vec::new());
        }

        let mut df = self.read(path)?;
        let bad = non_numeric_columns(&df)?;
        if bad.is_empty() {
            return Ok(Vec::new());
        }

        let variables = header_variables(&header);
        let positions: Vec<usize> = bad
            .iter()
            .filter_map(|name| df.get_column_index(name))
            .collect();

        for name in &bad {
            let fixed: StringChunked = df
                .column(name)?
                .as_materialized_series()
                .str()?
                .into_iter()
                .map(|cell| match cell {
                    Some(value) if is_numeric(value) => Some(value.to_string()),
                    _ => Some(MISSING_VALUE_TEXT.to_string()),
                })
                .collect();
            df.with_column(fixed.with_name(name.clone()).into_series())?;
        }

        let columns: Vec<String> = positions
            .iter()
            .map(|&idx| {
                variables
                    .get(idx)
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("column {}", idx + 1))
            })
            .collect();

        for column in &columns {
            warn!(
                "Non-numeric values in column {} of {} replaced with {}",
                column,
                path.display(),
                MISSING_VALUE_TEXT
            );
        }

        self.write(path, &header, &mut df)?;

        let remaining = non_numeric_columns(&self.read(path)?)?;
        if !remaining.is_empty() {
            return Err(FluxRunError::NumericValidationFailed {
                path: path.to_path_buf(),
                reason: format!("{} columns still hold non-numeric data", remaining.len()),
            });
        }

        Ok(columns)
    }

    fn read(&self, path: &Path) -> Result<DataFrame> {
        read_body(path, self.header_rows).map_err(|e| FluxRunError::NumericValidationFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn write(&self, path: &Path, header: &[String], df: &mut DataFrame) -> Result<()> {
        let file = File::create(path).map_err(|e| FluxRunError::io_at(path, e))?;
        let mut writer = BufWriter::new(file);

        for line in header {
            writer
                .write_all(line.as_bytes())
                .map_err(|e| FluxRunError::io_at(path, e))?;
            if !line.ends_with('\n') {
                writer
                    .write_all(b"\n")
                    .map_err(|e| FluxRunError::io_at(path, e))?;
            }
        }

        CsvWriter::new(&mut writer)
            .include_header(false)
            .finish(df)?;
        writer.flush().map_err(|e| FluxRunError::io_at(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateFile;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "TIMESTAMP,U,T_SONIC\n\
                          ts,m/s,K\n\
                          ,R3-50,R3-50\n";

    #[test]
    fn test_clean_file_is_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("S_202401010000.csv");
        let content = format!("{}1,0.5,290.1\n2,0.6,290.2\n", HEADER);
        fs::write(&path, &content).unwrap();

        let columns = NumericValidator::new(HeaderFormat::ThreeRow)
            .validate_file(&path)
            .unwrap();

        assert!(columns.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_non_numeric_cells_become_missing_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("S_202401010000.csv");
        fs::write(
            &path,
            format!("{}1,0.5,290.1\n2,NAN_x,290.2\n3,0.7,\n", HEADER),
        )
        .unwrap();

        let columns = NumericValidator::new(HeaderFormat::ThreeRow)
            .validate_file(&path)
            .unwrap();

        assert_eq!(columns, vec!["U".to_string(), "T_SONIC".to_string()]);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with(HEADER));
        let body: Vec<&str> = rewritten.lines().skip(3).collect();
        assert_eq!(body, vec!["1,0.5,290.1", "2,-9999,290.2", "3,0.7,-9999"]);

        // A second pass finds nothing left to correct
        let again = NumericValidator::new(HeaderFormat::ThreeRow)
            .validate_file(&path)
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_four_row_header_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("S_202401010000.csv");
        let header = "a,b\nu1,u2\ni1,i2\nx1,x2\n";
        fs::write(&path, format!("{}1,bad\n", header)).unwrap();

        let files: FileSet = std::iter::once(CandidateFile::new("S", &path)).collect();
        let report = NumericValidator::new(HeaderFormat::FourRow)
            .validate_files(&files)
            .unwrap();

        assert_eq!(report.files_checked, 1);
        assert_eq!(report.columns_corrected(), 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}1,-9999\n", header)
        );
    }

    #[test]
    fn test_header_only_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("S_202401010000.csv");
        fs::write(&path, HEADER).unwrap();

        let columns = NumericValidator::new(HeaderFormat::ThreeRow)
            .validate_file(&path)
            .unwrap();
        assert!(columns.is_empty());
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result =
            NumericValidator::new(HeaderFormat::ThreeRow).validate_file(&temp_dir.path().join("x"));

        match result.unwrap_err() {
            FluxRunError::IoAt { .. } => {}
            _ => panic!("Expected IoAt error"),
        }
    }
}
