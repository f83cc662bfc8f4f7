//! Settings management and validation.
//!
//! The settings document is the only user-supplied input of a run. Two
//! on-disk schemas exist: the current sectioned YAML document and the flat
//! `key=value` file written by early releases. Both are adapted into the
//! same [`Settings`] structure so the pipeline only ever sees one shape.

use crate::constants::{LEGACY_SETTINGS_FILE_NAME, SETTINGS_DATE_FORMAT};
use crate::error::{FluxRunError, Result};
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Compression of the raw data files in the source directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Plain ASCII files, used as they are
    #[serde(rename = "None", alias = "none")]
    None,
    /// gzip archives, extracted into the run before processing
    #[serde(rename = "gzip", alias = "gz", alias = ".gz")]
    Gzip,
}

impl FromStr for Compression {
    type Err = FluxRunError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "None" | "none" | "" => Ok(Compression::None),
            "gzip" | "gz" | ".gz" => Ok(Compression::Gzip),
            other => Err(FluxRunError::settings(format!(
                "Unknown raw data compression '{}', expected 'None' or 'gzip'",
                other
            ))),
        }
    }
}

/// Number of header rows at the top of every raw data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HeaderFormat {
    /// Variable, units, instrument (bico files)
    ThreeRow,
    /// Variable, units, instrument, extra info (rECord files)
    FourRow,
}

impl HeaderFormat {
    /// Number of lines preceding the data body
    pub fn header_rows(&self) -> usize {
        match self {
            HeaderFormat::ThreeRow => 3,
            HeaderFormat::FourRow => 4,
        }
    }
}

impl fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderFormat::ThreeRow => write!(f, "3-row header (bico files)"),
            HeaderFormat::FourRow => write!(f, "4-row header (rECord files)"),
        }
    }
}

impl FromStr for HeaderFormat {
    type Err = FluxRunError;

    fn from_str(value: &str) -> Result<Self> {
        // The GUI stores the full combobox label, older files only the number
        let value = value.trim();
        if value.starts_with('3') {
            Ok(HeaderFormat::ThreeRow)
        } else if value.starts_with('4') {
            Ok(HeaderFormat::FourRow)
        } else {
            Err(FluxRunError::settings(format!(
                "Unknown header format '{}', expected a 3-row or 4-row header",
                value
            )))
        }
    }
}

impl TryFrom<String> for HeaderFormat {
    type Error = FluxRunError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<HeaderFormat> for String {
    fn from(format: HeaderFormat) -> Self {
        format.to_string()
    }
}

/// Raw data selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RawDataSettings {
    /// Site identifier, the prefix of every raw data filename
    pub site: String,

    /// Folder searched recursively for raw data files
    pub indir: PathBuf,

    /// Datetime token string of the filenames, e.g. `yyyymmddHHMM`
    pub filename_datetime_format: String,

    /// Compression of the source files
    pub compression: Compression,

    /// Header convention of the ASCII files
    pub header_format: HeaderFormat,

    /// First file timestamp to use (inclusive)
    #[serde(with = "settings_date")]
    pub start_date: NaiveDateTime,

    /// Last file timestamp to use (inclusive)
    #[serde(with = "settings_date")]
    pub end_date: NaiveDateTime,

    /// Check staged files for non-numeric cells before processing
    #[serde(default = "enabled", with = "flag")]
    pub validate_numeric: bool,

    /// Write the file availability table
    #[serde(default, with = "flag")]
    pub plot_rawdata_availability: bool,

    /// Write per-file aggregate statistics
    #[serde(default, with = "flag")]
    pub plot_rawdata_aggregates: bool,
}

/// EddyPro settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FluxProcessingSettings {
    /// Run the external flux calculations at all
    #[serde(default = "enabled", with = "flag")]
    pub run_flux_calcs: bool,

    /// Selected `*.eddypro` processing file used as template
    pub eddypro_processing_file: PathBuf,

    /// Folder holding the per-platform EddyPro bundles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eddypro_app_dir: Option<PathBuf>,
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OutputSettings {
    /// Folder that receives one subfolder per run
    pub outdir: PathBuf,

    /// Replaces the site in the run folder name when not empty
    #[serde(default)]
    pub outdir_prefix: String,

    /// Write summary statistics of the EddyPro full_output file
    #[serde(default, with = "flag")]
    pub plot_summary: bool,
}

/// Settings applied after the flux calculations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AfterProcessingSettings {
    /// Remove staged ASCII files once the run is done
    #[serde(default, with = "flag")]
    pub delete_uncompressed_ascii_after_processing: bool,
}

/// Complete user-supplied configuration of one run
///
/// Nothing derived at runtime lives here; see `models::DerivedPaths`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "RAWDATA")]
    pub rawdata: RawDataSettings,

    #[serde(rename = "FLUX_PROCESSING")]
    pub flux_processing: FluxProcessingSettings,

    #[serde(rename = "OUTPUT")]
    pub output: OutputSettings,

    #[serde(rename = "AFTER PROCESSING", default)]
    pub after_processing: AfterProcessingSettings,
}

/// On-disk settings schemas understood by [`Settings::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    /// Sectioned YAML document
    Yaml,
    /// Flat `key=value` lines of the first releases
    Legacy,
}

impl SettingsFormat {
    /// Pick the schema from the file name
    pub fn detect(path: &Path) -> Self {
        let is_legacy = path
            .file_name()
            .is_some_and(|name| name == LEGACY_SETTINGS_FILE_NAME)
            || path.extension().is_some_and(|ext| ext == "settings");
        if is_legacy {
            SettingsFormat::Legacy
        } else {
            SettingsFormat::Yaml
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let start_date = NaiveDateTime::parse_from_str("2024-01-01 00:00", SETTINGS_DATE_FORMAT)
            .unwrap_or_default();
        let end_date = start_date + Duration::days(31) - Duration::minutes(1);

        Self {
            rawdata: RawDataSettings {
                site: "CH-DAV".to_string(),
                indir: PathBuf::from("rawdata"),
                filename_datetime_format: "yyyymmddHHMM".to_string(),
                compression: Compression::Gzip,
                header_format: HeaderFormat::ThreeRow,
                start_date,
                end_date,
                validate_numeric: true,
                plot_rawdata_availability: true,
                plot_rawdata_aggregates: false,
            },
            flux_processing: FluxProcessingSettings {
                run_flux_calcs: true,
                eddypro_processing_file: PathBuf::from("processing.eddypro"),
                eddypro_app_dir: None,
            },
            output: OutputSettings {
                outdir: PathBuf::from("output"),
                outdir_prefix: String::new(),
                plot_summary: true,
            },
            after_processing: AfterProcessingSettings {
                delete_uncompressed_ascii_after_processing: false,
            },
        }
    }
}

impl Settings {
    /// Load settings from disk, adapting the schema found in the file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FluxRunError::io_at(path, e))?;
        let format = SettingsFormat::detect(path);
        debug!("Reading {:?} settings from {}", format, path.display());

        let settings = match format {
            SettingsFormat::Yaml => Self::from_yaml(&text, path)?,
            SettingsFormat::Legacy => legacy::parse(&text, path)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Parse the sectioned YAML document
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| FluxRunError::SettingsParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Serialize to the sectioned YAML document
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| FluxRunError::settings(e.to_string()))
    }

    /// Write the settings as YAML
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_yaml()?).map_err(|e| FluxRunError::io_at(path, e))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.rawdata.site.trim().is_empty() {
            return Err(FluxRunError::settings("SITE must not be empty"));
        }

        if self.rawdata.filename_datetime_format.trim().is_empty() {
            return Err(FluxRunError::settings(
                "FILENAME_DATETIME_FORMAT must not be empty",
            ));
        }

        if self.rawdata.start_date > self.rawdata.end_date {
            return Err(FluxRunError::settings(format!(
                "START_DATE {} is after END_DATE {}",
                self.rawdata.start_date, self.rawdata.end_date
            )));
        }

        if self.flux_processing.run_flux_calcs
            && self.flux_processing.eddypro_processing_file.as_os_str().is_empty()
        {
            return Err(FluxRunError::settings(
                "EDDYPRO_PROCESSING_FILE is required when RUN_FLUX_CALCS is enabled",
            ));
        }

        Ok(())
    }

    /// Name used in front of the run id for the run folder
    pub fn prefix_or_site(&self) -> &str {
        let prefix = self.output.outdir_prefix.trim();
        if prefix.is_empty() {
            &self.rawdata.site
        } else {
            prefix
        }
    }

    /// Restrict the time range to the most recent `days` days
    ///
    /// The start falls on midnight `days` days before `now`; the end is `now`
    /// truncated to the minute.
    pub fn with_recent_days(mut self, days: u32, now: NaiveDateTime) -> Self {
        let start_day = now.date() - Duration::days(i64::from(days));
        self.rawdata.start_date = start_day.and_time(NaiveTime::MIN);
        self.rawdata.end_date = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        self
    }

    /// Resolve every relative path against the working directory
    ///
    /// EddyPro runs inside the run's `bin/` folder, so the paths rendered
    /// into its project files and the executables must not be relative.
    pub fn with_absolute_paths(mut self) -> Self {
        self.rawdata.indir = absolute(&self.rawdata.indir);
        self.flux_processing.eddypro_processing_file =
            absolute(&self.flux_processing.eddypro_processing_file);
        self.flux_processing.eddypro_app_dir = self
            .flux_processing
            .eddypro_app_dir
            .as_deref()
            .map(absolute);
        self.output.outdir = absolute(&self.output.outdir);
        self
    }
}

/// `path` resolved against the working directory, unchanged if it cannot be
fn absolute(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn enabled() -> bool {
    true
}

/// Legacy flat settings file (`FluxRun.settings`)
mod legacy {
    use super::*;

    /// Keys that carry no user setting in legacy files
    fn is_derived(key: &str) -> bool {
        key.starts_with('_')
    }

    struct Values<'a> {
        map: HashMap<String, String>,
        path: &'a Path,
    }

    impl Values<'_> {
        fn error(&self, reason: String) -> FluxRunError {
            FluxRunError::SettingsParse {
                path: self.path.to_path_buf(),
                reason,
            }
        }

        fn get(&self, key: &str) -> Result<&str> {
            self.map
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| self.error(format!("missing key '{}'", key)))
        }

        fn flag(&self, key: &str) -> bool {
            self.map.get(key).is_some_and(|v| flag::parse_text(v))
        }

        fn date(&self, key: &str) -> Result<NaiveDateTime> {
            let raw = self.get(key)?;
            NaiveDateTime::parse_from_str(raw, SETTINGS_DATE_FORMAT)
                .map_err(|e| self.error(format!("invalid date '{}' for '{}': {}", raw, key, e)))
        }
    }

    pub(super) fn parse(text: &str, path: &Path) -> Result<Settings> {
        let mut map = HashMap::new();
        for line in text.lines() {
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            if is_derived(key) {
                continue;
            }
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
        let values = Values { map, path };

        let header_format = match values.map.get("rawdata_header_format") {
            Some(value) => value.parse()?,
            None => HeaderFormat::ThreeRow,
        };

        Ok(Settings {
            rawdata: RawDataSettings {
                site: values.get("site")?.to_string(),
                indir: PathBuf::from(values.get("rawdata_indir")?),
                filename_datetime_format: values
                    .get("rawdata_filename_datetime_format")?
                    .to_string(),
                compression: values.get("rawdata_file_compression")?.parse()?,
                header_format,
                start_date: values.date("rawdata_start_date")?,
                end_date: values.date("rawdata_end_date")?,
                validate_numeric: true,
                plot_rawdata_availability: values.flag("plot_availability_rawdata"),
                plot_rawdata_aggregates: values.flag("plot_aggregates_rawdata"),
            },
            flux_processing: FluxProcessingSettings {
                run_flux_calcs: true,
                eddypro_processing_file: PathBuf::from(
                    values.get("path_selected_eddypro_processing_file")?,
                ),
                eddypro_app_dir: None,
            },
            output: OutputSettings {
                outdir: PathBuf::from(values.get("dir_out")?),
                outdir_prefix: String::new(),
                plot_summary: values.flag("plot_summary"),
            },
            after_processing: AfterProcessingSettings {
                delete_uncompressed_ascii_after_processing: values
                    .flag("delete_uncompressed_ascii_after_processing"),
            },
        })
    }
}

/// `0`/`1` switches, also accepting booleans and quoted digits
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    pub fn parse_text(value: &str) -> bool {
        matches!(value.trim(), "1" | "true" | "True" | "yes")
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bool(value) => value,
            Repr::Int(value) => value != 0,
            Repr::Text(value) => parse_text(&value),
        })
    }
}

/// `%Y-%m-%d %H:%M` timestamps
mod settings_date {
    use super::SETTINGS_DATE_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(SETTINGS_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), SETTINGS_DATE_FORMAT).map_err(D::Error::custom)
    }
}
