//! Application constants for fluxrun
//!
//! Directory names, file names and markers shared between the pipeline
//! stages and the external EddyPro executables.

// =============================================================================
// Run Directory Layout
// =============================================================================

/// Log files of the run
pub const DIR_LOG: &str = "0_log";

/// Staged (uncompressed, validated) raw data files
pub const DIR_RAWDATA_ASCII: &str = "1-0_rawdata_files_ascii";

/// Raw data availability diagnostics
pub const DIR_PLOTS_AVAILABILITY: &str = "1-1_rawdata_plots_availability";

/// Raw data per-file aggregate diagnostics
pub const DIR_PLOTS_AGGREGATES: &str = "1-2_rawdata_plots_aggregates";

/// Root of everything EddyPro reads and writes
pub const DIR_EDDYPRO: &str = "2-0_eddypro_flux_calculations";

/// EddyPro subfolders below [`DIR_EDDYPRO`]
pub const DIR_EDDYPRO_INI: &str = "ini";
pub const DIR_EDDYPRO_BIN: &str = "bin";
pub const DIR_EDDYPRO_RESULTS: &str = "results";

/// Summary diagnostics of the flux results
pub const DIR_PLOTS_SUMMARY: &str = "2-1_eddypro_flux_calculations_summary_plots";

/// Prefix of every run identifier
pub const RUN_ID_PREFIX: &str = "FR-";

/// strftime format for the timestamp part of a run identifier
pub const RUN_ID_FORMAT: &str = "%Y%m%d-%H%M%S";

// =============================================================================
// Settings
// =============================================================================

/// Current (sectioned YAML) settings file name
pub const SETTINGS_FILE_NAME: &str = "fluxrunsettings.yaml";

/// Legacy flat key=value settings file name
pub const LEGACY_SETTINGS_FILE_NAME: &str = "FluxRun.settings";

/// Date format used for the START_DATE / END_DATE settings
pub const SETTINGS_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

// =============================================================================
// Raw Data Files
// =============================================================================

/// Fixed missing-value marker used in raw data and EddyPro output
pub const MISSING_VALUE: f64 = -9999.0;

/// Text written for a cell replaced by the missing-value marker
pub const MISSING_VALUE_TEXT: &str = "-9999";

/// Extension of uncompressed ASCII raw data files
pub const ASCII_EXTENSION: &str = ".csv";

/// Extension appended by gzip compression
pub const GZIP_EXTENSION: &str = ".gz";

/// Note left in the staging directory when the source files are used in place
pub const STAGING_README_NAME: &str = "readme.txt";

// =============================================================================
// EddyPro
// =============================================================================

/// Canonical name of the staged processing file
pub const PROCESSING_FILE_NAME: &str = "processing.eddypro";

/// Canonical name of the staged metadata file
pub const METADATA_FILE_NAME: &str = "processing.metadata";

/// Extension of the metadata file next to the selected processing file
pub const METADATA_EXTENSION: &str = "metadata";

/// Default folder (next to the fluxrun binary) holding the platform bundles
pub const DEFAULT_APP_DIR_NAME: &str = "eddypro_app";

/// Raw processing phase executable stem
pub const EXE_RAW_PROCESSING: &str = "eddypro_rp";

/// Flux correction phase executable stem
pub const EXE_FLUX_CORRECTION: &str = "eddypro_fcc";

/// Pattern of the final results file written by EddyPro
pub const FULL_OUTPUT_PATTERN: &str = "*_full_output_*.csv";

/// Marker EddyPro prints at the start of every averaging period
pub const NEW_PERIOD_MARKER: &str = "processing new flux averaging period";

// =============================================================================
// Process
// =============================================================================

/// Exit status for any run that was aborted
pub const FATAL_EXIT_CODE: i32 = -1;
