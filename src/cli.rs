//! Command-line interface components.

use crate::config::Settings;
use crate::constants::{LEGACY_SETTINGS_FILE_NAME, SETTINGS_FILE_NAME};
use crate::logging;
use crate::models::RunSummary;
use crate::processor::RunOrchestrator;
use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "fluxrun")]
#[command(about = "Stage eddy covariance raw data and run EddyPro flux calculations")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the flux processing pipeline
    Run(RunArgs),
    /// Write a settings file with default values
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Settings file to use
    #[arg(short, long, value_name = "FILE", conflicts_with = "folder")]
    pub settings: Option<PathBuf>,

    /// Folder containing fluxrunsettings.yaml (or a legacy FluxRun.settings)
    #[arg(short, long, value_name = "DIR")]
    pub folder: Option<PathBuf>,

    /// Only process files from the last N days up to now
    #[arg(short, long, value_name = "N")]
    pub days: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only show errors on the console
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl RunArgs {
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Settings file chosen by the flags, or the one in the user config folder
    pub fn settings_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.settings {
            return Ok(path.clone());
        }
        match &self.folder {
            Some(folder) => find_settings_in(folder),
            None => default_settings_path(),
        }
    }
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the settings file
    #[arg(short, long, value_name = "FILE", default_value = SETTINGS_FILE_NAME)]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Settings file in `folder`, preferring the YAML document
pub fn find_settings_in(folder: &Path) -> Result<PathBuf> {
    let yaml = folder.join(SETTINGS_FILE_NAME);
    if yaml.is_file() {
        return Ok(yaml);
    }
    let legacy = folder.join(LEGACY_SETTINGS_FILE_NAME);
    if legacy.is_file() {
        return Ok(legacy);
    }
    anyhow::bail!(
        "No {} or {} found in {}",
        SETTINGS_FILE_NAME,
        LEGACY_SETTINGS_FILE_NAME,
        folder.display()
    )
}

/// `fluxrun/fluxrunsettings.yaml` in the user config folder
pub fn default_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine user config directory")?;
    Ok(config_dir.join("fluxrun").join(SETTINGS_FILE_NAME))
}

/// Load the settings for a run and apply command-line overrides
pub fn load_settings(args: &RunArgs) -> Result<Settings> {
    let path = args.settings_path()?;
    info!("Loading settings from {}", path.display());
    let mut settings = Settings::load(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(days) = args.days {
        settings = settings.with_recent_days(days, Local::now().naive_local());
        settings.validate()?;
        info!(
            "Time range set to the last {} days: {} to {}",
            days, settings.rawdata.start_date, settings.rawdata.end_date
        );
    }

    debug!("Settings: {:?}", settings);
    Ok(settings)
}

/// Run the pipeline once
pub async fn run_pipeline(args: RunArgs) -> Result<RunSummary> {
    let log_files = logging::init(args.log_level(), args.quiet);
    let settings = load_settings(&args)?;

    let summary = RunOrchestrator::new(settings)
        .with_log_files(log_files)
        .with_progress(!args.quiet)
        .run()
        .await?;

    if !args.quiet {
        summary.print();
    }
    Ok(summary)
}

/// Write a default settings document
pub fn write_default_settings(args: &InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite it",
            args.output.display()
        );
    }
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Settings::default().save(&args.output)?;
    println!(
        "{} {}",
        "Settings written to".bright_green(),
        args.output.display()
    );
    Ok(())
}

/// Dispatch a parsed subcommand
pub async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => run_pipeline(args).await.map(|_| ()),
        Commands::Init(args) => write_default_settings(&args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn run_args(argv: &[&str]) -> RunArgs {
        let args = Args::try_parse_from(argv).unwrap();
        match args.command {
            Some(Commands::Run(run)) => run,
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_parse_run_flags() {
        let args = run_args(&["fluxrun", "run", "-f", "/site", "-d", "3", "--verbose"]);

        assert_eq!(args.folder, Some(PathBuf::from("/site")));
        assert_eq!(args.days, Some(3));
        assert_eq!(args.log_level(), "debug");
    }

    #[test]
    fn test_settings_and_folder_conflict() {
        let result =
            Args::try_parse_from(["fluxrun", "run", "--settings", "a.yaml", "--folder", "b"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_folder_prefers_yaml_over_legacy() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(LEGACY_SETTINGS_FILE_NAME), "").unwrap();
        assert_eq!(
            find_settings_in(temp_dir.path()).unwrap(),
            temp_dir.path().join(LEGACY_SETTINGS_FILE_NAME)
        );

        fs::write(temp_dir.path().join(SETTINGS_FILE_NAME), "").unwrap();
        assert_eq!(
            find_settings_in(temp_dir.path()).unwrap(),
            temp_dir.path().join(SETTINGS_FILE_NAME)
        );
    }

    #[test]
    fn test_empty_folder_has_no_settings() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_settings_in(temp_dir.path()).is_err());
    }

    #[test]
    fn test_days_override_applies() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);
        Settings::default().save(&path).unwrap();

        let args = run_args(&["fluxrun", "run", "-s", path.to_str().unwrap(), "-d", "1"]);
        let settings = load_settings(&args).unwrap();

        let today = Local::now().date_naive();
        assert_eq!(settings.rawdata.start_date.date(), today - chrono::Duration::days(1));
        assert_eq!(settings.rawdata.start_date.time(), chrono::NaiveTime::MIN);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let args = InitArgs {
            output: output.clone(),
            force: false,
        };

        write_default_settings(&args).unwrap();
        assert!(Settings::load(&output).is_ok());
        assert!(write_default_settings(&args).is_err());
    }
}
