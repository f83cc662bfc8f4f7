//! EddyPro preparation
//!
//! Renders the run's own copies of the selected `*.eddypro` processing file
//! and its `*.metadata` companion, and stages the platform executables into
//! the run's `bin` folder.

use crate::constants::{
    DEFAULT_APP_DIR_NAME, EXE_FLUX_CORRECTION, EXE_RAW_PROCESSING, METADATA_EXTENSION,
    METADATA_FILE_NAME, PROCESSING_FILE_NAME,
};
use crate::error::{FluxRunError, Result};
use crate::ini::{ProjectFile, config_path};
use crate::models::RunContext;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Host platforms with bundled executables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    /// Platform of the running binary
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            other => Err(FluxRunError::UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }

    /// Subfolder of the app folder holding this platform's bundle
    pub fn dir_name(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
        }
    }

    pub fn executable_name(&self, stem: &str) -> String {
        match self {
            Platform::Windows => format!("{}.exe", stem),
            Platform::Linux | Platform::MacOs => stem.to_string(),
        }
    }
}

/// `eddypro_app` next to the running binary
pub fn default_app_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(DEFAULT_APP_DIR_NAME))
}

/// Metadata file expected next to a processing file
pub fn metadata_path_for(processing_file: &Path) -> PathBuf {
    processing_file.with_extension(METADATA_EXTENSION)
}

/// Find the metadata file belonging to the processing file
///
/// Only the exact name in the same folder is accepted.
pub fn locate_metadata_file(processing_file: &Path) -> Result<PathBuf> {
    let expected = metadata_path_for(processing_file);
    if expected.is_file() {
        info!("Found metadata file {}", expected.display());
        return Ok(expected);
    }

    Err(FluxRunError::MetadataFileMissing {
        dir: processing_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        expected: expected
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

fn set_logged(file: &mut ProjectFile, key: &str, value: String, target: &Path) {
    if file.set(key, value.as_str()) == 0 {
        warn!("Key {} not found in {}", key, target.display());
    } else {
        debug!("{}: {}={}", target.display(), key, value);
    }
}

/// Render `ini/processing.eddypro` and `ini/processing.metadata`
///
/// Returns the paths of both rendered files.
pub fn render_project_files(ctx: &RunContext) -> Result<(PathBuf, PathBuf)> {
    let template = &ctx.settings.flux_processing.eddypro_processing_file;
    let mut processing = ProjectFile::load(template)?;
    let metadata_template = locate_metadata_file(template)?;
    let mut metadata = ProjectFile::load(&metadata_template)?;

    let layout = ctx.layout();
    let processing_path = layout.eddypro_ini.join(PROCESSING_FILE_NAME);
    let metadata_path = layout.eddypro_ini.join(METADATA_FILE_NAME);
    let data_path = ctx
        .derived
        .data_path
        .clone()
        .unwrap_or_else(|| layout.rawdata_ascii.clone());

    set_logged(
        &mut processing,
        "out_path",
        config_path(&layout.eddypro_results),
        &processing_path,
    );
    set_logged(
        &mut processing,
        "proj_file",
        config_path(&metadata_path),
        &processing_path,
    );
    set_logged(
        &mut processing,
        "file_name",
        config_path(&processing_path),
        &processing_path,
    );
    set_logged(
        &mut processing,
        "data_path",
        config_path(&data_path),
        &processing_path,
    );
    set_logged(
        &mut processing,
        "file_prototype",
        ctx.patterns.prototype().to_string(),
        &processing_path,
    );
    set_logged(
        &mut processing,
        "project_id",
        ctx.project_id(),
        &processing_path,
    );
    set_logged(
        &mut metadata,
        "file_name",
        config_path(&metadata_path),
        &metadata_path,
    );

    processing.write(&processing_path)?;
    metadata.write(&metadata_path)?;
    info!("Wrote {}", processing_path.display());
    info!("Wrote {}", metadata_path.display());

    Ok((processing_path, metadata_path))
}

/// Copies the platform bundle into the run
#[derive(Debug, Clone)]
pub struct ExecutableStager {
    platform: Platform,
    app_dir: PathBuf,
}

impl ExecutableStager {
    pub fn new(platform: Platform, app_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            app_dir: app_dir.into(),
        }
    }

    /// Stager for the host platform, using `app_dir` or the default bundle
    pub fn for_host(app_dir: Option<&Path>) -> Result<Self> {
        let app_dir = match app_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_app_dir()?,
        };
        Ok(Self::new(Platform::current()?, app_dir))
    }

    pub fn source_dir(&self) -> PathBuf {
        self.app_dir.join(self.platform.dir_name())
    }

    /// Copy every bundle file into `bin_dir` and return both executables
    pub fn stage(&self, bin_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let source = self.source_dir();
        if source.is_dir() {
            let mut copied = 0;
            for entry in WalkDir::new(&source).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let target = bin_dir.join(entry.file_name());
                fs::copy(entry.path(), &target).map_err(|e| FluxRunError::io_at(&target, e))?;
                copied += 1;
            }
            info!(
                "Copied {} files from {} to {}",
                copied,
                source.display(),
                bin_dir.display()
            );
        } else {
            warn!("EddyPro folder {} does not exist", source.display());
        }

        let raw_processing = self.require(bin_dir, EXE_RAW_PROCESSING)?;
        let flux_correction = self.require(bin_dir, EXE_FLUX_CORRECTION)?;
        Ok((raw_processing, flux_correction))
    }

    fn require(&self, bin_dir: &Path, stem: &str) -> Result<PathBuf> {
        let name = self.platform.executable_name(stem);
        let path = bin_dir.join(&name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(FluxRunError::ExecutableMissing {
                name,
                dir: bin_dir.to_path_buf(),
            })
        }
    }
}
