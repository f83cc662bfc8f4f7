//! Run directory layout.

use crate::constants::{
    DIR_EDDYPRO, DIR_EDDYPRO_BIN, DIR_EDDYPRO_INI, DIR_EDDYPRO_RESULTS, DIR_LOG,
    DIR_PLOTS_AGGREGATES, DIR_PLOTS_AVAILABILITY, DIR_PLOTS_SUMMARY, DIR_RAWDATA_ASCII,
};
use crate::error::{FluxRunError, Result};
use crate::models::RunId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Every folder of one run, rooted at `{outdir}/{prefix_or_site}_{run_id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectoryLayout {
    pub root: PathBuf,
    pub log: PathBuf,
    pub rawdata_ascii: PathBuf,
    pub plots_availability: PathBuf,
    pub plots_aggregates: PathBuf,
    pub eddypro: PathBuf,
    pub eddypro_ini: PathBuf,
    pub eddypro_bin: PathBuf,
    pub eddypro_results: PathBuf,
    pub plots_summary: PathBuf,
}

impl RunDirectoryLayout {
    /// Compute the layout without touching the filesystem
    pub fn new(outdir: &Path, prefix_or_site: &str, run_id: &RunId) -> Self {
        let root = outdir.join(format!("{}_{}", prefix_or_site, run_id));
        let eddypro = root.join(DIR_EDDYPRO);

        Self {
            log: root.join(DIR_LOG),
            rawdata_ascii: root.join(DIR_RAWDATA_ASCII),
            plots_availability: root.join(DIR_PLOTS_AVAILABILITY),
            plots_aggregates: root.join(DIR_PLOTS_AGGREGATES),
            eddypro_ini: eddypro.join(DIR_EDDYPRO_INI),
            eddypro_bin: eddypro.join(DIR_EDDYPRO_BIN),
            eddypro_results: eddypro.join(DIR_EDDYPRO_RESULTS),
            plots_summary: root.join(DIR_PLOTS_SUMMARY),
            eddypro,
            root,
        }
    }

    /// All folders, parents before children
    pub fn directories(&self) -> [&Path; 10] {
        [
            &self.root,
            &self.log,
            &self.rawdata_ascii,
            &self.plots_availability,
            &self.plots_aggregates,
            &self.eddypro,
            &self.eddypro_ini,
            &self.eddypro_bin,
            &self.eddypro_results,
            &self.plots_summary,
        ]
    }

    /// Create every missing folder; existing ones are left as they are
    pub fn create(&self) -> Result<()> {
        for dir in self.directories() {
            if dir.is_dir() {
                continue;
            }
            fs::create_dir_all(dir).map_err(|e| FluxRunError::io_at(dir, e))?;
            debug!("Created directory {}", dir.display());
        }
        Ok(())
    }
}
