//! Pipeline tests for the processor module
//!
//! Runs the orchestrator against a small site folder with gzip raw data,
//! an EddyPro processing file pair and, on unix, shell scripts standing in
//! for the EddyPro executables.

pub mod basic_processing;

use crate::config::{Compression, Settings};
use crate::models::RunId;
use crate::processor::RunOrchestrator;
use crate::processor::external::{ExecutableStager, Platform};
use chrono::NaiveDate;
use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RAW_HEADER: &str = "TIMESTAMP,U,T_SONIC\nts,m/s,K\n,R3-50,R3-50\n";
pub const RAW_BODY: &str = "1,0.51,290.1\n2,0.62,290.2\n";
pub const RUN_ID: &str = "FR-20240110-120000";

/// Raw data files of the fixture site; the last one is outside the range
pub const RAW_FILES: [&str; 4] = [
    "CH-DAV_202401010000.csv.gz",
    "CH-DAV_202401010030.csv.gz",
    "CH-DAV_202401010100.csv.gz",
    "CH-DAV_202402010000.csv.gz",
];

pub fn write_gz(path: &Path, content: &str) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), GzLevel::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

/// Scratch site with raw data, EddyPro project files and an output folder
pub struct Fixture {
    pub temp_dir: TempDir,
    pub indir: PathBuf,
    pub outdir: PathBuf,
    pub processing_file: PathBuf,
    pub app_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let indir = temp_dir.path().join("raw").join("2024");
        let outdir = temp_dir.path().join("out");
        let ini_dir = temp_dir.path().join("ini");
        let app_dir = temp_dir.path().join("eddypro_app");
        for dir in [&indir, &outdir, &ini_dir, &app_dir] {
            fs::create_dir_all(dir).unwrap();
        }

        for name in RAW_FILES {
            write_gz(&indir.join(name), &format!("{}{}", RAW_HEADER, RAW_BODY));
        }

        let processing_file = ini_dir.join("CH-DAV.eddypro");
        fs::write(
            &processing_file,
            "[Project]\nproject_id=template\nfile_name=C:\\ini\\CH-DAV.eddypro\n\
             proj_file=C:\\ini\\CH-DAV.metadata\n\
             [RawProcess_General]\ndata_path=C:\\raw\nout_path=C:\\out\n\
             file_prototype=CH-DAV_yyyymmddHHMM.csv\n",
        )
        .unwrap();
        fs::write(
            ini_dir.join("CH-DAV.metadata"),
            "[Project]\nfile_name=C:\\ini\\CH-DAV.metadata\n",
        )
        .unwrap();

        Self {
            temp_dir,
            indir,
            outdir,
            processing_file,
            app_dir,
        }
    }

    /// Settings for January 2024 with every optional stage off
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.rawdata.site = "CH-DAV".to_string();
        settings.rawdata.indir = self.temp_dir.path().join("raw");
        settings.rawdata.compression = Compression::Gzip;
        settings.rawdata.start_date = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        settings.rawdata.end_date = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        settings.rawdata.plot_rawdata_availability = false;
        settings.rawdata.plot_rawdata_aggregates = false;
        settings.flux_processing.run_flux_calcs = false;
        settings.flux_processing.eddypro_processing_file = self.processing_file.clone();
        settings.output.outdir = self.outdir.clone();
        settings.output.plot_summary = false;
        settings
    }

    pub fn orchestrator(&self, settings: Settings) -> RunOrchestrator {
        RunOrchestrator::with_run_id(settings, RunId::from(RUN_ID))
            .with_executables(ExecutableStager::new(Platform::Linux, &self.app_dir))
    }

    pub fn run_dir(&self) -> PathBuf {
        self.outdir.join(format!("CH-DAV_{}", RUN_ID))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.run_dir().join("1-0_rawdata_files_ascii")
    }

    /// Fake `eddypro_rp` and `eddypro_fcc` shell scripts
    #[cfg(unix)]
    pub fn write_executables(&self, rp_body: &str, fcc_body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let bundle = self.app_dir.join("linux");
        fs::create_dir_all(&bundle).unwrap();
        for (name, body) in [("eddypro_rp", rp_body), ("eddypro_fcc", fcc_body)] {
            let path = bundle.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }
}

/// Script line that writes a minimal full_output file into `results`
pub const WRITE_FULL_OUTPUT: &str = "printf 'file_info,corrected_fluxes\\nfilename,co2_flux\\n,[umol]\\na.csv,-1.5\\nb.csv,2.5\\n' > ../results/eddypro_CH-DAV_full_output_2024-01-10T120000_adv.csv";

/// Names of the `.csv` files currently in `dir`
pub fn csv_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".csv"))
        .collect();
    names.sort();
    names
}
