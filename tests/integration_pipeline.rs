//! Integration tests for the fluxrun pipeline
//!
//! These tests drive the public API the way the command line does: a
//! settings document on disk is loaded and handed to the orchestrator.

use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use fluxrun::{FluxRunError, RunId, RunOrchestrator, Settings};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

const RAW: &str = "TIMESTAMP,U,V,W\n\
                   ts,m/s,m/s,m/s\n\
                   ,R3-50,R3-50,R3-50\n\
                   1,0.1,0.2,0.01\n\
                   2,0.3,X,0.02\n\
                   3,0.5,0.6,0.03\n";

fn write_gz(path: &Path, content: &str) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), GzLevel::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn yaml_settings(indir: &Path, outdir: &Path, processing_file: &Path) -> String {
    format!(
        r#"RAWDATA:
  SITE: CH-AWS
  INDIR: {}
  FILENAME_DATETIME_FORMAT: yyyymmddHHMM
  COMPRESSION: gzip
  HEADER_FORMAT: 3-row header (bico files)
  START_DATE: 2023-07-01 00:00
  END_DATE: 2023-07-01 23:59
  VALIDATE_NUMERIC: 1
  PLOT_RAWDATA_AVAILABILITY: 1
  PLOT_RAWDATA_AGGREGATES: 1
FLUX_PROCESSING:
  RUN_FLUX_CALCS: 0
  EDDYPRO_PROCESSING_FILE: {}
OUTPUT:
  OUTDIR: {}
  OUTDIR_PREFIX: TEST
  PLOT_SUMMARY: 0
AFTER PROCESSING:
  DELETE_UNCOMPRESSED_ASCII_AFTER_PROCESSING: 1
"#,
        indir.display(),
        processing_file.display(),
        outdir.display()
    )
}

fn setup_site(temp_dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let indir = temp_dir.path().join("raw");
    let outdir = temp_dir.path().join("out");
    fs::create_dir_all(&indir).unwrap();
    fs::create_dir_all(&outdir).unwrap();

    for name in [
        "CH-AWS_202307010000.csv.gz",
        "CH-AWS_202307010030.csv.gz",
        "CH-AWS_202307020000.csv.gz",
        "CH-AWS_notadate0000.csv.gz",
    ] {
        write_gz(&indir.join(name), RAW);
    }
    (indir, outdir)
}

#[tokio::test]
async fn test_yaml_settings_run() {
    let temp_dir = TempDir::new().unwrap();
    let (indir, outdir) = setup_site(&temp_dir);
    let settings_path = temp_dir.path().join("fluxrunsettings.yaml");
    fs::write(
        &settings_path,
        yaml_settings(&indir, &outdir, &temp_dir.path().join("x.eddypro")),
    )
    .unwrap();

    let settings = Settings::load(&settings_path).unwrap();
    let summary = RunOrchestrator::with_run_id(settings, RunId::from("FR-20230702-080000"))
        .run()
        .await
        .unwrap();

    let run_dir = outdir.join("TEST_FR-20230702-080000");
    assert_eq!(summary.run_dir, run_dir);
    assert_eq!(summary.files_found, 2);
    assert_eq!(summary.files_outside_window, 2);
    assert_eq!(summary.columns_corrected, 2);
    assert_eq!(summary.files_deleted, 1);

    let staging = run_dir.join("1-0_rawdata_files_ascii");
    let kept = fs::read_to_string(staging.join("CH-AWS_202307010030.csv")).unwrap();
    assert!(kept.contains("2,0.3,-9999,0.02"));
    assert!(!staging.join("CH-AWS_202307010000.csv").exists());

    let aggregates = run_dir
        .join("1-2_rawdata_plots_aggregates")
        .join("FR-20230702-080000_rawdata_aggregates.csv");
    let text = fs::read_to_string(aggregates).unwrap();
    assert!(text.contains("CH-AWS_202307010000.csv,V,2,0.4"));

    let archived = Settings::load(&run_dir.join("fluxrunsettings.yaml")).unwrap();
    assert_eq!(archived.output.outdir_prefix, "TEST");
}

#[tokio::test]
async fn test_legacy_settings_run_fails_on_empty_range() {
    let temp_dir = TempDir::new().unwrap();
    let (indir, outdir) = setup_site(&temp_dir);
    let settings_path = temp_dir.path().join("FluxRun.settings");
    fs::write(
        &settings_path,
        format!(
            "site=CH-AWS\n\
             rawdata_indir={}\n\
             rawdata_start_date=2022-01-01 00:00\n\
             rawdata_end_date=2022-01-31 23:30\n\
             rawdata_filename_datetime_format=yyyymmddHHMM\n\
             rawdata_file_compression=gzip\n\
             path_selected_eddypro_processing_file=/nowhere/x.eddypro\n\
             dir_out={}\n\
             plot_availability_rawdata=0\n\
             plot_aggregates_rawdata=0\n\
             plot_summary=0\n\
             delete_uncompressed_ascii_after_processing=0\n",
            indir.display(),
            outdir.display()
        ),
    )
    .unwrap();

    let settings = Settings::load(&settings_path).unwrap();
    let error = RunOrchestrator::new(settings).run().await.unwrap_err();

    assert_eq!(error.exit_code(), -1);
    match error {
        FluxRunError::NoRawDataFiles { dir, .. } => assert_eq!(dir, indir),
        _ => panic!("Expected NoRawDataFiles error"),
    }
}
