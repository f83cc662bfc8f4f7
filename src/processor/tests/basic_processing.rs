//! Basic processing pipeline tests

use super::*;
use crate::config::Compression;
use crate::models::PhaseOutcome;

#[tokio::test]
async fn test_gzip_pipeline_without_flux_calcs() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.rawdata.plot_rawdata_availability = true;

    let summary = fixture.orchestrator(settings).run().await.unwrap();

    assert_eq!(summary.run_dir, fixture.run_dir());
    assert_eq!(summary.files_found, 3);
    assert_eq!(summary.files_outside_window, 1);
    assert_eq!(summary.files_staged, 3);
    assert_eq!(summary.files_failed, 0);
    assert_eq!(summary.raw_processing, PhaseOutcome::Skipped);
    assert_eq!(summary.flux_correction, PhaseOutcome::Skipped);

    assert_eq!(
        csv_files(&fixture.staging_dir()),
        vec![
            "CH-DAV_202401010000.csv",
            "CH-DAV_202401010030.csv",
            "CH-DAV_202401010100.csv"
        ]
    );
    assert_eq!(
        fs::read_to_string(fixture.staging_dir().join("CH-DAV_202401010000.csv")).unwrap(),
        format!("{}{}", RAW_HEADER, RAW_BODY)
    );

    // Settings archived in the run folder
    assert!(fixture.run_dir().join("fluxrunsettings.yaml").is_file());

    let availability = fixture
        .run_dir()
        .join("1-1_rawdata_plots_availability")
        .join(format!("{}_rawdata_availability.csv", RUN_ID));
    let text = fs::read_to_string(availability).unwrap();
    assert_eq!(text.lines().count(), 4);
}

#[tokio::test]
async fn test_uncompressed_files_used_in_place() {
    let fixture = Fixture::new();
    let plain_dir = fixture.temp_dir.path().join("plain");
    fs::create_dir_all(&plain_dir).unwrap();
    fs::write(
        plain_dir.join("CH-DAV_202401050000.csv"),
        format!("{}{}", RAW_HEADER, RAW_BODY),
    )
    .unwrap();

    let mut settings = fixture.settings();
    settings.rawdata.indir = plain_dir.clone();
    settings.rawdata.compression = Compression::None;
    settings.rawdata.validate_numeric = false;

    let orchestrator = fixture.orchestrator(settings);
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.files_staged, 1);
    assert!(csv_files(&fixture.staging_dir()).is_empty());
    let readme = fs::read_to_string(fixture.staging_dir().join("readme.txt")).unwrap();
    assert!(readme.contains(&plain_dir.display().to_string()));
}

#[tokio::test]
async fn test_validation_corrects_staged_copy_only() {
    let fixture = Fixture::new();
    let plain_dir = fixture.temp_dir.path().join("plain");
    fs::create_dir_all(&plain_dir).unwrap();
    let source = plain_dir.join("CH-DAV_202401050000.csv");
    let original = format!("{}1,0.51,290.1\n2,ERR,290.2\n", RAW_HEADER);
    fs::write(&source, &original).unwrap();

    let mut settings = fixture.settings();
    settings.rawdata.indir = plain_dir;
    settings.rawdata.compression = Compression::None;
    settings.rawdata.validate_numeric = true;

    let summary = fixture.orchestrator(settings).run().await.unwrap();

    assert_eq!(summary.columns_corrected, 1);
    assert_eq!(fs::read_to_string(&source).unwrap(), original);
    let staged =
        fs::read_to_string(fixture.staging_dir().join("CH-DAV_202401050000.csv")).unwrap();
    assert!(staged.ends_with("2,-9999,290.2\n"));
}

#[tokio::test]
async fn test_cleanup_keeps_newest_file() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings
        .after_processing
        .delete_uncompressed_ascii_after_processing = true;

    let summary = fixture.orchestrator(settings).run().await.unwrap();

    assert_eq!(summary.files_deleted, 2);
    assert_eq!(
        csv_files(&fixture.staging_dir()),
        vec!["CH-DAV_202401010100.csv"]
    );
    // Source archives are never touched
    assert!(fixture.indir.join(RAW_FILES[0]).is_file());
}

#[test]
fn test_cleanup_keeps_files_without_readable_dates() {
    let fixture = Fixture::new();
    let mut orchestrator = fixture.orchestrator(fixture.settings());
    let staging = fixture.staging_dir();
    fs::create_dir_all(&staging).unwrap();
    for name in ["CH-DAV_202499990000.csv", "CH-DAV_202400000000.csv"] {
        fs::write(staging.join(name), RAW_BODY).unwrap();
    }
    orchestrator.ctx.derived.data_path = Some(staging.clone());

    assert_eq!(orchestrator.cleanup().unwrap(), 0);
    assert_eq!(csv_files(&staging).len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_full_run_with_both_phases() {
    let fixture = Fixture::new();
    fixture.write_executables(
        "echo 'processing new flux averaging period'\necho 'raw processing done'\nexit 0",
        &format!("echo 'flux correction'\n{}\nexit 0", WRITE_FULL_OUTPUT),
    );
    let mut settings = fixture.settings();
    settings.flux_processing.run_flux_calcs = true;
    settings.output.plot_summary = true;

    let summary = fixture.orchestrator(settings).run().await.unwrap();

    assert_eq!(summary.raw_processing, PhaseOutcome::Succeeded);
    assert_eq!(summary.flux_correction, PhaseOutcome::Succeeded);
    assert!(summary.full_output.is_some());

    let ini = fixture.run_dir().join("2-0_eddypro_flux_calculations").join("ini");
    let processing = fs::read_to_string(ini.join("processing.eddypro")).unwrap();
    let staging = crate::ini::config_path(&fixture.staging_dir());
    assert!(processing.contains(&format!("data_path={}\n", staging)));
    assert!(processing.contains(&format!("project_id=CH-DAV_{}\n", RUN_ID)));
    assert!(ini.join("processing.metadata").is_file());

    let flux_summary = fixture
        .run_dir()
        .join("2-1_eddypro_flux_calculations_summary_plots")
        .join(format!("{}_flux_summary.csv", RUN_ID));
    let text = fs::read_to_string(flux_summary).unwrap();
    assert!(text.contains("co2_flux,2,0.5,-1.5,2.5"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_flux_correction_skipped_when_output_exists() {
    let fixture = Fixture::new();
    fixture.write_executables(
        &format!("{}\nexit 0", WRITE_FULL_OUTPUT),
        "touch fcc_was_run\nexit 0",
    );
    let mut settings = fixture.settings();
    settings.flux_processing.run_flux_calcs = true;

    let summary = fixture.orchestrator(settings).run().await.unwrap();

    assert_eq!(summary.raw_processing, PhaseOutcome::Succeeded);
    assert_eq!(summary.flux_correction, PhaseOutcome::Skipped);
    assert!(summary.full_output.is_some());
    assert!(
        !fixture
            .run_dir()
            .join("2-0_eddypro_flux_calculations")
            .join("bin")
            .join("fcc_was_run")
            .exists()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_relative_outdir_resolves_for_eddypro() {
    let fixture = Fixture::new();
    fixture.write_executables(
        &format!("{}\nexit 0", WRITE_FULL_OUTPUT),
        "exit 0",
    );
    let scratch = TempDir::new_in(".").unwrap();
    let relative_outdir = scratch.path().join("out");
    assert!(relative_outdir.is_relative());

    let mut settings = fixture.settings();
    settings.flux_processing.run_flux_calcs = true;
    settings.output.outdir = relative_outdir.clone();

    let summary = fixture.orchestrator(settings).run().await.unwrap();

    assert!(summary.run_dir.is_absolute());
    assert_eq!(summary.raw_processing, PhaseOutcome::Succeeded);
    assert!(summary.full_output.is_some());

    let run_dir = relative_outdir.join(format!("CH-DAV_{}", RUN_ID));
    let processing = fs::read_to_string(
        run_dir
            .join("2-0_eddypro_flux_calculations")
            .join("ini")
            .join("processing.eddypro"),
    )
    .unwrap();
    let staging = std::path::absolute(run_dir.join("1-0_rawdata_files_ascii")).unwrap();
    assert!(processing.contains(&format!(
        "data_path={}\n",
        crate::ini::config_path(&staging)
    )));
}
