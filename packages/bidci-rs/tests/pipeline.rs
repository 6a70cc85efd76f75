use bidci::dry_run::Call;
use bidci::{BidciError, BridgeBackend, Config, DatasetManager, DryRunBackend};
use std::fs;
use std::path::{Path, PathBuf};

/// Lay out empty EDF files for every (subject, run) pair.
fn make_dataset(root: &Path, task: &str, subjects: &[&str], runs: &[&str]) {
    for subject in subjects {
        let dir = root.join(format!("sub-{}", subject)).join("eeg");
        fs::create_dir_all(&dir).unwrap();
        for run in runs {
            fs::write(
                dir.join(format!("sub-{}_task-{}_run-{}_eeg.edf", subject, task, run)),
                "",
            )
            .unwrap();
        }
    }
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_yaml_driven_run_saves_figures_per_pair() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("bids");
    let results = tmp.path().join("results");
    make_dataset(&data, "motor", &["01", "02"], &["01"]);

    let config = write_config(
        tmp.path(),
        &format!(
            r#"
bids_root: {}
task: motor
subjects: ["01", "02"]
runs: ["01"]
preprocessing:
  bandpass: [1.0, 30.0]
  notch_filter: 50
  tmin: -0.5
  tmax: 2.0
visualization:
  use_montage: true
sanity_check:
  enable_plots: true
output:
  base_directory: {}
save_figures:
  format: svg
  dpi: 150
"#,
            data.display(),
            results.display()
        ),
    );

    let mut manager = DatasetManager::from_yaml(&config, DryRunBackend::new()).unwrap();
    let report = manager.run(None).unwrap();

    assert!(report.with_plots);
    assert_eq!(report.recordings.len(), 2);
    assert!(report.failures.is_empty());
    // sensors + raw + psd, then three per condition for two conditions
    assert_eq!(report.figures_saved(), 2 * 9);

    let sub02 = results.join("sub-02").join("run-01");
    for dir in ["raw", "psd", "sensors", "epochs", "topomap"] {
        assert!(sub02.join(dir).is_dir(), "missing {}", dir);
    }
    assert!(report.recordings[1]
        .figures
        .saved
        .contains(&sub02.join("psd").join("psd_conditionwise_left.svg")));

    let backend = manager.backend();
    assert_eq!(backend.count(|c| matches!(c, Call::NotchFilter { .. })), 2);
    assert!(backend.calls().iter().all(|c| match c {
        Call::SaveFigure { dpi, .. } => *dpi == 150,
        _ => true,
    }));
}

#[test]
fn test_plots_with_saving_disabled_create_no_files() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("bids");
    let results = tmp.path().join("results");
    make_dataset(&data, "rest", &["01"], &["01"]);

    let mut config = Config::new(&data, "rest");
    config.subjects = vec!["01".to_string()];
    config.runs = vec!["01".to_string()];
    config.save_figures.enabled = false;
    config.output.base_directory = results.clone();

    let mut manager = DatasetManager::new(config, DryRunBackend::new());
    manager.load_all().unwrap();
    manager.preprocess_all().unwrap();
    let report = manager.summarize_all(Some(true)).unwrap();

    assert_eq!(report.figures_saved(), 0);
    assert!(report.recordings[0].figures.shown > 0);
    assert!(!results.exists());
    assert_eq!(
        manager
            .backend()
            .count(|c| matches!(c, Call::SaveFigure { .. })),
        0
    );
}

#[test]
fn test_huge_psd_range_completes_with_fixed_bins() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("bids");
    make_dataset(&data, "motor", &["01"], &["01"]);

    let config = write_config(
        tmp.path(),
        &format!(
            r#"
bids_root: {}
task: motor
subjects: ["01"]
runs: ["01"]
visualization:
  psd_fmax: 1.0e17
save_figures:
  enabled: false
"#,
            data.display()
        ),
    );

    let mut manager = DatasetManager::from_yaml(&config, DryRunBackend::new()).unwrap();
    let report = manager.run(Some(true)).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.recordings.len(), 1);
    assert!(manager.backend().calls().iter().any(|c| matches!(
        c,
        Call::ComputePsd { fmax, .. } if *fmax == 1.0e17
    )));
}

#[test]
fn test_summary_without_plots_touches_no_figures() {
    let tmp = tempfile::tempdir().unwrap();
    make_dataset(tmp.path(), "rest", &["01"], &["01", "02"]);

    let mut config = Config::new(tmp.path(), "rest");
    config.subjects = vec!["01".to_string()];
    config.runs = vec!["01".to_string(), "02".to_string()];

    let mut manager = DatasetManager::new(config, DryRunBackend::new());
    let report = manager.run(Some(false)).unwrap();

    assert_eq!(report.recordings.len(), 2);
    assert_eq!(report.recordings[1].run, "02");
    assert_eq!(report.recordings[0].epochs.n_epochs, 20);
    assert!(manager.backend().calls().iter().all(|c| !matches!(
        c,
        Call::PlotRaw { .. } | Call::PlotPsd { .. } | Call::ShowFigure { .. }
    )));
}

#[test]
fn test_invalid_yaml_reports_every_problem() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(
        tmp.path(),
        r#"
task: ""
subjects: [1]
preprocessing:
  bandpass: [40, 1]
save_figures:
  format: bmp
"#,
    );

    let err = DatasetManager::from_yaml(&config, DryRunBackend::new())
        .err()
        .unwrap();
    let config_err = match err {
        BidciError::Config(e) => e,
        other => panic!("expected a configuration error, got {}", other),
    };
    for field in [
        "bids_root",
        "task",
        "subjects[0]",
        "preprocessing.bandpass",
        "save_figures.format",
    ] {
        assert!(config_err.mentions(field), "no error for {}", field);
    }
}

#[test]
fn test_aborts_on_first_missing_recording_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    make_dataset(tmp.path(), "rest", &["01"], &["01"]);

    let mut config = Config::new(tmp.path(), "rest");
    config.subjects = vec!["01".to_string(), "02".to_string()];
    config.runs = vec!["01".to_string()];

    let mut manager = DatasetManager::new(config, DryRunBackend::new());
    let err = manager.run(Some(false)).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("sub-02"));
}

/// Runs against a real bridge when one is installed.
#[test]
fn test_bridge_smoke() {
    let Some(bridge) = bidci::find_bridge(None) else {
        eprintln!("Skipping test: bidci-bridge not found");
        return;
    };

    let tmp = tempfile::tempdir().unwrap();
    let config = Config::new(tmp.path(), "rest");
    let mut backend = BridgeBackend::spawn(&bridge).expect("Failed to start bridge");
    let path = bidci::BidsPath::new(&config.bids_root, "01", &config.task);

    // Nothing exists under the empty root.
    let err = bidci::SignalBackend::read_raw_bids(&mut backend, &path, false).unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
}
