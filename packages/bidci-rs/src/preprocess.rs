//! Filtering and epoching of one recording.
//!
//! The steps always run in the same order:
//!
//! 1. resolve parameters (and load data into memory when configured)
//! 2. band-pass, unless the data was filtered upstream
//! 3. notch, only when data is preloaded
//! 4. EEG channel picks
//! 5. epochs over `[tmin, tmax]`, preloaded, same-onset events merged

use crate::backend::{pick_eeg, EpochRequest, Event, RepeatedEvents, SignalBackend};
use crate::config::{Band, Baseline, Config, EventIdMap};
use crate::error::{BidciError, Result};
use serde::Serialize;
use std::fmt;

/// Preprocessing parameters resolved from a [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessParams {
    pub tmin: f64,
    pub tmax: f64,
    pub baseline: Option<Baseline>,
    pub band: Band,
    pub notch: Option<f64>,
    pub load_data: bool,
    pub already_filtered: bool,
    pub original_band: Band,
}

impl PreprocessParams {
    pub fn from_config(config: &Config) -> Self {
        let pre = &config.preprocessing;
        Self {
            tmin: pre.tmin,
            tmax: pre.tmax,
            baseline: pre.baseline,
            band: pre.bandpass,
            notch: pre.notch_filter,
            load_data: pre.load_data,
            already_filtered: pre.already_filtered,
            original_band: pre.original_band,
        }
    }
}

/// Non-fatal conditions met while preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreprocessWarning {
    /// Data is marked as filtered upstream in a different band than requested.
    BandMismatch { declared: Band, requested: Band },
    /// Notch filtering needs preloaded data; it was not applied.
    NotchSkipped { freq: f64 },
}

impl fmt::Display for PreprocessWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BandMismatch { declared, requested } => write!(
                f,
                "Already filtered in ({}, {}), but requested: ({}, {})",
                declared.low, declared.high, requested.low, requested.high
            ),
            Self::NotchSkipped { freq } => write!(
                f,
                "Data not loaded into memory; notch filter at {} Hz skipped",
                freq
            ),
        }
    }
}

/// Result of preprocessing one recording.
#[derive(Debug)]
pub struct Preprocessed<R, E> {
    /// The filtered recording; the handle passed in no longer exists.
    pub raw: R,
    pub epochs: E,
    pub warnings: Vec<PreprocessWarning>,
}

/// Filter and epoch one recording.
///
/// Consumes `raw` and returns the filtered handle alongside the epochs.
pub fn preprocess_raw<B: SignalBackend>(
    backend: &mut B,
    raw: B::Raw,
    events: &[Event],
    event_id: &EventIdMap,
    config: &Config,
) -> Result<Preprocessed<B::Raw, B::Epochs>> {
    let params = PreprocessParams::from_config(config);
    let mut warnings = Vec::new();

    if events.is_empty() || event_id.is_empty() {
        let message = match config.event_id.as_ref().filter(|m| !m.is_empty()) {
            Some(configured) => format!(
                "none of the configured event_id labels ({}) matched the recording's annotations",
                configured.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            None => "no events found in the recording's annotations; nothing to epoch".to_string(),
        };
        return Err(BidciError::Precondition(message));
    }

    let mut raw = if params.load_data {
        backend.load_data(raw)?
    } else {
        raw
    };

    if !params.already_filtered {
        log::debug!("Band-pass filtering {}-{} Hz", params.band.low, params.band.high);
        raw = backend.filter(raw, params.band)?;
    } else if !params.band.same_as(&params.original_band) {
        record(
            &mut warnings,
            PreprocessWarning::BandMismatch {
                declared: params.original_band,
                requested: params.band,
            },
        );
    }

    if let Some(freq) = params.notch {
        if params.load_data {
            log::debug!("Notch filtering at {} Hz", freq);
            raw = backend.notch_filter(raw, freq)?;
        } else {
            record(&mut warnings, PreprocessWarning::NotchSkipped { freq });
        }
    }

    let info = backend.raw_info(&raw)?;
    let picks = pick_eeg(&info);
    if picks.is_empty() {
        return Err(BidciError::Precondition(
            "recording has no EEG channels to epoch".to_string(),
        ));
    }

    let request = EpochRequest {
        tmin: params.tmin,
        tmax: params.tmax,
        baseline: params.baseline,
        picks,
        preload: true,
        event_repeated: RepeatedEvents::Merge,
    };
    let epochs = backend.epochs(&raw, events, event_id, &request)?;

    Ok(Preprocessed {
        raw,
        epochs,
        warnings,
    })
}

/// Log a warning as soon as it is raised, so it survives a later failure.
fn record(warnings: &mut Vec<PreprocessWarning>, warning: PreprocessWarning) {
    log::warn!("{}", warning);
    warnings.push(warning);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChannelInfo, ChannelKind};
    use crate::bids::BidsPath;
    use crate::dry_run::{Call, DryRaw, DryRunBackend};
    use crate::loader::{BidsDataLoader, LoadedRecording};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    fn load(root: &Path, cfg: &Config, backend: &mut DryRunBackend) -> LoadedRecording<DryRaw> {
        let p = BidsPath::new(root, "01", "mi").with_run(Some("01".into()));
        fs::create_dir_all(p.directory()).unwrap();
        fs::write(p.fpath(), "").unwrap();
        let rec = BidsDataLoader::new(cfg, "01", "01").load(backend).unwrap();
        backend.clear();
        rec
    }

    fn run(
        backend: &mut DryRunBackend,
        rec: &LoadedRecording<DryRaw>,
        cfg: &Config,
    ) -> Result<Preprocessed<DryRaw, crate::dry_run::DryEpochs>> {
        preprocess_raw(backend, rec.raw().clone(), rec.events(), rec.event_id(), cfg)
    }

    #[test]
    fn test_fixed_step_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(tmp.path(), "mi");
        cfg.preprocessing.notch_filter = Some(50.0);
        let mut backend = DryRunBackend::new();
        let rec = load(tmp.path(), &cfg, &mut backend);

        let out = run(&mut backend, &rec, &cfg).unwrap();
        let names: Vec<&str> = backend
            .calls()
            .iter()
            .map(|c| match c {
                Call::LoadData => "load",
                Call::Filter { .. } => "filter",
                Call::NotchFilter { .. } => "notch",
                Call::Epochs { .. } => "epochs",
                _ => "other",
            })
            .collect();
        assert_eq!(names, vec!["load", "filter", "notch", "epochs"]);
        assert!(out.warnings.is_empty());
        assert_eq!(out.raw.filters, vec![Band::new(1.0, 40.0)]);
        assert_eq!(out.raw.notch, Some(50.0));
    }

    #[test]
    fn test_epoch_request_uses_eeg_picks_and_merge_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(tmp.path(), "mi");
        cfg.preprocessing.tmin = -0.2;
        cfg.preprocessing.tmax = 0.8;
        cfg.preprocessing.baseline = Some(Baseline { start: None, end: Some(0.0) });
        let mut backend = DryRunBackend::new();
        let rec = load(tmp.path(), &cfg, &mut backend);

        let out = run(&mut backend, &rec, &cfg).unwrap();
        let request = backend
            .calls()
            .iter()
            .find_map(|c| match c {
                Call::Epochs { request, .. } => Some(request.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(request.picks, vec![0, 1, 2, 3, 4]);
        assert!(request.preload);
        assert_eq!(request.event_repeated, RepeatedEvents::Merge);
        assert_eq!(request.tmin, -0.2);
        assert_eq!(request.baseline, cfg.preprocessing.baseline);
        assert_eq!(out.epochs.shape.n_channels, 5);
        assert_eq!(out.epochs.shape.n_epochs, 20);
    }

    #[test]
    fn test_already_filtered_same_band_no_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(tmp.path(), "mi");
        cfg.preprocessing.already_filtered = true;
        cfg.preprocessing.bandpass = Band::new(0.5, 45.0);
        let mut backend = DryRunBackend::new();
        let rec = load(tmp.path(), &cfg, &mut backend);

        let out = run(&mut backend, &rec, &cfg).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(backend.count(|c| matches!(c, Call::Filter { .. })), 0);
    }

    #[test]
    fn test_already_filtered_other_band_warns_once_without_filtering() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(tmp.path(), "mi");
        cfg.preprocessing.already_filtered = true;
        let mut backend = DryRunBackend::new();
        let rec = load(tmp.path(), &cfg, &mut backend);

        let out = run(&mut backend, &rec, &cfg).unwrap();
        assert_eq!(
            out.warnings,
            vec![PreprocessWarning::BandMismatch {
                declared: Band::new(0.5, 45.0),
                requested: Band::new(1.0, 40.0),
            }]
        );
        assert_eq!(backend.count(|c| matches!(c, Call::Filter { .. })), 0);
        assert!(out.raw.filters.is_empty());
    }

    #[test]
    fn test_notch_skipped_without_preload() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(tmp.path(), "mi");
        cfg.preprocessing.load_data = false;
        cfg.preprocessing.notch_filter = Some(60.0);
        let mut backend = DryRunBackend::new();
        let rec = load(tmp.path(), &cfg, &mut backend);

        let out = run(&mut backend, &rec, &cfg).unwrap();
        assert_eq!(out.warnings, vec![PreprocessWarning::NotchSkipped { freq: 60.0 }]);
        assert_eq!(backend.count(|c| matches!(c, Call::NotchFilter { .. })), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::LoadData)), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Filter { .. })), 1);
    }

    #[test]
    fn test_recording_without_eeg_channels() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::new(tmp.path(), "mi");
        let mut backend = DryRunBackend::new().with_channels(vec![ChannelInfo {
            name: "STI 014".into(),
            kind: ChannelKind::Stim,
        }]);
        let rec = load(tmp.path(), &cfg, &mut backend);
        let err = run(&mut backend, &rec, &cfg).unwrap_err();
        assert!(matches!(err, BidciError::Precondition(_)));
    }

    struct CaptureLogger;

    static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());
    static LOGGER: CaptureLogger = CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                CAPTURED.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    fn capture_warnings() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Warn);
    }

    #[test]
    fn test_band_mismatch_logged_even_when_epoching_fails() {
        capture_warnings();
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(tmp.path(), "mi");
        cfg.preprocessing.already_filtered = true;
        cfg.preprocessing.bandpass = Band::new(8.0, 30.0);
        let mut backend = DryRunBackend::new().with_channels(vec![ChannelInfo {
            name: "STI 014".into(),
            kind: ChannelKind::Stim,
        }]);
        let rec = load(tmp.path(), &cfg, &mut backend);

        let err = run(&mut backend, &rec, &cfg).unwrap_err();
        assert!(matches!(err, BidciError::Precondition(_)));
        let logged = CAPTURED.lock().unwrap();
        assert!(
            logged
                .iter()
                .any(|line| line.contains("Already filtered in (0.5, 45), but requested: (8, 30)")),
            "logged: {:?}",
            *logged
        );
    }

    #[test]
    fn test_unmatched_configured_event_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(tmp.path(), "mi");
        cfg.event_id = Some(EventIdMap::from([("feet".to_string(), 3)]));
        let mut backend = DryRunBackend::new();
        let rec = load(tmp.path(), &cfg, &mut backend);

        let err = run(&mut backend, &rec, &cfg).unwrap_err();
        assert!(matches!(err, BidciError::Precondition(_)));
        assert!(err.to_string().contains("configured event_id labels (feet)"), "{}", err);
    }

    #[test]
    fn test_recording_without_events() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::new(tmp.path(), "mi");
        let mut backend = DryRunBackend::new().with_events_per_label(0);
        let rec = load(tmp.path(), &cfg, &mut backend);
        let err = run(&mut backend, &rec, &cfg).unwrap_err();
        assert!(matches!(err, BidciError::Precondition(_)));
        assert!(backend.calls().is_empty());
    }
}
