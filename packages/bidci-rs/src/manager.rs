use crate::backend::{EpochsShape, SignalBackend};
use crate::config::{Config, EventIdMap};
use crate::error::{BidciError, ConfigError, FieldError, Result};
use crate::loader::{BidsDataLoader, LoadedRecording};
use crate::preprocess::{preprocess_raw, PreprocessWarning};
use crate::visualize::{self, FigureReport, FigureTarget};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A (subject, run) pair that failed while failures were being isolated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    pub subject: String,
    pub run: String,
    pub stage: &'static str,
    pub error: String,
}

/// Per-recording summary produced by [`DatasetManager::summarize_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSummary {
    pub subject: String,
    pub run: String,
    pub path: PathBuf,
    pub sfreq: f64,
    pub n_channels: usize,
    pub n_times: usize,
    pub event_id: EventIdMap,
    pub n_events: usize,
    pub epochs: EpochsShape,
    pub warnings: Vec<PreprocessWarning>,
    pub figures: FigureReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub id: String,
    pub created_at: String,
    pub task: String,
    pub with_plots: bool,
    /// Figure paths are planned only; nothing was written.
    pub dry_run: bool,
    pub recordings: Vec<RecordingSummary>,
    pub failures: Vec<PairFailure>,
}

impl PipelineReport {
    pub fn figures_saved(&self) -> usize {
        self.recordings.iter().map(|r| r.figures.saved.len()).sum()
    }
}

/// Runs load → preprocess → summarize over every configured (subject, run).
///
/// Records and epochs are index aligned: `get_all_epochs()[i]` was built
/// from `loaders()[i]`.
pub struct DatasetManager<B: SignalBackend> {
    config: Config,
    backend: B,
    loaders: Vec<LoadedRecording<B::Raw>>,
    epochs_list: Vec<B::Epochs>,
    warnings: Vec<Vec<PreprocessWarning>>,
    failures: Vec<PairFailure>,
}

impl<B: SignalBackend> DatasetManager<B> {
    pub fn new(config: Config, backend: B) -> Self {
        Self {
            config,
            backend,
            loaders: Vec::new(),
            epochs_list: Vec::new(),
            warnings: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Read and validate a YAML configuration file.
    pub fn from_yaml<P: AsRef<Path>>(path: P, backend: B) -> Result<Self> {
        let config = Config::from_yaml_file(path)?;
        Ok(Self::new(config, backend))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn loaders(&self) -> &[LoadedRecording<B::Raw>] {
        &self.loaders
    }

    pub fn get_all_epochs(&self) -> &[B::Epochs] {
        &self.epochs_list
    }

    pub fn failures(&self) -> &[PairFailure] {
        &self.failures
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// (subject, run) pairs in load order: subjects outer, runs inner.
    pub fn pairs(&self) -> Result<Vec<(String, String)>> {
        let mut missing = Vec::new();
        if self.config.subjects.is_empty() {
            missing.push(FieldError::new("subjects", "must list at least one subject"));
        }
        if self.config.runs.is_empty() {
            missing.push(FieldError::new("runs", "must list at least one run"));
        }
        if !missing.is_empty() {
            return Err(ConfigError::Invalid(missing).into());
        }

        Ok(self
            .config
            .subjects
            .iter()
            .flat_map(|s| self.config.runs.iter().map(move |r| (s.clone(), r.clone())))
            .collect())
    }

    /// Load every (subject, run) pair.
    ///
    /// The first failure aborts the batch unless `continue_on_error` is set,
    /// in which case it is recorded in [`Self::failures`] and skipped.
    pub fn load_all(&mut self) -> Result<()> {
        let pairs = self.pairs()?;
        if !self.loaders.is_empty() {
            return Err(BidciError::Precondition("data already loaded".to_string()));
        }
        self.failures.clear();

        let total = pairs.len();
        for (i, (subject, run)) in pairs.into_iter().enumerate() {
            crate::time_stage!(format!("load sub-{} run-{}", subject, run));
            log::info!("[{}/{}] Loading sub-{} run-{}", i + 1, total, subject, run);

            let loader = BidsDataLoader::new(&self.config, &subject, &run);
            match loader.load(&mut self.backend) {
                Ok(recording) => self.loaders.push(recording),
                Err(e) if self.config.continue_on_error => {
                    log::error!("sub-{} run-{}: {}", subject, run, e);
                    self.failures.push(PairFailure {
                        subject,
                        run,
                        stage: "load",
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if self.loaders.is_empty() {
            return Err(BidciError::Precondition(
                "no recording could be loaded".to_string(),
            ));
        }
        Ok(())
    }

    /// Filter and epoch every loaded recording, in load order.
    ///
    /// On an aborting failure the manager is emptied: the recordings already
    /// handed to the backend can not be returned unfiltered.
    pub fn preprocess_all(&mut self) -> Result<()> {
        if self.loaders.is_empty() {
            return Err(BidciError::Precondition(
                "No data loaders available. Please load data first.".to_string(),
            ));
        }
        if !self.epochs_list.is_empty() {
            return Err(BidciError::Precondition(
                "recordings are already preprocessed".to_string(),
            ));
        }

        let loaders = std::mem::take(&mut self.loaders);
        for recording in loaders {
            let subject = recording.subject().to_string();
            let run = recording.run().to_string();
            crate::time_stage!(format!("preprocess sub-{} run-{}", subject, run));

            let backend = &mut self.backend;
            let config = &self.config;
            let outcome = recording.try_map_raw(|raw, events, event_id| {
                let out = preprocess_raw(backend, raw, events, event_id, config)?;
                Ok((out.raw, (out.epochs, out.warnings)))
            });

            match outcome {
                Ok((recording, (epochs, warnings))) => {
                    self.loaders.push(recording);
                    self.epochs_list.push(epochs);
                    self.warnings.push(warnings);
                }
                Err(e) if self.config.continue_on_error => {
                    log::error!("sub-{} run-{}: {}", subject, run, e);
                    self.failures.push(PairFailure {
                        subject,
                        run,
                        stage: "preprocess",
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            }
        }

        if self.loaders.is_empty() {
            return Err(BidciError::Precondition(
                "no recording could be preprocessed".to_string(),
            ));
        }
        Ok(())
    }

    /// Summarize every recording, plotting when `with_plots` (or, when
    /// `None`, `sanity_check.enable_plots`) is on.
    pub fn summarize_all(&mut self, with_plots: Option<bool>) -> Result<PipelineReport> {
        if self.epochs_list.is_empty() || self.epochs_list.len() != self.loaders.len() {
            return Err(BidciError::Precondition(
                "No epochs available. Please preprocess data first.".to_string(),
            ));
        }
        let with_plots = with_plots.unwrap_or(self.config.sanity_check.enable_plots);

        let loaders = std::mem::take(&mut self.loaders);
        let mut recordings = Vec::with_capacity(loaders.len());
        for (i, recording) in loaders.into_iter().enumerate() {
            match self.summarize_one(i, recording, with_plots) {
                Ok((recording, summary)) => {
                    self.loaders.push(recording);
                    recordings.push(summary);
                }
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            }
        }

        Ok(PipelineReport {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            task: self.config.task.clone(),
            with_plots,
            dry_run: !self.backend.writes_files(),
            recordings,
            failures: self.failures.clone(),
        })
    }

    fn summarize_one(
        &mut self,
        index: usize,
        recording: LoadedRecording<B::Raw>,
        with_plots: bool,
    ) -> Result<(LoadedRecording<B::Raw>, RecordingSummary)> {
        let epochs = &self.epochs_list[index];
        let shape = self.backend.epochs_shape(epochs)?;

        log::info!("Loader {}: {}", index + 1, recording.summary());
        log::info!(
            "Epochs shape: ({}, {}, {})",
            shape.n_epochs,
            shape.n_channels,
            shape.n_times
        );

        let mut figures = FigureReport::default();
        let recording = if with_plots {
            log::info!("Generating plots...");
            let backend = &mut self.backend;
            let config = &self.config;
            let subject = recording.subject().to_string();
            let run = recording.run().to_string();
            let labels: Vec<String> = recording.event_id().keys().cloned().collect();
            let target = FigureTarget {
                subject: &subject,
                run: &run,
            };

            let (recording, report) = recording.try_map_raw(|raw, _, _| {
                let raw = visualize::apply_montage(backend, raw, config)?;
                let mut report = FigureReport::default();
                report.merge(visualize::plot_sensors(backend, &raw, config, target)?);
                report.merge(visualize::plot_raw(backend, &raw, config, target)?);
                report.merge(visualize::plot_psd(backend, &raw, config, target)?);
                report.merge(visualize::plot_all_conditionwise(
                    backend, epochs, &labels, config, target,
                )?);
                Ok((raw, report))
            })?;
            log::info!("Plots generated.");
            figures = report;
            recording
        } else {
            recording
        };

        let info = recording.info();
        let summary = RecordingSummary {
            subject: recording.subject().to_string(),
            run: recording.run().to_string(),
            path: recording.path().to_path_buf(),
            sfreq: info.sfreq,
            n_channels: info.n_channels(),
            n_times: info.n_times,
            event_id: recording.event_id().clone(),
            n_events: recording.events().len(),
            epochs: shape,
            warnings: self.warnings.get(index).cloned().unwrap_or_default(),
            figures,
        };
        Ok((recording, summary))
    }

    /// Load, preprocess and summarize in one go.
    pub fn run(&mut self, with_plots: Option<bool>) -> Result<PipelineReport> {
        self.load_all()?;
        self.preprocess_all()?;
        self.summarize_all(with_plots)
    }

    fn reset(&mut self) {
        self.loaders.clear();
        self.epochs_list.clear();
        self.warnings.clear();
    }
}
