//! A backend that performs no signal processing.
//!
//! [`DryRunBackend`] answers every call with synthetic handles and journals
//! the call, so a configuration can be checked end to end (which files are
//! read, which filters would run, which figures would be written) without
//! the external library. Figures are never written to disk.

use crate::backend::*;
use crate::bids::BidsPath;
use crate::config::{Band, EventIdMap};
use crate::error::{BidciError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Frequency bins in every synthetic spectrum, whatever the requested range.
pub const PSD_BINS: usize = 64;

/// One journaled backend call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    ReadRawBids { path: PathBuf },
    EventsFromAnnotations { explicit_map: bool },
    LoadData,
    Filter { band: Band },
    NotchFilter { freq: f64 },
    Epochs { picks: Vec<usize>, n_events: usize, request: EpochRequest },
    SetMontage { kind: String },
    Average { label: String },
    SetEvokedMontage { kind: String },
    PlotRaw { title: String },
    PlotPsd { fmin: f64, fmax: f64 },
    PlotSensors,
    PlotEpochsImage { label: String, picks: String },
    PlotTopomap { label: String, times: Vec<f64> },
    ComputePsd { label: String, fmin: f64, fmax: f64 },
    PlotPsdBand { title: String },
    SaveFigure { figure: String, path: PathBuf, dpi: u32 },
    ShowFigure { figure: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DryRaw {
    pub path: PathBuf,
    pub info: RawInfo,
    /// Band-pass filters applied so far, in order.
    pub filters: Vec<Band>,
    pub notch: Option<f64>,
    pub montage: Option<String>,
    annotations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DryEpochs {
    pub shape: EpochsShape,
    pub counts: BTreeMap<String, usize>,
    pub has_montage: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DryEvoked {
    pub label: String,
    pub montage: Option<String>,
}

/// Synthetic figure; `name` identifies what was drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct DryFigure {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DryRunBackend {
    channels: Vec<ChannelInfo>,
    sfreq: f64,
    duration_secs: f64,
    labels: Vec<String>,
    events_per_label: usize,
    montage_in_file: bool,
    calls: Vec<Call>,
}

impl Default for DryRunBackend {
    fn default() -> Self {
        let eeg = ["Fz", "C3", "Cz", "C4", "Pz"];
        let mut channels: Vec<ChannelInfo> = eeg
            .iter()
            .map(|name| ChannelInfo {
                name: name.to_string(),
                kind: ChannelKind::Eeg,
            })
            .collect();
        channels.push(ChannelInfo {
            name: "STI 014".to_string(),
            kind: ChannelKind::Stim,
        });
        channels.push(ChannelInfo {
            name: "EOG".to_string(),
            kind: ChannelKind::Eog,
        });
        Self {
            channels,
            sfreq: 160.0,
            duration_secs: 120.0,
            labels: vec!["left".to_string(), "right".to_string()],
            events_per_label: 10,
            montage_in_file: false,
            calls: Vec::new(),
        }
    }
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(mut self, channels: Vec<ChannelInfo>) -> Self {
        self.channels = channels;
        self
    }

    /// Annotation labels present in every synthetic recording.
    pub fn with_annotations<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_events_per_label(mut self, n: usize) -> Self {
        self.events_per_label = n;
        self
    }

    /// Recordings come with digitized sensor positions.
    pub fn with_montage_in_file(mut self, present: bool) -> Self {
        self.montage_in_file = present;
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: Call) {
        log::debug!("dry-run: {:?}", call);
        self.calls.push(call);
    }

    fn figure(&self, name: impl Into<String>) -> DryFigure {
        DryFigure { name: name.into() }
    }
}

impl SignalBackend for DryRunBackend {
    type Raw = DryRaw;
    type Epochs = DryEpochs;
    type Evoked = DryEvoked;
    type Figure = DryFigure;

    fn read_raw_bids(&mut self, path: &BidsPath, _verbose: bool) -> Result<DryRaw> {
        let fpath = path.ensure_exists()?;
        self.record(Call::ReadRawBids { path: fpath.clone() });
        Ok(DryRaw {
            path: fpath,
            info: RawInfo {
                sfreq: self.sfreq,
                n_times: (self.sfreq * self.duration_secs) as usize,
                channels: self.channels.clone(),
                preloaded: false,
                has_montage: self.montage_in_file,
            },
            filters: Vec::new(),
            notch: None,
            montage: None,
            annotations: self.labels.clone(),
        })
    }

    fn raw_info(&mut self, raw: &DryRaw) -> Result<RawInfo> {
        Ok(raw.info.clone())
    }

    fn events_from_annotations(
        &mut self,
        raw: &DryRaw,
        event_id: Option<&EventIdMap>,
    ) -> Result<(Vec<Event>, EventIdMap)> {
        self.record(Call::EventsFromAnnotations {
            explicit_map: event_id.is_some(),
        });

        let map: EventIdMap = match event_id {
            Some(explicit) => explicit
                .iter()
                .filter(|(label, _)| raw.annotations.contains(*label))
                .map(|(label, code)| (label.clone(), *code))
                .collect(),
            None => {
                let mut labels = raw.annotations.clone();
                labels.sort();
                labels.dedup();
                labels
                    .into_iter()
                    .enumerate()
                    .map(|(i, label)| (label, i as i32 + 1))
                    .collect()
            }
        };

        let step = (self.sfreq * 4.0) as i64;
        let mut events = Vec::new();
        let mut onset = step;
        for _ in 0..self.events_per_label {
            for label in &raw.annotations {
                if let Some(&code) = map.get(label) {
                    events.push(Event {
                        sample: onset,
                        previous: 0,
                        code,
                    });
                    onset += step;
                }
            }
        }
        Ok((events, map))
    }

    fn load_data(&mut self, mut raw: DryRaw) -> Result<DryRaw> {
        self.record(Call::LoadData);
        raw.info.preloaded = true;
        Ok(raw)
    }

    fn filter(&mut self, mut raw: DryRaw, band: Band) -> Result<DryRaw> {
        self.record(Call::Filter { band });
        raw.filters.push(band);
        Ok(raw)
    }

    fn notch_filter(&mut self, mut raw: DryRaw, freq: f64) -> Result<DryRaw> {
        if !raw.info.preloaded {
            return Err(BidciError::backend(
                "notch_filter",
                "data must be loaded into memory",
            ));
        }
        self.record(Call::NotchFilter { freq });
        raw.notch = Some(freq);
        Ok(raw)
    }

    fn epochs(
        &mut self,
        raw: &DryRaw,
        events: &[Event],
        event_id: &EventIdMap,
        request: &EpochRequest,
    ) -> Result<DryEpochs> {
        if request.tmin >= request.tmax {
            return Err(BidciError::backend("epochs", "tmin must be below tmax"));
        }
        self.record(Call::Epochs {
            picks: request.picks.clone(),
            n_events: events.len(),
            request: request.clone(),
        });

        let mut counts = BTreeMap::new();
        for (label, code) in event_id {
            let n = events.iter().filter(|e| e.code == *code).count();
            counts.insert(label.clone(), n);
        }
        let n_times = ((request.tmax - request.tmin) * raw.info.sfreq).round() as usize + 1;
        Ok(DryEpochs {
            shape: EpochsShape {
                n_epochs: events.len(),
                n_channels: request.picks.len(),
                n_times,
            },
            counts,
            has_montage: raw.info.has_montage,
        })
    }

    fn epochs_shape(&mut self, epochs: &DryEpochs) -> Result<EpochsShape> {
        Ok(epochs.shape)
    }

    fn set_montage(&mut self, mut raw: DryRaw, kind: &str) -> Result<DryRaw> {
        self.record(Call::SetMontage {
            kind: kind.to_string(),
        });
        raw.montage = Some(kind.to_string());
        raw.info.has_montage = true;
        Ok(raw)
    }

    fn average(&mut self, epochs: &DryEpochs, label: &str) -> Result<DryEvoked> {
        if !epochs.counts.contains_key(label) {
            return Err(BidciError::backend(
                "average",
                format!("no epochs for condition '{}'", label),
            ));
        }
        self.record(Call::Average {
            label: label.to_string(),
        });
        Ok(DryEvoked {
            label: label.to_string(),
            montage: epochs.has_montage.then(|| "file".to_string()),
        })
    }

    fn evoked_has_montage(&mut self, evoked: &DryEvoked) -> Result<bool> {
        Ok(evoked.montage.is_some())
    }

    fn set_evoked_montage(&mut self, mut evoked: DryEvoked, kind: &str) -> Result<DryEvoked> {
        self.record(Call::SetEvokedMontage {
            kind: kind.to_string(),
        });
        evoked.montage = Some(kind.to_string());
        Ok(evoked)
    }

    fn plot_raw(&mut self, _raw: &DryRaw, options: &RawPlotOptions) -> Result<DryFigure> {
        self.record(Call::PlotRaw {
            title: options.title.clone(),
        });
        Ok(self.figure("raw"))
    }

    fn plot_psd(&mut self, _raw: &DryRaw, options: &PsdPlotOptions) -> Result<DryFigure> {
        self.record(Call::PlotPsd {
            fmin: options.fmin,
            fmax: options.fmax,
        });
        Ok(self.figure("psd"))
    }

    fn plot_sensors(&mut self, raw: &DryRaw) -> Result<DryFigure> {
        if !raw.info.has_montage {
            return Err(BidciError::backend("plot_sensors", "no sensor positions"));
        }
        self.record(Call::PlotSensors);
        Ok(self.figure("sensors"))
    }

    fn plot_epochs_image(
        &mut self,
        _epochs: &DryEpochs,
        label: &str,
        picks: &str,
    ) -> Result<DryFigure> {
        self.record(Call::PlotEpochsImage {
            label: label.to_string(),
            picks: picks.to_string(),
        });
        Ok(self.figure(format!("epochs_image_{}", label)))
    }

    fn plot_topomap(&mut self, evoked: &DryEvoked, times: &[f64]) -> Result<DryFigure> {
        if evoked.montage.is_none() {
            return Err(BidciError::backend("plot_topomap", "no sensor positions"));
        }
        self.record(Call::PlotTopomap {
            label: evoked.label.clone(),
            times: times.to_vec(),
        });
        Ok(self.figure(format!("topomap_{}", evoked.label)))
    }

    fn compute_psd(
        &mut self,
        epochs: &DryEpochs,
        label: &str,
        fmin: f64,
        fmax: f64,
    ) -> Result<PsdData> {
        self.record(Call::ComputePsd {
            label: label.to_string(),
            fmin,
            fmax,
        });
        let n_epochs = epochs.counts.get(label).copied().unwrap_or(0);
        let step = (fmax - fmin) / (PSD_BINS - 1) as f64;
        let freqs: Vec<f64> = (0..PSD_BINS).map(|i| fmin + step * i as f64).collect();
        let data = (0..n_epochs)
            .map(|e| {
                (0..epochs.shape.n_channels)
                    .map(|c| {
                        freqs
                            .iter()
                            .map(|f| (1.0 + 0.1 * e as f64 + 0.01 * c as f64) / (f + 1.0))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Ok(PsdData { freqs, data })
    }

    fn plot_psd_band(&mut self, plot: &PsdBandPlot) -> Result<DryFigure> {
        self.record(Call::PlotPsdBand {
            title: plot.title.clone(),
        });
        Ok(self.figure("psd_band"))
    }

    fn save_figure(&mut self, figure: DryFigure, path: &Path, dpi: u32) -> Result<()> {
        self.record(Call::SaveFigure {
            figure: figure.name,
            path: path.to_path_buf(),
            dpi,
        });
        Ok(())
    }

    fn show_figure(&mut self, figure: DryFigure) -> Result<()> {
        self.record(Call::ShowFigure {
            figure: figure.name,
        });
        Ok(())
    }

    fn writes_files(&self) -> bool {
        false
    }
}
