//! Contract with the external signal-processing library.
//!
//! Filtering, epoching, montage geometry, spectral estimation and plotting
//! all live behind [`SignalBackend`]. The pipeline only sequences calls and
//! moves opaque handles around. Calls that modify a recording take the raw
//! handle by value and hand back the modified one, so a caller can never
//! keep using a handle that was filtered underneath it.

use crate::bids::BidsPath;
use crate::config::{Band, Baseline, EventIdMap};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Channel type as reported by the recording metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Eeg,
    Meg,
    Eog,
    Ecg,
    Emg,
    Stim,
    Misc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
}

/// Metadata of a continuous recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInfo {
    pub sfreq: f64,
    pub n_times: usize,
    pub channels: Vec<ChannelInfo>,
    pub preloaded: bool,
    pub has_montage: bool,
}

impl RawInfo {
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sfreq > 0.0 {
            self.n_times as f64 / self.sfreq
        } else {
            0.0
        }
    }
}

/// One row of the events array: onset sample, previous value, event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub sample: i64,
    pub previous: i32,
    pub code: i32,
}

/// How the epoching step treats several events sharing one onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatedEvents {
    Error,
    Drop,
    Merge,
}

/// Everything the epoching call needs besides the recording and events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochRequest {
    pub tmin: f64,
    pub tmax: f64,
    pub baseline: Option<Baseline>,
    /// Channel indices to keep.
    pub picks: Vec<usize>,
    pub preload: bool,
    pub event_repeated: RepeatedEvents,
}

/// Shape of an epoch collection: epochs × channels × samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochsShape {
    pub n_epochs: usize,
    pub n_channels: usize,
    pub n_times: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawPlotOptions {
    pub duration: f64,
    pub start: f64,
    pub n_channels: u32,
    pub scalings: BTreeMap<String, f64>,
    pub show_events: bool,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsdPlotOptions {
    pub fmin: f64,
    pub fmax: f64,
    pub average: bool,
}

/// Per-epoch spectra: `data[epoch][channel][frequency]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdData {
    pub freqs: Vec<f64>,
    pub data: Vec<Vec<Vec<f64>>>,
}

/// Mean spectrum with a ± std band, ready to be drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsdBandPlot {
    pub title: String,
    pub freqs: Vec<f64>,
    /// Mean over epochs, one row per channel.
    pub channel_means: Vec<Vec<f64>>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// The external signal-processing library.
///
/// Handles are opaque; implementations decide what they are. Every call is
/// blocking.
pub trait SignalBackend {
    type Raw;
    type Epochs;
    type Evoked;
    type Figure;

    /// Read the recording addressed by `path`.
    fn read_raw_bids(&mut self, path: &BidsPath, verbose: bool) -> Result<Self::Raw>;

    fn raw_info(&mut self, raw: &Self::Raw) -> Result<RawInfo>;

    /// Turn embedded annotations into events. Without `event_id` the backend
    /// derives the label map itself.
    fn events_from_annotations(
        &mut self,
        raw: &Self::Raw,
        event_id: Option<&EventIdMap>,
    ) -> Result<(Vec<Event>, EventIdMap)>;

    fn load_data(&mut self, raw: Self::Raw) -> Result<Self::Raw>;

    fn filter(&mut self, raw: Self::Raw, band: Band) -> Result<Self::Raw>;

    fn notch_filter(&mut self, raw: Self::Raw, freq: f64) -> Result<Self::Raw>;

    fn epochs(
        &mut self,
        raw: &Self::Raw,
        events: &[Event],
        event_id: &EventIdMap,
        request: &EpochRequest,
    ) -> Result<Self::Epochs>;

    fn epochs_shape(&mut self, epochs: &Self::Epochs) -> Result<EpochsShape>;

    /// Attach a standard montage by name.
    fn set_montage(&mut self, raw: Self::Raw, kind: &str) -> Result<Self::Raw>;

    /// Average the epochs of one condition.
    fn average(&mut self, epochs: &Self::Epochs, label: &str) -> Result<Self::Evoked>;

    fn evoked_has_montage(&mut self, evoked: &Self::Evoked) -> Result<bool>;

    fn set_evoked_montage(&mut self, evoked: Self::Evoked, kind: &str) -> Result<Self::Evoked>;

    fn plot_raw(&mut self, raw: &Self::Raw, options: &RawPlotOptions) -> Result<Self::Figure>;

    fn plot_psd(&mut self, raw: &Self::Raw, options: &PsdPlotOptions) -> Result<Self::Figure>;

    /// Sensor positions as a topomap with channel names.
    fn plot_sensors(&mut self, raw: &Self::Raw) -> Result<Self::Figure>;

    /// Mean-combined epochs image of one condition over the `picks` channel selection.
    fn plot_epochs_image(
        &mut self,
        epochs: &Self::Epochs,
        label: &str,
        picks: &str,
    ) -> Result<Self::Figure>;

    fn plot_topomap(&mut self, evoked: &Self::Evoked, times: &[f64]) -> Result<Self::Figure>;

    fn compute_psd(
        &mut self,
        epochs: &Self::Epochs,
        label: &str,
        fmin: f64,
        fmax: f64,
    ) -> Result<PsdData>;

    fn plot_psd_band(&mut self, plot: &PsdBandPlot) -> Result<Self::Figure>;

    /// Write the figure to `path` and close it.
    fn save_figure(&mut self, figure: Self::Figure, path: &Path, dpi: u32) -> Result<()>;

    /// Present the figure to the user and close it.
    fn show_figure(&mut self, figure: Self::Figure) -> Result<()>;

    /// Whether [`SignalBackend::save_figure`] actually writes files.
    fn writes_files(&self) -> bool {
        true
    }
}

/// Indices of EEG channels; MEG, stimulus, EOG and other types are excluded.
pub fn pick_eeg(info: &RawInfo) -> Vec<usize> {
    info.channels
        .iter()
        .enumerate()
        .filter(|(_, ch)| ch.kind == ChannelKind::Eeg)
        .map(|(i, _)| i)
        .collect()
}
