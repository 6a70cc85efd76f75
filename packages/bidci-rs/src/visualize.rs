//! Diagnostic figures for one recording and its epochs.
//!
//! Every figure goes through [`emit`]: when the path resolver hands back a
//! directory the figure is saved there and closed, otherwise it is shown.

use crate::backend::{PsdPlotOptions, RawPlotOptions, SignalBackend};
use crate::config::Config;
use crate::error::Result;
use crate::paths::{figure_file, save_path, ArtifactKind};
use crate::psd::PsdSummary;
use serde::Serialize;
use std::path::PathBuf;

/// What happened to the figures of one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FigureReport {
    pub saved: Vec<PathBuf>,
    pub shown: usize,
}

impl FigureReport {
    pub fn total(&self) -> usize {
        self.saved.len() + self.shown
    }

    pub fn merge(&mut self, other: FigureReport) {
        self.saved.extend(other.saved);
        self.shown += other.shown;
    }
}

/// Which (subject, run) a figure belongs to.
#[derive(Debug, Clone, Copy)]
pub struct FigureTarget<'a> {
    pub subject: &'a str,
    pub run: &'a str,
}

/// Save `figure` as `{name}.{format}` under its artifact directory, or show it.
pub fn emit<B: SignalBackend>(
    backend: &mut B,
    figure: B::Figure,
    config: &Config,
    target: FigureTarget<'_>,
    artifact: ArtifactKind,
    name: &str,
    report: &mut FigureReport,
) -> Result<()> {
    match save_path(config, target.subject, target.run, artifact)? {
        Some(dir) => {
            let file = figure_file(&dir, name, config.save_figures.format);
            backend.save_figure(figure, &file, config.save_figures.dpi)?;
            if backend.writes_files() {
                log::info!("Saved: {}", file.display());
            } else {
                log::info!("Planned (not written): {}", file.display());
            }
            report.saved.push(file);
        }
        None => {
            backend.show_figure(figure)?;
            report.shown += 1;
        }
    }
    Ok(())
}

/// Attach the configured standard montage when `use_montage` is on.
pub fn apply_montage<B: SignalBackend>(backend: &mut B, raw: B::Raw, config: &Config) -> Result<B::Raw> {
    let vis = &config.visualization;
    if vis.use_montage {
        log::debug!("Applying montage {}", vis.montage_kind);
        backend.set_montage(raw, &vis.montage_kind)
    } else {
        Ok(raw)
    }
}

/// Sensor layout; skipped without a montage.
pub fn plot_sensors<B: SignalBackend>(
    backend: &mut B,
    raw: &B::Raw,
    config: &Config,
    target: FigureTarget<'_>,
) -> Result<FigureReport> {
    let mut report = FigureReport::default();
    if !config.visualization.use_montage {
        log::debug!("use_montage is off; sensor layout skipped");
        return Ok(report);
    }
    let fig = backend.plot_sensors(raw)?;
    emit(backend, fig, config, target, ArtifactKind::Sensors, "sensor_layout", &mut report)?;
    Ok(report)
}

pub fn plot_raw<B: SignalBackend>(
    backend: &mut B,
    raw: &B::Raw,
    config: &Config,
    target: FigureTarget<'_>,
) -> Result<FigureReport> {
    let vis = &config.visualization;
    let options = RawPlotOptions {
        duration: vis.duration,
        start: vis.start,
        n_channels: vis.n_channels,
        scalings: vis.resolved_scalings(),
        show_events: vis.show_events,
        title: "Raw EEG Signal".to_string(),
    };
    let mut report = FigureReport::default();
    let fig = backend.plot_raw(raw, &options)?;
    emit(backend, fig, config, target, ArtifactKind::Raw, "raw_eeg_signal", &mut report)?;
    Ok(report)
}

pub fn plot_psd<B: SignalBackend>(
    backend: &mut B,
    raw: &B::Raw,
    config: &Config,
    target: FigureTarget<'_>,
) -> Result<FigureReport> {
    let vis = &config.visualization;
    let options = PsdPlotOptions {
        fmin: vis.psd_fmin,
        fmax: vis.psd_fmax,
        average: vis.psd_average,
    };
    let mut report = FigureReport::default();
    let fig = backend.plot_psd(raw, &options)?;
    emit(backend, fig, config, target, ArtifactKind::Psd, "power_spectral_density", &mut report)?;
    Ok(report)
}

/// Per condition: epochs image, evoked topomap and PSD mean ± std.
///
/// The evoked response gets the default standard layout when it carries no
/// sensor positions.
pub fn plot_all_conditionwise<B: SignalBackend>(
    backend: &mut B,
    epochs: &B::Epochs,
    labels: &[String],
    config: &Config,
    target: FigureTarget<'_>,
) -> Result<FigureReport> {
    let vis = &config.visualization;
    let mut report = FigureReport::default();

    for label in labels {
        let fig = backend.plot_epochs_image(epochs, label, &vis.picks)?;
        emit(
            backend,
            fig,
            config,
            target,
            ArtifactKind::Epochs,
            &format!("epochs_image_{}", label),
            &mut report,
        )?;

        let mut evoked = backend.average(epochs, label)?;
        if !backend.evoked_has_montage(&evoked)? {
            evoked = backend.set_evoked_montage(evoked, &vis.montage_kind)?;
        }
        let fig = backend.plot_topomap(&evoked, &vis.topomap_times)?;
        emit(
            backend,
            fig,
            config,
            target,
            ArtifactKind::Topomap,
            &format!("topomap_{}", label),
            &mut report,
        )?;

        let psd = backend.compute_psd(epochs, label, vis.psd_fmin, vis.psd_fmax)?;
        let title = format!("PSD (mean ± std) - {}", config.display_label(label));
        let plot = PsdSummary::from_psd(&psd)?.into_plot(title);
        let fig = backend.plot_psd_band(&plot)?;
        emit(
            backend,
            fig,
            config,
            target,
            ArtifactKind::Psd,
            &format!("psd_conditionwise_{}", label),
            &mut report,
        )?;
    }

    Ok(report)
}
