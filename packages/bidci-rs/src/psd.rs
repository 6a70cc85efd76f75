//! Mean ± std statistics over per-epoch spectra.

use crate::backend::{PsdBandPlot, PsdData};
use crate::error::{BidciError, Result};
use nalgebra::DMatrix;

/// Spectra of one condition reduced over epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct PsdSummary {
    pub freqs: Vec<f64>,
    /// channels × frequencies, mean over epochs.
    pub mean: DMatrix<f64>,
    /// channels × frequencies, population std over epochs.
    pub std: DMatrix<f64>,
    /// Channel average of `mean - std`, per frequency.
    pub lower: Vec<f64>,
    /// Channel average of `mean + std`, per frequency.
    pub upper: Vec<f64>,
}

impl PsdSummary {
    pub fn from_psd(psd: &PsdData) -> Result<Self> {
        let n_freqs = psd.freqs.len();
        let n_epochs = psd.data.len();
        if n_epochs == 0 {
            return Err(BidciError::Precondition(
                "PSD statistics need at least one epoch".to_string(),
            ));
        }
        let n_channels = psd.data[0].len();
        if n_channels == 0 || n_freqs == 0 {
            return Err(BidciError::Precondition(
                "PSD statistics need at least one channel and one frequency".to_string(),
            ));
        }

        let mut epochs = Vec::with_capacity(n_epochs);
        for (e, channels) in psd.data.iter().enumerate() {
            if channels.len() != n_channels || channels.iter().any(|row| row.len() != n_freqs) {
                return Err(BidciError::backend(
                    "compute_psd",
                    format!(
                        "epoch {} does not match {} channels × {} frequencies",
                        e, n_channels, n_freqs
                    ),
                ));
            }
            epochs.push(DMatrix::from_fn(n_channels, n_freqs, |c, f| channels[c][f]));
        }

        let n = n_epochs as f64;
        let sum = epochs
            .iter()
            .fold(DMatrix::<f64>::zeros(n_channels, n_freqs), |acc, m| acc + m);
        let mean = sum / n;
        let var = epochs.iter().fold(DMatrix::<f64>::zeros(n_channels, n_freqs), |acc, m| {
            let d = m - &mean;
            acc + d.component_mul(&d)
        }) / n;
        let std = var.map(f64::sqrt);

        let lower = (&mean - &std).row_mean().iter().copied().collect();
        let upper = (&mean + &std).row_mean().iter().copied().collect();

        Ok(Self {
            freqs: psd.freqs.clone(),
            mean,
            std,
            lower,
            upper,
        })
    }

    pub fn into_plot(self, title: impl Into<String>) -> PsdBandPlot {
        let channel_means = self
            .mean
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        PsdBandPlot {
            title: title.into(),
            freqs: self.freqs,
            channel_means,
            lower: self.lower,
            upper: self.upper,
        }
    }
}
