// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Delay searches on complex spectra.
//!
//! A delay is found in two stages. The coarse delay is the peak of the
//! magnitude of the spectrum's Fourier transform along frequency (interpolated
//! over the neighbouring bins). The coarse slope is then removed and a line is
//! fitted to the unwrapped residual phase; the fitted slope is the fine
//! correction. Both AbsCal's delay step and FirstCal use this search.


use log::trace;
use ndarray::prelude::*;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    c64,
    constants::TAU,
    math::{cexp, fit_line, median, unwrap_phase},
};

/// The window function applied to a spectrum before it is Fourier
/// transformed.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    #[default]
    None,
    Hann,
    Blackman,
    BlackmanHarris,
}

impl Window {
    /// The (symmetric) taper for `n` channels.
    pub fn taper(self, n: usize) -> Array1<f64> {
        if n < 2 {
            return Array1::ones(n);
        }
        let denom = (n - 1) as f64;
        Array1::from_shape_fn(n, |i| {
            let a = TAU * i as f64 / denom;
            match self {
                Window::None => 1.0,
                Window::Hann => 0.5 - 0.5 * a.cos(),
                Window::Blackman => 0.42 - 0.5 * a.cos() + 0.08 * (2.0 * a).cos(),
                Window::BlackmanHarris => {
                    0.35875 - 0.48829 * a.cos() + 0.14128 * (2.0 * a).cos()
                        - 0.01168 * (3.0 * a).cos()
                }
            }
        })
    }
}

/// Options controlling a delay search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayOpts {
    pub window: Window,

    /// Refine the coarse (FFT) delay with a linear fit to the residual phase.
    pub fine_tune: bool,

    /// Collapse the time axis before searching, producing a single delay.
    pub average_time: bool,

    /// Only fit channels inside this (low, high) band \[Hz\] when fine-tuning.
    pub fit_band: Option<(f64, f64)>,
}

impl Default for DelayOpts {
    fn default() -> Self {
        DelayOpts {
            window: Window::None,
            fine_tune: true,
            average_time: false,
            fit_band: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DelayError {
    #[error("A delay search needs at least 2 frequencies, but {0} were given")]
    TooFewFreqs(usize),

    #[error("Frequencies must be increasing; the median channel width is {0} Hz")]
    BadChannelWidth(f64),

    #[error("Spectrum shape {vis:?} doesn't match the weights shape {wgts:?} and/or the number of frequencies ({num_freqs})")]
    ShapeMismatch {
        vis: (usize, usize),
        wgts: (usize, usize),
        num_freqs: usize,
    },
}

/// Find the delay \[s\] of each time in a (time, frequency) spectrum, i.e. the
/// tau for which the spectrum's phase goes like 2 pi tau nu. Only the phase of
/// each channel is used; channels with zero weight don't contribute. If
/// `opts.average_time` is set, the weighted spectrum is summed over time first
/// and a single delay is returned.
///
/// Times without any usable channels get a NaN delay.
pub fn fft_delay(
    vis: ArrayView2<c64>,
    wgts: ArrayView2<f64>,
    freqs: &[f64],
    opts: &DelayOpts,
) -> Result<Array1<f64>, DelayError> {
    let (num_times, num_freqs) = vis.dim();
    if wgts.dim() != vis.dim() || freqs.len() != num_freqs {
        return Err(DelayError::ShapeMismatch {
            vis: vis.dim(),
            wgts: wgts.dim(),
            num_freqs: freqs.len(),
        });
    }
    if num_freqs < 2 {
        return Err(DelayError::TooFewFreqs(num_freqs));
    }
    let df = median(freqs.windows(2).map(|w| w[1] - w[0]));
    if !(df.is_finite() && df > 0.0) {
        return Err(DelayError::BadChannelWidth(df));
    }

    // Weight the spectrum, then normalise it so that bright channels (e.g. RFI)
    // don't dominate the Fourier peak.
    let mut spectra = Array2::from_shape_fn((num_times, num_freqs), |(t, f)| {
        vis[(t, f)] * wgts[(t, f)]
    });
    if opts.average_time {
        spectra = spectra.sum_axis(Axis(0)).insert_axis(Axis(0));
    }
    spectra.mapv_inplace(|v| {
        let norm = v.norm();
        if norm > 0.0 && norm.is_finite() {
            v / norm
        } else {
            c64::default()
        }
    });

    let taper = opts.window.taper(num_freqs);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(num_freqs);
    let mut buffer = vec![c64::default(); num_freqs];

    let delays = spectra
        .outer_iter()
        .map(|spectrum| {
            for ((b, &v), &w) in buffer.iter_mut().zip(spectrum.iter()).zip(taper.iter()) {
                *b = v * w;
            }
            fft.process(&mut buffer);
            let coarse = match peak_delay(&buffer, df) {
                Some(c) => c,
                None => return f64::NAN,
            };
            if opts.fine_tune {
                coarse + residual_delay(spectrum, freqs, coarse, opts.fit_band).unwrap_or(0.0)
            } else {
                coarse
            }
        })
        .collect::<Array1<f64>>();
    trace!("Found delays {delays}");
    Ok(delays)
}

/// The delay \[s\] at the peak of a Fourier-transformed spectrum. The peak is
/// interpolated as the magnitude-weighted mean of the peak bin and its two
/// neighbours (if there are at least 3 bins). Bins past N/2 are negative
/// delays. `None` if the spectrum is all zero.
fn peak_delay(transformed: &[c64], df: f64) -> Option<f64> {
    let n = transformed.len();
    let mags: Vec<f64> = transformed.iter().map(|v| v.norm()).collect();
    let (peak, &peak_mag) = mags
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))?;
    if !(peak_mag > 0.0) {
        return None;
    }

    let signed_peak = if peak > n / 2 {
        peak as isize - n as isize
    } else {
        peak as isize
    };
    // Without two distinct neighbours there's nothing to interpolate with.
    if n < 3 {
        return Some(signed_peak as f64 / (n as f64 * df));
    }
    let (mut num, mut den) = (0.0, 0.0);
    for offset in -1..=1_isize {
        let bin = signed_peak + offset;
        let mag = mags[bin.rem_euclid(n as isize) as usize];
        num += mag * bin as f64;
        den += mag;
    }
    Some(num / den / (n as f64 * df))
}

/// Fit the delay left over after removing `coarse` from a normalised spectrum.
fn residual_delay(
    spectrum: ArrayView1<c64>,
    freqs: &[f64],
    coarse: f64,
    fit_band: Option<(f64, f64)>,
) -> Option<f64> {
    let (x, phases): (Vec<f64>, Vec<f64>) = spectrum
        .iter()
        .zip(freqs.iter())
        .filter(|&(v, &f)| {
            v.norm() > 0.0 && fit_band.map(|(lo, hi)| f > lo && f < hi).unwrap_or(true)
        })
        .map(|(v, &f)| (TAU * f, (v * cexp(-TAU * coarse * f)).arg()))
        .unzip();
    let phases = unwrap_phase(&phases);
    fit_line(&x, &phases).map(|(slope, _)| slope)
}
