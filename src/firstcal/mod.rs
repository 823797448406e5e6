// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Delay calibration from redundant baselines.
//!
//! Baselines in the same redundant group should see the same sky, so the
//! delay of d_kl conj(d_ij) for two baselines (i, j) and (k, l) in a group is
//! purely instrumental. Every such pair gives one equation
//!
//! tau_i - tau_j - tau_k + tau_l = delay(d_kl conj(d_ij))
//!
//! and the per-antenna delays are the pseudo-inverse solution of the stacked
//! equations. The delays are those of multiply gains exp(2 pi i tau nu).
//! They are only determined up to the degeneracies of redundant calibration
//! (an overall delay, and a delay gradient across the array).

mod error;
mod redundancy;

pub use error::FirstCalError;
pub use redundancy::{get_reds, Baseline, BaselinePair, RedundantInfo};

use std::borrow::Cow;

use indexmap::IndexMap;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    abscal::Gauge,
    c64,
    constants::{DEFAULT_REDUNDANCY_TOL, PINV_RCOND, TAU},
    container::{BaselineKey, DataContainer},
    delay::{fft_delay, DelayError, DelayOpts},
    gains::Gains,
    math::{cexp, pinv},
    pol::{Pol, PolError},
    solutions::GainConvention,
    PROGRESS_BARS,
};

/// Settings for a FirstCal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstCalParams {
    /// The (co-polar) visibility polarisation to calibrate.
    pub pol: Pol,

    /// Baselines are redundant if their separations agree within this many
    /// metres.
    pub redundancy_tol: f64,

    pub delay_opts: DelayOpts,

    /// The antenna with zero delay. If not given, the minimum-norm solution
    /// is used.
    pub refant: Option<usize>,

    /// The convention of written-out gains.
    pub convention: GainConvention,
}

impl Default for FirstCalParams {
    fn default() -> Self {
        FirstCalParams {
            pol: Pol::XX,
            redundancy_tol: DEFAULT_REDUNDANCY_TOL,
            delay_opts: DelayOpts::default(),
            refant: None,
            convention: GainConvention::Multiply,
        }
    }
}

impl FirstCalParams {
    pub fn gauge(&self) -> Gauge {
        self.refant.map(Gauge::RefAnt).unwrap_or_default()
    }
}

/// Measure the delay between two redundant baselines, i.e. the delay of
/// d2 conj(d1). Returns one delay per time, or a single delay if
/// `opts.average_time` is set.
pub fn redundant_bl_cal(
    d1: ArrayView2<c64>,
    w1: ArrayView2<f64>,
    d2: ArrayView2<c64>,
    w2: ArrayView2<f64>,
    freqs: &[f64],
    opts: &DelayOpts,
) -> Result<Array1<f64>, DelayError> {
    if d1.dim() != d2.dim() || w1.dim() != w2.dim() {
        return Err(DelayError::ShapeMismatch {
            vis: d2.dim(),
            wgts: w2.dim(),
            num_freqs: freqs.len(),
        });
    }
    let d12 = &d2 * &d1.mapv(|v| v.conj());
    let w12 = &w1 * &w2;
    fft_delay(d12.view(), w12.view(), freqs, opts)
}

/// Per-antenna delays found by [`FirstCal::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct FirstCalSolution {
    pub pol: Pol,

    /// The delay \[s\] of each antenna for each time (or a single time, if
    /// the data were averaged over time). Unconstrained antennas have NaN
    /// delays.
    pub delays: IndexMap<usize, Array1<f64>>,
}

impl FirstCalSolution {
    /// Expand the delays into multiply gains exp(2 pi i tau nu) of shape
    /// (num_times, num_freqs). A single time-averaged delay is used for every
    /// time.
    pub fn gains(&self, freqs: &[f64], num_times: usize) -> Result<Gains, PolError> {
        let (ant_pol, _) = self.pol.split()?;
        let gains = self
            .delays
            .iter()
            .map(|(&ant, delays)| {
                let gains = Array2::from_shape_fn((num_times, freqs.len()), |(t, f)| {
                    let tau = if delays.len() == 1 { delays[0] } else { delays[t] };
                    cexp(TAU * tau * freqs[f])
                });
                ((ant, ant_pol), gains)
            })
            .collect();
        Ok(gains)
    }
}

/// A redundant delay calibration problem for a single polarisation.
#[derive(Debug)]
pub struct FirstCal<'a> {
    data: &'a DataContainer<c64>,
    wgts: Option<&'a DataContainer<f64>>,
    freqs: &'a [f64],
    info: &'a RedundantInfo,
    pol: Pol,

    /// The variance of each baseline pair's delay measurement.
    variances: Option<Array1<f64>>,
}

impl<'a> FirstCal<'a> {
    /// Every baseline of `info` must be in the data (in either orientation)
    /// for the polarisation `pol`. If no weights are given, all data are
    /// equally weighted.
    pub fn new(
        data: &'a DataContainer<c64>,
        wgts: Option<&'a DataContainer<f64>>,
        freqs: &'a [f64],
        info: &'a RedundantInfo,
        pol: Pol,
    ) -> Result<FirstCal<'a>, FirstCalError> {
        if !pol.is_co_polar() {
            return Err(FirstCalError::NotCoPolar(pol));
        }
        if let Some(shape) = data.shape() {
            if freqs.len() != shape.1 {
                return Err(FirstCalError::FreqsLength {
                    expected: shape.1,
                    got: freqs.len(),
                });
            }
            if let Some(wgts_shape) = wgts.and_then(|w| w.shape()) {
                if wgts_shape != shape {
                    return Err(FirstCalError::ShapeMismatch {
                        expected: shape,
                        got: wgts_shape,
                    });
                }
            }
        }
        for &(i, j) in info.bl_index.keys() {
            let key = BaselineKey::new(i, j, pol);
            if !data.contains(key) {
                return Err(FirstCalError::MissingBaseline(key));
            }
            if let Some(wgts) = wgts {
                if !wgts.contains(key) {
                    return Err(FirstCalError::MissingWeights(key));
                }
            }
        }

        debug!(
            "FirstCal for {pol}: {} antennas, {} baselines, {} baseline pairs",
            info.antennas.len(),
            info.bl_index.len(),
            info.num_pairs()
        );
        Ok(FirstCal {
            data,
            wgts,
            freqs,
            info,
            pol,
            variances: None,
        })
    }

    /// Use the given variances of the baseline-pair delay measurements (one
    /// per pair, in the order of `RedundantInfo::bl_pairs`) instead of unit
    /// variances.
    pub fn with_variances(mut self, variances: Array1<f64>) -> Result<Self, FirstCalError> {
        if variances.len() != self.info.num_pairs() {
            return Err(FirstCalError::CovarianceLength {
                expected: self.info.num_pairs(),
                got: variances.len(),
            });
        }
        self.variances = Some(variances);
        Ok(self)
    }

    fn baseline(&self, (i, j): Baseline) -> (Cow<'a, Array2<c64>>, Cow<'a, Array2<f64>>) {
        let key = BaselineKey::new(i, j, self.pol);
        let data: &'a DataContainer<c64> = self.data;
        // Presence was checked on construction.
        let data = match data.get(key) {
            Some(d) => d,
            None => unreachable!(),
        };
        let wgts = match self.wgts.and_then(|w: &'a DataContainer<f64>| w.get(key)) {
            Some(w) => w,
            None => Cow::Owned(Array2::ones(data.dim())),
        };
        (data, wgts)
    }

    /// Measure the delay of every baseline pair. The pairs are independent and
    /// are measured in parallel.
    pub fn data_to_delays(
        &self,
        opts: &DelayOpts,
    ) -> Result<IndexMap<BaselinePair, Array1<f64>>, FirstCalError> {
        let progress = make_firstcal_progress_bar(
            self.info.num_pairs(),
            format!("Measuring {} baseline-pair delays", self.pol),
        );
        let delays = self
            .info
            .bl_pairs
            .par_iter()
            .progress_with(progress.clone())
            .map(|&(bl1, bl2)| -> Result<(BaselinePair, Array1<f64>), FirstCalError> {
                let (d1, w1) = self.baseline(bl1);
                let (d2, w2) = self.baseline(bl2);
                let delays =
                    redundant_bl_cal(d1.view(), w1.view(), d2.view(), w2.view(), self.freqs, opts)?;
                Ok(((bl1, bl2), delays))
            })
            .collect::<Result<IndexMap<_, _>, FirstCalError>>();
        progress.abandon_with_message(format!("Finished measuring {} delays", self.pol));
        delays
    }

    /// The measurement matrix, shape (num pairs, num times). With
    /// `opts.average_time` there is a single time.
    pub fn get_m(&self, opts: &DelayOpts) -> Result<Array2<f64>, FirstCalError> {
        let delays = self.data_to_delays(opts)?;
        let num_slots = if opts.average_time {
            1
        } else {
            self.data.shape().map(|(t, _)| t).unwrap_or(0)
        };
        let mut m = Array2::from_elem((self.info.num_pairs(), num_slots), f64::NAN);
        for (mut row, pair) in m.outer_iter_mut().zip(self.info.bl_pairs.iter()) {
            if let Some(d) = delays.get(pair) {
                row.assign(d);
            }
        }
        Ok(m)
    }

    /// The covariance of the measurements; the identity unless variances were
    /// supplied.
    pub fn get_n(&self) -> Array2<f64> {
        match &self.variances {
            Some(v) => Array2::from_diag(v),
            None => Array2::eye(self.info.num_pairs()),
        }
    }

    /// Solve A^T N^-1 A x = A^T N^-1 M for the antenna delays, separately for
    /// each time. Pairs with unusable measurements (NaN delays or
    /// non-positive variances) are dropped from that time's solve.
    pub fn run(&self, opts: &DelayOpts, gauge: Gauge) -> Result<FirstCalSolution, FirstCalError> {
        let ref_col = match gauge {
            Gauge::MinNorm => None,
            Gauge::RefAnt(ant) => Some(
                *self
                    .info
                    .ant_index
                    .get(&ant)
                    .ok_or(FirstCalError::RefAntMissing { ant })?,
            ),
        };

        let m = self.get_m(opts)?;
        let n_inv = self
            .get_n()
            .diag()
            .mapv(|v| if v > 0.0 && v.is_finite() { 1.0 / v } else { 0.0 });
        let a = &self.info.a;
        let num_ants = self.info.antennas.len();
        let mut x = Array2::from_elem((num_ants, m.len_of(Axis(1))), f64::NAN);

        for (slot, (m_slot, mut x_slot)) in m
            .axis_iter(Axis(1))
            .zip(x.axis_iter_mut(Axis(1)))
            .enumerate()
        {
            let w: Array1<f64> = n_inv
                .iter()
                .zip(m_slot.iter())
                .map(|(&w, &m)| if m.is_finite() { w } else { 0.0 })
                .collect();
            let m_slot = m_slot.mapv(|m| if m.is_finite() { m } else { 0.0 });
            let wa = a * &w.view().insert_axis(Axis(1));
            let ata = a.t().dot(&wa);
            let atm = wa.t().dot(&m_slot);
            let solution = pinv(ata.view(), PINV_RCOND)
                .map_err(FirstCalError::Pinv)?
                .dot(&atm);

            let mut num_unconstrained = 0;
            for (i_ant, (x, col)) in x_slot.iter_mut().zip(wa.axis_iter(Axis(1))).enumerate() {
                if col.iter().any(|v| *v != 0.0) {
                    *x = solution[i_ant];
                } else {
                    num_unconstrained += 1;
                }
            }
            if num_unconstrained > 0 {
                warn!("{num_unconstrained} antennas have no usable baseline pairs at time {slot}");
            }

            if let Some(r) = ref_col {
                let reference = x_slot[r];
                x_slot.mapv_inplace(|v| v - reference);
            }
        }

        info!(
            "FirstCal solved {} antenna delays for {}",
            num_ants, self.pol
        );
        Ok(FirstCalSolution {
            pol: self.pol,
            delays: self
                .info
                .antennas
                .iter()
                .zip(x.outer_iter())
                .map(|(&ant, d)| (ant, d.to_owned()))
                .collect(),
        })
    }
}

/// Convenience function to make a progress bar while measuring delays.
fn make_firstcal_progress_bar(num_pairs: usize, message: String) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::with_draw_target(
        Some(num_pairs as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(style)
    .with_position(0)
    .with_message(message)
}
