// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Absolute calibration of measured visibilities against a model.
//!
//! Gains are found from linearisations of the calibration equation
//!
//! V_ij^model = g_i conj(g_j) V_ij^data
//!
//! with g_i = exp(eta_i + i phi_i). The five linearisations are:
//!
//! 1. amplitude: ln|V_ij^model| - ln|V_ij^data| = eta_i + eta_j
//! 2. phase: arg(V_ij^model conj(V_ij^data)) = phi_i - phi_j
//! 3. average amplitude: |V_ij^model| / |V_ij^data| = A
//! 4. tip-tilt phase: arg(V_ij^model conj(V_ij^data)) = psi + Phi . B_ij,
//!    where B_ij = x_j - x_i
//! 5. delay: delay(V_ij^model / V_ij^data) = tau_i - tau_j, with the gain
//!    exp(2 pi i tau nu)
//!
//! Every step solves against the data calibrated by all of the other
//! components solved so far, so the solved components compose. [`AbsCal::run`]
//! goes from coarse to fine: delay, tip-tilt phase, phase, amplitude, then
//! average amplitude. Solving delays first keeps the per-antenna phase
//! differences away from the +-pi branch cut.

mod equations;
mod error;
mod merge;

pub use error::AbsCalError;
pub use merge::MergeAxes;

use indexmap::IndexMap;
use log::{debug, info, trace};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use self::equations::TipTiltParam;
use crate::{
    c64,
    constants::DEFAULT_DELAY_KERNEL,
    container::{BaselineKey, DataContainer},
    delay::DelayOpts,
    diagnostics::Diagnostic,
    gains::{GainComponent, GainSolution, Gains, Solved, TipTilt},
    math::median,
    pol::{AntKey, AntPol, Pol},
    solutions::GainConvention,
};

/// How to fix the degeneracies of the phase and delay solutions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gauge {
    /// Use the minimum-norm (pseudo-inverse) solution.
    #[default]
    MinNorm,

    /// Subtract this antenna's solution from every antenna of the same
    /// polarisation, so the reference antenna's solution is zero.
    RefAnt(usize),
}

/// Which calibration steps to run, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsCalParams {
    pub amp: bool,
    pub phase: bool,
    pub tip_tilt: bool,
    pub abs_amp: bool,
    pub delay: bool,

    /// The axes tied together by the amplitude, phase, tip-tilt and average
    /// amplitude steps.
    pub merge: MergeAxes,

    /// Fix the overall phase of the tip-tilt step to zero.
    pub zero_psi: bool,

    /// The reference antenna for the phase and delay steps. If not given, the
    /// minimum-norm solution is used.
    pub refant: Option<usize>,

    /// The (time, frequency) median-filter kernel applied before delay
    /// searches.
    pub delay_kernel: (usize, usize),

    pub delay_opts: DelayOpts,

    /// The convention of written-out gains.
    pub convention: GainConvention,
}

impl Default for AbsCalParams {
    fn default() -> Self {
        AbsCalParams {
            amp: true,
            phase: true,
            tip_tilt: false,
            abs_amp: false,
            delay: false,
            merge: MergeAxes::default(),
            zero_psi: false,
            refant: None,
            delay_kernel: DEFAULT_DELAY_KERNEL,
            delay_opts: DelayOpts::default(),
            convention: GainConvention::Multiply,
        }
    }
}

impl AbsCalParams {
    pub fn gauge(&self) -> Gauge {
        self.refant.map(Gauge::RefAnt).unwrap_or_default()
    }
}

/// The model, data and weights of one baseline, all in the same orientation.
#[derive(Debug, Clone)]
pub(crate) struct Visibility {
    pub(crate) key: BaselineKey,
    pub(crate) model: Array2<c64>,
    pub(crate) data: Array2<c64>,
    pub(crate) wgts: Array2<f64>,
}

/// An absolute calibration problem and the gain components solved so far.
///
/// The inputs are copied on construction; nothing the caller owns is ever
/// modified.
#[derive(Debug, Clone)]
pub struct AbsCal {
    vis: Vec<Visibility>,

    /// The (num_times, num_freqs) shape of every waterfall.
    shape: (usize, usize),

    antennas: Vec<usize>,
    ant_keys: Vec<AntKey>,
    pols: Vec<Pol>,

    /// (East, North) antenna positions \[metres\] relative to the median
    /// position of the array.
    antpos: Option<IndexMap<usize, [f64; 2]>>,

    /// \[Hz\]
    freqs: Option<Vec<f64>>,

    /// \[Julian Date\]
    times: Option<Vec<f64>>,

    solution: GainSolution,
}

impl AbsCal {
    /// Set up absolute calibration. Only baselines present in the model, data
    /// and (if given) weights are used; missing weights default to unity.
    /// Auto-correlations are ignored. Antenna positions have 2 or 3
    /// (East, North, Up) components.
    pub fn new(
        model: &DataContainer<c64>,
        data: &DataContainer<c64>,
        wgts: Option<&DataContainer<f64>>,
        antpos: Option<&IndexMap<usize, Vec<f64>>>,
        freqs: Option<Vec<f64>>,
        times: Option<Vec<f64>>,
    ) -> Result<AbsCal, AbsCalError> {
        let shape = data.shape().ok_or(AbsCalError::NoCommonBaselines)?;
        for (what, other) in [
            ("model", model.shape()),
            ("weights", wgts.and_then(|w| w.shape())),
        ] {
            match other {
                Some(got) if got != shape => {
                    return Err(AbsCalError::ShapeMismatch {
                        what,
                        expected: shape,
                        got,
                    })
                }
                _ => (),
            }
        }
        for (what, len, expected) in [
            ("frequencies", freqs.as_ref().map(|f| f.len()), shape.1),
            ("times", times.as_ref().map(|t| t.len()), shape.0),
        ] {
            match len {
                Some(got) if got != expected => {
                    return Err(AbsCalError::AxisLength {
                        what,
                        expected,
                        got,
                    })
                }
                _ => (),
            }
        }

        let mut vis = vec![];
        for key in data.keys() {
            if key.is_auto() {
                trace!("Ignoring auto-correlation {key}");
                continue;
            }
            key.pol.split()?;
            let Some(m) = model.get(key) else {
                debug!("Baseline {key} isn't in the model; skipping");
                continue;
            };
            let w = match wgts {
                Some(wgts) => match wgts.get(key) {
                    Some(w) => w.into_owned(),
                    None => {
                        debug!("Baseline {key} has no weights; skipping");
                        continue;
                    }
                },
                None => Array2::ones(shape),
            };
            vis.push(Visibility {
                key,
                model: m.into_owned(),
                data: data.try_get(key)?.into_owned(),
                wgts: w,
            });
        }
        if vis.is_empty() {
            return Err(AbsCalError::NoCommonBaselines);
        }

        let mut antennas: Vec<usize> = vis.iter().flat_map(|v| [v.key.ant1, v.key.ant2]).collect();
        antennas.sort_unstable();
        antennas.dedup();
        let mut pols: Vec<Pol> = vis.iter().map(|v| v.key.pol).collect();
        pols.sort_unstable();
        pols.dedup();
        let mut ant_keys: Vec<AntKey> = vis
            .iter()
            .filter_map(|v| {
                let (p1, p2) = v.key.pol.split().ok()?;
                Some([(v.key.ant1, p1), (v.key.ant2, p2)])
            })
            .flatten()
            .collect();
        ant_keys.sort_unstable();
        ant_keys.dedup();

        let antpos = antpos.map(|a| centre_antpos(a, &antennas)).transpose()?;

        info!(
            "AbsCal using {} baselines, {} antennas, {} polarisations, {} times and {} frequencies",
            vis.len(),
            antennas.len(),
            pols.len(),
            shape.0,
            shape.1
        );

        Ok(AbsCal {
            vis,
            shape,
            antennas,
            ant_keys,
            pols,
            antpos,
            freqs,
            times,
            solution: GainSolution::default(),
        })
    }

    pub fn antennas(&self) -> &[usize] {
        &self.antennas
    }

    pub fn ant_keys(&self) -> &[AntKey] {
        &self.ant_keys
    }

    pub fn pols(&self) -> &[Pol] {
        &self.pols
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn freqs(&self) -> Option<&[f64]> {
        self.freqs.as_deref()
    }

    pub fn times(&self) -> Option<&[f64]> {
        self.times.as_deref()
    }

    /// Antenna (East, North) positions relative to the median array position.
    pub fn antpos(&self) -> Option<&IndexMap<usize, [f64; 2]>> {
        self.antpos.as_ref()
    }

    pub fn solution(&self) -> &GainSolution {
        &self.solution
    }

    pub fn num_baselines(&self) -> usize {
        self.vis.len()
    }

    /// Solve ln|V_model| - ln|V_data| = eta_i + eta_j.
    pub fn amp_logcal(&mut self, merge: MergeAxes) {
        debug!("Running amplitude log-cal with {merge:?}");
        let groups = merge.partition(self.shape, &self.pols);
        let vis = self.calibrated_vis(GainComponent::Amplitude);
        let solutions = equations::amp_logcal(&vis, &groups);
        self.solution.amp =
            Solved::Solved(broadcast_ants(&groups, &solutions, &self.ant_keys, self.shape));
    }

    /// Solve arg(V_model conj(V_data)) = phi_i - phi_j.
    pub fn phs_logcal(&mut self, merge: MergeAxes, gauge: Gauge) -> Result<(), AbsCalError> {
        debug!("Running phase log-cal with {merge:?} and {gauge:?}");
        self.check_gauge(gauge)?;
        let groups = merge.partition(self.shape, &self.pols);
        let vis = self.calibrated_vis(GainComponent::Phase);
        let mut solutions = equations::phs_logcal(&vis, &groups);
        apply_gauge(&mut solutions, gauge);
        self.solution.phase =
            Solved::Solved(broadcast_ants(&groups, &solutions, &self.ant_keys, self.shape));
        Ok(())
    }

    /// Solve |V_model| / |V_data| = A for each antenna polarisation.
    pub fn abs_amp_lincal(&mut self, merge: MergeAxes) {
        debug!("Running average amplitude lin-cal with {merge:?}");
        let groups = merge.partition(self.shape, &self.pols);
        let vis = self.calibrated_vis(GainComponent::AbsAmplitude);
        let solutions = equations::abs_amp_lincal(&vis, &groups);
        let mut abs_amp = self.empty_per_ant_pol();
        for (group, a) in groups.iter().zip(solutions) {
            for pol in &group.ant_pols {
                if let Some(arr) = abs_amp.get_mut(pol) {
                    fill_group(arr.view_mut(), group, a);
                }
            }
        }
        self.solution.abs_amp = Solved::Solved(abs_amp);
    }

    /// Solve arg(V_model conj(V_data)) = psi + Phi . B_ij for the overall
    /// phase psi and the phase gradient Phi. If `zero_psi` is set, psi is fixed
    /// to zero.
    pub fn tt_phs_logcal(&mut self, merge: MergeAxes, zero_psi: bool) -> Result<(), AbsCalError> {
        debug!("Running tip-tilt phase log-cal with {merge:?}, zero_psi: {zero_psi}");
        let antpos = self.antpos.as_ref().ok_or(AbsCalError::NoAntennaPositions)?;
        if let Some(&ant) = self.antennas.iter().find(|a| !antpos.contains_key(*a)) {
            return Err(AbsCalError::MissingAntPos { ant });
        }

        let groups = merge.partition(self.shape, &self.pols);
        let vis = self.calibrated_vis(GainComponent::TipTilt);
        let solutions = equations::tt_phs_logcal(&vis, &groups, antpos, zero_psi);
        let mut psi = self.empty_per_ant_pol();
        let mut phi: IndexMap<AntPol, Array3<f64>> = psi
            .keys()
            .map(|&p| (p, Array3::from_elem((2, self.shape.0, self.shape.1), f64::NAN)))
            .collect();
        for (group, solution) in groups.iter().zip(solutions) {
            let get = |param| solution.get(&param).copied().unwrap_or(f64::NAN);
            let psi_value = if zero_psi { 0.0 } else { get(TipTiltParam::Psi) };
            for pol in &group.ant_pols {
                if let Some(arr) = psi.get_mut(pol) {
                    fill_group(arr.view_mut(), group, psi_value);
                }
                if let Some(arr) = phi.get_mut(pol) {
                    fill_group(arr.index_axis_mut(Axis(0), 0), group, get(TipTiltParam::PhiX));
                    fill_group(arr.index_axis_mut(Axis(0), 1), group, get(TipTiltParam::PhiY));
                }
            }
        }
        self.solution.tip_tilt = Solved::Solved(TipTilt { psi, phi });
        Ok(())
    }

    /// Solve delay(V_model / V_data) = tau_i - tau_j, separately for each
    /// co-polar antenna polarisation. The real and imaginary parts of the
    /// model/data ratio are median filtered with `kernel` (time, frequency)
    /// before delays are searched for.
    pub fn delay_lincal(
        &mut self,
        gauge: Gauge,
        kernel: (usize, usize),
        opts: &DelayOpts,
    ) -> Result<(), AbsCalError> {
        debug!("Running delay lin-cal with {gauge:?}, kernel {kernel:?}, {opts:?}");
        let freqs = self.freqs.as_deref().ok_or(AbsCalError::MissingFreqs)?;
        if kernel.0 % 2 == 0 || kernel.1 % 2 == 0 {
            return Err(AbsCalError::BadKernel(kernel));
        }
        self.check_gauge(gauge)?;

        let co_polar: Vec<Visibility> = self
            .calibrated_vis(GainComponent::Delay)
            .iter()
            .filter(|v| v.key.pol.is_co_polar())
            .cloned()
            .collect();
        let delays = equations::baseline_delays(&co_polar, freqs, kernel, opts)?;
        let num_slots = if opts.average_time { 1 } else { self.shape.0 };
        let groups = MergeAxes::default().partition((num_slots, 1), &self.pols);
        let mut solutions = equations::delay_lincal(&delays, &groups);
        apply_gauge(&mut solutions, gauge);

        let mut taus: IndexMap<AntKey, Array1<f64>> = self
            .ant_keys
            .iter()
            .map(|&k| (k, Array1::from_elem(self.shape.0, f64::NAN)))
            .collect();
        for (group, solution) in groups.iter().zip(solutions) {
            for (&ant, &tau) in &solution {
                for &pol in &group.ant_pols {
                    if let Some(arr) = taus.get_mut(&(ant, pol)) {
                        if opts.average_time {
                            arr.fill(tau);
                        } else {
                            for &t in &group.times {
                                arr[t] = tau;
                            }
                        }
                    }
                }
            }
        }
        self.solution.delay = Solved::Solved(taus);
        Ok(())
    }

    /// Run the configured steps, in the order delay, tip-tilt, phase,
    /// amplitude, average amplitude, then form gains. Each step solves on the
    /// data calibrated by the steps before it.
    pub fn run(&mut self, params: &AbsCalParams) -> Result<(Gains, Vec<Diagnostic>), AbsCalError> {
        let gauge = params.gauge();
        if params.delay {
            info!("Running delay calibration");
            self.delay_lincal(gauge, params.delay_kernel, &params.delay_opts)?;
        }
        if params.tip_tilt {
            info!("Running tip-tilt phase calibration");
            self.tt_phs_logcal(params.merge, params.zero_psi)?;
        }
        if params.phase {
            info!("Running phase calibration");
            self.phs_logcal(params.merge, gauge)?;
        }
        if params.amp {
            info!("Running amplitude calibration");
            self.amp_logcal(params.merge);
        }
        if params.abs_amp {
            info!("Running average amplitude calibration");
            self.abs_amp_lincal(params.merge);
        }
        Ok(self.make_gains())
    }

    /// Form gains (multiply convention) from every solved component.
    pub fn make_gains(&self) -> (Gains, Vec<Diagnostic>) {
        self.solution.make_gains(
            &self.ant_keys,
            self.antpos.as_ref(),
            self.freqs.as_deref(),
            self.shape,
        )
    }

    /// The visibilities with their data calibrated by every solved component
    /// except `component`, i.e. V_data -> g_i conj(g_j) V_data. Baselines
    /// touching an antenna without a usable gain become NaN and are ignored by
    /// the equations.
    fn calibrated_vis(&self, component: GainComponent) -> Vec<Visibility> {
        let others = self.solution.without(component);
        if !others.any_solved() {
            return self.vis.clone();
        }
        trace!("Calibrating data with every component except {component}");
        let gains = others.form_gains(
            &self.ant_keys,
            self.antpos.as_ref(),
            self.freqs.as_deref(),
            self.shape,
        );
        let nan = c64::new(f64::NAN, f64::NAN);
        self.vis
            .iter()
            .map(|v| {
                let mut v = v.clone();
                let ant_gains = v.key.pol.split().ok().and_then(|(p1, p2)| {
                    Some((gains.get(&(v.key.ant1, p1))?, gains.get(&(v.key.ant2, p2))?))
                });
                match ant_gains {
                    Some((g1, g2)) => {
                        azip!((d in &mut v.data, &g1 in g1, &g2 in g2) *d *= g1 * g2.conj())
                    }
                    None => v.data.fill(nan),
                }
                v
            })
            .collect()
    }

    fn check_gauge(&self, gauge: Gauge) -> Result<(), AbsCalError> {
        match gauge {
            Gauge::RefAnt(ant) if !self.antennas.contains(&ant) => {
                Err(AbsCalError::RefAntMissing { ant })
            }
            _ => Ok(()),
        }
    }

    fn empty_per_ant_pol(&self) -> IndexMap<AntPol, Array2<f64>> {
        let mut ant_pols: Vec<AntPol> = self.ant_keys.iter().map(|(_, p)| *p).collect();
        ant_pols.sort_unstable();
        ant_pols.dedup();
        ant_pols
            .into_iter()
            .map(|p| (p, Array2::from_elem(self.shape, f64::NAN)))
            .collect()
    }
}

/// Subtract the median position from 2D or 3D antenna positions, keeping only
/// the first two (East, North) components.
fn centre_antpos(
    antpos: &IndexMap<usize, Vec<f64>>,
    antennas: &[usize],
) -> Result<IndexMap<usize, [f64; 2]>, AbsCalError> {
    let mut en = IndexMap::with_capacity(antpos.len());
    for (&ant, pos) in antpos {
        match pos.as_slice() {
            [e, n, ..] => {
                en.insert(ant, [*e, *n]);
            }
            _ => {
                return Err(AbsCalError::ShortAntPos {
                    ant,
                    num: pos.len(),
                })
            }
        }
    }

    let present: Vec<[f64; 2]> = antennas.iter().filter_map(|a| en.get(a)).copied().collect();
    let centre = [
        median(present.iter().map(|p| p[0])),
        median(present.iter().map(|p| p[1])),
    ];
    if centre.iter().all(|c| c.is_finite()) {
        for p in en.values_mut() {
            p[0] -= centre[0];
            p[1] -= centre[1];
        }
    }
    Ok(en)
}

/// Subtract the reference antenna's value from every solution in each group.
fn apply_gauge(solutions: &mut [IndexMap<usize, f64>], gauge: Gauge) {
    if let Gauge::RefAnt(refant) = gauge {
        for solution in solutions {
            let reference = solution.get(&refant).copied().unwrap_or(f64::NAN);
            solution.values_mut().for_each(|v| *v -= reference);
        }
    }
}

fn fill_group(mut arr: ArrayViewMut2<f64>, group: &merge::SolveGroup, value: f64) {
    for &t in &group.times {
        for &f in &group.freqs {
            arr[(t, f)] = value;
        }
    }
}

/// Broadcast per-antenna group solutions back into per antenna-polarisation
/// waterfalls. Antennas without a solution are NaN.
fn broadcast_ants(
    groups: &[merge::SolveGroup],
    solutions: &[IndexMap<usize, f64>],
    ant_keys: &[AntKey],
    shape: (usize, usize),
) -> IndexMap<AntKey, Array2<f64>> {
    let mut out: IndexMap<AntKey, Array2<f64>> = ant_keys
        .iter()
        .map(|&k| (k, Array2::from_elem(shape, f64::NAN)))
        .collect();
    for (group, solution) in groups.iter().zip(solutions) {
        for (&ant, &value) in solution {
            for &pol in &group.ant_pols {
                if let Some(arr) = out.get_mut(&(ant, pol)) {
                    fill_group(arr.view_mut(), group, value);
                }
            }
        }
    }
    out
}
