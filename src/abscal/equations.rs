// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The linearised calibration equations. Each is built and solved once per
//! [`SolveGroup`]; groups are independent, so they're solved in parallel.

use std::hash::Hash;

use indexmap::IndexMap;
use ndarray::prelude::*;
use rayon::prelude::*;

use super::{merge::SolveGroup, Visibility};
use crate::{
    c64,
    container::BaselineKey,
    delay::{fft_delay, DelayError, DelayOpts},
    math::{median_filter_2d, LinearSystem},
};

/// The unknowns of the tip-tilt equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TipTiltParam {
    Psi,
    PhiX,
    PhiY,
}

/// Build a system for each group with `add_rows`, then solve them all.
fn solve_groups<K, F>(groups: &[SolveGroup], add_rows: F) -> Vec<IndexMap<K, f64>>
where
    K: Hash + Eq + Clone + Send,
    F: Fn(&SolveGroup, &mut LinearSystem<K>) + Sync,
{
    groups
        .par_iter()
        .map(|group| {
            let mut system = LinearSystem::new();
            add_rows(group, &mut system);
            system.solve()
        })
        .collect()
}

/// Call `f` with the model, data and weight of every pixel belonging to a
/// group.
fn for_each_pixel<F>(vis: &[Visibility], group: &SolveGroup, mut f: F)
where
    F: FnMut(BaselineKey, c64, c64, f64),
{
    for v in vis.iter().filter(|v| group.pols.contains(&v.key.pol)) {
        for &t in &group.times {
            for &i_freq in &group.freqs {
                f(
                    v.key,
                    v.model[(t, i_freq)],
                    v.data[(t, i_freq)],
                    v.wgts[(t, i_freq)],
                );
            }
        }
    }
}

/// ln|V_model| - ln|V_data| = eta_i + eta_j
pub(crate) fn amp_logcal(vis: &[Visibility], groups: &[SolveGroup]) -> Vec<IndexMap<usize, f64>> {
    solve_groups(groups, |group, system| {
        for_each_pixel(vis, group, |key, m, d, w| {
            system.add_equation(
                &[(key.ant1, 1.0), (key.ant2, 1.0)],
                m.norm().ln() - d.norm().ln(),
                w,
            );
        })
    })
}

/// arg(V_model conj(V_data)) = phi_i - phi_j
///
/// The phase difference is taken from the complex product, so it's always in
/// (-pi, pi] and never crosses a branch cut.
pub(crate) fn phs_logcal(vis: &[Visibility], groups: &[SolveGroup]) -> Vec<IndexMap<usize, f64>> {
    solve_groups(groups, |group, system| {
        for_each_pixel(vis, group, |key, m, d, w| {
            system.add_equation(
                &[(key.ant1, 1.0), (key.ant2, -1.0)],
                (m * d.conj()).arg(),
                w,
            );
        })
    })
}

/// |V_model| / |V_data| = A
pub(crate) fn abs_amp_lincal(vis: &[Visibility], groups: &[SolveGroup]) -> Vec<f64> {
    solve_groups(groups, |group, system| {
        for_each_pixel(vis, group, |_, m, d, w| {
            system.add_equation(&[((), 1.0)], m.norm() / d.norm(), w);
        })
    })
    .into_iter()
    .map(|solution| solution.get(&()).copied().unwrap_or(f64::NAN))
    .collect()
}

/// arg(V_model conj(V_data)) = psi + phi . B_ij, where B_ij = x_j - x_i is the
/// (East, North) baseline vector. psi is left out when `zero_psi` is set.
/// Baselines without a vector are skipped.
pub(crate) fn tt_phs_logcal(
    vis: &[Visibility],
    groups: &[SolveGroup],
    antpos: &IndexMap<usize, [f64; 2]>,
    zero_psi: bool,
) -> Vec<IndexMap<TipTiltParam, f64>> {
    solve_groups(groups, |group, system| {
        for_each_pixel(vis, group, |key, m, d, w| {
            let (Some(xi), Some(xj)) = (antpos.get(&key.ant1), antpos.get(&key.ant2)) else {
                return;
            };
            let b = [xj[0] - xi[0], xj[1] - xi[1]];
            let obs = (m * d.conj()).arg();
            if zero_psi {
                system.add_equation(
                    &[(TipTiltParam::PhiX, b[0]), (TipTiltParam::PhiY, b[1])],
                    obs,
                    w,
                );
            } else {
                system.add_equation(
                    &[
                        (TipTiltParam::Psi, 1.0),
                        (TipTiltParam::PhiX, b[0]),
                        (TipTiltParam::PhiY, b[1]),
                    ],
                    obs,
                    w,
                );
            }
        })
    })
}

/// The delays of one baseline's model/data ratio, and the weight of each.
#[derive(Debug, Clone)]
pub(crate) struct BaselineDelays {
    pub(crate) key: BaselineKey,
    pub(crate) delays: Array1<f64>,
    pub(crate) weights: Array1<f64>,
}

/// Measure the delay of V_model / V_data for each baseline. The real and
/// imaginary parts of the ratio are median filtered with `kernel` before the
/// search. Pixels with zero weight or zero data are ignored.
pub(crate) fn baseline_delays(
    vis: &[Visibility],
    freqs: &[f64],
    kernel: (usize, usize),
    opts: &DelayOpts,
) -> Result<Vec<BaselineDelays>, DelayError> {
    vis.par_iter()
        .map(|v| {
            let ratio = &v.model / &v.data;
            let valid = Array2::from_shape_fn(ratio.dim(), |ix| {
                v.wgts[ix] > 0.0 && ratio[ix].is_finite()
            });
            let re = median_filter_2d(ratio.mapv(|r| r.re).view(), valid.view(), kernel);
            let im = median_filter_2d(ratio.mapv(|r| r.im).view(), valid.view(), kernel);
            let smoothed = Array2::from_shape_fn(ratio.dim(), |ix| c64::new(re[ix], im[ix]));
            let wgts = Array2::from_shape_fn(ratio.dim(), |ix| {
                if valid[ix] {
                    v.wgts[ix]
                } else {
                    0.0
                }
            });

            let delays = fft_delay(smoothed.view(), wgts.view(), freqs, opts)?;
            let weights = if opts.average_time {
                Array1::from_elem(1, wgts.mean().unwrap_or(0.0))
            } else {
                wgts.mean_axis(Axis(1))
                    .unwrap_or_else(|| Array1::zeros(wgts.nrows()))
            };
            Ok(BaselineDelays {
                key: v.key,
                delays,
                weights,
            })
        })
        .collect()
}

/// tau_i - tau_j = delay(V_model / V_data), for each group's antenna
/// polarisation and each delay slot (a time, or the time average).
pub(crate) fn delay_lincal(
    delays: &[BaselineDelays],
    groups: &[SolveGroup],
) -> Vec<IndexMap<usize, f64>> {
    solve_groups(groups, |group, system| {
        for bl in delays.iter().filter(|bl| group.pols.contains(&bl.key.pol)) {
            for &slot in &group.times {
                system.add_equation(
                    &[(bl.key.ant1, 1.0), (bl.key.ant2, -1.0)],
                    bl.delays[slot],
                    bl.weights[slot],
                );
            }
        }
    })
}
