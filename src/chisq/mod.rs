// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Chi-squared between data and (gain-corrupted) model visibilities.
//!
//! chi^2 = sum_ij |V_ij^data - g_i conj(g_j) V_ij^model|^2 w_ij
//!
//! The gains here are instrumental ("divide" convention) gains.

mod error;

pub use error::ChisqError;

use indexmap::IndexMap;
use log::trace;
use ndarray::prelude::*;

use crate::{
    c64,
    container::DataContainer,
    gains::Gains,
    pol::{AntKey, AntPol},
};

/// A chi-squared (or observation-count) accumulator, either for all
/// polarisations together or split by antenna polarisation.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator<T> {
    Combined(Array2<T>),
    ByAntPol(IndexMap<AntPol, Array2<T>>),
}

impl<T> Accumulator<T> {
    fn kind(&self) -> &'static str {
        match self {
            Accumulator::Combined(_) => "combined",
            Accumulator::ByAntPol(_) => "split",
        }
    }
}

/// The result of [`chisq`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chisq {
    pub chisq: Accumulator<f64>,

    /// The number of unflagged comparisons that went into each pixel of
    /// `chisq`.
    pub n_obs: Accumulator<u32>,

    /// Like `chisq`, but for every baseline containing an antenna.
    pub chisq_per_ant: IndexMap<AntKey, Array2<f64>>,
    pub n_obs_per_ant: IndexMap<AntKey, Array2<u32>>,
}

/// Accumulators from a previous call to [`chisq`] to add to. `chisq` and
/// `n_obs` must be given together, as must `chisq_per_ant` and
/// `n_obs_per_ant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChisqPrior {
    pub chisq: Option<Accumulator<f64>>,
    pub n_obs: Option<Accumulator<u32>>,
    pub chisq_per_ant: Option<IndexMap<AntKey, Array2<f64>>>,
    pub n_obs_per_ant: Option<IndexMap<AntKey, Array2<u32>>>,
}

impl From<Chisq> for ChisqPrior {
    fn from(c: Chisq) -> Self {
        ChisqPrior {
            chisq: Some(c.chisq),
            n_obs: Some(c.n_obs),
            chisq_per_ant: Some(c.chisq_per_ant),
            n_obs_per_ant: Some(c.n_obs_per_ant),
        }
    }
}

/// Compute chi-squared for every baseline present in `data`, `model` and
/// `wgts`. Weights are 1/sigma^2; zero weights are flagged. If `gains` are
/// given they multiply the model; if `gain_flags` are given, pixels where
/// either antenna is flagged get zero weight. With `split_by_antpol`, the
/// totals are kept per antenna polarisation and cross-polarised baselines are
/// ignored.
///
/// Any accumulators in `prior` are added to.
pub fn chisq(
    data: &DataContainer<c64>,
    model: &DataContainer<c64>,
    wgts: &DataContainer<f64>,
    gains: Option<&Gains>,
    gain_flags: Option<&IndexMap<AntKey, Array2<bool>>>,
    split_by_antpol: bool,
    prior: ChisqPrior,
) -> Result<Chisq, ChisqError> {
    let shape = data.shape().unwrap_or((0, 0));
    let (mut total, mut n_obs) = match (prior.chisq, prior.n_obs) {
        (None, None) => {
            if split_by_antpol {
                (
                    Accumulator::ByAntPol(IndexMap::new()),
                    Accumulator::ByAntPol(IndexMap::new()),
                )
            } else {
                (
                    Accumulator::Combined(Array2::zeros(shape)),
                    Accumulator::Combined(Array2::zeros(shape)),
                )
            }
        }
        (Some(c), Some(n)) => {
            let expected = if split_by_antpol { "split" } else { "combined" };
            for got in [c.kind(), n.kind()] {
                if got != expected {
                    return Err(ChisqError::AccumulatorKind { expected, got });
                }
            }
            (c, n)
        }
        _ => return Err(ChisqError::UnpairedAccumulator("chisq and n_obs")),
    };
    let (mut chisq_per_ant, mut n_obs_per_ant) = match (prior.chisq_per_ant, prior.n_obs_per_ant)
    {
        (None, None) => (IndexMap::new(), IndexMap::new()),
        (Some(c), Some(n)) => (c, n),
        _ => {
            return Err(ChisqError::UnpairedAccumulator(
                "chisq_per_ant and n_obs_per_ant",
            ))
        }
    };

    for (key, d) in data.iter() {
        let (p1, p2) = key.pol.split()?;
        if split_by_antpol && p1 != p2 {
            continue;
        }
        let (Some(m), Some(w)) = (model.get(key), wgts.get(key)) else {
            trace!("Baseline {key} isn't in the model and weights; skipping");
            continue;
        };
        check_shape(shape, m.dim())?;
        check_shape(shape, w.dim())?;
        let (ant1, ant2) = ((key.ant1, p1), (key.ant2, p2));

        let mut model_here = m.into_owned();
        if let Some(gains) = gains {
            let g1 = gains.get(&ant1).ok_or(ChisqError::MissingGain { ant: ant1.0, pol: ant1.1 })?;
            let g2 = gains.get(&ant2).ok_or(ChisqError::MissingGain { ant: ant2.0, pol: ant2.1 })?;
            check_shape(shape, g1.dim())?;
            check_shape(shape, g2.dim())?;
            azip!((m in &mut model_here, &g1 in g1, &g2 in g2) *m *= g1 * g2.conj());
        }

        let mut w = w.into_owned();
        if let Some(gain_flags) = gain_flags {
            let f1 = gain_flags
                .get(&ant1)
                .ok_or(ChisqError::MissingGainFlags { ant: ant1.0, pol: ant1.1 })?;
            let f2 = gain_flags
                .get(&ant2)
                .ok_or(ChisqError::MissingGainFlags { ant: ant2.0, pol: ant2.1 })?;
            check_shape(shape, f1.dim())?;
            check_shape(shape, f2.dim())?;
            azip!((w in &mut w, &f1 in f1, &f2 in f2) if f1 || f2 { *w = 0.0 });
        }

        let mut chisq_here = Array2::zeros(shape);
        // Flagged pixels may have non-finite gains.
        azip!((c in &mut chisq_here, &m in &model_here, &d in d, &w in &w) {
            if w > 0.0 {
                *c = (m - d).norm_sqr() * w;
            }
        });
        let obs_here = w.mapv(|w| u32::from(w > 0.0));

        match (&mut total, &mut n_obs) {
            (Accumulator::Combined(c), Accumulator::Combined(n)) => {
                add_to(c, &chisq_here)?;
                add_to(n, &obs_here)?;
            }
            (Accumulator::ByAntPol(c), Accumulator::ByAntPol(n)) => {
                accumulate(c, p1, &chisq_here)?;
                accumulate(n, p1, &obs_here)?;
            }
            // Kinds were checked above.
            _ => unreachable!(),
        }
        for ant in [ant1, ant2] {
            accumulate(&mut chisq_per_ant, ant, &chisq_here)?;
            accumulate(&mut n_obs_per_ant, ant, &obs_here)?;
        }
    }

    Ok(Chisq {
        chisq: total,
        n_obs,
        chisq_per_ant,
        n_obs_per_ant,
    })
}

fn check_shape(expected: (usize, usize), got: (usize, usize)) -> Result<(), ChisqError> {
    if expected == got {
        Ok(())
    } else {
        Err(ChisqError::ShapeMismatch { expected, got })
    }
}

fn add_to<T>(acc: &mut Array2<T>, new: &Array2<T>) -> Result<(), ChisqError>
where
    T: Copy + std::ops::AddAssign,
{
    check_shape(new.dim(), acc.dim())?;
    acc.zip_mut_with(new, |a, &n| *a += n);
    Ok(())
}

fn accumulate<K, T>(
    map: &mut IndexMap<K, Array2<T>>,
    key: K,
    new: &Array2<T>,
) -> Result<(), ChisqError>
where
    K: std::hash::Hash + Eq,
    T: Copy + std::ops::AddAssign,
{
    match map.get_mut(&key) {
        Some(acc) => add_to(acc, new),
        None => {
            map.insert(key, new.clone());
            Ok(())
        }
    }
}
