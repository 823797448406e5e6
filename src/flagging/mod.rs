// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Turning visibility flags into antenna flags.

mod error;
#[cfg(test)]
mod tests;

pub use error::FlagError;

use std::collections::HashSet;

use indexmap::IndexMap;
use log::debug;
use ndarray::prelude::*;

use crate::{
    constants::FLAG_THRESHOLD_EPSILON,
    container::DataContainer,
    pol::{AntKey, AntPol},
};

/// Synthesise per-antenna flags from per-baseline flags. An antenna is flagged
/// at a (time, frequency) when the fraction of its baselines flagged there
/// exceeds `threshold`. Antennas whose baselines are entirely flagged are
/// "dead"; they are flagged everywhere and don't count towards the fractions
/// of other antennas. A threshold of 1 flags a pixel only when every baseline
/// is flagged.
///
/// The returned flags are sorted by antenna.
pub fn synthesize_ant_flags(
    flags: &DataContainer<bool>,
    threshold: f64,
) -> Result<IndexMap<AntKey, Array2<bool>>, FlagError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(FlagError::BadThreshold(threshold));
    }
    let threshold = if (threshold - 1.0).abs() < FLAG_THRESHOLD_EPSILON {
        threshold - FLAG_THRESHOLD_EPSILON
    } else {
        threshold
    };
    let shape = match flags.shape() {
        Some(s) => s,
        None => return Ok(IndexMap::new()),
    };

    let mut keyed: Vec<(AntKey, AntKey, &Array2<bool>)> = Vec::with_capacity(flags.len());
    for (key, f) in flags.iter() {
        let (p1, p2): (AntPol, AntPol) = key.pol.split()?;
        keyed.push(((key.ant1, p1), (key.ant2, p2), f));
    }

    let mut ant_keys: Vec<AntKey> = keyed.iter().flat_map(|(a1, a2, _)| [*a1, *a2]).collect();
    ant_keys.sort_unstable();
    ant_keys.dedup();

    // An antenna is alive if any of its baselines has an unflagged pixel.
    let alive: HashSet<AntKey> = keyed
        .iter()
        .filter(|(_, _, f)| !f.iter().all(|&f| f))
        .flat_map(|(a1, a2, _)| [*a1, *a2])
        .collect();
    let num_dead = ant_keys.len() - alive.len();
    if num_dead > 0 {
        debug!("{num_dead} antenna polarisations are completely flagged");
    }

    let mut num_vis: IndexMap<AntKey, usize> = ant_keys.iter().map(|&a| (a, 0)).collect();
    let mut num_flagged: IndexMap<AntKey, Array2<f64>> = ant_keys
        .iter()
        .map(|&a| (a, Array2::zeros(shape)))
        .collect();
    for (a1, a2, f) in &keyed {
        if !(alive.contains(a1) && alive.contains(a2)) {
            continue;
        }
        for a in [a1, a2] {
            num_vis[a] += 1;
            num_flagged[a].zip_mut_with(f, |n, &f| {
                if f {
                    *n += 1.0;
                }
            });
        }
    }

    Ok(ant_keys
        .into_iter()
        .map(|a| {
            let ant_flags = if !alive.contains(&a) {
                Array2::from_elem(shape, true)
            } else if num_vis[&a] == 0 {
                // Nothing to go on; don't flag.
                Array2::from_elem(shape, false)
            } else {
                let n = num_vis[&a] as f64;
                num_flagged[&a].mapv(|f| f / n > threshold)
            };
            (a, ant_flags)
        })
        .collect())
}
