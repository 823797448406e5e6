// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Partitioning of (time, frequency, polarisation) bins into groups that are
//! solved together.

use serde::{Deserialize, Serialize};

use crate::pol::{AntPol, Pol};

/// Which axes are tied together when solving. A merged axis gets a single
/// solution that is broadcast over every bin along it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeAxes {
    pub time: bool,
    pub freq: bool,
    pub pol: bool,
}

/// A set of bins that share one set of unknowns.
///
/// Unknowns within a group are keyed by antenna number only; the solution for
/// antenna `a` applies to every `(a, p)` for `p` in `ant_pols`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SolveGroup {
    /// The visibility polarisations whose baselines contribute equations.
    pub(crate) pols: Vec<Pol>,
    pub(crate) ant_pols: Vec<AntPol>,
    pub(crate) times: Vec<usize>,
    pub(crate) freqs: Vec<usize>,
}

impl MergeAxes {
    /// Partition the bins of `(num_times, num_freqs)` waterfalls with the
    /// visibility polarisations `pols`. Without a polarisation merge, each
    /// antenna polarisation is solved separately from only its co-polar
    /// baselines; with one, every polarisation contributes.
    pub(crate) fn partition(&self, shape: (usize, usize), pols: &[Pol]) -> Vec<SolveGroup> {
        let (num_times, num_freqs) = shape;
        let time_groups = axis_groups(num_times, self.time);
        let freq_groups = axis_groups(num_freqs, self.freq);

        let mut ant_pols: Vec<AntPol> = pols
            .iter()
            .filter_map(|p| p.split().ok())
            .flat_map(|(p1, p2)| [p1, p2])
            .collect();
        ant_pols.sort_unstable();
        ant_pols.dedup();

        let pol_groups: Vec<(Vec<Pol>, Vec<AntPol>)> = if self.pol {
            vec![(pols.to_vec(), ant_pols)]
        } else {
            ant_pols
                .into_iter()
                .map(|p| (vec![Pol::from_ant_pols(p, p)], vec![p]))
                .filter(|(vis_pols, _)| pols.contains(&vis_pols[0]))
                .collect()
        };

        let mut groups =
            Vec::with_capacity(pol_groups.len() * time_groups.len() * freq_groups.len());
        for (vis_pols, ant_pols) in &pol_groups {
            for times in &time_groups {
                for freqs in &freq_groups {
                    groups.push(SolveGroup {
                        pols: vis_pols.clone(),
                        ant_pols: ant_pols.clone(),
                        times: times.clone(),
                        freqs: freqs.clone(),
                    });
                }
            }
        }
        groups
    }
}

fn axis_groups(len: usize, merge: bool) -> Vec<Vec<usize>> {
    if merge {
        vec![(0..len).collect()]
    } else {
        (0..len).map(|i| vec![i]).collect()
    }
}
