// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Redundant baseline groups and the lookup tables derived from them.

use indexmap::IndexMap;
use log::debug;
use ndarray::prelude::*;

use super::FirstCalError;

/// An antenna pair, in the orientation it is redundant with the rest of its
/// group.
pub type Baseline = (usize, usize);

/// A pair of baselines from the same redundant group.
pub type BaselinePair = (Baseline, Baseline);

/// Group all baselines between the given antennas by their separation vector.
/// Two baselines are redundant if their vectors are within `tol` metres of
/// each other. Each baseline is oriented so that it has (nearly) the same
/// vector as the first baseline of its group. Positions may have any number of
/// components; missing components are treated as zero.
pub fn get_reds(antpos: &IndexMap<usize, Vec<f64>>, tol: f64) -> Vec<Vec<Baseline>> {
    let mut ants: Vec<usize> = antpos.keys().copied().collect();
    ants.sort_unstable();

    let separation = |i: usize, j: usize| -> [f64; 3] {
        let mut b = [0.0; 3];
        for (n, b) in b.iter_mut().enumerate() {
            let xi = antpos[&i].get(n).copied().unwrap_or(0.0);
            let xj = antpos[&j].get(n).copied().unwrap_or(0.0);
            *b = xj - xi;
        }
        b
    };
    let close = |a: &[f64; 3], b: &[f64; 3], sign: f64| -> bool {
        a.iter()
            .zip(b.iter())
            .map(|(a, b)| (a - sign * b).powi(2))
            .sum::<f64>()
            .sqrt()
            <= tol
    };

    let mut groups: Vec<([f64; 3], Vec<Baseline>)> = vec![];
    for (n, &i) in ants.iter().enumerate() {
        for &j in &ants[n + 1..] {
            let b = separation(i, j);
            if let Some((_, members)) = groups.iter_mut().find(|(v, _)| close(v, &b, 1.0)) {
                members.push((i, j));
            } else if let Some((_, members)) =
                groups.iter_mut().find(|(v, _)| close(v, &b, -1.0))
            {
                members.push((j, i));
            } else {
                groups.push((b, vec![(i, j)]));
            }
        }
    }
    debug!(
        "Found {} redundant groups among {} antennas",
        groups.len(),
        ants.len()
    );
    groups.into_iter().map(|(_, members)| members).collect()
}

/// Lookup tables describing redundant groups for FirstCal. Everything is
/// computed once on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RedundantInfo {
    pub reds: Vec<Vec<Baseline>>,

    /// The sorted antennas in any group.
    pub antennas: Vec<usize>,

    /// Antenna number -> column of `a`.
    pub ant_index: IndexMap<usize, usize>,

    /// Baseline -> its position in the flattened groups.
    pub bl_index: IndexMap<Baseline, usize>,

    /// Every pair of baselines within each group.
    pub bl_pairs: Vec<BaselinePair>,

    /// Baseline pair -> row of `a`.
    pub blpair_index: IndexMap<BaselinePair, usize>,

    /// The columns of antennas (i, j, k, l) for each pair ((i, j), (k, l)).
    pub blpair_ants: Vec<[usize; 4]>,

    /// The design matrix, shape (num pairs, num antennas). The row for the
    /// pair ((i, j), (k, l)) is +1 at i, -1 at j, -1 at k and +1 at l.
    pub a: Array2<f64>,
}

impl RedundantInfo {
    /// Groups with fewer than two baselines contribute no pairs.
    pub fn new(reds: Vec<Vec<Baseline>>) -> Result<RedundantInfo, FirstCalError> {
        let mut bl_index = IndexMap::new();
        for &(i, j) in reds.iter().flatten() {
            if i == j {
                return Err(FirstCalError::AutoCorrelation(i));
            }
            if bl_index.contains_key(&(i, j)) || bl_index.contains_key(&(j, i)) {
                return Err(FirstCalError::DuplicateBaseline { ant1: i, ant2: j });
            }
            let n = bl_index.len();
            bl_index.insert((i, j), n);
        }

        let mut antennas: Vec<usize> = bl_index.keys().flat_map(|&(i, j)| [i, j]).collect();
        antennas.sort_unstable();
        antennas.dedup();
        let ant_index: IndexMap<usize, usize> =
            antennas.iter().enumerate().map(|(n, &a)| (a, n)).collect();

        let bl_pairs: Vec<BaselinePair> = reds
            .iter()
            .flat_map(|group| {
                group
                    .iter()
                    .enumerate()
                    .flat_map(move |(n, &bl1)| group[n + 1..].iter().map(move |&bl2| (bl1, bl2)))
            })
            .collect();
        let blpair_index = bl_pairs
            .iter()
            .enumerate()
            .map(|(n, &pair)| (pair, n))
            .collect();
        let blpair_ants: Vec<[usize; 4]> = bl_pairs
            .iter()
            .map(|&((i, j), (k, l))| {
                [ant_index[&i], ant_index[&j], ant_index[&k], ant_index[&l]]
            })
            .collect();

        let mut a = Array2::zeros((bl_pairs.len(), antennas.len()));
        for (mut row, &[i, j, k, l]) in a.outer_iter_mut().zip(blpair_ants.iter()) {
            row[i] += 1.0;
            row[j] -= 1.0;
            row[k] -= 1.0;
            row[l] += 1.0;
        }

        Ok(RedundantInfo {
            reds,
            antennas,
            ant_index,
            bl_index,
            bl_pairs,
            blpair_index,
            blpair_ants,
            a,
        })
    }

    pub fn num_pairs(&self) -> usize {
        self.bl_pairs.len()
    }
}
