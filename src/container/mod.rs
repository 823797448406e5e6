// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Baseline-keyed containers of waterfalls.
//!
//! Visibilities obey conjugate symmetry: V_ji^(conj pol) = conj(V_ij^(pol)).
//! Only one orientation of each baseline is ever stored in a
//! [`DataContainer`]; asking for the other orientation yields the conjugated
//! waterfall. This is the only place where that policy is implemented.

mod error;

pub use error::ContainerError;

use std::{borrow::Cow, collections::BTreeSet, fmt};

use indexmap::IndexMap;
use ndarray::prelude::*;
use num_complex::{Complex32, Complex64};
use serde::{Deserialize, Serialize};

use crate::pol::{AntKey, AntPol, Pol};

/// A baseline and polarisation, e.g. (1, 2, xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaselineKey {
    pub ant1: usize,
    pub ant2: usize,
    pub pol: Pol,
}

impl BaselineKey {
    pub fn new(ant1: usize, ant2: usize, pol: Pol) -> BaselineKey {
        BaselineKey { ant1, ant2, pol }
    }

    /// The same baseline seen from the other antenna, i.e. (j, i, conj(pol)).
    pub fn reversed(self) -> BaselineKey {
        BaselineKey {
            ant1: self.ant2,
            ant2: self.ant1,
            pol: self.pol.conj(),
        }
    }

    /// The antenna pair, ignoring the polarisation.
    pub fn ants(self) -> (usize, usize) {
        (self.ant1, self.ant2)
    }

    pub fn is_auto(self) -> bool {
        self.ant1 == self.ant2
    }
}

impl fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.ant1, self.ant2, self.pol)
    }
}

/// Types that can be stored in a [`DataContainer`]. Reversing a baseline
/// applies this operation to every element of its waterfall.
pub trait Conjugate {
    fn conjugate(&self) -> Self;
}

impl Conjugate for Complex64 {
    fn conjugate(&self) -> Self {
        self.conj()
    }
}

impl Conjugate for Complex32 {
    fn conjugate(&self) -> Self {
        self.conj()
    }
}

impl Conjugate for f64 {
    fn conjugate(&self) -> Self {
        *self
    }
}

impl Conjugate for f32 {
    fn conjugate(&self) -> Self {
        *self
    }
}

impl Conjugate for bool {
    fn conjugate(&self) -> Self {
        *self
    }
}

/// (time, frequency) waterfalls keyed by baseline. Every waterfall in a
/// container has the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DataContainer<T> {
    data: IndexMap<BaselineKey, Array2<T>>,
    shape: Option<(usize, usize)>,
}

impl<T> Default for DataContainer<T> {
    fn default() -> Self {
        DataContainer {
            data: IndexMap::new(),
            shape: None,
        }
    }
}

impl<T: Conjugate + Clone> DataContainer<T> {
    pub fn new() -> DataContainer<T> {
        DataContainer::default()
    }

    /// Build a container from (key, waterfall) pairs. Later entries overwrite
    /// earlier ones, regardless of the orientation they were given in.
    pub fn from_waterfalls<I>(waterfalls: I) -> Result<DataContainer<T>, ContainerError>
    where
        I: IntoIterator<Item = (BaselineKey, Array2<T>)>,
    {
        let mut container = DataContainer::new();
        for (key, waterfall) in waterfalls {
            container.insert(key, waterfall)?;
        }
        Ok(container)
    }

    /// Insert a waterfall. If the reversed baseline is already stored, the
    /// conjugated waterfall replaces it under the stored orientation.
    pub fn insert(&mut self, key: BaselineKey, waterfall: Array2<T>) -> Result<(), ContainerError> {
        let dim = waterfall.dim();
        match self.shape {
            Some(shape) if shape != dim => {
                return Err(ContainerError::ShapeMismatch {
                    key,
                    expected: shape,
                    got: dim,
                })
            }
            _ => self.shape = Some(dim),
        }

        let rev = key.reversed();
        if rev != key && !self.data.contains_key(&key) && self.data.contains_key(&rev) {
            self.data.insert(rev, waterfall.mapv(|v| v.conjugate()));
        } else {
            self.data.insert(key, waterfall);
        }
        Ok(())
    }

    /// Get the waterfall for a baseline in either orientation. Looking up a
    /// reversed baseline returns the conjugate of the stored waterfall.
    pub fn get(&self, key: BaselineKey) -> Option<Cow<'_, Array2<T>>> {
        if let Some(w) = self.data.get(&key) {
            return Some(Cow::Borrowed(w));
        }
        self.data
            .get(&key.reversed())
            .map(|w| Cow::Owned(w.mapv(|v| v.conjugate())))
    }

    /// Like `get`, but an error is returned if the baseline isn't present.
    pub fn try_get(&self, key: BaselineKey) -> Result<Cow<'_, Array2<T>>, ContainerError> {
        self.get(key).ok_or(ContainerError::MissingKey(key))
    }

    /// Apply a function to every element of every waterfall.
    pub fn mapv<U, F>(&self, f: F) -> DataContainer<U>
    where
        F: Fn(&T) -> U,
    {
        DataContainer {
            data: self
                .data
                .iter()
                .map(|(k, w)| (*k, w.map(&f)))
                .collect(),
            shape: self.shape,
        }
    }
}

impl<T> DataContainer<T> {
    /// Is this baseline stored (in either orientation)?
    pub fn contains(&self, key: BaselineKey) -> bool {
        self.data.contains_key(&key) || self.data.contains_key(&key.reversed())
    }

    /// The orientation a baseline is stored under, if it is stored at all.
    pub fn stored_key(&self, key: BaselineKey) -> Option<BaselineKey> {
        if self.data.contains_key(&key) {
            Some(key)
        } else if self.data.contains_key(&key.reversed()) {
            Some(key.reversed())
        } else {
            None
        }
    }

    /// The stored keys, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = BaselineKey> + '_ {
        self.data.keys().copied()
    }

    /// The stored (key, waterfall) pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (BaselineKey, &Array2<T>)> + '_ {
        self.data.iter().map(|(k, w)| (*k, w))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BaselineKey, &mut Array2<T>)> + '_ {
        self.data.iter_mut().map(|(k, w)| (*k, w))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The (num_times, num_freqs) shape shared by every waterfall.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// The sorted, unique antennas referred to by the keys.
    pub fn antennas(&self) -> Vec<usize> {
        self.data
            .keys()
            .flat_map(|k| [k.ant1, k.ant2])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The sorted, unique polarisations referred to by the keys.
    pub fn pols(&self) -> Vec<Pol> {
        self.data
            .keys()
            .map(|k| k.pol)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The sorted, unique antenna-polarisations referred to by the keys.
    /// Pseudo-Stokes keys can't be split and are ignored.
    pub fn ant_keys(&self) -> Vec<AntKey> {
        self.data
            .keys()
            .filter_map(|k| {
                k.pol
                    .split()
                    .ok()
                    .map(|(p1, p2): (AntPol, AntPol)| [(k.ant1, p1), (k.ant2, p2)])
            })
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
