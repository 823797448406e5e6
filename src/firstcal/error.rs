// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from redundant-baseline delay calibration.

use thiserror::Error;

use crate::{
    container::BaselineKey,
    delay::DelayError,
    pol::Pol,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FirstCalError {
    #[error("Baseline ({ant1}, {ant2}) appears more than once in the redundant groups")]
    DuplicateBaseline { ant1: usize, ant2: usize },

    #[error("Baseline ({0}, {0}) is an auto-correlation and can't be redundant")]
    AutoCorrelation(usize),

    #[error("Baseline {0} is in a redundant group, but isn't in the data")]
    MissingBaseline(BaselineKey),

    #[error("Baseline {0} is in a redundant group, but has no weights")]
    MissingWeights(BaselineKey),

    #[error("FirstCal needs a co-polar polarisation, but got {0}")]
    NotCoPolar(Pol),

    #[error("Expected {expected} frequencies, but got {got}")]
    FreqsLength { expected: usize, got: usize },

    #[error("The weights have shape {got:?}, but the data have shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Expected {expected} baseline-pair variances, but got {got}")]
    CovarianceLength { expected: usize, got: usize },

    #[error("Reference antenna {ant} isn't in any redundant group")]
    RefAntMissing { ant: usize },

    #[error("Couldn't pseudo-invert the delay normal equations: {0}")]
    Pinv(&'static str),

    #[error(transparent)]
    Delay(#[from] DelayError),
}
