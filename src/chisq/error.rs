// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from chi-squared accumulation.

use thiserror::Error;

use crate::pol::{AntPol, PolError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChisqError {
    #[error("Both {0} must be supplied, or neither")]
    UnpairedAccumulator(&'static str),

    #[error("The supplied chi-squared accumulators are {got}, but {expected} accumulators were requested")]
    AccumulatorKind {
        expected: &'static str,
        got: &'static str,
    },

    #[error("A waterfall or accumulator has shape {got:?}, but the data have shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("No gains were supplied for antenna {ant}{pol}")]
    MissingGain { ant: usize, pol: AntPol },

    #[error("No gain flags were supplied for antenna {ant}{pol}")]
    MissingGainFlags { ant: usize, pol: AntPol },

    #[error(transparent)]
    Pol(#[from] PolError),
}
