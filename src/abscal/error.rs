// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from absolute calibration.

use thiserror::Error;

use crate::{container::ContainerError, delay::DelayError, pol::PolError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AbsCalError {
    #[error("The model and data have no baselines in common")]
    NoCommonBaselines,

    #[error("The {what} have shape {got:?}, but the data have shape {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Expected {expected} {what}, but got {got}")]
    AxisLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Antenna positions are needed for tip-tilt calibration")]
    NoAntennaPositions,

    #[error("Antenna {ant} doesn't have a position")]
    MissingAntPos { ant: usize },

    #[error("Antenna positions need at least 2 components, but antenna {ant} has {num}")]
    ShortAntPos { ant: usize, num: usize },

    #[error("Frequencies are needed for delay calibration")]
    MissingFreqs,

    #[error("Reference antenna {ant} isn't in the data")]
    RefAntMissing { ant: usize },

    #[error("Smoothing kernel sizes must be odd and non-zero, but got {0:?}")]
    BadKernel((usize, usize)),

    #[error(transparent)]
    Pol(#[from] PolError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Delay(#[from] DelayError),
}
