// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all errors raised by the `abscal` binary. This should be the
//! *only* error enum visible from the command line.

use thiserror::Error;

use super::{abs_cal::AbsCalArgsError, first_cal::FirstCalArgsError};
use crate::{
    abscal::AbsCalError,
    firstcal::FirstCalError,
    flagging::FlagError,
    io::VisReadError,
    pol::PolError,
    solutions::SolutionsWriteError,
};

#[derive(Error, Debug)]
pub enum AbsCalCliError {
    /// An error related to abs-cal.
    #[error("{0}")]
    AbsCal(String),

    /// An error related to first-cal.
    #[error("{0}")]
    FirstCal(String),

    /// An error related to flags.
    #[error("{0}")]
    Flagging(String),

    /// Generic error surrounding calibration solutions.
    #[error("{0}")]
    Solutions(String),

    /// An error related to reading visibilities.
    #[error("{0}\n\nVisibility bundles are JSON files with per-baseline waterfalls; see the `io` module documentation.")]
    VisRead(String),

    /// An error related to argument files.
    #[error("{0}")]
    ArgFile(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<AbsCalArgsError> for AbsCalCliError {
    fn from(e: AbsCalArgsError) -> Self {
        match e {
            AbsCalArgsError::InputVis(_) => Self::VisRead(e.to_string()),
            AbsCalArgsError::Output(_) => Self::Solutions(e.to_string()),
            AbsCalArgsError::NoSteps
            | AbsCalArgsError::NoModel
            | AbsCalArgsError::BadDelayKernel(_)
            | AbsCalArgsError::BadFlagThreshold(_)
            | AbsCalArgsError::Delay(_) => Self::AbsCal(e.to_string()),
        }
    }
}

impl From<FirstCalArgsError> for AbsCalCliError {
    fn from(e: FirstCalArgsError) -> Self {
        match e {
            FirstCalArgsError::InputVis(_) => Self::VisRead(e.to_string()),
            FirstCalArgsError::Output(_) => Self::Solutions(e.to_string()),
            FirstCalArgsError::BadPol(_)
            | FirstCalArgsError::BadRedundancyTol(_)
            | FirstCalArgsError::NoAntennaPositions
            | FirstCalArgsError::NoFreqs
            | FirstCalArgsError::Delay(_) => Self::FirstCal(e.to_string()),
        }
    }
}

// Library errors.

impl From<AbsCalError> for AbsCalCliError {
    fn from(e: AbsCalError) -> Self {
        Self::AbsCal(e.to_string())
    }
}

impl From<FirstCalError> for AbsCalCliError {
    fn from(e: FirstCalError) -> Self {
        Self::FirstCal(e.to_string())
    }
}

impl From<FlagError> for AbsCalCliError {
    fn from(e: FlagError) -> Self {
        Self::Flagging(e.to_string())
    }
}

impl From<PolError> for AbsCalCliError {
    fn from(e: PolError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<VisReadError> for AbsCalCliError {
    fn from(e: VisReadError) -> Self {
        Self::VisRead(e.to_string())
    }
}

impl From<SolutionsWriteError> for AbsCalCliError {
    fn from(e: SolutionsWriteError) -> Self {
        Self::Solutions(e.to_string())
    }
}

impl From<std::io::Error> for AbsCalCliError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
