// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from synthesising antenna flags.

use thiserror::Error;

use crate::pol::PolError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlagError {
    #[error("The flagging threshold must be between 0 and 1 (inclusive), but got {0}")]
    BadThreshold(f64),

    #[error(transparent)]
    Pol(#[from] PolError),
}
