// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::BaselineKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Waterfall for baseline {key} has shape {got:?}, but the container holds waterfalls of shape {expected:?}")]
    ShapeMismatch {
        key: BaselineKey,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Baseline {0} isn't present in either orientation")]
    MissingKey(BaselineKey),
}
