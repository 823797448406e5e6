// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::container::{BaselineKey, ContainerError};

#[derive(Error, Debug)]
pub enum VisReadError {
    #[error("Tried to read a visibility bundle with an unsupported extension '{ext}'!")]
    UnsupportedExt { ext: String },

    #[error("The {what} of baseline {key} is ragged; row {row} has {got} elements, but row 0 has {expected}")]
    Ragged {
        key: BaselineKey,
        what: &'static str,
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("The bundle has no baselines")]
    NoBaselines,

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
