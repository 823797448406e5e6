// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility and antenna polarisations.


use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

/// A visibility polarisation. Linear-feed products can be split into the
/// polarisations of the two antennas that formed them; pseudo-Stokes products
/// cannot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Pol {
    #[strum(serialize = "xx")]
    #[serde(rename = "xx")]
    XX,

    #[strum(serialize = "yy")]
    #[serde(rename = "yy")]
    YY,

    #[strum(serialize = "xy")]
    #[serde(rename = "xy")]
    XY,

    #[strum(serialize = "yx")]
    #[serde(rename = "yx")]
    YX,

    #[strum(serialize = "pI")]
    #[serde(rename = "pI")]
    I,

    #[strum(serialize = "pQ")]
    #[serde(rename = "pQ")]
    Q,

    #[strum(serialize = "pU")]
    #[serde(rename = "pU")]
    U,

    #[strum(serialize = "pV")]
    #[serde(rename = "pV")]
    V,
}

/// The polarisation of a single antenna's feed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum AntPol {
    #[strum(serialize = "x")]
    #[serde(rename = "x")]
    X,

    #[strum(serialize = "y")]
    #[serde(rename = "y")]
    Y,
}

/// An antenna number paired with one of its feed polarisations, e.g. `(1, X)`.
pub type AntKey = (usize, AntPol);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolError {
    #[error("Unable to split the Stokes or pseudo-Stokes polarisation '{0}' into antenna polarisations")]
    CannotSplit(Pol),
}

impl Pol {
    /// Given V_ij^(pol), return the polarisation of V_ji^(conj pol) such that
    /// (V_ji^(conj pol))* = V_ij^(pol). i.e. xy <-> yx; every other
    /// polarisation is unaffected.
    pub fn conj(self) -> Pol {
        match self {
            Pol::XY => Pol::YX,
            Pol::YX => Pol::XY,
            p => p,
        }
    }

    /// Split this visibility polarisation into the polarisations of its first
    /// and second antennas.
    pub fn split(self) -> Result<(AntPol, AntPol), PolError> {
        match self {
            Pol::XX => Ok((AntPol::X, AntPol::X)),
            Pol::YY => Ok((AntPol::Y, AntPol::Y)),
            Pol::XY => Ok((AntPol::X, AntPol::Y)),
            Pol::YX => Ok((AntPol::Y, AntPol::X)),
            Pol::I | Pol::Q | Pol::U | Pol::V => Err(PolError::CannotSplit(self)),
        }
    }

    /// Is this a product of two antennas' same-polarisation feeds?
    pub fn is_co_polar(self) -> bool {
        matches!(self, Pol::XX | Pol::YY)
    }

    /// The visibility polarisation formed by two antenna polarisations.
    pub fn from_ant_pols(p1: AntPol, p2: AntPol) -> Pol {
        match (p1, p2) {
            (AntPol::X, AntPol::X) => Pol::XX,
            (AntPol::Y, AntPol::Y) => Pol::YY,
            (AntPol::X, AntPol::Y) => Pol::XY,
            (AntPol::Y, AntPol::X) => Pol::YX,
        }
    }
}
