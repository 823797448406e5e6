// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Discrete events emitted while forming gains. These aren't errors; callers
//! decide how (or whether) to report them.

use std::fmt;

use crate::{gains::GainComponent, pol::AntKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Gains numerically indistinguishable from zero were replaced with unity
    /// and flagged.
    DegenerateGains { num_pixels: usize },

    /// A gain component was never solved, so it contributed unity.
    ComponentAbsent(GainComponent),

    /// An antenna's gains contain NaNs or infinities, usually because the
    /// relevant bins were completely flagged.
    NonFiniteGains { ant: AntKey, num_pixels: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DegenerateGains { num_pixels } => write!(
                f,
                "{num_pixels} gain pixels were numerically zero; they have been set to 1 and flagged"
            ),
            Diagnostic::ComponentAbsent(c) => {
                write!(f, "The {c} gain component wasn't solved; it contributes unity")
            }
            Diagnostic::NonFiniteGains {
                ant: (ant, pol),
                num_pixels,
            } => write!(
                f,
                "Antenna {ant}{pol} has {num_pixels} non-finite gain pixels"
            ),
        }
    }
}
