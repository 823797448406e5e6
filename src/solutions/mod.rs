// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to read and write calibration solutions.

mod error;
mod json;

pub use error::*;

use std::{path::Path, str::FromStr};

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, warn};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    c64, constants::GAIN_ZERO_TOLERANCE, diagnostics::Diagnostic, gains::Gains, pol::AntKey,
};

lazy_static::lazy_static! {
    pub static ref CAL_SOLUTION_EXTENSIONS: String = CalSolutionType::iter().join(", ");
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(crate) enum CalSolutionType {
    #[strum(serialize = "json")]
    Json,
}

/// How gains relate data to the model.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum GainConvention {
    /// V_model = g_i conj(g_j) V_data; these gains calibrate data.
    #[default]
    Multiply,

    /// V_data = g_i conj(g_j) V_model; these are the instrumental gains.
    Divide,
}

/// Per-antenna gains with their flags.
#[derive(Debug, Clone, PartialEq)]
pub struct CalSolutions {
    /// (num_times, num_freqs) gains of each antenna polarisation.
    pub gains: Gains,

    /// Flags with the same shapes as the gains. Flagged gains shouldn't be
    /// used.
    pub flags: IndexMap<AntKey, Array2<bool>>,

    /// \[Hz\]
    pub freqs: Option<Vec<f64>>,

    /// \[Julian date\]
    pub times: Option<Vec<f64>>,

    pub convention: GainConvention,
}

impl CalSolutions {
    /// Bundle gains with their flags. Gains with magnitudes at or below
    /// [`GAIN_ZERO_TOLERANCE`] can't be inverted; they are replaced with 1 and
    /// flagged, and a [`Diagnostic::DegenerateGains`] is emitted. Non-finite
    /// gains are always flagged, and flags are made for any antenna without
    /// (correctly shaped) flags.
    pub fn new(
        mut gains: Gains,
        flags: Option<IndexMap<AntKey, Array2<bool>>>,
        freqs: Option<Vec<f64>>,
        times: Option<Vec<f64>>,
        convention: GainConvention,
    ) -> (CalSolutions, Vec<Diagnostic>) {
        let mut flags = flags.unwrap_or_default();
        let mut num_degenerate = 0;
        let mut out_flags = IndexMap::with_capacity(gains.len());
        for (&ant_key, ant_gains) in gains.iter_mut() {
            let mut ant_flags = match flags.swap_remove(&ant_key) {
                Some(f) if f.dim() == ant_gains.dim() => f,
                Some(f) => {
                    warn!(
                        "Flags for antenna {} ({}) have shape {:?}, but the gains have shape {:?}; ignoring them",
                        ant_key.0,
                        ant_key.1,
                        f.dim(),
                        ant_gains.dim()
                    );
                    Array2::from_elem(ant_gains.dim(), false)
                }
                None => Array2::from_elem(ant_gains.dim(), false),
            };
            azip!((g in ant_gains, f in &mut ant_flags) {
                if !g.is_finite() {
                    *f = true;
                } else if g.norm() <= GAIN_ZERO_TOLERANCE {
                    *g = c64::new(1.0, 0.0);
                    *f = true;
                    num_degenerate += 1;
                }
            });
            out_flags.insert(ant_key, ant_flags);
        }
        if !flags.is_empty() {
            debug!(
                "Ignoring flags for {} antennas without gains",
                flags.len()
            );
        }

        let mut diagnostics = vec![];
        if num_degenerate > 0 {
            warn!("{num_degenerate} gains were numerically zero; they have been set to 1 and flagged");
            diagnostics.push(Diagnostic::DegenerateGains {
                num_pixels: num_degenerate,
            });
        }

        (
            CalSolutions {
                gains,
                flags: out_flags,
                freqs,
                times,
                convention,
            },
            diagnostics,
        )
    }

    /// Express the gains in another convention. Multiply and divide gains are
    /// inverses of each other.
    pub fn to_convention(&self, convention: GainConvention) -> CalSolutions {
        let mut sols = self.clone();
        if convention != self.convention {
            for gains in sols.gains.values_mut() {
                gains.mapv_inplace(|g| g.inv());
            }
            sols.convention = convention;
        }
        sols
    }

    /// Read calibration solutions from a file. The format of the file is
    /// determined by the file's extension (e.g. ".json").
    pub fn read<P: AsRef<Path>>(file: P) -> Result<CalSolutions, SolutionsReadError> {
        let file = file.as_ref();
        let ext = file.extension().and_then(|e| e.to_str());
        match ext.and_then(|s| CalSolutionType::from_str(s).ok()) {
            Some(CalSolutionType::Json) => json::read(file),
            None => Err(SolutionsReadError::UnsupportedExt {
                ext: ext.unwrap_or("<no extension>").to_string(),
            }),
        }
    }

    /// From the target file extension, write out the appropriately-formatted
    /// solutions.
    pub fn write<P: AsRef<Path>>(&self, file: P) -> Result<(), SolutionsWriteError> {
        let file = file.as_ref();
        let ext = file.extension().and_then(|e| e.to_str());
        match ext.and_then(|s| CalSolutionType::from_str(s).ok()) {
            Some(CalSolutionType::Json) => json::write(self, file),
            None => Err(SolutionsWriteError::UnsupportedExt {
                ext: ext.unwrap_or("<no extension>").to_string(),
            }),
        }
    }
}
