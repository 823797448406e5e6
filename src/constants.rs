// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision.
 */

pub use std::f64::consts::{PI, TAU};

/// Singular values smaller than this fraction of the largest singular value are
/// treated as zero when pseudo-inverting a design matrix.
pub const PINV_RCOND: f64 = 1e-10;

/// Gains with a magnitude at or below this value are considered degenerate;
/// they are replaced with unity and flagged when forming calibration
/// solutions.
pub const GAIN_ZERO_TOLERANCE: f64 = 1e-10;

/// Flag-synthesis thresholds this close to 1 are nudged down by the same
/// amount, so that a pixel is only flagged when literally every baseline is.
pub const FLAG_THRESHOLD_EPSILON: f64 = 1e-10;

/// The default (time, frequency) median-filter kernel applied to
/// model/data ratios before delay calibration.
pub const DEFAULT_DELAY_KERNEL: (usize, usize) = (1, 11);

/// The default tolerance used to decide whether two baseline vectors are
/// redundant \[metres\].
pub const DEFAULT_REDUNDANCY_TOL: f64 = 1.0;
