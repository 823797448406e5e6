// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Absolute calibration of radio-interferometric visibilities against a sky model,
and redundant-baseline delay calibration ("firstcal").

All gains produced by this crate use the "multiply" convention unless stated
otherwise:

V_ij^model = g_i conj(g_j) V_ij^data
 */

pub mod abscal;
pub mod chisq;
mod cli;
pub mod constants;
pub mod container;
pub mod delay;
pub mod diagnostics;
pub mod firstcal;
pub mod flagging;
pub mod gains;
pub mod io;
pub(crate) mod math;
pub mod pol;
pub mod solutions;

// Re-exports.
pub use abscal::{AbsCal, AbsCalError, AbsCalParams, Gauge, MergeAxes};
pub use chisq::{chisq, Accumulator, Chisq, ChisqError, ChisqPrior};
pub use cli::{AbsCalCliError, Cli};
pub use container::{BaselineKey, Conjugate, ContainerError, DataContainer};
pub use delay::{fft_delay, DelayError, DelayOpts, Window};
pub use diagnostics::Diagnostic;
pub use firstcal::{get_reds, FirstCal, FirstCalError, FirstCalSolution, RedundantInfo};
pub use flagging::{synthesize_ant_flags, FlagError};
pub use gains::{GainComponent, GainSolution, Gains, Solved, TipTilt};
pub use pol::{AntKey, AntPol, Pol, PolError};
pub use solutions::{CalSolutions, GainConvention};

use crossbeam_utils::atomic::AtomicCell;

/// Complex double-precision numbers are used everywhere.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;

/// Are progress bars being drawn? This should only ever be enabled by CLI code.
pub(crate) static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
