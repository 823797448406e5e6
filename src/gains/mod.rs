// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solved gain components and their assembly into complex gains.
//!
//! Each calibration step solves for one component of the log of the gain,
//! using data already calibrated by the other solved components; the
//! components are residual corrections of one another and multiply together.
//! A step that wasn't run leaves its component [`Solved::Absent`], and absent
//! components contribute unity when gains are formed. Formed gains use the
//! multiply convention, V_ij^model = g_i conj(g_j) V_ij^data.


use indexmap::IndexMap;
use log::{debug, warn};
use ndarray::prelude::*;
use strum_macros::{Display, EnumIter};

use crate::{
    c64,
    constants::TAU,
    diagnostics::Diagnostic,
    math::cexp,
    pol::{AntKey, AntPol},
};

/// Per-antenna complex gains, each a (time, frequency) waterfall.
pub type Gains = IndexMap<AntKey, Array2<c64>>;

/// Either a solved quantity or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Solved<T> {
    Solved(T),
    Absent,
}

impl<T> Default for Solved<T> {
    fn default() -> Self {
        Solved::Absent
    }
}

impl<T> Solved<T> {
    pub fn is_solved(&self) -> bool {
        matches!(self, Solved::Solved(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Solved::Solved(t) => Some(t),
            Solved::Absent => None,
        }
    }
}

/// The components of a gain solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum GainComponent {
    #[strum(serialize = "amplitude")]
    Amplitude,

    #[strum(serialize = "phase")]
    Phase,

    #[strum(serialize = "tip-tilt phase")]
    TipTilt,

    #[strum(serialize = "average amplitude")]
    AbsAmplitude,

    #[strum(serialize = "delay")]
    Delay,
}

/// An overall phase (psi) and phase gradient (phi) per antenna polarisation.
#[derive(Debug, Clone, PartialEq)]
pub struct TipTilt {
    /// The overall phase \[radians\]. Shape (time, frequency).
    pub psi: IndexMap<AntPol, Array2<f64>>,

    /// The (East, North) phase gradient \[radians / metre\]. Shape
    /// (2, time, frequency).
    pub phi: IndexMap<AntPol, Array3<f64>>,
}

/// Everything solved by AbsCal so far. All per-pixel waterfalls have shape
/// (time, frequency).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GainSolution {
    /// Log-amplitudes (eta).
    pub amp: Solved<IndexMap<AntKey, Array2<f64>>>,

    /// Phases \[radians\].
    pub phase: Solved<IndexMap<AntKey, Array2<f64>>>,

    pub tip_tilt: Solved<TipTilt>,

    /// The average of |V_model| / |V_data|. Gains get the square root.
    pub abs_amp: Solved<IndexMap<AntPol, Array2<f64>>>,

    /// Delays \[seconds\], one per time.
    pub delay: Solved<IndexMap<AntKey, Array1<f64>>>,
}

impl GainSolution {
    /// Multiply together every solved component to form complex gains for
    /// each of `ant_keys`. Antenna positions are needed only if the tip-tilt
    /// component is solved and frequencies \[Hz\] only if the delay component
    /// is solved; if they're missing, or if an antenna isn't present in a
    /// solved component, the affected gains are NaN.
    pub fn make_gains(
        &self,
        ant_keys: &[AntKey],
        antpos: Option<&IndexMap<usize, [f64; 2]>>,
        freqs: Option<&[f64]>,
        shape: (usize, usize),
    ) -> (Gains, Vec<Diagnostic>) {
        let mut diagnostics = vec![];
        for (component, solved) in [
            (GainComponent::Amplitude, self.amp.is_solved()),
            (GainComponent::Phase, self.phase.is_solved()),
            (GainComponent::TipTilt, self.tip_tilt.is_solved()),
            (GainComponent::AbsAmplitude, self.abs_amp.is_solved()),
            (GainComponent::Delay, self.delay.is_solved()),
        ] {
            if !solved {
                debug!("{component} gains don't exist; using unity");
                diagnostics.push(Diagnostic::ComponentAbsent(component));
            }
        }

        let gains = self.form_gains(ant_keys, antpos, freqs, shape);
        for (&(ant, pol), g) in &gains {
            let num_pixels = g.iter().filter(|g| !g.is_finite()).count();
            if num_pixels > 0 {
                warn!("Antenna {ant}{pol} has {num_pixels} non-finite gain pixels");
                diagnostics.push(Diagnostic::NonFiniteGains {
                    ant: (ant, pol),
                    num_pixels,
                });
            }
        }

        (gains, diagnostics)
    }

    /// Like [`GainSolution::make_gains`], but without any reporting.
    pub(crate) fn form_gains(
        &self,
        ant_keys: &[AntKey],
        antpos: Option<&IndexMap<usize, [f64; 2]>>,
        freqs: Option<&[f64]>,
        shape: (usize, usize),
    ) -> Gains {
        let nan = c64::new(f64::NAN, f64::NAN);
        let mut gains = Gains::with_capacity(ant_keys.len());
        for &(ant, pol) in ant_keys {
            let mut g = Array2::from_elem(shape, c64::new(1.0, 0.0));

            if let Solved::Solved(amp) = &self.amp {
                match amp.get(&(ant, pol)) {
                    Some(eta) => g.zip_mut_with(eta, |g, eta| *g *= eta.exp()),
                    None => g.fill(nan),
                }
            }

            if let Solved::Solved(phase) = &self.phase {
                match phase.get(&(ant, pol)) {
                    Some(phi) => g.zip_mut_with(phi, |g, phi| *g *= cexp(*phi)),
                    None => g.fill(nan),
                }
            }

            if let Solved::Solved(TipTilt { psi, phi }) = &self.tip_tilt {
                let pos = antpos.and_then(|a| a.get(&ant));
                match (psi.get(&pol), phi.get(&pol), pos) {
                    (Some(psi), Some(phi), Some(&[x, y])) => {
                        g.indexed_iter_mut().for_each(|((t, f), g)| {
                            let slope = phi[(0, t, f)] * x + phi[(1, t, f)] * y;
                            *g *= cexp(-psi[(t, f)]) * cexp(-slope);
                        })
                    }
                    _ => g.fill(nan),
                }
            }

            if let Solved::Solved(abs_amp) = &self.abs_amp {
                match abs_amp.get(&pol) {
                    Some(a) => g.zip_mut_with(a, |g, a| *g *= a.sqrt()),
                    None => g.fill(nan),
                }
            }

            if let Solved::Solved(delay) = &self.delay {
                match (delay.get(&(ant, pol)), freqs) {
                    (Some(tau), Some(freqs)) => {
                        g.indexed_iter_mut().for_each(|((t, f), g)| {
                            *g *= cexp(TAU * tau[t] * freqs[f]);
                        })
                    }
                    _ => g.fill(nan),
                }
            }

            gains.insert((ant, pol), g);
        }
        gains
    }

    /// Has any component been solved?
    pub fn any_solved(&self) -> bool {
        self.amp.is_solved()
            || self.phase.is_solved()
            || self.tip_tilt.is_solved()
            || self.abs_amp.is_solved()
            || self.delay.is_solved()
    }

    /// A copy of this solution with one component removed.
    pub fn without(&self, component: GainComponent) -> GainSolution {
        let mut solution = self.clone();
        match component {
            GainComponent::Amplitude => solution.amp = Solved::Absent,
            GainComponent::Phase => solution.phase = Solved::Absent,
            GainComponent::TipTilt => solution.tip_tilt = Solved::Absent,
            GainComponent::AbsAmplitude => solution.abs_amp = Solved::Absent,
            GainComponent::Delay => solution.delay = Solved::Absent,
        }
        solution
    }
}
