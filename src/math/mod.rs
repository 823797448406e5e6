// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics, including the weighted least-squares machinery
//! shared by all calibration equations.


use std::hash::Hash;

use indexmap::IndexMap;
use nalgebra::{DMatrix, DVector};
use ndarray::prelude::*;

use crate::{
    c64,
    constants::{PINV_RCOND, TAU},
};

/// Complex exponential. The argument is assumed to be purely imaginary.
///
/// This function doesn't actually use complex numbers; it just returns the real
/// and imag components from Euler's formula (i.e. e^{ix} = cos{x} + i sin{x}).
#[inline]
pub(crate) fn cexp(x: f64) -> c64 {
    let (im, re) = x.sin_cos();
    c64::new(re, im)
}

/// One equation of a [`LinearSystem`]. Coefficients refer to unknown columns.
#[derive(Debug, Clone)]
struct Row {
    coeffs: Vec<(usize, f64)>,
    obs: f64,
    weight: f64,
}

/// A (possibly over-determined, possibly rank-deficient) real linear system
/// with named unknowns. Each equation carries a weight, interpreted as
/// 1/sigma^2.
#[derive(Debug, Clone)]
pub(crate) struct LinearSystem<K> {
    unknowns: IndexMap<K, usize>,
    rows: Vec<Row>,
}

impl<K: Hash + Eq + Clone> LinearSystem<K> {
    pub(crate) fn new() -> LinearSystem<K> {
        LinearSystem {
            unknowns: IndexMap::new(),
            rows: vec![],
        }
    }

    fn column(&mut self, unknown: &K) -> usize {
        let next = self.unknowns.len();
        *self.unknowns.entry(unknown.clone()).or_insert(next)
    }

    /// Add the equation sum(coeff * unknown) = obs. The unknowns are always
    /// registered, but the equation itself is dropped if the weight isn't
    /// positive or anything is non-finite. Unknowns that never appear in a
    /// kept equation are unconstrained and solve to NaN.
    pub(crate) fn add_equation(&mut self, terms: &[(K, f64)], obs: f64, weight: f64) {
        let coeffs: Vec<(usize, f64)> = terms
            .iter()
            .map(|(k, c)| (self.column(k), *c))
            .collect();
        if weight > 0.0
            && weight.is_finite()
            && obs.is_finite()
            && coeffs.iter().all(|(_, c)| c.is_finite())
        {
            self.rows.push(Row {
                coeffs,
                obs,
                weight,
            });
        }
    }

    pub(crate) fn num_equations(&self) -> usize {
        self.rows.len()
    }

    /// Solve the weighted least-squares problem with an SVD pseudo-inverse.
    /// The least-norm solution is returned for rank-deficient systems.
    pub(crate) fn solve(&self) -> IndexMap<K, f64> {
        let num_unknowns = self.unknowns.len();
        let mut a = DMatrix::<f64>::zeros(self.rows.len(), num_unknowns);
        let mut b = DVector::<f64>::zeros(self.rows.len());
        for (i_row, row) in self.rows.iter().enumerate() {
            let sqrt_w = row.weight.sqrt();
            for &(i_col, c) in &row.coeffs {
                a[(i_row, i_col)] += c * sqrt_w;
            }
            b[i_row] = row.obs * sqrt_w;
        }

        // Coefficients for the same unknown can cancel within a row.
        let constrained: Vec<bool> = (0..num_unknowns)
            .map(|i_col| a.column(i_col).iter().any(|v| *v != 0.0))
            .collect();

        let solution = if self.rows.is_empty() || num_unknowns == 0 {
            None
        } else {
            let svd = a.svd(true, true);
            let eps = svd.singular_values.max() * PINV_RCOND;
            svd.solve(&b, eps).ok()
        };

        self.unknowns
            .iter()
            .map(|(k, &i_col)| {
                let v = match &solution {
                    Some(x) if constrained[i_col] => x[i_col],
                    _ => f64::NAN,
                };
                (k.clone(), v)
            })
            .collect()
    }
}

/// The Moore-Penrose pseudo-inverse of a matrix. Singular values below `rcond`
/// times the largest singular value are discarded.
pub(crate) fn pinv(matrix: ArrayView2<f64>, rcond: f64) -> Result<Array2<f64>, &'static str> {
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Ok(Array2::zeros((cols, rows)));
    }
    let m = DMatrix::from_fn(rows, cols, |i, j| matrix[(i, j)]);
    let svd = m.svd(true, true);
    let eps = svd.singular_values.max() * rcond;
    let inv = svd.pseudo_inverse(eps)?;
    Ok(Array2::from_shape_fn((cols, rows), |(i, j)| inv[(i, j)]))
}

/// The median of the finite values. NaN if there are none.
pub(crate) fn median<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Unwrap a sequence of phases \[radians\] by removing jumps larger than pi,
/// like numpy's `unwrap`.
pub(crate) fn unwrap_phase(phases: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phases.len());
    let mut correction = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phases {
        if let Some(prev) = prev {
            let diff = p - prev;
            // Wrap the difference into [-pi, pi).
            let wrapped = (diff + TAU / 2.0).rem_euclid(TAU) - TAU / 2.0;
            correction += wrapped - diff;
        }
        out.push(p + correction);
        prev = Some(p);
    }
    out
}

/// Fit y = slope * x + offset by least squares. `None` is returned if there are
/// fewer than two points or all x are the same.
pub(crate) fn fit_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = x[..n].iter().sum::<f64>() / nf;
    let y_mean = y[..n].iter().sum::<f64>() / nf;
    let (sxy, sxx) = x[..n]
        .iter()
        .zip(y[..n].iter())
        .fold((0.0, 0.0), |(sxy, sxx), (&x, &y)| {
            let dx = x - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });
    if sxx <= 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}

/// Median-filter a 2D array with a (rows, cols) kernel. Only pixels where
/// `valid` is true contribute to a median; windows shrink at the edges. Pixels
/// without any valid neighbours are set to 0.
pub(crate) fn median_filter_2d(
    values: ArrayView2<f64>,
    valid: ArrayView2<bool>,
    kernel: (usize, usize),
) -> Array2<f64> {
    let (num_rows, num_cols) = values.dim();
    let half_r = kernel.0 / 2;
    let half_c = kernel.1 / 2;
    let mut window = Vec::with_capacity(kernel.0 * kernel.1);
    Array2::from_shape_fn((num_rows, num_cols), |(r, c)| {
        window.clear();
        let r_range = r.saturating_sub(half_r)..(r + half_r + 1).min(num_rows);
        let c_range = c.saturating_sub(half_c)..(c + half_c + 1).min(num_cols);
        for rr in r_range {
            for cc in c_range.clone() {
                if valid[(rr, cc)] {
                    window.push(values[(rr, cc)]);
                }
            }
        }
        let m = median(window.iter().copied());
        if m.is_nan() {
            0.0
        } else {
            m
        }
    })
}
