// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gauss-Newton solving for the coefficients of solvable parameters.
//!
//! Every iteration evaluates the model on all baselines, turns the unflagged
//! residuals and partial derivatives into normal equations (the real and
//! imaginary parts of every correlation are separate equations), solves them
//! with an LU decomposition, and updates the parameter store with the
//! solution.

mod error;
#[cfg(test)]
mod tests;

pub use error::SolveError;

use std::collections::BTreeMap;

use log::{debug, info, trace};
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_EPSILON, DEFAULT_MAX_ITER},
    expr::PValueKey,
    model::MeasurementExpr,
    parms::ParmStoreRef,
    vis::VisBuffer,
};

/// The `solve` section of a parset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolveConfig {
    /// Glob patterns selecting the solvable parameters.
    pub solvables: Vec<String>,

    pub max_iterations: usize,

    /// Stop when the largest coefficient update is smaller than this.
    pub epsilon: f64,

    /// Levenberg-Marquardt damping; the diagonal of the normal matrix is
    /// scaled by `1 + lm_factor`. Zero is plain Gauss-Newton.
    pub lm_factor: f64,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            solvables: vec![],
            max_iterations: DEFAULT_MAX_ITER,
            epsilon: DEFAULT_EPSILON,
            lm_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveResult {
    pub num_iterations: usize,
    pub converged: bool,

    /// The largest coefficient update of the last iteration.
    pub max_update: f64,

    /// The sum of squared residuals before the last update.
    pub chi_sqr: f64,

    /// The number of real-valued equations used per iteration.
    pub num_equations: usize,
}

pub struct Solver {
    config: SolveConfig,
}

impl Solver {
    pub fn new(config: SolveConfig) -> Solver {
        Solver { config }
    }

    /// Solve for the solvable parameters of `model` such that it reproduces
    /// `observed`. The parameter `store` shared by the model is updated in
    /// place.
    pub fn solve<M: MeasurementExpr + ?Sized>(
        &self,
        model: &mut M,
        observed: &VisBuffer,
        store: &ParmStoreRef,
    ) -> Result<SolveResult, SolveError> {
        // Which observed baseline each model baseline compares against.
        let rows = model
            .baselines()
            .iter()
            .map(|&b| {
                observed
                    .baseline_index(b)
                    .ok_or(SolveError::MissingBaseline(b))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let unknowns: Vec<PValueKey> = {
            let store = store.borrow();
            model
                .solvables()
                .into_iter()
                .flat_map(|id| (0..store.get(id).n_coeffs()).map(move |k| PValueKey::new(id, k)))
                .collect()
        };
        if unknowns.is_empty() {
            return Err(SolveError::NoSolvables);
        }
        let index: BTreeMap<PValueKey, usize> =
            unknowns.iter().enumerate().map(|(i, &k)| (k, i)).collect();
        info!(
            "Solving for {} coefficients of {} parameters over {} baselines",
            unknowns.len(),
            model.solvables().len(),
            model.size()
        );

        model.set_eval_grid(observed.grid.clone());
        let mut result = SolveResult {
            num_iterations: 0,
            converged: false,
            max_update: f64::INFINITY,
            chi_sqr: 0.0,
            num_equations: 0,
        };
        while result.num_iterations < self.config.max_iterations {
            result.num_iterations += 1;
            let iteration = result.num_iterations;

            let mut normal = NormalEquations::new(unknowns.len());
            for (i, &row) in rows.iter().enumerate() {
                normal.add_baseline(model, i, observed, row, &index);
            }

            normal.damp(self.config.lm_factor);
            let dx = normal
                .solve()
                .ok_or(SolveError::Singular { iteration })?;

            {
                let mut store = store.borrow_mut();
                let mut coeffs: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
                for (key, d) in unknowns.iter().zip(dx.iter()) {
                    let c = coeffs
                        .entry(key.parm_id)
                        .or_insert_with(|| store.get(key.parm_id).coeffs().to_vec());
                    c[key.coeff_id] += d;
                }
                for (id, c) in coeffs {
                    store.set_coeffs(id, &c);
                }
            }
            model.solvables_changed();

            result.max_update = dx.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
            result.chi_sqr = normal.chi_sqr;
            result.num_equations = normal.num_equations;
            debug!(
                "Iteration {iteration}: chi^2 {:.6e} over {} equations, largest update {:.3e}",
                result.chi_sqr, result.num_equations, result.max_update
            );
            if result.max_update < self.config.epsilon {
                result.converged = true;
                break;
            }
        }

        if result.converged {
            info!(
                "Converged after {} iterations (largest update {:.3e})",
                result.num_iterations, result.max_update
            );
        } else {
            info!(
                "Didn't converge after {} iterations (largest update {:.3e})",
                result.num_iterations, result.max_update
            );
        }
        Ok(result)
    }
}

/// `A^T A x = A^T r`, accumulated one equation at a time.
struct NormalEquations {
    matrix: DMatrix<f64>,
    rhs: DVector<f64>,
    chi_sqr: f64,
    num_equations: usize,
}

impl NormalEquations {
    fn new(n: usize) -> NormalEquations {
        NormalEquations {
            matrix: DMatrix::zeros(n, n),
            rhs: DVector::zeros(n),
            chi_sqr: 0.0,
            num_equations: 0,
        }
    }

    /// Add one real equation: `sum_k coeffs[k] x_k = residual`. `coeffs` is
    /// sparse; pairs of (unknown index, coefficient).
    fn add(&mut self, coeffs: &[(usize, f64)], residual: f64) {
        for &(i, ai) in coeffs {
            self.rhs[i] += ai * residual;
            for &(j, aj) in coeffs {
                self.matrix[(i, j)] += ai * aj;
            }
        }
        self.chi_sqr += residual * residual;
        self.num_equations += 1;
    }

    /// Add the equations of baseline `i` of `model`, compared against row
    /// `row` of `observed`.
    fn add_baseline<M: MeasurementExpr + ?Sized>(
        &mut self,
        model: &mut M,
        i: usize,
        observed: &VisBuffer,
        row: usize,
        index: &BTreeMap<PValueKey, usize>,
    ) {
        let m = model.evaluate(i);
        if m.partials.is_empty() {
            trace!("Baseline {} doesn't depend on any solvable", model.baselines()[i]);
        }
        let partials: Vec<(usize, &Array2<_>)> = m
            .partials
            .iter()
            .filter_map(|(key, d)| index.get(key).map(|&k| (k, d)))
            .collect();

        let mut re = Vec::with_capacity(partials.len());
        let mut im = Vec::with_capacity(partials.len());
        for ((t, f), model_vis) in m.value.indexed_iter() {
            if m.is_flagged(t, f) {
                continue;
            }
            let obs = observed.samples[(row, t, f)];
            for c in 0..4 {
                if observed.flags[(row, t, f, c)] {
                    continue;
                }
                let r = obs[c] - model_vis[c];
                re.clear();
                im.clear();
                for &(k, d) in &partials {
                    let d = d[(t, f)][c];
                    re.push((k, d.re));
                    im.push((k, d.im));
                }
                self.add(&re, r.re);
                self.add(&im, r.im);
            }
        }
    }

    fn damp(&mut self, lm_factor: f64) {
        if lm_factor > 0.0 {
            for i in 0..self.matrix.nrows() {
                self.matrix[(i, i)] *= 1.0 + lm_factor;
            }
        }
    }

    fn solve(&self) -> Option<DVector<f64>> {
        solve_dense(self.matrix.clone(), &self.rhs)
    }
}

/// Solve `a x = b` by LU decomposition with partial pivoting. Returns `None`
/// if `a` is (numerically) singular.
fn solve_dense(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = b.len();
    let scale = a.amax();
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let tolerance = scale * n as f64 * f64::EPSILON;

    let lu = a.lu();
    if lu.u().diagonal().iter().any(|d| d.abs() <= tolerance) {
        return None;
    }
    lu.solve(b).filter(|x| x.iter().all(|v| v.is_finite()))
}
