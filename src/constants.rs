// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision.
 */

pub use std::f64::consts::{FRAC_PI_2, LN_2, PI, TAU};

/// Speed of light \[metres/second\]
pub const VEL_C: f64 = 299_792_458.0;

/// The dispersive delay constant relating slant TEC \[TECU\] to phase
/// \[radians\] at frequency ν \[Hz\]: φ = -k TEC / ν.
pub const TEC_PHASE_CONSTANT: f64 = 8.44797245e9;

/// The height of the thin-shell ionosphere \[metres\].
pub const DEFAULT_IONOSPHERE_HEIGHT: f64 = 400e3;

/// The mean radius of the Earth \[metres\].
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Seconds per (solar) day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// The default perturbation applied to solvable polynomial coefficients when
/// numerically estimating partial derivatives.
pub const DEFAULT_PERTURBATION: f64 = 1e-6;

/// The default condition-number threshold above which station Jones matrices
/// are flagged during correction.
pub const DEFAULT_CONDITION_NUMBER_THRESHOLD: f64 = 1e3;

/// The default spectral index of sources without one.
pub const DEFAULT_SPEC_INDEX: f64 = -0.8;

/// Default maximum number of solver iterations.
pub const DEFAULT_MAX_ITER: usize = 20;

/// Default convergence threshold of the solver (largest coefficient update).
pub const DEFAULT_EPSILON: f64 = 1e-8;
