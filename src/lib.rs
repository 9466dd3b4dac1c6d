// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Measurement-equation expression engine for LOFAR calibration and simulation.

A per-baseline measurement equation is assembled as a DAG of typed expression
nodes ([`expr`]), evaluated over a time-frequency grid through a shared
[`cache::Cache`], and differentiated numerically against solvable parameters
held in a [`parms::ParmStore`].
 */

pub mod cache;
mod cli;
pub mod constants;
pub mod coord;
pub mod derivative;
pub mod expr;
pub mod instrument;
mod jones;
pub mod model;
pub mod parms;
pub mod sky;
pub mod solver;
pub mod vis;

// Re-exports.
pub use cache::{Cache, CachePolicy, ClearMode};
pub use cli::{Bbs, BbsError};
pub use derivative::Measurement;
pub use expr::{Expr, ExprBase, ExprRef, Grid, Request};
pub use jones::Jones;
pub use model::{MeasurementExpr, MeasurementModel, ModelConfig, ModelError};
pub use parms::{ParmStore, ParmStoreRef};

/// Double-precision complex numbers. All engine arithmetic is done in double
/// precision.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;
