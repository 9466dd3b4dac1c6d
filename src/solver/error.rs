// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from solving for parameter values.

use thiserror::Error;

use crate::vis::Baseline;

#[derive(Error, Debug)]
pub enum SolveError {
    #[error("No parameters are solvable; nothing to solve for")]
    NoSolvables,

    #[error("The observed visibilities have no baseline {0}")]
    MissingBaseline(Baseline),

    #[error("The normal matrix is singular in iteration {iteration}; the solvable parameters aren't constrained by the unflagged data")]
    Singular { iteration: usize },
}
