// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with the parameter store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParmError {
    #[error("Parameter '{0}' has no value and no default matches it")]
    NotFound(String),

    #[error("Parameter '{name}' has {got} coefficients, but its shape {shape:?} needs {expected}")]
    CoeffShape {
        name: String,
        shape: [usize; 2],
        expected: usize,
        got: usize,
    },

    #[error("Parameter '{0}' has no coefficients")]
    NoCoeffs(String),

    #[error("Invalid parameter pattern '{pattern}': {err}")]
    BadPattern {
        pattern: String,
        err: glob::PatternError,
    },
}
