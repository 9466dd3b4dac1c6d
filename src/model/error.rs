// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from building or configuring a measurement model.

use thiserror::Error;

use crate::{
    parms::ParmError,
    sky::SkyError,
    vis::{Baseline, CorrelationBasis},
};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("The source selection {0:?} didn't match any patches")]
    NoPatches(Vec<String>),

    #[error("Correcting for direction-dependent effects needs exactly one patch, but {0} were selected")]
    DdeRequiresSinglePatch(usize),

    #[error("No patch visibility buffer is called '{0}'")]
    UnknownPatchBuffer(String),

    #[error("The visibility buffer of patch '{patch}' has no baseline {baseline}")]
    PatchBufferMissingBaseline { patch: String, baseline: Baseline },

    #[error("The visibility buffer of patch '{patch}' is in the {got} basis, but the model is in the {expected} basis")]
    PatchBufferBasis {
        patch: String,
        expected: CorrelationBasis,
        got: CorrelationBasis,
    },

    #[error("Baseline {baseline} refers to a station that doesn't exist; the instrument has {n_stations} stations")]
    BadBaseline {
        baseline: Baseline,
        n_stations: usize,
    },

    #[error("Parameter '{0}' isn't used by this model, so it can't be solved for")]
    UnknownSolvable(String),

    #[error("No parameter of this model matches the solvable pattern '{0}'")]
    NoMatchingSolvables(String),

    #[error("Invalid solvable pattern '{pattern}': {err}")]
    BadSolvablePattern {
        pattern: String,
        err: glob::PatternError,
    },

    #[error(transparent)]
    Parm(#[from] ParmError),

    #[error(transparent)]
    Sky(#[from] SkyError),
}
