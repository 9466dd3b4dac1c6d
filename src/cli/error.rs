// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all bbs-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use crate::{
    model::ModelError, parms::ParmError, sky::SkyError, solver::SolveError, vis::VisError,
};

/// The *only* publicly visible error from bbs.
#[derive(Error, Debug)]
pub enum BbsError {
    /// An error related to parset (argument) files.
    #[error("{0}\n\nA parset is a TOML or JSON file with the sections: observation, instrument, sky, parms, model, solve")]
    Parset(String),

    /// An error related to building a measurement model.
    #[error("{0}")]
    Model(String),

    /// An error related to the parameter store.
    #[error("{0}\n\nParameters are given under [parms.values] or matched by [[parms.defaults]] patterns")]
    Parm(String),

    /// An error related to the sky model.
    #[error("{0}")]
    Sky(String),

    /// An error related to solving.
    #[error("{0}")]
    Solve(String),

    /// An error related to reading or writing visibilities.
    #[error("{0}")]
    Vis(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<ModelError> for BbsError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Parm(e) => Self::from(e),
            ModelError::Sky(e) => Self::from(e),
            ModelError::NoPatches(_)
            | ModelError::DdeRequiresSinglePatch(_)
            | ModelError::UnknownPatchBuffer(_)
            | ModelError::PatchBufferMissingBaseline { .. }
            | ModelError::PatchBufferBasis { .. }
            | ModelError::BadBaseline { .. }
            | ModelError::UnknownSolvable(_)
            | ModelError::NoMatchingSolvables(_)
            | ModelError::BadSolvablePattern { .. } => Self::Model(e.to_string()),
        }
    }
}

impl From<ParmError> for BbsError {
    fn from(e: ParmError) -> Self {
        Self::Parm(e.to_string())
    }
}

impl From<SkyError> for BbsError {
    fn from(e: SkyError) -> Self {
        Self::Sky(e.to_string())
    }
}

impl From<SolveError> for BbsError {
    fn from(e: SolveError) -> Self {
        Self::Solve(e.to_string())
    }
}

impl From<VisError> for BbsError {
    fn from(e: VisError) -> Self {
        let s = e.to_string();
        match e {
            VisError::Shape { .. }
            | VisError::AxisWidths { .. }
            | VisError::DuplicateBaseline(_)
            | VisError::Json(_) => Self::Vis(s),
            VisError::IO(_) => Self::Generic(s),
        }
    }
}

// Library and external errors.

impl From<std::io::Error> for BbsError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<toml::ser::Error> for BbsError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Generic(format!("Couldn't serialise parameters to toml: {e}"))
    }
}
