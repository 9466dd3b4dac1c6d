// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from sky-model lookups.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkyError {
    #[error("Patch '{0}' is not in the sky model")]
    UnknownPatch(String),

    #[error("Patch '{0}' has neither a position nor any sources")]
    NoPosition(String),

    #[error("Invalid patch pattern '{pattern}': {err}")]
    BadPattern {
        pattern: String,
        err: glob::PatternError,
    },
}
