// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::Baseline;

#[derive(Error, Debug)]
pub enum VisError {
    #[error("Visibility {what} have shape {got:?}, expected {expected:?}")]
    Shape {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("The {axis} axis has {centers} cell centres but {widths} cell widths")]
    AxisWidths {
        axis: &'static str,
        centers: usize,
        widths: usize,
    },

    #[error("Baseline {0} appears more than once")]
    DuplicateBaseline(Baseline),

    #[error("Couldn't decode visibilities: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
