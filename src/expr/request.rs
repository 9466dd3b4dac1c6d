// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Evaluation grids and requests.

use crossbeam_utils::atomic::AtomicCell;
use serde::{Deserialize, Serialize};

pub type RequestId = u64;

static NEXT_REQUEST_ID: AtomicCell<RequestId> = AtomicCell::new(0);

/// One axis of an evaluation grid: cell centres and cell widths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    centers: Vec<f64>,
    widths: Vec<f64>,
}

impl Axis {
    pub fn new(centers: Vec<f64>, widths: Vec<f64>) -> Self {
        assert_eq!(
            centers.len(),
            widths.len(),
            "An axis needs exactly one width per cell"
        );
        Self { centers, widths }
    }

    /// `n` contiguous cells of equal `width`, the first starting at `start`.
    pub fn regular(start: f64, width: f64, n: usize) -> Self {
        let centers = (0..n)
            .map(|i| start + (i as f64 + 0.5) * width)
            .collect();
        Self::new(centers, vec![width; n])
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    /// The number of cell widths. Only differs from [`Axis::len`] for an axis
    /// that was deserialised from a malformed file.
    pub(crate) fn n_widths(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn center(&self, i: usize) -> f64 {
        self.centers[i]
    }

    pub fn width(&self, i: usize) -> f64 {
        self.widths[i]
    }

    pub fn lower(&self, i: usize) -> f64 {
        self.centers[i] - 0.5 * self.widths[i]
    }

    pub fn upper(&self, i: usize) -> f64 {
        self.centers[i] + 0.5 * self.widths[i]
    }

    /// The index of the cell whose centre matches `center` to within a small
    /// fraction of that cell's width.
    pub fn locate(&self, center: f64) -> Option<usize> {
        self.centers
            .iter()
            .zip(self.widths.iter())
            .position(|(&c, &w)| (c - center).abs() <= 1e-6 * w.abs().max(f64::MIN_POSITIVE))
    }

    /// The extent spanned by the axis. An empty axis has an empty (inverted)
    /// extent.
    pub fn range(&self) -> (f64, f64) {
        if self.is_empty() {
            return (f64::INFINITY, f64::NEG_INFINITY);
        }
        (self.lower(0), self.upper(self.len() - 1))
    }
}

/// The centre of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    /// \[seconds, MJD\]
    pub time: f64,
    /// \[Hz\]
    pub freq: f64,
}

/// A two-dimensional (time, frequency) evaluation grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub time: Axis,
    pub freq: Axis,
}

impl Grid {
    pub fn new(time: Axis, freq: Axis) -> Self {
        Self { time, freq }
    }

    /// (number of timesteps, number of channels)
    pub fn shape(&self) -> (usize, usize) {
        (self.time.len(), self.freq.len())
    }

    #[inline]
    pub fn cell(&self, t: usize, f: usize) -> GridCell {
        GridCell {
            time: self.time.center(t),
            freq: self.freq.center(f),
        }
    }

    pub fn domain(&self) -> Domain {
        Domain {
            time: self.time.range(),
            freq: self.freq.range(),
        }
    }
}

/// A rectangular region of (time, frequency) space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub time: (f64, f64),
    pub freq: (f64, f64),
}

impl Domain {
    /// The identity of [`Domain::union`].
    pub fn empty() -> Self {
        Self {
            time: (f64::INFINITY, f64::NEG_INFINITY),
            freq: (f64::INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.time.0 <= self.time.1 && self.freq.0 <= self.freq.1)
    }

    pub fn union(&self, other: &Domain) -> Domain {
        Domain {
            time: (self.time.0.min(other.time.0), self.time.1.max(other.time.1)),
            freq: (self.freq.0.min(other.freq.0), self.freq.1.max(other.freq.1)),
        }
    }
}

/// A grid to evaluate expressions on. Each request gets a process-unique id;
/// cached values are keyed on it, so building a new request for a new grid
/// never returns stale values.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    grid: Grid,
}

impl Request {
    pub fn new(grid: Grid) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1),
            grid,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }
}
