// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility buffers, baselines and correlations.

mod error;

pub use error::VisError;

use std::collections::HashSet;
use std::path::Path;

use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{coord::RaDec, expr::Grid, Jones};

/// A pair of station indices. Always stored with the smaller index first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Baseline(pub usize, pub usize);

impl Baseline {
    pub fn new(a: usize, b: usize) -> Baseline {
        Baseline(a.min(b), a.max(b))
    }

    pub fn is_auto(&self) -> bool {
        self.0 == self.1
    }
}

impl std::fmt::Display for Baseline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Correlation {
    XX,
    XY,
    YX,
    YY,
    RR,
    RL,
    LR,
    LL,
}

/// Which polarisation basis the correlations are in.
#[derive(
    Debug, Display, EnumIter, EnumString, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationBasis {
    #[default]
    #[strum(serialize = "linear")]
    Linear,

    #[strum(serialize = "circular")]
    Circular,
}

impl CorrelationBasis {
    /// The correlations in the order the elements of a Jones matrix hold them.
    pub fn correlations(self) -> [Correlation; 4] {
        use Correlation::*;
        match self {
            CorrelationBasis::Linear => [XX, XY, YX, YY],
            CorrelationBasis::Circular => [RR, RL, LR, LL],
        }
    }
}

/// Visibilities of many baselines on a common (time, frequency) grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisBuffer {
    pub baselines: Vec<Baseline>,
    pub basis: CorrelationBasis,
    pub grid: Grid,

    /// (baseline, time, frequency)
    pub samples: Array3<Jones>,

    /// (baseline, time, frequency, correlation)
    pub flags: Array4<bool>,

    /// \[Hz\]
    pub reference_freq: f64,
    pub phase_reference: RaDec,
    pub delay_reference: RaDec,
    pub tile_reference: RaDec,
}

impl VisBuffer {
    /// An all-zero, unflagged buffer.
    pub fn new(
        baselines: Vec<Baseline>,
        basis: CorrelationBasis,
        grid: Grid,
        phase_reference: RaDec,
    ) -> VisBuffer {
        let (nt, nf) = grid.shape();
        let nbl = baselines.len();
        let reference_freq = if grid.freq.is_empty() {
            0.0
        } else {
            grid.freq.centers().iter().sum::<f64>() / nf as f64
        };
        VisBuffer {
            baselines,
            basis,
            grid,
            samples: Array3::from_elem((nbl, nt, nf), Jones::zero()),
            flags: Array4::from_elem((nbl, nt, nf, 4), false),
            reference_freq,
            phase_reference,
            delay_reference: phase_reference,
            tile_reference: phase_reference,
        }
    }

    pub fn n_baselines(&self) -> usize {
        self.baselines.len()
    }

    pub fn baseline_index(&self, baseline: Baseline) -> Option<usize> {
        self.baselines.iter().position(|&b| b == baseline)
    }

    fn check(&self) -> Result<(), VisError> {
        for (axis, a) in [("time", &self.grid.time), ("frequency", &self.grid.freq)] {
            if a.len() != a.n_widths() {
                return Err(VisError::AxisWidths {
                    axis,
                    centers: a.len(),
                    widths: a.n_widths(),
                });
            }
        }
        let (nt, nf) = self.grid.shape();
        let nbl = self.baselines.len();
        if self.samples.dim() != (nbl, nt, nf) {
            return Err(VisError::Shape {
                what: "samples",
                expected: vec![nbl, nt, nf],
                got: self.samples.shape().to_vec(),
            });
        }
        if self.flags.dim() != (nbl, nt, nf, 4) {
            return Err(VisError::Shape {
                what: "flags",
                expected: vec![nbl, nt, nf, 4],
                got: self.flags.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Put the lower station index first on every baseline. The samples of a
    /// flipped baseline are conjugate-transposed (`V_qp = V_pq^H`), and its
    /// cross-hand flags swapped.
    fn normalise_baselines(&mut self) -> Result<(), VisError> {
        let mut seen = HashSet::new();
        for (i, b) in self.baselines.iter_mut().enumerate() {
            if b.0 > b.1 {
                *b = Baseline::new(b.0, b.1);
                self.samples
                    .slice_mut(s![i, .., ..])
                    .mapv_inplace(|j| j.h());
                let mut flags = self.flags.slice_mut(s![i, .., .., ..]);
                for mut cell in flags.lanes_mut(Axis(2)) {
                    cell.swap(1, 2);
                }
            }
            if !seen.insert(*b) {
                return Err(VisError::DuplicateBaseline(*b));
            }
        }
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<VisBuffer, VisError> {
        debug!("Reading visibilities from {}", path.display());
        let s = std::fs::read_to_string(path)?;
        let mut buffer: VisBuffer = serde_json::from_str(&s)?;
        buffer.check()?;
        buffer.normalise_baselines()?;
        Ok(buffer)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), VisError> {
        debug!("Writing visibilities to {}", path.display());
        let s = serde_json::to_string(self)?;
        std::fs::write(path, s)?;
        Ok(())
    }
}
