// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Geometry, source coherence and observed-data nodes.

use std::rc::Rc;

use ndarray::prelude::*;

use super::{combine2, Binary, BinaryOp, ExprRef, Grid, Leaf, LeafOp, Value, Vector3};
use crate::{
    c64,
    constants::{FRAC_PI_2, LN_2, TAU, VEL_C},
    coord::{gmst, Lmn, RaDec, Xyz},
    vis::VisBuffer,
    Jones,
};

const GAUSSIAN_EXP_CONST: f64 = -(FRAC_PI_2 * FRAC_PI_2) / LN_2;

/// UVW coordinates \[m\] of a station (relative to the array reference
/// position) towards the phase centre, per time cell.
pub struct StationUvw {
    pub position: Xyz,
    pub phase_centre: RaDec,
}

impl LeafOp for StationUvw {
    type Output = Vector3;

    fn name(&self) -> &'static str {
        "StationUvw"
    }

    fn evaluate(&self, grid: &Grid) -> Value<Vector3> {
        let per_time: Vec<Vector3> = grid
            .time
            .centers()
            .iter()
            .map(|&t| {
                let ha = gmst(t) - self.phase_centre.ra;
                self.position.to_uvw(ha, self.phase_centre.dec).to_array()
            })
            .collect();
        Value::new(Array2::from_shape_fn(grid.shape(), |(t, _)| per_time[t]))
    }
}

pub fn station_uvw(position: Xyz, phase_centre: RaDec) -> ExprRef<Vector3> {
    Rc::new(Leaf::new(StationUvw {
        position,
        phase_centre,
    }))
}

/// The unit ITRF vector pointing at a sky position, per time cell.
pub struct ItrfDirection {
    pub direction: RaDec,
}

impl LeafOp for ItrfDirection {
    type Output = Vector3;

    fn name(&self) -> &'static str {
        "ItrfDirection"
    }

    fn evaluate(&self, grid: &Grid) -> Value<Vector3> {
        let per_time: Vec<Vector3> = grid
            .time
            .centers()
            .iter()
            .map(|&t| self.direction.to_itrf(gmst(t)))
            .collect();
        Value::new(Array2::from_shape_fn(grid.shape(), |(t, _)| per_time[t]))
    }
}

pub fn itrf_direction(direction: RaDec) -> ExprRef<Vector3> {
    Rc::new(Leaf::new(ItrfDirection { direction }))
}

/// The (l,m,n) coordinates of a source relative to the phase centre.
pub struct SourceLmn {
    pub lmn: Lmn,
}

impl LeafOp for SourceLmn {
    type Output = Vector3;

    fn name(&self) -> &'static str {
        "Lmn"
    }

    fn evaluate(&self, grid: &Grid) -> Value<Vector3> {
        Value::filled(grid.shape(), self.lmn.to_array())
    }
}

pub fn source_lmn(source: RaDec, phase_centre: RaDec) -> ExprRef<Vector3> {
    Rc::new(Leaf::new(SourceLmn {
        lmn: source.to_lmn(&phase_centre),
    }))
}

/// The brightness of a point source, scaled from a reference frequency with a
/// power law.
pub struct PointCoherence {
    pub brightness: Jones,
    pub reference_freq: f64,
    pub spectral_index: f64,
}

impl LeafOp for PointCoherence {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "PointCoherence"
    }

    fn evaluate(&self, grid: &Grid) -> Value<Jones> {
        if self.spectral_index == 0.0 || self.reference_freq <= 0.0 {
            return Value::filled(grid.shape(), self.brightness);
        }
        let per_freq: Vec<Jones> = grid
            .freq
            .centers()
            .iter()
            .map(|&f| self.brightness * (f / self.reference_freq).powf(self.spectral_index))
            .collect();
        Value::new(Array2::from_shape_fn(grid.shape(), |(_, f)| per_freq[f]))
    }
}

pub fn point_coherence(brightness: Jones, reference_freq: f64, spectral_index: f64) -> ExprRef<Jones> {
    Rc::new(Leaf::new(PointCoherence {
        brightness,
        reference_freq,
        spectral_index,
    }))
}

/// (station UVW, source LMN) -> `exp(-2πi ν/c (ul + vm + w(n-1)))`
pub struct StationShift;

impl BinaryOp<Vector3, Vector3> for StationShift {
    type Output = c64;

    fn name(&self) -> &'static str {
        "StationShift"
    }

    fn evaluate(&self, grid: &Grid, uvw: &Value<Vector3>, lmn: &Value<Vector3>) -> Value<c64> {
        combine2(grid, uvw, lmn, |cell, uvw, lmn| {
            let path = uvw[0] * lmn[0] + uvw[1] * lmn[1] + uvw[2] * (lmn[2] - 1.0);
            c64::from_polar(1.0, -TAU * cell.freq / VEL_C * path)
        })
    }
}

pub fn station_shift(uvw: ExprRef<Vector3>, lmn: ExprRef<Vector3>) -> ExprRef<c64> {
    Rc::new(Binary::new(StationShift, uvw, lmn))
}

/// (UVW of station p, UVW of station q) -> visibility envelope of an
/// elliptical Gaussian source.
pub struct GaussianEnvelope {
    /// FWHM of the major axis \[radians\]
    pub maj: f64,
    /// FWHM of the minor axis \[radians\]
    pub min: f64,
    /// Position angle \[radians\]
    pub pa: f64,
}

impl BinaryOp<Vector3, Vector3> for GaussianEnvelope {
    type Output = f64;

    fn name(&self) -> &'static str {
        "GaussianEnvelope"
    }

    fn evaluate(&self, grid: &Grid, p: &Value<Vector3>, q: &Value<Vector3>) -> Value<f64> {
        let (s_pa, c_pa) = self.pa.sin_cos();
        combine2(grid, p, q, |cell, p, q| {
            let scale = cell.freq / VEL_C;
            let u = (p[0] - q[0]) * scale;
            let v = (p[1] - q[1]) * scale;
            // Temporary variables for clarity.
            let k_x = u * s_pa + v * c_pa;
            let k_y = u * c_pa - v * s_pa;
            (GAUSSIAN_EXP_CONST * (self.maj.powi(2) * k_x.powi(2) + self.min.powi(2) * k_y.powi(2)))
                .exp()
        })
    }
}

pub fn gaussian_envelope(
    shape: GaussianEnvelope,
    p: ExprRef<Vector3>,
    q: ExprRef<Vector3>,
) -> ExprRef<f64> {
    Rc::new(Binary::new(shape, p, q))
}

/// The observed visibilities of one baseline.
///
/// Request cells are matched to buffer cells by their centres. Cells absent
/// from the buffer are zero and flagged. When `with_flags` is set, a cell is
/// also flagged if any of its correlations is.
pub struct VisData {
    pub buffer: Rc<VisBuffer>,
    pub baseline: usize,
    pub with_flags: bool,
}

impl LeafOp for VisData {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "VisData"
    }

    fn evaluate(&self, grid: &Grid) -> Value<Jones> {
        let buffer = &self.buffer;
        let bl = self.baseline;
        let time_map: Vec<Option<usize>> = grid
            .time
            .centers()
            .iter()
            .map(|&t| buffer.grid.time.locate(t))
            .collect();
        let freq_map: Vec<Option<usize>> = grid
            .freq
            .centers()
            .iter()
            .map(|&f| buffer.grid.freq.locate(f))
            .collect();

        let mut value = Array2::from_elem(grid.shape(), Jones::zero());
        let mut flags = Array2::from_elem(grid.shape(), true);
        for ((t, f), v) in value.indexed_iter_mut() {
            if let (Some(bt), Some(bf)) = (time_map[t], freq_map[f]) {
                *v = buffer.samples[(bl, bt, bf)];
                flags[(t, f)] =
                    self.with_flags && buffer.flags.slice(s![bl, bt, bf, ..]).iter().any(|&x| x);
            }
        }
        Value::new(value).with_flags(Some(flags))
    }
}

pub fn vis_data(buffer: Rc<VisBuffer>, baseline: usize) -> ExprRef<Jones> {
    Rc::new(Leaf::new(VisData {
        buffer,
        baseline,
        with_flags: true,
    }))
}

/// Like [`vis_data`], but the per-correlation flags of the buffer are left
/// out; only cells missing from the buffer are flagged.
pub fn vis_samples(buffer: Rc<VisBuffer>, baseline: usize) -> ExprRef<Jones> {
    Rc::new(Leaf::new(VisData {
        buffer,
        baseline,
        with_flags: false,
    }))
}
