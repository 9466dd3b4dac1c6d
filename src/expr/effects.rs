// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Instrumental and propagation effects.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::{
    combine1, combine2, combine3, combine5, Binary, BinaryOp, ExprRef, Grid, Quinary, QuinaryOp,
    Ternary, TernaryOp, Unary, UnaryOp, Value, Vector3,
};
use crate::{
    c64,
    constants::{TAU, TEC_PHASE_CONSTANT, VEL_C},
    coord::Xyz,
    Jones,
};

/// Clock delay τ \[s\] -> `exp(2πi ν τ)`
pub struct ClockDelay;

impl UnaryOp<f64> for ClockDelay {
    type Output = c64;

    fn name(&self) -> &'static str {
        "ClockDelay"
    }

    fn evaluate(&self, grid: &Grid, tau: &Value<f64>) -> Value<c64> {
        combine1(grid, tau, |cell, &tau| {
            c64::from_polar(1.0, TAU * cell.freq * tau)
        })
    }
}

pub fn clock_delay(tau: ExprRef<f64>) -> ExprRef<c64> {
    Rc::new(Unary::new(ClockDelay, tau))
}

/// Differential TEC \[TECU\] -> `exp(-i k TEC / ν)`
pub struct TecPhase;

impl UnaryOp<f64> for TecPhase {
    type Output = c64;

    fn name(&self) -> &'static str {
        "TecPhase"
    }

    fn evaluate(&self, grid: &Grid, tec: &Value<f64>) -> Value<c64> {
        combine1(grid, tec, |cell, &tec| {
            c64::from_polar(1.0, -TEC_PHASE_CONSTANT * tec / cell.freq)
        })
    }
}

pub fn tec_phase(tec: ExprRef<f64>) -> ExprRef<c64> {
    Rc::new(Unary::new(TecPhase, tec))
}

/// Rotation measure \[rad/m²\] -> rotation by `RM λ²`
pub struct FaradayRotation;

impl UnaryOp<f64> for FaradayRotation {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "FaradayRotation"
    }

    fn evaluate(&self, grid: &Grid, rm: &Value<f64>) -> Value<Jones> {
        combine1(grid, rm, |cell, &rm| {
            let lambda = VEL_C / cell.freq;
            Jones::rotation(rm * lambda * lambda)
        })
    }
}

pub fn faraday_rotation(rm: ExprRef<f64>) -> ExprRef<Jones> {
    Rc::new(Unary::new(FaradayRotation, rm))
}

/// Which parts of the station beam are modelled.
#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamMode {
    /// Element beam times array factor.
    #[default]
    #[strum(serialize = "default")]
    Default,

    #[strum(serialize = "array_factor")]
    ArrayFactor,

    #[strum(serialize = "element")]
    Element,
}

/// The response of a phased-array station towards a direction, when the
/// station is steered towards a reference direction. Both directions are
/// unit ITRF vectors.
///
/// The element response is a cosine taper with zenith angle (zero below the
/// horizon); the array factor is the normalised phased sum over the element
/// offsets.
pub struct StationBeam {
    /// Element positions relative to the station centre \[metres\].
    pub elements: Vec<Xyz>,
    /// The unit vector pointing at the local zenith of the station.
    pub up: Vector3,
    pub mode: BeamMode,
}

impl StationBeam {
    fn element(&self, d: &Vector3) -> f64 {
        let cos_za = d[0] * self.up[0] + d[1] * self.up[1] + d[2] * self.up[2];
        cos_za.max(0.0)
    }

    fn array_factor(&self, freq: f64, d: &Vector3, d0: &Vector3) -> c64 {
        if self.elements.is_empty() {
            return c64::new(1.0, 0.0);
        }
        let k = TAU * freq / VEL_C;
        let sum: c64 = self
            .elements
            .iter()
            .map(|e| {
                let path = e.x * (d[0] - d0[0]) + e.y * (d[1] - d0[1]) + e.z * (d[2] - d0[2]);
                c64::from_polar(1.0, k * path)
            })
            .sum();
        sum / self.elements.len() as f64
    }
}

impl BinaryOp<Vector3, Vector3> for StationBeam {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "StationBeam"
    }

    fn is_expensive(&self) -> bool {
        true
    }

    fn evaluate(&self, grid: &Grid, dir: &Value<Vector3>, ref_dir: &Value<Vector3>) -> Value<Jones> {
        combine2(grid, dir, ref_dir, |cell, d, d0| {
            let gain = match self.mode {
                BeamMode::Default => self.array_factor(cell.freq, d, d0) * self.element(d),
                BeamMode::ArrayFactor => self.array_factor(cell.freq, d, d0),
                BeamMode::Element => c64::new(self.element(d), 0.0),
            };
            Jones::diag(gain, gain)
        })
    }
}

pub fn station_beam(
    beam: StationBeam,
    dir: ExprRef<Vector3>,
    ref_dir: ExprRef<Vector3>,
) -> ExprRef<Jones> {
    Rc::new(Binary::new(beam, dir, ref_dir))
}

/// (station position \[m\], unit direction, ionosphere height \[m\]) ->
/// position where the line of sight crosses the thin-shell ionosphere.
pub struct PiercePoint {
    pub earth_radius: f64,
}

impl TernaryOp<Vector3, Vector3, f64> for PiercePoint {
    type Output = Vector3;

    fn name(&self) -> &'static str {
        "PiercePoint"
    }

    fn evaluate(
        &self,
        grid: &Grid,
        position: &Value<Vector3>,
        dir: &Value<Vector3>,
        height: &Value<f64>,
    ) -> Value<Vector3> {
        combine3(grid, position, dir, height, |_, p, d, &h| {
            // Solve |p + s d| = R + h for the positive root s.
            let r = self.earth_radius + h;
            let pd = p[0] * d[0] + p[1] * d[1] + p[2] * d[2];
            let pp = p[0] * p[0] + p[1] * p[1] + p[2] * p[2];
            let s = -pd + (pd * pd - pp + r * r).sqrt();
            [p[0] + s * d[0], p[1] + s * d[1], p[2] + s * d[2]]
        })
    }
}

pub fn pierce_point(
    position: ExprRef<Vector3>,
    dir: ExprRef<Vector3>,
    height: ExprRef<f64>,
    earth_radius: f64,
) -> ExprRef<Vector3> {
    Rc::new(Ternary::new(PiercePoint { earth_radius }, position, dir, height))
}

/// (pierce point, array reference position, c0, c1, c2) -> TEC \[TECU\] of a
/// linear phase screen `c0 + c1 x + c2 y`, where x and y are the east and
/// north offsets \[km\] of the pierce point from the point above the
/// reference position.
pub struct IonosphereScreen;

impl QuinaryOp<Vector3, Vector3, f64, f64, f64> for IonosphereScreen {
    type Output = f64;

    fn name(&self) -> &'static str {
        "IonosphereScreen"
    }

    fn evaluate(
        &self,
        grid: &Grid,
        pierce: &Value<Vector3>,
        reference: &Value<Vector3>,
        c0: &Value<f64>,
        c1: &Value<f64>,
        c2: &Value<f64>,
    ) -> Value<f64> {
        combine5(grid, pierce, reference, c0, c1, c2, |_, pp, rp, &c0, &c1, &c2| {
            let (x, y) = east_north_offset(pp, rp);
            c0 + c1 * x / 1e3 + c2 * y / 1e3
        })
    }
}

/// The east and north components \[m\] of `point` relative to the point at
/// the same geocentric radius directly above `reference`.
fn east_north_offset(point: &Vector3, reference: &Vector3) -> (f64, f64) {
    let lon = reference[1].atan2(reference[0]);
    let lat = reference[2].atan2(reference[0].hypot(reference[1]));
    let (s_lon, c_lon) = lon.sin_cos();
    let (s_lat, c_lat) = lat.sin_cos();
    let r_point = (point[0] * point[0] + point[1] * point[1] + point[2] * point[2]).sqrt();
    let above = [r_point * c_lat * c_lon, r_point * c_lat * s_lon, r_point * s_lat];
    let delta = [
        point[0] - above[0],
        point[1] - above[1],
        point[2] - above[2],
    ];
    let east = -s_lon * delta[0] + c_lon * delta[1];
    let north = -s_lat * c_lon * delta[0] - s_lat * s_lon * delta[1] + c_lat * delta[2];
    (east, north)
}

pub fn ionosphere_screen(
    pierce: ExprRef<Vector3>,
    reference: ExprRef<Vector3>,
    c0: ExprRef<f64>,
    c1: ExprRef<f64>,
    c2: ExprRef<f64>,
) -> ExprRef<f64> {
    Rc::new(Quinary::new(IonosphereScreen, pierce, reference, c0, c1, c2))
}
