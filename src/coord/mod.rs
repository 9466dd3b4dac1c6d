// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Coordinate types and the handful of transformations the measurement equation
needs.

These are deliberately simple: sidereal time ignores nutation, and ITRF
directions ignore precession and polar motion.
 */


use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{SECONDS_PER_DAY, TAU};

/// A struct containing a Right Ascension and Declination. All units are in
/// radians, but (de)serialised as degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaDec {
    /// Right ascension \[radians\]
    #[serde(serialize_with = "radians_to_degrees")]
    #[serde(deserialize_with = "degrees_to_radians")]
    pub ra: f64,
    /// Declination \[radians\]
    #[serde(serialize_with = "radians_to_degrees")]
    #[serde(deserialize_with = "degrees_to_radians")]
    pub dec: f64,
}

impl RaDec {
    /// Make a new `RaDec` struct from values in radians.
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Make a new `RaDec` struct from values in degrees.
    pub fn from_degrees(ra: f64, dec: f64) -> Self {
        Self::new(ra.to_radians(), dec.to_radians())
    }

    /// Get the (l,m,n) direction cosines of these coordinates relative to a
    /// phase centre.
    ///
    /// Derived using "Coordinate transformations" on page 388 of Synthesis
    /// Imaging in Radio Astronomy II.
    pub fn to_lmn(&self, phase_centre: &RaDec) -> Lmn {
        let d_ra = self.ra - phase_centre.ra;
        let (s_d_ra, c_d_ra) = d_ra.sin_cos();
        let (s_dec, c_dec) = self.dec.sin_cos();
        let (pc_s_dec, pc_c_dec) = phase_centre.dec.sin_cos();
        Lmn {
            l: c_dec * s_d_ra,
            m: s_dec * pc_c_dec - c_dec * pc_s_dec * c_d_ra,
            n: s_dec * pc_s_dec + c_dec * pc_c_dec * c_d_ra,
        }
    }

    /// The unit vector pointing at these coordinates in an Earth-fixed frame,
    /// given the Greenwich mean sidereal time \[radians\].
    pub fn to_itrf(&self, gmst_rad: f64) -> [f64; 3] {
        let ha = gmst_rad - self.ra;
        let (s_dec, c_dec) = self.dec.sin_cos();
        let (s_ha, c_ha) = ha.sin_cos();
        [c_dec * c_ha, -c_dec * s_ha, s_dec]
    }

    /// The mean position of several coordinates. Positions are averaged as
    /// unit vectors, so this behaves near the poles and across RA = 0.
    pub fn centroid(radecs: &[RaDec]) -> Option<RaDec> {
        if radecs.is_empty() {
            return None;
        }
        let mut sum = [0.0; 3];
        for radec in radecs {
            let (s_ra, c_ra) = radec.ra.sin_cos();
            let (s_dec, c_dec) = radec.dec.sin_cos();
            sum[0] += c_dec * c_ra;
            sum[1] += c_dec * s_ra;
            sum[2] += s_dec;
        }
        let ra = sum[1].atan2(sum[0]).rem_euclid(TAU);
        let dec = sum[2].atan2(sum[0].hypot(sum[1]));
        Some(RaDec { ra, dec })
    }
}

impl std::fmt::Display for RaDec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({}°, {}°)", self.ra.to_degrees(), self.dec.to_degrees())
    }
}

/// The (l,m,n) direction-cosine coordinates of a point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Lmn {
    pub l: f64,
    pub m: f64,
    pub n: f64,
}

impl Lmn {
    pub fn to_array(self) -> [f64; 3] {
        [self.l, self.m, self.n]
    }
}

/// Earth-fixed (ITRF) Cartesian coordinates \[metres\].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Xyz {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Convert this baseline (or position relative to the array reference) to
    /// UVW coordinates given an hour angle and declination of the phase
    /// centre.
    ///
    /// This is Eq. 4.1 of Interferometry and Synthesis in Radio Astronomy,
    /// Third Edition.
    pub fn to_uvw(&self, ha: f64, dec: f64) -> Uvw {
        let (s_ha, c_ha) = ha.sin_cos();
        let (s_dec, c_dec) = dec.sin_cos();
        Uvw {
            u: s_ha * self.x + c_ha * self.y,
            v: -s_dec * c_ha * self.x + s_dec * s_ha * self.y + c_dec * self.z,
            w: c_dec * c_ha * self.x - c_dec * s_ha * self.y + s_dec * self.z,
        }
    }
}

impl std::ops::Sub for Xyz {
    type Output = Xyz;

    fn sub(self, rhs: Self) -> Xyz {
        Xyz {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl std::ops::Add for Xyz {
    type Output = Xyz;

    fn add(self, rhs: Self) -> Xyz {
        Xyz {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

/// (u,v,w) coordinates \[metres\].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Uvw {
    pub u: f64,
    pub v: f64,
    pub w: f64,
}

impl Uvw {
    pub fn to_array(self) -> [f64; 3] {
        [self.u, self.v, self.w]
    }
}

pub(crate) fn radians_to_arcsecs<S: Serializer>(num: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(num.to_degrees() * 3600.0)
}

pub(crate) fn radians_to_degrees<S: Serializer>(num: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(num.to_degrees())
}

pub(crate) fn arcsecs_to_radians<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let num: f64 = Deserialize::deserialize(d)?;
    Ok(num.to_radians() / 3600.0)
}

pub(crate) fn degrees_to_radians<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let num: f64 = Deserialize::deserialize(d)?;
    Ok(num.to_radians())
}

/// Greenwich mean sidereal time \[radians\] of a time given as a Modified
/// Julian Date in seconds (the convention of LOFAR measurement sets).
pub fn gmst(mjd_seconds: f64) -> f64 {
    // Days since J2000.0 (MJD 51544.5).
    let d = mjd_seconds / SECONDS_PER_DAY - 51_544.5;
    let gmst_hours = 18.697_374_558 + 24.065_709_824_419_08 * d;
    (gmst_hours.rem_euclid(24.0) / 24.0) * TAU
}
