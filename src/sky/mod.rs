// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sky models: sources grouped into patches.

mod error;

pub use error::SkyError;

use serde::{Deserialize, Serialize};

use crate::{
    c64,
    constants::DEFAULT_SPEC_INDEX,
    coord::{arcsecs_to_radians, degrees_to_radians, radians_to_arcsecs, radians_to_degrees, RaDec},
    Jones,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
/// At a frequency, four flux densities for each Stokes parameter.
// When serialising/deserialising, ignore Stokes Q U V if they are zero.
pub struct FluxDensity {
    /// The frequency that these flux densities apply to \[Hz\]
    pub freq: f64,

    /// The flux density of Stokes I \[Jy\]
    pub i: f64,

    /// The flux density of Stokes Q \[Jy\]
    #[serde(default)]
    #[serde(skip_serializing_if = "is_zero")]
    pub q: f64,

    /// The flux density of Stokes U \[Jy\]
    #[serde(default)]
    #[serde(skip_serializing_if = "is_zero")]
    pub u: f64,

    /// The flux density of Stokes V \[Jy\]
    #[serde(default)]
    #[serde(skip_serializing_if = "is_zero")]
    pub v: f64,
}

impl FluxDensity {
    /// The brightness matrix in the linear (XX, XY, YX, YY) basis, with X
    /// and Y following the IAU convention.
    pub fn to_brightness(self) -> Jones {
        Jones::from([
            c64::new(self.i + self.q, 0.0),
            c64::new(self.u, self.v),
            c64::new(self.u, -self.v),
            c64::new(self.i - self.q, 0.0),
        ])
    }
}

/// This is only used for serialisation
#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(num: &f64) -> bool {
    num.abs() < f64::EPSILON
}

/// Source shapes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceShape {
    #[default]
    Point,

    Gaussian {
        /// Major axis FWHM \[radians\]
        #[serde(serialize_with = "radians_to_arcsecs")]
        #[serde(deserialize_with = "arcsecs_to_radians")]
        maj: f64,

        /// Minor axis FWHM \[radians\]
        #[serde(serialize_with = "radians_to_arcsecs")]
        #[serde(deserialize_with = "arcsecs_to_radians")]
        min: f64,

        /// Position angle \[radians\]
        #[serde(serialize_with = "radians_to_degrees")]
        #[serde(deserialize_with = "degrees_to_radians")]
        pa: f64,
    },
}

fn default_spec_index() -> f64 {
    DEFAULT_SPEC_INDEX
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,

    #[serde(flatten)]
    pub radec: RaDec,

    #[serde(default)]
    pub shape: SourceShape,

    pub flux: FluxDensity,

    #[serde(default = "default_spec_index")]
    pub spectral_index: f64,
}

/// A group of sources sharing the same direction-dependent effects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub name: String,

    /// If not given, the centroid of the sources is used.
    #[serde(default)]
    pub position: Option<RaDec>,

    pub sources: Vec<Source>,
}

impl Patch {
    pub fn position(&self) -> Option<RaDec> {
        self.position.or_else(|| {
            let radecs: Vec<RaDec> = self.sources.iter().map(|s| s.radec).collect();
            RaDec::centroid(&radecs)
        })
    }
}

/// Where the model gets its sources from.
pub trait SourceDb {
    /// The names of the patches matching a glob pattern, in catalogue order.
    fn patches(&self, pattern: &str) -> Result<Vec<String>, SkyError>;

    fn sources(&self, patch: &str) -> Result<Vec<Source>, SkyError>;

    fn patch_position(&self, patch: &str) -> Result<RaDec, SkyError>;
}

/// An in-memory sky model, read from the `sky` section of a parset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SkyModel {
    #[serde(default)]
    pub patches: Vec<Patch>,
}

impl SkyModel {
    fn patch(&self, name: &str) -> Result<&Patch, SkyError> {
        self.patches
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| SkyError::UnknownPatch(name.to_string()))
    }

    pub fn n_sources(&self) -> usize {
        self.patches.iter().map(|p| p.sources.len()).sum()
    }
}

impl SourceDb for SkyModel {
    fn patches(&self, pattern: &str) -> Result<Vec<String>, SkyError> {
        let p = glob::Pattern::new(pattern).map_err(|err| SkyError::BadPattern {
            pattern: pattern.to_string(),
            err,
        })?;
        Ok(self
            .patches
            .iter()
            .filter(|patch| p.matches(&patch.name))
            .map(|patch| patch.name.clone())
            .collect())
    }

    fn sources(&self, patch: &str) -> Result<Vec<Source>, SkyError> {
        Ok(self.patch(patch)?.sources.clone())
    }

    fn patch_position(&self, patch: &str) -> Result<RaDec, SkyError> {
        self.patch(patch)?
            .position()
            .ok_or_else(|| SkyError::NoPosition(patch.to_string()))
    }
}
