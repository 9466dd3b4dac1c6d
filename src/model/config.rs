// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Which effects a measurement model includes.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    cache::{CachePolicy, DefaultCachePolicy, ExperimentalCachePolicy, NoCachePolicy},
    constants::DEFAULT_CONDITION_NUMBER_THRESHOLD,
    expr::BeamMode,
};

/// The `model` section of a parset. Every effect is disabled unless given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Patch selection. Entries are glob patterns matched against the sky
    /// model, or `@name` to use a named patch visibility buffer. Empty
    /// selects every patch.
    pub sources: Vec<String>,

    // Direction independent.
    pub clock: Option<ClockConfig>,
    pub bandpass: bool,
    pub gain: Option<GainConfig>,
    pub tec: bool,

    // Direction dependent.
    pub directional_gain: Option<GainConfig>,
    pub beam: Option<BeamConfig>,
    pub directional_tec: bool,
    pub faraday_rotation: bool,
    pub ionosphere: bool,

    /// Only used when correcting.
    pub flag_condition_number: Option<ConditionNumberFlagging>,

    pub cache: CacheMode,
}

impl ModelConfig {
    pub fn has_die(&self) -> bool {
        self.clock.is_some() || self.bandpass || self.gain.is_some() || self.tec
    }

    pub fn has_dde(&self) -> bool {
        self.directional_gain.is_some()
            || self.beam.is_some()
            || self.directional_tec
            || self.faraday_rotation
            || self.ionosphere
    }

    /// The names of the enabled effects, in the order they're composed.
    pub fn enabled_effects(&self) -> Vec<&'static str> {
        [
            (self.clock.is_some(), "clock"),
            (self.bandpass, "bandpass"),
            (self.gain.is_some(), "gain"),
            (self.tec, "tec"),
            (self.directional_gain.is_some(), "directional_gain"),
            (self.beam.is_some(), "beam"),
            (self.directional_tec, "directional_tec"),
            (self.faraday_rotation, "faraday_rotation"),
            (self.ionosphere, "ionosphere"),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| name)
        .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GainConfig {
    /// Parameterise the elements as amplitude and phase rather than real and
    /// imaginary parts.
    pub phasors: bool,

    /// Only the diagonal elements.
    pub diagonal: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Separate delays for the two polarisations.
    pub split: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BeamConfig {
    pub mode: BeamMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConditionNumberFlagging {
    pub threshold: f64,
}

impl Default for ConditionNumberFlagging {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONDITION_NUMBER_THRESHOLD,
        }
    }
}

/// Which [`CachePolicy`] to apply to a built model.
#[derive(
    Debug, Display, EnumIter, EnumString, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[strum(serialize = "none")]
    None,

    #[default]
    #[strum(serialize = "default")]
    Default,

    #[strum(serialize = "experimental")]
    Experimental,
}

impl CacheMode {
    pub fn policy(self) -> Box<dyn CachePolicy> {
        match self {
            CacheMode::None => Box::new(NoCachePolicy),
            CacheMode::Default => Box::new(DefaultCachePolicy),
            CacheMode::Experimental => Box::new(ExperimentalCachePolicy),
        }
    }
}
