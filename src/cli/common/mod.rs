// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common code for command-line interfaces. Every `bbs` subcommand reads a
//! parset, so reading and making sense of it lives here.

#[cfg(test)]
mod tests;

use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::BbsError;
use crate::{
    coord::RaDec,
    expr::{Axis, Grid},
    instrument::Instrument,
    model::{MeasurementExpr, ModelConfig, ModelContext, Observation},
    parms::{ParmStore, ParmStoreRef, ParmsConfig},
    sky::SkyModel,
    solver::SolveConfig,
    vis::{Baseline, CorrelationBasis, VisBuffer},
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref PARSET_HELP: String =
        format!("Path to the parset describing the observation, instrument, sky, parameters and model. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse parset {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(BbsError::Parset(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(BbsError::Parset(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(BbsError::Parset(format!(
                    "Parset '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// Everything a run is configured with. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct Parset {
    #[serde(default)]
    pub(super) observation: ObservationConfig,

    pub(super) instrument: Instrument,

    #[serde(default)]
    pub(super) sky: SkyModel,

    #[serde(default)]
    pub(super) parms: ParmsConfig,

    #[serde(default)]
    pub(super) model: ModelConfig,

    #[serde(default)]
    pub(super) solve: SolveConfig,

    /// Visibility files of precomputed patches, selected in `model.sources`
    /// with `@name`.
    #[serde(default)]
    pub(super) patch_buffers: IndexMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct ObservationConfig {
    /// Pairs of station indices. If empty, every cross-correlation of the
    /// instrument is used.
    pub(super) baselines: Vec<Baseline>,

    pub(super) basis: CorrelationBasis,

    pub(super) phase_centre: Option<RaDec>,

    /// Where the station beams point. Defaults to the phase centre.
    pub(super) delay_centre: Option<RaDec>,

    pub(super) time: Option<AxisConfig>,
    pub(super) freq: Option<AxisConfig>,
}

/// `n` contiguous cells of equal width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct AxisConfig {
    /// The centre of the first cell.
    pub(super) start: f64,
    pub(super) width: f64,
    pub(super) n: usize,
}

impl ObservationConfig {
    pub(super) fn baselines(&self, n_stations: usize) -> Vec<Baseline> {
        if self.baselines.is_empty() {
            (0..n_stations)
                .tuple_combinations()
                .map(|(p, q)| Baseline(p, q))
                .collect()
        } else {
            self.baselines.clone()
        }
    }

    pub(super) fn observation(&self, n_stations: usize) -> Result<Observation, BbsError> {
        let phase_centre = self.phase_centre.ok_or_else(|| {
            BbsError::Parset("The observation has no phase_centre".to_string())
        })?;
        let mut obs = Observation::new(self.baselines(n_stations), self.basis, phase_centre);
        if let Some(delay_centre) = self.delay_centre {
            obs.delay_reference = delay_centre;
        }
        Ok(obs)
    }

    pub(super) fn grid(&self) -> Result<Grid, BbsError> {
        let axis = |a: Option<AxisConfig>, what: &str| match a {
            Some(AxisConfig { n: 0, .. }) => Err(BbsError::Parset(format!(
                "The observation's {what} axis has no cells"
            ))),
            Some(AxisConfig { start, width, n }) => Ok(Axis::regular(start, width, n)),
            None => Err(BbsError::Parset(format!(
                "The observation has no {what} axis"
            ))),
        };
        Ok(Grid::new(axis(self.time, "time")?, axis(self.freq, "freq")?))
    }
}

impl Parset {
    pub(super) fn read(path: &Path) -> Result<Parset, BbsError> {
        let parset: Parset = unpack_arg_file!(path);
        Ok(parset)
    }

    /// Read everything the parset refers to.
    pub(super) fn load(self) -> Result<Run, BbsError> {
        let store = ParmStore::from_config(&self.parms)?;
        let patch_buffers = self
            .patch_buffers
            .iter()
            .map(|(name, path)| Ok((name.clone(), Rc::new(VisBuffer::read_json(path)?))))
            .collect::<Result<Vec<_>, BbsError>>()?;

        let run = Run {
            observation: self.observation,
            instrument: self.instrument,
            sky: self.sky,
            store: store.into_shared(),
            patch_buffers,
            model: self.model,
            solve: self.solve,
        };
        run.print_info();
        Ok(run)
    }
}

/// A parset with everything it refers to read in.
pub(super) struct Run {
    pub(super) observation: ObservationConfig,
    pub(super) instrument: Instrument,
    pub(super) sky: SkyModel,
    pub(super) store: ParmStoreRef,
    pub(super) patch_buffers: Vec<(String, Rc<VisBuffer>)>,
    pub(super) model: ModelConfig,
    pub(super) solve: SolveConfig,
}

impl Run {
    pub(super) fn context(&self) -> ModelContext<'_> {
        self.patch_buffers.iter().fold(
            ModelContext::new(&self.instrument, &self.sky, Rc::clone(&self.store)),
            |ctx, (name, buffer)| ctx.with_patch_buffer(name, Rc::clone(buffer)),
        )
    }

    fn print_info(&self) {
        info!(
            "Instrument '{}': {} stations",
            self.instrument.name,
            self.instrument.n_stations()
        );
        info!(
            "Sky model: {} patches, {} sources",
            self.sky.patches.len(),
            self.sky.n_sources()
        );
        for (name, buffer) in &self.patch_buffers {
            info!(
                "Patch buffer '@{name}': {} baselines",
                buffer.n_baselines()
            );
        }
        info!("Parameters: {} given", self.store.borrow().len());
    }
}

/// Evaluate every baseline of `model` into the matching row of `buffer`. A
/// cell flagged by the model flags all its correlations; flags already in
/// the buffer are kept.
pub(super) fn evaluate_into<M: MeasurementExpr + ?Sized>(model: &mut M, buffer: &mut VisBuffer) {
    model.set_eval_grid(buffer.grid.clone());
    for i in 0..model.size() {
        let m = model.evaluate(i);
        buffer.samples.slice_mut(s![i, .., ..]).assign(&m.value);
        if let Some(flags) = m.flags {
            for ((t, f), &flagged) in flags.indexed_iter() {
                if flagged {
                    buffer.flags.slice_mut(s![i, t, f, ..]).fill(true);
                }
            }
        }
    }
}
