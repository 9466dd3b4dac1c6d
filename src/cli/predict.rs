// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use super::common::{evaluate_into, Parset, PARSET_HELP};
use crate::{
    model::{MeasurementExpr, MeasurementModel},
    vis::VisBuffer,
    BbsError,
};

#[derive(Parser, Debug, Clone)]
pub(super) struct PredictArgs {
    #[clap(name = "PARSET", help = PARSET_HELP.as_str(), parse(from_os_str))]
    pub(super) parset: PathBuf,

    /// Path to the output visibility file (JSON).
    #[clap(short = 'o', long, default_value = "bbs_predict.json", help_heading = "OUTPUT FILES")]
    pub(super) output: PathBuf,
}

impl PredictArgs {
    pub(super) fn run(self, dry_run: bool) -> Result<(), BbsError> {
        let run = Parset::read(&self.parset)?.load()?;
        let obs = run.observation.observation(run.instrument.n_stations())?;
        let grid = run.observation.grid()?;
        let ctx = run.context();
        let mut model = MeasurementModel::forward(&ctx, &obs, &run.model)?;
        let (nt, nf) = grid.shape();
        info!(
            "Predicting {} baselines over {nt} timesteps and {nf} channels",
            model.size()
        );

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let mut buffer = VisBuffer::new(
            model.baselines().to_vec(),
            obs.basis,
            grid,
            obs.phase_reference,
        );
        buffer.delay_reference = obs.delay_reference;
        evaluate_into(&mut model, &mut buffer);
        buffer.write_json(&self.output)?;
        info!("Wrote predicted visibilities to {}", self.output.display());
        Ok(())
    }
}
