// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{path::PathBuf, rc::Rc};

use clap::Parser;
use log::info;

use super::common::{evaluate_into, Parset, PARSET_HELP};
use crate::{
    model::{MeasurementExpr, MeasurementModel},
    vis::VisBuffer,
    BbsError,
};

#[derive(Parser, Debug, Clone)]
pub(super) struct CorrectArgs {
    #[clap(name = "PARSET", help = PARSET_HELP.as_str(), parse(from_os_str))]
    pub(super) parset: PathBuf,

    /// Path to the visibilities to correct (JSON).
    #[clap(short, long, help_heading = "INPUT DATA")]
    pub(super) data: PathBuf,

    /// Path to the output visibility file (JSON).
    #[clap(short = 'o', long, default_value = "bbs_corrected.json", help_heading = "OUTPUT FILES")]
    pub(super) output: PathBuf,
}

impl CorrectArgs {
    pub(super) fn run(self, dry_run: bool) -> Result<(), BbsError> {
        let run = Parset::read(&self.parset)?.load()?;
        let data = Rc::new(VisBuffer::read_json(&self.data)?);
        let ctx = run.context();
        let mut model = MeasurementModel::inverse(&ctx, Rc::clone(&data), &run.model)?;
        info!(
            "Correcting {} baselines for {} parameters",
            model.size(),
            model.n_parms()
        );

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let mut corrected = VisBuffer::clone(&data);
        evaluate_into(&mut model, &mut corrected);
        let n_flagged = corrected.flags.iter().filter(|&&f| f).count();
        let n_flagged_before = data.flags.iter().filter(|&&f| f).count();
        if n_flagged > n_flagged_before {
            info!(
                "Correcting flagged {} more samples",
                n_flagged - n_flagged_before
            );
        }
        corrected.write_json(&self.output)?;
        info!("Wrote corrected visibilities to {}", self.output.display());
        Ok(())
    }
}
