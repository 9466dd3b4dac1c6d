// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use super::common::{Parset, PARSET_HELP};
use crate::{
    model::{MeasurementModel, Observation},
    solver::Solver,
    vis::VisBuffer,
    BbsError,
};

#[derive(Parser, Debug, Clone)]
pub(super) struct CalibrateArgs {
    #[clap(name = "PARSET", help = PARSET_HELP.as_str(), parse(from_os_str))]
    pub(super) parset: PathBuf,

    /// Path to the observed visibilities (JSON).
    #[clap(short, long, help_heading = "INPUT DATA")]
    pub(super) data: PathBuf,

    /// Path to write the solved parameter values to (TOML). They can be used
    /// as the `parms` section of another parset.
    #[clap(short = 'o', long, default_value = "bbs_parms.toml", help_heading = "OUTPUT FILES")]
    pub(super) output: PathBuf,

    /// Glob patterns of the parameters to solve for. Overrides
    /// `solve.solvables` in the parset.
    #[clap(short, long, multiple_values(true), help_heading = "CALIBRATION")]
    pub(super) solvables: Option<Vec<String>>,

    /// The maximum number of iterations. Overrides `solve.max_iterations` in
    /// the parset.
    #[clap(long, help_heading = "CALIBRATION")]
    pub(super) max_iterations: Option<usize>,
}

impl CalibrateArgs {
    pub(super) fn run(self, dry_run: bool) -> Result<(), BbsError> {
        let mut run = Parset::read(&self.parset)?.load()?;
        if let Some(solvables) = self.solvables {
            run.solve.solvables = solvables;
        }
        if let Some(max_iterations) = self.max_iterations {
            run.solve.max_iterations = max_iterations;
        }
        if run.solve.solvables.is_empty() {
            return Err(BbsError::Parset(
                "No solvable parameters were given; use solve.solvables or --solvables"
                    .to_string(),
            ));
        }

        let data = VisBuffer::read_json(&self.data)?;
        let obs = Observation::from_buffer(&data);
        let ctx = run.context();
        let mut model = MeasurementModel::forward(&ctx, &obs, &run.model)?;
        let solvables = model.set_solvables_by_pattern(&run.solve.solvables)?;
        info!("{} solvable parameters", solvables.len());

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let result = Solver::new(run.solve.clone()).solve(&mut model, &data, &run.store)?;
        if !result.converged {
            warn!(
                "Calibration didn't converge; writing the parameters of the last iteration anyway"
            );
        }
        info!(
            "Final chi^2 {:.6e} over {} equations",
            result.chi_sqr, result.num_equations
        );

        let toml_str = toml::to_string(&run.store.borrow().to_config())?;
        std::fs::write(&self.output, toml_str)?;
        info!("Wrote parameters to {}", self.output.display());
        Ok(())
    }
}
