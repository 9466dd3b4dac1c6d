// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line interface code. Each `bbs` subcommand is in its own module.
//!
//! Only 3 things should be public in this module: `Bbs`, `Bbs::run`, and
//! `BbsError`.

#[macro_use]
mod common;
mod calibrate;
mod correct;
mod error;
mod predict;

pub use error::BbsError;

use clap::{AppSettings, Args, Parser, Subcommand};
use log::info;

#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    about = r#"Predict, correct and calibrate LOFAR visibilities with measurement-equation expressions"#
)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_subcommands = true)]
#[clap(propagate_version = true)]
#[clap(infer_long_args = true)]
pub struct Bbs {
    #[clap(flatten)]
    global_opts: GlobalArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    #[clap(global = true)]
    verbosity: u8,

    /// Only verify that the parset was correctly ingested and the model can
    /// be built, and print out high-level information.
    #[clap(long)]
    #[clap(global = true)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
#[clap(arg_required_else_help = true)]
enum Command {
    #[clap(alias = "simulate")]
    #[clap(about = "Predict visibilities of the selected sky-model patches.")]
    Predict(predict::PredictArgs),

    #[clap(alias = "apply")]
    #[clap(about = "Correct visibilities for the modelled instrumental and propagation effects.")]
    Correct(correct::CorrectArgs),

    #[clap(alias = "solve")]
    #[clap(about = "Solve for parameter values that make the model reproduce observed visibilities.")]
    Calibrate(calibrate::CalibrateArgs),
}

impl Bbs {
    pub fn run(self) -> Result<(), BbsError> {
        // Set up logging.
        let GlobalArgs { verbosity, dry_run } = self.global_opts;
        setup_logging(verbosity).expect("Failed to initialise logging.");

        let sub_command = match &self.command {
            Command::Predict(_) => "predict",
            Command::Correct(_) => "correct",
            Command::Calibrate(_) => "calibrate",
        };
        info!("bbs {} {}", sub_command, env!("CARGO_PKG_VERSION"));

        match self.command {
            Command::Predict(args) => args.run(dry_run)?,
            Command::Correct(args) => args.run(dry_run)?,
            Command::Calibrate(args) => args.run(dry_run)?,
        }

        info!("bbs {} complete.", sub_command);
        Ok(())
    }
}

/// Activate a logger. All log messages are put onto `stdout`. `env_logger`
/// automatically only uses colours and fancy symbols if we're on a tty (e.g. a
/// terminal); piped output will be formatted sensibly. Source code lines are
/// displayed in log messages when verbosity >= 3.
fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.try_init()?;

    Ok(())
}
