// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod no_stderr;
mod round_trip;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};
use indoc::formatdoc;

fn bbs() -> Command {
    Command::cargo_bin("bbs").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// Write a parset for a 3-station array looking at a 20 Jy point source at
/// the phase centre, with diagonal gains. `parms` is appended verbatim.
fn write_parset(dir: &Path, name: &str, parms: &str) -> PathBuf {
    let parset = formatdoc! {r#"
        [observation]
        phase_centre = {{ ra = 123.4, dec = 48.2 }}
        time = {{ start = 4.9e9, width = 10.0, n = 2 }}
        freq = {{ start = 150e6, width = 1e6, n = 3 }}

        [instrument]
        name = "LOFAR"
        position = {{ x = 3826577.1, y = 461022.9, z = 5064892.8 }}

        [[instrument.stations]]
        name = "CS001"
        position = {{ x = 3826577.1, y = 461022.9, z = 5064892.8 }}

        [[instrument.stations]]
        name = "CS002"
        position = {{ x = 3826677.1, y = 460972.9, z = 5064892.8 }}

        [[instrument.stations]]
        name = "CS003"
        position = {{ x = 3826377.1, y = 461322.9, z = 5064892.8 }}

        [[sky.patches]]
        name = "3C196"

        [[sky.patches.sources]]
        name = "3C196"
        ra = 123.4
        dec = 48.2
        spectral_index = 0.0
        flux = {{ freq = 150e6, i = 20.0 }}

        [model]
        gain = {{ diagonal = true }}

        {parms}
    "#};
    let path = dir.join(name);
    std::fs::write(&path, parset).unwrap();
    path
}

/// Defaults making every gain the identity.
const IDENTITY_GAINS: &str = r#"
[[parms.defaults]]
pattern = "Gain:*:Real:*"
coeffs = [1.0]

[[parms.defaults]]
pattern = "Gain:*:Imag:*"
coeffs = [0.0]
"#;
