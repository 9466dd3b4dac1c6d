// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests to ensure there is no stderr output for successful commands, and
//! that failures are reported on stderr.

use tempfile::TempDir;

use crate::{bbs, get_cmd_output, write_parset, IDENTITY_GAINS};

#[test]
fn test_predict_no_stderr() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let parset = write_parset(tmp_dir.path(), "parset.toml", IDENTITY_GAINS);
    let output = tmp_dir.path().join("vis.json");

    #[rustfmt::skip]
    let cmd = bbs()
        .args([
            "predict",
            &format!("{}", parset.display()),
            "--output", &format!("{}", output.display()),
        ])
        .ok();
    assert!(
        cmd.is_ok(),
        "predict failed on simple test data: {}",
        cmd.err().unwrap()
    );
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("bbs predict"));
    assert!(output.exists());
}

#[test]
fn test_dry_run_writes_nothing() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let parset = write_parset(tmp_dir.path(), "parset.toml", IDENTITY_GAINS);
    let output = tmp_dir.path().join("vis.json");

    #[rustfmt::skip]
    let cmd = bbs()
        .args([
            "predict",
            &format!("{}", parset.display()),
            "--output", &format!("{}", output.display()),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "{}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run"));
    assert!(!output.exists());
}

#[test]
fn test_missing_parameters_are_an_error() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let parset = write_parset(tmp_dir.path(), "parset.toml", "");

    let cmd = bbs()
        .args(["predict", &format!("{}", parset.display())])
        .current_dir(tmp_dir.path())
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("Gain:0:0:Real:CS001"), "{stderr}");
}

#[test]
fn test_unrecognised_parset_extension() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let parset = write_parset(tmp_dir.path(), "parset.cfg", IDENTITY_GAINS);

    let cmd = bbs()
        .args(["predict", &format!("{}", parset.display())])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("recognised file extension"), "{stderr}");
}
