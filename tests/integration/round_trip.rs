// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Predict visibilities with known gains, then recover the gains with
//! `calibrate` and remove them with `correct`.

use std::path::Path;

use approx::assert_abs_diff_eq;
use tempfile::TempDir;

use lofar_bbs::{
    vis::{Baseline, VisBuffer},
    Jones,
};

use crate::{bbs, write_parset, IDENTITY_GAINS};

const TRUE_GAINS: &str = r#"
[parms.values]
"Gain:0:0:Real:CS002" = { coeffs = [2.0] }
"Gain:0:0:Imag:CS002" = { coeffs = [0.5] }
"Gain:1:1:Real:CS003" = { coeffs = [0.8] }
"#;

fn predict(dir: &Path) -> std::path::PathBuf {
    let parset = write_parset(dir, "truth.toml", &format!("{TRUE_GAINS}{IDENTITY_GAINS}"));
    let vis = dir.join("vis.json");
    #[rustfmt::skip]
    let cmd = bbs()
        .args([
            "predict",
            &format!("{}", parset.display()),
            "-o", &format!("{}", vis.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "predict failed: {}", cmd.err().unwrap());
    vis
}

#[test]
fn test_calibrate_recovers_gains() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let vis = predict(tmp_dir.path());
    let parset = write_parset(
        tmp_dir.path(),
        "calibrate.toml",
        &format!("{IDENTITY_GAINS}\n[solve]\nsolvables = [\"Gain:*:CS00[23]\"]\n"),
    );
    let solved = tmp_dir.path().join("solved.toml");

    #[rustfmt::skip]
    let cmd = bbs()
        .args([
            "calibrate",
            &format!("{}", parset.display()),
            "--data", &format!("{}", vis.display()),
            "--output", &format!("{}", solved.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "calibrate failed: {}", cmd.err().unwrap());

    let solved: toml::Value = toml::from_str(&std::fs::read_to_string(solved).unwrap()).unwrap();
    let coeff = |name: &str| solved["values"][name]["coeffs"][0].as_float().unwrap();
    assert_abs_diff_eq!(coeff("Gain:0:0:Real:CS002"), 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(coeff("Gain:0:0:Imag:CS002"), 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(coeff("Gain:1:1:Real:CS003"), 0.8, epsilon = 1e-6);
    assert_abs_diff_eq!(coeff("Gain:1:1:Imag:CS003"), 0.0, epsilon = 1e-6);
    // CS001 wasn't solved for.
    assert_abs_diff_eq!(coeff("Gain:0:0:Real:CS001"), 1.0);
}

#[test]
fn test_correct_removes_gains() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let vis = predict(tmp_dir.path());
    let parset = write_parset(
        tmp_dir.path(),
        "correct.toml",
        &format!("{TRUE_GAINS}{IDENTITY_GAINS}"),
    );
    let corrected = tmp_dir.path().join("corrected.json");

    #[rustfmt::skip]
    let cmd = bbs()
        .args([
            "correct",
            &format!("{}", parset.display()),
            "-d", &format!("{}", vis.display()),
            "-o", &format!("{}", corrected.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "correct failed: {}", cmd.err().unwrap());

    let predicted = VisBuffer::read_json(&vis).unwrap();
    let corrected = VisBuffer::read_json(&corrected).unwrap();
    assert_eq!(corrected.baselines, predicted.baselines);
    // Baseline CS001-CS002 was scaled by CS002's gain.
    assert!((predicted.samples[(0, 0, 0)] - Jones::identity() * 20.0).norm_sqr() > 1.0);
    for v in corrected.samples.iter() {
        assert!((*v - Jones::identity() * 20.0).norm_sqr() < 1e-18, "{v:?}");
    }
    assert!(corrected.flags.iter().all(|&f| !f));
}

#[test]
fn test_correct_handles_reversed_baselines() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let vis = predict(tmp_dir.path());

    // Store baseline CS001-CS002 the other way around: V_21 = V_12^H.
    let mut buffer = VisBuffer::read_json(&vis).unwrap();
    assert_eq!(buffer.baselines[0], Baseline(0, 1));
    buffer.baselines[0] = Baseline(1, 0);
    buffer
        .samples
        .slice_mut(ndarray::s![0, .., ..])
        .mapv_inplace(|j| j.h());
    let reversed = tmp_dir.path().join("reversed.json");
    buffer.write_json(&reversed).unwrap();

    let parset = write_parset(
        tmp_dir.path(),
        "correct.toml",
        &format!("{TRUE_GAINS}{IDENTITY_GAINS}"),
    );
    let corrected = tmp_dir.path().join("corrected.json");
    #[rustfmt::skip]
    let cmd = bbs()
        .args([
            "correct",
            &format!("{}", parset.display()),
            "-d", &format!("{}", reversed.display()),
            "-o", &format!("{}", corrected.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "correct failed: {}", cmd.err().unwrap());

    let corrected = VisBuffer::read_json(&corrected).unwrap();
    assert_eq!(corrected.baselines[0], Baseline(0, 1));
    for v in corrected.samples.iter() {
        assert!((*v - Jones::identity() * 20.0).norm_sqr() < 1e-18, "{v:?}");
    }
}
