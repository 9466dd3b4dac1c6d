// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::Write;

use approx::assert_abs_diff_eq;
use indoc::indoc;
use tempfile::Builder;

use super::*;
use crate::{c64, model::MeasurementModel, Jones};

const PARSET: &str = indoc! {r#"
    [observation]
    basis = "circular"
    phase_centre = { ra = 123.4, dec = 48.2 }
    time = { start = 4.9e9, width = 10.0, n = 2 }
    freq = { start = 150e6, width = 1e6, n = 3 }

    [instrument]
    name = "LOFAR"
    position = { x = 3826577.1, y = 461022.9, z = 5064892.8 }

    [[instrument.stations]]
    name = "CS001"
    position = { x = 3826577.1, y = 461022.9, z = 5064892.8 }

    [[instrument.stations]]
    name = "CS002"
    position = { x = 3826677.1, y = 460972.9, z = 5064892.8 }

    [[instrument.stations]]
    name = "CS003"
    position = { x = 3826377.1, y = 461322.9, z = 5064892.8 }

    [[sky.patches]]
    name = "3C196"

    [[sky.patches.sources]]
    name = "3C196"
    ra = 123.4
    dec = 48.2
    flux = { freq = 150e6, i = 20.0 }

    [parms.values]
    "Gain:0:0:Real:CS001" = { coeffs = [1.5] }

    [[parms.defaults]]
    pattern = "Gain:*:Real:*"
    coeffs = [1.0]

    [[parms.defaults]]
    pattern = "Gain:*:Imag:*"
    coeffs = [0.0]

    [model]
    sources = ["3C*"]
    gain = { diagonal = true }

    [solve]
    solvables = ["Gain:*"]
"#};

fn parset() -> Parset {
    toml::from_str(PARSET).unwrap()
}

#[test]
fn test_parse_parset() {
    let parset = parset();
    assert_eq!(parset.instrument.n_stations(), 3);
    assert_eq!(parset.sky.n_sources(), 1);
    assert_eq!(parset.parms.values.len(), 1);
    assert_eq!(parset.parms.defaults.len(), 2);
    assert_eq!(parset.model.sources, vec!["3C*"]);
    assert_eq!(parset.solve.solvables, vec!["Gain:*"]);
    assert!(parset.patch_buffers.is_empty());

    let obs = parset.observation.observation(3).unwrap();
    assert_eq!(
        obs.baselines,
        vec![Baseline(0, 1), Baseline(0, 2), Baseline(1, 2)]
    );
    assert_eq!(obs.basis, CorrelationBasis::Circular);
    assert_abs_diff_eq!(obs.phase_reference.ra, 123.4_f64.to_radians());
    assert_eq!(obs.delay_reference, obs.phase_reference);

    let grid = parset.observation.grid().unwrap();
    assert_eq!(grid.shape(), (2, 3));
    assert_abs_diff_eq!(grid.freq.center(2), 152e6);
}

#[test]
fn test_unknown_sections_are_rejected() {
    let text = format!("{PARSET}\n[solver]\nmax_iterations = 3\n");
    assert!(toml::from_str::<Parset>(&text).is_err());
}

#[test]
fn test_observation_needs_phase_centre_and_grid() {
    let config = ObservationConfig {
        baselines: vec![Baseline(1, 0)],
        ..Default::default()
    };
    assert!(matches!(config.observation(2), Err(BbsError::Parset(_))));
    assert!(matches!(config.grid(), Err(BbsError::Parset(_))));

    let config = ObservationConfig {
        phase_centre: Some(RaDec::from_degrees(10.0, 20.0)),
        delay_centre: Some(RaDec::from_degrees(11.0, 20.0)),
        time: Some(AxisConfig {
            start: 0.0,
            width: 1.0,
            n: 0,
        }),
        freq: Some(AxisConfig {
            start: 1e8,
            width: 1e6,
            n: 1,
        }),
        ..config
    };
    let obs = config.observation(2).unwrap();
    // Baselines are normalised.
    assert_eq!(obs.baselines, vec![Baseline(0, 1)]);
    assert_ne!(obs.delay_reference, obs.phase_reference);
    assert!(matches!(config.grid(), Err(BbsError::Parset(_))));
}

#[test]
fn test_read_parset_files() {
    let mut toml_file = Builder::new().suffix(".toml").tempfile().unwrap();
    toml_file.write_all(PARSET.as_bytes()).unwrap();
    let from_toml = Parset::read(toml_file.path()).unwrap();
    assert_eq!(from_toml, parset());

    let mut json_file = Builder::new().suffix(".json").tempfile().unwrap();
    json_file
        .write_all(serde_json::to_string(&from_toml).unwrap().as_bytes())
        .unwrap();
    let from_json = Parset::read(json_file.path()).unwrap();
    assert_eq!(from_json.instrument, from_toml.instrument);
    assert_eq!(from_json.model, from_toml.model);

    let mut bad = Builder::new().suffix(".yaml").tempfile().unwrap();
    bad.write_all(PARSET.as_bytes()).unwrap();
    assert!(matches!(Parset::read(bad.path()), Err(BbsError::Parset(_))));

    let mut broken = Builder::new().suffix(".toml").tempfile().unwrap();
    broken.write_all(b"[instrument\n").unwrap();
    assert!(matches!(
        Parset::read(broken.path()),
        Err(BbsError::Parset(_))
    ));
}

#[test]
fn test_load_and_predict() {
    let run = parset().load().unwrap();
    assert_eq!(run.store.borrow().len(), 1);
    let obs = run.observation.observation(3).unwrap();
    let grid = run.observation.grid().unwrap();
    let ctx = run.context();
    let mut model = MeasurementModel::forward(&ctx, &obs, &run.model).unwrap();
    // The defaults were instantiated for every station.
    assert_eq!(run.store.borrow().len(), 12);

    let mut buffer = VisBuffer::new(obs.baselines.clone(), obs.basis, grid, obs.phase_reference);
    evaluate_into(&mut model, &mut buffer);
    // Gains apply in the model's basis; an unpolarised source is diagonal in
    // either basis.
    let v = buffer.samples[(0, 0, 0)];
    let expected = Jones::diag(c64::new(30.0, 0.0), c64::new(20.0, 0.0));
    assert_abs_diff_eq!(v, expected, epsilon = 1e-9);
    assert!(buffer.flags.iter().all(|&f| !f));
}

#[test]
fn test_patch_buffers_are_loaded_and_flag_predictions() {
    let parset = parset();
    let obs = parset.observation.observation(3).unwrap();
    let grid = parset.observation.grid().unwrap();
    let mut patch = VisBuffer::new(obs.baselines.clone(), obs.basis, grid.clone(), obs.phase_reference);
    patch.samples.fill(Jones::identity());
    patch.flags[(1, 0, 2, 3)] = true;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patch.json");
    patch.write_json(&path).unwrap();

    let mut parset = parset;
    parset.patch_buffers.insert("cal".to_string(), path);
    parset.model = ModelConfig {
        sources: vec!["@cal".to_string()],
        ..Default::default()
    };
    let run = parset.load().unwrap();
    assert_eq!(run.patch_buffers.len(), 1);
    let ctx = run.context();
    let mut model = MeasurementModel::forward(&ctx, &obs, &run.model).unwrap();

    let mut buffer = VisBuffer::new(obs.baselines.clone(), obs.basis, grid, obs.phase_reference);
    evaluate_into(&mut model, &mut buffer);
    assert!(buffer.samples.iter().all(|&v| v == Jones::identity()));
    assert!(buffer.flags.slice(s![1, 0, 2, ..]).iter().all(|&f| f));
    assert_eq!(buffer.flags.iter().filter(|&&f| f).count(), 4);
}

#[test]
fn test_correcting_keeps_per_correlation_flags() {
    let parset = parset();
    let obs = parset.observation.observation(3).unwrap();
    let grid = parset.observation.grid().unwrap();
    let mut data = VisBuffer::new(obs.baselines.clone(), obs.basis, grid, obs.phase_reference);
    data.samples.fill(Jones::identity() * 5.0);
    // Only the first correlation of one cell.
    data.flags[(2, 1, 0, 0)] = true;
    let data = Rc::new(data);

    let mut parset = parset;
    parset.model = ModelConfig::default();
    let run = parset.load().unwrap();
    let ctx = run.context();
    let mut model = MeasurementModel::inverse(&ctx, Rc::clone(&data), &run.model).unwrap();

    let mut corrected = VisBuffer::clone(&data);
    evaluate_into(&mut model, &mut corrected);
    assert_eq!(corrected.samples, data.samples);
    assert_eq!(corrected.flags, data.flags);
    assert_eq!(corrected.flags.iter().filter(|&&f| f).count(), 1);
}
