// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use indoc::indoc;

use super::*;
use crate::{
    coord::{RaDec, Xyz},
    expr::{Axis, Grid},
    instrument::{Instrument, Station},
    model::{GainConfig, MeasurementModel, ModelConfig, ModelContext, Observation},
    parms::{Parm, ParmStore, ParmValue},
    sky::SkyModel,
    vis::{Baseline, CorrelationBasis},
};

fn instrument() -> Instrument {
    let centre = Xyz::new(3826577.1, 461022.9, 5064892.8);
    let stations = ["CS001", "CS002", "CS003", "CS004"]
        .iter()
        .enumerate()
        .map(|(i, name)| Station {
            name: name.to_string(),
            position: centre + Xyz::new(70.0 * i as f64, -40.0 * i as f64, 15.0),
            elements: vec![],
        })
        .collect();
    Instrument {
        name: "LOFAR".to_string(),
        position: centre,
        stations,
    }
}

fn sky() -> SkyModel {
    toml::from_str(indoc! {r#"
        [[patches]]
        name = "3C196"

        [[patches.sources]]
        name = "3C196"
        ra = 123.4
        dec = 48.2
        flux = { freq = 150e6, i = 20.0 }
    "#})
    .unwrap()
}

const TRUE_GAINS: [[f64; 4]; 4] = [
    [1.0, 0.0, 1.0, 0.0],
    [0.9, 0.2, 1.1, -0.1],
    [1.2, -0.3, 0.8, 0.25],
    [1.05, 0.1, 0.95, 0.05],
];

fn store(gains: &[[f64; 4]]) -> ParmStoreRef {
    let mut store = ParmStore::new();
    for (st, g) in gains.iter().enumerate() {
        for (element, v) in ["0:0:Real", "0:0:Imag", "1:1:Real", "1:1:Imag"]
            .iter()
            .zip(g)
        {
            let name = format!("Gain:{element}:CS00{}", st + 1);
            store.insert(Parm::new(&name, ParmValue::constant(*v)).unwrap());
        }
    }
    store.into_shared()
}

fn grid() -> Grid {
    Grid::new(Axis::regular(4.9e9, 10.0, 3), Axis::regular(140e6, 2e6, 4))
}

fn observation() -> Observation {
    let baselines = (0..4)
        .flat_map(|p| (p + 1..4).map(move |q| Baseline(p, q)))
        .collect();
    Observation::new(baselines, CorrelationBasis::Linear, RaDec::from_degrees(123.4, 48.2))
}

fn config() -> ModelConfig {
    ModelConfig {
        gain: Some(GainConfig {
            phasors: false,
            diagonal: true,
        }),
        ..Default::default()
    }
}

/// Visibilities predicted with the true gains.
fn observed(instrument: &Instrument, sky: &SkyModel) -> VisBuffer {
    let obs = observation();
    let ctx = ModelContext::new(instrument, sky, store(&TRUE_GAINS));
    let mut model = MeasurementModel::forward(&ctx, &obs, &config()).unwrap();
    model.set_eval_grid(grid());
    let mut buffer = VisBuffer::new(obs.baselines.clone(), obs.basis, grid(), obs.phase_reference);
    for i in 0..model.size() {
        let m = model.evaluate(i);
        buffer
            .samples
            .slice_mut(ndarray::s![i, .., ..])
            .assign(&m.value);
    }
    buffer
}

#[test]
fn test_recovers_gains() {
    let (instrument, sky) = (instrument(), sky());
    let observed = observed(&instrument, &sky);

    // Start away from the truth; CS001 stays fixed as the phase reference.
    let mut start = TRUE_GAINS;
    for g in start.iter_mut().skip(1) {
        g[0] += 0.1;
        g[1] -= 0.05;
        g[2] -= 0.1;
        g[3] += 0.05;
    }
    let store = store(&start);
    let ctx = ModelContext::new(&instrument, &sky, store.clone());
    let mut model = MeasurementModel::forward(&ctx, &observation(), &config()).unwrap();
    let solvables = model
        .set_solvables_by_pattern(&["Gain:*:CS00[234]".to_string()])
        .unwrap();
    assert_eq!(solvables.len(), 12);

    let solver = Solver::new(SolveConfig {
        max_iterations: 50,
        ..Default::default()
    });
    let result = solver.solve(&mut model, &observed, &store).unwrap();
    assert!(result.converged, "{result:?}");
    assert!(result.num_iterations > 1);
    // 6 baselines, 12 cells, 4 correlations, real and imaginary parts.
    assert_eq!(result.num_equations, 6 * 12 * 8);

    let store = store.borrow();
    for (st, g) in TRUE_GAINS.iter().enumerate() {
        for (element, v) in ["0:0:Real", "0:0:Imag", "1:1:Real", "1:1:Imag"]
            .iter()
            .zip(g)
        {
            let id = store.find(&format!("Gain:{element}:CS00{}", st + 1)).unwrap();
            assert_abs_diff_eq!(store.get(id).coeffs()[0], *v, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_flagged_data_is_ignored() {
    let (instrument, sky) = (instrument(), sky());
    let mut observed = observed(&instrument, &sky);
    // Garbage under flags must not move the solution.
    observed.samples[(0, 1, 2)] = crate::Jones::identity() * 1e6;
    observed.flags.slice_mut(ndarray::s![0, 1, 2, ..]).fill(true);

    let store = store(&TRUE_GAINS);
    let ctx = ModelContext::new(&instrument, &sky, store.clone());
    let mut model = MeasurementModel::forward(&ctx, &observation(), &config()).unwrap();
    model
        .set_solvables_by_pattern(&["Gain:0:0:*:CS002".to_string()])
        .unwrap();
    let result = Solver::new(SolveConfig::default())
        .solve(&mut model, &observed, &store)
        .unwrap();
    assert!(result.converged);
    assert_eq!(result.num_equations, (6 * 12 - 1) * 8);
    assert_abs_diff_eq!(result.chi_sqr, 0.0, epsilon = 1e-12);

    let store = store.borrow();
    let id = store.find("Gain:0:0:Real:CS002").unwrap();
    assert_abs_diff_eq!(store.get(id).coeffs()[0], 0.9, epsilon = 1e-9);
}

#[test]
fn test_damping_still_converges() {
    let (instrument, sky) = (instrument(), sky());
    let observed = observed(&instrument, &sky);
    let mut start = TRUE_GAINS;
    start[2][0] = 1.0;
    let store = store(&start);
    let ctx = ModelContext::new(&instrument, &sky, store.clone());
    let mut model = MeasurementModel::forward(&ctx, &observation(), &config()).unwrap();
    model
        .set_solvables_by_pattern(&["Gain:0:0:Real:CS003".to_string()])
        .unwrap();
    let result = Solver::new(SolveConfig {
        lm_factor: 0.5,
        max_iterations: 100,
        ..Default::default()
    })
    .solve(&mut model, &observed, &store)
    .unwrap();
    assert!(result.converged);

    let store = store.borrow();
    let id = store.find("Gain:0:0:Real:CS003").unwrap();
    assert_abs_diff_eq!(store.get(id).coeffs()[0], 1.2, epsilon = 1e-6);
}

#[test]
fn test_no_solvables() {
    let (instrument, sky) = (instrument(), sky());
    let observed = observed(&instrument, &sky);
    let store = store(&TRUE_GAINS);
    let ctx = ModelContext::new(&instrument, &sky, store.clone());
    let mut model = MeasurementModel::forward(&ctx, &observation(), &config()).unwrap();
    let result = Solver::new(SolveConfig::default()).solve(&mut model, &observed, &store);
    assert!(matches!(result, Err(SolveError::NoSolvables)));
}

#[test]
fn test_missing_baseline() {
    let (instrument, sky) = (instrument(), sky());
    let full = observed(&instrument, &sky);
    let mut observed = VisBuffer::new(
        full.baselines[1..].to_vec(),
        full.basis,
        full.grid.clone(),
        full.phase_reference,
    );
    observed.samples.assign(&full.samples.slice(ndarray::s![1.., .., ..]));

    let store = store(&TRUE_GAINS);
    let ctx = ModelContext::new(&instrument, &sky, store.clone());
    let mut model = MeasurementModel::forward(&ctx, &observation(), &config()).unwrap();
    model
        .set_solvables_by_pattern(&["Gain:*:CS002".to_string()])
        .unwrap();
    let result = Solver::new(SolveConfig::default()).solve(&mut model, &observed, &store);
    assert!(matches!(
        result,
        Err(SolveError::MissingBaseline(Baseline(0, 1)))
    ));
}

#[test]
fn test_unconstrained_parameter_is_singular() {
    let (instrument, sky) = (instrument(), sky());
    let mut observed = observed(&instrument, &sky);
    // Every baseline with CS004 is flagged.
    for (i, b) in observed.baselines.clone().iter().enumerate() {
        if b.1 == 3 {
            observed.flags.slice_mut(ndarray::s![i, .., .., ..]).fill(true);
        }
    }
    let store = store(&TRUE_GAINS);
    let ctx = ModelContext::new(&instrument, &sky, store.clone());
    let mut model = MeasurementModel::forward(&ctx, &observation(), &config()).unwrap();
    model
        .set_solvables_by_pattern(&["Gain:*:CS004".to_string()])
        .unwrap();
    let result = Solver::new(SolveConfig::default()).solve(&mut model, &observed, &store);
    assert!(matches!(result, Err(SolveError::Singular { iteration: 1 })));
}

#[test]
fn test_solve_dense() {
    let a = nalgebra::DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, -2.0, -3.0, -1.0, 1.0, 2.0]);
    let b = nalgebra::DVector::from_vec(vec![-8.0, 0.0, 3.0]);
    let x = solve_dense(a, &b).unwrap();
    for (x, expected) in x.iter().zip([-4.0, -5.0, 2.0]) {
        assert_abs_diff_eq!(*x, expected, epsilon = 1e-12);
    }

    let singular = nalgebra::DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
    assert!(solve_dense(singular, &nalgebra::DVector::from_vec(vec![1.0, 2.0])).is_none());
    let zero = nalgebra::DMatrix::zeros(2, 2);
    assert!(solve_dense(zero, &nalgebra::DVector::from_vec(vec![1.0, 2.0])).is_none());
}

#[test]
fn test_solve_config_from_toml() {
    let config: SolveConfig = toml::from_str(indoc! {r#"
        solvables = ["Gain:*"]
        max_iterations = 5
    "#})
    .unwrap();
    assert_eq!(config.solvables, vec!["Gain:*"]);
    assert_eq!(config.max_iterations, 5);
    assert_abs_diff_eq!(config.epsilon, DEFAULT_EPSILON);
    assert_abs_diff_eq!(config.lm_factor, 0.0);
}
