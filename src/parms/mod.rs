// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Model parameters.

A parameter is a 2D polynomial in (time, frequency) over a validity domain.
Each coefficient can be solved for; solvable coefficients carry a perturbation
used to estimate partial derivatives by forward differences.
 */

mod error;

pub use error::ParmError;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    constants::DEFAULT_PERTURBATION,
    expr::{Domain, Grid, ParmId},
};

/// A parameter store shared between the expression leaves that read it and
/// whoever changes its values (e.g. a solver).
pub type ParmStoreRef = Rc<RefCell<ParmStore>>;

/// A parameter value as written in a parset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParmValue {
    /// Polynomial coefficients, time-major: `coeffs[it * shape[1] + jf]`.
    pub coeffs: Vec<f64>,

    /// (number of time terms, number of frequency terms). Defaults to a
    /// constant.
    #[serde(default = "default_shape")]
    pub shape: [usize; 2],

    #[serde(default = "default_perturbation")]
    pub perturbation: f64,

    /// Perturb relative to the coefficient's magnitude.
    #[serde(default)]
    pub relative: bool,

    /// The domain the polynomial is normalised over. Absent means a constant
    /// in time and frequency.
    #[serde(default)]
    pub domain: Option<Domain>,
}

fn default_shape() -> [usize; 2] {
    [1, 1]
}

fn default_perturbation() -> f64 {
    DEFAULT_PERTURBATION
}

impl ParmValue {
    pub fn constant(value: f64) -> Self {
        Self {
            coeffs: vec![value],
            shape: default_shape(),
            perturbation: DEFAULT_PERTURBATION,
            relative: false,
            domain: None,
        }
    }
}

/// A named parameter.
#[derive(Debug, Clone)]
pub struct Parm {
    name: String,
    coeffs: Vec<f64>,
    shape: [usize; 2],
    perturbation: f64,
    relative: bool,
    domain: Domain,
    solvable: bool,
}

impl Parm {
    pub fn new(name: &str, value: ParmValue) -> Result<Parm, ParmError> {
        let ParmValue {
            coeffs,
            shape,
            perturbation,
            relative,
            domain,
        } = value;
        if coeffs.is_empty() {
            return Err(ParmError::NoCoeffs(name.to_string()));
        }
        let expected = shape[0] * shape[1];
        if expected != coeffs.len() {
            return Err(ParmError::CoeffShape {
                name: name.to_string(),
                shape,
                expected,
                got: coeffs.len(),
            });
        }
        Ok(Parm {
            name: name.to_string(),
            coeffs,
            shape,
            perturbation,
            relative,
            domain: domain.unwrap_or_else(Domain::empty),
            solvable: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn n_coeffs(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_solvable(&self) -> bool {
        self.solvable
    }

    /// The domain the polynomial is normalised over; empty for parameters
    /// without one.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// The perturbation step of coefficient `k`.
    pub fn perturbation(&self, k: usize) -> f64 {
        if self.relative && self.coeffs[k] != 0.0 {
            self.perturbation * self.coeffs[k].abs()
        } else {
            self.perturbation
        }
    }

    /// Evaluate the polynomial with the given coefficients on every cell of
    /// `grid`.
    pub fn evaluate_with(&self, grid: &Grid, coeffs: &[f64]) -> Array2<f64> {
        let [nt, nf] = self.shape;
        let normalise = |x: f64, range: (f64, f64)| {
            let width = range.1 - range.0;
            if width > 0.0 {
                (x - range.0) / width
            } else {
                0.0
            }
        };

        Array2::from_shape_fn(grid.shape(), |(t, f)| {
            if coeffs.len() == 1 {
                return coeffs[0];
            }
            let cell = grid.cell(t, f);
            let x = normalise(cell.time, self.domain.time);
            let y = normalise(cell.freq, self.domain.freq);
            // Horner in both dimensions.
            let mut acc = 0.0;
            for it in (0..nt).rev() {
                let mut row = 0.0;
                for jf in (0..nf).rev() {
                    row = row * y + coeffs[it * nf + jf];
                }
                acc = acc * x + row;
            }
            acc
        })
    }

    pub fn evaluate(&self, grid: &Grid) -> Array2<f64> {
        self.evaluate_with(grid, &self.coeffs)
    }

    pub fn to_value(&self) -> ParmValue {
        ParmValue {
            coeffs: self.coeffs.clone(),
            shape: self.shape,
            perturbation: self.perturbation,
            relative: self.relative,
            domain: (!self.domain.is_empty()).then_some(self.domain),
        }
    }
}

/// A default value applied to any parameter whose name matches a glob pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParmDefault {
    pub pattern: String,
    #[serde(flatten)]
    pub value: ParmValue,
}

/// The parameter section of a parset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParmsConfig {
    #[serde(default)]
    pub values: indexmap::IndexMap<String, ParmValue>,

    #[serde(default)]
    pub defaults: Vec<ParmDefault>,
}

#[derive(Debug, Default)]
pub struct ParmStore {
    parms: Vec<Parm>,
    index: HashMap<String, ParmId>,
    defaults: Vec<(glob::Pattern, ParmValue)>,
}

impl ParmStore {
    pub fn new() -> ParmStore {
        ParmStore::default()
    }

    pub fn from_config(config: &ParmsConfig) -> Result<ParmStore, ParmError> {
        let mut store = ParmStore::new();
        for (name, value) in &config.values {
            store.insert(Parm::new(name, value.clone())?);
        }
        for default in &config.defaults {
            store.add_default(&default.pattern, default.value.clone())?;
        }
        debug!(
            "Parameter store: {} values, {} defaults",
            store.parms.len(),
            store.defaults.len()
        );
        Ok(store)
    }

    pub fn into_shared(self) -> ParmStoreRef {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.parms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parms.is_empty()
    }

    /// Add a parameter, replacing (and keeping the id of) any parameter with
    /// the same name.
    pub fn insert(&mut self, parm: Parm) -> ParmId {
        match self.index.get(&parm.name) {
            Some(&id) => {
                self.parms[id] = parm;
                id
            }
            None => {
                let id = self.parms.len();
                self.index.insert(parm.name.clone(), id);
                self.parms.push(parm);
                id
            }
        }
    }

    /// Forget every parameter added after the store held `len` parameters.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.parms.len() {
            return;
        }
        for parm in self.parms.drain(len..) {
            self.index.remove(&parm.name);
        }
    }

    /// Register a default. Defaults are tried in the order they were added.
    pub fn add_default(&mut self, pattern: &str, value: ParmValue) -> Result<(), ParmError> {
        let p = glob::Pattern::new(pattern).map_err(|err| ParmError::BadPattern {
            pattern: pattern.to_string(),
            err,
        })?;
        self.defaults.push((p, value));
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<ParmId> {
        self.index.get(name).copied()
    }

    /// Get the id of a parameter, instantiating it from the first matching
    /// default if it doesn't exist yet.
    pub fn resolve(&mut self, name: &str) -> Result<ParmId, ParmError> {
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        let value = self
            .defaults
            .iter()
            .find(|(p, _)| p.matches(name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ParmError::NotFound(name.to_string()))?;
        debug!("Parameter '{name}' takes its default value");
        Ok(self.insert(Parm::new(name, value)?))
    }

    pub fn get(&self, id: ParmId) -> &Parm {
        &self.parms[id]
    }

    pub fn set_solvable(&mut self, id: ParmId, solvable: bool) {
        self.parms[id].solvable = solvable;
    }

    pub fn is_solvable(&self, id: ParmId) -> bool {
        self.parms[id].solvable
    }

    pub fn clear_solvables(&mut self) {
        for p in &mut self.parms {
            p.solvable = false;
        }
    }

    pub fn set_coeffs(&mut self, id: ParmId, coeffs: &[f64]) {
        let parm = &mut self.parms[id];
        assert_eq!(
            parm.coeffs.len(),
            coeffs.len(),
            "Wrong number of coefficients for '{}'",
            parm.name
        );
        parm.coeffs.copy_from_slice(coeffs);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParmId, &Parm)> {
        self.parms.iter().enumerate()
    }

    /// The current values of all parameters, as they would be written to a
    /// parset.
    pub fn to_config(&self) -> ParmsConfig {
        ParmsConfig {
            values: self
                .parms
                .iter()
                .map(|p| (p.name.clone(), p.to_value()))
                .collect(),
            defaults: vec![],
        }
    }
}
