// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Forward-difference partial derivatives of Jones-valued expressions.

use std::collections::BTreeMap;

use ndarray::prelude::*;

use crate::{
    cache::Cache,
    expr::{Expr, FlagArray, PValueKey, Request},
    parms::ParmStore,
    Jones,
};

/// The evaluated measurement equation of one baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// (time, frequency)
    pub value: Array2<Jones>,

    pub flags: Option<FlagArray>,

    /// The partial derivative of every cell with respect to each solvable
    /// coefficient the expression depends on.
    pub partials: BTreeMap<PValueKey, Array2<Jones>>,
}

impl Measurement {
    pub fn is_flagged(&self, t: usize, f: usize) -> bool {
        self.flags.as_ref().map(|fl| fl[(t, f)]).unwrap_or(false)
    }
}

/// Evaluate `expr` once and turn each perturbed value it carries into a
/// partial derivative, `(perturbed - central) / perturbation`. The division
/// isn't guarded; a zero perturbation gives non-finite derivatives.
pub fn evaluate_partials<E: Expr<Jones> + ?Sized>(
    expr: &E,
    request: &Request,
    cache: &mut Cache,
    store: &ParmStore,
) -> Measurement {
    let v = expr.evaluate(request, cache);
    let partials = v
        .perturbed
        .iter()
        .map(|(key, perturbed)| {
            let step = store.get(key.parm_id).perturbation(key.coeff_id);
            let mut d = perturbed - &v.value;
            d.mapv_inplace(|j| j / step);
            (*key, d)
        })
        .collect();
    Measurement {
        value: v.value.clone(),
        flags: v.flags.clone(),
        partials,
    }
}
