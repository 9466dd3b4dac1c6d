// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::rc::Rc;

use super::{ExprRef, Grid, Leaf, LeafOp, PValueKey, ParmId, Value};
use crate::parms::ParmStoreRef;

/// A leaf reading a parameter from the store. When the parameter is
/// solvable, the value also carries one perturbed grid per coefficient.
pub struct ParmExpr {
    store: ParmStoreRef,
    id: ParmId,
}

impl ParmExpr {
    pub fn new(store: ParmStoreRef, id: ParmId) -> ParmExpr {
        ParmExpr { store, id }
    }

    pub fn new_ref(store: ParmStoreRef, id: ParmId) -> ExprRef<f64> {
        Rc::new(Leaf::new(ParmExpr::new(store, id)))
    }
}

impl LeafOp for ParmExpr {
    type Output = f64;

    fn name(&self) -> &'static str {
        "Parm"
    }

    fn parm_id(&self) -> Option<ParmId> {
        Some(self.id)
    }

    fn evaluate(&self, grid: &Grid) -> Value<f64> {
        let store = self.store.borrow();
        let parm = store.get(self.id);
        let mut value = Value::new(parm.evaluate(grid));
        if parm.is_solvable() {
            let mut coeffs = parm.coeffs().to_vec();
            for k in 0..coeffs.len() {
                let c = coeffs[k];
                coeffs[k] = c + parm.perturbation(k);
                value.perturbed.insert(
                    PValueKey::new(self.id, k),
                    parm.evaluate_with(grid, &coeffs),
                );
                coeffs[k] = c;
            }
        }
        value
    }
}
