// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Grid-shaped expression values, their perturbed variants and flags.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use ndarray::prelude::*;

use super::request::{Grid, GridCell};
use crate::Jones;

/// Index of a parameter in a [`crate::parms::ParmStore`].
pub type ParmId = usize;

/// Identifies one coefficient of one parameter. Perturbed values are keyed on
/// this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PValueKey {
    pub parm_id: ParmId,
    pub coeff_id: usize,
}

impl PValueKey {
    pub fn new(parm_id: ParmId, coeff_id: usize) -> Self {
        Self { parm_id, coeff_id }
    }
}

/// One bool per grid cell; `true` means flagged.
pub type FlagArray = Array2<bool>;

pub type Vector2 = [f64; 2];
pub type Vector3 = [f64; 3];

/// The value of an expression over a grid.
///
/// `perturbed` holds, for every solvable coefficient this value depends on,
/// the value computed with that coefficient perturbed. Values that don't
/// depend on a solvable coefficient have an empty map.
#[derive(Debug, Clone, PartialEq)]
pub struct Value<T> {
    pub value: Array2<T>,
    pub perturbed: BTreeMap<PValueKey, Array2<T>>,
    pub flags: Option<FlagArray>,
}

pub type ValuePtr<T> = Rc<Value<T>>;

impl<T> Value<T> {
    pub fn new(value: Array2<T>) -> Self {
        Self {
            value,
            perturbed: BTreeMap::new(),
            flags: None,
        }
    }

    pub fn with_flags(mut self, flags: Option<FlagArray>) -> Self {
        if let Some(f) = flags.as_ref() {
            assert_eq!(f.dim(), self.value.dim(), "Flag shape mismatch");
        }
        self.flags = flags;
        self
    }

    pub fn shape(&self) -> (usize, usize) {
        self.value.dim()
    }

    /// The perturbed value for `key`, or the central value if this value
    /// doesn't depend on that coefficient.
    pub fn perturbed_or_central(&self, key: &PValueKey) -> &Array2<T> {
        self.perturbed.get(key).unwrap_or(&self.value)
    }

    pub fn is_flagged(&self, t: usize, f: usize) -> bool {
        self.flags.as_ref().map(|fl| fl[(t, f)]).unwrap_or(false)
    }
}

impl<T: Clone> Value<T> {
    /// The same value in every grid cell.
    pub fn filled(shape: (usize, usize), value: T) -> Self {
        Self::new(Array2::from_elem(shape, value))
    }
}

/// OR two optional flag arrays together.
pub(crate) fn merge_flags(acc: Option<FlagArray>, other: Option<&FlagArray>) -> Option<FlagArray> {
    match (acc, other) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b.clone()),
        (Some(mut a), Some(b)) => {
            a.zip_mut_with(b, |x, &y| *x |= y);
            Some(a)
        }
    }
}

// Generate `combineN` functions. Each applies a per-cell function to the
// central values of its arguments, then again for every perturbation key
// present in any argument (substituting central values for arguments that
// don't depend on that key), and ORs the argument flags.
macro_rules! impl_combine {
    ($name:ident; $($arg:ident: $ty:ident),+) => {
        pub fn $name<$($ty,)+ R, F>(grid: &Grid, $($arg: &Value<$ty>,)+ f: F) -> Value<R>
        where
            F: Fn(GridCell, $(&$ty),+) -> R,
        {
            let shape = grid.shape();
            $(
                assert_eq!($arg.shape(), shape, "Value shape doesn't match the grid");
            )+
            let eval = |$($arg: &Array2<$ty>),+| -> Array2<R> {
                Array2::from_shape_fn(shape, |(t, c)| f(grid.cell(t, c), $(&$arg[(t, c)]),+))
            };

            let value = eval($(&$arg.value),+);
            let keys: BTreeSet<PValueKey> = std::iter::empty()
                $(.chain($arg.perturbed.keys().copied()))+
                .collect();
            let perturbed = keys
                .into_iter()
                .map(|key| (key, eval($($arg.perturbed_or_central(&key)),+)))
                .collect();
            let mut flags = None;
            $(
                flags = merge_flags(flags, $arg.flags.as_ref());
            )+
            Value {
                value,
                perturbed,
                flags,
            }
        }
    };
}

impl_combine!(combine1; a0: A0);
impl_combine!(combine2; a0: A0, a1: A1);
impl_combine!(combine3; a0: A0, a1: A1, a2: A2);
impl_combine!(combine4; a0: A0, a1: A1, a2: A2, a3: A3);
impl_combine!(combine5; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4);

/// Sum Jones-valued terms cell by cell, including their perturbed values.
pub fn sum(grid: &Grid, terms: &[ValuePtr<Jones>]) -> Value<Jones> {
    let shape = grid.shape();
    let value = accumulate(shape, terms.iter().map(|t| &t.value));
    let keys: BTreeSet<PValueKey> = terms
        .iter()
        .flat_map(|t| t.perturbed.keys().copied())
        .collect();
    let perturbed = keys
        .into_iter()
        .map(|key| {
            let summed = accumulate(shape, terms.iter().map(|t| t.perturbed_or_central(&key)));
            (key, summed)
        })
        .collect();
    let flags = terms
        .iter()
        .fold(None, |acc, t| merge_flags(acc, t.flags.as_ref()));
    Value {
        value,
        perturbed,
        flags,
    }
}

fn accumulate<'a>(
    shape: (usize, usize),
    arrays: impl Iterator<Item = &'a Array2<Jones>>,
) -> Array2<Jones> {
    let mut acc = Array2::from_elem(shape, Jones::zero());
    for a in arrays {
        acc.zip_mut_with(a, |x, &y| *x += y);
    }
    acc
}
