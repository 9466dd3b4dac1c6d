// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scalar and Jones-matrix algebra nodes.

use std::rc::Rc;

use super::{
    combine1, combine2, combine3, combine4, value::merge_flags, Binary, BinaryOp, ExprRef, Grid,
    Leaf, LeafOp, Quaternary, QuaternaryOp, Ternary, TernaryOp, Unary, UnaryOp, Value,
};
use crate::{c64, Jones};

/// The same value everywhere.
#[derive(Debug, Clone)]
pub struct Constant<T>(pub T);

impl<T: Clone + 'static> LeafOp for Constant<T> {
    type Output = T;

    fn name(&self) -> &'static str {
        "Constant"
    }

    fn evaluate(&self, grid: &Grid) -> Value<T> {
        Value::filled(grid.shape(), self.0.clone())
    }
}

pub fn constant<T: Clone + 'static>(value: T) -> ExprRef<T> {
    Rc::new(Leaf::new(Constant(value)))
}

/// (real, imaginary) -> complex
pub struct AsComplex;

impl BinaryOp<f64, f64> for AsComplex {
    type Output = c64;

    fn name(&self) -> &'static str {
        "AsComplex"
    }

    fn evaluate(&self, grid: &Grid, re: &Value<f64>, im: &Value<f64>) -> Value<c64> {
        combine2(grid, re, im, |_, &re, &im| c64::new(re, im))
    }
}

pub fn as_complex(re: ExprRef<f64>, im: ExprRef<f64>) -> ExprRef<c64> {
    Rc::new(Binary::new(AsComplex, re, im))
}

/// (amplitude, phase) -> complex
pub struct AsPolar;

impl BinaryOp<f64, f64> for AsPolar {
    type Output = c64;

    fn name(&self) -> &'static str {
        "AsPolar"
    }

    fn evaluate(&self, grid: &Grid, ampl: &Value<f64>, phase: &Value<f64>) -> Value<c64> {
        combine2(grid, ampl, phase, |_, &a, &p| c64::from_polar(a, p))
    }
}

pub fn as_polar(ampl: ExprRef<f64>, phase: ExprRef<f64>) -> ExprRef<c64> {
    Rc::new(Binary::new(AsPolar, ampl, phase))
}

/// Two complex numbers on the diagonal of a Jones matrix.
pub struct AsDiag;

impl BinaryOp<c64, c64> for AsDiag {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "AsDiag"
    }

    fn evaluate(&self, grid: &Grid, xx: &Value<c64>, yy: &Value<c64>) -> Value<Jones> {
        combine2(grid, xx, yy, |_, &xx, &yy| Jones::diag(xx, yy))
    }
}

pub fn as_diag(xx: ExprRef<c64>, yy: ExprRef<c64>) -> ExprRef<Jones> {
    Rc::new(Binary::new(AsDiag, xx, yy))
}

/// Two reals on the diagonal of a Jones matrix.
pub struct RealDiag;

impl BinaryOp<f64, f64> for RealDiag {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "RealDiag"
    }

    fn evaluate(&self, grid: &Grid, xx: &Value<f64>, yy: &Value<f64>) -> Value<Jones> {
        combine2(grid, xx, yy, |_, &xx, &yy| {
            Jones::diag(c64::new(xx, 0.0), c64::new(yy, 0.0))
        })
    }
}

pub fn real_diag(xx: ExprRef<f64>, yy: ExprRef<f64>) -> ExprRef<Jones> {
    Rc::new(Binary::new(RealDiag, xx, yy))
}

/// Four complex numbers as a full Jones matrix, row-major.
pub struct AsMatrix;

impl QuaternaryOp<c64, c64, c64, c64> for AsMatrix {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "AsMatrix"
    }

    fn evaluate(
        &self,
        grid: &Grid,
        a0: &Value<c64>,
        a1: &Value<c64>,
        a2: &Value<c64>,
        a3: &Value<c64>,
    ) -> Value<Jones> {
        combine4(grid, a0, a1, a2, a3, |_, &a, &b, &c, &d| {
            Jones::from([a, b, c, d])
        })
    }
}

pub fn as_matrix(
    xx: ExprRef<c64>,
    xy: ExprRef<c64>,
    yx: ExprRef<c64>,
    yy: ExprRef<c64>,
) -> ExprRef<Jones> {
    Rc::new(Quaternary::new(AsMatrix, xx, xy, yx, yy))
}

/// `A . B`
pub struct MatrixMul2;

impl BinaryOp<Jones, Jones> for MatrixMul2 {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "MatrixMul2"
    }

    fn evaluate(&self, grid: &Grid, a: &Value<Jones>, b: &Value<Jones>) -> Value<Jones> {
        combine2(grid, a, b, |_, &a, &b| a * b)
    }
}

/// Compose two effects: `lhs . rhs`.
pub fn compose(lhs: ExprRef<Jones>, rhs: ExprRef<Jones>) -> ExprRef<Jones> {
    Rc::new(Binary::new(MatrixMul2, lhs, rhs))
}

/// `L . C . R^H`
pub struct MatrixMul3;

impl TernaryOp<Jones, Jones, Jones> for MatrixMul3 {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "MatrixMul3"
    }

    fn evaluate(
        &self,
        grid: &Grid,
        l: &Value<Jones>,
        c: &Value<Jones>,
        r: &Value<Jones>,
    ) -> Value<Jones> {
        combine3(grid, l, c, r, |_, &l, &c, r| (l * c).mul_hermitian(r))
    }
}

/// Apply the effects of two stations to a coherence: `lhs . coherence .
/// rhs^H`.
pub fn apply(lhs: ExprRef<Jones>, coherence: ExprRef<Jones>, rhs: ExprRef<Jones>) -> ExprRef<Jones> {
    Rc::new(Ternary::new(MatrixMul3, lhs, coherence, rhs))
}

/// `J^-1`. Singular matrices give NaN.
pub struct MatrixInverse;

impl UnaryOp<Jones> for MatrixInverse {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "MatrixInverse"
    }

    fn evaluate(&self, grid: &Grid, j: &Value<Jones>) -> Value<Jones> {
        combine1(grid, j, |_, j| j.inv())
    }
}

pub fn inverse(j: ExprRef<Jones>) -> ExprRef<Jones> {
    Rc::new(Unary::new(MatrixInverse, j))
}

/// complex scalar × Jones
pub struct ScalarMatrixMul;

impl BinaryOp<c64, Jones> for ScalarMatrixMul {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "ScalarMatrixMul"
    }

    fn evaluate(&self, grid: &Grid, s: &Value<c64>, j: &Value<Jones>) -> Value<Jones> {
        combine2(grid, s, j, |_, &s, &j| j * s)
    }
}

pub fn scalar_matrix_mul(s: ExprRef<c64>, j: ExprRef<Jones>) -> ExprRef<Jones> {
    Rc::new(Binary::new(ScalarMatrixMul, s, j))
}

/// `a . conj(b)`; combines two station phase shifts into a baseline phase
/// shift.
pub struct BaselinePhase;

impl BinaryOp<c64, c64> for BaselinePhase {
    type Output = c64;

    fn name(&self) -> &'static str {
        "BaselinePhase"
    }

    fn evaluate(&self, grid: &Grid, a: &Value<c64>, b: &Value<c64>) -> Value<c64> {
        combine2(grid, a, b, |_, &a, &b| a * b.conj())
    }
}

pub fn baseline_phase(p: ExprRef<c64>, q: ExprRef<c64>) -> ExprRef<c64> {
    Rc::new(Binary::new(BaselinePhase, p, q))
}

/// The 2-norm condition number of a Jones matrix.
pub struct ConditionNumber;

impl UnaryOp<Jones> for ConditionNumber {
    type Output = f64;

    fn name(&self) -> &'static str {
        "ConditionNumber"
    }

    fn evaluate(&self, grid: &Grid, j: &Value<Jones>) -> Value<f64> {
        combine1(grid, j, |_, j| j.condition_number())
    }
}

pub fn condition_number(j: ExprRef<Jones>) -> ExprRef<f64> {
    Rc::new(Unary::new(ConditionNumber, j))
}

/// Passes its argument through, flagging cells whose value exceeds the
/// threshold (or isn't finite).
pub struct Threshold {
    pub threshold: f64,
}

impl UnaryOp<f64> for Threshold {
    type Output = f64;

    fn name(&self) -> &'static str {
        "Threshold"
    }

    fn evaluate(&self, _grid: &Grid, x: &Value<f64>) -> Value<f64> {
        let exceeded = x.value.mapv(|v| v > self.threshold || v.is_nan());
        Value {
            value: x.value.clone(),
            perturbed: x.perturbed.clone(),
            flags: merge_flags(Some(exceeded), x.flags.as_ref()),
        }
    }
}

pub fn threshold(x: ExprRef<f64>, threshold: f64) -> ExprRef<f64> {
    Rc::new(Unary::new(Threshold { threshold }, x))
}

/// The first argument, with the flags of the second OR'ed into its own. The
/// second argument's values are ignored.
pub struct MergeFlags;

impl<B: 'static> BinaryOp<Jones, B> for MergeFlags {
    type Output = Jones;

    fn name(&self) -> &'static str {
        "MergeFlags"
    }

    fn evaluate(&self, _grid: &Grid, j: &Value<Jones>, other: &Value<B>) -> Value<Jones> {
        Value {
            value: j.value.clone(),
            perturbed: j.perturbed.clone(),
            flags: merge_flags(j.flags.clone(), other.flags.as_ref()),
        }
    }
}

pub fn merge_flags_from<B: 'static>(j: ExprRef<Jones>, flags: ExprRef<B>) -> ExprRef<Jones> {
    Rc::new(Binary::new(MergeFlags, j, flags))
}
