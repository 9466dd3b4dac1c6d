// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
2x2 complex Jones-matrix math.

Generic linear-algebra crates can't specialise for 2x2 matrices, and every
expression node in the measurement equation works on them, so the special
cases are written out here. Elements are stored row-major: `[00, 01, 10, 11]`.
 */

use serde::{Deserialize, Serialize};

use crate::c64;

#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Jones([c64; 4]);

const JONES_ZERO: Jones = Jones([c64::new(0.0, 0.0); 4]);

const JONES_IDENTITY: Jones = Jones([
    c64::new(1.0, 0.0),
    c64::new(0.0, 0.0),
    c64::new(0.0, 0.0),
    c64::new(1.0, 0.0),
]);

impl Jones {
    pub fn identity() -> Self {
        JONES_IDENTITY
    }

    pub fn zero() -> Self {
        JONES_ZERO
    }

    /// A diagonal Jones matrix.
    #[inline(always)]
    pub fn diag(xx: c64, yy: c64) -> Self {
        Self([xx, c64::default(), c64::default(), yy])
    }

    /// A real rotation matrix, rotating by `angle` \[radians\].
    #[inline(always)]
    pub fn rotation(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self([
            c64::new(c, 0.0),
            c64::new(-s, 0.0),
            c64::new(s, 0.0),
            c64::new(c, 0.0),
        ])
    }

    /// The transform taking linear (XX, XY, YX, YY) correlations to circular
    /// (RR, RL, LR, LL) correlations when sandwiched as `H . V . H^H`.
    pub fn linear_to_circular() -> Self {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        Self([
            c64::new(s, 0.0),
            c64::new(0.0, s),
            c64::new(s, 0.0),
            c64::new(0.0, -s),
        ])
    }

    /// From an input Jones matrix, get a copy that has been Hermitian
    /// conjugated (J^H).
    ///
    /// # Examples
    ///
    /// ```
    /// # use lofar_bbs::{c64, Jones};
    /// let j = Jones::from([
    ///     c64::new(1.0, 2.0),
    ///     c64::new(3.0, 4.0),
    ///     c64::new(5.0, 6.0),
    ///     c64::new(7.0, 8.0),
    /// ]);
    /// let jh = j.h();
    /// assert_eq!(jh[1], c64::new(5.0, -6.0));
    /// assert_eq!(jh[2], c64::new(3.0, -4.0));
    /// ```
    #[inline(always)]
    pub fn h(&self) -> Self {
        Self([
            self[0].conj(),
            self[2].conj(),
            self[1].conj(),
            self[3].conj(),
        ])
    }

    /// Multiply by a Jones matrix which gets Hermitian conjugated (J^H).
    #[inline(always)]
    pub fn mul_hermitian(&self, b: &Self) -> Self {
        *self * b.h()
    }

    /// The determinant.
    #[inline(always)]
    pub fn det(&self) -> c64 {
        self[0] * self[3] - self[1] * self[2]
    }

    /// Get the inverse of the Jones matrix (J^I).
    ///
    /// Ideally, J^I . J = I. However it's possible that J is singular, in which
    /// case the contents of J^I are all NaN.
    #[inline(always)]
    pub fn inv(&self) -> Self {
        let inv_det = 1.0 / self.det();
        Self([
            inv_det * self[3],
            -inv_det * self[1],
            -inv_det * self[2],
            inv_det * self[0],
        ])
    }

    /// The squared Frobenius norm.
    #[inline(always)]
    pub fn norm_sqr(&self) -> f64 {
        self.iter().map(|e| e.norm_sqr()).sum()
    }

    /// The 2-norm condition number, i.e. the ratio of the largest to the
    /// smallest singular value. Singular matrices give infinity.
    pub fn condition_number(&self) -> f64 {
        // The squared singular values are the roots of
        // s^2 - |J|_F^2 s + |det J|^2 = 0.
        let f = self.norm_sqr();
        let d = self.det().norm_sqr();
        let disc = (f * f - 4.0 * d).max(0.0).sqrt();
        let s_max = 0.5 * (f + disc);
        // The product of the roots is |det J|^2.
        let s_min = if s_max > 0.0 { d / s_max } else { 0.0 };
        if s_min <= 0.0 {
            return f64::INFINITY;
        }
        (s_max / s_min).sqrt()
    }

    /// Are any of the elements NaN or infinite?
    pub fn any_non_finite(&self) -> bool {
        self.iter().any(|e| !e.re.is_finite() || !e.im.is_finite())
    }

    /// Rotate a point-source brightness into the circular basis.
    pub fn to_circular(self) -> Self {
        let h = Self::linear_to_circular();
        (h * self).mul_hermitian(&h)
    }
}

impl std::ops::Deref for Jones {
    type Target = [c64; 4];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Jones {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<[c64; 4]> for Jones {
    fn from(arr: [c64; 4]) -> Self {
        Self(arr)
    }
}

impl std::ops::Add<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Jones) -> Self {
        Self([
            self[0] + rhs[0],
            self[1] + rhs[1],
            self[2] + rhs[2],
            self[3] + rhs[3],
        ])
    }
}

impl std::ops::AddAssign<Jones> for Jones {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Jones) {
        self[0] += rhs[0];
        self[1] += rhs[1];
        self[2] += rhs[2];
        self[3] += rhs[3];
    }
}

impl std::ops::Sub<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Jones) -> Self {
        Self([
            self[0] - rhs[0],
            self[1] - rhs[1],
            self[2] - rhs[2],
            self[3] - rhs[3],
        ])
    }
}

impl std::ops::Mul<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Jones) -> Self {
        let a = self.0;
        let b = rhs.0;
        Self([
            a[0] * b[0] + a[1] * b[2],
            a[0] * b[1] + a[1] * b[3],
            a[2] * b[0] + a[3] * b[2],
            a[2] * b[1] + a[3] * b[3],
        ])
    }
}

impl std::ops::Mul<f64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: f64) -> Self {
        Self([self[0] * rhs, self[1] * rhs, self[2] * rhs, self[3] * rhs])
    }
}

impl std::ops::Mul<c64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: c64) -> Self {
        Self([self[0] * rhs, self[1] * rhs, self[2] * rhs, self[3] * rhs])
    }
}

impl std::ops::Div<f64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn div(self, rhs: f64) -> Self {
        Self([self[0] / rhs, self[1] / rhs, self[2] / rhs, self[3] / rhs])
    }
}

impl num_traits::Zero for Jones {
    #[inline]
    fn zero() -> Self {
        Jones::zero()
    }

    #[inline]
    fn is_zero(&self) -> bool {
        *self == Jones::zero()
    }
}

#[cfg(test)]
impl approx::AbsDiffEq for Jones {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    #[inline]
    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.iter()
            .zip(other.iter())
            .all(|(a, b)| (a - b).norm() <= epsilon)
    }
}
