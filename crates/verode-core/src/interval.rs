//! Outward-rounded interval arithmetic over `f64`.
//!
//! Every operation rounds the lower bound toward −∞ and the upper bound
//! toward +∞ by one ulp, so an interval result always contains the exact
//! real result of the same operation on any members of the operands.

use crate::{Result, VerodeError};
use ndarray::{Array1, Array2, ScalarOperand, Zip};
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Interval vector (one enclosure per state or parameter component)
pub type IVector = Array1<Interval>;

/// Interval matrix (Jacobian enclosures, preconditioned products)
pub type IMatrix = Array2<Interval>;

#[inline]
fn round_down(x: f64) -> f64 {
    if x.is_nan() {
        f64::NEG_INFINITY
    } else if x.is_finite() {
        x.next_down()
    } else {
        x
    }
}

#[inline]
fn round_up(x: f64) -> f64 {
    if x.is_nan() {
        f64::INFINITY
    } else if x.is_finite() {
        x.next_up()
    } else {
        x
    }
}

/// Closed interval `[lo, hi]` with `lo <= hi`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    lo: f64,
    hi: f64,
}

impl Interval {
    pub const ZERO: Self = Self { lo: 0.0, hi: 0.0 };
    pub const ONE: Self = Self { lo: 1.0, hi: 1.0 };
    pub const ENTIRE: Self = Self {
        lo: f64::NEG_INFINITY,
        hi: f64::INFINITY,
    };

    /// Interval from bounds. Bounds must be ordered.
    pub fn new(lo: f64, hi: f64) -> Self {
        debug_assert!(lo <= hi, "interval bounds out of order: [{lo}, {hi}]");
        Self { lo, hi }
    }

    /// Checked construction for user-supplied bounds
    pub fn try_new(lo: f64, hi: f64) -> Result<Self> {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(VerodeError::InvalidConfiguration(format!(
                "invalid interval bounds [{lo}, {hi}]"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Degenerate interval `[x, x]`
    pub fn point(x: f64) -> Self {
        Self { lo: x, hi: x }
    }

    /// Enclosure of the rational `num / den`
    pub fn ratio(num: i64, den: i64) -> Self {
        Self::point(num as f64) / Self::point(den as f64)
    }

    /// Symmetric interval `[-r, r]`
    pub fn symmetric(r: f64) -> Self {
        let r = r.abs();
        Self { lo: -r, hi: r }
    }

    pub fn lo(&self) -> f64 {
        self.lo
    }

    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// Midpoint (finite whenever one bound is finite)
    pub fn mid(&self) -> f64 {
        match (self.lo.is_finite(), self.hi.is_finite()) {
            (true, true) => 0.5 * self.lo + 0.5 * self.hi,
            (false, true) => {
                if self.hi < 0.0 {
                    -f64::MAX
                } else {
                    0.0
                }
            }
            (true, false) => {
                if self.lo > 0.0 {
                    f64::MAX
                } else {
                    0.0
                }
            }
            (false, false) => 0.0,
        }
    }

    /// Upper bound on the width
    pub fn width(&self) -> f64 {
        round_up(self.hi - self.lo)
    }

    /// Upper bound on the radius
    pub fn rad(&self) -> f64 {
        round_up(0.5 * (self.hi - self.lo))
    }

    /// Magnitude: max |x| over the interval
    pub fn mag(&self) -> f64 {
        self.lo.abs().max(self.hi.abs())
    }

    pub fn is_thin(&self) -> bool {
        self.lo == self.hi
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lo <= x && x <= self.hi
    }

    pub fn subset_of(&self, other: &Interval) -> bool {
        other.lo <= self.lo && self.hi <= other.hi
    }

    /// Intersection, `None` when the intervals are disjoint
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        (lo <= hi).then_some(Interval { lo, hi })
    }

    /// Interval hull of the union
    pub fn hull(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    /// Widen both bounds by `eps`
    pub fn inflate(&self, eps: f64) -> Interval {
        Interval {
            lo: round_down(self.lo - eps),
            hi: round_up(self.hi + eps),
        }
    }

    pub fn abs(&self) -> Interval {
        if self.lo >= 0.0 {
            *self
        } else if self.hi <= 0.0 {
            -*self
        } else {
            Interval {
                lo: 0.0,
                hi: self.mag(),
            }
        }
    }

    /// Integer power by repeated outward-rounded multiplication
    pub fn powi(&self, n: u32) -> Interval {
        if n == 0 {
            return Interval::ONE;
        }
        let base = if n % 2 == 0 { self.abs() } else { *self };
        let mut acc = base;
        for _ in 1..n {
            acc = acc * base;
        }
        acc
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::ZERO
    }
}

impl From<f64> for Interval {
    fn from(x: f64) -> Self {
        Interval::point(x)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "[{:.*e}, {:.*e}]", p, self.lo, p, self.hi),
            None => write!(f, "[{}, {}]", self.lo, self.hi),
        }
    }
}

// ============================================================================
// ARITHMETIC
// ============================================================================

impl Add for Interval {
    type Output = Interval;

    fn add(self, rhs: Interval) -> Interval {
        Interval {
            lo: round_down(self.lo + rhs.lo),
            hi: round_up(self.hi + rhs.hi),
        }
    }
}

impl Sub for Interval {
    type Output = Interval;

    fn sub(self, rhs: Interval) -> Interval {
        Interval {
            lo: round_down(self.lo - rhs.hi),
            hi: round_up(self.hi - rhs.lo),
        }
    }
}

impl Mul for Interval {
    type Output = Interval;

    fn mul(self, rhs: Interval) -> Interval {
        // 0 * inf contributes 0 in set arithmetic
        let prod = |a: f64, b: f64| {
            let p = a * b;
            if p.is_nan() {
                0.0
            } else {
                p
            }
        };
        let candidates = [
            prod(self.lo, rhs.lo),
            prod(self.lo, rhs.hi),
            prod(self.hi, rhs.lo),
            prod(self.hi, rhs.hi),
        ];
        let lo = candidates.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = candidates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Interval {
            lo: round_down(lo),
            hi: round_up(hi),
        }
    }
}

impl Div for Interval {
    type Output = Interval;

    fn div(self, rhs: Interval) -> Interval {
        if rhs.contains(0.0) {
            return Interval::ENTIRE;
        }
        let recip = Interval {
            lo: round_down(1.0 / rhs.hi),
            hi: round_up(1.0 / rhs.lo),
        };
        self * recip
    }
}

impl Neg for Interval {
    type Output = Interval;

    fn neg(self) -> Interval {
        Interval {
            lo: -self.hi,
            hi: -self.lo,
        }
    }
}

macro_rules! scalar_ops {
    ($($trait:ident $method:ident),*) => {$(
        impl $trait<f64> for Interval {
            type Output = Interval;

            fn $method(self, rhs: f64) -> Interval {
                $trait::$method(self, Interval::point(rhs))
            }
        }

        impl $trait<Interval> for f64 {
            type Output = Interval;

            fn $method(self, rhs: Interval) -> Interval {
                $trait::$method(Interval::point(self), rhs)
            }
        }
    )*};
}

scalar_ops!(Add add, Sub sub, Mul mul, Div div);

impl AddAssign for Interval {
    fn add_assign(&mut self, rhs: Interval) {
        *self = *self + rhs;
    }
}

impl SubAssign for Interval {
    fn sub_assign(&mut self, rhs: Interval) {
        *self = *self - rhs;
    }
}

impl MulAssign for Interval {
    fn mul_assign(&mut self, rhs: Interval) {
        *self = *self * rhs;
    }
}

impl Sum for Interval {
    fn sum<I: Iterator<Item = Interval>>(iter: I) -> Interval {
        iter.fold(Interval::ZERO, |acc, x| acc + x)
    }
}

impl Zero for Interval {
    fn zero() -> Self {
        Interval::ZERO
    }

    fn is_zero(&self) -> bool {
        self.lo == 0.0 && self.hi == 0.0
    }
}

impl One for Interval {
    fn one() -> Self {
        Interval::ONE
    }
}

impl ScalarOperand for Interval {}

// ============================================================================
// VECTOR AND MATRIX HELPERS
// ============================================================================

/// Build an interval vector from componentwise bounds
pub fn interval_vector(lo: &[f64], hi: &[f64]) -> Result<IVector> {
    if lo.len() != hi.len() {
        return Err(VerodeError::DimensionMismatch {
            context: "interval bounds",
            expected: lo.len(),
            found: hi.len(),
        });
    }
    lo.iter()
        .zip(hi)
        .map(|(&l, &h)| Interval::try_new(l, h))
        .collect::<Result<Vec<_>>>()
        .map(Array1::from_vec)
}

pub fn point_vector(v: &Array1<f64>) -> IVector {
    v.mapv(Interval::point)
}

pub fn point_matrix(m: &Array2<f64>) -> IMatrix {
    m.mapv(Interval::point)
}

pub fn mid_vector(v: &IVector) -> Array1<f64> {
    v.mapv(|x| x.mid())
}

pub fn mid_matrix(m: &IMatrix) -> Array2<f64> {
    m.mapv(|x| x.mid())
}

pub fn identity(n: usize) -> IMatrix {
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            Interval::ONE
        } else {
            Interval::ZERO
        }
    })
}

/// Componentwise intersection; empty components are an error
pub fn intersect_vectors(a: &IVector, b: &IVector) -> Result<IVector> {
    if a.len() != b.len() {
        return Err(VerodeError::DimensionMismatch {
            context: "intersection",
            expected: a.len(),
            found: b.len(),
        });
    }
    a.iter()
        .zip(b.iter())
        .enumerate()
        .map(|(i, (x, y))| x.intersect(y).ok_or(VerodeError::EmptyIntersection(i)))
        .collect::<Result<Vec<_>>>()
        .map(Array1::from_vec)
}

/// Componentwise interval hull
pub fn hull_vectors(a: &IVector, b: &IVector) -> IVector {
    Zip::from(a).and(b).map_collect(|x, y| x.hull(y))
}

pub fn is_subset(a: &IVector, b: &IVector) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.subset_of(y))
}

/// Largest component width
pub fn max_width(v: &IVector) -> f64 {
    v.iter().map(|x| x.width()).fold(0.0, f64::max)
}

/// Upper bound on the infinity norm (max absolute row sum)
pub fn norm_inf_bound(m: &IMatrix) -> f64 {
    m.rows()
        .into_iter()
        .map(|row| row.iter().map(|x| Interval::point(x.mag())).sum::<Interval>().hi())
        .fold(0.0, f64::max)
}
