//! Overflow-checked 64-bit integer backend.

use crate::backend::Num;
use crate::error::{NumError, NumResult};
use num_rational::BigRational;
use num_traits::ToPrimitive;
use std::fmt;

/// A 64-bit signed integer where every unrepresentable result reports
/// [`NumError::Overflow`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct CheckedInt64(i64);

impl CheckedInt64 {
    /// Wrap a machine integer.
    #[must_use]
    pub fn new(n: i64) -> Self {
        Self(n)
    }

    /// The raw machine value.
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CheckedInt64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Num for CheckedInt64 {
    fn zero() -> Self {
        Self(0)
    }

    fn one() -> Self {
        Self(1)
    }

    fn from_i64(n: i64) -> Self {
        Self(n)
    }

    fn from_rational(r: &BigRational) -> NumResult<Self> {
        if !r.is_integer() {
            return Err(NumError::Overflow);
        }
        r.to_integer().to_i64().map(Self).ok_or(NumError::Overflow)
    }

    fn to_rational(&self) -> BigRational {
        BigRational::from_integer(self.0.into())
    }

    fn to_f64(&self) -> f64 {
        self.0 as f64
    }

    fn checked_add(&self, rhs: &Self) -> NumResult<Self> {
        self.0.checked_add(rhs.0).map(Self).ok_or(NumError::Overflow)
    }

    fn checked_sub(&self, rhs: &Self) -> NumResult<Self> {
        self.0.checked_sub(rhs.0).map(Self).ok_or(NumError::Overflow)
    }

    fn checked_mul(&self, rhs: &Self) -> NumResult<Self> {
        self.0.checked_mul(rhs.0).map(Self).ok_or(NumError::Overflow)
    }

    fn checked_neg(&self) -> NumResult<Self> {
        self.0.checked_neg().map(Self).ok_or(NumError::Overflow)
    }

    fn checked_abs(&self) -> NumResult<Self> {
        self.0.checked_abs().map(Self).ok_or(NumError::Overflow)
    }

    fn div(&self, rhs: &Self) -> NumResult<Self> {
        debug_assert!(rhs.0 != 0);
        self.0
            .checked_div_euclid(rhs.0)
            .map(Self)
            .ok_or(NumError::Overflow)
    }

    fn modulo(&self, rhs: &Self) -> NumResult<Self> {
        debug_assert!(rhs.0 != 0);
        self.0
            .checked_rem_euclid(rhs.0)
            .map(Self)
            .ok_or(NumError::Overflow)
    }

    fn rem(&self, rhs: &Self) -> NumResult<Self> {
        debug_assert!(rhs.0 != 0);
        self.0.checked_rem(rhs.0).map(Self).ok_or(NumError::Overflow)
    }

    fn exact_div(&self, rhs: &Self) -> NumResult<Self> {
        debug_assert!(rhs.0 != 0);
        self.0.checked_div(rhs.0).map(Self).ok_or(NumError::Overflow)
    }

    fn floor(&self) -> Self {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: i64) -> CheckedInt64 {
        CheckedInt64::new(v)
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let max = n(i64::MAX);
        assert_eq!(max.checked_add(&n(1)), Err(NumError::Overflow));
        assert_eq!(max.checked_mul(&n(2)), Err(NumError::Overflow));
        assert_eq!(n(i64::MIN).checked_neg(), Err(NumError::Overflow));
        assert_eq!(n(i64::MIN).checked_abs(), Err(NumError::Overflow));
        assert_eq!(n(i64::MIN).div(&n(-1)), Err(NumError::Overflow));
    }

    #[test]
    fn euclidean_division_signs() {
        assert_eq!(n(-8).div(&n(3)).unwrap(), n(-3));
        assert_eq!(n(-8).modulo(&n(3)).unwrap(), n(1));
        assert_eq!(n(8).div(&n(-3)).unwrap(), n(-2));
        assert_eq!(n(8).modulo(&n(-3)).unwrap(), n(2));
    }

    #[test]
    fn from_rational_requires_integral_fit() {
        use num_bigint::BigInt;
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        assert_eq!(CheckedInt64::from_rational(&half), Err(NumError::Overflow));
        let big = BigRational::from_integer(BigInt::from(i64::MAX)) * BigInt::from(2);
        assert_eq!(CheckedInt64::from_rational(&big), Err(NumError::Overflow));
        let ok = BigRational::from_integer(BigInt::from(42));
        assert_eq!(CheckedInt64::from_rational(&ok).unwrap(), n(42));
    }
}
