//! Arbitrary-precision rational backend.

use crate::backend::Num;
use crate::error::NumResult;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::fmt;

/// Arbitrary-precision signed rational. Arithmetic never overflows.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Rational(BigRational);

impl Rational {
    /// Wrap an exact rational.
    #[must_use]
    pub fn new(r: BigRational) -> Self {
        Self(r)
    }

    /// Borrow the underlying rational.
    #[must_use]
    pub fn as_rational(&self) -> &BigRational {
        &self.0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Num for Rational {
    fn zero() -> Self {
        Self(BigRational::zero())
    }

    fn one() -> Self {
        Self(BigRational::one())
    }

    fn from_i64(n: i64) -> Self {
        Self(BigRational::from_integer(n.into()))
    }

    fn from_rational(r: &BigRational) -> NumResult<Self> {
        Ok(Self(r.clone()))
    }

    fn to_rational(&self) -> BigRational {
        self.0.clone()
    }

    fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::MAX)
    }

    fn checked_add(&self, rhs: &Self) -> NumResult<Self> {
        Ok(Self(&self.0 + &rhs.0))
    }

    fn checked_sub(&self, rhs: &Self) -> NumResult<Self> {
        Ok(Self(&self.0 - &rhs.0))
    }

    fn checked_mul(&self, rhs: &Self) -> NumResult<Self> {
        Ok(Self(&self.0 * &rhs.0))
    }

    fn checked_neg(&self) -> NumResult<Self> {
        Ok(Self(-&self.0))
    }

    fn checked_abs(&self) -> NumResult<Self> {
        Ok(Self(self.0.abs()))
    }

    fn div(&self, rhs: &Self) -> NumResult<Self> {
        debug_assert!(!rhs.0.is_zero());
        // Euclidean quotient: round toward -inf for positive divisors,
        // toward +inf for negative ones, so the remainder stays in [0, |b|).
        let q = &self.0 / &rhs.0;
        let q = if rhs.0.is_positive() {
            q.floor()
        } else {
            q.ceil()
        };
        Ok(Self(q))
    }

    fn modulo(&self, rhs: &Self) -> NumResult<Self> {
        let q = self.div(rhs)?;
        Ok(Self(&self.0 - q.0 * &rhs.0))
    }

    fn rem(&self, rhs: &Self) -> NumResult<Self> {
        debug_assert!(!rhs.0.is_zero());
        let q = (&self.0 / &rhs.0).trunc();
        Ok(Self(&self.0 - q * &rhs.0))
    }

    fn exact_div(&self, rhs: &Self) -> NumResult<Self> {
        debug_assert!(!rhs.0.is_zero());
        Ok(Self(&self.0 / &rhs.0))
    }

    fn floor(&self) -> Self {
        Self(self.0.floor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rat(n: i64) -> Rational {
        Rational::from_i64(n)
    }

    #[test]
    fn euclidean_division_signs() {
        // -8 = 3 * -3 + 1
        assert_eq!(rat(-8).div(&rat(3)).unwrap(), rat(-3));
        assert_eq!(rat(-8).modulo(&rat(3)).unwrap(), rat(1));
        // 8 = -3 * -2 + 2
        assert_eq!(rat(8).div(&rat(-3)).unwrap(), rat(-2));
        assert_eq!(rat(8).modulo(&rat(-3)).unwrap(), rat(2));
        // -8 = -3 * 3 + 1
        assert_eq!(rat(-8).div(&rat(-3)).unwrap(), rat(3));
        assert_eq!(rat(-8).modulo(&rat(-3)).unwrap(), rat(1));
    }

    #[test]
    fn truncated_remainder_follows_dividend() {
        assert_eq!(rat(-8).rem(&rat(3)).unwrap(), rat(-2));
        assert_eq!(rat(8).rem(&rat(-3)).unwrap(), rat(2));
    }

    #[test]
    fn exact_division_is_a_field_op() {
        let half = rat(1).exact_div(&rat(2)).unwrap();
        assert_eq!(half.checked_mul(&rat(2)).unwrap(), rat(1));
    }
}
