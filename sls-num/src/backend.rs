//! The backend contract.

use crate::error::NumResult;
use num_rational::BigRational;
use std::fmt;

/// Signed arithmetic as required by the search engine.
///
/// Implementations must be totally ordered and must report unrepresentable
/// results through [`NumResult`] rather than wrapping or panicking. All
/// division entry points require a non-zero divisor; the engine guards the
/// zero case itself (division by zero evaluates to 0 at the term level).
pub trait Num: Clone + Eq + Ord + fmt::Debug + fmt::Display {
    /// The additive identity.
    fn zero() -> Self;

    /// The multiplicative identity.
    fn one() -> Self;

    /// Embed a machine integer.
    fn from_i64(n: i64) -> Self;

    /// Convert from an exact rational. Fails with `Overflow` when the value
    /// does not fit the backend (non-integral or out of range).
    fn from_rational(r: &BigRational) -> NumResult<Self>;

    /// Exact rational view of the value.
    fn to_rational(&self) -> BigRational;

    /// Lossy conversion used by floating-point scoring.
    fn to_f64(&self) -> f64;

    /// `self + rhs`.
    fn checked_add(&self, rhs: &Self) -> NumResult<Self>;

    /// `self - rhs`.
    fn checked_sub(&self, rhs: &Self) -> NumResult<Self>;

    /// `self * rhs`.
    fn checked_mul(&self, rhs: &Self) -> NumResult<Self>;

    /// `-self`.
    fn checked_neg(&self) -> NumResult<Self>;

    /// `|self|`.
    fn checked_abs(&self) -> NumResult<Self>;

    /// Euclidean quotient: the unique `q` with `self = q*rhs + r` and
    /// `0 <= r < |rhs|`.
    fn div(&self, rhs: &Self) -> NumResult<Self>;

    /// Euclidean remainder, always in `[0, |rhs|)`.
    fn modulo(&self, rhs: &Self) -> NumResult<Self>;

    /// Truncated remainder (sign of the dividend).
    fn rem(&self, rhs: &Self) -> NumResult<Self>;

    /// Field division for rationals; truncated quotient for integers.
    fn exact_div(&self, rhs: &Self) -> NumResult<Self>;

    /// Largest integral value not above `self`. Identity on integer backends.
    fn floor(&self) -> Self;

    /// `self == 0`.
    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// `self < 0`.
    fn is_negative(&self) -> bool {
        *self < Self::zero()
    }

    /// `self > 0`.
    fn is_positive(&self) -> bool {
        *self > Self::zero()
    }
}
