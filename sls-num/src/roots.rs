//! Integer root extraction helpers.

use crate::backend::Num;
use crate::error::NumResult;

/// `x^k` by binary exponentiation. `power_of(x, 0)` is 1.
pub fn power_of<N: Num>(x: &N, k: u32) -> NumResult<N> {
    if k == 0 {
        return Ok(N::one());
    }
    let mut x = x.clone();
    let mut r = N::one();
    let mut k = k;
    while k > 1 {
        if k % 2 == 1 {
            r = x.checked_mul(&r)?;
            k -= 1;
        }
        x = x.checked_mul(&x)?;
        k /= 2;
    }
    x.checked_mul(&r)
}

/// Integer k-th root by Newton iteration, halted once the iterates stop
/// decreasing: `x_{n+1} = ((k-1)*x_n + a / x_n^(k-1)) / k`.
///
/// For `a >= 0` and `k >= 1` the result `r` satisfies
/// `r^k <= a < (r+1)^k`. Values `a <= 1` are returned unchanged.
pub fn root_of<N: Num>(k: u32, a: &N) -> NumResult<N> {
    if *a <= N::one() || k == 1 {
        return Ok(a.clone());
    }
    let kn = N::from_i64(i64::from(k));
    if *a <= kn {
        return Ok(N::one());
    }
    let km1 = N::from_i64(i64::from(k) - 1);
    let step = |x: &N| -> NumResult<N> {
        let t = x.checked_mul(&km1)?.checked_add(&a.div(&power_of(x, k - 1)?)?)?;
        t.div(&kn)
    };
    let mut x0 = a.div(&kn)?;
    let mut x1 = step(&x0)?;
    while x1 < x0 {
        x0 = x1;
        x1 = step(&x0)?;
    }
    Ok(x0)
}

/// Integer square root by the recursive refinement
/// `sqrt(d) = 2*sqrt(d div 4) + {0, 1}`.
pub fn int_sqrt<N: Num>(d: &N) -> NumResult<N> {
    if *d <= N::one() {
        return Ok(d.clone());
    }
    let four = N::from_i64(4);
    let two = N::from_i64(2);
    let sq = two
        .checked_mul(&int_sqrt(&d.div(&four)?)?)?
        .checked_add(&N::one())?;
    if sq.checked_mul(&sq)? <= *d {
        Ok(sq)
    } else {
        sq.checked_sub(&N::one())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckedInt64;

    fn n(v: i64) -> CheckedInt64 {
        CheckedInt64::new(v)
    }

    #[test]
    fn sqrt_small_values() {
        for (d, r) in [(0, 0), (1, 1), (2, 1), (3, 1), (4, 2), (8, 2), (9, 3), (10, 3)] {
            assert_eq!(int_sqrt(&n(d)).unwrap(), n(r), "sqrt({d})");
        }
    }

    #[test]
    fn cube_root() {
        assert_eq!(root_of(3, &n(27)).unwrap(), n(3));
        assert_eq!(root_of(3, &n(26)).unwrap(), n(2));
        assert_eq!(root_of(3, &n(28)).unwrap(), n(3));
    }

    #[test]
    fn power_edge_cases() {
        assert_eq!(power_of(&n(5), 0).unwrap(), n(1));
        assert_eq!(power_of(&n(5), 1).unwrap(), n(5));
        assert_eq!(power_of(&n(-2), 3).unwrap(), n(-8));
        assert!(power_of(&n(1 << 32), 2).is_err());
    }
}
