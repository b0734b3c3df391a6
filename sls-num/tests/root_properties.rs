//! Property-based tests for root extraction and the division laws the
//! search engine relies on.

use num_bigint::BigInt;
use num_rational::BigRational;
use proptest::prelude::*;
use sls_num::{int_sqrt, power_of, root_of, CheckedInt64, Num, Rational};

fn n(v: i64) -> CheckedInt64 {
    CheckedInt64::new(v)
}

fn nonzero_divisor() -> impl Strategy<Value = i64> {
    prop::sample::select(vec![-11i64, -7, -3, -2, -1, 1, 2, 3, 5, 11])
}

proptest! {
    #[test]
    fn sqrt_brackets_its_argument(a in 0i64..1_000_000_000) {
        let r = int_sqrt(&n(a)).unwrap().get();
        prop_assert!(r * r <= a);
        prop_assert!((r + 1) * (r + 1) > a);
    }

    #[test]
    fn kth_root_brackets_its_argument(a in 0i64..1_000_000_000, k in 1u32..5) {
        let r = root_of(k, &n(a)).unwrap();
        prop_assert!(power_of(&r, k).unwrap() <= n(a));
        let r1 = r.checked_add(&n(1)).unwrap();
        prop_assert!(power_of(&r1, k).unwrap() > n(a));
    }

    #[test]
    fn integer_division_is_euclidean(
        a in -1_000_000i64..1_000_000,
        b in nonzero_divisor(),
    ) {
        let q = n(a).div(&n(b)).unwrap().get();
        let m = n(a).modulo(&n(b)).unwrap().get();
        prop_assert_eq!(q * b + m, a);
        prop_assert!(0 <= m && m < b.abs());
    }

    #[test]
    fn truncated_remainder_has_dividend_sign(
        a in -1_000_000i64..1_000_000,
        b in nonzero_divisor(),
    ) {
        let r = n(a).rem(&n(b)).unwrap().get();
        prop_assert_eq!(r, a % b);
    }

    #[test]
    fn rational_division_agrees_with_integer_division(
        a in -10_000i64..10_000,
        b in nonzero_divisor(),
    ) {
        let q_int = n(a).div(&n(b)).unwrap().get();
        let q_rat = Rational::from_i64(a).div(&Rational::from_i64(b)).unwrap();
        prop_assert_eq!(
            q_rat.to_rational(),
            BigRational::from_integer(BigInt::from(q_int))
        );
        let m_int = n(a).modulo(&n(b)).unwrap().get();
        let m_rat = Rational::from_i64(a)
            .modulo(&Rational::from_i64(b))
            .unwrap();
        prop_assert_eq!(
            m_rat.to_rational(),
            BigRational::from_integer(BigInt::from(m_int))
        );
    }

    #[test]
    fn power_matches_repeated_multiplication(x in -50i64..50, k in 0u32..6) {
        let mut expected = 1i128;
        for _ in 0..k {
            expected *= i128::from(x);
        }
        let got = power_of(&n(x), k).unwrap().get();
        prop_assert_eq!(i128::from(got), expected);
    }

    #[test]
    fn rational_roots_match_integer_roots(a in 0i64..1_000_000, k in 1u32..4) {
        let ri = root_of(k, &n(a)).unwrap().get();
        let rr = root_of(k, &Rational::from_i64(a)).unwrap();
        prop_assert_eq!(rr.to_rational(), BigRational::from_integer(BigInt::from(ri)));
    }
}
