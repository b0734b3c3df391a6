//! End-to-end repair and search scenarios driven through the harness.

use num_bigint::BigInt;
use num_rational::BigRational;
use sls_arith::{ArithSls, Harness, Lit, SlsConfig, Sort, TermId};
use sls_num::CheckedInt64;

fn int(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

fn set(engine: &mut ArithSls<CheckedInt64>, ctx: &mut Harness, t: TermId, v: i64) {
    assert!(engine.set_value(ctx, t, &int(v)), "set_value {v} rejected");
}

/// `x + y <= 0` with `x = 3, y = 2`: one repair round satisfies the atom by
/// pulling a variable down past the boundary.
#[test]
fn linear_atom_repair() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let y = ctx.terms_mut().mk_var("y", Sort::Int);
    let sum = ctx.terms_mut().mk_add(vec![x, y]);
    let zero = ctx.terms_mut().mk_int(0);
    let atom = ctx.terms_mut().mk_le(sum, zero);
    let bv = ctx.mk_bool_var(atom);
    ctx.set_assignment(bv, true);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, 3);
    set(&mut engine, &mut ctx, y, 2);
    assert!(!engine.get_ineq(bv).unwrap().is_true());

    ctx.set_assignment(bv, true);
    engine.propagate_literal(&mut ctx, Lit::positive(bv));

    assert!(engine.get_ineq(bv).unwrap().is_true());
    let vx = engine.get_value(&mut ctx, x).unwrap();
    let vy = engine.get_value(&mut ctx, y).unwrap();
    assert!(vx + vy <= int(0));
    engine.invariant(&ctx);
}

/// `x^2 - 4 = 0` from `x = 0`: the quadratic proposer lands exactly on a
/// root (+2 or -2).
#[test]
fn quadratic_atom_repair() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let xx = ctx.terms_mut().mk_mul(vec![x, x]);
    let four = ctx.terms_mut().mk_int(4);
    let atom = ctx.terms_mut().mk_eq(xx, four);
    let bv = ctx.mk_bool_var(atom);
    ctx.set_assignment(bv, true);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    assert!(!engine.get_ineq(bv).unwrap().is_true());

    engine.propagate_literal(&mut ctx, Lit::positive(bv));

    assert!(engine.get_ineq(bv).unwrap().is_true());
    let vx = engine.get_value(&mut ctx, x).unwrap();
    assert!(vx == int(2) || vx == int(-2), "unexpected root {vx}");
    engine.invariant(&ctx);
}

/// `x * y >= 10` with `x = 2, y = 2`: the product occurrence yields a
/// linear move on one factor (for `x`: the residual coefficient is
/// `value(y) = 2`, so the move is `+3`).
#[test]
fn product_atom_repair() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let y = ctx.terms_mut().mk_var("y", Sort::Int);
    let xy = ctx.terms_mut().mk_mul(vec![x, y]);
    let ten = ctx.terms_mut().mk_int(10);
    let atom = ctx.terms_mut().mk_ge(xy, ten);
    let bv = ctx.mk_bool_var(atom);
    ctx.set_assignment(bv, true);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, 2);
    set(&mut engine, &mut ctx, y, 2);
    assert!(!engine.get_ineq(bv).unwrap().is_true());

    ctx.set_assignment(bv, true);
    engine.propagate_literal(&mut ctx, Lit::positive(bv));

    assert!(engine.get_ineq(bv).unwrap().is_true());
    let vx = engine.get_value(&mut ctx, x).unwrap();
    let vy = engine.get_value(&mut ctx, y).unwrap();
    assert!(vx.clone() * vy.clone() >= int(10), "product {vx}*{vy} < 10");
    engine.invariant(&ctx);
}

/// `distinct(x, y)` with `x = y = 3`: repair separates the pair.
#[test]
fn distinct_repair() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let y = ctx.terms_mut().mk_var("y", Sort::Int);
    let atom = ctx.terms_mut().mk_distinct(vec![x, y]);
    let bv = ctx.mk_bool_var(atom);
    ctx.set_assignment(bv, true);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, 3);
    set(&mut engine, &mut ctx, y, 3);

    engine.propagate_literal(&mut ctx, Lit::positive(bv));

    let vx = engine.get_value(&mut ctx, x).unwrap();
    let vy = engine.get_value(&mut ctx, y).unwrap();
    assert_ne!(vx, vy);
}

/// With the 64-bit backend, an update whose product parent overflows is
/// rejected atomically: no value, cached sum, or assignment changes.
#[test]
fn overflow_leaves_state_untouched() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let y = ctx.terms_mut().mk_var("y", Sort::Int);
    let xy = ctx.terms_mut().mk_mul(vec![x, y]);
    let zero = ctx.terms_mut().mk_int(0);
    let atom = ctx.terms_mut().mk_ge(xy, zero);
    let bv = ctx.mk_bool_var(atom);
    ctx.set_assignment(bv, true);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, 1 << 20);

    let before_y = engine.get_value(&mut ctx, y).unwrap();
    let before_notifications = ctx.notifications().len();
    // y := 2^50 makes x*y exceed i64; the dry run must reject the move.
    assert!(!engine.set_value(&mut ctx, y, &int(1 << 50)));
    assert_eq!(engine.get_value(&mut ctx, y).unwrap(), before_y);
    assert_eq!(ctx.notifications().len(), before_notifications);
    engine.invariant(&ctx);
}

/// The global lookahead search satisfies a small conjunction of input
/// assertions starting from a falsifying state.
#[test]
fn global_search_satisfies_assertions() {
    let mut ctx = Harness::with_seed(7);
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let y = ctx.terms_mut().mk_var("y", Sort::Int);
    let sum = ctx.terms_mut().mk_add(vec![x, y]);
    let zero = ctx.terms_mut().mk_int(0);
    let five = ctx.terms_mut().mk_int(5);
    let le = ctx.terms_mut().mk_le(sum, zero);
    let ge = ctx.terms_mut().mk_ge(x, five);
    let bv_le = ctx.mk_bool_var(le);
    let bv_ge = ctx.mk_bool_var(ge);
    ctx.add_clause(&[Lit::positive(bv_le)]);
    ctx.add_clause(&[Lit::positive(bv_ge)]);
    ctx.add_assertion(le);
    ctx.add_assertion(ge);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, le);
    engine.register_term(&mut ctx, ge);
    set(&mut engine, &mut ctx, x, 3);
    set(&mut engine, &mut ctx, y, 2);
    engine.initialize(&mut ctx);
    engine.start_propagation(&mut ctx);

    let vx = engine.get_value(&mut ctx, x).unwrap();
    let vy = engine.get_value(&mut ctx, y).unwrap();
    assert!(
        vx.clone() + vy.clone() <= int(0) && vx >= int(5),
        "search left x={vx}, y={vy}"
    );
}

/// Cancellation: raising the flag stops the search loop promptly while
/// keeping state consistent.
#[test]
fn cancellation_stops_search() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let zero = ctx.terms_mut().mk_int(0);
    let atom = ctx.terms_mut().mk_le(x, zero);
    let bv = ctx.mk_bool_var(atom);
    ctx.add_clause(&[Lit::positive(bv)]);
    ctx.add_assertion(atom);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, 1);
    ctx.cancel();
    engine.start_propagation(&mut ctx);
    assert_eq!(engine.stats().moves, 0);
    engine.invariant(&ctx);
}

/// `collect_statistics` accumulates the flip and move counters.
#[test]
fn statistics_are_reported() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let zero = ctx.terms_mut().mk_int(0);
    let atom = ctx.terms_mut().mk_le(x, zero);
    let bv = ctx.mk_bool_var(atom);
    ctx.set_assignment(bv, true);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, 4);
    ctx.set_assignment(bv, true);
    engine.propagate_literal(&mut ctx, Lit::positive(bv));
    assert!(engine.get_ineq(bv).unwrap().is_true());

    let mut st = sls_arith::Statistics::new();
    engine.collect_statistics(&mut st);
    assert!(st.get("sls-arith-flips") >= 1);
    engine.reset_statistics();
    let mut st2 = sls_arith::Statistics::new();
    engine.collect_statistics(&mut st2);
    assert_eq!(st2.get("sls-arith-flips"), 0);
}

/// Unit literals install bounds, and bounded moves are clamped rather than
/// crossing their bound.
#[test]
fn unit_bounds_are_respected() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let zero = ctx.terms_mut().mk_int(0);
    let ten = ctx.terms_mut().mk_int(10);
    // x >= 0 as a unit clause, x <= 10 as the atom to repair.
    let ge = ctx.terms_mut().mk_ge(x, zero);
    let le = ctx.terms_mut().mk_le(x, ten);
    let bv_ge = ctx.mk_bool_var(ge);
    let bv_le = ctx.mk_bool_var(le);
    ctx.add_clause(&[Lit::positive(bv_ge)]);
    ctx.set_assignment(bv_ge, true);
    ctx.set_assignment(bv_le, true);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, ge);
    engine.register_term(&mut ctx, le);
    engine.initialize(&mut ctx);
    set(&mut engine, &mut ctx, x, 25);

    ctx.set_assignment(bv_le, true);
    engine.propagate_literal(&mut ctx, Lit::positive(bv_le));
    let vx = engine.get_value(&mut ctx, x).unwrap();
    assert!(vx >= int(0), "lower bound crossed: x={vx}");
    assert!(vx <= int(10), "atom still false: x={vx}");
}

/// `set_value` with the current value is a no-op that succeeds.
#[test]
fn idempotent_set_value() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let zero = ctx.terms_mut().mk_int(0);
    let atom = ctx.terms_mut().mk_le(x, zero);
    ctx.mk_bool_var(atom);

    let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, -7);
    let before = ctx.notifications().len();
    assert!(engine.set_value(&mut ctx, x, &int(-7)));
    assert_eq!(ctx.notifications().len(), before);
}

/// A custom configuration flows through: disabling lookahead turns
/// `start_propagation` into a no-op.
#[test]
fn lookahead_gate() {
    let mut ctx = Harness::new();
    let x = ctx.terms_mut().mk_var("x", Sort::Int);
    let zero = ctx.terms_mut().mk_int(0);
    let atom = ctx.terms_mut().mk_le(x, zero);
    let bv = ctx.mk_bool_var(atom);
    ctx.add_clause(&[Lit::positive(bv)]);
    ctx.add_assertion(atom);

    let config = SlsConfig {
        use_lookahead: false,
        ..SlsConfig::default()
    };
    let mut engine: ArithSls<CheckedInt64> = ArithSls::with_config(config);
    engine.register_term(&mut ctx, atom);
    set(&mut engine, &mut ctx, x, 1);
    engine.start_propagation(&mut ctx);
    assert_eq!(engine.stats().moves, 0);
}
