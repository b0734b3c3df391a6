//! Bound and finite-domain extraction from the input.
//!
//! Runs once before searching: unit literals install direct bounds, sum and
//! product definitions get interval-arithmetic bounds from their children,
//! `ite`/`mod`/`abs` contribute structural bounds, and top-level
//! disjunctions of equalities against numerals become finite domains.

use super::node::{Bound, Def, IneqKind, OpKind, VarId};
use super::ArithSls;
use crate::ast::TermKind;
use crate::context::SearchContext;
use crate::literal::Lit;
use crate::TermId;
use sls_num::{power_of, Num};
use tracing::trace;

impl<N: Num> ArithSls<N> {
    /// Install bounds and finite domains for every variable.
    pub fn initialize(&mut self, ctx: &mut dyn SearchContext) {
        for lit in ctx.unit_literals() {
            self.initialize_unit(ctx, lit);
        }
        for f in ctx.input_assertions() {
            self.initialize_input_assertion(ctx, f);
        }
        for v in 0..self.vars.len() {
            if self.vars[v].lo.is_some() || self.vars[v].hi.is_some() {
                continue;
            }
            self.initialize_var_bounds(ctx, v);
        }
    }

    fn initialize_var_bounds(&mut self, ctx: &mut dyn SearchContext, v: VarId) {
        let zero = N::zero();
        let def = self.vars[v].def;

        if let Some(Def::Sum(i)) = def {
            let (coeff, args) = {
                let sd = &self.sums[i];
                (sd.coeff.clone(), sd.args.clone())
            };
            let mut lo = coeff.clone();
            let mut hi = coeff;
            let mut lo_valid = true;
            let mut hi_valid = true;
            let mut lo_strict = false;
            let mut hi_strict = false;
            for (c, w) in &args {
                if !lo_valid && !hi_valid {
                    break;
                }
                let wlo = self.vars[*w].lo.clone();
                let whi = self.vars[*w].hi.clone();
                if lo_valid {
                    let contrib = if *c > zero { &wlo } else { &whi };
                    match contrib {
                        Some(b) => match c.checked_mul(&b.value).and_then(|t| lo.checked_add(&t)) {
                            Ok(l) => {
                                lo = l;
                                lo_strict |= b.strict;
                            }
                            Err(_) => lo_valid = false,
                        },
                        None => lo_valid = false,
                    }
                }
                if hi_valid {
                    let contrib = if *c > zero { &whi } else { &wlo };
                    match contrib {
                        Some(b) => match c.checked_mul(&b.value).and_then(|t| hi.checked_add(&t)) {
                            Ok(h) => {
                                hi = h;
                                hi_strict |= b.strict;
                            }
                            Err(_) => hi_valid = false,
                        },
                        None => hi_valid = false,
                    }
                }
            }
            if lo_valid {
                if lo_strict {
                    self.add_gt(v, lo);
                } else {
                    self.add_ge(v, lo);
                }
            }
            if hi_valid {
                if hi_strict {
                    self.add_lt(v, hi);
                } else {
                    self.add_le(v, hi);
                }
            }
        }

        if let Some(Def::Mul(i)) = def {
            let monomial = self.muls[i].monomial.clone();
            let mut lo = N::one();
            let mut hi = N::one();
            let mut lo_valid = true;
            let mut hi_valid = true;
            for (w, p) in &monomial {
                if !lo_valid {
                    break;
                }
                match self.vars[*w].lo.clone() {
                    Some(b) if !b.strict && !b.value.is_negative() => {
                        match power_of(&b.value, *p).and_then(|pw| lo.checked_mul(&pw)) {
                            Ok(l) => lo = l,
                            Err(_) => lo_valid = false,
                        }
                    }
                    _ => lo_valid = false,
                }
            }
            for (w, p) in &monomial {
                if !lo_valid && !hi_valid {
                    break;
                }
                match self.vars[*w].hi.clone() {
                    Some(b) if !b.strict => {
                        match power_of(&b.value, *p).and_then(|pw| hi.checked_mul(&pw)) {
                            Ok(h) => hi = h,
                            Err(_) => hi_valid = false,
                        }
                    }
                    _ => hi_valid = false,
                }
            }
            if lo_valid {
                self.add_ge(v, lo);
            }
            if lo_valid && hi_valid {
                self.add_le(v, hi);
            }
        }

        let e = self.vars[v].term;
        if let TermKind::Ite(_, th, el) = ctx.kind(e).clone() {
            let (Some(&vth), Some(&vel)) =
                (self.term_to_var.get(&th), self.term_to_var.get(&el))
            else {
                return;
            };
            let th_lo = self.vars[vth].lo.clone();
            let el_lo = self.vars[vel].lo.clone();
            if let (Some(a), Some(b)) = (th_lo, el_lo) {
                if !a.strict && !b.strict {
                    self.add_ge(v, a.value.min(b.value));
                }
            }
            let th_hi = self.vars[vth].hi.clone();
            let el_hi = self.vars[vel].hi.clone();
            if let (Some(a), Some(b)) = (th_hi, el_hi) {
                if !a.strict && !b.strict {
                    self.add_le(v, a.value.max(b.value));
                }
            }
        }

        if let Some(Def::Op(i)) = def {
            let od = self.ops[i];
            match od.kind {
                OpKind::Mod => {
                    let d_lo = self.vars[od.arg2].lo.clone();
                    let d_hi = self.vars[od.arg2].hi.clone();
                    if let (Some(lo), Some(hi)) = (d_lo, d_hi) {
                        if lo.value == hi.value && lo.value.is_positive() {
                            if let Ok(m) = lo.value.checked_sub(&N::one()) {
                                self.add_le(v, m);
                            }
                            self.add_ge(v, N::zero());
                        }
                    }
                }
                OpKind::Abs => self.add_ge(v, N::zero()),
                _ => {}
            }
        }
    }

    /// Install a direct bound from a single-variable unit literal with a
    /// unit coefficient.
    pub(crate) fn initialize_unit(&mut self, ctx: &mut dyn SearchContext, lit: Lit) {
        self.init_bool_var(ctx, lit.var());
        let Some(ineq) = self.get_ineq(lit.var()) else {
            return;
        };
        if ineq.args.len() != 1 {
            return;
        }
        let (c, v) = ineq.args[0].clone();
        let coeff = ineq.coeff.clone();
        let op = ineq.op;
        let one = N::one();
        let minus_one = N::from_i64(-1);
        let Ok(neg_coeff) = coeff.checked_neg() else {
            return;
        };
        match op {
            IneqKind::Le => {
                if lit.sign() {
                    // -(x) + coeff <= 0 negated: x bounded above by coeff.
                    if c == minus_one {
                        self.add_le(v, coeff);
                    } else if c == one {
                        self.add_ge(v, neg_coeff);
                    } else {
                        trace!(lit = %lit, "unit bound skipped: non-unit coefficient");
                    }
                } else if c == minus_one {
                    self.add_ge(v, coeff);
                } else if c == one {
                    self.add_le(v, neg_coeff);
                } else {
                    trace!(lit = %lit, "unit bound skipped: non-unit coefficient");
                }
            }
            IneqKind::Eq => {
                if !lit.sign() {
                    if c == minus_one {
                        self.add_ge(v, coeff.clone());
                        self.add_le(v, coeff);
                    } else if c == one {
                        self.add_ge(v, neg_coeff.clone());
                        self.add_le(v, neg_coeff);
                    } else {
                        trace!(lit = %lit, "unit bound skipped: non-unit coefficient");
                    }
                }
            }
            IneqKind::Lt => {
                if lit.sign() {
                    if c == minus_one {
                        self.add_le(v, coeff);
                    } else if c == one {
                        self.add_ge(v, neg_coeff);
                    } else {
                        trace!(lit = %lit, "unit bound skipped: non-unit coefficient");
                    }
                } else if c == minus_one {
                    self.add_gt(v, coeff);
                } else if c == one {
                    self.add_lt(v, neg_coeff);
                } else {
                    trace!(lit = %lit, "unit bound skipped: non-unit coefficient");
                }
            }
        }
    }

    /// A top-level disjunction of `x = numeral` over a single variable
    /// installs a finite domain on `x`.
    pub(crate) fn initialize_input_assertion(&mut self, ctx: &mut dyn SearchContext, f: TermId) {
        let TermKind::Or(args) = ctx.kind(f).clone() else {
            return;
        };
        let mut var: Option<VarId> = None;
        let mut values: Vec<N> = Vec::new();
        for arg in args {
            let TermKind::Eq(x, y) = ctx.kind(arg).clone() else {
                return;
            };
            let TermKind::Numeral(r) = ctx.kind(y).clone() else {
                return;
            };
            let Ok(n) = N::from_rational(&r) else {
                return;
            };
            let Some(&w) = self.term_to_var.get(&x) else {
                return;
            };
            match var {
                None => {
                    var = Some(w);
                    values.push(n);
                }
                Some(v0) if v0 == w => values.push(n),
                _ => return,
            }
        }
        if let Some(v) = var {
            self.vars[v].finite_domain.extend(values);
        }
    }

    /// Tighten the upper bound to `n` (non-strict) if it improves.
    pub(crate) fn add_le(&mut self, v: VarId, n: N) {
        if let Some(hi) = &self.vars[v].hi {
            if hi.value <= n {
                return;
            }
        }
        self.vars[v].hi = Some(Bound {
            strict: false,
            value: n,
        });
    }

    /// Tighten the lower bound to `n` (non-strict) if it improves.
    pub(crate) fn add_ge(&mut self, v: VarId, n: N) {
        if let Some(lo) = &self.vars[v].lo {
            if lo.value >= n {
                return;
            }
        }
        self.vars[v].lo = Some(Bound {
            strict: false,
            value: n,
        });
    }

    /// Strict upper bound; tightened to `n - 1` on integers.
    pub(crate) fn add_lt(&mut self, v: VarId, n: N) {
        if self.is_int_var(v) {
            if let Ok(m) = n.checked_sub(&N::one()) {
                self.add_le(v, m);
            }
        } else {
            self.vars[v].hi = Some(Bound {
                strict: true,
                value: n,
            });
        }
    }

    /// Strict lower bound; tightened to `n + 1` on integers.
    pub(crate) fn add_gt(&mut self, v: VarId, n: N) {
        if self.is_int_var(v) {
            if let Ok(m) = n.checked_add(&N::one()) {
                self.add_ge(v, m);
            }
        } else {
            self.vars[v].lo = Some(Bound {
                strict: true,
                value: n,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Sort;
    use crate::context::Harness;
    use crate::engine::ArithSls;
    use sls_num::CheckedInt64;

    fn n(v: i64) -> CheckedInt64 {
        CheckedInt64::new(v)
    }

    #[test]
    fn unit_literals_install_bounds() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let zero = ctx.terms_mut().mk_int(0);
        let five = ctx.terms_mut().mk_int(5);
        let ge = ctx.terms_mut().mk_ge(x, zero);
        let lt = ctx.terms_mut().mk_lt(x, five);
        let bv_ge = ctx.mk_bool_var(ge);
        let bv_lt = ctx.mk_bool_var(lt);
        ctx.add_clause(&[Lit::positive(bv_ge)]);
        ctx.add_clause(&[Lit::positive(bv_lt)]);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, ge);
        engine.register_term(&mut ctx, lt);
        engine.initialize(&mut ctx);

        let v = *engine.term_to_var.get(&x).unwrap();
        let lo = engine.vars[v].lo.clone().unwrap();
        let hi = engine.vars[v].hi.clone().unwrap();
        assert_eq!(lo.value, n(0));
        assert!(!lo.strict);
        // Strict integer bound x < 5 tightens to x <= 4.
        assert_eq!(hi.value, n(4));
        assert!(!hi.strict);
    }

    #[test]
    fn abs_gets_a_zero_lower_bound() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let a = ctx.terms_mut().mk_abs(x);
        let ten = ctx.terms_mut().mk_int(10);
        let atom = ctx.terms_mut().mk_le(a, ten);
        ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        engine.initialize(&mut ctx);

        let v = *engine.term_to_var.get(&a).unwrap();
        let lo = engine.vars[v].lo.clone().unwrap();
        assert_eq!(lo.value, n(0));
    }

    #[test]
    fn mod_with_pinned_divisor_is_bounded() {
        let mut ctx = Harness::new();
        let y = ctx.terms_mut().mk_var("y", Sort::Int);
        let seven = ctx.terms_mut().mk_int(7);
        // Pin y = 7 through a unit equality first, so the divisor variable
        // carries bounds before the mod node is visited.
        let eq = ctx.terms_mut().mk_eq(y, seven);
        let bv_eq = ctx.mk_bool_var(eq);
        ctx.add_clause(&[Lit::positive(bv_eq)]);

        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let m = ctx.terms_mut().mk_mod(x, y);
        let hundred = ctx.terms_mut().mk_int(100);
        let atom = ctx.terms_mut().mk_le(m, hundred);
        ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, eq);
        engine.register_term(&mut ctx, atom);
        engine.initialize(&mut ctx);

        let v = *engine.term_to_var.get(&m).unwrap();
        let lo = engine.vars[v].lo.clone().unwrap();
        let hi = engine.vars[v].hi.clone().unwrap();
        assert_eq!(lo.value, n(0));
        assert_eq!(hi.value, n(6));
    }

    #[test]
    fn equality_disjunction_becomes_a_finite_domain() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let zero = ctx.terms_mut().mk_int(0);
        let atom0 = ctx.terms_mut().mk_le(x, zero);
        ctx.mk_bool_var(atom0);

        let a = ctx.terms_mut().mk_int(2);
        let b = ctx.terms_mut().mk_int(5);
        let eq_a = ctx.terms_mut().mk_eq(x, a);
        let eq_b = ctx.terms_mut().mk_eq(x, b);
        let disj = ctx.terms_mut().mk_or(vec![eq_a, eq_b]);
        ctx.add_assertion(disj);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom0);
        engine.initialize(&mut ctx);

        let v = *engine.term_to_var.get(&x).unwrap();
        assert_eq!(engine.vars[v].finite_domain, vec![n(2), n(5)]);
    }
}
