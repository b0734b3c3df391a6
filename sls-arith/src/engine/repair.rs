//! Local repair of false atoms and mis-evaluated definitions.
//!
//! `repair` is the entry point for a true-assigned literal whose atom is
//! false: it tries non-linear moves, then retries with tabu disabled, and
//! falls back to randomised resets. `repair_down` dispatches to per-op
//! routines that move a definition's inputs so the stored result matches.

use super::node::{Def, NlCoeff, OpDef, OpKind, VarId};
use super::ArithSls;
use crate::ast::{TermId, TermKind};
use crate::context::SearchContext;
use crate::literal::Lit;
use sls_num::{power_of, root_of, Num, NumResult};
use tracing::{debug, trace};

impl<N: Num> ArithSls<N> {
    /// Repair the atom under a literal assigned true. Returns whether some
    /// move was committed.
    pub fn repair(&mut self, ctx: &mut dyn SearchContext, lit: Lit) -> bool {
        self.last_literal = Some(lit);
        if self.find_nl_moves(ctx, lit) {
            return true;
        }
        self.without_tabu(|this| this.find_reset_moves(ctx, lit))
    }

    /// Value of a product definition with one factor variable left out.
    pub(crate) fn mul_value_without(&self, m: VarId, x: VarId) -> NumResult<N> {
        let Some(Def::Mul(idx)) = self.vars[m].def else {
            return Ok(N::one());
        };
        let md = &self.muls[idx];
        debug_assert_eq!(md.var, m);
        let mut r = N::one();
        for (y, p) in &md.monomial {
            if *y != x {
                r = r.checked_mul(&power_of(self.value(*y), *p)?)?;
            }
        }
        Ok(r)
    }

    /// Coefficient of `x` when the occurrence group is linear in `x`;
    /// `None` when a higher power occurs or the coefficient vanishes.
    pub(crate) fn linear_coeff(&self, x: VarId, nl: &[NlCoeff<N>]) -> NumResult<Option<N>> {
        if nl.len() == 1 && nl[0].var == x {
            return Ok(Some(nl[0].coeff.clone()));
        }
        let mut b = N::zero();
        for e in nl {
            if e.power > 1 {
                return Ok(None);
            }
            if e.var == x {
                b = b.checked_add(&e.coeff)?;
            } else {
                b = b.checked_add(&e.coeff.checked_mul(&self.mul_value_without(e.var, x)?)?)?;
            }
        }
        Ok(if b.is_zero() { None } else { Some(b) })
    }

    /// Coefficients `(a, b)` when the group is quadratic in `x`: powers 1
    /// contribute to `b`, powers 2 to `a`. `None` on power 3 or higher, or
    /// when both coefficients vanish.
    pub(crate) fn quadratic_coeffs(
        &self,
        x: VarId,
        nl: &[NlCoeff<N>],
    ) -> NumResult<Option<(N, N)>> {
        let mut a = N::zero();
        let mut b = N::zero();
        for e in nl {
            match e.power {
                1 => {
                    if e.var == x {
                        b = b.checked_add(&e.coeff)?;
                    } else {
                        b = b.checked_add(
                            &e.coeff.checked_mul(&self.mul_value_without(e.var, x)?)?,
                        )?;
                    }
                }
                2 => {
                    debug_assert_ne!(e.var, x);
                    a = a.checked_add(&e.coeff.checked_mul(&self.mul_value_without(e.var, x)?)?)?;
                }
                _ => return Ok(None),
            }
        }
        Ok(if a.is_zero() && b.is_zero() {
            None
        } else {
            Some((a, b))
        })
    }

    /// Propose linear or quadratic moves for every inner variable of the
    /// literal's atom and commit one.
    pub(crate) fn find_nl_moves(&mut self, ctx: &mut dyn SearchContext, lit: Lit) -> bool {
        self.updates.clear();
        let Some(ineq) = self.get_ineq(lit.var()) else {
            return false;
        };
        let nonlinear = ineq.nonlinear.clone();
        let args_value = ineq.args_value.clone();
        for (x, nl) in &nonlinear {
            if self.is_fixed_var(*x) {
                continue;
            }
            match self.linear_coeff(*x, nl) {
                Ok(Some(b)) => {
                    let _ = self.find_linear_moves(lit.var(), *x, &b);
                }
                Ok(None) => {
                    if let Ok(Some((a, b))) = self.quadratic_coeffs(*x, nl) {
                        let _ = self.find_quadratic_moves(lit.var(), *x, &a, &b, &args_value);
                    }
                }
                Err(_) => {}
            }
        }
        self.apply_update(ctx)
    }

    /// Reset every inner variable of the literal's atom to a small random
    /// value and commit one of the proposals.
    pub(crate) fn find_reset_moves(&mut self, ctx: &mut dyn SearchContext, lit: Lit) -> bool {
        self.updates.clear();
        let Some(ineq) = self.get_ineq(lit.var()) else {
            return false;
        };
        let inner: Vec<VarId> = ineq.nonlinear.iter().map(|(x, _)| *x).collect();
        for x in inner {
            self.add_reset_update(ctx, x);
        }
        trace!(lit = %lit, candidates = self.updates.len(), "reset moves");
        self.apply_update(ctx)
    }

    /// Move a definition's inputs so its stored value matches, dispatching
    /// on the definition kind. Tabu is disabled for the attempt.
    pub fn repair_down(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> bool {
        let Some(&v) = self.term_to_var.get(&t) else {
            return false;
        };
        let Some(def) = self.vars[v].def else {
            return false;
        };
        self.without_tabu(|this| {
            let r = match def {
                Def::Sum(i) => this.repair_add(ctx, i),
                Def::Mul(i) => this.repair_mul(ctx, i),
                Def::Op(i) => {
                    let od = this.ops[i];
                    match od.kind {
                        OpKind::Mod => this.repair_mod(ctx, od),
                        OpKind::Rem => this.repair_rem(ctx, od),
                        OpKind::IntDiv => this.repair_idiv(ctx, od),
                        OpKind::Div => this.repair_div(ctx, od),
                        OpKind::Power => this.repair_power(ctx, od),
                        OpKind::Abs => this.repair_abs(ctx, od),
                        OpKind::ToInt => this.repair_to_int(ctx, od),
                        OpKind::ToReal => this.repair_to_real(ctx, od),
                    }
                }
            };
            r.unwrap_or(false)
        })
    }

    fn repair_add(&mut self, ctx: &mut dyn SearchContext, idx: usize) -> NumResult<bool> {
        let (v, coeff, args) = {
            let sd = &self.sums[idx];
            (sd.var, sd.coeff.clone(), sd.args.clone())
        };
        let val = self.value(v).clone();
        let mut sum = coeff;
        for (c, w) in &args {
            sum = sum.checked_add(&c.checked_mul(self.value(*w))?)?;
        }
        if val == sum {
            return Ok(true);
        }

        self.updates.clear();
        for (c, w) in &args {
            let delta = self.divide(*w, &val.checked_sub(&sum)?, c)?;
            if val == sum.checked_add(&c.checked_mul(&delta)?)? {
                self.add_update(*w, delta);
            }
        }
        if self.apply_update(ctx) {
            return Ok(self.eval_is_correct(v).unwrap_or(false));
        }

        let done = self.without_tabu(|this| -> NumResult<bool> {
            this.updates.clear();
            for (c, w) in &args {
                let delta = this.divide(*w, &val.checked_sub(&sum)?, c)?;
                if val != sum.checked_add(&c.checked_mul(&delta)?)? {
                    this.add_update(*w, delta);
                }
            }
            for (_, w) in &args {
                this.add_reset_update(ctx, *w);
            }
            Ok(this.apply_update(ctx))
        })?;
        if done {
            return Ok(self.eval_is_correct(v).unwrap_or(false));
        }

        Ok(self.update(ctx, v, &sum))
    }

    fn repair_mul(&mut self, ctx: &mut dyn SearchContext, idx: usize) -> NumResult<bool> {
        let (v, monomial) = {
            let md = &self.muls[idx];
            (md.var, md.monomial.clone())
        };
        let val = self.value(v).clone();
        let mut product = N::one();
        for (w, p) in &monomial {
            product = product.checked_mul(&power_of(self.value(*w), *p)?)?;
        }
        if product == val {
            return Ok(true);
        }
        debug!(var = v, value = %val, product = %product, "repair product");

        let zero = N::zero();
        let one = N::one();
        self.updates.clear();
        if val.is_zero() {
            for (x, _) in &monomial {
                let d = self.value(*x).checked_neg()?;
                self.add_update(*x, d);
            }
        } else if val == one || val == N::from_i64(-1) {
            for (x, _) in &monomial {
                let d = one.checked_sub(self.value(*x))?;
                self.add_update(*x, d);
                let d = N::from_i64(-1).checked_sub(self.value(*x))?;
                self.add_update(*x, d);
            }
        } else {
            for (x, p) in &monomial {
                let mx = self.mul_value_without(v, *x)?;
                if mx == zero {
                    continue;
                }
                let valmx = self.divide(*x, &val, &mx)?;
                let r = root_of(*p, &valmx)?;
                let d = r.checked_sub(self.value(*x))?;
                self.add_update(*x, d);
                if p % 2 == 0 {
                    let d = r.checked_neg()?.checked_sub(self.value(*x))?;
                    self.add_update(*x, d);
                }
            }
        }

        if self.apply_update(ctx) {
            return Ok(self.eval_is_correct(v).unwrap_or(false));
        }

        let done = self.without_tabu(|this| {
            this.updates.clear();
            for (x, _) in &monomial {
                this.add_reset_update(ctx, *x);
            }
            this.apply_update(ctx)
        });
        if done {
            return Ok(self.eval_is_correct(v).unwrap_or(false));
        }

        Ok(self.update(ctx, v, &product))
    }

    fn repair_mod(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        let val = self.value(od.var).clone();
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        // Repair the first argument when the stored value is a feasible
        // remainder for the current divisor.
        if !val.is_negative() && val < v2 {
            let v3 = v1.modulo(&v2)?;
            if v3 == val {
                return Ok(true);
            }
            // mod(v1 + r, v2) = val for r = val - v3, up to a multiple of v2.
            let mut target = v1.checked_add(&val.checked_sub(&v3)?)?;
            match ctx.rand_below(6) {
                0 => target = target.checked_add(&v2)?,
                1 => target = target.checked_sub(&v2)?,
                _ => {}
            }
            return Ok(self.update(ctx, od.arg1, &target));
        }
        let fixed = if v2.is_zero() {
            N::zero()
        } else {
            v1.modulo(&v2)?
        };
        Ok(self.update(ctx, od.var, &fixed))
    }

    fn repair_rem(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        if v2.is_zero() {
            return Ok(self.update(ctx, od.var, &N::zero()));
        }
        // No input rewriting; settle for the evaluated definition.
        let r = v1.rem(&v2)?;
        Ok(self.update(ctx, od.var, &r))
    }

    fn repair_idiv(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        // No input rewriting; settle for the evaluated definition.
        let r = if v2.is_zero() { N::zero() } else { v1.div(&v2)? };
        Ok(self.update(ctx, od.var, &r))
    }

    fn repair_div(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        // No input rewriting; settle for the evaluated definition.
        let r = if v2.is_zero() {
            N::zero()
        } else {
            v1.exact_div(&v2)?
        };
        Ok(self.update(ctx, od.var, &r))
    }

    fn repair_power(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        let v1 = self.value(od.arg1).clone();
        let v2 = self.value(od.arg2).clone();
        if v1.is_zero() && v2.is_zero() {
            return Ok(self.update(ctx, od.var, &N::zero()));
        }
        unimplemented!("repair of exponentiation")
    }

    fn repair_abs(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        let val = self.value(od.var).clone();
        let v1 = self.value(od.arg1).clone();
        if val.is_negative() {
            let a = v1.checked_abs()?;
            Ok(self.update(ctx, od.var, &a))
        } else if ctx.rand_below(2) == 0 {
            Ok(self.update(ctx, od.arg1, &val))
        } else {
            let neg = val.checked_neg()?;
            Ok(self.update(ctx, od.arg1, &neg))
        }
    }

    fn repair_to_int(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        let val = self.value(od.var).clone();
        let v1 = self.value(od.arg1).clone();
        if val.checked_sub(&N::one())? < v1 && v1 <= val {
            return Ok(true);
        }
        Ok(self.update(ctx, od.arg1, &val))
    }

    fn repair_to_real(&mut self, ctx: &mut dyn SearchContext, od: OpDef) -> NumResult<bool> {
        if ctx.rand_below(20) == 0 {
            let v1 = self.value(od.arg1).clone();
            Ok(self.update(ctx, od.var, &v1))
        } else {
            let v1 = self.value(od.arg1).clone();
            Ok(self.update(ctx, od.arg1, &v1))
        }
    }

    /// Whether a derived variable's stored value matches a recomputation of
    /// its definition.
    pub(crate) fn eval_is_correct(&self, v: VarId) -> NumResult<bool> {
        let Some(def) = self.vars[v].def else {
            return Ok(true);
        };
        let value = self.value(v);
        match def {
            Def::Sum(i) => {
                let sd = &self.sums[i];
                let mut sum = sd.coeff.clone();
                for (c, w) in &sd.args {
                    sum = sum.checked_add(&c.checked_mul(self.value(*w))?)?;
                }
                Ok(sum == *value)
            }
            Def::Mul(i) => {
                let md = &self.muls[i];
                let mut prod = N::one();
                for (w, p) in &md.monomial {
                    prod = prod.checked_mul(&power_of(self.value(*w), *p)?)?;
                }
                Ok(prod == *value)
            }
            Def::Op(i) => {
                let od = self.ops[i];
                let v1 = self.value(od.arg1);
                let v2 = self.value(od.arg2);
                match od.kind {
                    OpKind::Mod => Ok(*value
                        == if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.modulo(v2)?
                        }),
                    OpKind::Rem => Ok(*value
                        == if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.rem(v2)?
                        }),
                    OpKind::IntDiv => Ok(*value
                        == if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.div(v2)?
                        }),
                    OpKind::Div => Ok(*value
                        == if v2.is_zero() {
                            N::zero()
                        } else {
                            v1.exact_div(v2)?
                        }),
                    OpKind::Abs => Ok(*value == v1.checked_abs()?),
                    OpKind::Power => unimplemented!("evaluation check for exponentiation"),
                    OpKind::ToInt => unimplemented!("evaluation check for to-int"),
                    OpKind::ToReal => unimplemented!("evaluation check for to-real"),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Distinct constraints.
    // ------------------------------------------------------------------

    /// Whether a term is a `distinct` over numeric arguments.
    pub(crate) fn is_distinct(&self, ctx: &dyn SearchContext, t: TermId) -> bool {
        match ctx.kind(t) {
            TermKind::Distinct(args) => {
                !args.is_empty() && ctx.is_numeric(args[0])
            }
            _ => false,
        }
    }

    /// Whether all arguments of a numeric `distinct` have pairwise
    /// different values.
    pub(crate) fn eval_distinct(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> bool {
        let TermKind::Distinct(args) = ctx.kind(t).clone() else {
            return true;
        };
        for i in 0..args.len() {
            for j in i + 1..args.len() {
                let (Ok(v1), Ok(v2)) = (self.mk_term(ctx, args[i]), self.mk_term(ctx, args[j]))
                else {
                    return true;
                };
                if self.value(v1) == self.value(v2) {
                    return false;
                }
            }
        }
        true
    }

    /// Separate colliding arguments of a `distinct` by bumping one of each
    /// pair to a fresh value, preferring non-fixed variables.
    pub(crate) fn repair_distinct(&mut self, ctx: &mut dyn SearchContext, t: TermId) {
        let TermKind::Distinct(args) = ctx.kind(t).clone() else {
            return;
        };
        for i in 0..args.len() {
            for j in i + 1..args.len() {
                let (Ok(v1), Ok(v2)) = (self.mk_term(ctx, args[i]), self.mk_term(ctx, args[j]))
                else {
                    continue;
                };
                if self.value(v1) == self.value(v2) {
                    let Ok(mut new_value) = self.value(v1).checked_add(&N::one()) else {
                        continue;
                    };
                    if new_value == *self.value(v2) {
                        let Ok(bumped) = new_value.checked_add(&N::one()) else {
                            continue;
                        };
                        new_value = bumped;
                    }
                    trace!(v1, v2, new = %new_value, "separating distinct pair");
                    if !self.is_fixed_var(v2) {
                        self.update(ctx, v2, &new_value);
                    } else if !self.is_fixed_var(v1) {
                        self.update(ctx, v1, &new_value);
                    }
                }
            }
        }
    }
}
