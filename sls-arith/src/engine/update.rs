//! Value-change propagation.
//!
//! `update` commits a new value for a variable and restores every invariant
//! that depends on it: cached atom values, Boolean assignments, and the
//! values of product and sum parents. A pre-flight dry run over the product
//! parents makes overflow abort the move before anything is mutated.
//!
//! `update_num`/`update_args_value` are the speculative variant used by the
//! global lookahead: same downward propagation, no bound re-checks, no
//! Boolean flips.

use super::node::{Def, OpKind, VarId};
use super::ArithSls;
use crate::context::SearchContext;
use sls_num::{power_of, Num, NumResult};
use smallvec::SmallVec;
use tracing::trace;

use super::build::power_value;

impl<N: Num> ArithSls<N> {
    /// Whether a value respects the variable's bounds.
    pub(crate) fn in_bounds(&self, v: VarId, value: &N) -> bool {
        let vi = &self.vars[v];
        if let Some(lo) = &vi.lo {
            if *value < lo.value || (lo.strict && *value == lo.value) {
                return false;
            }
        }
        if let Some(hi) = &vi.hi {
            if *value > hi.value || (hi.strict && *value == hi.value) {
                return false;
            }
        }
        true
    }

    /// Whether the variable is pinned to a single admissible value.
    pub(crate) fn is_fixed_var(&self, v: VarId) -> bool {
        let vi = &self.vars[v];
        match (&vi.lo, &vi.hi) {
            (Some(lo), Some(hi)) => lo.value == hi.value && lo.value == vi.value,
            _ => false,
        }
    }

    /// Recompute a variable's value from its definition.
    pub(crate) fn value1(&self, v: VarId) -> NumResult<N> {
        let vi = &self.vars[v];
        let Some(def) = vi.def else {
            return Ok(vi.value.clone());
        };
        let zero = N::zero();
        match def {
            Def::Sum(i) => {
                let sd = &self.sums[i];
                let mut result = sd.coeff.clone();
                for (c, w) in &sd.args {
                    result = result.checked_add(&c.checked_mul(self.value(*w))?)?;
                }
                Ok(result)
            }
            Def::Mul(i) => {
                let md = &self.muls[i];
                let mut result = N::one();
                for (w, p) in &md.monomial {
                    result = result.checked_mul(&power_of(self.value(*w), *p)?)?;
                }
                Ok(result)
            }
            Def::Op(i) => {
                let od = self.ops[i];
                let v1 = self.value(od.arg1);
                let v2 = self.value(od.arg2);
                match od.kind {
                    OpKind::Mod => {
                        if v2.is_zero() {
                            Ok(zero)
                        } else {
                            v1.modulo(v2)
                        }
                    }
                    OpKind::Rem => {
                        if v2.is_zero() {
                            Ok(zero)
                        } else {
                            v1.rem(v2)
                        }
                    }
                    OpKind::IntDiv => {
                        if v2.is_zero() {
                            Ok(zero)
                        } else {
                            v1.div(v2)
                        }
                    }
                    OpKind::Div => {
                        if v2.is_zero() {
                            Ok(zero)
                        } else {
                            v1.exact_div(v2)
                        }
                    }
                    OpKind::Abs => v1.checked_abs(),
                    OpKind::Power => power_value(v1, v2),
                    OpKind::ToInt => Ok(v1.floor()),
                    OpKind::ToReal => Ok(v1.clone()),
                }
            }
        }
    }

    /// Commit `v := new_value` and propagate. Returns false (leaving all
    /// observable state unchanged) when the move is rejected or overflows.
    pub fn update(&mut self, ctx: &mut dyn SearchContext, v: VarId, new_value: &N) -> bool {
        self.update_inner(ctx, v, new_value).unwrap_or(false)
    }

    fn update_inner(
        &mut self,
        ctx: &mut dyn SearchContext,
        v: VarId,
        new_value: &N,
    ) -> NumResult<bool> {
        let old_value = self.value(v).clone();
        if old_value == *new_value {
            return Ok(true);
        }
        if !self.vars[v].in_range(new_value) {
            return Ok(false);
        }
        if !self.in_bounds(v, new_value) && self.in_bounds(v, &old_value) {
            return Ok(false);
        }

        // Dry-run every product containing v so overflow aborts before any
        // state changes.
        let mul_parents: SmallVec<[usize; 2]> = self.vars[v].muls.clone();
        for &idx in &mul_parents {
            let monomial = self.muls[idx].monomial.clone();
            let mut prod = N::one();
            for (w, p) in &monomial {
                let base = if *w == v { new_value } else { self.value(*w) };
                prod = prod.checked_mul(&power_of(base, *p)?)?;
            }
        }

        let mut to_flip: SmallVec<[crate::literal::BoolVar; 4]> = SmallVec::new();
        for i in 0..self.vars[v].linear_occurs.len() {
            let (coeff, bv) = self.vars[v].linear_occurs[i].clone();
            let old_sign = self.sign(ctx, bv);
            let delta = coeff.checked_mul(&new_value.checked_sub(&old_value)?)?;
            let Some(ineq) = self.get_ineq_mut(bv) else {
                continue;
            };
            ineq.args_value = ineq.args_value.checked_add(&delta)?;
            let (args_value, op) = (ineq.args_value.clone(), ineq.op);
            let dtt_new = super::moves::dtt_ineq(old_sign, &args_value, op)?;
            if !dtt_new.is_zero() {
                to_flip.push(bv);
            }
        }

        trace!(var = v, old = %old_value, new = %new_value, "commit");
        self.vars[v].value = new_value.clone();
        let term = self.vars[v].term;
        ctx.new_value_eh(term);
        self.last_var = Some(v);

        for bv in to_flip {
            let sign = self.sign(ctx, bv);
            if let Some(ineq) = self.get_ineq(bv) {
                if !super::moves::dtt_ineq(sign, &ineq.args_value, ineq.op)?.is_zero() {
                    ctx.flip(bv);
                }
            }
            debug_assert!({
                let sign = self.sign(ctx, bv);
                self.get_ineq(bv)
                    .map(|i| {
                        super::moves::dtt_ineq(sign, &i.args_value, i.op)
                            .map(|d| d.is_zero())
                            .unwrap_or(true)
                    })
                    .unwrap_or(true)
            });
        }

        for &idx in &mul_parents {
            let t = self.vars[self.muls[idx].var].term;
            ctx.new_value_eh(t);
        }
        let add_parents: SmallVec<[usize; 2]> = self.vars[v].adds.clone();
        for &idx in &add_parents {
            let t = self.vars[self.sums[idx].var].term;
            ctx.new_value_eh(t);
        }

        for &idx in &mul_parents {
            let (w, monomial) = {
                let md = &self.muls[idx];
                (md.var, md.monomial.clone())
            };
            let mut prod = N::one();
            for (x, p) in &monomial {
                prod = prod.checked_mul(&power_of(self.value(*x), *p)?)?;
            }
            if *self.value(w) != prod && !self.update(ctx, w, &prod) {
                return Ok(false);
            }
        }

        for &idx in &add_parents {
            let (w, coeff, args) = {
                let sd = &self.sums[idx];
                (sd.var, sd.coeff.clone(), sd.args.clone())
            };
            let mut sum = coeff;
            for (c, x) in &args {
                sum = sum.checked_add(&c.checked_mul(self.value(*x))?)?;
            }
            if !self.update(ctx, w, &sum) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Whether a speculative change of `delta` would be representable.
    pub(crate) fn can_update_num(&self, v: VarId, delta: &N) -> bool {
        let old_value = self.value(v);
        let Ok(new_value) = old_value.checked_add(delta) else {
            return false;
        };
        if *old_value == new_value {
            return true;
        }
        if !self.vars[v].in_range(&new_value) {
            return false;
        }
        if !self.in_bounds(v, &new_value) && self.in_bounds(v, old_value) {
            return false;
        }
        for &idx in &self.vars[v].muls {
            let mut prod = N::one();
            for (w, p) in &self.muls[idx].monomial {
                let base = if *w == v { &new_value } else { self.value(*w) };
                let Ok(pw) = power_of(base, *p) else {
                    return false;
                };
                let Ok(next) = prod.checked_mul(&pw) else {
                    return false;
                };
                prod = next;
            }
        }
        true
    }

    /// Speculatively move `v` by `delta`, updating values and cached atom
    /// sums downward without touching bounds or Boolean assignments.
    pub(crate) fn update_num(&mut self, _ctx: &mut dyn SearchContext, v: VarId, delta: &N) -> bool {
        if delta.is_zero() {
            return true;
        }
        if !self.can_update_num(v, delta) {
            return false;
        }
        let Ok(new_value) = self.value(v).checked_add(delta) else {
            return false;
        };
        self.update_args_value(v, new_value).is_ok()
    }

    /// Write `v := new_value` and refresh every dependent product, sum, and
    /// cached atom value, without bound checks.
    pub(crate) fn update_args_value(&mut self, v: VarId, new_value: N) -> NumResult<()> {
        let mul_parents: SmallVec<[usize; 2]> = self.vars[v].muls.clone();
        for &idx in &mul_parents {
            let (x, monomial) = {
                let md = &self.muls[idx];
                (md.var, md.monomial.clone())
            };
            let mut new_prod = N::one();
            for (w, p) in &monomial {
                let base = if *w == v { &new_value } else { self.value(*w) };
                new_prod = new_prod.checked_mul(&power_of(base, *p)?)?;
            }
            self.update_args_value(x, new_prod)?;
        }

        let add_parents: SmallVec<[usize; 2]> = self.vars[v].adds.clone();
        for &idx in &add_parents {
            let (x, coeff, args) = {
                let sd = &self.sums[idx];
                (sd.var, sd.coeff.clone(), sd.args.clone())
            };
            let mut new_sum = coeff;
            for (c, w) in &args {
                let base = if *w == v { &new_value } else { self.value(*w) };
                new_sum = new_sum.checked_add(&c.checked_mul(base)?)?;
            }
            self.update_args_value(x, new_sum)?;
        }

        let old_value = self.value(v).clone();
        for i in 0..self.vars[v].linear_occurs.len() {
            let (coeff, bv) = self.vars[v].linear_occurs[i].clone();
            let delta = coeff.checked_mul(&new_value.checked_sub(&old_value)?)?;
            if let Some(ineq) = self.get_ineq_mut(bv) {
                ineq.args_value = ineq.args_value.checked_add(&delta)?;
            }
        }
        self.vars[v].value = new_value;
        Ok(())
    }

    /// Recompute a definition node's own value and commit it upward.
    pub fn repair_up(&mut self, ctx: &mut dyn SearchContext, t: crate::ast::TermId) {
        if ctx.is_bool(t) {
            if let Some(bv) = ctx.atom_to_bool_var(t) {
                if let Some(ineq) = self.get_ineq(bv) {
                    if ineq.is_true() != ctx.is_true(crate::literal::Lit::positive(bv)) {
                        ctx.flip(bv);
                    }
                }
            }
            return;
        }
        let Some(&v) = self.term_to_var.get(&t) else {
            return;
        };
        if self.vars[v].def.is_none() {
            return;
        }
        match self.value1(v) {
            Ok(new_value) => {
                if !self.update(ctx, v, &new_value) {
                    ctx.new_value_eh(t);
                }
            }
            Err(_) => ctx.new_value_eh(t),
        }
    }
}
