//! Move proposal, tabu filtering, scoring, and selection.
//!
//! Every proposer measures progress with the distance-to-true metric: 0 when
//! the atom satisfies its assigned polarity, otherwise a positive penalty
//! growing with how far the cached linear value is from the boundary.

use super::node::{Candidate, Def, Ineq, IneqKind, VarId};
use super::ArithSls;
use crate::context::SearchContext;
use crate::literal::{BoolVar, Lit};
use sls_num::{int_sqrt, Num, NumResult};
use smallvec::SmallVec;
use tracing::trace;

/// Distance to true of an atom whose cached linear value (constant
/// included) is `args_value`, under polarity `sign` (`true` = the negated
/// literal holds).
pub(crate) fn dtt_ineq<N: Num>(sign: bool, args_value: &N, op: IneqKind) -> NumResult<N> {
    let zero = N::zero();
    let one = N::one();
    let value = args_value.clone();
    Ok(match op {
        IneqKind::Le => {
            if sign {
                if value <= zero {
                    value.checked_neg()?.checked_add(&one)?
                } else {
                    zero
                }
            } else if value <= zero {
                zero
            } else {
                value
            }
        }
        IneqKind::Eq => {
            if sign {
                if value.is_zero() {
                    one
                } else {
                    zero
                }
            } else if value.is_zero() {
                zero
            } else {
                one
            }
        }
        IneqKind::Lt => {
            if sign {
                if value < zero {
                    value.checked_neg()?
                } else {
                    zero
                }
            } else if value < zero {
                zero
            } else {
                value.checked_add(&one)?
            }
        }
    })
}

impl<N: Num> ArithSls<N> {
    pub(crate) fn dtt_of(&self, sign: bool, args_value: &N, ineq: &Ineq<N>) -> NumResult<N> {
        dtt_ineq(sign, args_value, ineq.op)
    }

    /// Distance to true if `v` were set to `new_value`, in O(args).
    pub(crate) fn dtt_at(
        &self,
        sign: bool,
        ineq: &Ineq<N>,
        v: VarId,
        new_value: &N,
    ) -> NumResult<N> {
        for (coeff, w) in &ineq.args {
            if *w == v {
                let shift = coeff.checked_mul(&new_value.checked_sub(self.value(v))?)?;
                let args = ineq.args_value.checked_add(&shift)?;
                return dtt_ineq(sign, &args, ineq.op);
            }
        }
        Ok(N::one())
    }

    /// Distance to true after adding `coeff * delta` to the cached value.
    pub(crate) fn dtt_offset(
        &self,
        sign: bool,
        ineq: &Ineq<N>,
        coeff: &N,
        delta: &N,
    ) -> NumResult<N> {
        let args = ineq.args_value.checked_add(&coeff.checked_mul(delta)?)?;
        dtt_ineq(sign, &args, ineq.op)
    }

    /// Smallest-magnitude step that pushes `delta` past zero when scaled by
    /// `coeff`: `ceil(delta / |coeff|) * sign(coeff)` on integers, exact
    /// division on reals.
    pub(crate) fn divide(&self, v: VarId, delta: &N, coeff: &N) -> NumResult<N> {
        if self.is_int_var(v) {
            let adj = delta.checked_add(&coeff.checked_abs()?)?.checked_sub(&N::one())?;
            adj.div(coeff)
        } else {
            delta.exact_div(coeff)
        }
    }

    /// Signed floor division for integer variables, plain division for reals.
    pub(crate) fn divide_floor(&self, v: VarId, a: &N, b: &N) -> NumResult<N> {
        if !self.is_int_var(v) {
            return a.exact_div(b);
        }
        let zero = N::zero();
        let one = N::one();
        if *b > zero && *a >= zero {
            a.div(b)
        } else if *b > zero {
            let t = a.checked_neg()?.checked_add(b)?.checked_sub(&one)?;
            t.div(b)?.checked_neg()
        } else if *a > zero {
            let t = a.checked_sub(b)?.checked_sub(&one)?;
            t.div(&b.checked_neg()?)?.checked_neg()
        } else {
            a.checked_neg()?.div(&b.checked_neg()?)
        }
    }

    /// Signed ceiling division for integer variables, plain division for
    /// reals.
    pub(crate) fn divide_ceil(&self, v: VarId, a: &N, b: &N) -> NumResult<N> {
        if !self.is_int_var(v) {
            return a.exact_div(b);
        }
        let zero = N::zero();
        let one = N::one();
        if *b > zero && *a >= zero {
            a.checked_add(b)?.checked_sub(&one)?.div(b)
        } else if *b > zero {
            a.checked_neg()?.div(b)?.checked_neg()
        } else if *a > zero {
            a.div(&b.checked_neg()?)?.checked_neg()
        } else {
            let t = a.checked_neg()?.checked_sub(b)?.checked_sub(&one)?;
            t.div(&b.checked_neg()?)
        }
    }

    /// Propose the minimal move of `v` (with linear coefficient `coeff`)
    /// that crosses the atom's boundary in the needed direction.
    pub(crate) fn find_linear_moves(
        &mut self,
        bv: BoolVar,
        v: VarId,
        coeff: &N,
    ) -> NumResult<()> {
        let Some(ineq) = self.get_ineq(bv) else {
            return Ok(());
        };
        let (op, sum, is_true) = (ineq.op, ineq.args_value.clone(), ineq.is_true());
        trace!(bool_var = bv, var = v, "linear moves");
        let one = N::one();
        if is_true {
            match op {
                IneqKind::Le => {
                    let d = self.divide(v, &sum.checked_neg()?.checked_add(&one)?, coeff)?;
                    self.add_update(v, d);
                }
                IneqKind::Lt => {
                    let d = self.divide(v, &sum.checked_neg()?, coeff)?;
                    self.add_update(v, d);
                }
                IneqKind::Eq => {
                    self.add_update(v, one);
                    self.add_update(v, N::from_i64(-1));
                }
            }
        } else {
            match op {
                IneqKind::Le => {
                    let d = self.divide(v, &sum, coeff)?.checked_neg()?;
                    self.add_update(v, d);
                }
                IneqKind::Lt => {
                    let d = self.divide(v, &sum.checked_add(&one)?, coeff)?.checked_neg()?;
                    self.add_update(v, d);
                }
                IneqKind::Eq => {
                    let delta = if sum.is_negative() {
                        self.divide(v, &sum.checked_abs()?, coeff)?
                    } else {
                        self.divide(v, &sum, coeff)?.checked_neg()?
                    };
                    if sum.checked_add(&coeff.checked_mul(&delta)?)?.is_zero() {
                        self.add_update(v, delta);
                    }
                }
            }
        }
        Ok(())
    }

    /// Propose moves for `x` when the atom restricted to `x` has the shape
    /// `a·x² + b·x + c = sum` with `a != 0`, by solving for the parabola
    /// roots and stepping just inside or outside as the polarity demands.
    pub(crate) fn find_quadratic_moves(
        &mut self,
        bv: BoolVar,
        x: VarId,
        a: &N,
        b: &N,
        sum: &N,
    ) -> NumResult<()> {
        let Some(ineq) = self.get_ineq(bv) else {
            return Ok(());
        };
        let (op, is_true) = (ineq.op, ineq.is_true());
        let vx = self.value(x).clone();
        let zero = N::zero();

        let c = sum
            .checked_sub(&a.checked_mul(&vx)?.checked_mul(&vx)?)?
            .checked_sub(&b.checked_mul(&vx)?)?;
        let d = b
            .checked_mul(b)?
            .checked_sub(&N::from_i64(4).checked_mul(a)?.checked_mul(&c)?)?;
        if d < zero {
            return Ok(());
        }
        let root = int_sqrt(&d)?;
        let is_square = root.checked_mul(&root)? == d;
        let two_a = a.checked_add(a)?;
        let lo_num = b.checked_neg()?.checked_sub(&root)?;
        let hi_num = b.checked_neg()?.checked_add(&root)?;
        let mut ll = self.divide_floor(x, &lo_num, &two_a)?;
        let mut lh = self.divide_ceil(x, &lo_num, &two_a)?;
        let mut rl = self.divide_floor(x, &hi_num, &two_a)?;
        let mut rh = self.divide_ceil(x, &hi_num, &two_a)?;
        // The root order flips when dividing by a negative leading
        // coefficient.
        if lh > rl {
            std::mem::swap(&mut ll, &mut rl);
            std::mem::swap(&mut lh, &mut rh);
        }
        let mut eps = N::one();
        if !self.is_int_var(x) {
            let gap = rh.checked_sub(&lh)?.checked_abs()?;
            if gap <= eps {
                eps = gap.exact_div(&N::from_i64(2))?;
            }
        }
        debug_assert!(ll <= lh);
        debug_assert!(rl <= rh);
        if d > zero && lh == rh {
            return Ok(());
        }
        if d.is_zero() && ll != lh {
            return Ok(());
        }

        let q = |t: &N| -> NumResult<N> {
            a.checked_mul(t)?
                .checked_mul(t)?
                .checked_add(&b.checked_mul(t)?)?
                .checked_add(&c)
        };

        if is_true {
            match op {
                IneqKind::Le => {
                    if d.is_zero() {
                        return Ok(());
                    }
                    if a.is_negative() {
                        if q(&lh)? <= zero {
                            lh = lh.checked_add(&eps)?;
                        }
                        if q(&rl)? <= zero {
                            rl = rl.checked_sub(&eps)?;
                        }
                        self.add_update(x, lh.checked_sub(&vx)?);
                        self.add_update(x, rl.checked_sub(&vx)?);
                    } else {
                        if q(&ll)? <= zero {
                            ll = ll.checked_sub(&eps)?;
                        }
                        if q(&rh)? <= zero {
                            rh = rh.checked_add(&eps)?;
                        }
                        self.add_update(x, ll.checked_sub(&vx)?);
                        self.add_update(x, rh.checked_sub(&vx)?);
                    }
                }
                IneqKind::Lt => {
                    if d.is_zero() {
                        return Ok(());
                    }
                    if a.is_positive() {
                        self.add_update(x, lh.checked_sub(&vx)?.checked_add(&eps)?);
                        if ll != rl {
                            self.add_update(x, rh.checked_sub(&vx)?.checked_sub(&eps)?);
                        }
                    } else {
                        self.add_update(x, ll.checked_sub(&vx)?.checked_sub(&eps)?);
                        if ll != rl {
                            self.add_update(x, rl.checked_sub(&vx)?.checked_add(&eps)?);
                        }
                    }
                }
                IneqKind::Eq => {
                    self.add_update(x, N::one().checked_sub(&vx)?);
                    self.add_update(x, N::from_i64(-1).checked_sub(&vx)?);
                }
            }
        } else {
            match op {
                IneqKind::Le => {
                    if d.is_zero() {
                        if a.is_positive() && ll == lh {
                            self.add_update(x, ll.checked_sub(&vx)?);
                        }
                        return Ok(());
                    }
                    if a.is_positive() {
                        if q(&lh)? > zero {
                            lh = lh.checked_add(&eps)?;
                        }
                        if q(&rl)? > zero {
                            rl = rl.checked_sub(&eps)?;
                        }
                        self.add_update(x, lh.checked_sub(&vx)?);
                        self.add_update(x, rl.checked_sub(&vx)?);
                    } else {
                        if q(&ll)? > zero {
                            ll = ll.checked_add(&eps)?;
                        }
                        if q(&rh)? > zero {
                            rh = rh.checked_sub(&eps)?;
                        }
                        self.add_update(x, ll.checked_sub(&vx)?);
                        self.add_update(x, rh.checked_sub(&vx)?);
                    }
                }
                IneqKind::Lt => {
                    if d.is_zero() {
                        return Ok(());
                    }
                    if a.is_positive() {
                        self.add_update(x, lh.checked_sub(&vx)?.checked_sub(&eps)?);
                        if ll != rl {
                            self.add_update(x, rh.checked_sub(&vx)?.checked_add(&eps)?);
                        }
                    } else {
                        self.add_update(x, ll.checked_sub(&vx)?.checked_add(&eps)?);
                        if ll != rl {
                            self.add_update(x, rl.checked_sub(&vx)?.checked_sub(&eps)?);
                        }
                    }
                }
                IneqKind::Eq => {
                    if !is_square {
                        return Ok(());
                    }
                    if ll == lh {
                        self.add_update(x, ll.checked_sub(&vx)?);
                    }
                    if rl == rh && lh != rh {
                        self.add_update(x, rl.checked_sub(&vx)?);
                    }
                }
            }
        }
        Ok(())
    }

    /// Filter a proposed move: reject exact reversals of the last committed
    /// move, tabu-banned directions, and out-of-range values; clamp moves
    /// that would cross a bound from inside. Returns the (possibly clamped)
    /// delta.
    pub(crate) fn is_permitted_update(&self, v: VarId, delta: &N) -> Option<N> {
        if self.last_var == Some(v) {
            if let Ok(neg) = delta.checked_neg() {
                if neg == self.last_delta {
                    trace!(var = v, "rejected: exact reversal");
                    return None;
                }
            }
        }
        if self.use_tabu && self.vars[v].is_tabu(self.stats.steps, delta) {
            trace!(var = v, "rejected: tabu");
            return None;
        }

        let old_value = self.value(v).clone();
        let new_value = old_value.checked_add(delta).ok()?;
        if !self.vars[v].in_range(&new_value) {
            trace!(var = v, "rejected: out of range");
            return None;
        }

        let mut delta_out = delta.clone();
        if self.use_tabu && !self.in_bounds(v, &new_value) && self.in_bounds(v, &old_value) {
            let lo = self.vars[v].lo.clone();
            let hi = self.vars[v].hi.clone();
            if let Some(lo) = &lo {
                let violated = if lo.strict {
                    lo.value >= new_value
                } else {
                    lo.value > new_value
                };
                if violated {
                    if lo.strict && delta_out.is_negative() && lo.value <= old_value {
                        let mut eps = N::one();
                        if let Some(hi) = &hi {
                            let gap = hi.value.checked_sub(&lo.value).ok()?;
                            if gap <= eps {
                                eps = gap.exact_div(&N::from_i64(2)).ok()?;
                            }
                        }
                        delta_out = lo.value.checked_sub(&old_value).ok()?.checked_add(&eps).ok()?;
                    } else if !lo.strict && delta_out.is_negative() && lo.value < old_value {
                        delta_out = lo.value.checked_sub(&old_value).ok()?;
                    } else {
                        return None;
                    }
                }
            }
            if let Some(hi) = &hi {
                let violated = if hi.strict {
                    hi.value <= new_value
                } else {
                    hi.value < new_value
                };
                if violated {
                    if hi.strict && !delta_out.is_negative() && hi.value >= old_value {
                        let mut eps = N::one();
                        if let Some(lo) = &lo {
                            let gap = hi.value.checked_sub(&lo.value).ok()?;
                            if gap <= eps {
                                eps = gap.exact_div(&N::from_i64(2)).ok()?;
                            }
                        }
                        delta_out = hi.value.checked_sub(&old_value).ok()?.checked_sub(&eps).ok()?;
                    } else if !hi.strict && delta_out.is_positive() && hi.value > old_value {
                        delta_out = hi.value.checked_sub(&old_value).ok()?;
                    } else {
                        return None;
                    }
                }
            }
        }
        if delta_out.is_zero() {
            None
        } else {
            Some(delta_out)
        }
    }

    /// Add a candidate move if it passes the tabu/bound filter.
    pub(crate) fn add_update(&mut self, v: VarId, delta: N) {
        if let Some(delta_out) = self.is_permitted_update(v, &delta) {
            self.updates.push(Candidate {
                var: v,
                delta: delta_out,
                score: 0.0,
            });
        }
    }

    /// Propose a small randomised reset for `x`, recursing into the
    /// children of sum and product definitions.
    pub(crate) fn add_reset_update(&mut self, ctx: &mut dyn SearchContext, x: VarId) {
        self.last_delta = N::zero();
        if self.is_fixed_var(x) {
            return;
        }
        if let Some(Def::Mul(i)) = self.vars[x].def {
            let monomial = self.muls[i].monomial.clone();
            for (w, _) in monomial {
                self.add_reset_update(ctx, w);
            }
        }
        if let Some(Def::Sum(i)) = self.vars[x].def {
            let args = self.sums[i].args.clone();
            for (_, w) in args {
                self.add_reset_update(ctx, w);
            }
        }
        let lo = self.vars[x].lo.clone();
        let hi = self.vars[x].hi.clone();
        let mut new_value = N::from_i64(-2 + i64::from(ctx.rand_below(5)));
        if let Some(lo) = &lo {
            if lo.value > new_value {
                let Ok(v) = lo.value.checked_add(&N::from_i64(i64::from(ctx.rand_below(2))))
                else {
                    return;
                };
                new_value = v;
            }
        } else if let Some(hi) = &hi {
            if hi.value < new_value {
                let Ok(v) = hi.value.checked_sub(&N::from_i64(i64::from(ctx.rand_below(2))))
                else {
                    return;
                };
                new_value = v;
            }
        }
        let value = self.value(x).clone();
        if new_value != value {
            let jitter = N::from_i64(-1 + i64::from(ctx.rand_below(3)));
            let Ok(delta) = new_value
                .checked_sub(&value)
                .and_then(|d| d.checked_add(&jitter))
            else {
                return;
            };
            self.add_update(x, delta);
        } else {
            let one = N::one();
            if let Ok(d) = one.checked_sub(&value) {
                self.add_update(x, d);
            }
            if let Ok(d) = N::from_i64(-1).checked_sub(&value) {
                self.add_update(x, d);
            }
            if !value.is_zero() {
                self.add_update(x, one);
                self.add_update(x, N::from_i64(-1));
            }
        }
    }

    /// Score a candidate by atoms made true minus atoms broken, with the
    /// standard break-count exponential backoff. Breaking a top-level
    /// literal under tabu scores 0.
    pub(crate) fn compute_score(&mut self, ctx: &dyn SearchContext, x: VarId, delta: &N) -> f64 {
        if self.dscore_mode {
            return self.dscore(ctx, x, delta);
        }
        let mut result: i32 = 0;
        let mut breaks: i32 = 0;
        for i in 0..self.vars[x].linear_occurs.len() {
            let (coeff, bv) = self.vars[x].linear_occurs[i].clone();
            let old_sign = self.sign(ctx, bv);
            let Some(ineq) = self.get_ineq(bv) else {
                continue;
            };
            let Ok(dtt_old) = self.dtt_of(old_sign, &ineq.args_value, ineq) else {
                return 0.0;
            };
            let Ok(dtt_new) = self.dtt_offset(old_sign, ineq, &coeff, delta) else {
                return 0.0;
            };
            if dtt_new.is_zero() && !dtt_old.is_zero() {
                result += 1;
            }
            if !dtt_new.is_zero() && dtt_old.is_zero() {
                if self.use_tabu && ctx.is_unit(Lit::new(bv, old_sign)) {
                    return 0.0;
                }
                result -= 1;
                breaks += 1;
            }
        }

        if result < 0 {
            return 0.000_000_1;
        }
        if result == 0 {
            return 0.000_002;
        }
        for i in self.prob_break.len()..=(breaks as usize) {
            self.prob_break.push(self.config.cb.powi(-(i as i32)));
        }
        self.prob_break[breaks as usize]
    }

    /// Clause-distance scoring used after `on_rescale`: the summed decrease
    /// of clause distance-to-satisfaction over all clauses.
    pub(crate) fn dscore(&self, ctx: &dyn SearchContext, x: VarId, delta: &N) -> f64 {
        let Ok(new_value) = self.value(x).checked_add(delta) else {
            return 0.0;
        };
        let mut score = 0.0;
        for cl in 0..ctx.num_clauses() {
            let (Ok(old), Ok(new)) = (
                self.compute_dts(ctx, cl),
                self.dts(ctx, cl, x, &new_value),
            ) else {
                continue;
            };
            score += old.to_f64() - new.to_f64();
        }
        if score <= 0.0 {
            0.000_000_1
        } else {
            score
        }
    }

    /// Distance to satisfaction of a clause: minimum distance-to-true over
    /// its arithmetic literals.
    pub(crate) fn compute_dts(&self, ctx: &dyn SearchContext, cl: usize) -> NumResult<N> {
        let lits: SmallVec<[Lit; 8]> = ctx.clause(cl).iter().copied().collect();
        let mut d = N::one();
        let mut first = true;
        for lit in lits {
            let Some(ineq) = self.get_ineq(lit.var()) else {
                continue;
            };
            let d2 = self.dtt_of(lit.sign(), &ineq.args_value, ineq)?;
            if first {
                d = d2;
                first = false;
            } else if d2 < d {
                d = d2;
            }
            if d.is_zero() {
                break;
            }
        }
        Ok(d)
    }

    /// Clause distance if `v` were set to `new_value`.
    pub(crate) fn dts(
        &self,
        ctx: &dyn SearchContext,
        cl: usize,
        v: VarId,
        new_value: &N,
    ) -> NumResult<N> {
        let lits: SmallVec<[Lit; 8]> = ctx.clause(cl).iter().copied().collect();
        let mut d = N::one();
        let mut first = true;
        for lit in lits {
            let Some(ineq) = self.get_ineq(lit.var()) else {
                continue;
            };
            let d2 = self.dtt_at(lit.sign(), ineq, v, new_value)?;
            if first {
                d = d2;
                first = false;
            } else if d2 < d {
                d = d2;
            }
            if d.is_zero() {
                break;
            }
        }
        Ok(d)
    }

    /// Pick one candidate by score-weighted roulette and commit it. Caps
    /// the candidate list by random eviction first; opens a tabu window for
    /// the moved variable on success.
    pub(crate) fn apply_update(&mut self, ctx: &mut dyn SearchContext) -> bool {
        let mut updates = std::mem::take(&mut self.updates);
        while updates.len() > self.config.updates_max_size {
            let idx = ctx.rand_below(updates.len() as u32) as usize;
            updates.swap_remove(idx);
        }

        for u in &mut updates {
            u.score = {
                let (var, delta) = (u.var, u.delta.clone());
                self.compute_score(&*ctx, var, &delta)
            };
        }
        let mut sum_score: f64 = updates.iter().map(|u| u.score).sum();

        while !updates.is_empty() {
            let mut i = updates.len();
            let mut lim = sum_score * (f64::from(ctx.rand()) / f64::from(u32::MAX));
            loop {
                i -= 1;
                lim -= updates[i].score;
                if lim < 0.0 || i == 0 {
                    break;
                }
            }
            let cand = updates[i].clone();
            let committed = match self.value(cand.var).checked_add(&cand.delta) {
                Ok(new_value) => self.update(ctx, cand.var, &new_value),
                Err(_) => false,
            };
            if committed {
                self.last_delta = cand.delta.clone();
                self.stats.steps += 1;
                let ban = self.stats.steps + 3 + u64::from(ctx.rand_below(10));
                self.vars[cand.var].set_step(self.stats.steps, ban, cand.delta);
                return true;
            }
            sum_score -= cand.score;
            updates.swap_remove(i);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Sort;
    use crate::context::Harness;
    use proptest::prelude::*;
    use sls_num::CheckedInt64;

    fn n(v: i64) -> CheckedInt64 {
        CheckedInt64::new(v)
    }

    fn engine_with_vars() -> (Harness, ArithSls<CheckedInt64>, VarId, VarId) {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let r = ctx.terms_mut().mk_var("r", Sort::Real);
        let mut engine = ArithSls::new();
        let vx = engine.mk_term(&mut ctx, x).unwrap();
        let vr = engine.mk_term(&mut ctx, r).unwrap();
        (ctx, engine, vx, vr)
    }

    #[test]
    fn dtt_table() {
        let le: Ineq<CheckedInt64> = {
            let mut i = Ineq::new(IneqKind::Le, n(0));
            i.args_value = n(5);
            i
        };
        assert_eq!(dtt_ineq(false, &n(5), le.op).unwrap(), n(5));
        assert_eq!(dtt_ineq(false, &n(-1), le.op).unwrap(), n(0));
        assert_eq!(dtt_ineq(true, &n(-1), le.op).unwrap(), n(2));
        assert_eq!(dtt_ineq(true, &n(5), le.op).unwrap(), n(0));

        assert_eq!(dtt_ineq(false, &n(0), IneqKind::Eq).unwrap(), n(0));
        assert_eq!(dtt_ineq(false, &n(3), IneqKind::Eq).unwrap(), n(1));
        assert_eq!(dtt_ineq(true, &n(0), IneqKind::Eq).unwrap(), n(1));

        assert_eq!(dtt_ineq(false, &n(0), IneqKind::Lt).unwrap(), n(1));
        assert_eq!(dtt_ineq(false, &n(-2), IneqKind::Lt).unwrap(), n(0));
        assert_eq!(dtt_ineq(true, &n(-2), IneqKind::Lt).unwrap(), n(2));
    }

    #[test]
    fn floor_and_ceil_division_match_reals() {
        let (_ctx, engine, vx, _) = engine_with_vars();
        for a in -20i64..=20 {
            for b in [-7i64, -3, -2, -1, 1, 2, 3, 7] {
                let q = engine.divide_floor(vx, &n(a), &n(b)).unwrap().get();
                assert_eq!(q, (a as f64 / b as f64).floor() as i64, "floor {a}/{b}");
                let q = engine.divide_ceil(vx, &n(a), &n(b)).unwrap().get();
                assert_eq!(q, (a as f64 / b as f64).ceil() as i64, "ceil {a}/{b}");
            }
        }
    }

    #[test]
    fn divide_steps_past_zero() {
        let (_ctx, engine, vx, _) = engine_with_vars();
        // ceil(a / |b|) * sign(b)
        assert_eq!(engine.divide(vx, &n(5), &n(2)).unwrap(), n(3));
        assert_eq!(engine.divide(vx, &n(4), &n(2)).unwrap(), n(2));
        assert_eq!(engine.divide(vx, &n(5), &n(-2)).unwrap(), n(-3));
        assert_eq!(engine.divide(vx, &n(4), &n(-2)).unwrap(), n(-2));
    }

    #[test]
    fn permitted_update_rejects_reversal_and_tabu() {
        let (_ctx, mut engine, vx, _) = engine_with_vars();
        engine.last_var = Some(vx);
        engine.last_delta = n(5);
        assert!(engine.is_permitted_update(vx, &n(-5)).is_none());
        assert!(engine.is_permitted_update(vx, &n(-4)).is_some());

        engine.last_var = None;
        engine.vars[vx].set_step(1, 10, n(2));
        engine.stats.steps = 5;
        assert!(engine.is_permitted_update(vx, &n(3)).is_none());
        assert!(engine.is_permitted_update(vx, &n(-3)).is_some());
        engine.stats.steps = 10;
        assert!(engine.is_permitted_update(vx, &n(3)).is_some());
        assert!(engine.is_permitted_update(vx, &n(0)).is_none());
    }

    #[test]
    fn score_schedule() {
        let (ctx, mut engine, vx, _) = engine_with_vars();
        // No occurrences: a move neither makes nor breaks anything.
        let score = engine.compute_score(&ctx, vx, &n(1));
        assert!((score - 0.000_002).abs() < 1e-12);
    }

    proptest! {
        /// For `a(x - r1)(x - r2) <= 0` with integer roots, the quadratic
        /// proposer produces a move landing inside the feasible band.
        #[test]
        fn quadratic_moves_reach_satisfaction(
            r1 in -30i64..30,
            width in 0i64..20,
            a in 1i64..4,
            x0 in -40i64..40,
        ) {
            let r2 = r1 + width;
            let b = -a * (r1 + r2);
            let c = a * r1 * r2;

            let mut ctx = Harness::new();
            let x = ctx.terms_mut().mk_var("x", Sort::Int);
            let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
            let vx = engine.mk_term(&mut ctx, x).unwrap();
            assert!(engine.update(&mut ctx, vx, &n(x0)));

            let xx = ctx.terms_mut().mk_mul(vec![x, x]);
            let an = ctx.terms_mut().mk_int(a);
            let bn = ctx.terms_mut().mk_int(b);
            let cn = ctx.terms_mut().mk_int(c);
            let axx = ctx.terms_mut().mk_mul(vec![an, xx]);
            let bx = ctx.terms_mut().mk_mul(vec![bn, x]);
            let poly = ctx.terms_mut().mk_add(vec![axx, bx, cn]);
            let zero = ctx.terms_mut().mk_int(0);
            let atom = ctx.terms_mut().mk_le(poly, zero);
            let bv = ctx.mk_bool_var(atom);
            engine.register_term(&mut ctx, atom);

            prop_assume!(!engine.get_ineq(bv).unwrap().is_true());
            ctx.set_assignment(bv, true);
            engine.propagate_literal(&mut ctx, Lit::positive(bv));
            prop_assert!(engine.get_ineq(bv).unwrap().is_true());
        }
    }
}
