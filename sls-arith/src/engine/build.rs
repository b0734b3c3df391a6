//! Compilation of terms into the engine's DAG and atoms.
//!
//! `add_args` walks an expression once, distributing coefficients,
//! flattening additions and subtractions, folding numerals into the
//! constant, and rewriting `c * (a + b)` into `c*a + c*b` when one operand
//! is numeric, so sums stay linear in atomic form. Every non-additive node
//! interns a fresh variable.

use super::node::{Def, Ineq, IneqKind, MulDef, NlCoeff, OpDef, OpKind, SumDef, VarId, VarInfo, VarSort};
use super::ArithSls;
use crate::ast::{TermId, TermKind};
use crate::context::SearchContext;
use crate::literal::{BoolVar, Lit};
use num_traits::ToPrimitive;
use sls_num::{power_of, Num, NumError, NumResult};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

/// A linear combination under construction: `coeff + Σ cᵢ·vᵢ`.
#[derive(Debug, Clone)]
pub(crate) struct LinearTerm<N> {
    pub coeff: N,
    pub args: Vec<(N, VarId)>,
}

impl<N: Num> LinearTerm<N> {
    pub(crate) fn new(coeff: N) -> Self {
        Self {
            coeff,
            args: Vec::new(),
        }
    }
}

/// `base^exp` where a negative or fractional exponent evaluates to 0.
pub(crate) fn power_value<N: Num>(base: &N, exp: &N) -> NumResult<N> {
    if exp.is_negative() {
        return Ok(N::zero());
    }
    let r = exp.to_rational();
    if !r.is_integer() {
        return Ok(N::zero());
    }
    let k = r.to_integer().to_u32().ok_or(NumError::Overflow)?;
    power_of(base, k)
}

fn add_arg<N: Num>(term: &mut LinearTerm<N>, c: N, v: VarId) {
    if !c.is_zero() {
        term.args.push((c, v));
    }
}

impl<N: Num> ArithSls<N> {
    /// Intern a bare variable for a term, without looking at its structure.
    pub(crate) fn mk_var(&mut self, ctx: &dyn SearchContext, t: TermId) -> VarId {
        if let Some(&v) = self.term_to_var.get(&t) {
            return v;
        }
        let v = self.vars.len();
        self.term_to_var.insert(t, v);
        let sort = if ctx.is_int(t) {
            VarSort::Int
        } else {
            VarSort::Real
        };
        self.vars
            .push(VarInfo::new(t, sort, N::from_i64(self.config.var_range)));
        v
    }

    /// Compile a numeric term to a variable, allocating a sum definition
    /// unless the term reduces to a single unit-coefficient argument.
    pub(crate) fn mk_term(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> NumResult<VarId> {
        if let Some(&v) = self.term_to_var.get(&t) {
            return Ok(v);
        }
        let mut term = LinearTerm::new(N::zero());
        self.add_args(ctx, &mut term, t, N::one())?;
        if term.coeff.is_zero() && term.args.len() == 1 && term.args[0].0 == N::one() {
            return Ok(term.args[0].1);
        }
        let v = self.mk_var(ctx, t);
        let idx = self.sums.len();
        let mut sum = term.coeff.clone();
        for (c, w) in &term.args {
            self.vars[*w].adds.push(idx);
            sum = sum.checked_add(&c.checked_mul(self.value(*w))?)?;
        }
        self.sums.push(SumDef {
            var: v,
            coeff: term.coeff,
            args: term.args,
        });
        self.vars[v].def = Some(Def::Sum(idx));
        self.vars[v].value = sum;
        Ok(v)
    }

    /// Accumulate `coeff * t` into a linear combination.
    pub(crate) fn add_args(
        &mut self,
        ctx: &mut dyn SearchContext,
        term: &mut LinearTerm<N>,
        t: TermId,
        coeff: N,
    ) -> NumResult<()> {
        let known = self.term_to_var.get(&t).copied();
        let kind = ctx.kind(t).clone();
        match kind {
            TermKind::Numeral(r) => {
                let n = N::from_rational(&r)?;
                term.coeff = term.coeff.checked_add(&coeff.checked_mul(&n)?)?;
            }
            TermKind::Add(args) => {
                for a in args {
                    self.add_args(ctx, term, a, coeff.clone())?;
                }
            }
            TermKind::Sub(x, y) => {
                self.add_args(ctx, term, x, coeff.clone())?;
                self.add_args(ctx, term, y, coeff.checked_neg()?)?;
            }
            TermKind::Mul(args) => self.add_mul_args(ctx, term, t, &args, coeff)?,
            TermKind::Neg(x) => self.add_args(ctx, term, x, coeff.checked_neg()?)?,
            _ if known.is_some() => {
                if let Some(v) = known {
                    add_arg(term, coeff, v);
                }
            }
            TermKind::Mod(x, y) => {
                let v = self.mk_op(ctx, OpKind::Mod, t, x, y)?;
                add_arg(term, coeff, v);
            }
            TermKind::Rem(x, y) => {
                let v = self.mk_op(ctx, OpKind::Rem, t, x, y)?;
                add_arg(term, coeff, v);
            }
            TermKind::IntDiv(x, y) => {
                let v = self.mk_op(ctx, OpKind::IntDiv, t, x, y)?;
                add_arg(term, coeff, v);
            }
            TermKind::Div(x, y) => {
                let v = self.mk_op(ctx, OpKind::Div, t, x, y)?;
                add_arg(term, coeff, v);
            }
            TermKind::Power(x, y) => {
                let v = self.mk_op(ctx, OpKind::Power, t, x, y)?;
                add_arg(term, coeff, v);
            }
            TermKind::Abs(x) => {
                let v = self.mk_op(ctx, OpKind::Abs, t, x, x)?;
                add_arg(term, coeff, v);
            }
            TermKind::ToInt(x) => {
                let v = self.mk_op(ctx, OpKind::ToInt, t, x, x)?;
                add_arg(term, coeff, v);
            }
            TermKind::ToReal(x) => {
                let v = self.mk_op(ctx, OpKind::ToReal, t, x, x)?;
                add_arg(term, coeff, v);
            }
            _ => {
                let v = self.mk_var(ctx, t);
                add_arg(term, coeff, v);
            }
        }
        Ok(())
    }

    fn add_mul_args(
        &mut self,
        ctx: &mut dyn SearchContext,
        term: &mut LinearTerm<N>,
        t: TermId,
        args: &[TermId],
        coeff: N,
    ) -> NumResult<()> {
        if let [x, y] = *args {
            if let TermKind::Numeral(r) = ctx.kind(x) {
                let n = N::from_rational(&r.clone())?;
                return self.add_args(ctx, term, y, n.checked_mul(&coeff)?);
            }
            // c * (a + b) with a binary sum distributes into fresh products
            // so the outer combination stays linear in atomic terms.
            if let TermKind::Add(zs) = ctx.kind(y) {
                if let [z, u] = *zs.as_slice() {
                    let t1 = ctx.mk_mul_pair(x, z);
                    self.new_terms.push(t1);
                    self.add_args(ctx, term, t1, coeff.clone())?;
                    let t2 = ctx.mk_mul_pair(x, u);
                    self.new_terms.push(t2);
                    return self.add_args(ctx, term, t2, coeff);
                }
            }
            if let TermKind::Add(zs) = ctx.kind(x) {
                if let [z, u] = *zs.as_slice() {
                    let t1 = ctx.mk_mul_pair(y, z);
                    self.new_terms.push(t1);
                    self.add_args(ctx, term, t1, coeff.clone())?;
                    let t2 = ctx.mk_mul_pair(y, u);
                    self.new_terms.push(t2);
                    return self.add_args(ctx, term, t2, coeff);
                }
            }
        }
        let mut ms: Vec<VarId> = Vec::with_capacity(args.len());
        for &arg in args {
            ms.push(self.mk_term(ctx, arg)?);
        }
        match ms.len() {
            0 => term.coeff = term.coeff.checked_add(&coeff)?,
            1 => add_arg(term, coeff, ms[0]),
            _ => {
                let v = self.mk_var(ctx, t);
                let existing = self.muls.iter().position(|md| md.var == v);
                if existing.is_none() {
                    let idx = self.muls.len();
                    ms.sort_unstable();
                    let mut monomial: SmallVec<[(VarId, u32); 2]> = SmallVec::new();
                    let mut i = 0;
                    while i < ms.len() {
                        let w = ms[i];
                        let mut p = 1;
                        while i + 1 < ms.len() && ms[i + 1] == w {
                            p += 1;
                            i += 1;
                        }
                        monomial.push((w, p));
                        i += 1;
                    }
                    let mut prod = N::one();
                    for (w, p) in &monomial {
                        self.vars[*w].muls.push(idx);
                        prod = prod.checked_mul(&power_of(self.value(*w), *p)?)?;
                    }
                    self.muls.push(MulDef { var: v, monomial });
                    self.vars[v].def = Some(Def::Mul(idx));
                    self.vars[v].value = prod;
                }
                add_arg(term, coeff, v);
            }
        }
        Ok(())
    }

    /// Intern an op-defined variable with its value computed from the
    /// current child values. Division by zero evaluates to 0.
    pub(crate) fn mk_op(
        &mut self,
        ctx: &mut dyn SearchContext,
        kind: OpKind,
        t: TermId,
        x: TermId,
        y: TermId,
    ) -> NumResult<VarId> {
        let v = self.mk_var(ctx, t);
        let vx = self.mk_term(ctx, x)?;
        let vy = self.mk_term(ctx, y)?;
        let idx = self.ops.len();
        let zero = N::zero();
        let val = match kind {
            OpKind::Mod => {
                if self.value(vy).is_zero() {
                    zero
                } else {
                    self.value(vx).modulo(self.value(vy))?
                }
            }
            OpKind::Rem => {
                if self.value(vy).is_zero() {
                    zero
                } else {
                    self.value(vx).rem(self.value(vy))?
                }
            }
            OpKind::IntDiv => {
                if self.value(vy).is_zero() {
                    zero
                } else {
                    self.value(vx).div(self.value(vy))?
                }
            }
            OpKind::Div => {
                if self.value(vy).is_zero() {
                    zero
                } else {
                    self.value(vx).exact_div(self.value(vy))?
                }
            }
            OpKind::Abs => self.value(vx).checked_abs()?,
            OpKind::Power => power_value(self.value(vx), self.value(vy))?,
            OpKind::ToInt => self.value(vx).floor(),
            OpKind::ToReal => self.value(vx).clone(),
        };
        self.ops.push(OpDef {
            var: v,
            kind,
            arg1: vx,
            arg2: vy,
        });
        self.vars[v].def = Some(Def::Op(idx));
        self.vars[v].value = val;
        Ok(v)
    }

    /// Attach a canonicalised atom to a Boolean variable, if its term is an
    /// arithmetic (in)equality. Idempotent.
    pub fn init_bool_var(&mut self, ctx: &mut dyn SearchContext, bv: BoolVar) {
        let idx = bv as usize;
        if idx < self.ineqs.len() && self.ineqs[idx].is_some() {
            return;
        }
        let Some(t) = ctx.atom(bv) else {
            return;
        };
        if self.ineqs.len() <= idx {
            self.ineqs.resize_with(idx + 1, || None);
        }
        let kind = ctx.kind(t).clone();
        let built = match kind {
            TermKind::Le(x, y) => self.mk_ineq(ctx, bv, IneqKind::Le, 0, x, y),
            TermKind::Ge(x, y) => self.mk_ineq(ctx, bv, IneqKind::Le, 0, y, x),
            TermKind::Lt(x, y) if ctx.is_int(x) => self.mk_ineq(ctx, bv, IneqKind::Le, 1, x, y),
            TermKind::Gt(x, y) if ctx.is_int(x) => self.mk_ineq(ctx, bv, IneqKind::Le, 1, y, x),
            TermKind::Lt(x, y) => self.mk_ineq(ctx, bv, IneqKind::Lt, 0, x, y),
            TermKind::Gt(x, y) => self.mk_ineq(ctx, bv, IneqKind::Lt, 0, y, x),
            TermKind::Eq(x, y) if ctx.is_numeric(x) => {
                self.mk_ineq(ctx, bv, IneqKind::Eq, 0, x, y)
            }
            TermKind::Distinct(_) => {
                debug!(term = %t, "distinct atom handled by dedicated repair");
                Ok(())
            }
            _ => Ok(()),
        };
        if built.is_err() {
            trace!(bool_var = bv, "atom dropped: value does not fit the backend");
        }
        self.add_new_terms(ctx);
    }

    fn mk_ineq(
        &mut self,
        ctx: &mut dyn SearchContext,
        bv: BoolVar,
        op: IneqKind,
        coeff: i64,
        pos: TermId,
        neg: TermId,
    ) -> NumResult<()> {
        let mut term = LinearTerm::new(N::from_i64(coeff));
        self.add_args(ctx, &mut term, pos, N::one())?;
        self.add_args(ctx, &mut term, neg, N::from_i64(-1))?;
        self.init_ineq(bv, op, term)
    }

    /// Canonicalise a linear combination into an atom: unique sorted
    /// arguments, parallel monomial expansion, cached value, occurrence
    /// back-references, and the grouped non-linear index.
    pub(crate) fn init_ineq(
        &mut self,
        bv: BoolVar,
        op: IneqKind,
        term: LinearTerm<N>,
    ) -> NumResult<()> {
        let mut args = term.args;
        args.sort_by_key(|(_, v)| *v);
        let mut folded: Vec<(N, VarId)> = Vec::with_capacity(args.len());
        for (c, v) in args {
            if let Some(last) = folded.last_mut() {
                if last.1 == v {
                    last.0 = last.0.checked_add(&c)?;
                    continue;
                }
            }
            folded.push((c, v));
        }
        folded.retain(|(c, _)| !c.is_zero());

        let mut ineq = Ineq::new(op, term.coeff);
        for (_, v) in &folded {
            if let Some(Def::Mul(i)) = self.vars[*v].def {
                ineq.monomials.push(self.muls[i].monomial.clone());
            } else {
                ineq.monomials.push(smallvec![(*v, 1)]);
            }
        }
        ineq.args_value = ineq.coeff.clone();
        for (c, v) in &folded {
            self.vars[*v].linear_occurs.push((c.clone(), bv));
            ineq.args_value = ineq.args_value.checked_add(&c.checked_mul(self.value(*v))?)?;
            if let Some(Def::Mul(i)) = self.vars[*v].def {
                for (w, p) in self.muls[i].monomial.clone() {
                    ineq.nonlinear.push((
                        w,
                        smallvec![NlCoeff {
                            var: *v,
                            coeff: c.clone(),
                            power: p,
                        }],
                    ));
                }
                ineq.is_linear = false;
            } else {
                ineq.nonlinear.push((
                    *v,
                    smallvec![NlCoeff {
                        var: *v,
                        coeff: c.clone(),
                        power: 1,
                    }],
                ));
            }
        }
        ineq.args = folded;

        // Group occurrences by inner variable.
        ineq.nonlinear.sort_by_key(|(x, _)| *x);
        let mut grouped: Vec<(VarId, SmallVec<[NlCoeff<N>; 2]>)> = Vec::new();
        for (x, nl) in std::mem::take(&mut ineq.nonlinear) {
            if let Some(last) = grouped.last_mut() {
                if last.0 == x {
                    last.1.extend(nl);
                    continue;
                }
            }
            grouped.push((x, nl));
        }
        for (_, nl) in &mut grouped {
            if nl.len() == 1 {
                continue;
            }
            nl.sort_by_key(|e| e.power);
            let entries = std::mem::take(nl);
            for e in entries {
                if let Some(last) = nl.last_mut() {
                    if last.var == e.var {
                        last.coeff = last.coeff.checked_add(&e.coeff)?;
                        continue;
                    }
                }
                nl.push(e);
            }
        }
        ineq.nonlinear = grouped;

        self.ineqs[bv as usize] = Some(ineq);
        Ok(())
    }

    /// Flip the Boolean assignment of an atom so it matches arithmetic
    /// truth under the current values.
    pub fn init_bool_var_assignment(&mut self, ctx: &mut dyn SearchContext, bv: BoolVar) {
        if let Some(ineq) = self.get_ineq(bv) {
            if ineq.is_true() != ctx.is_true(Lit::positive(bv)) {
                ctx.flip(bv);
            }
        }
        if let Some(t) = ctx.atom(bv) {
            if self.is_distinct(ctx, t)
                && self.eval_distinct(ctx, t) != ctx.is_true(Lit::positive(bv))
            {
                ctx.flip(bv);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Sort;
    use crate::context::Harness;
    use sls_num::CheckedInt64;

    fn n(v: i64) -> CheckedInt64 {
        CheckedInt64::new(v)
    }

    #[test]
    fn duplicate_arguments_fold() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let sum = ctx.terms_mut().mk_add(vec![x, x]);
        let zero = ctx.terms_mut().mk_int(0);
        let atom = ctx.terms_mut().mk_le(sum, zero);
        let bv = ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let ineq = engine.get_ineq(bv).unwrap();
        assert_eq!(ineq.args.len(), 1);
        assert_eq!(ineq.args[0].0, n(2));
    }

    #[test]
    fn cancelling_arguments_vanish() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let diff = ctx.terms_mut().mk_sub(x, x);
        let one = ctx.terms_mut().mk_int(1);
        let atom = ctx.terms_mut().mk_le(diff, one);
        let bv = ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let ineq = engine.get_ineq(bv).unwrap();
        assert!(ineq.args.is_empty());
        assert_eq!(ineq.coeff, n(-1));
        assert!(ineq.is_true());
    }

    #[test]
    fn repeated_factors_merge_into_powers() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let y = ctx.terms_mut().mk_var("y", Sort::Int);
        let m = ctx.terms_mut().mk_mul(vec![x, y, x]);
        let zero = ctx.terms_mut().mk_int(0);
        let atom = ctx.terms_mut().mk_le(m, zero);
        let bv = ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let ineq = engine.get_ineq(bv).unwrap();
        assert_eq!(ineq.monomials.len(), 1);
        let monomial = &ineq.monomials[0];
        assert_eq!(monomial.len(), 2);
        assert_eq!(monomial[0].1 + monomial[1].1, 3);
        assert!(!ineq.is_linear);
    }

    #[test]
    fn strict_integer_comparison_is_rewritten() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let y = ctx.terms_mut().mk_var("y", Sort::Int);
        let atom = ctx.terms_mut().mk_lt(x, y);
        let bv = ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let ineq = engine.get_ineq(bv).unwrap();
        assert_eq!(ineq.op, IneqKind::Le);
        assert_eq!(ineq.coeff, n(1));
        // x = y = 0 falsifies the strict comparison.
        assert!(!ineq.is_true());
    }

    #[test]
    fn numeric_coefficient_distributes_over_sums() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let y = ctx.terms_mut().mk_var("y", Sort::Int);
        let two = ctx.terms_mut().mk_int(2);
        let sum = ctx.terms_mut().mk_add(vec![x, y]);
        let prod = ctx.terms_mut().mk_mul(vec![two, sum]);
        let zero = ctx.terms_mut().mk_int(0);
        let atom = ctx.terms_mut().mk_le(prod, zero);
        let bv = ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let ineq = engine.get_ineq(bv).unwrap();
        // 2*(x + y) becomes 2x + 2y: two linear arguments, coefficient 2.
        assert_eq!(ineq.args.len(), 2);
        assert!(ineq.args.iter().all(|(c, _)| *c == n(2)));
        assert!(ineq.is_linear);
    }

    #[test]
    fn op_nodes_evaluate_from_child_values() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let seven = ctx.terms_mut().mk_int(7);
        let m = ctx.terms_mut().mk_mod(x, seven);
        let zero = ctx.terms_mut().mk_int(0);
        let atom = ctx.terms_mut().mk_ge(m, zero);
        ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let v = *engine.term_to_var.get(&m).unwrap();
        // x = 0, so mod(0, 7) = 0.
        assert_eq!(*engine.value(v), n(0));
        assert!(matches!(engine.vars[v].def, Some(Def::Op(_))));
    }
}
