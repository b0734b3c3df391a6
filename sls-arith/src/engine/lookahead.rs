//! Global lookahead search.
//!
//! Maintains a per-assertion score in `[0, 1]` (how close the assertion is
//! to being true) and an integer weight adjusted by probabilistic additive
//! weight smoothing. Each iteration picks a false assertion by UCB, collects
//! its fixable expressions, and tries a random inc/dec walk, hill-climbing
//! over scored candidate moves, or a random update. Candidate moves are
//! scored by speculatively propagating the change through the dependency
//! cone (a depth-indexed update stack) and reading the weighted score delta.

use super::node::{Def, IneqKind, VarId};
use super::ArithSls;
use crate::ast::{TermId, TermKind};
use crate::context::SearchContext;
use crate::literal::{BoolVar, Lit};
use rustc_hash::FxHashSet;
use sls_num::Num;
use std::fmt;
use tracing::{debug, trace};

/// Per-formula bookkeeping for the global search.
#[derive(Debug, Clone)]
pub(crate) struct BoolInfo {
    /// Cached truth value under the current model.
    pub value: Option<bool>,
    /// PAWS weight.
    pub weight: u32,
    /// UCB touch counter.
    pub touched: u32,
    /// Last computed score.
    pub score: f64,
    /// Atoms that can be flipped to repair this formula.
    pub fixable_atoms: FxHashSet<BoolVar>,
    /// Variables whose value can be changed to repair this formula.
    pub fixable_vars: FxHashSet<VarId>,
    /// The memoised fixable expressions.
    pub fixable_exprs: Vec<TermId>,
}

impl BoolInfo {
    fn new(paws_init: u32) -> Self {
        Self {
            value: None,
            weight: paws_init,
            touched: 1,
            score: 0.0,
            fixable_atoms: FxHashSet::default(),
            fixable_vars: FxHashSet::default(),
            fixable_exprs: Vec::new(),
        }
    }
}

/// The three global move flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    /// Commit a single randomly chosen candidate move.
    RandomUpdate,
    /// Evaluate every candidate move and keep the best-scoring one.
    Hillclimb,
    /// Nudge a random variable by one (or jump inside its finite domain).
    RandomIncDec,
}

impl fmt::Display for MoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MoveType::RandomUpdate => "random-update",
            MoveType::Hillclimb => "hillclimb",
            MoveType::RandomIncDec => "random-inc-dec",
        };
        write!(f, "{s}")
    }
}

impl<N: Num> ArithSls<N> {
    pub(crate) fn get_bool_info(&mut self, t: TermId) -> &mut BoolInfo {
        let paws_init = self.config.paws_init;
        self.bool_info
            .entry(t)
            .or_insert_with(|| BoolInfo::new(paws_init))
    }

    pub(crate) fn set_bool_value(&mut self, t: TermId, value: bool) {
        self.get_bool_info(t).value = Some(value);
    }

    /// Cached truth value of a Boolean term, computing it on first use.
    pub(crate) fn get_bool_value(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> bool {
        if let Some(v) = self.bool_info.get(&t).and_then(|i| i.value) {
            return v;
        }
        let v = self.get_bool_value_rec(ctx, t);
        self.set_bool_value(t, v);
        v
    }

    /// Truth of a Boolean term from its structure and the current model.
    pub(crate) fn get_bool_value_rec(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> bool {
        let kind = ctx.kind(t).clone();
        match kind {
            TermKind::True => true,
            TermKind::False => false,
            TermKind::Not(x) => !self.get_bool_value(ctx, x),
            TermKind::And(args) => args.into_iter().all(|a| self.get_bool_value(ctx, a)),
            TermKind::Or(args) => args.into_iter().any(|a| self.get_bool_value(ctx, a)),
            TermKind::Xor(args) => {
                let mut r = false;
                for a in args {
                    r ^= self.get_bool_value(ctx, a);
                }
                r
            }
            TermKind::Implies(x, y) => {
                !self.get_bool_value(ctx, x) || self.get_bool_value(ctx, y)
            }
            TermKind::Iff(x, y) => self.get_bool_value(ctx, x) == self.get_bool_value(ctx, y),
            TermKind::Ite(c, x, y) => {
                if self.get_bool_value(ctx, c) {
                    self.get_bool_value(ctx, x)
                } else {
                    self.get_bool_value(ctx, y)
                }
            }
            TermKind::Eq(x, y) if ctx.is_bool(x) => {
                self.get_bool_value(ctx, x) == self.get_bool_value(ctx, y)
            }
            TermKind::Distinct(_) => false,
            TermKind::Eq(..)
            | TermKind::Le(..)
            | TermKind::Lt(..)
            | TermKind::Ge(..)
            | TermKind::Gt(..) => {
                let Some(bv) = ctx.atom_to_bool_var(t) else {
                    return false;
                };
                let Some(ineq) = self.get_ineq(bv) else {
                    return false;
                };
                ineq.is_true()
            }
            TermKind::Var(_) => ctx.bool_value(t),
            _ => ctx.bool_value(t),
        }
    }

    pub(crate) fn old_score(&mut self, t: TermId) -> f64 {
        self.get_bool_info(t).score
    }

    pub(crate) fn set_score(&mut self, t: TermId, score: f64) {
        self.get_bool_info(t).score = score;
    }

    pub(crate) fn get_weight(&mut self, t: TermId) -> u32 {
        self.get_bool_info(t).weight
    }

    pub(crate) fn inc_weight(&mut self, t: TermId) {
        self.get_bool_info(t).weight += 1;
    }

    pub(crate) fn dec_weight(&mut self, t: TermId) {
        let floor = self.config.paws_init;
        let info = self.get_bool_info(t);
        if info.weight > floor {
            info.weight -= 1;
        }
    }

    pub(crate) fn get_touched(&mut self, t: TermId) -> u32 {
        self.get_bool_info(t).touched
    }

    pub(crate) fn set_touched(&mut self, t: TermId, touched: u32) {
        self.get_bool_info(t).touched = touched;
    }

    pub(crate) fn inc_touched(&mut self, t: TermId) {
        self.get_bool_info(t).touched += 1;
    }

    /// Score of asserting a formula to `true`.
    pub(crate) fn new_score(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> f64 {
        self.new_score_signed(ctx, t, true)
    }

    /// Score in `[0, 1]` of how close a formula is to taking the requested
    /// truth value: 1 when it already does, a sigmoid of the boundary
    /// distance for atoms, min/max over the children of connectives.
    pub(crate) fn new_score_signed(
        &mut self,
        ctx: &mut dyn SearchContext,
        t: TermId,
        is_true: bool,
    ) -> f64 {
        let current = self.get_bool_value(ctx, t);
        if current == is_true {
            return 1.0;
        }
        let kind = ctx.kind(t).clone();
        match kind {
            TermKind::Var(_) => 0.0,
            TermKind::True => {
                if is_true {
                    1.0
                } else {
                    0.0
                }
            }
            TermKind::False => {
                if is_true {
                    0.0
                } else {
                    1.0
                }
            }
            TermKind::Not(x) => self.new_score_signed(ctx, x, !is_true),
            TermKind::And(args) if is_true => {
                let mut score = 1.0f64;
                for a in args {
                    score = score.min(self.new_score_signed(ctx, a, true));
                }
                score
            }
            TermKind::Or(args) if !is_true => {
                let mut score = 1.0f64;
                for a in args {
                    score = score.min(self.new_score_signed(ctx, a, false));
                }
                score
            }
            TermKind::And(args) => {
                let mut score = 0.0f64;
                for a in args {
                    score = score.max(self.new_score_signed(ctx, a, is_true));
                }
                score
            }
            TermKind::Or(args) => {
                let mut score = 0.0f64;
                for a in args {
                    score = score.max(self.new_score_signed(ctx, a, is_true));
                }
                score
            }
            TermKind::Iff(x, y) => {
                let v0 = self.get_bool_value(ctx, x);
                let v1 = self.get_bool_value(ctx, y);
                if is_true == (v0 == v1) {
                    1.0
                } else {
                    0.0
                }
            }
            TermKind::Eq(x, y) if ctx.is_bool(x) => {
                let v0 = self.get_bool_value(ctx, x);
                let v1 = self.get_bool_value(ctx, y);
                if is_true == (v0 == v1) {
                    1.0
                } else {
                    0.0
                }
            }
            TermKind::Ite(c, x, y) => {
                if self.get_bool_value(ctx, c) {
                    self.new_score_signed(ctx, x, is_true)
                } else {
                    self.new_score_signed(ctx, y, is_true)
                }
            }
            _ => {
                let Some(bv) = ctx.atom_to_bool_var(t) else {
                    return 0.0;
                };
                let Some(ineq) = self.get_ineq(bv) else {
                    return 0.0;
                };
                let zero = N::zero();
                let mut value = ineq.args_value.clone();
                match ineq.op {
                    IneqKind::Le => {
                        if is_true {
                            if value <= zero {
                                return 1.0;
                            }
                        } else {
                            if value > zero {
                                return 1.0;
                            }
                            let Ok(v) = value.checked_neg().and_then(|v| v.checked_add(&N::one()))
                            else {
                                return 0.0;
                            };
                            value = v;
                        }
                    }
                    IneqKind::Lt => {
                        if is_true {
                            if value < zero {
                                return 1.0;
                            }
                        } else {
                            if value >= zero {
                                return 1.0;
                            }
                            let Ok(v) = value.checked_neg() else {
                                return 0.0;
                            };
                            value = v;
                        }
                    }
                    IneqKind::Eq => {
                        if is_true {
                            if value.is_zero() {
                                return 1.0;
                            }
                            if value < zero {
                                let Ok(v) = value.checked_neg() else {
                                    return 0.0;
                                };
                                value = v;
                            }
                        } else {
                            return if value.is_zero() { 0.0 } else { 1.0 };
                        }
                    }
                }
                debug_assert!(value > zero);
                let max_value = 1000.0f64;
                if value > N::from_i64(1000) {
                    return 0.0;
                }
                let d = value.to_f64();
                1.0 - (d * d) / (max_value * max_value)
            }
        }
    }

    /// Recompute scores for all roots and reset the running total.
    pub(crate) fn rescore(&mut self, ctx: &mut dyn SearchContext) {
        self.top_score = 0.0;
        self.is_root.clear();
        for a in ctx.input_assertions() {
            let score = self.new_score(ctx, a);
            self.set_score(a, score);
            self.top_score += score;
            self.is_root.insert(a);
        }
    }

    /// PAWS: occasionally forgive satisfied roots, otherwise punish false
    /// ones.
    pub(crate) fn recalibrate_weights(&mut self, ctx: &mut dyn SearchContext) {
        for a in ctx.input_assertions() {
            if ctx.rand_below(2047) < self.config.paws_sp {
                if self.get_bool_value(ctx, a) {
                    self.dec_weight(a);
                }
            } else if !self.get_bool_value(ctx, a) {
                self.inc_weight(a);
            }
        }
    }

    // ------------------------------------------------------------------
    // Depth-indexed update stack over the dependency cone.
    // ------------------------------------------------------------------

    pub(crate) fn insert_update_stack(&mut self, ctx: &dyn SearchContext, t: TermId) {
        let depth = ctx.depth(t);
        if self.update_stack.len() <= depth {
            self.update_stack.resize_with(depth + 1, Vec::new);
        }
        if self.in_update_stack.insert(t) {
            self.update_stack[depth].push(t);
        }
    }

    /// Seed the stack with `t` and close it under parent edges.
    pub(crate) fn insert_update_stack_rec(&mut self, ctx: &dyn SearchContext, t: TermId) {
        self.min_depth = ctx.depth(t);
        self.max_depth = self.min_depth;
        self.insert_update_stack(ctx, t);
        let mut depth = self.max_depth;
        while depth <= self.max_depth {
            let mut i = 0;
            while i < self.update_stack.get(depth).map_or(0, Vec::len) {
                let a = self.update_stack[depth][i];
                let parents: Vec<TermId> = ctx.parents(a).to_vec();
                for p in parents {
                    self.insert_update_stack(ctx, p);
                    self.max_depth = self.max_depth.max(ctx.depth(p));
                }
                i += 1;
            }
            depth += 1;
        }
        if self.update_stack.len() <= self.max_depth {
            self.update_stack.resize_with(self.max_depth + 1, Vec::new);
        }
    }

    pub(crate) fn clear_update_stack(&mut self) {
        self.in_update_stack.clear();
        if self.update_stack.is_empty() {
            return;
        }
        let hi = self.max_depth.min(self.update_stack.len() - 1);
        for depth in self.min_depth..=hi {
            self.update_stack[depth].clear();
        }
    }

    /// Walk the stack bottom-up, refreshing cached Boolean values, and
    /// return the total score as if the current state were committed.
    /// Stored per-root scores are only written when `update_score` holds.
    pub(crate) fn lookahead(
        &mut self,
        ctx: &mut dyn SearchContext,
        t: TermId,
        update_score: bool,
    ) -> f64 {
        let mut score = self.top_score;
        for depth in self.min_depth..=self.max_depth {
            let mut i = 0;
            while i < self.update_stack.get(depth).map_or(0, Vec::len) {
                let a = self.update_stack[depth][i];
                if a != t && ctx.is_bool(a) {
                    let v = self.get_bool_value_rec(ctx, a);
                    self.set_bool_value(a, v);
                }
                if self.is_root.contains(&a) {
                    let nscore = self.new_score(ctx, a);
                    score += f64::from(self.get_weight(a)) * (nscore - self.old_score(a));
                    if update_score {
                        self.set_score(a, nscore);
                    }
                }
                i += 1;
            }
        }
        score
    }

    /// Score the move `v += delta` by speculative propagation, remembering
    /// it when it beats the best seen so far, then revert.
    pub(crate) fn lookahead_num(&mut self, ctx: &mut dyn SearchContext, v: VarId, delta: N) {
        let old_value = self.value(v).clone();
        let e = self.vars[v].term;
        if self.last_expr != Some(e) {
            if let Some(le) = self.last_expr {
                self.lookahead(ctx, le, false);
            }
            self.clear_update_stack();
            self.insert_update_stack_rec(ctx, e);
            self.last_expr = Some(e);
        } else if self.last_delta == delta {
            return;
        }
        self.last_delta = delta.clone();

        let Ok(new_value) = old_value.checked_add(&delta) else {
            return;
        };
        if !self.update_num(ctx, v, &delta) {
            return;
        }
        let score = self.lookahead(ctx, e, false);
        trace!(var = v, delta = %delta, score, best = self.best_score, "lookahead");
        if score > self.best_score {
            self.best_score = score;
            self.best_value = new_value;
            self.best_expr = Some(e);
        }
        let _ = self.update_args_value(v, old_value);
    }

    /// Score flipping a Boolean candidate, then restore the cache.
    pub(crate) fn lookahead_bool(&mut self, ctx: &mut dyn SearchContext, e: TermId) {
        let b = self.get_bool_value(ctx, e);
        self.set_bool_value(e, !b);
        let score = self.lookahead(ctx, e, false);
        if score > self.best_score {
            self.best_score = score;
            self.best_expr = Some(e);
        }
        self.set_bool_value(e, b);
        self.lookahead(ctx, e, false);
    }

    /// Generate candidate moves (or Boolean flips) for one fixable
    /// expression of the current formula.
    pub(crate) fn add_lookahead(
        &mut self,
        ctx: &mut dyn SearchContext,
        fixable_atoms: &FxHashSet<BoolVar>,
        fixable_vars: &FxHashSet<VarId>,
        e: TermId,
    ) {
        if ctx.is_bool(e) {
            if let Some(bv) = ctx.atom_to_bool_var(e) {
                if fixable_atoms.contains(&bv) {
                    self.lookahead_bool(ctx, e);
                }
            }
        } else if ctx.is_numeric(e) {
            let Ok(v) = self.mk_term(ctx, e) else {
                return;
            };
            for i in 0..self.vars[v].linear_occurs.len() {
                let bv = self.vars[v].linear_occurs[i].1;
                self.add_atom_moves(fixable_atoms, fixable_vars, bv);
            }
            let mul_parents = self.vars[v].muls.clone();
            for idx in mul_parents {
                let x = self.muls[idx].var;
                for i in 0..self.vars[x].linear_occurs.len() {
                    let bv = self.vars[x].linear_occurs[i].1;
                    self.add_atom_moves(fixable_atoms, fixable_vars, bv);
                }
            }
        }
    }

    fn add_atom_moves(
        &mut self,
        fixable_atoms: &FxHashSet<BoolVar>,
        fixable_vars: &FxHashSet<VarId>,
        bv: BoolVar,
    ) {
        if !fixable_atoms.contains(&bv) {
            return;
        }
        if self.fixed_atoms.contains(&bv) {
            return;
        }
        let Some(ineq) = self.get_ineq(bv) else {
            return;
        };
        let nonlinear = ineq.nonlinear.clone();
        let args_value = ineq.args_value.clone();
        for (x, nl) in &nonlinear {
            if !fixable_vars.contains(x) {
                continue;
            }
            if self.is_fixed_var(*x) {
                continue;
            }
            match self.linear_coeff(*x, nl) {
                Ok(Some(b)) => {
                    let _ = self.find_linear_moves(bv, *x, &b);
                }
                Ok(None) => {
                    if let Ok(Some((a, b))) = self.quadratic_coeffs(*x, nl) {
                        let _ = self.find_quadratic_moves(bv, *x, &a, &b, &args_value);
                    }
                }
                Err(_) => {}
            }
        }
        self.fixed_atoms.insert(bv);
    }

    /// The expressions whose assignment can repair a false formula: the
    /// closure of its atoms' inner variables under sum/product children,
    /// plus uninterpreted Boolean atoms. Memoised per formula.
    pub(crate) fn get_fixable_exprs(
        &mut self,
        ctx: &mut dyn SearchContext,
        f: TermId,
    ) -> Vec<TermId> {
        if let Some(info) = self.bool_info.get(&f) {
            if !info.fixable_exprs.is_empty() {
                return info.fixable_exprs.clone();
            }
        }
        let mut fatoms: FxHashSet<BoolVar> = FxHashSet::default();
        let mut fvars: FxHashSet<VarId> = FxHashSet::default();
        let mut fexprs: Vec<TermId> = Vec::new();
        let mut visited: FxHashSet<TermId> = FxHashSet::default();
        let mut todo = vec![f];
        while let Some(e) = todo.pop() {
            if !visited.insert(e) {
                continue;
            }
            let kind = ctx.kind(e).clone();
            match kind {
                TermKind::Xor(_)
                | TermKind::And(_)
                | TermKind::Or(_)
                | TermKind::Implies(..)
                | TermKind::Iff(..)
                | TermKind::Ite(..)
                | TermKind::Not(_) => {
                    todo.extend(kind.children());
                }
                _ => {
                    let Some(bv) = ctx.atom_to_bool_var(e) else {
                        continue;
                    };
                    if matches!(kind, TermKind::Var(_)) {
                        if fatoms.insert(bv) {
                            fexprs.push(e);
                        }
                        continue;
                    }
                    let Some(ineq) = self.get_ineq(bv) else {
                        continue;
                    };
                    fatoms.insert(bv);
                    let mut vars: Vec<VarId> = ineq.nonlinear.iter().map(|(v, _)| *v).collect();
                    let mut j = 0;
                    while j < vars.len() {
                        let v = vars[j];
                        j += 1;
                        if fvars.contains(&v) {
                            continue;
                        }
                        match self.vars[v].def {
                            Some(Def::Sum(i)) => {
                                vars.extend(self.sums[i].args.iter().map(|(_, w)| *w));
                            }
                            Some(Def::Mul(i)) => {
                                vars.extend(self.muls[i].monomial.iter().map(|(w, _)| *w));
                            }
                            _ => {
                                fexprs.push(self.vars[v].term);
                                fvars.insert(v);
                            }
                        }
                    }
                }
            }
        }
        let info = self.get_bool_info(f);
        info.fixable_atoms = fatoms;
        info.fixable_vars = fvars;
        info.fixable_exprs = fexprs.clone();
        fexprs
    }

    /// Execute one global move of the given flavour against formula `f`.
    pub(crate) fn apply_move(
        &mut self,
        ctx: &mut dyn SearchContext,
        f: TermId,
        vars: &[TermId],
        t: MoveType,
    ) -> bool {
        if vars.is_empty() {
            return false;
        }
        let (fatoms, fvars) = {
            let info = self.get_bool_info(f);
            (info.fixable_atoms.clone(), info.fixable_vars.clone())
        };
        self.best_expr = None;
        self.best_score = self.top_score;
        let sz = vars.len();
        let start = ctx.rand() as usize;
        self.updates.clear();
        self.fixed_atoms.clear();

        match t {
            MoveType::RandomUpdate => {
                for i in 0..sz {
                    self.add_lookahead(ctx, &fatoms, &fvars, vars[(start + i) % sz]);
                }
                if self.updates.is_empty() {
                    return false;
                }
                let idx = ctx.rand() as usize % self.updates.len();
                let (v, delta) = {
                    let u = &self.updates[idx];
                    (u.var, u.delta.clone())
                };
                self.best_expr = Some(self.vars[v].term);
                let Ok(nv) = self.value(v).checked_add(&delta) else {
                    return false;
                };
                self.best_value = nv;
            }
            MoveType::Hillclimb => {
                for i in 0..sz {
                    self.add_lookahead(ctx, &fatoms, &fvars, vars[(start + i) % sz]);
                }
                if self.updates.is_empty() {
                    return false;
                }
                self.updates.sort_by(|a, b| {
                    a.var.cmp(&b.var).then_with(|| a.delta.cmp(&b.delta))
                });
                self.last_expr = None;
                let len = self.updates.len();
                for i in 0..len {
                    let (v, delta) = {
                        let u = &self.updates[(start + i) % len];
                        (u.var, u.delta.clone())
                    };
                    self.lookahead_num(ctx, v, delta);
                }
                if let Some(le) = self.last_expr {
                    self.lookahead(ctx, le, false);
                    self.clear_update_stack();
                }
            }
            MoveType::RandomIncDec => {
                let e = vars[ctx.rand() as usize % sz];
                self.best_expr = Some(e);
                if ctx.is_numeric(e) {
                    let Ok(v) = self.mk_term(ctx, e) else {
                        return false;
                    };
                    let fd = self.vars[v].finite_domain.clone();
                    if !fd.is_empty() {
                        self.best_value = fd[ctx.rand() as usize % fd.len()].clone();
                    } else {
                        let step = if ctx.rand_below(2) == 0 {
                            N::one()
                        } else {
                            N::from_i64(-1)
                        };
                        let Ok(nv) = self.value(v).checked_add(&step) else {
                            return false;
                        };
                        self.best_value = nv;
                    }
                }
            }
        }

        if let Some(best) = self.best_expr {
            if ctx.is_bool(best) {
                let b = self.get_bool_value(ctx, best);
                self.set_bool_value(best, !b);
            } else {
                let Ok(v) = self.mk_term(ctx, best) else {
                    return false;
                };
                let Ok(delta) = self.best_value.checked_sub(self.value(v)) else {
                    return false;
                };
                if !self.update_num(ctx, v, &delta) {
                    trace!(move_type = %t, var = v, "move not applicable");
                    return false;
                }
            }
            self.insert_update_stack_rec(ctx, best);
            self.top_score = self.lookahead(ctx, best, true);
            self.clear_update_stack();
        }
        self.best_expr.is_some()
    }

    /// Seed cached truth values for every Boolean subterm.
    pub(crate) fn initialize_bool_assignment(&mut self, ctx: &mut dyn SearchContext) {
        for t in ctx.subterms() {
            if ctx.is_bool(t) {
                let v = self.get_bool_value_rec(ctx, t);
                self.set_bool_value(t, v);
            }
        }
    }

    /// Push cached truth values back into the Boolean assignment.
    pub(crate) fn finalize_bool_assignment(&mut self, ctx: &mut dyn SearchContext) {
        for bv in (0..ctx.num_bool_vars()).rev() {
            let Some(a) = ctx.atom(bv) else {
                continue;
            };
            if self.get_bool_value(ctx, a) != ctx.is_true(Lit::positive(bv)) {
                ctx.flip(bv);
            }
        }
    }

    /// The main search loop: bounded hill-climbing with random walks,
    /// weight smoothing, and a growing restart schedule.
    pub fn global_search(&mut self, ctx: &mut dyn SearchContext) {
        self.initialize_bool_assignment(ctx);
        self.rescore(ctx);
        self.max_moves = self.stats.moves + self.config.max_moves_base;
        debug!(
            moves = self.stats.moves,
            max_moves = self.max_moves,
            "lookahead search"
        );

        while ctx.keep_going() && self.stats.moves < self.max_moves {
            self.stats.moves += 1;
            self.check_restart(ctx);

            let Some(t) = self.get_candidate_unsat(ctx) else {
                break;
            };
            let vars = self.get_fixable_exprs(ctx, t);
            if vars.is_empty() {
                break;
            }
            if ctx.rand_below(2047) < self.config.wp
                && self.apply_move(ctx, t, &vars, MoveType::RandomIncDec)
            {
                continue;
            }
            if self.apply_move(ctx, t, &vars, MoveType::Hillclimb) {
                continue;
            }
            if self.apply_move(ctx, t, &vars, MoveType::RandomUpdate) {
                self.recalibrate_weights(ctx);
            }
        }
        if self.stats.moves >= self.max_moves {
            self.config.max_moves_base += 100;
        }
        self.finalize_bool_assignment(ctx);
    }

    /// Pick a false assertion with a non-empty fixable set: by UCB score
    /// when enabled, by uniform reservoir sampling otherwise.
    pub(crate) fn get_candidate_unsat(&mut self, ctx: &mut dyn SearchContext) -> Option<TermId> {
        let mut e: Option<TermId> = None;
        if self.config.ucb {
            let mut max = -1.0f64;
            for a in ctx.input_assertions() {
                if self.get_bool_value(ctx, a) {
                    continue;
                }
                if self.get_fixable_exprs(ctx, a).is_empty() {
                    continue;
                }
                let score = self.old_score(a);
                let q = score
                    + self.config.ucb_constant
                        * ((self.touched_total as f64).ln() / f64::from(self.get_touched(a)))
                            .sqrt()
                    + self.config.ucb_noise * f64::from(ctx.rand_below(512));
                if q > max {
                    max = q;
                    e = Some(a);
                }
            }
            if let Some(a) = e {
                self.touched_total += 1;
                self.inc_touched(a);
            }
        } else {
            let mut n = 0u32;
            for a in ctx.input_assertions() {
                if !self.get_bool_value(ctx, a) && !self.get_fixable_exprs(ctx, a).is_empty() {
                    n += 1;
                    if ctx.rand() % n == 0 {
                        e = Some(a);
                    }
                }
            }
        }
        self.last_atom = e;
        if e.is_none() {
            trace!("no unsatisfied candidate");
        }
        e
    }

    /// Rescore on a fixed cadence and grow the restart horizon: the
    /// increment alternates between one base unit and an even multiple that
    /// scales with the restart count.
    pub(crate) fn check_restart(&mut self, ctx: &mut dyn SearchContext) {
        if self.stats.moves % self.config.restart_base == 0 {
            self.ucb_forget(ctx);
            self.rescore(ctx);
        }
        if self.stats.moves < self.restart_next {
            return;
        }
        self.stats.restarts += 1;
        self.restart_next = self.restart_next.max(self.stats.moves);
        if self.stats.restarts & 1 == 1 {
            self.restart_next += self.config.restart_base;
        } else {
            self.restart_next += 2 * (self.stats.restarts >> 1) * self.config.restart_base;
        }
        self.rescore(ctx);
    }

    /// Decay UCB touch counters so old choices stop dominating.
    pub(crate) fn ucb_forget(&mut self, ctx: &mut dyn SearchContext) {
        if self.config.ucb_forget >= 1.0 {
            return;
        }
        for a in ctx.input_assertions() {
            let touched_old = self.get_touched(a);
            let touched_new =
                (f64::from(touched_old - 1) * self.config.ucb_forget) as u32 + 1;
            self.set_touched(a, touched_new);
            self.touched_total -= u64::from(touched_old - touched_new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Sort;
    use crate::context::Harness;
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use sls_num::CheckedInt64;

    fn int(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    #[test]
    fn scores_track_boundary_distance() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let zero = ctx.terms_mut().mk_int(0);
        let atom = ctx.terms_mut().mk_le(x, zero);
        ctx.mk_bool_var(atom);
        ctx.add_assertion(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        assert!(engine.set_value(&mut ctx, x, &int(5)));
        engine.rescore(&mut ctx);
        let expected = 1.0 - 25.0 / 1_000_000.0;
        assert!((engine.top_score - expected).abs() < 1e-9);

        assert!(engine.set_value(&mut ctx, x, &int(0)));
        engine.rescore(&mut ctx);
        assert!((engine.top_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fixable_exprs_close_over_sum_and_product_children() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let y = ctx.terms_mut().mk_var("y", Sort::Int);
        let z = ctx.terms_mut().mk_var("z", Sort::Int);
        let sum = ctx.terms_mut().mk_add(vec![x, y]);
        let prod = ctx.terms_mut().mk_mul(vec![sum, z]);
        let zero = ctx.terms_mut().mk_int(0);
        let atom = ctx.terms_mut().mk_le(prod, zero);
        ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let fixable = engine.get_fixable_exprs(&mut ctx, atom);
        // Distribution turns (x + y) * z into x*z + y*z, whose factor
        // closure is exactly the three leaves.
        let mut got = fixable.clone();
        got.sort();
        let mut want = vec![x, y, z];
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn bool_connectives_evaluate_structurally() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let zero = ctx.terms_mut().mk_int(0);
        let le = ctx.terms_mut().mk_le(x, zero);
        let not_le = ctx.terms_mut().mk_not(le);
        let tt = ctx.terms_mut().mk_bool(true);
        let conj = ctx.terms_mut().mk_and(vec![not_le, tt]);
        ctx.mk_bool_var(le);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, le);
        // x = 0 satisfies the atom, so its negation (and the conjunction)
        // is false.
        assert!(engine.get_bool_value_rec(&mut ctx, le));
        assert!(!engine.get_bool_value_rec(&mut ctx, conj));
    }

    #[test]
    fn paws_weights_move_in_both_directions() {
        let mut ctx = Harness::new();
        let x = ctx.terms_mut().mk_var("x", Sort::Int);
        let zero = ctx.terms_mut().mk_int(0);
        let atom = ctx.terms_mut().mk_le(x, zero);
        ctx.mk_bool_var(atom);

        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        engine.register_term(&mut ctx, atom);
        let init = engine.get_weight(atom);
        engine.inc_weight(atom);
        assert_eq!(engine.get_weight(atom), init + 1);
        engine.dec_weight(atom);
        engine.dec_weight(atom);
        // The weight never drops below its initial PAWS value.
        assert_eq!(engine.get_weight(atom), init);
    }

    #[test]
    fn restart_schedule_grows() {
        let mut ctx = Harness::new();
        let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
        let base = engine.config.restart_base;
        engine.stats.moves = base;
        engine.check_restart(&mut ctx);
        assert_eq!(engine.stats.restarts, 1);
        let first = engine.restart_next;
        assert_eq!(first, base + base);
        engine.stats.moves = first;
        engine.check_restart(&mut ctx);
        assert_eq!(engine.stats.restarts, 2);
        assert_eq!(engine.restart_next, first + 2 * base);
    }
}
