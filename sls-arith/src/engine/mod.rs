//! The stochastic local search engine for arithmetic.
//!
//! Atoms and terms are compiled into an index-based DAG (sums, product
//! monomials, unary ops, inequality atoms). Search proceeds by proposing
//! value changes for numeric variables, propagating each committed change
//! through every dependent node, and flipping Boolean atoms so their
//! assignment always tracks arithmetic truth.
//!
//! # Modules
//!
//! - **node**: variable, sum, product, op, and atom representations
//! - **build**: term compilation and atom canonicalisation
//! - **update**: value-change propagation and its speculative variant
//! - **moves**: linear/quadratic/reset proposers, tabu, scoring, selection
//! - **repair**: literal repair and per-definition repair routines
//! - **lookahead**: global search with weighted scoring, PAWS, and UCB
//! - **init**: bound and finite-domain extraction from the input

mod build;
mod init;
mod lookahead;
mod moves;
mod node;
mod repair;
mod update;

pub use lookahead::MoveType;
pub use node::{
    Bound, Candidate, Def, Ineq, IneqKind, MulDef, NlCoeff, OpDef, OpKind, SumDef, VarId, VarInfo,
    VarSort,
};

use crate::ast::{TermId, TermKind};
use crate::config::SlsConfig;
use crate::context::SearchContext;
use crate::literal::{BoolVar, Lit};
use crate::statistics::Statistics;
use lookahead::BoolInfo;
use num_rational::BigRational;
use rustc_hash::{FxHashMap, FxHashSet};
use sls_num::Num;
use std::fmt;
use tracing::debug;

/// Internal move/step counters.
#[derive(Debug, Clone, Default)]
pub struct SlsStats {
    /// Committed variable flips.
    pub steps: u64,
    /// Search loop iterations.
    pub moves: u64,
    /// Restarts taken.
    pub restarts: u64,
}

/// The search engine, generic over the numeric backend.
pub struct ArithSls<N: Num> {
    pub(crate) config: SlsConfig,
    pub(crate) stats: SlsStats,

    pub(crate) vars: Vec<VarInfo<N>>,
    pub(crate) sums: Vec<SumDef<N>>,
    pub(crate) muls: Vec<MulDef>,
    pub(crate) ops: Vec<OpDef>,
    pub(crate) ineqs: Vec<Option<Ineq<N>>>,
    pub(crate) term_to_var: FxHashMap<TermId, VarId>,
    pub(crate) new_terms: Vec<TermId>,

    pub(crate) updates: Vec<Candidate<N>>,
    pub(crate) prob_break: Vec<f64>,
    pub(crate) use_tabu: bool,
    pub(crate) dscore_mode: bool,
    pub(crate) last_var: Option<VarId>,
    pub(crate) last_delta: N,
    pub(crate) last_literal: Option<Lit>,

    // Global lookahead state.
    pub(crate) bool_info: FxHashMap<TermId, BoolInfo>,
    pub(crate) is_root: FxHashSet<TermId>,
    pub(crate) top_score: f64,
    pub(crate) touched_total: u64,
    pub(crate) update_stack: Vec<Vec<TermId>>,
    pub(crate) in_update_stack: FxHashSet<TermId>,
    pub(crate) min_depth: usize,
    pub(crate) max_depth: usize,
    pub(crate) last_expr: Option<TermId>,
    pub(crate) best_expr: Option<TermId>,
    pub(crate) best_score: f64,
    pub(crate) best_value: N,
    pub(crate) fixed_atoms: FxHashSet<BoolVar>,
    pub(crate) last_atom: Option<TermId>,
    pub(crate) max_moves: u64,
    pub(crate) restart_next: u64,
}

impl<N: Num> Default for ArithSls<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Num> ArithSls<N> {
    /// Engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SlsConfig::default())
    }

    /// Engine with an explicit configuration.
    #[must_use]
    pub fn with_config(config: SlsConfig) -> Self {
        let restart_next = config.restart_base;
        Self {
            config,
            stats: SlsStats::default(),
            vars: Vec::new(),
            sums: Vec::new(),
            muls: Vec::new(),
            ops: Vec::new(),
            ineqs: Vec::new(),
            term_to_var: FxHashMap::default(),
            new_terms: Vec::new(),
            updates: Vec::new(),
            prob_break: Vec::new(),
            use_tabu: true,
            dscore_mode: false,
            last_var: None,
            last_delta: N::zero(),
            last_literal: None,
            bool_info: FxHashMap::default(),
            is_root: FxHashSet::default(),
            top_score: 0.0,
            touched_total: 1,
            update_stack: Vec::new(),
            in_update_stack: FxHashSet::default(),
            min_depth: 0,
            max_depth: 0,
            last_expr: None,
            best_expr: None,
            best_score: 0.0,
            best_value: N::zero(),
            fixed_atoms: FxHashSet::default(),
            last_atom: None,
            max_moves: 0,
            restart_next,
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &SlsConfig {
        &self.config
    }

    /// Number of numeric variables.
    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Move/step counters.
    #[must_use]
    pub fn stats(&self) -> &SlsStats {
        &self.stats
    }

    pub(crate) fn value(&self, v: VarId) -> &N {
        &self.vars[v].value
    }

    pub(crate) fn is_int_var(&self, v: VarId) -> bool {
        self.vars[v].sort == VarSort::Int
    }

    /// The atom attached to a Boolean variable, if any.
    #[must_use]
    pub fn get_ineq(&self, bv: BoolVar) -> Option<&Ineq<N>> {
        self.ineqs.get(bv as usize).and_then(|o| o.as_ref())
    }

    pub(crate) fn get_ineq_mut(&mut self, bv: BoolVar) -> Option<&mut Ineq<N>> {
        self.ineqs.get_mut(bv as usize).and_then(|o| o.as_mut())
    }

    /// Boolean assignment sign of a variable: `true` when it is assigned
    /// false, so `Lit::new(bv, sign)` is the literal currently holding.
    pub(crate) fn sign(&self, ctx: &dyn SearchContext, bv: BoolVar) -> bool {
        !ctx.is_true(Lit::positive(bv))
    }

    /// Run `f` with tabu disabled, restoring the previous mode afterwards.
    pub(crate) fn without_tabu<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.use_tabu;
        self.use_tabu = false;
        let r = f(self);
        self.use_tabu = saved;
        r
    }

    // ------------------------------------------------------------------
    // Entry points driven by the owning solver.
    // ------------------------------------------------------------------

    /// Compile a term that appeared in the solver: attach an atom when it is
    /// one, and intern numeric arguments of foreign (non-arithmetic) terms.
    pub fn register_term(&mut self, ctx: &mut dyn SearchContext, t: TermId) {
        if let Some(bv) = ctx.atom_to_bool_var(t) {
            self.init_bool_var(ctx, bv);
        }
        let kind = ctx.kind(t).clone();
        let arith =
            is_arith_kind(&kind) || matches!(kind, TermKind::Eq(..) | TermKind::Distinct(..));
        if !arith {
            for arg in kind.children() {
                if ctx.is_numeric(arg) {
                    let _ = self.mk_term(ctx, arg);
                }
            }
        }
        self.add_new_terms(ctx);
    }

    /// Repair or flip the atom under a literal the solver asserted true.
    pub fn propagate_literal(&mut self, ctx: &mut dyn SearchContext, lit: Lit) {
        if !ctx.is_true(lit) {
            return;
        }
        let Some(e) = ctx.atom(lit.var()) else {
            return;
        };
        if self.is_distinct(ctx, e) && self.eval_distinct(ctx, e) != ctx.is_true(lit) {
            self.repair_distinct(ctx, e);
            return;
        }
        let Some(ineq) = self.get_ineq(lit.var()) else {
            return;
        };
        if ineq.is_true() != lit.sign() {
            return;
        }
        self.repair(ctx, lit);
    }

    /// Re-align the Boolean assignment of a literal with atom truth.
    pub fn repair_literal(&mut self, ctx: &mut dyn SearchContext, lit: Lit) {
        self.init_bool_var_assignment(ctx, lit.var());
    }

    /// The engine never propagates literals eagerly.
    pub fn propagate(&mut self) -> bool {
        false
    }

    /// Write a value into a numeric term, propagating consequences.
    /// Returns false when the value does not fit the backend or the update
    /// is rejected.
    pub fn set_value(&mut self, ctx: &mut dyn SearchContext, t: TermId, value: &BigRational) -> bool {
        if !ctx.is_numeric(t) {
            return false;
        }
        let w = match self.term_to_var.get(&t) {
            Some(&w) => w,
            None => match self.mk_term(ctx, t) {
                Ok(w) => w,
                Err(_) => return false,
            },
        };
        let n = match N::from_rational(value) {
            Ok(n) => n,
            Err(_) => return false,
        };
        if n == *self.value(w) {
            return true;
        }
        let ok = self.update(ctx, w, &n);
        if !ok {
            debug!(term = %t, value = %value, "set value failed");
        }
        ok
    }

    /// Current value of a numeric term.
    pub fn get_value(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> Option<BigRational> {
        if let TermKind::Numeral(r) = ctx.kind(t) {
            return Some(r.clone());
        }
        let v = self.mk_term(ctx, t).ok()?;
        Some(self.value(v).to_rational())
    }

    /// When the term is pinned by its bounds, its (unique) value.
    pub fn is_fixed(&mut self, ctx: &mut dyn SearchContext, t: TermId) -> Option<BigRational> {
        if !ctx.is_numeric(t) {
            return None;
        }
        if let TermKind::Numeral(r) = ctx.kind(t) {
            return Some(r.clone());
        }
        let v = self.mk_term(ctx, t).ok()?;
        if self.is_fixed_var(v) {
            Some(self.value(v).to_rational())
        } else {
            None
        }
    }

    /// Whether every clause has a true literal consistent with atom truth.
    pub fn is_sat(&mut self, ctx: &mut dyn SearchContext) -> bool {
        self.invariant(ctx);
        for idx in 0..ctx.num_clauses() {
            let lits: Vec<Lit> = ctx.clause(idx).to_vec();
            let mut sat = false;
            for lit in &lits {
                if !ctx.is_true(*lit) {
                    continue;
                }
                let Some(e) = ctx.atom(lit.var()) else {
                    sat = true;
                    break;
                };
                if self.is_distinct(ctx, e) {
                    if self.eval_distinct(ctx, e) != lit.sign() {
                        sat = true;
                        break;
                    }
                    continue;
                }
                let Some(ineq) = self.get_ineq(lit.var()) else {
                    sat = true;
                    break;
                };
                if ineq.is_true() != lit.sign() {
                    sat = true;
                    break;
                }
            }
            if !sat {
                debug!(clause = idx, "clause not satisfied");
                return false;
            }
        }
        true
    }

    /// Snapshot current values as the best ones seen.
    pub fn save_best_values(&mut self, ctx: &mut dyn SearchContext) {
        for v in &mut self.vars {
            v.best_value = v.value.clone();
        }
        self.check_ineqs(ctx);
    }

    /// Restart hook; the restart schedule itself lives in the search loop.
    pub fn on_restart(&mut self) {}

    /// Switch move scoring to clause-distance mode.
    pub fn on_rescale(&mut self) {
        self.dscore_mode = true;
    }

    /// Report counters into a statistics sink.
    pub fn collect_statistics(&self, st: &mut Statistics) {
        st.update("sls-arith-flips", self.stats.steps);
        st.update("sls-arith-moves", self.stats.moves);
        st.update("sls-arith-restarts", self.stats.restarts);
    }

    /// Reset the flip counter.
    pub fn reset_statistics(&mut self) {
        self.stats.steps = 0;
    }

    /// Run the global search when lookahead is enabled.
    pub fn start_propagation(&mut self, ctx: &mut dyn SearchContext) {
        if self.config.use_lookahead {
            self.global_search(ctx);
        }
    }

    // ------------------------------------------------------------------
    // Consistency checks. Violations are programming errors and fatal.
    // ------------------------------------------------------------------

    /// Verify that every Boolean assignment matches atom truth under the
    /// currently holding literal.
    pub fn check_ineqs(&self, ctx: &dyn SearchContext) {
        for bv in 0..ctx.num_bool_vars() {
            let Some(ineq) = self.get_ineq(bv) else {
                continue;
            };
            let sign = self.sign(ctx, bv);
            let Ok(d) = self.dtt_of(sign, &ineq.args_value, ineq) else {
                continue;
            };
            let lit = Lit::new(bv, sign);
            assert!(
                ctx.is_true(lit) == d.is_zero(),
                "assignment out of sync with atom truth: {lit} {ineq}"
            );
        }
    }

    /// Verify every cached atom value and every derived definition.
    pub fn invariant(&self, ctx: &dyn SearchContext) {
        for bv in 0..ctx.num_bool_vars() {
            if let Some(ineq) = self.get_ineq(bv) {
                self.invariant_ineq(ineq);
            }
        }
        for v in 0..self.vars.len() {
            assert!(
                matches!(self.eval_is_correct(v), Ok(true)),
                "stale definition for v{v}"
            );
        }
    }

    pub(crate) fn invariant_ineq(&self, ineq: &Ineq<N>) {
        let mut val = ineq.coeff.clone();
        for (c, v) in &ineq.args {
            let Ok(t) = c.checked_mul(self.value(*v)) else {
                return;
            };
            let Ok(s) = val.checked_add(&t) else {
                return;
            };
            val = s;
        }
        assert!(val == ineq.args_value, "stale cached value: {ineq}");
    }

    pub(crate) fn add_new_terms(&mut self, ctx: &mut dyn SearchContext) {
        let pending = std::mem::take(&mut self.new_terms);
        for t in pending {
            ctx.add_new_term(t);
        }
    }
}

/// Whether a term kind belongs to the arithmetic signature (including
/// comparisons, excluding equality and distinct).
pub(crate) fn is_arith_kind(kind: &TermKind) -> bool {
    matches!(
        kind,
        TermKind::Numeral(_)
            | TermKind::Add(_)
            | TermKind::Sub(..)
            | TermKind::Neg(_)
            | TermKind::Mul(_)
            | TermKind::Mod(..)
            | TermKind::Rem(..)
            | TermKind::IntDiv(..)
            | TermKind::Div(..)
            | TermKind::Power(..)
            | TermKind::Abs(_)
            | TermKind::ToInt(_)
            | TermKind::ToReal(_)
            | TermKind::Le(..)
            | TermKind::Lt(..)
            | TermKind::Ge(..)
            | TermKind::Gt(..)
    )
}

impl<N: Num> fmt::Display for ArithSls<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bv, ineq) in self.ineqs.iter().enumerate() {
            if let Some(ineq) = ineq {
                writeln!(f, "{bv}: {ineq}")?;
            }
        }
        for (v, vi) in self.vars.iter().enumerate() {
            write!(f, "v{v} := {} ", vi.value)?;
            if vi.lo.is_some() || vi.hi.is_some() {
                match &vi.lo {
                    Some(lo) => write!(f, "{}{}", if lo.strict { "(" } else { "[" }, lo.value)?,
                    None => write!(f, "(")?,
                }
                write!(f, " ")?;
                match &vi.hi {
                    Some(hi) => write!(f, "{}{}", hi.value, if hi.strict { ")" } else { "]" })?,
                    None => write!(f, ")")?,
                }
                write!(f, " ")?;
            }
            if !vi.linear_occurs.is_empty() {
                write!(f, "bool:")?;
                for (c, bv) in &vi.linear_occurs {
                    write!(f, " {c}@{bv}")?;
                }
            }
            writeln!(f)?;
        }
        for md in &self.muls {
            write!(f, "v{} :=", md.var)?;
            for (w, p) in &md.monomial {
                write!(f, " v{w}")?;
                if *p > 1 {
                    write!(f, "^{p}")?;
                }
            }
            writeln!(f)?;
        }
        for sd in &self.sums {
            write!(f, "v{} :=", sd.var)?;
            for (c, w) in &sd.args {
                write!(f, " {c}*v{w}")?;
            }
            if !sd.coeff.is_zero() {
                write!(f, " + {}", sd.coeff)?;
            }
            writeln!(f)?;
        }
        for od in &self.ops {
            writeln!(f, "v{} := v{} {} v{}", od.var, od.arg1, od.kind, od.arg2)?;
        }
        Ok(())
    }
}
