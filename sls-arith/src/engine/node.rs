//! Compiled representation of variables, sums, monomials, ops, and atoms.
//!
//! Everything lives in engine-owned vectors; cross-references are plain
//! indices. Variables carry their current value, optional bounds, an
//! admissible range, an optional definition, and occurrence lists pointing
//! at every sum, product, and atom that depends on them.

use crate::ast::TermId;
use crate::literal::BoolVar;
use sls_num::Num;
use smallvec::SmallVec;
use std::fmt;

/// Index of a numeric variable.
pub type VarId = usize;

/// Sort of a numeric variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSort {
    /// Integer-valued; division rounds and strict bounds tighten by 1.
    Int,
    /// Real-valued.
    Real,
}

/// One endpoint of a variable's bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound<N> {
    /// Whether the endpoint itself is excluded.
    pub strict: bool,
    /// The endpoint value.
    pub value: N,
}

/// Definition of a derived variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Def {
    /// Defined as a linear sum; index into the sum table.
    Sum(usize),
    /// Defined as a product monomial; index into the product table.
    Mul(usize),
    /// Defined by a unary/binary arithmetic op; index into the op table.
    Op(usize),
}

/// Kind of an op-defined variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Euclidean modulus; 0 when the divisor is 0.
    Mod,
    /// Truncated remainder.
    Rem,
    /// Euclidean integer division.
    IntDiv,
    /// Real division.
    Div,
    /// Exponentiation.
    Power,
    /// Absolute value.
    Abs,
    /// Real-to-integer projection.
    ToInt,
    /// Integer-to-real coercion.
    ToReal,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Mod => "mod",
            OpKind::Rem => "rem",
            OpKind::IntDiv => "div",
            OpKind::Div => "/",
            OpKind::Power => "^",
            OpKind::Abs => "abs",
            OpKind::ToInt => "to-int",
            OpKind::ToReal => "to-real",
        };
        write!(f, "{s}")
    }
}

/// A numeric variable.
#[derive(Debug, Clone)]
pub struct VarInfo<N> {
    /// The term this variable stands for.
    pub term: TermId,
    /// Integer or real.
    pub sort: VarSort,
    /// Current value.
    pub value: N,
    /// Value at the last `save_best_values`.
    pub best_value: N,
    /// Lower bound, if any.
    pub lo: Option<Bound<N>>,
    /// Upper bound, if any.
    pub hi: Option<Bound<N>>,
    /// Half-width of the admissible window; updates outside it are rejected.
    pub range: N,
    /// Definition, when this variable abbreviates a compound term.
    pub def: Option<Def>,
    /// Products whose monomial contains this variable.
    pub muls: SmallVec<[usize; 2]>,
    /// Sums whose arguments contain this variable.
    pub adds: SmallVec<[usize; 2]>,
    /// `(coefficient, bool var)` for each atom whose cached linear value
    /// depends on this variable.
    pub linear_occurs: Vec<(N, BoolVar)>,
    /// Explicit admissible values, when known from input structure.
    pub finite_domain: Vec<N>,
    /// Step counter at the last committed move of this variable.
    pub last_step: u64,
    /// Moves of the same direction are banned until this step.
    pub ban_until_step: u64,
    /// Delta of the last committed move.
    pub last_delta: N,
}

impl<N: Num> VarInfo<N> {
    /// Fresh variable with value 0 and the given admissible half-width.
    pub fn new(term: TermId, sort: VarSort, range: N) -> Self {
        Self {
            term,
            sort,
            value: N::zero(),
            best_value: N::zero(),
            lo: None,
            hi: None,
            range,
            def: None,
            muls: SmallVec::new(),
            adds: SmallVec::new(),
            linear_occurs: Vec::new(),
            finite_domain: Vec::new(),
            last_step: 0,
            ban_until_step: 0,
            last_delta: N::zero(),
        }
    }

    /// Whether a candidate value lies inside the admissible window.
    pub fn in_range(&self, value: &N) -> bool {
        match self.range.checked_neg() {
            Ok(neg) => neg <= *value && *value <= self.range,
            Err(_) => false,
        }
    }

    /// Whether a move of `delta` is banned: the window is open and the move
    /// repeats the direction of the last committed move.
    pub fn is_tabu(&self, step: u64, delta: &N) -> bool {
        step < self.ban_until_step
            && delta.is_negative() == self.last_delta.is_negative()
    }

    /// Record a committed move and open the ban window.
    pub fn set_step(&mut self, step: u64, ban_until: u64, delta: N) {
        self.last_step = step;
        self.ban_until_step = ban_until;
        self.last_delta = delta;
    }
}

/// A sum definition: `var = coeff + Σ cᵢ·argᵢ`.
#[derive(Debug, Clone)]
pub struct SumDef<N> {
    /// The defined variable.
    pub var: VarId,
    /// Constant offset.
    pub coeff: N,
    /// `(coefficient, variable)` pairs, sorted by variable.
    pub args: Vec<(N, VarId)>,
}

/// A product definition: `var = Π wⱼ^pⱼ`.
#[derive(Debug, Clone)]
pub struct MulDef {
    /// The defined variable.
    pub var: VarId,
    /// `(variable, power)` pairs, sorted, powers at least 1.
    pub monomial: SmallVec<[(VarId, u32); 2]>,
}

/// An op definition: `var = kind(arg1, arg2)`.
#[derive(Debug, Clone, Copy)]
pub struct OpDef {
    /// The defined variable.
    pub var: VarId,
    /// Which operation.
    pub kind: OpKind,
    /// First argument.
    pub arg1: VarId,
    /// Second argument (same as the first for unary ops).
    pub arg2: VarId,
}

/// Comparison kind of an atom, canonicalised against 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneqKind {
    /// `Σ + coeff <= 0`.
    Le,
    /// `Σ + coeff = 0`.
    Eq,
    /// `Σ + coeff < 0` (reals only; integer strictness is rewritten away).
    Lt,
}

/// One entry of an atom's non-linear index: the atom contains
/// `coeff · var · …` where the group's key variable occurs with `power`
/// inside the product variable `var` (or `var` is the key itself, power 1).
#[derive(Debug, Clone)]
pub struct NlCoeff<N> {
    /// The product variable carrying the occurrence, or the key variable.
    pub var: VarId,
    /// The linear coefficient of `var` in the atom.
    pub coeff: N,
    /// Power of the group's key variable inside `var`.
    pub power: u32,
}

/// A canonicalised (in)equality attached to a Boolean variable.
#[derive(Debug, Clone)]
pub struct Ineq<N> {
    /// Comparison against 0.
    pub op: IneqKind,
    /// Constant offset.
    pub coeff: N,
    /// `(coefficient, variable)` pairs with unique, sorted variables.
    pub args: Vec<(N, VarId)>,
    /// Per-argument monomial expansion, parallel to `args`.
    pub monomials: Vec<SmallVec<[(VarId, u32); 2]>>,
    /// Occurrences grouped by inner variable; what move proposers iterate.
    pub nonlinear: Vec<(VarId, SmallVec<[NlCoeff<N>; 2]>)>,
    /// Cached `coeff + Σ cᵢ·value(argᵢ)`, kept exact by the update engine.
    pub args_value: N,
    /// Whether no argument is a product variable.
    pub is_linear: bool,
}

impl<N: Num> Ineq<N> {
    /// Fresh atom with no arguments.
    pub fn new(op: IneqKind, coeff: N) -> Self {
        Self {
            op,
            coeff,
            args: Vec::new(),
            monomials: Vec::new(),
            nonlinear: Vec::new(),
            args_value: N::zero(),
            is_linear: true,
        }
    }

    /// Truth of the atom under the cached linear value.
    pub fn is_true(&self) -> bool {
        match self.op {
            IneqKind::Le => self.args_value <= N::zero(),
            IneqKind::Eq => self.args_value == N::zero(),
            IneqKind::Lt => self.args_value < N::zero(),
        }
    }
}

impl<N: Num> fmt::Display for Ineq<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (j, (c, _)) in self.args.iter().enumerate() {
            let neg = c.is_negative();
            if first {
                if neg {
                    write!(f, "-")?;
                }
            } else {
                write!(f, "{}", if neg { " - " } else { " + " })?;
            }
            let abs = c.checked_abs().unwrap_or_else(|_| c.clone());
            let mut first2 = abs == N::one();
            if abs != N::one() {
                write!(f, "{abs}")?;
            }
            for (w, p) in &self.monomials[j] {
                write!(f, "{}v{w}", if first2 { "" } else { " * " })?;
                if *p > 1 {
                    write!(f, "^{p}")?;
                }
                first2 = false;
            }
            first = false;
        }
        if !self.coeff.is_zero() {
            write!(f, " + {}", self.coeff)?;
        }
        let rel = match self.op {
            IneqKind::Le => "<=",
            IneqKind::Eq => "==",
            IneqKind::Lt => "<",
        };
        write!(f, " {rel} 0 ({})", self.args_value)
    }
}

/// A candidate move: add `delta` to `var`.
#[derive(Debug, Clone)]
pub struct Candidate<N> {
    /// The variable to move.
    pub var: VarId,
    /// The proposed delta.
    pub delta: N,
    /// Score filled in at selection time.
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sls_num::CheckedInt64;

    fn n(v: i64) -> CheckedInt64 {
        CheckedInt64::new(v)
    }

    #[test]
    fn ineq_truth_per_kind() {
        let mut i: Ineq<CheckedInt64> = Ineq::new(IneqKind::Le, n(0));
        i.args_value = n(0);
        assert!(i.is_true());
        i.op = IneqKind::Lt;
        assert!(!i.is_true());
        i.op = IneqKind::Eq;
        assert!(i.is_true());
        i.args_value = n(-3);
        assert!(!i.is_true());
        i.op = IneqKind::Lt;
        assert!(i.is_true());
    }

    #[test]
    fn tabu_bans_same_direction_only() {
        let mut v: VarInfo<CheckedInt64> =
            VarInfo::new(crate::ast::TermId::default_for_tests(), VarSort::Int, n(100));
        v.set_step(5, 10, n(2));
        assert!(v.is_tabu(7, &n(1)));
        assert!(!v.is_tabu(7, &n(-1)));
        assert!(!v.is_tabu(12, &n(1)));
    }
}
