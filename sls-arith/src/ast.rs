//! Hash-consed term DAG.
//!
//! Terms are interned into an arena and referenced by [`TermId`]. Structural
//! sharing is maximal: building the same term twice yields the same id. The
//! manager tracks per-term sort, depth (1 + maximum child depth), and parent
//! lists, which the search engine uses to propagate value changes upward.

use num_bigint::BigInt;
use num_rational::BigRational;
use rustc_hash::FxHashMap;
use std::fmt;

/// Sort of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    /// Boolean sort.
    Bool,
    /// Mathematical integers.
    Int,
    /// Mathematical reals.
    Real,
}

/// Reference to an interned term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(u32);

impl TermId {
    /// Index into the term arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[cfg(test)]
impl TermId {
    pub(crate) fn default_for_tests() -> Self {
        TermId(0)
    }
}

/// Structure of an interned term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// A numeric constant.
    Numeral(BigRational),
    /// An uninterpreted constant.
    Var(String),
    /// n-ary addition.
    Add(Vec<TermId>),
    /// Binary subtraction.
    Sub(TermId, TermId),
    /// Unary minus.
    Neg(TermId),
    /// n-ary multiplication.
    Mul(Vec<TermId>),
    /// Integer modulus (SMT-LIB `mod`).
    Mod(TermId, TermId),
    /// Integer remainder (SMT-LIB `rem`).
    Rem(TermId, TermId),
    /// Integer division (SMT-LIB `div`).
    IntDiv(TermId, TermId),
    /// Real division.
    Div(TermId, TermId),
    /// Exponentiation.
    Power(TermId, TermId),
    /// Absolute value.
    Abs(TermId),
    /// Real-to-integer projection.
    ToInt(TermId),
    /// Integer-to-real coercion.
    ToReal(TermId),
    /// If-then-else.
    Ite(TermId, TermId, TermId),
    /// Boolean constant true.
    True,
    /// Boolean constant false.
    False,
    /// Negation.
    Not(TermId),
    /// n-ary conjunction.
    And(Vec<TermId>),
    /// n-ary disjunction.
    Or(Vec<TermId>),
    /// n-ary exclusive or.
    Xor(Vec<TermId>),
    /// Implication.
    Implies(TermId, TermId),
    /// Boolean equivalence.
    Iff(TermId, TermId),
    /// Equality.
    Eq(TermId, TermId),
    /// Pairwise disequality.
    Distinct(Vec<TermId>),
    /// Less-or-equal.
    Le(TermId, TermId),
    /// Strictly-less.
    Lt(TermId, TermId),
    /// Greater-or-equal.
    Ge(TermId, TermId),
    /// Strictly-greater.
    Gt(TermId, TermId),
}

impl TermKind {
    /// Child terms, in order.
    #[must_use]
    pub fn children(&self) -> Vec<TermId> {
        use TermKind::*;
        match self {
            Numeral(_) | Var(_) | True | False => Vec::new(),
            Add(args) | Mul(args) | And(args) | Or(args) | Xor(args) | Distinct(args) => {
                args.clone()
            }
            Neg(x) | Abs(x) | ToInt(x) | ToReal(x) | Not(x) => vec![*x],
            Sub(x, y) | Mod(x, y) | Rem(x, y) | IntDiv(x, y) | Div(x, y) | Power(x, y)
            | Implies(x, y) | Iff(x, y) | Eq(x, y) | Le(x, y) | Lt(x, y) | Ge(x, y)
            | Gt(x, y) => vec![*x, *y],
            Ite(c, t, e) => vec![*c, *t, *e],
        }
    }
}

/// An interned term.
#[derive(Debug, Clone)]
pub struct Term {
    /// Structure.
    pub kind: TermKind,
    /// Sort.
    pub sort: Sort,
    /// 1 + maximum child depth; leaves have depth 1.
    pub depth: u32,
}

/// Arena of hash-consed terms.
#[derive(Debug, Default)]
pub struct TermManager {
    terms: Vec<Term>,
    cache: FxHashMap<(TermKind, Sort), TermId>,
    parents: Vec<Vec<TermId>>,
}

impl TermManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, kind: TermKind, sort: Sort) -> TermId {
        if let Some(&id) = self.cache.get(&(kind.clone(), sort)) {
            return id;
        }
        let children = kind.children();
        let depth = 1 + children
            .iter()
            .map(|c| self.terms[c.index()].depth)
            .max()
            .unwrap_or(0);
        let id = TermId(self.terms.len() as u32);
        self.terms.push(Term {
            kind: kind.clone(),
            sort,
            depth,
        });
        self.parents.push(Vec::new());
        for c in children {
            if !self.parents[c.index()].contains(&id) {
                self.parents[c.index()].push(id);
            }
        }
        self.cache.insert((kind, sort), id);
        id
    }

    /// Look up a term.
    #[must_use]
    pub fn get(&self, t: TermId) -> &Term {
        &self.terms[t.index()]
    }

    /// Sort of a term.
    #[must_use]
    pub fn sort(&self, t: TermId) -> Sort {
        self.terms[t.index()].sort
    }

    /// Depth of a term (leaves have depth 1).
    #[must_use]
    pub fn depth(&self, t: TermId) -> u32 {
        self.terms[t.index()].depth
    }

    /// Direct parents of a term.
    #[must_use]
    pub fn parents(&self, t: TermId) -> &[TermId] {
        &self.parents[t.index()]
    }

    /// Number of interned terms.
    #[must_use]
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// All term ids, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = TermId> {
        (0..self.terms.len() as u32).map(TermId)
    }

    fn join(&self, args: &[TermId]) -> Sort {
        if args.iter().any(|a| self.sort(*a) == Sort::Real) {
            Sort::Real
        } else {
            Sort::Int
        }
    }

    /// Integer numeral.
    pub fn mk_int(&mut self, n: impl Into<BigInt>) -> TermId {
        self.intern(
            TermKind::Numeral(BigRational::from_integer(n.into())),
            Sort::Int,
        )
    }

    /// Real numeral.
    pub fn mk_real(&mut self, r: BigRational) -> TermId {
        self.intern(TermKind::Numeral(r), Sort::Real)
    }

    /// Uninterpreted constant of the given sort.
    pub fn mk_var(&mut self, name: &str, sort: Sort) -> TermId {
        self.intern(TermKind::Var(name.to_string()), sort)
    }

    /// n-ary addition.
    pub fn mk_add(&mut self, args: Vec<TermId>) -> TermId {
        let sort = self.join(&args);
        self.intern(TermKind::Add(args), sort)
    }

    /// Subtraction.
    pub fn mk_sub(&mut self, x: TermId, y: TermId) -> TermId {
        let sort = self.join(&[x, y]);
        self.intern(TermKind::Sub(x, y), sort)
    }

    /// Unary minus.
    pub fn mk_neg(&mut self, x: TermId) -> TermId {
        let sort = self.sort(x);
        self.intern(TermKind::Neg(x), sort)
    }

    /// n-ary multiplication.
    pub fn mk_mul(&mut self, args: Vec<TermId>) -> TermId {
        let sort = self.join(&args);
        self.intern(TermKind::Mul(args), sort)
    }

    /// Integer modulus.
    pub fn mk_mod(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Mod(x, y), Sort::Int)
    }

    /// Integer remainder.
    pub fn mk_rem(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Rem(x, y), Sort::Int)
    }

    /// Integer division.
    pub fn mk_idiv(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::IntDiv(x, y), Sort::Int)
    }

    /// Real division.
    pub fn mk_div(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Div(x, y), Sort::Real)
    }

    /// Exponentiation; the result has the sort of the base.
    pub fn mk_power(&mut self, x: TermId, y: TermId) -> TermId {
        let sort = self.sort(x);
        self.intern(TermKind::Power(x, y), sort)
    }

    /// Absolute value.
    pub fn mk_abs(&mut self, x: TermId) -> TermId {
        let sort = self.sort(x);
        self.intern(TermKind::Abs(x), sort)
    }

    /// Real-to-integer projection.
    pub fn mk_to_int(&mut self, x: TermId) -> TermId {
        self.intern(TermKind::ToInt(x), Sort::Int)
    }

    /// Integer-to-real coercion.
    pub fn mk_to_real(&mut self, x: TermId) -> TermId {
        self.intern(TermKind::ToReal(x), Sort::Real)
    }

    /// If-then-else; branches must share a sort.
    pub fn mk_ite(&mut self, c: TermId, t: TermId, e: TermId) -> TermId {
        let sort = self.sort(t);
        self.intern(TermKind::Ite(c, t, e), sort)
    }

    /// Boolean constant.
    pub fn mk_bool(&mut self, b: bool) -> TermId {
        self.intern(if b { TermKind::True } else { TermKind::False }, Sort::Bool)
    }

    /// Negation.
    pub fn mk_not(&mut self, x: TermId) -> TermId {
        self.intern(TermKind::Not(x), Sort::Bool)
    }

    /// n-ary conjunction.
    pub fn mk_and(&mut self, args: Vec<TermId>) -> TermId {
        self.intern(TermKind::And(args), Sort::Bool)
    }

    /// n-ary disjunction.
    pub fn mk_or(&mut self, args: Vec<TermId>) -> TermId {
        self.intern(TermKind::Or(args), Sort::Bool)
    }

    /// n-ary exclusive or.
    pub fn mk_xor(&mut self, args: Vec<TermId>) -> TermId {
        self.intern(TermKind::Xor(args), Sort::Bool)
    }

    /// Implication.
    pub fn mk_implies(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Implies(x, y), Sort::Bool)
    }

    /// Boolean equivalence.
    pub fn mk_iff(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Iff(x, y), Sort::Bool)
    }

    /// Equality.
    pub fn mk_eq(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Eq(x, y), Sort::Bool)
    }

    /// Pairwise disequality.
    pub fn mk_distinct(&mut self, args: Vec<TermId>) -> TermId {
        self.intern(TermKind::Distinct(args), Sort::Bool)
    }

    /// Less-or-equal.
    pub fn mk_le(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Le(x, y), Sort::Bool)
    }

    /// Strictly-less.
    pub fn mk_lt(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Lt(x, y), Sort::Bool)
    }

    /// Greater-or-equal.
    pub fn mk_ge(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Ge(x, y), Sort::Bool)
    }

    /// Strictly-greater.
    pub fn mk_gt(&mut self, x: TermId, y: TermId) -> TermId {
        self.intern(TermKind::Gt(x, y), Sort::Bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let one = tm.mk_int(1);
        let a = tm.mk_add(vec![x, one]);
        let b = tm.mk_add(vec![x, one]);
        assert_eq!(a, b);
        assert_ne!(x, one);
    }

    #[test]
    fn numeral_sort_distinguishes_int_and_real() {
        let mut tm = TermManager::new();
        let i = tm.mk_int(1);
        let r = tm.mk_real(BigRational::from_integer(1.into()));
        assert_ne!(i, r);
        assert_eq!(tm.sort(i), Sort::Int);
        assert_eq!(tm.sort(r), Sort::Real);
    }

    #[test]
    fn depth_and_parents() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let y = tm.mk_var("y", Sort::Int);
        let s = tm.mk_add(vec![x, y]);
        let p = tm.mk_mul(vec![s, y]);
        assert_eq!(tm.depth(x), 1);
        assert_eq!(tm.depth(s), 2);
        assert_eq!(tm.depth(p), 3);
        assert!(tm.parents(x).contains(&s));
        assert!(tm.parents(s).contains(&p));
        assert!(tm.parents(y).contains(&s));
        assert!(tm.parents(y).contains(&p));
    }
}
