//! Search context: the engine's window onto the surrounding solver.
//!
//! The engine never owns the Boolean trail, the clause store, or the term
//! table. It consumes them through [`SearchContext`], a deliberately narrow,
//! object-safe capability set. [`Harness`] is a reference implementation that
//! owns all of those pieces; it is what the integration tests (and embedders
//! without a full solver) drive the engine with.
//!
//! All randomness flows through the context so that runs are reproducible
//! under a shared seed.

use crate::ast::{Sort, TermId, TermKind, TermManager};
use crate::literal::{BoolVar, Lit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};

/// Capabilities the engine requires from its owning solver.
pub trait SearchContext {
    /// Structure of a term.
    fn kind(&self, t: TermId) -> &TermKind;

    /// Sort of a term.
    fn sort(&self, t: TermId) -> Sort;

    /// Depth of a term; parents are strictly deeper than their children.
    fn depth(&self, t: TermId) -> usize;

    /// Direct parents of a term.
    fn parents(&self, t: TermId) -> &[TermId];

    /// Intern a binary product. Used when distributing `c * (a + b)`.
    fn mk_mul_pair(&mut self, x: TermId, y: TermId) -> TermId;

    /// Notify the solver of a term created by the engine.
    fn add_new_term(&mut self, t: TermId);

    /// The atom attached to a Boolean variable, if any.
    fn atom(&self, bv: BoolVar) -> Option<TermId>;

    /// The Boolean variable attached to an atom, if any.
    fn atom_to_bool_var(&self, t: TermId) -> Option<BoolVar>;

    /// Truth of a literal under the current Boolean assignment.
    fn is_true(&self, lit: Lit) -> bool;

    /// Truth of an uninterpreted Boolean term under the current model.
    fn bool_value(&self, t: TermId) -> bool;

    /// Whether a literal is asserted at the top level.
    fn is_unit(&self, lit: Lit) -> bool;

    /// All top-level (unit) literals.
    fn unit_literals(&self) -> Vec<Lit>;

    /// The input assertions driving the global search.
    fn input_assertions(&self) -> Vec<TermId>;

    /// Every term known to the solver.
    fn subterms(&self) -> Vec<TermId>;

    /// Number of clauses.
    fn num_clauses(&self) -> usize;

    /// A clause by index.
    fn clause(&self, idx: usize) -> &[Lit];

    /// Number of Boolean variables.
    fn num_bool_vars(&self) -> u32;

    /// Invert the Boolean assignment of a variable.
    fn flip(&mut self, bv: BoolVar);

    /// Notify the solver that a numeric term changed its value.
    fn new_value_eh(&mut self, t: TermId);

    /// A uniformly random 32-bit value.
    fn rand(&mut self) -> u32;

    /// A uniformly random value below `n` (0 when `n` is 0).
    fn rand_below(&mut self, n: u32) -> u32;

    /// Cancellation flag; long-running loops poll this and exit cleanly.
    fn keep_going(&self) -> bool;

    /// Whether a term has integer sort.
    fn is_int(&self, t: TermId) -> bool {
        self.sort(t) == Sort::Int
    }

    /// Whether a term has Boolean sort.
    fn is_bool(&self, t: TermId) -> bool {
        self.sort(t) == Sort::Bool
    }

    /// Whether a term has integer or real sort.
    fn is_numeric(&self, t: TermId) -> bool {
        matches!(self.sort(t), Sort::Int | Sort::Real)
    }
}

/// Reference [`SearchContext`]: owns terms, Boolean variables, clauses, the
/// assignment, and a seeded RNG.
#[derive(Debug)]
pub struct Harness {
    tm: TermManager,
    atoms: Vec<TermId>,
    bool_var_of: FxHashMap<TermId, BoolVar>,
    assignment: Vec<bool>,
    unit_set: FxHashSet<Lit>,
    units: Vec<Lit>,
    clauses: Vec<Vec<Lit>>,
    assertions: Vec<TermId>,
    bool_model: FxHashMap<TermId, bool>,
    notified: Vec<TermId>,
    pending: Vec<TermId>,
    rng: StdRng,
    cancelled: bool,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Create a harness with the default seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a harness with an explicit RNG seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            tm: TermManager::new(),
            atoms: Vec::new(),
            bool_var_of: FxHashMap::default(),
            assignment: Vec::new(),
            unit_set: FxHashSet::default(),
            units: Vec::new(),
            clauses: Vec::new(),
            assertions: Vec::new(),
            bool_model: FxHashMap::default(),
            notified: Vec::new(),
            pending: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            cancelled: false,
        }
    }

    /// Term manager, for building problems.
    #[must_use]
    pub fn terms(&self) -> &TermManager {
        &self.tm
    }

    /// Mutable term manager.
    pub fn terms_mut(&mut self) -> &mut TermManager {
        &mut self.tm
    }

    /// Attach a Boolean variable to an atom (idempotent).
    pub fn mk_bool_var(&mut self, t: TermId) -> BoolVar {
        if let Some(&bv) = self.bool_var_of.get(&t) {
            return bv;
        }
        let bv = self.atoms.len() as BoolVar;
        self.atoms.push(t);
        self.assignment.push(false);
        self.bool_var_of.insert(t, bv);
        bv
    }

    /// Add a clause; single-literal clauses are recorded as units.
    pub fn add_clause(&mut self, lits: &[Lit]) {
        if let [unit] = lits {
            if self.unit_set.insert(*unit) {
                self.units.push(*unit);
            }
        }
        self.clauses.push(lits.to_vec());
    }

    /// Register a top-level assertion for the global search.
    pub fn add_assertion(&mut self, t: TermId) {
        self.assertions.push(t);
    }

    /// Force the Boolean assignment of a variable.
    pub fn set_assignment(&mut self, bv: BoolVar, value: bool) {
        self.assignment[bv as usize] = value;
    }

    /// Current Boolean assignment of a variable.
    #[must_use]
    pub fn assignment(&self, bv: BoolVar) -> bool {
        self.assignment[bv as usize]
    }

    /// Fix the model value of an uninterpreted Boolean term.
    pub fn set_bool_value(&mut self, t: TermId, value: bool) {
        self.bool_model.insert(t, value);
    }

    /// Value-change notifications received so far.
    #[must_use]
    pub fn notifications(&self) -> &[TermId] {
        &self.notified
    }

    /// Terms the engine created and registered while compiling atoms.
    #[must_use]
    pub fn engine_terms(&self) -> &[TermId] {
        &self.pending
    }

    /// Raise the cancellation flag.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}

impl SearchContext for Harness {
    fn kind(&self, t: TermId) -> &TermKind {
        &self.tm.get(t).kind
    }

    fn sort(&self, t: TermId) -> Sort {
        self.tm.sort(t)
    }

    fn depth(&self, t: TermId) -> usize {
        self.tm.depth(t) as usize
    }

    fn parents(&self, t: TermId) -> &[TermId] {
        self.tm.parents(t)
    }

    fn mk_mul_pair(&mut self, x: TermId, y: TermId) -> TermId {
        self.tm.mk_mul(vec![x, y])
    }

    fn add_new_term(&mut self, t: TermId) {
        self.pending.push(t);
    }

    fn atom(&self, bv: BoolVar) -> Option<TermId> {
        self.atoms.get(bv as usize).copied()
    }

    fn atom_to_bool_var(&self, t: TermId) -> Option<BoolVar> {
        self.bool_var_of.get(&t).copied()
    }

    fn is_true(&self, lit: Lit) -> bool {
        self.assignment[lit.var() as usize] != lit.sign()
    }

    fn bool_value(&self, t: TermId) -> bool {
        self.bool_model.get(&t).copied().unwrap_or(false)
    }

    fn is_unit(&self, lit: Lit) -> bool {
        self.unit_set.contains(&lit)
    }

    fn unit_literals(&self) -> Vec<Lit> {
        self.units.clone()
    }

    fn input_assertions(&self) -> Vec<TermId> {
        self.assertions.clone()
    }

    fn subterms(&self) -> Vec<TermId> {
        self.tm.ids().collect()
    }

    fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    fn clause(&self, idx: usize) -> &[Lit] {
        &self.clauses[idx]
    }

    fn num_bool_vars(&self) -> u32 {
        self.atoms.len() as u32
    }

    fn flip(&mut self, bv: BoolVar) {
        let slot = &mut self.assignment[bv as usize];
        *slot = !*slot;
    }

    fn new_value_eh(&mut self, t: TermId) {
        self.notified.push(t);
    }

    fn rand(&mut self) -> u32 {
        self.rng.gen()
    }

    fn rand_below(&mut self, n: u32) -> u32 {
        if n == 0 {
            0
        } else {
            self.rng.gen_range(0..n)
        }
    }

    fn keep_going(&self) -> bool {
        !self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_vars_are_stable() {
        let mut h = Harness::new();
        let x = h.terms_mut().mk_var("x", Sort::Int);
        let zero = h.terms_mut().mk_int(0);
        let atom = h.terms_mut().mk_le(x, zero);
        let bv1 = h.mk_bool_var(atom);
        let bv2 = h.mk_bool_var(atom);
        assert_eq!(bv1, bv2);
        assert_eq!(h.atom(bv1), Some(atom));
        assert_eq!(h.atom_to_bool_var(atom), Some(bv1));
    }

    #[test]
    fn flip_inverts_literal_truth() {
        let mut h = Harness::new();
        let t = h.terms_mut().mk_bool(true);
        let bv = h.mk_bool_var(t);
        assert!(!h.is_true(Lit::positive(bv)));
        h.flip(bv);
        assert!(h.is_true(Lit::positive(bv)));
        assert!(!h.is_true(Lit::negative(bv)));
    }

    #[test]
    fn unit_clauses_are_tracked() {
        let mut h = Harness::new();
        let t = h.terms_mut().mk_bool(true);
        let bv = h.mk_bool_var(t);
        h.add_clause(&[Lit::positive(bv)]);
        assert!(h.is_unit(Lit::positive(bv)));
        assert!(!h.is_unit(Lit::negative(bv)));
        assert_eq!(h.unit_literals(), vec![Lit::positive(bv)]);
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = Harness::with_seed(42);
        let mut b = Harness::with_seed(42);
        let xs: Vec<u32> = (0..8).map(|_| a.rand_below(100)).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.rand_below(100)).collect();
        assert_eq!(xs, ys);
    }
}
