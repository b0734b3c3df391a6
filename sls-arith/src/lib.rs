//! Stochastic local search for mixed integer/real arithmetic constraints.
//!
//! Given a Boolean assignment to atoms and a set of arithmetic
//! (in)equalities over numeric variables, the engine searches for numeric
//! values making as many required atoms hold as possible, flipping Boolean
//! atoms to track arithmetic truth. It is incomplete by design: it finds
//! models, it never proves their absence.
//!
//! The engine is generic over the numeric backend ([`sls_num::Rational`] or
//! [`sls_num::CheckedInt64`]) and consumes the surrounding solver through
//! the narrow [`SearchContext`] trait. [`Harness`] is a self-contained
//! context implementation for standalone use and testing.
//!
//! # Example
//!
//! Repairing `x + y <= 0` starting from `x = 3, y = 2`:
//!
//! ```
//! use num_rational::BigRational;
//! use sls_arith::{ArithSls, Harness, Lit, Sort};
//! use sls_num::CheckedInt64;
//!
//! let mut ctx = Harness::new();
//! let x = ctx.terms_mut().mk_var("x", Sort::Int);
//! let y = ctx.terms_mut().mk_var("y", Sort::Int);
//! let sum = ctx.terms_mut().mk_add(vec![x, y]);
//! let zero = ctx.terms_mut().mk_int(0);
//! let atom = ctx.terms_mut().mk_le(sum, zero);
//! let bv = ctx.mk_bool_var(atom);
//! ctx.set_assignment(bv, true);
//!
//! let mut engine: ArithSls<CheckedInt64> = ArithSls::new();
//! engine.register_term(&mut ctx, atom);
//! engine.set_value(&mut ctx, x, &BigRational::from_integer(3.into()));
//! engine.set_value(&mut ctx, y, &BigRational::from_integer(2.into()));
//!
//! // x=3, y=2 falsifies the atom; asserting its literal and asking for a
//! // repair moves one variable until the atom holds again.
//! ctx.set_assignment(bv, true);
//! engine.propagate_literal(&mut ctx, Lit::positive(bv));
//! assert!(engine.get_ineq(bv).unwrap().is_true());
//! ```
//!
//! Public operations mirror the plugin surface of a CDCL-style solver:
//! `register_term`, `init_bool_var`, `initialize`, `start_propagation`,
//! `propagate_literal`, `repair_literal`, `repair_up`, `repair_down`,
//! `set_value`, `get_value`, `is_fixed`, `is_sat`, `save_best_values`,
//! `on_restart`, `on_rescale`, `collect_statistics`, `reset_statistics`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod config;
pub mod context;
pub mod engine;
pub mod literal;
pub mod statistics;

pub use ast::{Sort, Term, TermId, TermKind, TermManager};
pub use config::SlsConfig;
pub use context::{Harness, SearchContext};
pub use engine::{ArithSls, Ineq, IneqKind, MoveType, SlsStats, VarId, VarSort};
pub use literal::{BoolVar, Lit};
pub use statistics::Statistics;
