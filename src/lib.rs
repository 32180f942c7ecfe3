//! # Butternut
//!
//! Butternut is the constraint-expansion stage of a CP-SAT presolver. It takes an in-memory
//! model over integer variables with high-level combinatorial constraints (automaton, table,
//! element, inverse, reservoir, integer modulo and product, all-different, and linear
//! constraints with a multi-interval right-hand side) and rewrites it into an equivalent model
//! containing only simple constraints: clauses, at-most-one / exactly-one, and small linear,
//! product, and division constraints.
//!
//! The rewriting preserves the feasible set projected onto the original variables; every
//! Boolean created along the way is functionally determined by them. The central piece of
//! shared state is the value-encoding cache of the [`PresolveContext`], which guarantees a
//! single literal per `(variable, value)` pair across all expansions.
//!
//! # Example
//! ```
//! use butternut::model::AllDifferentConstraint;
//! use butternut::{expand_model, Constraint, ConstraintKind, Domain, ExpansionOptions,
//!     LinearExpression, Model, PresolveContext};
//!
//! let mut model = Model::new();
//! let x = model.new_variable(Domain::new(0, 1));
//! let y = model.new_variable(Domain::new(0, 1));
//! let _ = model.add_constraint(Constraint::new(ConstraintKind::AllDifferent(
//!     AllDifferentConstraint {
//!         exprs: vec![LinearExpression::variable(x), LinearExpression::variable(y)],
//!     },
//! )));
//!
//! let mut context = PresolveContext::new(model, ExpansionOptions::default());
//! expand_model(&mut context).expect("a feasible permutation exists");
//!
//! // The all-different was rewritten into exactly-one constraints over value literals.
//! assert!(context.model().constraints[0].is_empty());
//! ```
pub(crate) mod butternut_asserts;
pub mod checking;
pub mod containers;
pub(crate) mod math;
pub mod model;
pub mod presolve;

pub mod expansion;

pub use crate::expansion::expand_model;
pub use crate::expansion::final_expansion_for_linear_constraints;
pub use crate::expansion::ExpansionError;
pub use crate::model::Constraint;
pub use crate::model::ConstraintKind;
pub use crate::model::Domain;
pub use crate::model::LinearExpression;
pub use crate::model::Literal;
pub use crate::model::Model;
pub use crate::model::VariableId;
pub use crate::presolve::ExpansionOptions;
pub use crate::presolve::PresolveContext;
