//! The in-memory constraint model that the expansion stage rewrites.
mod constraint;
mod domain;
mod linear;
mod variables;

use std::collections::BTreeMap;

pub use constraint::*;
pub use domain::*;
pub use linear::*;
pub use variables::*;

use crate::butternut_asserts::butternut_assert_simple;
use crate::containers::KeyedVec;

/// A model over integer variables: domains, a constraint list, and an optional linear objective.
///
/// Constraints are stored in an append-only vector and referenced by index; expanding a
/// constraint clears its payload in place so that indices held elsewhere stay valid.
#[derive(Debug, Default)]
pub struct Model {
    variables: KeyedVec<VariableId, IntegerVariable>,
    pub constraints: Vec<Constraint>,
    objective: Objective,
}

impl Model {
    pub fn new() -> Model {
        Model::default()
    }

    /// Creates a new integer variable with the given domain.
    pub fn new_variable(&mut self, domain: Domain) -> VariableId {
        butternut_assert_simple!(!domain.is_empty());
        self.variables.push(IntegerVariable::new(domain))
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = VariableId> {
        self.variables.keys()
    }

    pub fn domain(&self, variable: VariableId) -> &Domain {
        &self.variables[variable].domain
    }

    pub(crate) fn set_domain(&mut self, variable: VariableId, domain: Domain) {
        self.variables[variable].domain = domain;
    }

    pub fn variable_name(&self, variable: VariableId) -> Option<&str> {
        self.variables[variable].name.as_deref()
    }

    pub fn set_variable_name(&mut self, variable: VariableId, name: String) {
        self.variables[variable].name = Some(name);
    }

    /// Appends a constraint and returns its index.
    pub fn add_constraint(&mut self, constraint: Constraint) -> usize {
        self.constraints.push(constraint);
        self.constraints.len() - 1
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn objective_mut(&mut self) -> &mut Objective {
        &mut self.objective
    }
}

/// A linear minimisation objective `sum terms[var] * var + offset`.
///
/// The term map is ordered so that iterating over it is deterministic.
#[derive(Clone, Debug, Default)]
pub struct Objective {
    pub terms: BTreeMap<VariableId, i64>,
    pub offset: i64,
}

impl Objective {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.offset == 0
    }

    pub fn set_term(&mut self, variable: VariableId, coefficient: i64) {
        if coefficient == 0 {
            let _ = self.terms.remove(&variable);
        } else {
            let _ = self.terms.insert(variable, coefficient);
        }
    }
}
