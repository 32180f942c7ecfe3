use std::collections::BTreeMap;

use log::debug;

use crate::butternut_asserts::butternut_assert_eq_simple;
use crate::butternut_asserts::butternut_assert_simple;
use crate::containers::HashMap;
use crate::containers::HashSet;
use crate::containers::KeyedVec;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::LinearConstraint;
use crate::model::LinearExpression;
use crate::model::Literal;
use crate::model::Model;
use crate::model::VariableId;
use crate::presolve::ExpansionOptions;

/// The cache key of a reified precedence literal: both time expressions and both activity
/// literals, in order.
type PrecedenceKey = (LinearExpression, LinearExpression, Literal, Literal);

/// The mutable state threaded through every expansion rule.
///
/// The context owns the working model and is its only mutator for the duration of the stage. On
/// top of the model it maintains:
///
/// * the `(variable, value)` encoding cache, which guarantees at most one literal per pair and
///   materialises the defining constraints of each created literal;
/// * the reified-precedence cache used by the reservoir expansion;
/// * the variable to constraint usage graph;
/// * rule statistics, the infeasibility flag, and the postsolve mapping model.
#[derive(Debug)]
pub struct PresolveContext {
    model: Model,
    options: ExpansionOptions,

    /// Maps `(variable, value)` to a literal that is true exactly when `variable == value`.
    var_value_encoding: HashMap<(VariableId, i64), Literal>,
    /// Maps the reified precedence key to its literal. Scoped to a single run of the stage.
    precedence_cache: HashMap<PrecedenceKey, Literal>,

    /// For every variable, the indices of the constraints referencing it.
    var_to_constraints: KeyedVec<VariableId, HashSet<usize>>,
    /// For every constraint index already registered, its referenced variables.
    constraint_to_vars: Vec<Vec<VariableId>>,

    /// Constraints reconstructing removed variables from the remaining ones, replayed after
    /// search.
    mapping_model: Vec<Constraint>,
    removed_variables: HashSet<VariableId>,

    rule_stats: BTreeMap<String, u64>,
    constant_true: Option<Literal>,
    unsat: bool,
    expanded: bool,
}

impl PresolveContext {
    pub fn new(model: Model, options: ExpansionOptions) -> PresolveContext {
        let mut context = PresolveContext {
            model,
            options,
            var_value_encoding: HashMap::default(),
            precedence_cache: HashMap::default(),
            var_to_constraints: KeyedVec::default(),
            constraint_to_vars: Vec::new(),
            mapping_model: Vec::new(),
            removed_variables: HashSet::default(),
            rule_stats: BTreeMap::new(),
            constant_true: None,
            unsat: false,
            expanded: false,
        };
        context
            .var_to_constraints
            .resize(context.model.num_variables(), HashSet::default());
        context.update_new_constraints_variable_usage();
        context
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn options(&self) -> &ExpansionOptions {
        &self.options
    }

    // ---------------------------------------------------------------------------------------
    // Domain queries and mutation.

    pub fn domain_of(&self, variable: VariableId) -> &Domain {
        self.model.domain(variable)
    }

    pub fn min_of(&self, variable: VariableId) -> i64 {
        self.domain_of(variable).lower_bound()
    }

    pub fn max_of(&self, variable: VariableId) -> i64 {
        self.domain_of(variable).upper_bound()
    }

    pub fn domain_contains(&self, variable: VariableId, value: i64) -> bool {
        self.domain_of(variable).contains(value)
    }

    /// Whether `expression` can take `value`, looking only at the domain of its variable.
    pub fn expression_contains(&self, expression: &LinearExpression, value: i64) -> bool {
        if expression.is_constant() {
            return expression.offset == value;
        }
        butternut_assert_eq_simple!(expression.vars.len(), 1);
        let coefficient = expression.coeffs[0];
        let remainder = value - expression.offset;
        remainder % coefficient == 0
            && self.domain_contains(expression.vars[0], remainder / coefficient)
    }

    /// A superset of the values the expression can take.
    pub fn domain_superset_of(&self, expression: &LinearExpression) -> Domain {
        let mut result = Domain::constant(expression.offset);
        for (variable, coefficient) in expression.terms() {
            result = result
                .addition_with(&self.domain_of(variable).multiplication_by(coefficient))
                .relax_if_too_complex();
        }
        result
    }

    pub fn is_fixed(&self, expression: &LinearExpression) -> bool {
        expression
            .terms()
            .all(|(variable, coefficient)| coefficient == 0 || self.domain_of(variable).is_fixed())
    }

    pub fn fixed_value(&self, expression: &LinearExpression) -> i64 {
        butternut_assert_simple!(self.is_fixed(expression));
        expression
            .terms()
            .map(|(variable, coefficient)| {
                if coefficient == 0 {
                    0
                } else {
                    coefficient * self.domain_of(variable).fixed_value()
                }
            })
            .sum::<i64>()
            + expression.offset
    }

    /// Recognises the expressions `b` and `1 - b` for a Boolean variable `b`.
    pub fn expression_is_a_literal(&self, expression: &LinearExpression) -> Option<Literal> {
        if expression.vars.len() != 1 {
            return None;
        }
        let variable = expression.vars[0];
        let domain = self.domain_of(variable);
        if domain.lower_bound() < 0 || domain.upper_bound() > 1 {
            return None;
        }
        match (expression.coeffs[0], expression.offset) {
            (1, 0) => Some(Literal::new(variable, true)),
            (-1, 1) => Some(Literal::new(variable, false)),
            _ => None,
        }
    }

    /// Intersects the domain of `variable` with `target`. Returns false and declares the model
    /// infeasible if the intersection is empty.
    pub fn intersect_domain_with(&mut self, variable: VariableId, target: &Domain) -> bool {
        let mut changed = false;
        self.intersect_domain_with_tracked(variable, target, &mut changed)
    }

    /// As [`Self::intersect_domain_with`], additionally reporting whether the domain shrunk.
    pub fn intersect_domain_with_tracked(
        &mut self,
        variable: VariableId,
        target: &Domain,
        changed: &mut bool,
    ) -> bool {
        let intersection = self.domain_of(variable).intersection(target);
        *changed = &intersection != self.domain_of(variable);
        if intersection.is_empty() {
            self.model.set_domain(variable, intersection);
            self.notify_that_model_is_unsat("domain of a variable became empty");
            return false;
        }
        if *changed {
            self.model.set_domain(variable, intersection);
        }
        true
    }

    /// Intersects the image of an affine expression with `target` by reducing the domain of its
    /// variable.
    pub fn intersect_expression_domain_with(
        &mut self,
        expression: &LinearExpression,
        target: &Domain,
    ) -> bool {
        if expression.is_constant() {
            if target.contains(expression.offset) {
                return true;
            }
            self.notify_that_model_is_unsat("a fixed expression lies outside its target domain");
            return false;
        }
        butternut_assert_eq_simple!(expression.vars.len(), 1);
        let variable_target = target
            .addition_with(&Domain::constant(-expression.offset))
            .inverse_multiplication_by(expression.coeffs[0]);
        self.intersect_domain_with(expression.vars[0], &variable_target)
    }

    // ---------------------------------------------------------------------------------------
    // Variable and literal factory.

    /// Creates a fresh integer variable.
    pub fn new_int_var(&mut self, domain: Domain) -> VariableId {
        let variable = self.model.new_variable(domain);
        self.var_to_constraints
            .resize(self.model.num_variables(), HashSet::default());
        variable
    }

    /// Creates a fresh Boolean variable and returns its positive literal.
    pub fn new_bool_var(&mut self) -> Literal {
        let variable = self.new_int_var(Domain::boolean());
        Literal::new(variable, true)
    }

    /// The literal that is true in every solution.
    pub fn true_literal(&mut self) -> Literal {
        if let Some(literal) = self.constant_true {
            return literal;
        }
        let variable = self.new_int_var(Domain::constant(1));
        let literal = Literal::new(variable, true);
        self.constant_true = Some(literal);
        literal
    }

    pub fn false_literal(&mut self) -> Literal {
        !self.true_literal()
    }

    pub fn literal_is_true(&self, literal: Literal) -> bool {
        let domain = self.domain_of(literal.variable());
        domain.is_fixed() && domain.fixed_value() == literal.value_when_true()
    }

    pub fn literal_is_false(&self, literal: Literal) -> bool {
        self.literal_is_true(!literal)
    }

    /// Fixes the literal to false. Returns false if this makes the model infeasible.
    pub fn set_literal_to_false(&mut self, literal: Literal) -> bool {
        let fixed = Domain::constant(1 - literal.value_when_true());
        self.intersect_domain_with(literal.variable(), &fixed)
    }

    // ---------------------------------------------------------------------------------------
    // The value-encoding cache.

    /// Returns the literal equivalent to `variable == value`, creating it (together with its
    /// defining constraints) on a cache miss.
    ///
    /// Values outside the domain map to the false literal, fixed variables to the true literal.
    /// A variable with a two-value domain is encoded with a single Boolean: the literal of one
    /// value is the negation of the other's. A Boolean variable encodes itself.
    pub fn get_or_create_var_value_encoding(
        &mut self,
        variable: VariableId,
        value: i64,
    ) -> Literal {
        let domain = self.domain_of(variable).clone();
        if !domain.contains(value) {
            return self.false_literal();
        }
        if domain.is_fixed() {
            return self.true_literal();
        }
        if let Some(&literal) = self.var_value_encoding.get(&(variable, value)) {
            return literal;
        }

        if domain.lower_bound() >= 0 && domain.upper_bound() <= 1 {
            let _ = self
                .var_value_encoding
                .insert((variable, 1), Literal::new(variable, true));
            let _ = self
                .var_value_encoding
                .insert((variable, 0), Literal::new(variable, false));
            return Literal::new(variable, value == 1);
        }

        if domain.size() == 2 {
            let low = domain.lower_bound();
            let high = domain.upper_bound();
            let literal_high = self.new_bool_var();
            let _ = self
                .var_value_encoding
                .insert((variable, high), literal_high);
            let _ = self
                .var_value_encoding
                .insert((variable, low), !literal_high);
            self.add_imply_in_domain(literal_high, variable, &Domain::constant(high));
            self.add_imply_in_domain(!literal_high, variable, &Domain::constant(low));
            return if value == high {
                literal_high
            } else {
                !literal_high
            };
        }

        let literal = self.new_bool_var();
        let _ = self.var_value_encoding.insert((variable, value), literal);
        self.add_imply_in_domain(literal, variable, &Domain::constant(value));
        self.add_imply_in_domain(!literal, variable, &domain.intersection(&Domain::constant(value).complement()));
        literal
    }

    /// Returns the encoding literal of `(variable, value)` if one already exists. Does not
    /// create anything.
    pub fn has_var_value_encoding(&self, variable: VariableId, value: i64) -> Option<Literal> {
        if let Some(&literal) = self.var_value_encoding.get(&(variable, value)) {
            return Some(literal);
        }
        let domain = self.domain_of(variable);
        if !domain.is_fixed()
            && domain.lower_bound() >= 0
            && domain.upper_bound() <= 1
            && domain.contains(value)
        {
            return Some(Literal::new(variable, value == 1));
        }
        None
    }

    /// Declares `literal` to be the encoding of `variable == value`.
    ///
    /// If an encoding literal already exists for the pair, the two literals are bound together
    /// by a Boolean equality instead.
    pub fn insert_var_value_encoding(
        &mut self,
        literal: Literal,
        variable: VariableId,
        value: i64,
    ) {
        let domain = self.domain_of(variable).clone();
        if !domain.contains(value) {
            let _ = self.set_literal_to_false(literal);
            return;
        }
        if domain.is_fixed() {
            let _ = self.set_literal_to_false(!literal);
            return;
        }
        if let Some(existing) = self.has_var_value_encoding(variable, value) {
            self.store_boolean_equality_relation(existing, literal);
            return;
        }

        let _ = self.var_value_encoding.insert((variable, value), literal);
        if domain.size() == 2 {
            let other = if value == domain.lower_bound() {
                domain.upper_bound()
            } else {
                domain.lower_bound()
            };
            let _ = self.var_value_encoding.insert((variable, other), !literal);
            self.add_imply_in_domain(literal, variable, &Domain::constant(value));
            self.add_imply_in_domain(!literal, variable, &Domain::constant(other));
        } else {
            self.add_imply_in_domain(literal, variable, &Domain::constant(value));
            self.add_imply_in_domain(
                !literal,
                variable,
                &domain.intersection(&Domain::constant(value).complement()),
            );
        }
    }

    /// Whether every value in the domain of the variable has an encoding literal.
    pub fn is_fully_encoded(&self, variable: VariableId) -> bool {
        let domain = self.domain_of(variable);
        domain.is_fixed()
            || domain
                .values()
                .all(|value| self.has_var_value_encoding(variable, value).is_some())
    }

    pub fn expression_is_fully_encoded(&self, expression: &LinearExpression) -> bool {
        if expression.is_constant() {
            return true;
        }
        butternut_assert_eq_simple!(expression.vars.len(), 1);
        self.is_fully_encoded(expression.vars[0])
    }

    /// The encoding literal of `expression == value` for an affine expression.
    pub fn get_or_create_affine_value_encoding(
        &mut self,
        expression: &LinearExpression,
        value: i64,
    ) -> Literal {
        if expression.is_constant() {
            return if expression.offset == value {
                self.true_literal()
            } else {
                self.false_literal()
            };
        }
        butternut_assert_eq_simple!(expression.vars.len(), 1);
        let coefficient = expression.coeffs[0];
        let remainder = value - expression.offset;
        if remainder % coefficient != 0 {
            return self.false_literal();
        }
        self.get_or_create_var_value_encoding(expression.vars[0], remainder / coefficient)
    }

    // ---------------------------------------------------------------------------------------
    // Boolean algebra.

    /// Posts the clause `!a \/ b`.
    pub fn add_implication(&mut self, a: Literal, b: Literal) {
        let _ = self
            .model
            .add_constraint(Constraint::new(ConstraintKind::BoolOr(vec![!a, b])));
    }

    /// Posts `literal => variable in domain`.
    pub fn add_imply_in_domain(
        &mut self,
        literal: Literal,
        variable: VariableId,
        domain: &Domain,
    ) {
        let mut linear = LinearConstraint::new(domain.clone());
        linear.add_term(variable, 1);
        let _ = self.model.add_constraint(Constraint::with_enforcement(
            ConstraintKind::Linear(linear),
            vec![literal],
        ));
    }

    /// Records that two literals are equivalent.
    pub fn store_boolean_equality_relation(&mut self, a: Literal, b: Literal) {
        if a == b {
            return;
        }
        if a == !b {
            self.notify_that_model_is_unsat("a literal cannot equal its own negation");
            return;
        }
        self.add_implication(a, b);
        self.add_implication(b, a);
    }

    // ---------------------------------------------------------------------------------------
    // Reified precedences.

    /// Returns a literal equivalent to `time_i <= time_j /\ active_i /\ active_j`, creating and
    /// caching it if needed.
    ///
    /// Note that the literals for `(i, j)` and `(j, i)` are independent; at equal times both are
    /// true.
    pub fn get_or_create_reified_precedence_literal(
        &mut self,
        time_i: &LinearExpression,
        time_j: &LinearExpression,
        active_i: Literal,
        active_j: Literal,
    ) -> Literal {
        let key = (time_i.clone(), time_j.clone(), active_i, active_j);
        if let Some(&literal) = self.precedence_cache.get(&key) {
            return literal;
        }

        let literal = if self.is_fixed(time_i) && self.is_fixed(time_j) {
            if self.fixed_value(time_i) <= self.fixed_value(time_j) {
                // The precedence always holds, so the literal reduces to `active_i /\ active_j`.
                if active_i == active_j {
                    active_i
                } else {
                    let conjunction = self.new_bool_var();
                    self.add_implication(conjunction, active_i);
                    self.add_implication(conjunction, active_j);
                    let _ = self.model.add_constraint(Constraint::new(
                        ConstraintKind::BoolOr(vec![!active_i, !active_j, conjunction]),
                    ));
                    conjunction
                }
            } else {
                self.false_literal()
            }
        } else {
            let literal = self.new_bool_var();

            let mut less_or_equal = LinearConstraint::new(Domain::new(0, i64::MAX));
            less_or_equal.add_expression(time_j, 1);
            less_or_equal.add_expression(time_i, -1);
            let _ = self.model.add_constraint(Constraint::with_enforcement(
                ConstraintKind::Linear(less_or_equal),
                vec![literal],
            ));

            self.add_implication(literal, active_i);
            self.add_implication(literal, active_j);

            // When both events are active and the literal is false, the precedence must be
            // strictly violated; this gives the converse direction of the equivalence.
            let mut greater = LinearConstraint::new(Domain::new(i64::MIN, -1));
            greater.add_expression(time_j, 1);
            greater.add_expression(time_i, -1);
            let _ = self.model.add_constraint(Constraint::with_enforcement(
                ConstraintKind::Linear(greater),
                vec![!literal, active_i, active_j],
            ));

            literal
        };

        let _ = self.precedence_cache.insert(key, literal);
        literal
    }

    pub fn clear_precedence_cache(&mut self) {
        self.precedence_cache.clear();
    }

    // ---------------------------------------------------------------------------------------
    // Objective.

    pub fn objective_map(&self) -> &BTreeMap<VariableId, i64> {
        &self.model.objective().terms
    }

    pub fn add_to_objective_offset(&mut self, delta: i64) {
        self.model.objective_mut().offset += delta;
    }

    /// Adds `coefficient` to the objective whenever `literal` is true.
    pub fn add_literal_to_objective(&mut self, literal: Literal, coefficient: i64) {
        if coefficient == 0 {
            return;
        }
        let variable = literal.variable();
        let objective = self.model.objective_mut();
        let current = objective.terms.get(&variable).copied().unwrap_or(0);
        if literal.is_positive() {
            objective.set_term(variable, current + coefficient);
        } else {
            // cost * (1 - variable)
            objective.set_term(variable, current - coefficient);
            objective.offset += coefficient;
        }
    }

    pub fn remove_variable_from_objective(&mut self, variable: VariableId) {
        let _ = self.model.objective_mut().terms.remove(&variable);
    }

    // ---------------------------------------------------------------------------------------
    // Variable usage bookkeeping.

    /// Registers the variable usage of all constraints added since the last call.
    pub fn update_new_constraints_variable_usage(&mut self) {
        for index in self.constraint_to_vars.len()..self.model.constraints.len() {
            self.constraint_to_vars.push(Vec::new());
            self.register_constraint_usage(index);
        }
    }

    /// Recomputes the variable usage of one (modified or cleared) constraint.
    pub fn update_constraint_variable_usage(&mut self, index: usize) {
        butternut_assert_simple!(index < self.constraint_to_vars.len());
        for variable in std::mem::take(&mut self.constraint_to_vars[index]) {
            let _ = self.var_to_constraints[variable].remove(&index);
        }
        self.register_constraint_usage(index);
    }

    fn register_constraint_usage(&mut self, index: usize) {
        let mut variables = self.model.constraints[index].referenced_variables();
        variables.sort_unstable();
        variables.dedup();
        for &variable in &variables {
            let _ = self.var_to_constraints[variable].insert(index);
        }
        self.constraint_to_vars[index] = variables;
    }

    /// The indices of the constraints referencing the variable.
    pub fn var_to_constraints(&self, variable: VariableId) -> &HashSet<usize> {
        &self.var_to_constraints[variable]
    }

    /// The variable appears in exactly one constraint and not in the objective, so it can be
    /// removed once that constraint determines it. Disabled when enumerating all solutions.
    pub fn variable_is_unique_and_removable(&self, variable: VariableId) -> bool {
        !self.options.enumerate_all_solutions
            && self.var_to_constraints[variable].len() == 1
            && !self.objective_map().contains_key(&variable)
    }

    /// As [`Self::variable_is_unique_and_removable`], but the variable carries a cost.
    pub fn variable_with_cost_is_unique_and_removable(&self, variable: VariableId) -> bool {
        !self.options.enumerate_all_solutions
            && self.var_to_constraints[variable].len() == 1
            && self.objective_map().contains_key(&variable)
    }

    pub fn mark_variable_as_removed(&mut self, variable: VariableId) {
        let _ = self.removed_variables.insert(variable);
    }

    pub fn variable_is_removed(&self, variable: VariableId) -> bool {
        self.removed_variables.contains(&variable)
    }

    // ---------------------------------------------------------------------------------------
    // Postsolve mapping model.

    /// Appends a constraint describing how to reconstruct a removed variable.
    pub fn add_mapping_constraint(&mut self, constraint: Constraint) {
        self.mapping_model.push(constraint);
    }

    pub fn mapping_model(&self) -> &[Constraint] {
        &self.mapping_model
    }

    // ---------------------------------------------------------------------------------------
    // Statistics and status flags.

    pub fn update_rule_stats(&mut self, name: impl Into<String>) {
        *self.rule_stats.entry(name.into()).or_insert(0) += 1;
    }

    pub fn rule_stats(&self) -> &BTreeMap<String, u64> {
        &self.rule_stats
    }

    pub fn notify_that_model_is_unsat(&mut self, reason: &str) {
        if !self.unsat {
            debug!("The model was proven infeasible: {reason}");
            self.unsat = true;
        }
    }

    pub fn model_is_unsat(&self) -> bool {
        self.unsat
    }

    pub fn notify_that_model_is_expanded(&mut self) {
        self.expanded = true;
    }

    pub fn model_is_expanded(&self) -> bool {
        self.expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_literals_are_unique_per_pair() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 9));
        let mut context = PresolveContext::new(model, ExpansionOptions::default());

        let first = context.get_or_create_var_value_encoding(x, 3);
        let second = context.get_or_create_var_value_encoding(x, 3);
        assert_eq!(first, second);

        let other = context.get_or_create_var_value_encoding(x, 4);
        assert_ne!(first, other);
    }

    #[test]
    fn two_value_domains_share_one_boolean() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::from_values([2, 5]));
        let mut context = PresolveContext::new(model, ExpansionOptions::default());

        let five = context.get_or_create_var_value_encoding(x, 5);
        let two = context.get_or_create_var_value_encoding(x, 2);
        assert_eq!(two, !five);
    }

    #[test]
    fn boolean_variables_encode_themselves() {
        let mut model = Model::new();
        let b = model.new_variable(Domain::boolean());
        let mut context = PresolveContext::new(model, ExpansionOptions::default());

        assert_eq!(
            context.get_or_create_var_value_encoding(b, 1),
            Literal::new(b, true)
        );
        assert_eq!(
            context.get_or_create_var_value_encoding(b, 0),
            Literal::new(b, false)
        );
    }

    #[test]
    fn out_of_domain_value_encodes_to_the_false_literal() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 4));
        let mut context = PresolveContext::new(model, ExpansionOptions::default());

        let literal = context.get_or_create_var_value_encoding(x, 17);
        assert!(context.literal_is_false(literal));
    }

    #[test]
    fn emptied_domain_marks_the_model_unsat() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 4));
        let mut context = PresolveContext::new(model, ExpansionOptions::default());

        assert!(!context.intersect_domain_with(x, &Domain::new(10, 20)));
        assert!(context.model_is_unsat());
    }

    #[test]
    fn usage_graph_tracks_cleared_constraints() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 4));
        let mut linear = LinearConstraint::new(Domain::new(0, 2));
        linear.add_term(x, 1);
        let index = model.add_constraint(Constraint::new(ConstraintKind::Linear(linear)));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        assert!(context.var_to_constraints(x).contains(&index));

        context.model_mut().constraints[index] = Constraint::default();
        context.update_constraint_variable_usage(index);
        assert!(context.var_to_constraints(x).is_empty());
    }
}
