//! A reference evaluator for the model.
//!
//! This module interprets constraints directly over complete assignments. It is deliberately
//! naive: it exists so that tests can enumerate the feasible set of a small model before and
//! after expansion and assert that the two sets agree on the original variables.

use crate::butternut_asserts::butternut_assert_simple;
use crate::containers::HashSet;
use crate::containers::StorageKey;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::LinearExpression;
use crate::model::Literal;
use crate::model::Model;
use crate::model::VariableId;

/// The largest assignment space [`enumerate_solutions`] is willing to walk.
const MAX_ENUMERATED_ASSIGNMENTS: u64 = 1 << 22;

/// Evaluates a literal under a complete assignment, indexed by variable.
pub fn literal_is_true(literal: Literal, assignment: &[i64]) -> bool {
    assignment[literal.variable().index()] == literal.value_when_true()
}

fn evaluate_expression(expression: &LinearExpression, assignment: &[i64]) -> i64 {
    expression
        .terms()
        .map(|(variable, coefficient)| coefficient * assignment[variable.index()])
        .sum::<i64>()
        + expression.offset
}

/// Evaluates a single constraint under a complete assignment.
///
/// A constraint whose enforcement literals are not all true holds vacuously.
pub fn constraint_is_satisfied(constraint: &Constraint, assignment: &[i64]) -> bool {
    if !constraint
        .enforcement
        .iter()
        .all(|&literal| literal_is_true(literal, assignment))
    {
        return true;
    }

    let value_of = |variable: VariableId| assignment[variable.index()];

    match &constraint.kind {
        ConstraintKind::Empty => true,
        ConstraintKind::BoolOr(literals) => literals
            .iter()
            .any(|&literal| literal_is_true(literal, assignment)),
        ConstraintKind::BoolAnd(literals) => literals
            .iter()
            .all(|&literal| literal_is_true(literal, assignment)),
        ConstraintKind::AtMostOne(literals) => {
            literals
                .iter()
                .filter(|&&literal| literal_is_true(literal, assignment))
                .count()
                <= 1
        }
        ConstraintKind::ExactlyOne(literals) => {
            literals
                .iter()
                .filter(|&&literal| literal_is_true(literal, assignment))
                .count()
                == 1
        }
        ConstraintKind::Linear(linear) => {
            let sum: i64 = linear
                .vars
                .iter()
                .zip(&linear.coeffs)
                .map(|(&variable, &coefficient)| coefficient * value_of(variable))
                .sum();
            linear.domain.contains(sum)
        }
        ConstraintKind::IntProd(argument) => {
            let product = argument
                .exprs
                .iter()
                .map(|expr| evaluate_expression(expr, assignment))
                .product::<i64>();
            evaluate_expression(&argument.target, assignment) == product
        }
        ConstraintKind::IntDiv(argument) => {
            let numerator = evaluate_expression(&argument.exprs[0], assignment);
            let denominator = evaluate_expression(&argument.exprs[1], assignment);
            denominator != 0
                && evaluate_expression(&argument.target, assignment) == numerator / denominator
        }
        ConstraintKind::IntMod(argument) => {
            let numerator = evaluate_expression(&argument.exprs[0], assignment);
            let modulo = evaluate_expression(&argument.exprs[1], assignment);
            modulo != 0
                && evaluate_expression(&argument.target, assignment) == numerator % modulo
        }
        ConstraintKind::LinMax(argument) => {
            let maximum = argument
                .exprs
                .iter()
                .map(|expr| evaluate_expression(expr, assignment))
                .max();
            maximum == Some(evaluate_expression(&argument.target, assignment))
        }
        ConstraintKind::Element(element) => {
            let index = value_of(element.index);
            usize::try_from(index)
                .ok()
                .and_then(|index| element.variables.get(index))
                .is_some_and(|&selected| value_of(selected) == value_of(element.target))
        }
        ConstraintKind::Inverse(inverse) => {
            let n = inverse.f_direct.len() as i64;
            inverse.f_direct.iter().enumerate().all(|(i, &direct)| {
                let j = value_of(direct);
                (0..n).contains(&j) && value_of(inverse.f_inverse[j as usize]) == i as i64
            })
        }
        ConstraintKind::Automaton(automaton) => {
            // Tracking a set of states keeps the check correct for nondeterministic transition
            // relations as well.
            let mut states: HashSet<i64> = std::iter::once(automaton.starting_state).collect();
            for &variable in &automaton.variables {
                let label = value_of(variable);
                states = automaton
                    .transitions
                    .iter()
                    .filter(|transition| {
                        transition.label == label && states.contains(&transition.tail)
                    })
                    .map(|transition| transition.head)
                    .collect();
            }
            states
                .iter()
                .any(|state| automaton.final_states.contains(state))
        }
        ConstraintKind::Table(table) => {
            let row: Vec<i64> = table.variables.iter().map(|&v| value_of(v)).collect();
            table.tuples.contains(&row) != table.negated
        }
        ConstraintKind::Reservoir(reservoir) => {
            let is_active = |event: usize| {
                reservoir
                    .active_literals
                    .get(event)
                    .map_or(true, |&literal| literal_is_true(literal, assignment))
            };
            (0..reservoir.time_exprs.len()).filter(|&i| is_active(i)).all(|i| {
                let time_i = evaluate_expression(&reservoir.time_exprs[i], assignment);
                let level: i64 = (0..reservoir.time_exprs.len())
                    .filter(|&j| is_active(j))
                    .filter(|&j| evaluate_expression(&reservoir.time_exprs[j], assignment) <= time_i)
                    .map(|j| evaluate_expression(&reservoir.level_changes[j], assignment))
                    .sum();
                (reservoir.min_level..=reservoir.max_level).contains(&level)
            })
        }
        ConstraintKind::AllDifferent(all_different) => {
            let values: Vec<i64> = all_different
                .exprs
                .iter()
                .map(|expr| evaluate_expression(expr, assignment))
                .collect();
            let distinct: HashSet<i64> = values.iter().copied().collect();
            distinct.len() == values.len()
        }
        ConstraintKind::Interval(interval) => {
            evaluate_expression(&interval.start, assignment)
                + evaluate_expression(&interval.size, assignment)
                == evaluate_expression(&interval.end, assignment)
        }
    }
}

/// Whether a complete assignment satisfies every constraint of the model.
pub fn assignment_is_feasible(model: &Model, assignment: &[i64]) -> bool {
    model
        .constraints
        .iter()
        .all(|constraint| constraint_is_satisfied(constraint, assignment))
}

/// The objective value of a complete assignment.
pub fn evaluate_objective(model: &Model, assignment: &[i64]) -> i64 {
    let objective = model.objective();
    objective
        .terms
        .iter()
        .map(|(&variable, &coefficient)| coefficient * assignment[variable.index()])
        .sum::<i64>()
        + objective.offset
}

/// Enumerates all feasible assignments of the model, projected onto the given variables.
///
/// The result is sorted and deduplicated, so two models can be compared for solution-set
/// equality on a shared set of variables.
pub fn enumerate_solutions(model: &Model, projection: &[VariableId]) -> Vec<Vec<i64>> {
    let domains: Vec<Vec<i64>> = model
        .variable_ids()
        .map(|variable| model.domain(variable).values().collect())
        .collect();

    let num_assignments = domains
        .iter()
        .map(|values| values.len() as u64)
        .try_fold(1u64, u64::checked_mul);
    butternut_assert_simple!(
        num_assignments.is_some_and(|n| n <= MAX_ENUMERATED_ASSIGNMENTS),
        "the model is too large to enumerate"
    );

    let mut solutions = Vec::new();
    let mut cursor = vec![0usize; domains.len()];
    let mut assignment: Vec<i64> = domains
        .iter()
        .map(|values| values.first().copied().unwrap_or(0))
        .collect();

    'outer: loop {
        if assignment_is_feasible(model, &assignment) {
            solutions.push(
                projection
                    .iter()
                    .map(|variable| assignment[variable.index()])
                    .collect(),
            );
        }

        // Advance the odometer.
        for position in (0..domains.len()).rev() {
            cursor[position] += 1;
            if cursor[position] < domains[position].len() {
                assignment[position] = domains[position][cursor[position]];
                continue 'outer;
            }
            cursor[position] = 0;
            assignment[position] = domains[position][0];
        }
        break;
    }

    solutions.sort();
    solutions.dedup();
    solutions
}
