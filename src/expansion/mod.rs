//! Rewrites the high-level combinatorial constraints of a model into simple ones.
//!
//! The expansion stage walks the constraint list and replaces each automaton, table, element,
//! inverse, reservoir, integer modulo, integer product, all-different, and complex right-hand
//! side linear constraint with an equivalent formulation over clauses, cardinality constraints,
//! and small linear constraints. The feasible set projected onto the original variables is
//! preserved; all freshly created Booleans are functionally determined by the original
//! variables.
//!
//! The stage runs at most once per model (guarded by
//! [`PresolveContext::model_is_expanded`]) and is strictly single-threaded.
mod all_different;
mod arithmetic;
mod automaton;
mod element;
mod inverse;
mod linear;
mod reservoir;
mod table;
mod tuple_compression;

use std::collections::BTreeMap;

use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Literal;
use crate::presolve::PresolveContext;

/// The failure mode of the expansion entry points.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionError {
    /// The model was proven infeasible at the root while rewriting a constraint.
    #[error("the model was proven infeasible during constraint expansion")]
    ModelUnsat,
}

/// What a single expansion rule did with its constraint.
pub(crate) enum ExpansionStatus {
    /// The payload was rewritten into simpler constraints; the slot stays cleared.
    Expanded,
    /// The constraint is kept (possibly modified) in its slot.
    Kept(Constraint),
}

/// The work pass 1 selected for a constraint.
enum FirstPassAction {
    ComplexLinear,
    Reservoir,
    IntMod,
    IntProd,
    Element,
    Inverse,
    Automaton,
    Table,
    Skip,
}

/// Expands all constraints of the working model in place.
///
/// Pass 1 rewrites the constraint families that may fully encode variables; pass 2 handles
/// all-different constraints (whose expansion decision depends on how the rest of the model
/// uses their variables) and small two-variable not-equal linears. Linear constraints with a
/// multi-interval right-hand side are left to
/// [`final_expansion_for_linear_constraints`] unless the main presolve loop is disabled.
pub fn expand_model(context: &mut PresolveContext) -> Result<(), ExpansionError> {
    if context.options().disable_constraint_expansion {
        return Ok(());
    }
    if context.model_is_unsat() {
        return Err(ExpansionError::ModelUnsat);
    }
    // None of the rewrites here ever produces a constraint that needs to be expanded again, so
    // one run of the stage suffices.
    if context.model_is_expanded() {
        return Ok(());
    }

    context.clear_precedence_cache();

    // First pass. Note that constraints added during the pass are visited as well; they are all
    // of simple kinds and fall through to `Skip`.
    let mut index = 0;
    while index < context.model().constraints.len() {
        let action = select_first_pass_action(index, context);
        let _acted = expand_one_constraint(index, action, context)?;
        index += 1;
    }

    // Second pass. The all-different scan caches its per-variable classification across
    // constraints.
    let mut scan_cache = all_different::UsageScanCache::default();
    let mut index = 0;
    while index < context.model().constraints.len() {
        let is_all_different = matches!(
            context.model().constraints[index].kind,
            ConstraintKind::AllDifferent(_)
        );
        let is_linear = matches!(
            context.model().constraints[index].kind,
            ConstraintKind::Linear(_)
        );

        if is_all_different || is_linear {
            let constraint = std::mem::take(&mut context.model_mut().constraints[index]);
            let status = if is_all_different {
                all_different::maybe_expand_all_different(constraint, context, &mut scan_cache)
            } else {
                linear::expand_some_linear_of_size_two(constraint, context)
            };
            finish_constraint(index, status, context);

            if context.model_is_unsat() {
                debug!("UNSAT after expansion of constraint {index}");
                return Err(ExpansionError::ModelUnsat);
            }
        }
        index += 1;
    }

    // The precedence cache does not survive variable substitution in later presolve stages, so
    // it is dropped here rather than kept around.
    context.clear_precedence_cache();
    context.notify_that_model_is_expanded();
    Ok(())
}

/// Expands the linear constraints with a multi-interval right-hand side.
///
/// This is a separate entry point because these constraints must stay intact during the main
/// presolve loop (their rich domains drive other reductions) and can only be rewritten once
/// that loop has finished.
pub fn final_expansion_for_linear_constraints(
    context: &mut PresolveContext,
) -> Result<(), ExpansionError> {
    if context.options().disable_constraint_expansion {
        return Ok(());
    }
    if context.model_is_unsat() {
        return Err(ExpansionError::ModelUnsat);
    }

    let mut index = 0;
    while index < context.model().constraints.len() {
        let is_complex_linear = match &context.model().constraints[index].kind {
            ConstraintKind::Linear(linear) => linear.domain.num_intervals() > 1,
            _ => false,
        };
        if is_complex_linear {
            let constraint = std::mem::take(&mut context.model_mut().constraints[index]);
            let status = linear::expand_complex_linear_constraint(constraint, context);
            finish_constraint(index, status, context);
            if context.model_is_unsat() {
                return Err(ExpansionError::ModelUnsat);
            }
        }
        index += 1;
    }
    Ok(())
}

fn select_first_pass_action(index: usize, context: &PresolveContext) -> FirstPassAction {
    match &context.model().constraints[index].kind {
        ConstraintKind::Linear(linear) => {
            // If there is no presolve loop to run afterwards, complex right-hand sides are
            // expanded right away so that no final pass is needed.
            if linear.domain.num_intervals() > 1 && !context.options().cp_model_presolve {
                FirstPassAction::ComplexLinear
            } else {
                FirstPassAction::Skip
            }
        }
        ConstraintKind::Reservoir(_) if context.options().expand_reservoir_constraints => {
            FirstPassAction::Reservoir
        }
        ConstraintKind::IntMod(_) => FirstPassAction::IntMod,
        ConstraintKind::IntProd(_) => FirstPassAction::IntProd,
        ConstraintKind::Element(_) => FirstPassAction::Element,
        ConstraintKind::Inverse(_) => FirstPassAction::Inverse,
        ConstraintKind::Automaton(_) => FirstPassAction::Automaton,
        ConstraintKind::Table(_) => FirstPassAction::Table,
        _ => FirstPassAction::Skip,
    }
}

/// Runs the selected expansion rule on the constraint at `index`. Returns whether anything was
/// done, or an error if the model became infeasible.
fn expand_one_constraint(
    index: usize,
    action: FirstPassAction,
    context: &mut PresolveContext,
) -> Result<bool, ExpansionError> {
    if matches!(action, FirstPassAction::Skip) {
        return Ok(false);
    }

    if let FirstPassAction::Reservoir = action {
        let unsupported = match &context.model().constraints[index].kind {
            ConstraintKind::Reservoir(reservoir) => reservoir
                .level_changes
                .iter()
                .any(|level_change| !context.is_fixed(level_change)),
            _ => unreachable!(),
        };
        if unsupported {
            context
                .update_rule_stats("reservoir: expansion is not supported with variable level changes");
            return Ok(false);
        }
    }

    let constraint = std::mem::take(&mut context.model_mut().constraints[index]);
    let status = match action {
        FirstPassAction::ComplexLinear => linear::expand_complex_linear_constraint(constraint, context),
        FirstPassAction::Reservoir => reservoir::expand_reservoir(constraint, context),
        FirstPassAction::IntMod => arithmetic::expand_int_mod(constraint, context),
        FirstPassAction::IntProd => arithmetic::expand_int_prod(constraint, context),
        FirstPassAction::Element => element::expand_element(constraint, context),
        FirstPassAction::Inverse => inverse::expand_inverse(constraint, context),
        FirstPassAction::Automaton => automaton::expand_automaton(constraint, context),
        FirstPassAction::Table => table::expand_table(constraint, context),
        FirstPassAction::Skip => unreachable!(),
    };
    finish_constraint(index, status, context);

    if context.model_is_unsat() {
        debug!("UNSAT after expansion of constraint {index}");
        return Err(ExpansionError::ModelUnsat);
    }
    Ok(true)
}

/// Restores a kept constraint into its slot and refreshes the usage graph.
fn finish_constraint(index: usize, status: ExpansionStatus, context: &mut PresolveContext) {
    if let ExpansionStatus::Kept(constraint) = status {
        context.model_mut().constraints[index] = constraint;
    }
    context.update_new_constraints_variable_usage();
    context.update_constraint_variable_usage(index);
}

/// Adds clauses so that `tuple_literals[i]` true implies `encoding[values[i]]` true, and that a
/// value whose supporting tuples are all false is false itself.
///
/// This implicitly uses the fact that exactly one of the tuple literals is true: when a value
/// is supported by a single tuple, the two literals are simply declared equal.
pub(crate) fn link_literals_and_values(
    context: &mut PresolveContext,
    tuple_literals: &[Literal],
    values: &[i64],
    encoding: &BTreeMap<i64, Literal>,
) {
    assert_eq!(tuple_literals.len(), values.len());

    // An ordered map keyed by the encoding literal keeps the emission order deterministic.
    let mut encoding_literal_to_support: BTreeMap<Literal, Vec<Literal>> = BTreeMap::new();
    for (i, value) in values.iter().enumerate() {
        encoding_literal_to_support
            .entry(encoding[value])
            .or_default()
            .push(tuple_literals[i]);
    }

    for (encoding_literal, support) in encoding_literal_to_support {
        assert!(!support.is_empty());
        if support.len() == 1 {
            context.store_boolean_equality_relation(encoding_literal, support[0]);
        } else {
            let mut clause = vec![!encoding_literal];
            for &tuple_literal in &support {
                clause.push(tuple_literal);
                context.add_implication(tuple_literal, encoding_literal);
            }
            let _ = context
                .model_mut()
                .add_constraint(Constraint::new(ConstraintKind::BoolOr(clause)));
        }
    }
}

/// Adds the constraint `literal => one_of(encoding[v] for v in reachable_values)`, choosing
/// between a clause over the reachable values and a conjunction of negations over the
/// unreachable ones, whichever is smaller. All possible values are the encoding's keys.
pub(crate) fn add_imply_in_reachable_values(
    context: &mut PresolveContext,
    literal: Literal,
    reachable_values: Vec<i64>,
    encoding: &BTreeMap<i64, Literal>,
) {
    let reachable_values: Vec<i64> = reachable_values.into_iter().sorted().dedup().collect();
    if reachable_values.len() == encoding.len() {
        // Nothing is excluded.
        return;
    }

    if reachable_values.len() <= encoding.len() / 2 {
        let clause = reachable_values
            .iter()
            .map(|value| encoding[value])
            .collect();
        let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
            ConstraintKind::BoolOr(clause),
            vec![literal],
        ));
    } else {
        let forbidden = encoding
            .iter()
            .filter(|(value, _)| !reachable_values.contains(value))
            .map(|(_, &encoding_literal)| !encoding_literal)
            .collect();
        let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
            ConstraintKind::BoolAnd(forbidden),
            vec![literal],
        ));
    }
}

#[cfg(test)]
mod tests {
    use crate::model::AllDifferentConstraint;
    use crate::model::Constraint;
    use crate::model::ConstraintKind;
    use crate::model::Domain;
    use crate::model::ElementConstraint;
    use crate::model::LinearExpression;
    use crate::model::Model;
    use crate::model::TableConstraint;
    use crate::presolve::ExpansionOptions;
    use crate::presolve::PresolveContext;

    use super::expand_model;

    /// A model mixing several expandable families.
    fn mixed_model() -> Model {
        let mut model = Model::new();
        let index = model.new_variable(Domain::new(0, 2));
        let target = model.new_variable(Domain::new(0, 9));
        let a = model.new_variable(Domain::from_values([1, 4]));
        let b = model.new_variable(Domain::new(2, 5));
        let c = model.new_variable(Domain::new(3, 6));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Element(
            ElementConstraint {
                index,
                variables: vec![a, b, c],
                target,
            },
        )));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Table(TableConstraint {
            variables: vec![a, b],
            tuples: vec![vec![1, 2], vec![1, 3], vec![4, 5]],
            negated: false,
        })));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::AllDifferent(
            AllDifferentConstraint {
                exprs: vec![
                    LinearExpression::variable(a),
                    LinearExpression::variable(b),
                    LinearExpression::variable(c),
                ],
            },
        )));
        model
    }

    #[test]
    fn expansion_is_deterministic_in_its_input() {
        let mut first = PresolveContext::new(mixed_model(), ExpansionOptions::default());
        expand_model(&mut first).expect("the model is satisfiable");

        let mut second = PresolveContext::new(mixed_model(), ExpansionOptions::default());
        expand_model(&mut second).expect("the model is satisfiable");

        assert_eq!(
            format!("{:?}", first.model()),
            format!("{:?}", second.model())
        );
        assert_eq!(first.rule_stats(), second.rule_stats());
    }

    #[test]
    fn a_second_run_is_a_no_op() {
        let mut context = PresolveContext::new(mixed_model(), ExpansionOptions::default());
        expand_model(&mut context).expect("the model is satisfiable");
        assert!(context.model_is_expanded());

        let snapshot = format!("{:?}", context.model());
        expand_model(&mut context).expect("an expanded model stays expanded");
        assert_eq!(snapshot, format!("{:?}", context.model()));
    }

    #[test]
    fn expansion_can_be_disabled() {
        let options = ExpansionOptions {
            disable_constraint_expansion: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(mixed_model(), options);
        expand_model(&mut context).expect("a disabled expansion cannot fail");
        assert!(!context.model_is_expanded());
        assert!(context
            .model()
            .constraints
            .iter()
            .all(|constraint| !constraint.is_empty()));
    }
}
