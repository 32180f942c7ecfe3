use crate::butternut_asserts::butternut_assert_simple;
use crate::containers::HashMap;
use crate::expansion::ExpansionStatus;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::LinearConstraint;
use crate::model::Literal;
use crate::presolve::PresolveContext;

/// Adds `coefficient * literal` to the linear constraint.
///
/// A negated literal contributes `coefficient * (1 - variable)`; the constant part is folded
/// into the domain.
fn add_literal_term(linear: &mut LinearConstraint, literal: Literal, coefficient: i64) {
    if literal.is_positive() {
        linear.add_term(literal.variable(), coefficient);
    } else {
        linear.add_term(literal.variable(), -coefficient);
        linear.domain = linear
            .domain
            .addition_with(&Domain::constant(coefficient.saturating_neg()));
    }
}

/// Expands a reservoir constraint whose level changes are all fixed.
///
/// If all changes have the same sign the order of the events is irrelevant and a single linear
/// constraint over the activity literals bounds the final level. Otherwise, one reified
/// precedence literal is created per ordered pair of events, and for every event the level just
/// after it is bounded by a linear constraint over the precedence literals of its predecessors.
pub(crate) fn expand_reservoir(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::Reservoir(reservoir) = kind else {
        unreachable!()
    };
    butternut_assert_simple!(
        enforcement.is_empty(),
        "reservoir constraints do not carry enforcement literals"
    );

    if reservoir.min_level > reservoir.max_level {
        context.notify_that_model_is_unsat("empty level range in a reservoir constraint");
        return ExpansionStatus::Kept(Constraint {
            enforcement,
            kind: ConstraintKind::Reservoir(reservoir),
        });
    }

    let num_events = reservoir.time_exprs.len();
    let true_literal = context.true_literal();
    let active = |index: usize| {
        reservoir
            .active_literals
            .get(index)
            .copied()
            .unwrap_or(true_literal)
    };

    let demands: Vec<i64> = reservoir
        .level_changes
        .iter()
        .map(|level_change| context.fixed_value(level_change))
        .collect();
    let num_positives = demands.iter().filter(|&&demand| demand > 0).count();
    let num_negatives = demands.iter().filter(|&&demand| demand < 0).count();

    if num_positives > 0 && num_negatives > 0 {
        // Creates Boolean variables equivalent to `time[i] <= time[j] /\ active[i] /\
        // active[j]` for all pairs of events that can both be active.
        let mut precedence: HashMap<(usize, usize), Literal> = HashMap::default();
        for i in 0..num_events.saturating_sub(1) {
            let active_i = active(i);
            if context.literal_is_false(active_i) {
                continue;
            }
            for j in i + 1..num_events {
                let active_j = active(j);
                if context.literal_is_false(active_j) {
                    continue;
                }

                let i_before_j = context.get_or_create_reified_precedence_literal(
                    &reservoir.time_exprs[i],
                    &reservoir.time_exprs[j],
                    active_i,
                    active_j,
                );
                context
                    .model_mut()
                    .set_variable_name(i_before_j.variable(), format!("{i} before {j}"));
                let _ = precedence.insert((i, j), i_before_j);

                let j_before_i = context.get_or_create_reified_precedence_literal(
                    &reservoir.time_exprs[j],
                    &reservoir.time_exprs[i],
                    active_j,
                    active_i,
                );
                context
                    .model_mut()
                    .set_variable_name(j_before_i.variable(), format!("{j} before {i}"));
                let _ = precedence.insert((j, i), j_before_i);
            }
        }

        // Constrains the running level to be consistent at every event: the level just after
        // event i is its own demand plus the demands of all predecessors.
        for i in 0..num_events {
            let active_i = active(i);
            if context.literal_is_false(active_i) {
                continue;
            }

            let mut offset: i64 = 0;
            let mut level = LinearConstraint::new(Domain::empty());
            for j in 0..num_events {
                if i == j {
                    continue;
                }
                let active_j = active(j);
                if context.literal_is_false(active_j) {
                    continue;
                }

                let precedence_literal = precedence[&(j, i)];
                let demand = demands[j];
                if precedence_literal.is_positive() {
                    level.add_term(precedence_literal.variable(), demand);
                } else {
                    // demand * literal == demand - demand * variable.
                    level.add_term(precedence_literal.variable(), -demand);
                    offset -= demand;
                }
            }

            // Accounts for the event's own demand in the domain of the sum.
            level.domain = Domain::new(
                reservoir
                    .min_level
                    .saturating_sub(demands[i])
                    .saturating_add(offset),
                reservoir
                    .max_level
                    .saturating_sub(demands[i])
                    .saturating_add(offset),
            );
            let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
                ConstraintKind::Linear(level),
                vec![active_i],
            ));
        }
    } else {
        // All level changes have the same sign: only the final sum matters.
        let mut sum = LinearConstraint::new(Domain::new(reservoir.min_level, reservoir.max_level));
        for (i, &demand) in demands.iter().enumerate() {
            add_literal_term(&mut sum, active(i), demand);
        }
        let _ = context
            .model_mut()
            .add_constraint(Constraint::new(ConstraintKind::Linear(sum)));
    }

    context.update_rule_stats("reservoir: expanded");
    ExpansionStatus::Expanded
}

#[cfg(test)]
mod tests {
    use crate::checking::enumerate_solutions;
    use crate::expansion::expand_model;
    use crate::model::ConstraintKind;
    use crate::model::Domain;
    use crate::model::LinearExpression;
    use crate::model::Literal;
    use crate::model::Model;
    use crate::model::ReservoirConstraint;
    use crate::model::Constraint;
    use crate::presolve::ExpansionOptions;
    use crate::presolve::PresolveContext;

    #[test]
    fn mixed_signs_enforce_that_the_fill_precedes_the_drain() {
        let mut model = Model::new();
        let fill_time = model.new_variable(Domain::new(0, 1));
        let drain_time = model.new_variable(Domain::new(0, 1));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Reservoir(
            ReservoirConstraint {
                time_exprs: vec![
                    LinearExpression::variable(fill_time),
                    LinearExpression::variable(drain_time),
                ],
                level_changes: vec![
                    LinearExpression::constant(1),
                    LinearExpression::constant(-1),
                ],
                active_literals: vec![],
                min_level: 0,
                max_level: 1,
            },
        )));

        let expected = enumerate_solutions(&model, &[fill_time, drain_time]);
        assert_eq!(expected, vec![vec![0, 0], vec![0, 1], vec![1, 1]]);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the reservoir is feasible");
        assert!(context.model().constraints[0].is_empty());

        let actual = enumerate_solutions(context.model(), &[fill_time, drain_time]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn homogeneous_signs_reduce_to_one_linear_constraint() {
        let mut model = Model::new();
        let first_active = model.new_variable(Domain::boolean());
        let second_active = model.new_variable(Domain::boolean());
        let time = model.new_variable(Domain::new(0, 3));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Reservoir(
            ReservoirConstraint {
                time_exprs: vec![
                    LinearExpression::variable(time),
                    LinearExpression::constant(2),
                ],
                level_changes: vec![
                    LinearExpression::constant(2),
                    LinearExpression::constant(3),
                ],
                active_literals: vec![
                    Literal::new(first_active, true),
                    Literal::new(second_active, true),
                ],
                min_level: 0,
                max_level: 3,
            },
        )));

        let expected = enumerate_solutions(&model, &[first_active, second_active]);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the reservoir is feasible");

        let num_new_linear = context
            .model()
            .constraints
            .iter()
            .skip(1)
            .filter(|constraint| matches!(constraint.kind, ConstraintKind::Linear(_)))
            .count();
        assert_eq!(num_new_linear, 1);

        let actual = enumerate_solutions(context.model(), &[first_active, second_active]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn contradictory_levels_are_infeasible() {
        let mut model = Model::new();
        let time = model.new_variable(Domain::new(0, 1));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Reservoir(
            ReservoirConstraint {
                time_exprs: vec![LinearExpression::variable(time)],
                level_changes: vec![LinearExpression::constant(1)],
                active_literals: vec![],
                min_level: 3,
                max_level: 2,
            },
        )));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        assert!(expand_model(&mut context).is_err());
        assert!(context.model_is_unsat());
    }
}
