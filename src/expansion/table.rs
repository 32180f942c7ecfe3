use std::collections::BTreeMap;

use itertools::Itertools;
use log::trace;

use crate::butternut_asserts::butternut_assert_moderate;
use crate::butternut_asserts::butternut_assert_simple;
use crate::containers::HashMap;
use crate::containers::HashSet;
use crate::expansion::tuple_compression::compress_tuples;
use crate::expansion::tuple_compression::fully_compress_tuples;
use crate::expansion::tuple_compression::ANY_VALUE;
use crate::expansion::ExpansionStatus;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::LinearConstraint;
use crate::model::Literal;
use crate::model::TableConstraint;
use crate::model::VariableId;
use crate::presolve::PresolveContext;

pub(crate) fn expand_table(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::Table(table) = kind else {
        unreachable!()
    };
    butternut_assert_simple!(
        enforcement.is_empty(),
        "table constraints do not carry enforcement literals"
    );

    if table.negated {
        expand_negative_table(table, context)
    } else {
        expand_positive_table(table, context)
    }
}

/// Forbidden tuples become clauses: after compression, each remaining tuple yields the clause
/// "some concrete column differs".
fn expand_negative_table(
    mut table: TableConstraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let num_vars = table.variables.len();

    // A forbidden tuple with a value outside a domain can never be matched.
    table.tuples.retain(|tuple| {
        tuple
            .iter()
            .enumerate()
            .all(|(i, &value)| context.domain_contains(table.variables[i], value))
    });

    if table.tuples.is_empty() {
        context.update_rule_stats("table: empty negated constraint");
        return ExpansionStatus::Expanded;
    }

    let domain_sizes: Vec<u64> = table
        .variables
        .iter()
        .map(|&variable| context.domain_of(variable).size())
        .collect();
    compress_tuples(&domain_sizes, &mut table.tuples);

    for tuple in &table.tuples {
        let mut clause = Vec::new();
        for i in 0..num_vars {
            let value = tuple[i];
            if value == ANY_VALUE {
                continue;
            }
            let literal = context.get_or_create_var_value_encoding(table.variables[i], value);
            clause.push(!literal);
        }

        if clause.is_empty() {
            // A tuple of wildcards forbids every assignment.
            context.notify_that_model_is_unsat("negated table forbids all assignments");
            return ExpansionStatus::Expanded;
        }
        let _ = context
            .model_mut()
            .add_constraint(Constraint::new(ConstraintKind::BoolOr(clause)));
    }

    context.update_rule_stats("table: expanded negated constraint");
    ExpansionStatus::Expanded
}

fn expand_positive_table(
    table: TableConstraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let num_vars = table.variables.len();
    let mut vars = table.variables.clone();

    // Drop tuples referencing out-of-domain values and compute, per column, the set of values
    // used by the surviving tuples.
    let mut values_per_var: Vec<HashSet<i64>> = vec![HashSet::default(); num_vars];
    let mut tuples = table.tuples.clone();
    tuples.retain(|tuple| {
        tuple
            .iter()
            .enumerate()
            .all(|(i, &value)| context.domain_contains(vars[i], value))
    });
    for tuple in &tuples {
        for (i, &value) in tuple.iter().enumerate() {
            let _ = values_per_var[i].insert(value);
        }
    }

    if tuples.is_empty() {
        context.update_rule_stats("table: empty");
        context.notify_that_model_is_unsat("positive table without usable tuples");
        return ExpansionStatus::Kept(Constraint::new(ConstraintKind::Table(table)));
    }

    // Restrict the domains to the used values. This cannot fail since every used value is in
    // the corresponding domain.
    let mut num_fixed_variables = 0;
    for (i, &variable) in vars.iter().enumerate() {
        let used = Domain::from_values(values_per_var[i].iter().copied());
        let feasible = context.intersect_domain_with(variable, &used);
        butternut_assert_simple!(feasible);
        if context.domain_of(variable).is_fixed() {
            num_fixed_variables += 1;
        }
    }

    if num_fixed_variables == num_vars - 1 {
        context.update_rule_stats("table: one variable not fixed");
        return ExpansionStatus::Expanded;
    } else if num_fixed_variables == num_vars {
        context.update_rule_stats("table: all variables fixed");
        return ExpansionStatus::Expanded;
    }

    // Tables with two variables do not need tuple literals.
    if num_vars == 2 && !context.options().detect_table_with_cost {
        add_size_two_table(&vars, &tuples, &values_per_var, context);
        context.update_rule_stats("table: expanded positive constraint with two variables");
        return ExpansionStatus::Expanded;
    }

    let mut last_column_is_cost = false;
    if context.options().detect_table_with_cost {
        last_column_is_cost =
            reduce_table_in_presence_of_unique_variable_with_costs(&mut vars, &mut tuples, context);
    }

    compress_and_expand_positive_table(last_column_is_cost, &vars, tuples, context);
    ExpansionStatus::Expanded
}

/// Simpler encoding for tables with two variables: no tuple literals, only support clauses
/// between the two columns' value literals.
fn add_size_two_table(
    vars: &[VariableId],
    tuples: &[Vec<i64>],
    values_per_var: &[HashSet<i64>],
    context: &mut PresolveContext,
) {
    butternut_assert_simple!(vars.len() == 2);
    let left_var = vars[0];
    let right_var = vars[1];
    // A table with at most one variable not fixed is trivially enforced after the domain
    // reduction.
    if context.domain_of(left_var).is_fixed() || context.domain_of(right_var).is_fixed() {
        return;
    }

    let mut left_to_right: BTreeMap<Literal, Vec<Literal>> = BTreeMap::new();
    let mut right_to_left: BTreeMap<Literal, Vec<Literal>> = BTreeMap::new();
    for tuple in tuples {
        butternut_assert_moderate!(context.domain_contains(left_var, tuple[0]));
        butternut_assert_moderate!(context.domain_contains(right_var, tuple[1]));
        let left_literal = context.get_or_create_var_value_encoding(left_var, tuple[0]);
        let right_literal = context.get_or_create_var_value_encoding(right_var, tuple[1]);
        left_to_right.entry(left_literal).or_default().push(right_literal);
        right_to_left.entry(right_literal).or_default().push(left_literal);
    }

    let mut num_implications = 0;
    let mut num_clauses_added = 0;
    let mut add_support_constraint =
        |context: &mut PresolveContext, literal: Literal, support: &[Literal], max_support: usize| {
            if support.len() == max_support {
                return;
            }
            if support.len() == 1 {
                context.add_implication(literal, support[0]);
                num_implications += 1;
            } else {
                let mut clause = support.to_vec();
                clause.push(!literal);
                let _ = context
                    .model_mut()
                    .add_constraint(Constraint::new(ConstraintKind::BoolOr(clause)));
                num_clauses_added += 1;
            }
        };

    for (literal, support) in &left_to_right {
        add_support_constraint(context, *literal, support, values_per_var[1].len());
    }
    for (literal, support) in &right_to_left {
        add_support_constraint(context, *literal, support, values_per_var[0].len());
    }
    trace!(
        "Table: 2 variables, {} tuples encoded using {num_clauses_added} clauses and \
         {num_implications} implications",
        tuples.len()
    );
}

/// WCSP-style reduction: a column whose variable occurs only in this table (and linearly in
/// the objective) does not constrain anything by itself; its contribution is turned into a
/// per-tuple cost, and the variable's value is recorded in the postsolve mapping model.
///
/// On return the tuples have the layout `kept values..., cost`, and `vars` contains only the
/// kept columns. Returns whether a cost column was appended.
fn reduce_table_in_presence_of_unique_variable_with_costs(
    vars: &mut Vec<VariableId>,
    tuples: &mut Vec<Vec<i64>>,
    context: &mut PresolveContext,
) -> bool {
    let num_vars = vars.len();

    let mut only_here_and_in_objective = vec![false; num_vars];
    let mut objective_coeffs = vec![0i64; num_vars];
    let mut new_vars = Vec::new();
    let mut deleted_vars = Vec::new();
    for (var_index, &variable) in vars.iter().enumerate() {
        if context.variable_with_cost_is_unique_and_removable(variable) {
            context.update_rule_stats("table: removed unused column with cost");
            only_here_and_in_objective[var_index] = true;
            objective_coeffs[var_index] = context.objective_map()[&variable];
            context.remove_variable_from_objective(variable);
            context.mark_variable_as_removed(variable);
            deleted_vars.push(variable);
        } else if context.variable_is_unique_and_removable(variable) {
            // No cost: the same machinery works with a zero coefficient.
            context.update_rule_stats("table: removed unused column");
            only_here_and_in_objective[var_index] = true;
            objective_coeffs[var_index] = 0;
            context.mark_variable_as_removed(variable);
            deleted_vars.push(variable);
        } else {
            new_vars.push(variable);
        }
    }
    if new_vars.len() == num_vars {
        return false;
    }

    // Rewrite each tuple as `kept values..., cost, deleted values...`; the deleted values stay
    // at the end so the postsolve mapping below can still read them.
    let mut min_cost = i64::MAX;
    for tuple in tuples.iter_mut() {
        let mut cost = 0i64;
        let mut kept = Vec::with_capacity(new_vars.len() + 1 + deleted_vars.len());
        let mut deleted_values = Vec::with_capacity(deleted_vars.len());
        for var_index in 0..num_vars {
            let value = tuple[var_index];
            if only_here_and_in_objective[var_index] {
                deleted_values.push(value);
                cost += value * objective_coeffs[var_index];
            } else {
                kept.push(value);
            }
        }
        kept.push(cost);
        kept.extend(deleted_values);
        min_cost = min_cost.min(cost);
        *tuple = kept;
    }

    // Remove tuples that only differ by their cost, keeping the cheapest, and record how to
    // reassign the removed variables at postsolve time.
    {
        let old_size = tuples.len();
        tuples.sort_unstable();
        let mut new_size = 0;
        for i in 0..tuples.len() {
            if new_size > 0 && tuples[i][..new_vars.len()] == tuples[new_size - 1][..new_vars.len()]
            {
                continue;
            }

            // If this tuple is selected, the removed variables take the recorded values.
            for (j, &deleted_var) in deleted_vars.iter().enumerate() {
                let mut reconstruct_enforcement = Vec::with_capacity(new_vars.len());
                for (k, &kept_var) in new_vars.iter().enumerate() {
                    reconstruct_enforcement
                        .push(context.get_or_create_var_value_encoding(kept_var, tuples[i][k]));
                }
                let mut assign = LinearConstraint::new(Domain::constant(
                    tuples[i][new_vars.len() + 1 + j],
                ));
                assign.add_term(deleted_var, 1);
                context.add_mapping_constraint(Constraint::with_enforcement(
                    ConstraintKind::Linear(assign),
                    reconstruct_enforcement,
                ));
            }

            let mut kept_tuple = tuples[i].clone();
            kept_tuple.truncate(new_vars.len() + 1);
            tuples[new_size] = kept_tuple;
            new_size += 1;
        }
        tuples.truncate(new_size);
        if new_size < old_size {
            context.update_rule_stats("table: removed duplicate tuples with different costs");
        }
    }

    if min_cost > 0 {
        context.add_to_objective_offset(min_cost);
        context.update_rule_stats("table: transferred min_cost to objective offset");
        for tuple in tuples.iter_mut() {
            *tuple.last_mut().unwrap() -= min_cost;
        }
    }

    // If fixing a kept column to a value leaves only tuples with a positive cost, that minimum
    // can be charged to the value literal instead of the tuples.
    for (var_index, &variable) in new_vars.iter().enumerate() {
        let mut value_to_min_cost: BTreeMap<i64, i64> = BTreeMap::new();
        for tuple in tuples.iter() {
            let value = tuple[var_index];
            let cost = *tuple.last().unwrap();
            value_to_min_cost
                .entry(value)
                .and_modify(|minimum| *minimum = (*minimum).min(cost))
                .or_insert(cost);
        }
        for tuple in tuples.iter_mut() {
            let value = tuple[var_index];
            *tuple.last_mut().unwrap() -= value_to_min_cost[&value];
        }
        for (value, cost) in value_to_min_cost {
            if cost == 0 {
                continue;
            }
            context.update_rule_stats("table: transferred cost to encoding");
            let literal = context.get_or_create_var_value_encoding(variable, value);
            context.add_literal_to_objective(literal, cost);
        }
    }

    context.update_rule_stats(format!(
        "table: expansion with column(s) only in objective. Arity = {}",
        new_vars.len()
    ));

    *vars = new_vars;
    true
}

/// Compresses the tuples and expands the result: one selection literal per compressed row, an
/// exactly-one across them, and per column the support clauses tying rows to value literals.
fn compress_and_expand_positive_table(
    last_column_is_cost: bool,
    vars: &[VariableId],
    mut tuples: Vec<Vec<i64>>,
    context: &mut PresolveContext,
) {
    let num_tuples_before_compression = tuples.len();

    // If the last column is the tuple cost, it takes part in the compression like a variable
    // whose domain never gets covered.
    let mut domain_sizes: Vec<u64> = vars
        .iter()
        .map(|&variable| context.domain_of(variable).size())
        .collect();
    if last_column_is_cost {
        domain_sizes.push(u64::MAX);
    }

    let compression_level = context.options().table_compression_level;
    if compression_level > 0 {
        compress_tuples(&domain_sizes, &mut tuples);
    }
    let num_tuples_after_first_compression = tuples.len();

    // For big tables, compressing as much as possible reduces the number of created Booleans;
    // for small ones the more verbose encoding gives a better linear relaxation.
    let mut compressed_table: Vec<Vec<Vec<i64>>>;
    if compression_level > 2
        || (compression_level == 2 && num_tuples_after_first_compression > 1000)
    {
        compressed_table = fully_compress_tuples(&domain_sizes, &tuples);
        if compressed_table.len() < num_tuples_before_compression {
            context.update_rule_stats("table: fully compress tuples");
        }
    } else {
        compressed_table = tuples
            .iter()
            .map(|tuple| {
                tuple
                    .iter()
                    .map(|&value| {
                        if value == ANY_VALUE {
                            vec![]
                        } else {
                            vec![value]
                        }
                    })
                    .collect()
            })
            .collect();
        if compressed_table.len() < num_tuples_before_compression {
            context.update_rule_stats("table: compress tuples");
        }
    }

    trace!(
        "Table compression: vars={} cost={} tuples {} -> {} -> {}",
        vars.len(),
        domain_sizes.len() - vars.len(),
        num_tuples_before_compression,
        num_tuples_after_first_compression,
        compressed_table.len()
    );

    compressed_table.sort_unstable();

    let num_vars = vars.len();
    if compressed_table.len() == 1 {
        // The domain reductions above already propagated the single tuple.
        context.update_rule_stats("table: one tuple");
        if last_column_is_cost {
            context.add_to_objective_offset(compressed_table[0].last().unwrap()[0]);
        }
        return;
    }

    // If a value appears alone in a cell and nowhere else in its column, the value literal can
    // serve as the row's selection literal.
    let mut has_any = vec![false; num_vars];
    let mut value_counts: Vec<HashMap<i64, usize>> = vec![HashMap::default(); num_vars];
    for row in &compressed_table {
        for var_index in 0..num_vars {
            if row[var_index].is_empty() {
                has_any[var_index] = true;
                continue;
            }
            for &value in &row[var_index] {
                butternut_assert_moderate!(value != ANY_VALUE);
                butternut_assert_moderate!(context.domain_contains(vars[var_index], value));
                *value_counts[var_index].entry(value).or_insert(0) += 1;
            }
        }
    }

    let mut num_reused_literals = 0;
    let mut tuple_literals = Vec::with_capacity(compressed_table.len());
    for row in &compressed_table {
        let mut reused = None;
        for var_index in 0..num_vars {
            if has_any[var_index] || row[var_index].len() != 1 {
                continue;
            }
            let value = row[var_index][0];
            if value_counts[var_index][&value] != 1 {
                continue;
            }
            num_reused_literals += 1;
            reused = Some(context.get_or_create_var_value_encoding(vars[var_index], value));
            break;
        }
        tuple_literals.push(reused.unwrap_or_else(|| context.new_bool_var()));
    }
    let _ = context.model_mut().add_constraint(Constraint::new(
        ConstraintKind::ExactlyOne(tuple_literals.clone()),
    ));
    if num_reused_literals > 0 {
        context.update_rule_stats("table: reused literals");
    }

    // Charge each row's cost to its selection literal. When rows merged during compression the
    // cheapest cost was kept.
    if last_column_is_cost {
        for (i, row) in compressed_table.iter().enumerate() {
            context.add_literal_to_objective(tuple_literals[i], row.last().unwrap()[0]);
        }
    }

    for var_index in 0..num_vars {
        if context.domain_of(vars[var_index]).is_fixed() {
            continue;
        }
        let column: Vec<Vec<i64>> = compressed_table
            .iter()
            .map(|row| row[var_index].clone())
            .collect();
        process_one_compressed_column(vars[var_index], &tuple_literals, &column, context);
    }

    context.update_rule_stats("table: expanded positive constraint");
}

/// Links one column to the row selection literals.
///
/// Every row with a concrete value list implies that the column takes one of those values, and
/// every value whose supporting rows (plus the any-value rows) are all false is itself false.
fn process_one_compressed_column(
    variable: VariableId,
    tuple_literals: &[Literal],
    values: &[Vec<i64>],
    context: &mut PresolveContext,
) {
    butternut_assert_simple!(tuple_literals.len() == values.len());

    let mut value_literal_pairs = Vec::new();
    let mut any_value_literals = Vec::new();
    for (i, cell) in values.iter().enumerate() {
        if cell.is_empty() {
            any_value_literals.push(tuple_literals[i]);
            continue;
        }
        let mut clause = Vec::with_capacity(cell.len());
        for &value in cell {
            butternut_assert_moderate!(context.domain_contains(variable, value));
            clause.push(context.get_or_create_var_value_encoding(variable, value));
            value_literal_pairs.push((value, tuple_literals[i]));
        }
        let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
            ConstraintKind::BoolOr(clause),
            vec![tuple_literals[i]],
        ));
    }

    // Regroup the literals by value: if all rows supporting a value are false, the value is
    // impossible.
    value_literal_pairs.sort_unstable();
    for (value, pairs) in &value_literal_pairs.iter().chunk_by(|(value, _)| *value) {
        let mut no_support: Vec<Literal> = pairs.map(|&(_, literal)| literal).collect();
        no_support.extend_from_slice(&any_value_literals);
        let value_literal = context.get_or_create_var_value_encoding(variable, value);
        no_support.push(!value_literal);
        let _ = context
            .model_mut()
            .add_constraint(Constraint::new(ConstraintKind::BoolOr(no_support)));
    }
}

#[cfg(test)]
mod tests {
    use crate::checking::enumerate_solutions;
    use crate::checking::evaluate_objective;
    use crate::checking::literal_is_true;
    use crate::expansion::expand_model;
    use crate::model::Constraint;
    use crate::model::ConstraintKind;
    use crate::model::Domain;
    use crate::model::LinearConstraint;
    use crate::model::Model;
    use crate::model::TableConstraint;
    use crate::presolve::ExpansionOptions;
    use crate::presolve::PresolveContext;

    #[test]
    fn positive_table_keeps_exactly_the_listed_tuples() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 2));
        let y = model.new_variable(Domain::new(0, 2));
        let z = model.new_variable(Domain::new(0, 2));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Table(
            TableConstraint {
                variables: vec![x, y, z],
                tuples: vec![vec![0, 1, 2], vec![0, 2, 1], vec![1, 1, 1], vec![2, 0, 0]],
                negated: false,
            },
        )));

        let expected = enumerate_solutions(&model, &[x, y, z]);
        assert_eq!(expected.len(), 4);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the table has tuples");
        assert!(context.model().constraints[0].is_empty());

        let actual = enumerate_solutions(context.model(), &[x, y, z]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn size_two_table_avoids_selection_literals() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 2));
        let y = model.new_variable(Domain::new(0, 2));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Table(
            TableConstraint {
                variables: vec![x, y],
                tuples: vec![vec![0, 0], vec![0, 1], vec![1, 1], vec![2, 2]],
                negated: false,
            },
        )));

        let expected = enumerate_solutions(&model, &[x, y]);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the table has tuples");
        assert!(context.model().constraints[0].is_empty());

        // No exactly-one over fresh selection literals is emitted in the two-variable case.
        assert!(!context
            .model()
            .constraints
            .iter()
            .any(|constraint| matches!(constraint.kind, ConstraintKind::ExactlyOne(_))));

        let actual = enumerate_solutions(context.model(), &[x, y]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn negative_table_forbids_exactly_the_listed_tuples() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 1));
        let y = model.new_variable(Domain::new(0, 2));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Table(
            TableConstraint {
                variables: vec![x, y],
                tuples: vec![vec![0, 0], vec![1, 2], vec![1, 7]],
                negated: true,
            },
        )));

        let expected = enumerate_solutions(&model, &[x, y]);
        // Only the two in-domain tuples are forbidden.
        assert_eq!(expected.len(), 4);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the negated table is satisfiable");
        assert!(context.model().constraints[0].is_empty());

        let actual = enumerate_solutions(context.model(), &[x, y]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn empty_positive_table_is_infeasible() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 1));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Table(
            TableConstraint {
                variables: vec![x],
                tuples: vec![vec![7]],
                negated: false,
            },
        )));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        assert!(expand_model(&mut context).is_err());
        assert!(context.model_is_unsat());
    }

    #[test]
    fn cost_column_is_transferred_to_the_objective_and_the_mapping_model() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::boolean());
        let y = model.new_variable(Domain::boolean());
        let cost = model.new_variable(Domain::from_values([2, 3, 5]));
        model.objective_mut().set_term(cost, 1);

        // Keep x and y used elsewhere so that only the cost column is removable.
        let mut use_x = LinearConstraint::new(Domain::new(-100, 100));
        use_x.add_term(x, 1);
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Linear(use_x)));
        let mut use_y = LinearConstraint::new(Domain::new(-100, 100));
        use_y.add_term(y, 1);
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Linear(use_y)));

        let tuples = vec![vec![0, 0, 5], vec![0, 1, 3], vec![1, 0, 2], vec![1, 1, 2]];
        let table_index = model.add_constraint(Constraint::new(ConstraintKind::Table(
            TableConstraint {
                variables: vec![x, y, cost],
                tuples: tuples.clone(),
                negated: false,
            },
        )));

        let options = ExpansionOptions {
            detect_table_with_cost: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(model, options);
        expand_model(&mut context).expect("the table has tuples");
        assert!(context.model().constraints[table_index].is_empty());
        assert!(context.variable_is_removed(cost));
        assert!(!context.objective_map().contains_key(&cost));
        assert!(!context.mapping_model().is_empty());

        // Every (x, y) pair is still feasible, and its objective value equals the original
        // tuple cost.
        let expanded = context.model();
        let solutions = enumerate_solutions(expanded, &[x, y]);
        assert_eq!(
            solutions,
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );

        let domains: Vec<Vec<i64>> = expanded
            .variable_ids()
            .map(|variable| expanded.domain(variable).values().collect())
            .collect();
        let mut assignments_seen = 0;
        enumerate_assignments(&domains, &mut |assignment| {
            if !crate::checking::assignment_is_feasible(expanded, assignment) {
                return;
            }
            assignments_seen += 1;

            let original_cost = tuples
                .iter()
                .find(|tuple| tuple[0] == assignment[0] && tuple[1] == assignment[1])
                .expect("every feasible pair is a tuple")[2];
            assert_eq!(evaluate_objective(expanded, assignment), original_cost);

            // Replaying the mapping constraints reconstructs the removed cost variable.
            let mut reconstructed = None;
            for mapping in context.mapping_model() {
                if !mapping
                    .enforcement
                    .iter()
                    .all(|&literal| literal_is_true(literal, assignment))
                {
                    continue;
                }
                let ConstraintKind::Linear(linear) = &mapping.kind else {
                    panic!("mapping constraints fix the removed variable");
                };
                reconstructed = Some(linear.domain.fixed_value());
            }
            assert_eq!(reconstructed, Some(original_cost));
        });
        assert!(assignments_seen > 0);
    }

    /// Walks the Cartesian product of the domains.
    fn enumerate_assignments(domains: &[Vec<i64>], visit: &mut impl FnMut(&[i64])) {
        let mut assignment: Vec<i64> = domains.iter().map(|values| values[0]).collect();
        let mut cursor = vec![0usize; domains.len()];
        'outer: loop {
            visit(&assignment);
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
    }
}
