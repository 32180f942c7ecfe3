use crate::containers::HashSet;
use crate::expansion::ExpansionStatus;
use crate::model::AllDifferentConstraint;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::LinearConstraint;
use crate::model::VariableId;
use crate::presolve::PresolveContext;

/// Per-variable classification results, shared across all all-different constraints of one
/// expansion run so that each variable is scanned at most once.
#[derive(Default)]
pub(crate) struct UsageScanCache {
    domain_of_var_is_used: HashSet<VariableId>,
    bounds_of_var_are_used: HashSet<VariableId>,
    processed_variables: HashSet<VariableId>,
}

/// Whether the linear constraint pins a single variable to, or away from, one value. Such
/// constraints are how value encodings appear in the model, so the variable's domain is
/// considered "used".
fn is_var_eq_or_neq_value(context: &PresolveContext, linear: &LinearConstraint) -> bool {
    if linear.vars.len() != 1 {
        return false;
    }
    if linear.domain.is_fixed() {
        return true;
    }
    linear
        .domain
        .inverse_multiplication_by(linear.coeffs[0])
        .complement()
        .intersection(context.domain_of(linear.vars[0]))
        .is_fixed()
}

/// Scans every constraint referencing the variables of the all-different and classifies each
/// variable:
///
/// * *domain used* - the variable is (or will be) fully encoded: equality/disequality linears,
///   inverse, table, automaton, and element indices;
/// * *bounds used* - only bound propagation matters: `lin_max`, intervals, and fixed-sum
///   linears with at least three terms.
///
/// The first outcome argues for expanding the all-different, the second for keeping it.
fn scan_model_and_decide_all_diff_expansion(
    all_diff: &AllDifferentConstraint,
    context: &PresolveContext,
    cache: &mut UsageScanCache,
) -> (bool, bool) {
    let mut at_least_one_var_domain_is_used = false;
    let mut at_least_one_var_bound_is_used = false;

    for expr in &all_diff.exprs {
        if expr.is_constant() {
            continue;
        }
        let variable = expr.vars[0];
        if context.domain_of(variable).is_fixed() {
            continue;
        }

        if !cache.processed_variables.insert(variable) {
            at_least_one_var_domain_is_used |= cache.domain_of_var_is_used.contains(&variable);
            at_least_one_var_bound_is_used |= cache.bounds_of_var_are_used.contains(&variable);
        } else {
            let mut domain_is_used = false;
            let mut bounds_are_used = false;

            for &constraint_index in context.var_to_constraints(variable) {
                let other = &context.model().constraints[constraint_index];
                match &other.kind {
                    ConstraintKind::LinMax(_) => bounds_are_used = true,
                    ConstraintKind::Linear(linear) => {
                        if is_var_eq_or_neq_value(context, linear) && linear.vars[0] == variable {
                            // An encoding literal in disguise.
                            domain_is_used = true;
                        } else if linear.vars.len() > 2 && linear.domain.is_fixed() {
                            // All-different cuts only pay off on fixed-sum linears.
                            bounds_are_used = true;
                        }
                    }
                    ConstraintKind::Element(element) => {
                        // Elements are expanded by the first pass already; the case is kept for
                        // models built without it.
                        if element.index == variable {
                            domain_is_used = true;
                        }
                    }
                    ConstraintKind::Inverse(_)
                    | ConstraintKind::Table(_)
                    | ConstraintKind::Automaton(_) => domain_is_used = true,
                    ConstraintKind::Interval(_) => bounds_are_used = true,
                    // All-differents themselves are ignored: their expansion is what is being
                    // decided. Boolean and arithmetic constraints tell us nothing here.
                    _ => {}
                }
                if domain_is_used && bounds_are_used {
                    break;
                }
            }

            if domain_is_used {
                let _ = cache.domain_of_var_is_used.insert(variable);
            }
            if bounds_are_used {
                let _ = cache.bounds_of_var_are_used.insert(variable);
            }
            at_least_one_var_domain_is_used |= domain_is_used;
            at_least_one_var_bound_is_used |= bounds_are_used;
        }

        if at_least_one_var_domain_is_used && at_least_one_var_bound_is_used {
            break;
        }
    }

    (at_least_one_var_domain_is_used, at_least_one_var_bound_is_used)
}

/// Whether the union of domains is small enough for the Boolean expansion to pay off.
fn all_diff_should_be_expanded(
    union_of_domains: &Domain,
    all_diff: &AllDifferentConstraint,
    context: &PresolveContext,
) -> bool {
    let num_exprs = all_diff.exprs.len();
    if union_of_domains.size() <= (2 * num_exprs) as u64 || union_of_domains.size() <= 32 {
        return true;
    }

    let num_fully_encoded = all_diff
        .exprs
        .iter()
        .filter(|expr| context.expression_is_fully_encoded(expr))
        .count();
    num_fully_encoded == num_exprs && union_of_domains.size() < 256
}

/// Decides whether to expand an all-different constraint and, if so, emits one at-most-one (or
/// exactly-one, for permutations) per value of the union of domains.
pub(crate) fn maybe_expand_all_different(
    constraint: Constraint,
    context: &mut PresolveContext,
    cache: &mut UsageScanCache,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::AllDifferent(all_diff) = kind else {
        unreachable!()
    };
    let keep = |all_diff: AllDifferentConstraint| {
        ExpansionStatus::Kept(Constraint {
            enforcement: vec![],
            kind: ConstraintKind::AllDifferent(all_diff),
        })
    };
    debug_assert!(
        enforcement.is_empty(),
        "all-different constraints do not carry enforcement literals"
    );

    if all_diff.exprs.len() <= 1 {
        return keep(all_diff);
    }

    let (expand_from_usage, keep_after_expansion) =
        scan_model_and_decide_all_diff_expansion(&all_diff, context, cache);

    let num_exprs = all_diff.exprs.len();
    let mut union_of_domains = Domain::empty();
    for expr in &all_diff.exprs {
        union_of_domains = union_of_domains.union_with(&context.domain_superset_of(expr));
    }

    let expand_from_size = all_diff_should_be_expanded(&union_of_domains, &all_diff, context);

    // Expansion is forced by the parameter, and otherwise requires both a compatible size and a
    // reason: either a variable whose domain is used elsewhere, or no reason to keep the
    // constraint at all.
    let should_expand = context.options().expand_alldiff_constraints
        || (expand_from_size && (expand_from_usage || !keep_after_expansion));
    if !should_expand {
        return keep(all_diff);
    }

    let is_a_permutation = num_exprs as u64 == union_of_domains.size();

    // Collect the expressions that can take each value and state that every value is taken at
    // most once (exactly once for permutations).
    for value in union_of_domains.values() {
        let mut fixed_expression_count = 0;
        let mut possible_exprs = Vec::new();
        for expr in &all_diff.exprs {
            if !context.expression_contains(expr, value) {
                continue;
            }
            possible_exprs.push(expr.clone());
            if context.is_fixed(expr) {
                fixed_expression_count += 1;
            }
        }

        if fixed_expression_count > 1 {
            context.notify_that_model_is_unsat("two expressions fixed to the same value");
            return keep(all_diff);
        } else if fixed_expression_count == 1 {
            // One expression owns the value: remove it from all the others.
            for expr in &possible_exprs {
                if context.is_fixed(expr) {
                    continue;
                }
                if !context
                    .intersect_expression_domain_with(expr, &Domain::constant(value).complement())
                {
                    return keep(all_diff);
                }
            }
        }

        let mut literals = Vec::new();
        for expr in &possible_exprs {
            // The propagation above may have removed the value in the meantime.
            if !context.expression_contains(expr, value) {
                continue;
            }
            literals.push(context.get_or_create_affine_value_encoding(expr, value));
        }
        let cardinality = if is_a_permutation {
            ConstraintKind::ExactlyOne(literals)
        } else {
            ConstraintKind::AtMostOne(literals)
        };
        let _ = context.model_mut().add_constraint(Constraint::new(cardinality));
    }

    context.update_rule_stats(format!(
        "all_diff:{} expanded{}",
        if is_a_permutation { " permutation" } else { "" },
        if keep_after_expansion { " and kept" } else { "" }
    ));
    if keep_after_expansion {
        keep(all_diff)
    } else {
        ExpansionStatus::Expanded
    }
}

#[cfg(test)]
mod tests {
    use crate::checking::enumerate_solutions;
    use crate::expansion::expand_model;
    use crate::model::AllDifferentConstraint;
    use crate::model::Constraint;
    use crate::model::ConstraintKind;
    use crate::model::Domain;
    use crate::model::LinearConstraint;
    use crate::model::LinearExpression;
    use crate::model::Model;
    use crate::presolve::ExpansionOptions;
    use crate::presolve::PresolveContext;

    fn all_different_over(variables: &[crate::model::VariableId]) -> Constraint {
        Constraint::new(ConstraintKind::AllDifferent(AllDifferentConstraint {
            exprs: variables
                .iter()
                .map(|&variable| LinearExpression::variable(variable))
                .collect(),
        }))
    }

    #[test]
    fn permutation_gets_one_exactly_one_per_value() {
        let mut model = Model::new();
        let variables: Vec<_> = (0..4)
            .map(|_| model.new_variable(Domain::new(0, 3)))
            .collect();
        let index = model.add_constraint(all_different_over(&variables));
        assert_eq!(enumerate_solutions(&model, &variables).len(), 24);

        let options = ExpansionOptions {
            expand_alldiff_constraints: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(model, options);
        expand_model(&mut context).expect("a permutation exists");
        assert!(context.model().constraints[index].is_empty());

        let num_exactly_one = context
            .model()
            .constraints
            .iter()
            .filter(|constraint| matches!(constraint.kind, ConstraintKind::ExactlyOne(_)))
            .count();
        assert_eq!(num_exactly_one, 4);
    }

    #[test]
    fn permutation_expansion_preserves_the_solution_set() {
        let mut model = Model::new();
        let variables: Vec<_> = (0..3)
            .map(|_| model.new_variable(Domain::new(0, 2)))
            .collect();
        let index = model.add_constraint(all_different_over(&variables));

        let expected = enumerate_solutions(&model, &variables);
        assert_eq!(expected.len(), 6);

        let options = ExpansionOptions {
            expand_alldiff_constraints: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(model, options);
        expand_model(&mut context).expect("a permutation exists");
        assert!(context.model().constraints[index].is_empty());

        let actual = enumerate_solutions(context.model(), &variables);
        assert_eq!(actual, expected);
    }

    #[test]
    fn wider_domains_get_at_most_ones() {
        let mut model = Model::new();
        let variables: Vec<_> = (0..2)
            .map(|_| model.new_variable(Domain::new(0, 2)))
            .collect();
        let index = model.add_constraint(all_different_over(&variables));

        let expected = enumerate_solutions(&model, &variables);

        let options = ExpansionOptions {
            expand_alldiff_constraints: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(model, options);
        expand_model(&mut context).expect("distinct values exist");
        assert!(context.model().constraints[index].is_empty());

        let num_at_most_one = context
            .model()
            .constraints
            .iter()
            .filter(|constraint| matches!(constraint.kind, ConstraintKind::AtMostOne(_)))
            .count();
        assert_eq!(num_at_most_one, 3);

        let actual = enumerate_solutions(context.model(), &variables);
        assert_eq!(actual, expected);
    }

    #[test]
    fn without_a_usage_reason_large_alldiffs_are_kept() {
        let mut model = Model::new();
        let variables: Vec<_> = (0..2)
            .map(|_| model.new_variable(Domain::new(0, 100)))
            .collect();
        let index = model.add_constraint(all_different_over(&variables));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("distinct values exist");
        assert!(matches!(
            context.model().constraints[index].kind,
            ConstraintKind::AllDifferent(_)
        ));
    }

    #[test]
    fn domain_and_bounds_usage_expands_and_keeps_the_constraint() {
        let mut model = Model::new();
        let variables: Vec<_> = (0..3)
            .map(|_| model.new_variable(Domain::new(0, 2)))
            .collect();
        let all_diff_index = model.add_constraint(all_different_over(&variables));

        // A disequality on the first variable marks its domain as used...
        let mut not_one = LinearConstraint::new(Domain::constant(1).complement());
        not_one.add_term(variables[0], 1);
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Linear(not_one)));
        // ... while a fixed-sum linear over three variables argues for keeping the constraint.
        let mut fixed_sum = LinearConstraint::new(Domain::constant(3));
        for &variable in &variables {
            fixed_sum.add_term(variable, 1);
        }
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Linear(fixed_sum)));

        let expected = enumerate_solutions(&model, &variables);
        assert_eq!(expected.len(), 4);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("distinct values exist");

        // Both outcomes at once: the exactly-ones are emitted and the constraint survives.
        assert!(matches!(
            context.model().constraints[all_diff_index].kind,
            ConstraintKind::AllDifferent(_)
        ));
        let num_exactly_one = context
            .model()
            .constraints
            .iter()
            .filter(|constraint| matches!(constraint.kind, ConstraintKind::ExactlyOne(_)))
            .count();
        assert_eq!(num_exactly_one, 3);
        assert!(context
            .rule_stats()
            .contains_key("all_diff: permutation expanded and kept"));

        let actual = enumerate_solutions(context.model(), &variables);
        assert_eq!(actual, expected);
    }

    #[test]
    fn two_expressions_fixed_to_the_same_value_are_infeasible() {
        let mut model = Model::new();
        let first = model.new_variable(Domain::constant(1));
        let second = model.new_variable(Domain::constant(1));
        let _ = model.add_constraint(all_different_over(&[first, second]));

        let options = ExpansionOptions {
            expand_alldiff_constraints: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(model, options);
        assert!(expand_model(&mut context).is_err());
        assert!(context.model_is_unsat());
    }
}
