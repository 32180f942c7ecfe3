use crate::butternut_asserts::butternut_assert_moderate;
use crate::expansion::ExpansionStatus;
use crate::math::diophantine::solve_linear_diophantine;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::LinearConstraint;
use crate::model::Literal;
use crate::presolve::PresolveContext;

/// Expands a linear constraint whose right-hand side consists of several intervals.
///
/// With `encode_complex_linear_constraint_with_integer` a slack variable whose domain is the
/// right-hand side is appended and the right-hand side becomes `{0}`. Otherwise one selection
/// Boolean per interval is created, at least one of which must hold unless the constraint is
/// disabled, and the constraint is copied once per interval under its selection literal.
pub(crate) fn expand_complex_linear_constraint(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::Linear(mut linear) = kind else {
        unreachable!()
    };

    // Single-variable linears must stay as they are: the rest of the presolve recognises value
    // encodings through them.
    if linear.domain.num_intervals() <= 1 || linear.vars.len() == 1 {
        return ExpansionStatus::Kept(Constraint {
            enforcement,
            kind: ConstraintKind::Linear(linear),
        });
    }

    if context.options().encode_complex_linear_constraint_with_integer {
        let slack = context.new_int_var(linear.domain.clone());
        linear.add_term(slack, -1);
        linear.domain = Domain::constant(0);
        context.update_rule_stats("linear: expanded complex rhs");
        return ExpansionStatus::Kept(Constraint {
            enforcement,
            kind: ConstraintKind::Linear(linear),
        });
    }

    let intervals: Vec<(i64, i64)> = linear.domain.intervals().collect();

    // The special case of no enforcement and two intervals needs a single Boolean; otherwise a
    // clause ensures some interval is selected whenever the constraint is enforced.
    let single_bool = if enforcement.is_empty() && intervals.len() == 2 {
        Some(context.new_bool_var())
    } else {
        None
    };
    let mut selection_clause: Vec<Literal> = enforcement.iter().map(|&literal| !literal).collect();

    let mut domain_literals = Vec::new();
    for (k, &(lb, ub)) in intervals.iter().enumerate() {
        let subdomain_literal = match single_bool {
            Some(literal) => {
                if k == 0 {
                    domain_literals.push(literal);
                    literal
                } else {
                    !literal
                }
            }
            None => {
                let literal = context.new_bool_var();
                selection_clause.push(literal);
                domain_literals.push(literal);
                literal
            }
        };

        let copy = LinearConstraint {
            vars: linear.vars.clone(),
            coeffs: linear.coeffs.clone(),
            domain: Domain::new(lb, ub),
        };
        let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
            ConstraintKind::Linear(copy),
            vec![subdomain_literal],
        ));
    }

    if single_bool.is_none() {
        let _ = context
            .model_mut()
            .add_constraint(Constraint::new(ConstraintKind::BoolOr(selection_clause)));
    }

    // When enumerating all solutions the selection Booleans must be functionally determined: an
    // unenforced constraint fixes them all to false.
    if context.options().enumerate_all_solutions && !enforcement.is_empty() {
        let linear_is_enforced = if enforcement.len() == 1 {
            enforcement[0]
        } else {
            let linear_is_enforced = context.new_bool_var();
            let mut maintain = Vec::with_capacity(enforcement.len() + 1);
            for &enforcement_literal in &enforcement {
                context.add_implication(!enforcement_literal, !linear_is_enforced);
                maintain.push(!enforcement_literal);
            }
            maintain.push(linear_is_enforced);
            let _ = context
                .model_mut()
                .add_constraint(Constraint::new(ConstraintKind::BoolOr(maintain)));
            linear_is_enforced
        };

        for &domain_literal in &domain_literals {
            context.add_implication(!linear_is_enforced, !domain_literal);
        }
    }

    context.update_rule_stats("linear: expanded complex rhs");
    ExpansionStatus::Expanded
}

/// Replaces `enforcement => a*x + b*y != cte` by clauses over existing value encodings.
///
/// This only applies when the infeasible right-hand side reduces to a single value, the set of
/// forbidden pairs (parameterised by one integer through the diophantine solution) is small,
/// and every involved value literal already exists.
pub(crate) fn expand_some_linear_of_size_two(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::Linear(linear) = kind else {
        unreachable!()
    };
    let keep = |enforcement: Vec<Literal>, linear: LinearConstraint| {
        ExpansionStatus::Kept(Constraint {
            enforcement,
            kind: ConstraintKind::Linear(linear),
        })
    };

    if linear.vars.len() != 2 {
        return keep(enforcement, linear);
    }
    let var1 = linear.vars[0];
    let var2 = linear.vars[1];
    if context.domain_of(var1).is_fixed() || context.domain_of(var2).is_fixed() {
        return keep(enforcement, linear);
    }

    let coeff1 = linear.coeffs[0];
    let coeff2 = linear.coeffs[1];
    let reachable_rhs_superset = context
        .domain_of(var1)
        .multiplication_by(coeff1)
        .relax_if_too_complex()
        .addition_with(
            &context
                .domain_of(var2)
                .multiplication_by(coeff2)
                .relax_if_too_complex(),
        );
    let infeasible_reachable_values =
        reachable_rhs_superset.intersection(&linear.domain.complement());

    // Only `!= cte` constraints are handled here.
    if infeasible_reachable_values.size() != 1 {
        return keep(enforcement, linear);
    }
    let cte = infeasible_reachable_values.fixed_value();

    let Some(solution) = solve_linear_diophantine(coeff1, coeff2, cte) else {
        context.update_rule_stats("linear: expand always feasible ax + by != cte");
        return ExpansionStatus::Expanded;
    };

    // All forbidden pairs are `(x0 + x_step * z, y0 - y_step * z)`; restrict the parameter to
    // the pairs both domains can realise.
    let parameter_domain = context
        .domain_of(var1)
        .addition_with(&Domain::constant(-solution.x0))
        .inverse_multiplication_by(solution.x_step)
        .intersection(
            &context
                .domain_of(var2)
                .addition_with(&Domain::constant(-solution.y0))
                .inverse_multiplication_by(-solution.y_step),
        );
    if parameter_domain.size() > 16 {
        return keep(enforcement, linear);
    }

    let forbidden_pair = |z: i64| -> Option<(i64, i64)> {
        let value1 = i64::try_from(
            i128::from(solution.x0) + i128::from(solution.x_step) * i128::from(z),
        )
        .ok()?;
        let value2 = i64::try_from(
            i128::from(solution.y0) - i128::from(solution.y_step) * i128::from(z),
        )
        .ok()?;
        Some((value1, value2))
    };

    // Everything must already be encoded; forcing an encoding just for this rewrite does not
    // pay off, and two-value domains are better handled by the main presolve.
    let size1 = context.domain_of(var1).size();
    let size2 = context.domain_of(var2).size();
    for z in parameter_domain.values() {
        let Some((value1, value2)) = forbidden_pair(z) else {
            return keep(enforcement, linear);
        };
        butternut_assert_moderate!(context.domain_contains(var1, value1));
        butternut_assert_moderate!(context.domain_contains(var2, value2));
        butternut_assert_moderate!(coeff1 * value1 + coeff2 * value2 == cte);
        if context.has_var_value_encoding(var1, value1).is_none() || size1 == 2 {
            return keep(enforcement, linear);
        }
        if context.has_var_value_encoding(var2, value2).is_none() || size2 == 2 {
            return keep(enforcement, linear);
        }
    }

    for z in parameter_domain.values() {
        let (value1, value2) = forbidden_pair(z).expect("checked above");
        let literal1 = context.get_or_create_var_value_encoding(var1, value1);
        let literal2 = context.get_or_create_var_value_encoding(var2, value2);
        let mut clause = vec![!literal1, !literal2];
        clause.extend(enforcement.iter().map(|&literal| !literal));
        let _ = context
            .model_mut()
            .add_constraint(Constraint::new(ConstraintKind::BoolOr(clause)));
    }

    context.update_rule_stats("linear: expand small ax + by != cte");
    ExpansionStatus::Expanded
}

#[cfg(test)]
mod tests {
    use crate::checking::enumerate_solutions;
    use crate::expansion::expand_model;
    use crate::expansion::final_expansion_for_linear_constraints;
    use crate::model::Constraint;
    use crate::model::ConstraintKind;
    use crate::model::Domain;
    use crate::model::LinearConstraint;
    use crate::model::Literal;
    use crate::model::Model;
    use crate::presolve::ExpansionOptions;
    use crate::presolve::PresolveContext;

    #[test]
    fn not_equal_over_two_encoded_variables_becomes_two_clauses() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 5));
        let y = model.new_variable(Domain::new(0, 4));
        // 2x + 3y != 12.
        let mut linear = LinearConstraint::new(Domain::constant(12).complement());
        linear.add_term(x, 2);
        linear.add_term(y, 3);
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Linear(linear)));

        let expected = enumerate_solutions(&model, &[x, y]);
        assert_eq!(expected.len(), 6 * 5 - 2);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        // Fully encode both variables so the rewrite applies.
        for value in 0..=5 {
            let _ = context.get_or_create_var_value_encoding(x, value);
        }
        for value in 0..=4 {
            let _ = context.get_or_create_var_value_encoding(y, value);
        }
        let num_constraints_before = context.model().constraints.len();
        context.update_new_constraints_variable_usage();

        expand_model(&mut context).expect("most pairs are allowed");
        assert!(context.model().constraints[0].is_empty());

        // Exactly one clause per solution of 2x + 3y = 12, i.e. (0, 4) and (3, 2).
        let clauses: Vec<_> = context.model().constraints[num_constraints_before..]
            .iter()
            .filter_map(|constraint| match &constraint.kind {
                ConstraintKind::BoolOr(literals) => Some(literals.len()),
                _ => None,
            })
            .collect();
        assert_eq!(clauses, vec![2, 2]);

        let actual = enumerate_solutions(context.model(), &[x, y]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn not_equal_without_encodings_is_kept() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 5));
        let y = model.new_variable(Domain::new(0, 4));
        let mut linear = LinearConstraint::new(Domain::constant(12).complement());
        linear.add_term(x, 2);
        linear.add_term(y, 3);
        let index = model.add_constraint(Constraint::new(ConstraintKind::Linear(linear)));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("most pairs are allowed");
        assert!(matches!(
            context.model().constraints[index].kind,
            ConstraintKind::Linear(_)
        ));
    }

    #[test]
    fn unsolvable_not_equal_is_dropped() {
        let mut model = Model::new();
        // The scaled domain of x has too many holes, so the reachable sum is relaxed to its
        // hull and appears to contain the forbidden value.
        let x = model.new_variable(Domain::new(0, 33));
        let y = model.new_variable(Domain::new(0, 2));
        // 2x + 4y != 7 always holds since the left-hand side is even.
        let mut linear = LinearConstraint::new(Domain::constant(7).complement());
        linear.add_term(x, 2);
        linear.add_term(y, 4);
        let index = model.add_constraint(Constraint::new(ConstraintKind::Linear(linear)));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the constraint is vacuous");
        assert!(context.model().constraints[index].is_empty());
        assert_eq!(
            enumerate_solutions(context.model(), &[x, y]).len(),
            34 * 3
        );
    }

    #[test]
    fn complex_rhs_is_split_into_one_case_per_interval() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 4));
        let y = model.new_variable(Domain::new(0, 4));
        let mut linear = LinearConstraint::new(
            Domain::new(0, 1).union_with(&Domain::new(5, 6)),
        );
        linear.add_term(x, 1);
        linear.add_term(y, 1);
        let index = model.add_constraint(Constraint::new(ConstraintKind::Linear(linear)));

        let expected = enumerate_solutions(&model, &[x, y]);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        // The main pass leaves complex right-hand sides to the final expansion.
        expand_model(&mut context).expect("the linear is satisfiable");
        assert!(matches!(
            context.model().constraints[index].kind,
            ConstraintKind::Linear(_)
        ));

        final_expansion_for_linear_constraints(&mut context).expect("the linear is satisfiable");
        assert!(context.model().constraints[index].is_empty());

        let actual = enumerate_solutions(context.model(), &[x, y]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn complex_rhs_with_integer_encoding_appends_a_slack() {
        let mut model = Model::new();
        let x = model.new_variable(Domain::new(0, 4));
        let y = model.new_variable(Domain::new(0, 4));
        let rhs = Domain::new(0, 1).union_with(&Domain::new(5, 6));
        let mut linear = LinearConstraint::new(rhs.clone());
        linear.add_term(x, 1);
        linear.add_term(y, 1);
        let index = model.add_constraint(Constraint::new(ConstraintKind::Linear(linear)));

        let expected = enumerate_solutions(&model, &[x, y]);

        let options = ExpansionOptions {
            encode_complex_linear_constraint_with_integer: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(model, options);
        final_expansion_for_linear_constraints(&mut context).expect("the linear is satisfiable");

        let ConstraintKind::Linear(rewritten) = &context.model().constraints[index].kind else {
            panic!("the constraint is kept in place");
        };
        assert_eq!(rewritten.domain, Domain::constant(0));
        let slack = *rewritten.vars.last().unwrap();
        assert_eq!(context.model().domain(slack), &rhs);

        let actual = enumerate_solutions(context.model(), &[x, y]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn enumeration_fixes_the_selection_booleans_of_disabled_constraints() {
        let mut model = Model::new();
        let enforce = model.new_variable(Domain::boolean());
        let x = model.new_variable(Domain::new(0, 3));
        let y = model.new_variable(Domain::new(0, 3));
        let mut linear = LinearConstraint::new(
            Domain::new(0, 1).union_with(&Domain::new(5, 6)),
        );
        linear.add_term(x, 1);
        linear.add_term(y, 1);
        let _ = model.add_constraint(Constraint::with_enforcement(
            ConstraintKind::Linear(linear),
            vec![Literal::new(enforce, true)],
        ));

        let expected = enumerate_solutions(&model, &[enforce, x, y]);

        let options = ExpansionOptions {
            enumerate_all_solutions: true,
            ..ExpansionOptions::default()
        };
        let mut context = PresolveContext::new(model, options);
        final_expansion_for_linear_constraints(&mut context).expect("the linear is satisfiable");

        let actual = enumerate_solutions(context.model(), &[enforce, x, y]);
        assert_eq!(actual, expected);

        // The selection Booleans are functionally determined by the original variables: the
        // expanded model has exactly one full assignment per original solution.
        let all_variables: Vec<_> = context.model().variable_ids().collect();
        let full_solutions = enumerate_solutions(context.model(), &all_variables);
        assert_eq!(full_solutions.len(), expected.len());
    }
}
