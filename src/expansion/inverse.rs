use crate::butternut_asserts::butternut_assert_eq_simple;
use crate::butternut_asserts::butternut_assert_simple;
use crate::containers::HashSet;
use crate::expansion::ExpansionStatus;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::InverseConstraint;
use crate::model::VariableId;
use crate::presolve::PresolveContext;

/// Prunes `direct[i]` to the values `j` for which `i in dom(inverse[j])`.
///
/// Returns false when a domain became empty. One pass reaches the fixed point as long as no
/// variable appears on both sides.
fn filter_inverse_domain(
    direct: &[VariableId],
    inverse: &[VariableId],
    context: &mut PresolveContext,
) -> bool {
    for (i, &direct_variable) in direct.iter().enumerate() {
        let domain = context.domain_of(direct_variable).clone();
        let possible_values: Vec<i64> = domain
            .values()
            .filter(|&j| context.domain_contains(inverse[j as usize], i as i64))
            .collect();

        if (possible_values.len() as u64) < domain.size()
            && !context.intersect_domain_with(
                direct_variable,
                &Domain::from_values(possible_values),
            )
        {
            return false;
        }
    }
    true
}

/// Expands `inverse[direct[i]] == i`.
///
/// Domains are clamped to `[0, n - 1]` and filtered until each side supports the other, and
/// then every pair `(i, j)` with `j in dom(direct[i])` shares a single encoding literal between
/// `direct[i] == j` and `inverse[j] == i`. The sharing alone is what encodes the constraint; no
/// clause is emitted.
pub(crate) fn expand_inverse(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::Inverse(inverse) = kind else {
        unreachable!()
    };
    butternut_assert_simple!(
        enforcement.is_empty(),
        "inverse constraints do not carry enforcement literals"
    );

    let n = inverse.f_direct.len();
    butternut_assert_eq_simple!(n, inverse.f_inverse.len());
    let keep = |inverse: InverseConstraint| {
        ExpansionStatus::Kept(Constraint::new(ConstraintKind::Inverse(inverse)))
    };

    let mut used_variables: HashSet<VariableId> = HashSet::default();
    for &variable in inverse.f_direct.iter().chain(&inverse.f_inverse) {
        let _ = used_variables.insert(variable);
        if !context.intersect_domain_with(variable, &Domain::new(0, n as i64 - 1)) {
            return keep(inverse);
        }
    }

    // With aliased variables the support filtering below might miss incompatibilities, so the
    // implied fixed-point reductions are applied eagerly: if direct[i] is the same variable as
    // inverse[j] with i != j, it can take neither the value i nor the value j.
    if used_variables.len() != 2 * n {
        for i in 0..n {
            for j in 0..n {
                if i == j || inverse.f_direct[i] != inverse.f_inverse[j] {
                    continue;
                }
                let forbidden = Domain::from_values([i as i64, j as i64]).complement();
                if !context.intersect_domain_with(inverse.f_direct[i], &forbidden) {
                    return keep(inverse);
                }
            }
        }
    }

    if !filter_inverse_domain(&inverse.f_direct, &inverse.f_inverse, context) {
        return keep(inverse);
    }
    if !filter_inverse_domain(&inverse.f_inverse, &inverse.f_direct, context) {
        return keep(inverse);
    }

    // Bind the encodings of `direct[i] == j` and `inverse[j] == i` to a single literal. This is
    // only correct because the domains are now tight.
    for i in 0..n {
        let direct_variable = inverse.f_direct[i];
        for j in context.domain_of(direct_variable).clone().values() {
            let inverse_variable = inverse.f_inverse[j as usize];
            if let Some(literal) = context.has_var_value_encoding(inverse_variable, i as i64) {
                context.insert_var_value_encoding(literal, direct_variable, j);
            } else {
                let literal = context.get_or_create_var_value_encoding(direct_variable, j);
                context.insert_var_value_encoding(literal, inverse_variable, i as i64);
            }
        }
    }

    context.update_rule_stats("inverse: expanded");
    ExpansionStatus::Expanded
}

#[cfg(test)]
mod tests {
    use crate::checking::enumerate_solutions;
    use crate::expansion::expand_model;
    use crate::model::Constraint;
    use crate::model::ConstraintKind;
    use crate::model::Domain;
    use crate::model::InverseConstraint;
    use crate::model::Model;
    use crate::presolve::ExpansionOptions;
    use crate::presolve::PresolveContext;

    #[test]
    fn permutations_of_size_three_are_preserved() {
        let mut model = Model::new();
        let direct: Vec<_> = (0..3)
            .map(|_| model.new_variable(Domain::new(0, 2)))
            .collect();
        let inverse: Vec<_> = (0..3)
            .map(|_| model.new_variable(Domain::new(0, 2)))
            .collect();
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Inverse(
            InverseConstraint {
                f_direct: direct.clone(),
                f_inverse: inverse.clone(),
            },
        )));

        let projection: Vec<_> = direct.iter().chain(&inverse).copied().collect();
        let expected = enumerate_solutions(&model, &projection);
        // Every permutation appears once, paired with its inverse.
        assert_eq!(expected.len(), 6);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the inverse constraint is satisfiable");
        assert!(context.model().constraints[0].is_empty());

        let actual = enumerate_solutions(context.model(), &projection);
        assert_eq!(actual, expected);
    }

    #[test]
    fn unsupported_values_are_pruned_before_encoding() {
        let mut model = Model::new();
        let direct = vec![
            model.new_variable(Domain::new(0, 1)),
            model.new_variable(Domain::new(0, 2)),
            model.new_variable(Domain::new(0, 2)),
        ];
        let inverse = vec![
            model.new_variable(Domain::constant(1)),
            model.new_variable(Domain::new(0, 2)),
            model.new_variable(Domain::new(0, 2)),
        ];
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Inverse(
            InverseConstraint {
                f_direct: direct.clone(),
                f_inverse: inverse.clone(),
            },
        )));

        let projection: Vec<_> = direct.iter().chain(&inverse).copied().collect();
        let expected = enumerate_solutions(&model, &projection);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("the inverse constraint is satisfiable");

        // direct[0] cannot take the value 0 since inverse[0] cannot take the value 0.
        assert_eq!(context.model().domain(direct[0]), &Domain::constant(1));

        let actual = enumerate_solutions(context.model(), &projection);
        assert_eq!(actual, expected);
        // inverse[0] is fixed to 1, so every surviving solution assigns 0 to direct[1].
        assert!(actual.iter().all(|solution| solution[1] == 0));
    }

    #[test]
    fn domains_out_of_range_make_the_model_infeasible() {
        let mut model = Model::new();
        let direct = vec![model.new_variable(Domain::new(5, 9))];
        let inverse = vec![model.new_variable(Domain::new(0, 0))];
        let _ = model.add_constraint(Constraint::new(ConstraintKind::Inverse(
            InverseConstraint {
                f_direct: direct,
                f_inverse: inverse,
            },
        )));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        assert!(expand_model(&mut context).is_err());
        assert!(context.model_is_unsat());
    }
}
