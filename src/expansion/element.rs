use std::collections::BTreeMap;

use crate::butternut_asserts::butternut_assert_simple;
use crate::expansion::ExpansionStatus;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::ElementConstraint;
use crate::model::LinearConstraint;
use crate::model::Literal;
use crate::presolve::PresolveContext;

/// `variables[index] == index` means that for every possible index value `v`, `index == v`
/// implies `variables[v] == v`.
fn expand_element_with_target_equal_index(
    element: ElementConstraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    butternut_assert_simple!(element.index == element.target);

    let index_domain = context.domain_of(element.index).clone();
    let valid_indices: Vec<i64> = index_domain
        .values()
        .filter(|&v| context.domain_contains(element.variables[v as usize], v))
        .collect();
    if (valid_indices.len() as u64) < index_domain.size() {
        if !context.intersect_domain_with(
            element.index,
            &Domain::from_values(valid_indices.iter().copied()),
        ) {
            return ExpansionStatus::Kept(Constraint::new(ConstraintKind::Element(element)));
        }
        context.update_rule_stats("element: reduced index domain");
    }

    for v in context.domain_of(element.index).clone().values() {
        let variable = element.variables[v as usize];
        if context.min_of(variable) == v && context.max_of(variable) == v {
            continue;
        }
        let index_literal = context.get_or_create_var_value_encoding(element.index, v);
        context.add_imply_in_domain(index_literal, variable, &Domain::constant(v));
    }

    context.update_rule_stats("element: expanded with special case target = index");
    ExpansionStatus::Expanded
}

/// Special case where the array is filled with constants.
///
/// An index literal exists per surviving index value; values of the array that are pointed to
/// by a single index reuse that index literal as the target encoding, while values with several
/// supporting indices get an implication per index and one support clause.
fn expand_constant_array_element(
    element: ElementConstraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let index_domain = context.domain_of(element.index).clone();

    // Count how many indices map to each array value; values with more than one supporting
    // index need a support clause.
    let mut value_usage: BTreeMap<i64, usize> = BTreeMap::new();
    for v in index_domain.values() {
        let value = context.min_of(element.variables[v as usize]);
        *value_usage.entry(value).or_insert(0) += 1;
    }

    let mut exactly_one = Vec::new();
    let mut supports: BTreeMap<i64, Vec<Literal>> = BTreeMap::new();
    for v in index_domain.values() {
        let variable = element.variables[v as usize];
        butternut_assert_simple!(context.domain_of(variable).is_fixed());
        let value = context.min_of(variable);

        let index_literal = context.get_or_create_var_value_encoding(element.index, v);
        exactly_one.push(index_literal);

        if value_usage[&value] > 1 {
            let target_literal = context.get_or_create_var_value_encoding(element.target, value);
            context.add_implication(index_literal, target_literal);
            supports.entry(value).or_default().push(index_literal);
        } else {
            // A unique support: the index literal doubles as the target encoding.
            context.insert_var_value_encoding(index_literal, element.target, value);
        }
    }

    // While not strictly needed since every index value is covered, an explicit exactly-one
    // makes the structure visible to the rest of the presolve.
    let _ = context
        .model_mut()
        .add_constraint(Constraint::new(ConstraintKind::ExactlyOne(exactly_one)));

    // If all index literals pointing to a value are false, that value is impossible for the
    // target.
    for (value, mut support) in supports {
        let target_literal = context.get_or_create_var_value_encoding(element.target, value);
        let mut clause = vec![!target_literal];
        clause.append(&mut support);
        let _ = context
            .model_mut()
            .add_constraint(Constraint::new(ConstraintKind::BoolOr(clause)));
    }

    context.update_rule_stats("element: expanded value element");
    ExpansionStatus::Expanded
}

/// The general case with non-fixed variables in the array.
fn expand_variable_element(
    element: ElementConstraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let index_domain = context.domain_of(element.index).clone();

    let mut exactly_one = Vec::new();
    for v in index_domain.values() {
        let variable = element.variables[v as usize];
        let variable_domain = context.domain_of(variable).clone();
        let index_literal = context.get_or_create_var_value_encoding(element.index, v);
        exactly_one.push(index_literal);

        if variable_domain.is_fixed() {
            context.add_imply_in_domain(index_literal, element.target, &variable_domain);
        } else {
            let mut equal = LinearConstraint::new(Domain::constant(0));
            equal.add_term(variable, 1);
            equal.add_term(element.target, -1);
            let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
                ConstraintKind::Linear(equal),
                vec![index_literal],
            ));
        }
    }
    let _ = context
        .model_mut()
        .add_constraint(Constraint::new(ConstraintKind::ExactlyOne(exactly_one)));

    context.update_rule_stats("element: expanded");
    ExpansionStatus::Expanded
}

/// Expands `variables[index] == target`.
///
/// The index is first clamped to the array bounds, then the index and target domains are
/// reduced against each other, and finally one of three encodings is selected: the aliased
/// `index == target` case, the constant-array case, and the general case.
pub(crate) fn expand_element(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::Element(element) = kind else {
        unreachable!()
    };
    butternut_assert_simple!(
        enforcement.is_empty(),
        "element constraints do not carry enforcement literals"
    );

    // The element constraint is zero-based.
    if !context.intersect_domain_with(
        element.index,
        &Domain::new(0, element.variables.len() as i64 - 1),
    ) {
        return ExpansionStatus::Kept(Constraint::new(ConstraintKind::Element(element)));
    }

    if element.index == element.target {
        return expand_element_with_target_equal_index(element, context);
    }

    // Reduce the domains of the index and the target.
    let index_domain = context.domain_of(element.index).clone();
    let target_domain = context.domain_of(element.target).clone();
    let mut all_constants = true;
    let mut valid_indices = Vec::new();
    let mut reached_domain = Domain::empty();
    for v in index_domain.values() {
        let variable_domain = context.domain_of(element.variables[v as usize]);
        if variable_domain.intersection(&target_domain).is_empty() {
            continue;
        }
        valid_indices.push(v);
        reached_domain = reached_domain.union_with(variable_domain);
        if !variable_domain.is_fixed() {
            all_constants = false;
        }
    }

    if (valid_indices.len() as u64) < index_domain.size() {
        if !context.intersect_domain_with(
            element.index,
            &Domain::from_values(valid_indices.iter().copied()),
        ) {
            return ExpansionStatus::Kept(Constraint::new(ConstraintKind::Element(element)));
        }
        context.update_rule_stats("element: reduced index domain");
    }

    let mut target_domain_changed = false;
    if !context.intersect_domain_with_tracked(
        element.target,
        &reached_domain,
        &mut target_domain_changed,
    ) {
        return ExpansionStatus::Kept(Constraint::new(ConstraintKind::Element(element)));
    }
    if target_domain_changed {
        context.update_rule_stats("element: reduced target domain");
    }

    if all_constants {
        expand_constant_array_element(element, context)
    } else {
        expand_variable_element(element, context)
    }
}
