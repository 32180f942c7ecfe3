use crate::expansion::ExpansionStatus;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::LinearArgument;
use crate::model::LinearConstraint;
use crate::model::LinearExpression;
use crate::model::Domain;
use crate::model::Literal;
use crate::presolve::PresolveContext;

/// Expands `target == numerator % modulo` with a non-fixed modulo into a division, a product,
/// and a linear equation:
///
/// ```text
/// quotient == numerator / modulo
/// product  == quotient * modulo
/// numerator - product - target == 0
/// ```
///
/// All three constraints inherit the enforcement literals of the original. A fixed modulo is
/// left alone; later stages have a dedicated rewrite for it.
pub(crate) fn expand_int_mod(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::IntMod(int_mod) = kind else {
        unreachable!()
    };

    let modulo_expr = &int_mod.exprs[1];
    if context.is_fixed(modulo_expr) {
        return ExpansionStatus::Kept(Constraint {
            enforcement,
            kind: ConstraintKind::IntMod(int_mod),
        });
    }

    let numerator_expr = &int_mod.exprs[0];
    let target_expr = &int_mod.target;

    let numerator_superset = context.domain_superset_of(numerator_expr);
    let modulo_superset = context.domain_superset_of(modulo_expr);

    // Tightening the target to the modulo image avoids overflow further down the line.
    if !context.intersect_expression_domain_with(
        target_expr,
        &numerator_superset.positive_modulo_image_superset(&modulo_superset),
    ) {
        return ExpansionStatus::Kept(Constraint {
            enforcement,
            kind: ConstraintKind::IntMod(int_mod),
        });
    }

    // quotient == numerator / modulo.
    let quotient = context.new_int_var(
        numerator_superset.positive_division_image_superset(&modulo_superset),
    );
    let quotient_expr = LinearExpression::variable(quotient);
    let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
        ConstraintKind::IntDiv(LinearArgument {
            target: quotient_expr.clone(),
            exprs: vec![numerator_expr.clone(), modulo_expr.clone()],
        }),
        enforcement.clone(),
    ));

    // product == quotient * modulo.
    let product_domain = context
        .domain_of(quotient)
        .continuous_multiplication_by(&modulo_superset)
        .intersection(
            &numerator_superset.addition_with(&context.domain_superset_of(target_expr).negation()),
        );
    let product = context.new_int_var(product_domain);
    let product_expr = LinearExpression::variable(product);
    let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
        ConstraintKind::IntProd(LinearArgument {
            target: product_expr.clone(),
            exprs: vec![quotient_expr, modulo_expr.clone()],
        }),
        enforcement.clone(),
    ));

    // numerator - product - target == 0.
    let mut linear = LinearConstraint::new(Domain::constant(0));
    linear.add_expression(numerator_expr, 1);
    linear.add_expression(&product_expr, -1);
    linear.add_expression(target_expr, -1);
    let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
        ConstraintKind::Linear(linear),
        enforcement,
    ));

    context.update_rule_stats("int_mod: expanded");
    ExpansionStatus::Expanded
}

/// Expands `target == a * b` when exactly one of the two factors is a literal:
///
/// * under the literal, the other factor equals the target;
/// * under its negation, the target is zero.
///
/// If both factors are literals the constraint is left alone; a later presolve stage rewrites
/// it into a conjunction.
pub(crate) fn expand_int_prod(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::IntProd(int_prod) = kind else {
        unreachable!()
    };

    if int_prod.exprs.len() != 2 {
        return ExpansionStatus::Kept(Constraint {
            enforcement,
            kind: ConstraintKind::IntProd(int_prod),
        });
    }

    let literal_of_a = context.expression_is_a_literal(&int_prod.exprs[0]);
    let literal_of_b = context.expression_is_a_literal(&int_prod.exprs[1]);

    let (literal, factor) = match (literal_of_a, literal_of_b) {
        (Some(_), Some(_)) | (None, None) => {
            return ExpansionStatus::Kept(Constraint {
                enforcement,
                kind: ConstraintKind::IntProd(int_prod),
            })
        }
        (Some(literal), None) => (literal, &int_prod.exprs[1]),
        (None, Some(literal)) => (literal, &int_prod.exprs[0]),
    };

    expand_int_prod_with_boolean(literal, factor, &int_prod.target, &enforcement, context);
    context.update_rule_stats("int_prod: expanded product with Boolean var");
    ExpansionStatus::Expanded
}

fn expand_int_prod_with_boolean(
    literal: Literal,
    factor: &LinearExpression,
    product: &LinearExpression,
    enforcement: &[Literal],
    context: &mut PresolveContext,
) {
    let mut equal = LinearConstraint::new(Domain::constant(0));
    equal.add_expression(factor, 1);
    equal.add_expression(product, -1);
    let mut equal_enforcement = enforcement.to_vec();
    equal_enforcement.push(literal);
    let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
        ConstraintKind::Linear(equal),
        equal_enforcement,
    ));

    let mut zero = LinearConstraint::new(Domain::constant(0));
    zero.add_expression(product, 1);
    let mut zero_enforcement = enforcement.to_vec();
    zero_enforcement.push(!literal);
    let _ = context.model_mut().add_constraint(Constraint::with_enforcement(
        ConstraintKind::Linear(zero),
        zero_enforcement,
    ));
}

#[cfg(test)]
mod tests {
    use crate::checking::enumerate_solutions;
    use crate::expansion::expand_model;
    use crate::model::Constraint;
    use crate::model::ConstraintKind;
    use crate::model::Domain;
    use crate::model::LinearArgument;
    use crate::model::LinearExpression;
    use crate::model::Model;
    use crate::presolve::ExpansionOptions;
    use crate::presolve::PresolveContext;

    #[test]
    fn int_mod_with_variable_modulo_is_decomposed() {
        let mut model = Model::new();
        let numerator = model.new_variable(Domain::new(-5, 7));
        let modulo = model.new_variable(Domain::new(2, 3));
        let target = model.new_variable(Domain::new(-10, 10));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::IntMod(LinearArgument {
            target: LinearExpression::variable(target),
            exprs: vec![
                LinearExpression::variable(numerator),
                LinearExpression::variable(modulo),
            ],
        })));

        let expected = enumerate_solutions(&model, &[numerator, modulo, target]);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("int_mod is satisfiable");
        assert!(context.model().constraints[0].is_empty());

        let actual = enumerate_solutions(context.model(), &[numerator, modulo, target]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn int_mod_with_fixed_modulo_is_left_alone() {
        let mut model = Model::new();
        let numerator = model.new_variable(Domain::new(0, 7));
        let modulo = model.new_variable(Domain::constant(3));
        let target = model.new_variable(Domain::new(0, 2));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::IntMod(LinearArgument {
            target: LinearExpression::variable(target),
            exprs: vec![
                LinearExpression::variable(numerator),
                LinearExpression::variable(modulo),
            ],
        })));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("int_mod is satisfiable");
        assert!(matches!(
            context.model().constraints[0].kind,
            ConstraintKind::IntMod(_)
        ));
    }

    #[test]
    fn int_prod_with_one_boolean_factor_becomes_two_half_reified_linears() {
        let mut model = Model::new();
        let switch = model.new_variable(Domain::boolean());
        let factor = model.new_variable(Domain::new(-2, 4));
        let product = model.new_variable(Domain::new(-4, 4));
        let _ = model.add_constraint(Constraint::new(ConstraintKind::IntProd(LinearArgument {
            target: LinearExpression::variable(product),
            exprs: vec![
                LinearExpression::variable(switch),
                LinearExpression::variable(factor),
            ],
        })));

        let expected = enumerate_solutions(&model, &[switch, factor, product]);

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("int_prod is satisfiable");
        assert!(context.model().constraints[0].is_empty());

        let actual = enumerate_solutions(context.model(), &[switch, factor, product]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn int_prod_of_two_booleans_is_left_for_later_stages() {
        let mut model = Model::new();
        let a = model.new_variable(Domain::boolean());
        let b = model.new_variable(Domain::boolean());
        let product = model.new_variable(Domain::boolean());
        let _ = model.add_constraint(Constraint::new(ConstraintKind::IntProd(LinearArgument {
            target: LinearExpression::variable(product),
            exprs: vec![
                LinearExpression::variable(a),
                LinearExpression::variable(b),
            ],
        })));

        let mut context = PresolveContext::new(model, ExpansionOptions::default());
        expand_model(&mut context).expect("int_prod is satisfiable");
        assert!(matches!(
            context.model().constraints[0].kind,
            ConstraintKind::IntProd(_)
        ));
    }
}
