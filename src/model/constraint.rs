use crate::butternut_asserts::butternut_assert_eq_simple;
use crate::model::Domain;
use crate::model::LinearExpression;
use crate::model::Literal;
use crate::model::VariableId;

/// A constraint of the working model: a payload and an ordered list of enforcement literals.
///
/// The constraint is active exactly when all enforcement literals are true; with an empty list
/// it always holds.
#[derive(Clone, Debug, Default)]
pub struct Constraint {
    pub enforcement: Vec<Literal>,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn new(kind: ConstraintKind) -> Constraint {
        Constraint {
            enforcement: vec![],
            kind,
        }
    }

    pub fn with_enforcement(kind: ConstraintKind, enforcement: Vec<Literal>) -> Constraint {
        Constraint { enforcement, kind }
    }

    /// Whether the payload has been cleared, i.e. the constraint was expanded in place.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, ConstraintKind::Empty)
    }

    /// All variables referenced by the constraint, including the enforcement literals.
    /// Duplicates are possible.
    pub fn referenced_variables(&self) -> Vec<VariableId> {
        let mut variables: Vec<VariableId> =
            self.enforcement.iter().map(|lit| lit.variable()).collect();

        let mut add_expr = |variables: &mut Vec<VariableId>, expr: &LinearExpression| {
            variables.extend(expr.vars.iter().copied());
        };

        match &self.kind {
            ConstraintKind::Empty => {}
            ConstraintKind::BoolOr(literals)
            | ConstraintKind::BoolAnd(literals)
            | ConstraintKind::AtMostOne(literals)
            | ConstraintKind::ExactlyOne(literals) => {
                variables.extend(literals.iter().map(|lit| lit.variable()));
            }
            ConstraintKind::Linear(linear) => variables.extend(linear.vars.iter().copied()),
            ConstraintKind::IntProd(argument)
            | ConstraintKind::IntDiv(argument)
            | ConstraintKind::IntMod(argument)
            | ConstraintKind::LinMax(argument) => {
                add_expr(&mut variables, &argument.target);
                for expr in &argument.exprs {
                    add_expr(&mut variables, expr);
                }
            }
            ConstraintKind::Element(element) => {
                variables.push(element.index);
                variables.extend(element.variables.iter().copied());
                variables.push(element.target);
            }
            ConstraintKind::Inverse(inverse) => {
                variables.extend(inverse.f_direct.iter().copied());
                variables.extend(inverse.f_inverse.iter().copied());
            }
            ConstraintKind::Automaton(automaton) => {
                variables.extend(automaton.variables.iter().copied());
            }
            ConstraintKind::Table(table) => variables.extend(table.variables.iter().copied()),
            ConstraintKind::Reservoir(reservoir) => {
                for expr in reservoir.time_exprs.iter().chain(&reservoir.level_changes) {
                    add_expr(&mut variables, expr);
                }
                variables.extend(reservoir.active_literals.iter().map(|lit| lit.variable()));
            }
            ConstraintKind::AllDifferent(all_different) => {
                for expr in &all_different.exprs {
                    add_expr(&mut variables, expr);
                }
            }
            ConstraintKind::Interval(interval) => {
                add_expr(&mut variables, &interval.start);
                add_expr(&mut variables, &interval.size);
                add_expr(&mut variables, &interval.end);
            }
        }

        variables
    }
}

/// The payload of a [`Constraint`].
#[derive(Clone, Debug, Default)]
pub enum ConstraintKind {
    /// The cleared payload left behind after a constraint has been expanded in place.
    #[default]
    Empty,
    /// At least one of the literals is true.
    BoolOr(Vec<Literal>),
    /// All of the literals are true.
    BoolAnd(Vec<Literal>),
    /// At most one of the literals is true.
    AtMostOne(Vec<Literal>),
    /// Exactly one of the literals is true.
    ExactlyOne(Vec<Literal>),
    /// `sum coeffs[i] * vars[i]` lies in `domain`.
    Linear(LinearConstraint),
    /// `target == exprs[0] * exprs[1] * ...`.
    IntProd(LinearArgument),
    /// `target == exprs[0] / exprs[1]`, truncated division.
    IntDiv(LinearArgument),
    /// `target == exprs[0] % exprs[1]`, truncated remainder.
    IntMod(LinearArgument),
    /// `target == max(exprs)`.
    LinMax(LinearArgument),
    /// `variables[index] == target`.
    Element(ElementConstraint),
    /// `f_inverse[f_direct[i]] == i` for all `i`.
    Inverse(InverseConstraint),
    /// The word `variables` is accepted by the given finite automaton.
    Automaton(AutomatonConstraint),
    /// The tuple `variables` is (or, negated, is not) one of the listed tuples.
    Table(TableConstraint),
    /// Cumulative level changes of active events stay within bounds at every event time.
    Reservoir(ReservoirConstraint),
    /// All expressions take pairwise distinct values.
    AllDifferent(AllDifferentConstraint),
    /// `start + size == end`. Not expanded here; carried because other stages schedule with it.
    Interval(IntervalConstraint),
}

/// `sum coeffs[i] * vars[i]` must lie in `domain`.
#[derive(Clone, Debug, Default)]
pub struct LinearConstraint {
    pub vars: Vec<VariableId>,
    pub coeffs: Vec<i64>,
    pub domain: Domain,
}

impl LinearConstraint {
    pub fn new(domain: Domain) -> LinearConstraint {
        LinearConstraint {
            vars: vec![],
            coeffs: vec![],
            domain,
        }
    }

    pub fn add_term(&mut self, variable: VariableId, coefficient: i64) {
        self.vars.push(variable);
        self.coeffs.push(coefficient);
    }

    /// Adds `coefficient * expression` to the left-hand side. The constant part of the
    /// expression is folded into the domain.
    pub fn add_expression(&mut self, expression: &LinearExpression, coefficient: i64) {
        for (variable, coeff) in expression.terms() {
            self.add_term(variable, coeff.saturating_mul(coefficient));
        }
        if expression.offset != 0 {
            let shift = expression.offset.saturating_mul(coefficient);
            self.domain = self
                .domain
                .addition_with(&Domain::constant(shift.saturating_neg()));
        }
    }
}

/// The shared payload of the arithmetic constraints: a target expression and operands.
#[derive(Clone, Debug, Default)]
pub struct LinearArgument {
    pub target: LinearExpression,
    pub exprs: Vec<LinearExpression>,
}

#[derive(Clone, Debug)]
pub struct ElementConstraint {
    pub index: VariableId,
    pub variables: Vec<VariableId>,
    pub target: VariableId,
}

#[derive(Clone, Debug)]
pub struct InverseConstraint {
    pub f_direct: Vec<VariableId>,
    pub f_inverse: Vec<VariableId>,
}

/// One transition of an [`AutomatonConstraint`]: in state `tail`, reading `label` moves the
/// automaton to state `head`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub tail: i64,
    pub label: i64,
    pub head: i64,
}

#[derive(Clone, Debug)]
pub struct AutomatonConstraint {
    pub variables: Vec<VariableId>,
    pub starting_state: i64,
    pub final_states: Vec<i64>,
    pub transitions: Vec<Transition>,
}

#[derive(Clone, Debug)]
pub struct TableConstraint {
    pub variables: Vec<VariableId>,
    pub tuples: Vec<Vec<i64>>,
    pub negated: bool,
}

impl TableConstraint {
    /// Builds a table from a row-major flattened value array.
    pub fn from_flattened(
        variables: Vec<VariableId>,
        values: Vec<i64>,
        negated: bool,
    ) -> TableConstraint {
        let arity = variables.len();
        butternut_assert_eq_simple!(values.len() % arity.max(1), 0);
        let tuples = values.chunks(arity).map(<[i64]>::to_vec).collect();
        TableConstraint {
            variables,
            tuples,
            negated,
        }
    }
}

/// Events at (possibly variable) times change the level of a reservoir by a fixed amount; the
/// level must stay within `[min_level, max_level]` at all event times.
///
/// If `active_literals` is empty, all events are unconditionally active.
#[derive(Clone, Debug)]
pub struct ReservoirConstraint {
    pub time_exprs: Vec<LinearExpression>,
    pub level_changes: Vec<LinearExpression>,
    pub active_literals: Vec<Literal>,
    pub min_level: i64,
    pub max_level: i64,
}

/// All expressions are affine (at most one variable each) and must take distinct values.
#[derive(Clone, Debug)]
pub struct AllDifferentConstraint {
    pub exprs: Vec<LinearExpression>,
}

#[derive(Clone, Debug)]
pub struct IntervalConstraint {
    pub start: LinearExpression,
    pub size: LinearExpression,
    pub end: LinearExpression,
}
