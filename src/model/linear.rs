use crate::butternut_asserts::butternut_assert_eq_simple;
use crate::model::VariableId;

/// A linear expression `sum coeffs[i] * vars[i] + offset` over the integers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LinearExpression {
    pub vars: Vec<VariableId>,
    pub coeffs: Vec<i64>,
    pub offset: i64,
}

impl LinearExpression {
    /// The constant expression `value`.
    pub fn constant(value: i64) -> LinearExpression {
        LinearExpression {
            vars: vec![],
            coeffs: vec![],
            offset: value,
        }
    }

    /// The expression `1 * variable`.
    pub fn variable(variable: VariableId) -> LinearExpression {
        LinearExpression::affine(variable, 1, 0)
    }

    /// The expression `coefficient * variable + offset`.
    pub fn affine(variable: VariableId, coefficient: i64, offset: i64) -> LinearExpression {
        LinearExpression {
            vars: vec![variable],
            coeffs: vec![coefficient],
            offset,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over the `(variable, coefficient)` terms.
    pub fn terms(&self) -> impl Iterator<Item = (VariableId, i64)> + '_ {
        butternut_assert_eq_simple!(self.vars.len(), self.coeffs.len());
        self.vars.iter().copied().zip(self.coeffs.iter().copied())
    }
}
