use std::collections::HashMap;

use crate::compile::ast::{BinaryOp, Expr, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ConstValue {
    pub fn is_zero(&self) -> bool {
        match self {
            ConstValue::Int(value) => *value == 0,
            ConstValue::Float(value) => *value == 0.0,
            ConstValue::Bool(_) => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// Source of values for named constants.
pub trait ConstLookup {
    fn const_value(&self, name: &str) -> Option<ConstValue>;
}

impl ConstLookup for HashMap<String, ConstValue> {
    fn const_value(&self, name: &str) -> Option<ConstValue> {
        self.get(name).copied()
    }
}

impl ConstLookup for () {
    fn const_value(&self, _: &str) -> Option<ConstValue> {
        None
    }
}

/// Folds `expr` if it is a compile-time constant. Anything that would trap or overflow at
/// runtime is "not constant".
pub fn const_eval(expr: &Expr, env: &impl ConstLookup) -> Option<ConstValue> {
    match expr {
        Expr::Int(literal, _) => literal.parse().map(ConstValue::Int),
        Expr::Float(value, _) => value.parse().ok().map(ConstValue::Float),
        Expr::Bool(value, _) => Some(ConstValue::Bool(*value)),
        Expr::Ident(name, _) => env.const_value(name),
        Expr::Unary(op, operand, _) => {
            let value = const_eval(operand, env)?;
            eval_unary(*op, value)
        }
        Expr::Binary(op, lhs, rhs, _) => {
            let lhs = const_eval(lhs, env)?;
            let rhs = const_eval(rhs, env)?;
            eval_binary(*op, lhs, rhs)
        }
        _ => None,
    }
}

fn eval_unary(op: UnaryOp, value: ConstValue) -> Option<ConstValue> {
    match (op, value) {
        (UnaryOp::Neg, ConstValue::Int(a)) => a.checked_neg().map(ConstValue::Int),
        (UnaryOp::Neg, ConstValue::Float(a)) => Some(ConstValue::Float(-a)),
        (UnaryOp::LogicalNot, ConstValue::Bool(a)) => Some(ConstValue::Bool(!a)),
        (UnaryOp::BitwiseNot, ConstValue::Int(a)) => Some(ConstValue::Int(!a)),
        _ => None,
    }
}

fn eval_binary(op: BinaryOp, lhs: ConstValue, rhs: ConstValue) -> Option<ConstValue> {
    use ConstValue::{Bool, Float, Int};

    let value = match (lhs, rhs) {
        (Int(a), Int(b)) => match op {
            BinaryOp::Add => Int(a.checked_add(b)?),
            BinaryOp::Sub => Int(a.checked_sub(b)?),
            BinaryOp::Mul => Int(a.checked_mul(b)?),
            BinaryOp::Div => Int(a.checked_div(b)?),
            BinaryOp::Mod => Int(a.checked_rem(b)?),
            BinaryOp::BitwiseAnd => Int(a & b),
            BinaryOp::BitwiseOr => Int(a | b),
            BinaryOp::BitwiseXor => Int(a ^ b),
            BinaryOp::ShiftLeft => Int(a.checked_shl(u32::try_from(b).ok()?)?),
            BinaryOp::ShiftRight => Int(a.checked_shr(u32::try_from(b).ok()?)?),
            BinaryOp::Eq => Bool(a == b),
            BinaryOp::NotEq => Bool(a != b),
            BinaryOp::Less => Bool(a < b),
            BinaryOp::LessEq => Bool(a <= b),
            BinaryOp::Greater => Bool(a > b),
            BinaryOp::GreaterEq => Bool(a >= b),
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => return None,
        },
        (Float(_), Float(_)) | (Int(_), Float(_)) | (Float(_), Int(_)) => {
            let (a, b) = (as_float(lhs)?, as_float(rhs)?);
            match op {
                BinaryOp::Add => Float(a + b),
                BinaryOp::Sub => Float(a - b),
                BinaryOp::Mul => Float(a * b),
                BinaryOp::Div if b == 0.0 => return None,
                BinaryOp::Div => Float(a / b),
                BinaryOp::Eq => Bool(a == b),
                BinaryOp::NotEq => Bool(a != b),
                BinaryOp::Less => Bool(a < b),
                BinaryOp::LessEq => Bool(a <= b),
                BinaryOp::Greater => Bool(a > b),
                BinaryOp::GreaterEq => Bool(a >= b),
                _ => return None,
            }
        }
        (Bool(a), Bool(b)) => match op {
            BinaryOp::LogicalAnd => Bool(a && b),
            BinaryOp::LogicalOr => Bool(a || b),
            BinaryOp::Eq => Bool(a == b),
            BinaryOp::NotEq => Bool(a != b),
            _ => return None,
        },
        _ => return None,
    };

    Some(value)
}

fn as_float(value: ConstValue) -> Option<f64> {
    match value {
        ConstValue::Int(a) => Some(a as f64),
        ConstValue::Float(a) => Some(a),
        ConstValue::Bool(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::compile::ast::int_literal::IntLiteral;

    fn int(value: i64) -> Expr {
        Expr::Int(IntLiteral::new(value.to_string(), 10), 0..0)
    }

    fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, lhs.boxed(), rhs.boxed(), 0..0)
    }

    #[test]
    fn folds_nested_arithmetic() {
        let expr = bin(BinaryOp::Mul, bin(BinaryOp::Add, int(2), int(3)), int(4));
        assert_eq!(const_eval(&expr, &()), Some(ConstValue::Int(20)));
    }

    #[test]
    fn division_by_zero_is_not_constant() {
        assert_eq!(const_eval(&bin(BinaryOp::Div, int(5), int(0)), &()), None);
        assert_eq!(const_eval(&bin(BinaryOp::Mod, int(5), int(0)), &()), None);
    }

    #[test]
    fn named_constants_resolve_through_env() {
        let env = HashMap::from([("N".to_string(), ConstValue::Int(8))]);
        let expr = bin(BinaryOp::Sub, Expr::Ident("N".to_string(), 0..0), int(1));
        assert_eq!(const_eval(&expr, &env), Some(ConstValue::Int(7)));
        assert_eq!(const_eval(&Expr::Ident("M".to_string(), 0..0), &env), None);
    }

    #[test]
    fn negation_and_comparison() {
        let neg = Expr::Unary(UnaryOp::Neg, int(3).boxed(), 0..0);
        assert_eq!(const_eval(&neg, &()), Some(ConstValue::Int(-3)));
        assert_eq!(
            const_eval(&bin(BinaryOp::Less, int(1), int(2)), &()),
            Some(ConstValue::Bool(true))
        );
    }
}
