//! Compile-time evaluation of literal-only arithmetic.
//!
//! Used in two places: binary operator applications fold when both operands
//! are literals, and top-level initializers that reduce to a literal emit a
//! direct global instead of an initializer function.

use mml_ast::{Literal, Term};

/// A compile-time constant value, also serving as the unmaterialized
/// "immediate" form of a compile result.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
}

impl ConstValue {
    pub fn from_literal(lit: &Literal) -> ConstValue {
        match lit {
            Literal::Int(v) => ConstValue::Int(*v),
            Literal::Float(v) => ConstValue::Float(*v),
            Literal::Bool(v) => ConstValue::Bool(*v),
            Literal::Str(v) => ConstValue::Str(v.clone()),
            Literal::Unit => ConstValue::Unit,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConstValue::Int(_) => "Int",
            ConstValue::Float(_) => "Float",
            ConstValue::Bool(_) => "Bool",
            ConstValue::Str(_) => "String",
            ConstValue::Unit => "Unit",
        }
    }

    /// Render as an instruction operand. Floats use the bit-exact hex form
    /// so no precision is lost in the round-trip through text.
    pub fn render(&self) -> String {
        match self {
            ConstValue::Int(v) => v.to_string(),
            ConstValue::Float(v) => format!("0x{:016X}", v.to_bits()),
            ConstValue::Bool(v) => v.to_string(),
            ConstValue::Str(_) => "<string>".to_string(),
            ConstValue::Unit => "void".to_string(),
        }
    }
}

/// Whether the operator participates in literal folding.
pub fn is_arithmetic(op: &str) -> bool {
    matches!(op, "+" | "-" | "*" | "/" | "%")
}

/// Fold one arithmetic application of two literals. `None` when the
/// operation is not foldable (wrong types, division by zero, overflow of
/// `i64::MIN / -1`).
pub fn fold_binop(op: &str, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
    match (lhs, rhs) {
        (ConstValue::Int(a), ConstValue::Int(b)) => {
            let v = match op {
                "+" => a.checked_add(*b)?,
                "-" => a.checked_sub(*b)?,
                "*" => a.checked_mul(*b)?,
                "/" => a.checked_div(*b)?,
                "%" => a.checked_rem(*b)?,
                _ => return None,
            };
            Some(ConstValue::Int(v))
        }
        (ConstValue::Float(a), ConstValue::Float(b)) => {
            let v = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                _ => return None,
            };
            Some(ConstValue::Float(v))
        }
        _ => None,
    }
}

/// Fold one unary application of a literal.
pub fn fold_unop(op: &str, operand: &ConstValue) -> Option<ConstValue> {
    match (op, operand) {
        ("-", ConstValue::Int(v)) => v.checked_neg().map(ConstValue::Int),
        ("-", ConstValue::Float(v)) => Some(ConstValue::Float(-v)),
        ("!", ConstValue::Bool(v)) => Some(ConstValue::Bool(!v)),
        _ => None,
    }
}

/// Evaluate a term as a compile-time constant, or `None` if any part of it
/// requires runtime computation.
pub fn eval_const_term(term: &Term) -> Option<ConstValue> {
    match term {
        Term::Lit(lit) => Some(ConstValue::from_literal(lit)),
        Term::BinOp { op, lhs, rhs, .. } => {
            let l = eval_const_term(lhs)?;
            let r = eval_const_term(rhs)?;
            fold_binop(op, &l, &r)
        }
        Term::UnOp { op, operand, .. } => {
            let v = eval_const_term(operand)?;
            fold_unop(op, &v)
        }
        _ => None,
    }
}
