//! Operations on values.
//!
//! Every operation is total: ill-typed or out-of-range inputs produce a
//! `Value::Error` rather than failing. An Error operand is returned unchanged;
//! when both operands are Errors the left one wins.

use std::rc::Rc;

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::LangError;

use super::value::Value;

/// Apply a binary operator.
pub fn binary(operator: BinaryOp, left: &Value, right: &Value) -> Value {
    if let Some(err) = first_error(&[left, right]) {
        return err;
    }
    match operator {
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo => arith(operator, left, right),
        BinaryOp::Equal => Value::Bool(left.weak_eq(right)),
        BinaryOp::NotEqual => Value::Bool(!left.weak_eq(right)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            relational(operator, left, right)
        }
        BinaryOp::And | BinaryOp::Or => logic(operator, left, right),
    }
}

/// Apply a unary operator.
pub fn unary(operator: UnaryOp, operand: &Value) -> Value {
    match (operator, operand) {
        (_, Value::Error(_)) => operand.clone(),
        (UnaryOp::Negate, Value::Int(n)) => Value::Int(n.wrapping_neg()),
        (UnaryOp::Negate, Value::Float(n)) => Value::Float(-n),
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        _ => LangError::UnaryType {
            op: operator.symbol(),
            operand: operand.type_name(),
        }
        .into(),
    }
}

/// Single-element index: `target[index]`.
pub fn index(target: &Value, index: &Value) -> Value {
    if let Some(err) = first_error(&[target, index]) {
        return err;
    }
    let length = match sequence_len(target) {
        Some(length) => length,
        None => return type_error("[]", target, index),
    };
    let Value::Int(i) = index else {
        return type_error("[]", target, index);
    };
    let Some(position) = checked_position(*i, length) else {
        return LangError::Index { index: *i, length }.into();
    };
    match target {
        Value::String(s) => s
            .chars()
            .nth(position)
            .map(|c| Value::String(Rc::from(c.to_string())))
            .unwrap_or_else(|| LangError::Index { index: *i, length }.into()),
        Value::Array(values) => values[position].clone(),
        _ => type_error("[]", target, index),
    }
}

/// Range index: `target[from:to]`, requiring `0 <= from <= to <= len`.
pub fn slice(target: &Value, from: &Value, to: &Value) -> Value {
    if let Some(err) = first_error(&[target, from, to]) {
        return err;
    }
    let length = match sequence_len(target) {
        Some(length) => length,
        None => return type_error("[:]", target, from),
    };
    let (Value::Int(start), Value::Int(end)) = (from, to) else {
        let bad = if matches!(from, Value::Int(_)) { to } else { from };
        return type_error("[:]", target, bad);
    };
    if *start < 0 || start > end || *end as u64 > length as u64 {
        return LangError::Slice {
            from: *start,
            to: *end,
            length,
        }
        .into();
    }
    let (start, end) = (*start as usize, *end as usize);
    match target {
        Value::String(s) => Value::String(s.chars().skip(start).take(end - start).collect::<String>().into()),
        Value::Array(values) => Value::Array(Rc::from(&values[start..end])),
        _ => type_error("[:]", target, from),
    }
}

/// Element count of a string or array.
pub fn length(target: &Value) -> Value {
    match target {
        Value::Error(_) => target.clone(),
        _ => match sequence_len(target) {
            Some(length) => Value::Int(length as i64),
            None => LangError::UnaryType {
                op: "len",
                operand: target.type_name(),
            }
            .into(),
        },
    }
}

fn arith(operator: BinaryOp, left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arith(operator, *a, *b),
        (Value::Int(a), Value::Float(b)) => float_arith(operator, *a as f64, *b),
        (Value::Float(a), Value::Int(b)) => float_arith(operator, *a, *b as f64),
        (Value::Float(a), Value::Float(b)) => float_arith(operator, *a, *b),
        (Value::String(a), Value::String(b)) if operator == BinaryOp::Add => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Value::String(joined.into())
        }
        (Value::Array(a), Value::Array(b)) if operator == BinaryOp::Add => {
            Value::Array(a.iter().chain(b.iter()).cloned().collect())
        }
        _ => mismatch(operator, left, right),
    }
}

fn int_arith(operator: BinaryOp, a: i64, b: i64) -> Value {
    match operator {
        BinaryOp::Add => Value::Int(a.wrapping_add(b)),
        BinaryOp::Subtract => Value::Int(a.wrapping_sub(b)),
        BinaryOp::Multiply => Value::Int(a.wrapping_mul(b)),
        BinaryOp::Divide if b == 0 => LangError::ZeroDivision.into(),
        BinaryOp::Divide => Value::Int(a.wrapping_div(b)),
        BinaryOp::Modulo if b == 0 => LangError::ZeroDivision.into(),
        BinaryOp::Modulo => Value::Int(a.wrapping_rem(b)),
        _ => unreachable!("{} is not arithmetic", operator),
    }
}

// IEEE semantics throughout: division by zero yields an infinity or NaN.
fn float_arith(operator: BinaryOp, a: f64, b: f64) -> Value {
    match operator {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Subtract => Value::Float(a - b),
        BinaryOp::Multiply => Value::Float(a * b),
        BinaryOp::Divide => Value::Float(a / b),
        BinaryOp::Modulo => Value::Float(a % b),
        _ => unreachable!("{} is not arithmetic", operator),
    }
}

fn relational(operator: BinaryOp, left: &Value, right: &Value) -> Value {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => return mismatch(operator, left, right),
    };
    // NaN compares false against everything.
    let Some(ordering) = ordering else {
        return Value::Bool(false);
    };
    Value::Bool(match operator {
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::LessEqual => ordering.is_le(),
        BinaryOp::Greater => ordering.is_gt(),
        BinaryOp::GreaterEqual => ordering.is_ge(),
        _ => unreachable!("{} is not relational", operator),
    })
}

fn logic(operator: BinaryOp, left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(if operator == BinaryOp::And {
            *a && *b
        } else {
            *a || *b
        }),
        _ => type_error(operator.symbol(), left, right),
    }
}

fn mismatch(operator: BinaryOp, left: &Value, right: &Value) -> Value {
    if std::mem::discriminant(left) == std::mem::discriminant(right) {
        LangError::InvalidOperator {
            op: operator.symbol(),
            operand: left.type_name(),
        }
        .into()
    } else {
        type_error(operator.symbol(), left, right)
    }
}

fn type_error(op: &'static str, left: &Value, right: &Value) -> Value {
    LangError::Type {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
    .into()
}

fn first_error(operands: &[&Value]) -> Option<Value> {
    operands.iter().find(|v| v.is_error()).map(|v| (*v).clone())
}

fn sequence_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(values) => Some(values.len()),
        _ => None,
    }
}

fn checked_position(index: i64, length: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|i| *i < length)
}
