//! Constant reduction.
//!
//! Substitutes bound references with their values and folds whatever became
//! constant. Used after [`crate::rewrite::rewrite_remove_field_key_and_value`]
//! to collapse the `true` placeholders it leaves behind.

use std::cmp::Ordering;
use std::collections::HashMap;

use log::Level;

use crate::ast::{BinaryOp, Expr, Literal};
use crate::logging::predicate_log;

/// Supplies values for variable references during reduction.
pub trait Valuer {
    /// Value bound to `key`, or `None` to leave the reference in place.
    fn value(&self, key: &str) -> Option<Literal>;
}

impl Valuer for HashMap<String, Literal> {
    fn value(&self, key: &str) -> Option<Literal> {
        self.get(key).cloned()
    }
}

/// Every binding is a string, as tag values are.
impl Valuer for HashMap<String, String> {
    fn value(&self, key: &str) -> Option<Literal> {
        self.get(key).cloned().map(Literal::String)
    }
}

/// Reduces `expr` as far as the bindings in `valuer` allow.
///
/// - `false AND x` is `false`, `true AND x` is `x` (either side).
/// - `true OR x` is `true`, `false OR x` is `x` (either side).
/// - A comparison of two literals of compatible kinds becomes a boolean;
///   incompatible kinds are left as they are.
/// - A paren is kept only around a binary expression.
pub fn reduce(expr: &Expr, valuer: Option<&dyn Valuer>) -> Expr {
    let reduced = reduce_expr(expr, valuer);
    predicate_log!(Level::Trace, "reduce", "expr={} reduced={}", expr, reduced);
    reduced
}

fn reduce_expr(expr: &Expr, valuer: Option<&dyn Valuer>) -> Expr {
    match expr {
        Expr::Binary(b) => reduce_binary(
            b.op,
            reduce_expr(&b.lhs, valuer),
            reduce_expr(&b.rhs, valuer),
        ),
        Expr::Paren(inner) => match reduce_expr(inner, valuer) {
            binary @ Expr::Binary(_) => Expr::paren(binary),
            other => other,
        },
        Expr::VarRef(var) => valuer
            .and_then(|v| v.value(&var.name))
            .map_or_else(|| expr.clone(), Expr::Literal),
        Expr::Literal(_) => expr.clone(),
    }
}

fn reduce_binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    match op {
        BinaryOp::And => match (as_bool(&lhs), as_bool(&rhs)) {
            (Some(false), _) | (_, Some(false)) => Expr::boolean(false),
            (Some(true), _) => rhs,
            (_, Some(true)) => lhs,
            (None, None) => Expr::and(lhs, rhs),
        },
        BinaryOp::Or => match (as_bool(&lhs), as_bool(&rhs)) {
            (Some(true), _) | (_, Some(true)) => Expr::boolean(true),
            (Some(false), _) => rhs,
            (_, Some(false)) => lhs,
            (None, None) => Expr::or(lhs, rhs),
        },
        _ => {
            let folded = match (lhs.as_literal(), rhs.as_literal()) {
                (Some(l), Some(r)) => compare(op, l, r),
                _ => None,
            };
            folded.map_or_else(|| Expr::binary(op, lhs, rhs), Expr::boolean)
        }
    }
}

fn as_bool(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Literal(Literal::Boolean(b)) => Some(*b),
        _ => None,
    }
}

fn compare(op: BinaryOp, lhs: &Literal, rhs: &Literal) -> Option<bool> {
    match (lhs, rhs) {
        (Literal::String(a), Literal::String(b)) => ordered(op, a.cmp(b)),
        (Literal::String(s), Literal::Regex(re)) => match op {
            BinaryOp::EqRegex => Some(re.0.is_match(s)),
            BinaryOp::NotEqRegex => Some(!re.0.is_match(s)),
            _ => None,
        },
        (Literal::Boolean(a), Literal::Boolean(b)) => match op {
            BinaryOp::Eq => Some(a == b),
            BinaryOp::NotEq => Some(a != b),
            _ => None,
        },
        (Literal::Duration(a), Literal::Duration(b)) => ordered(op, a.cmp(b)),
        _ => numeric_order(lhs, rhs).and_then(|ord| ordered(op, ord)),
    }
}

fn ordered(op: BinaryOp, ord: Ordering) -> Option<bool> {
    Some(match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::NotEq => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Lte => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Gte => ord != Ordering::Less,
        BinaryOp::And | BinaryOp::Or | BinaryOp::EqRegex | BinaryOp::NotEqRegex => return None,
    })
}

/// Integers compare exactly; anything involving a float goes through `f64`.
fn numeric_order(lhs: &Literal, rhs: &Literal) -> Option<Ordering> {
    match (lhs, rhs) {
        (Literal::Integer(a), Literal::Integer(b)) => Some(a.cmp(b)),
        (Literal::Unsigned(a), Literal::Unsigned(b)) => Some(a.cmp(b)),
        (Literal::Integer(a), Literal::Unsigned(b)) => Some(signed_to_unsigned(*a, *b)),
        (Literal::Unsigned(a), Literal::Integer(b)) => Some(signed_to_unsigned(*b, *a).reverse()),
        _ => as_f64(lhs)?.partial_cmp(&as_f64(rhs)?),
    }
}

fn signed_to_unsigned(a: i64, b: u64) -> Ordering {
    u64::try_from(a).map_or(Ordering::Less, |a| a.cmp(&b))
}

fn as_f64(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Float(f) => Some(*f),
        Literal::Integer(i) => Some(*i as f64),
        Literal::Unsigned(u) => Some(*u as f64),
        _ => None,
    }
}
