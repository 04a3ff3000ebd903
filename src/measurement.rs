//! Measurement-scope analysis.
//!
//! Decides, from boolean structure alone, whether every row an expression
//! admits belongs to one named measurement, so the storage engine can skip
//! all other measurements. The answer is conservative: `None` only means the
//! scope could not be proven.

use log::Level;

use crate::ast::{BinaryExpr, BinaryOp, Expr, Literal};
use crate::logging::predicate_log;

/// Returns the measurement `expr` is pinned to by `_name = '<name>'`, or
/// `None` if it cannot be proven.
///
/// - `_name = 'm'` pins `m`.
/// - `a AND b` pins `m` when one side pins `m` and the other side has no
///   `_name` reference and no OR anywhere below it, or when both sides pin `m`.
///   Two different names never pin.
/// - An OR never pins, and pinning is never proven through one.
pub fn has_single_measurement_no_or(expr: &Expr) -> Option<&str> {
    let measurement = single_measurement(expr);
    predicate_log!(
        Level::Debug,
        "measurement_scope",
        "measurement={:?} expr={}",
        measurement,
        expr
    );
    measurement
}

fn single_measurement(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Paren(inner) => single_measurement(inner),
        Expr::Binary(b) => match b.op {
            BinaryOp::And => {
                match (single_measurement(&b.lhs), single_measurement(&b.rhs)) {
                    (Some(lhs), Some(rhs)) => (lhs == rhs).then_some(lhs),
                    (Some(name), None) => is_unscoped(&b.rhs).then_some(name),
                    (None, Some(name)) => is_unscoped(&b.lhs).then_some(name),
                    (None, None) => None,
                }
            }
            BinaryOp::Eq => measurement_equality(b),
            BinaryOp::Or
            | BinaryOp::NotEq
            | BinaryOp::EqRegex
            | BinaryOp::NotEqRegex
            | BinaryOp::Lt
            | BinaryOp::Lte
            | BinaryOp::Gt
            | BinaryOp::Gte => None,
        },
        Expr::VarRef(_) | Expr::Literal(_) => None,
    }
}

/// `_name = '<non-empty string>'`
fn measurement_equality(b: &BinaryExpr) -> Option<&str> {
    match (b.lhs.as_ref(), b.rhs.as_ref()) {
        (Expr::VarRef(var), Expr::Literal(Literal::String(name)))
            if var.is_measurement() && !name.is_empty() =>
        {
            Some(name)
        }
        _ => None,
    }
}

/// True when the subtree neither references `_name` nor contains an OR.
fn is_unscoped(expr: &Expr) -> bool {
    !expr.any(&|e| match e {
        Expr::VarRef(var) => var.is_measurement(),
        Expr::Binary(b) => b.op == BinaryOp::Or,
        Expr::Literal(_) | Expr::Paren(_) => false,
    })
}
