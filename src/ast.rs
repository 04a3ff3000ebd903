//! Expression AST handed to the query evaluator, plus its canonical rendering.
//!
//! The rendering is the textual form the evaluator and the tests agree on:
//! tag references carry a `::tag` suffix, field references `::field`, the
//! field-value pseudo-reference renders as `"$"`. [`crate::parser`] reads the
//! same text back, so `parse_expr(&expr.to_string())` yields `expr` again with
//! two exceptions: parens the renderer inserted for precedence come back as
//! [`Expr::Paren`], and an unsigned value that fits in `i64` comes back as an
//! integer. Non-finite floats have no literal form.

use std::fmt;

use regex::Regex;

/// Pseudo-variable naming the measurement a series belongs to.
pub const MEASUREMENT_NAME: &str = "_name";
/// Pseudo-variable naming the field key of a row.
pub const FIELD_KEY: &str = "_field";
/// Pseudo-variable standing for the field value of a row.
pub const FIELD_VALUE: &str = "$";

/// A predicate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary(BinaryExpr),
    VarRef(VarRef),
    Literal(Literal),
    /// Explicit grouping. Only affects rendering; evaluation order is structural.
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Eq,         // =
    NotEq,      // !=
    EqRegex,    // =~
    NotEqRegex, // !~
    Lt,         // <
    Lte,        // <=
    Gt,         // >
    Gte,        // >=
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(self) -> bool {
        !self.is_logical()
    }

    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            _ => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::EqRegex => "=~",
            BinaryOp::NotEqRegex => "!~",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type annotation on a variable reference, rendered as a `::tag`/`::field` cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Tag,
    Field,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Tag => "tag",
            DataType::Field => "field",
        }
    }
}

/// An unresolved variable reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub name: String,
    pub data_type: Option<DataType>,
}

impl VarRef {
    pub fn new(name: impl Into<String>, data_type: Option<DataType>) -> Self {
        Self { name: name.into(), data_type }
    }

    pub fn is_measurement(&self) -> bool {
        self.name == MEASUREMENT_NAME
    }

    pub fn is_field_key(&self) -> bool {
        self.name == FIELD_KEY
    }

    /// The `$` pseudo-reference or any reference cast to `::field`.
    pub fn is_field_value(&self) -> bool {
        self.name == FIELD_VALUE || self.data_type == Some(DataType::Field)
    }
}

/// Compiled regex literal. Equality is by source pattern.
#[derive(Debug, Clone)]
pub struct RegexLiteral(pub Regex);

impl RegexLiteral {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for RegexLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    Boolean(bool),
    Regex(RegexLiteral),
    /// Nanoseconds.
    Duration(i64),
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(BinaryExpr {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::And, lhs, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Or, lhs, rhs)
    }

    pub fn paren(inner: Expr) -> Self {
        Expr::Paren(Box::new(inner))
    }

    pub fn var_ref(name: impl Into<String>) -> Self {
        Expr::VarRef(VarRef::new(name, None))
    }

    pub fn tag_ref(name: impl Into<String>) -> Self {
        Expr::VarRef(VarRef::new(name, Some(DataType::Tag)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Boolean(value))
    }

    pub fn as_var_ref(&self) -> Option<&VarRef> {
        match self {
            Expr::VarRef(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// Visits every node in pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Binary(b) => {
                b.lhs.walk(f);
                b.rhs.walk(f);
            }
            Expr::Paren(inner) => inner.walk(f),
            Expr::VarRef(_) | Expr::Literal(_) => {}
        }
    }

    /// True if any node in the subtree satisfies `pred`.
    pub fn any(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Expr::Binary(b) => b.lhs.any(pred) || b.rhs.any(pred),
            Expr::Paren(inner) => inner.any(pred),
            Expr::VarRef(_) | Expr::Literal(_) => false,
        }
    }
}

impl From<Literal> for Expr {
    fn from(literal: Literal) -> Self {
        Expr::Literal(literal)
    }
}

impl From<VarRef> for Expr {
    fn from(var_ref: VarRef) -> Self {
        Expr::VarRef(var_ref)
    }
}

const KEYWORDS: &[&str] = &["and", "or", "true", "false"];

fn is_bare_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&s.to_ascii_lowercase().as_str())
}

/// Writes an identifier, double-quoting it when it would not lex as one.
pub fn write_ident(f: &mut impl fmt::Write, s: &str) -> fmt::Result {
    if is_bare_ident(s) {
        return f.write_str(s);
    }
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;
const NANOS_PER_WEEK: i64 = 7 * NANOS_PER_DAY;

/// Duration units from largest to smallest, as written in expressions.
pub(crate) const DURATION_UNITS: &[(&str, i64)] = &[
    ("w", NANOS_PER_WEEK),
    ("d", NANOS_PER_DAY),
    ("h", NANOS_PER_HOUR),
    ("m", NANOS_PER_MINUTE),
    ("s", NANOS_PER_SECOND),
    ("ms", NANOS_PER_MILLI),
    ("u", NANOS_PER_MICRO),
    ("ns", 1),
];

/// Formats nanoseconds in the largest unit that represents them exactly.
pub fn format_duration(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    DURATION_UNITS
        .iter()
        .find(|(_, unit)| nanos % unit == 0)
        .map(|(suffix, unit)| format!("{}{}", nanos / unit, suffix))
        .unwrap_or_else(|| format!("{nanos}ns"))
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write_string(f, s),
            // Debug keeps the decimal point (`1.0`) so the literal reparses as a float.
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Integer(v) => write!(f, "{v}"),
            Literal::Unsigned(v) => write!(f, "{v}"),
            Literal::Boolean(v) => write!(f, "{v}"),
            Literal::Regex(re) => write!(f, "/{}/", re.as_str().replace('/', "\\/")),
            Literal::Duration(nanos) => f.write_str(&format_duration(*nanos)),
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ident(f, &self.name)?;
        if let Some(data_type) = self.data_type {
            write!(f, "::{}", data_type.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Display for BinaryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = self.op.precedence();
        write_operand(f, &self.lhs, |child| child < prec)?;
        write!(f, " {} ", self.op)?;
        // Chains are left-associative, so an equal-precedence right child needs grouping.
        write_operand(f, &self.rhs, |child| child <= prec)
    }
}

fn write_operand(
    f: &mut fmt::Formatter<'_>,
    operand: &Expr,
    needs_parens: impl Fn(u8) -> bool,
) -> fmt::Result {
    match operand {
        Expr::Binary(b) if needs_parens(b.op.precedence()) => write!(f, "({b})"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary(b) => write!(f, "{b}"),
            Expr::VarRef(v) => write!(f, "{v}"),
            Expr::Literal(l) => write!(f, "{l}"),
            Expr::Paren(inner) => write!(f, "({inner})"),
        }
    }
}
