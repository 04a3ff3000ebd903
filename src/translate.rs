//! Translator from Filter Tree nodes to expressions.
//!
//! The mapping is one node to one expression node, with two exceptions:
//! n-ary logical nodes fold into a left-associative chain of binary
//! expressions (`[a, b, c]` becomes `(a AND b) AND c`, rendered
//! `a AND b AND c`), and tag keys may be renamed by a [`TagRemap`].

use std::collections::HashMap;

use log::Level;
use regex::Regex;

use crate::ast::{BinaryOp, DataType, Expr, Literal, RegexLiteral, VarRef, FIELD_VALUE};
use crate::logging::predicate_log;
use crate::node::{Comparison, Logical, Node, NodeType, NodeValue};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("comparison node expects two children, got {children}")]
    MalformedComparison { children: usize },
    #[error("logical node has no children")]
    EmptyLogicalNode,
    #[error("paren node expects one child, got {children}")]
    MalformedParen { children: usize },
    #[error("unknown node type {0}")]
    UnknownNodeType(i32),
    #[error("unknown {kind} operator code {code}")]
    UnknownOperator { kind: &'static str, code: i32 },
    #[error("comparison {0:?} has no expression counterpart")]
    UnsupportedOperator(Comparison),
    #[error("operator {operator} expects a {expected} operand, got {found}")]
    TypeMismatch {
        operator: BinaryOp,
        expected: &'static str,
        found: String,
    },
    #[error("{node:?} node is missing its {expected}")]
    MissingValue {
        node: NodeType,
        expected: &'static str,
    },
    #[error("tag reference is not valid UTF-8")]
    InvalidTagRef,
    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("float literal {0} is not finite")]
    NonFiniteFloat(f64),
    #[error("{node:?} node cannot have children, got {children}")]
    UnexpectedChildren { node: NodeType, children: usize },
    #[error("filter tree is nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;

/// Deepest Filter Tree [`node_to_expr`] accepts, counting the root as 1.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Renames tag keys during translation, e.g. `_measurement` to `_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRemap {
    mappings: HashMap<String, String>,
}

impl TagRemap {
    pub fn new(mappings: HashMap<String, String>) -> Self {
        Self { mappings }
    }

    /// The storage engine's own convention: `_measurement` becomes `_name`,
    /// `_field` stays as is.
    pub fn storage_defaults() -> Self {
        let mut mappings = HashMap::new();
        mappings.insert("_measurement".to_string(), crate::ast::MEASUREMENT_NAME.to_string());
        mappings.insert("_field".to_string(), crate::ast::FIELD_KEY.to_string());
        Self { mappings }
    }

    /// The name `key` translates to.
    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.mappings.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn mappings(&self) -> &HashMap<String, String> {
        &self.mappings
    }
}

impl From<HashMap<String, String>> for TagRemap {
    fn from(mappings: HashMap<String, String>) -> Self {
        Self::new(mappings)
    }
}

/// Converts a Filter Tree into an expression.
///
/// Any malformed node aborts the whole translation; a structurally invalid
/// tree means the peer is broken and is not patched up here. Trees nested
/// deeper than [`MAX_NESTING_DEPTH`] are rejected before they can exhaust the
/// stack.
pub fn node_to_expr(node: &Node, remap: Option<&TagRemap>) -> Result<Expr> {
    let result = Translator { remap }.translate(node, 1);
    match &result {
        Ok(expr) => predicate_log!(Level::Trace, "translate", "nodes={} expr={}", node.size(), expr),
        Err(e) => predicate_log!(Level::Debug, "translate_failed", "nodes={} error={}", node.size(), e),
    }
    result
}

struct Translator<'r> {
    remap: Option<&'r TagRemap>,
}

impl Translator<'_> {
    fn translate(&self, node: &Node, depth: usize) -> Result<Expr> {
        if depth > MAX_NESTING_DEPTH {
            return Err(TranslateError::TooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        let node_type =
            NodeType::try_from(node.node_type).map_err(TranslateError::UnknownNodeType)?;

        if matches!(node_type, NodeType::TagRef | NodeType::FieldRef | NodeType::Literal)
            && !node.children.is_empty()
        {
            return Err(TranslateError::UnexpectedChildren {
                node: node_type,
                children: node.children.len(),
            });
        }

        match node_type {
            NodeType::LogicalExpression => self.translate_logical(node, depth),
            NodeType::ComparisonExpression => self.translate_comparison(node, depth),
            NodeType::ParenExpression => match node.children.as_slice() {
                [child] => Ok(Expr::paren(self.translate(child, depth + 1)?)),
                children => Err(TranslateError::MalformedParen {
                    children: children.len(),
                }),
            },
            NodeType::TagRef => self.translate_tag_ref(node),
            NodeType::FieldRef => translate_field_ref(node),
            NodeType::Literal => translate_literal(node).map(Expr::Literal),
        }
    }

    fn translate_logical(&self, node: &Node, depth: usize) -> Result<Expr> {
        let Some(NodeValue::Logical(code)) = node.value else {
            return Err(TranslateError::MissingValue {
                node: NodeType::LogicalExpression,
                expected: "logical operator",
            });
        };
        let op = match Logical::try_from(code) {
            Ok(Logical::And) => BinaryOp::And,
            Ok(Logical::Or) => BinaryOp::Or,
            Err(code) => {
                return Err(TranslateError::UnknownOperator {
                    kind: "logical",
                    code,
                })
            }
        };

        let mut children = node.children.iter();
        let first = children.next().ok_or(TranslateError::EmptyLogicalNode)?;
        let mut expr = self.translate(first, depth + 1)?;
        for child in children {
            expr = Expr::binary(op, expr, self.translate(child, depth + 1)?);
        }
        Ok(expr)
    }

    fn translate_comparison(&self, node: &Node, depth: usize) -> Result<Expr> {
        let Some(NodeValue::Comparison(code)) = node.value else {
            return Err(TranslateError::MissingValue {
                node: NodeType::ComparisonExpression,
                expected: "comparison operator",
            });
        };
        let op = comparison_operator(code)?;

        let [lhs, rhs] = node.children.as_slice() else {
            return Err(TranslateError::MalformedComparison {
                children: node.children.len(),
            });
        };
        let lhs = self.translate(lhs, depth + 1)?;
        let rhs = self.translate(rhs, depth + 1)?;

        if matches!(op, BinaryOp::EqRegex | BinaryOp::NotEqRegex)
            && !matches!(rhs, Expr::Literal(Literal::Regex(_)))
        {
            return Err(TranslateError::TypeMismatch {
                operator: op,
                expected: "regex",
                found: rhs.to_string(),
            });
        }

        Ok(Expr::binary(op, lhs, rhs))
    }

    fn translate_tag_ref(&self, node: &Node) -> Result<Expr> {
        let Some(NodeValue::TagRefValue(bytes)) = &node.value else {
            return Err(TranslateError::MissingValue {
                node: NodeType::TagRef,
                expected: "tag key",
            });
        };
        let key = std::str::from_utf8(bytes).map_err(|_| TranslateError::InvalidTagRef)?;
        let name = match self.remap {
            Some(remap) => remap.resolve(key),
            None => key,
        };
        Ok(Expr::VarRef(VarRef::new(name, Some(DataType::Tag))))
    }
}

fn comparison_operator(code: i32) -> Result<BinaryOp> {
    let comparison = Comparison::try_from(code).map_err(|code| TranslateError::UnknownOperator {
        kind: "comparison",
        code,
    })?;
    Ok(match comparison {
        Comparison::Equal => BinaryOp::Eq,
        Comparison::NotEqual => BinaryOp::NotEq,
        Comparison::Regex => BinaryOp::EqRegex,
        Comparison::NotRegex => BinaryOp::NotEqRegex,
        Comparison::Lt => BinaryOp::Lt,
        Comparison::Lte => BinaryOp::Lte,
        Comparison::Gt => BinaryOp::Gt,
        Comparison::Gte => BinaryOp::Gte,
        Comparison::StartsWith => return Err(TranslateError::UnsupportedOperator(comparison)),
    })
}

/// `$` stays untyped and renders as `"$"`; a named field gets a `::field` cast.
fn translate_field_ref(node: &Node) -> Result<Expr> {
    let Some(NodeValue::FieldRefValue(name)) = &node.value else {
        return Err(TranslateError::MissingValue {
            node: NodeType::FieldRef,
            expected: "field name",
        });
    };
    let data_type = (name != FIELD_VALUE).then_some(DataType::Field);
    Ok(Expr::VarRef(VarRef::new(name.as_str(), data_type)))
}

fn translate_literal(node: &Node) -> Result<Literal> {
    let literal = match &node.value {
        Some(NodeValue::StringValue(s)) => Literal::String(s.clone()),
        Some(NodeValue::BoolValue(b)) => Literal::Boolean(*b),
        Some(NodeValue::IntValue(n)) => Literal::Integer(*n),
        Some(NodeValue::UintValue(n)) => Literal::Unsigned(*n),
        // `NaN` and `inf` have no literal syntax; rendered, they would read back as references.
        Some(NodeValue::FloatValue(v)) if !v.is_finite() => {
            return Err(TranslateError::NonFiniteFloat(*v))
        }
        Some(NodeValue::FloatValue(v)) => Literal::Float(*v),
        Some(NodeValue::DurationValue(nanos)) => Literal::Duration(*nanos),
        Some(NodeValue::RegexValue(pattern)) => {
            let re = Regex::new(pattern).map_err(|e| TranslateError::InvalidRegex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            Literal::Regex(RegexLiteral(re))
        }
        Some(
            NodeValue::TagRefValue(_)
            | NodeValue::FieldRefValue(_)
            | NodeValue::Logical(_)
            | NodeValue::Comparison(_),
        )
        | None => {
            return Err(TranslateError::MissingValue {
                node: NodeType::Literal,
                expected: "literal value",
            })
        }
    };
    Ok(literal)
}
