//! Parser for predicate expressions.
//!
//! ## Parse flow
//!
//! ```text
//! parse()
//!   └─ parse_or_expression()
//!        ├─ parse_and_expression()
//!        │    ├─ parse_comparison_expression()
//!        │    │    ├─ parse_primary_expression()
//!        │    │    │    ├─ "(" → grouped expression (recursive parse_or_expression)
//!        │    │    │    ├─ identifier ["::" tag|field] → variable reference
//!        │    │    │    ├─ "-" → negative number / duration
//!        │    │    │    └─ literal → string / number / duration / regex / boolean
//!        │    │    │
//!        │    │    └─ on a comparison operator, parse the right-hand primary
//!        │    │
//!        │    └─ on AND, parse the next comparison
//!        │
//!        └─ on OR, parse the next AND expression
//! ```
//!
//! ## Precedence (high to low)
//!
//! 1. **Grouping** `(expression)`
//! 2. **Comparison** `=`, `!=`, `<>`, `=~`, `!~`, `<`, `<=`, `>`, `>=`
//! 3. **AND**
//! 4. **OR**
//!
//! All binary operators are left-associative, matching how
//! [`crate::ast::Expr`] renders chains.

use regex::Regex;

use crate::ast::{BinaryOp, DataType, Expr, Literal, RegexLiteral, VarRef};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self {
            message,
            span: Some(span),
        }
    }
}

/// Tokenizes and parses a complete expression.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    Parser::new(&tokens).parse()
}

fn comparison_operator(kind: &TokenKind<'_>) -> Option<BinaryOp> {
    match kind {
        TokenKind::Eq => Some(BinaryOp::Eq),
        TokenKind::NotEq => Some(BinaryOp::NotEq),
        TokenKind::EqRegex => Some(BinaryOp::EqRegex),
        TokenKind::NotEqRegex => Some(BinaryOp::NotEqRegex),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::Lte => Some(BinaryOp::Lte),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::Gte => Some(BinaryOp::Gte),
        _ => None,
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Returns the current token without advancing.
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// Consumes a token of the expected kind, or fails.
    fn expect(&mut self, expected: TokenKind<'_>) -> Result<&'a Token<'a>, ParseError> {
        match self.peek() {
            Some(token)
                if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) =>
            {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    fn match_token(&self, kind: &TokenKind<'_>) -> bool {
        self.peek()
            .is_some_and(|token| std::mem::discriminant(&token.kind) == std::mem::discriminant(kind))
    }

    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or_expression()?;
        if let Some(token) = self.peek() {
            return Err(ParseError::at_position(
                format!("Unexpected token: {:?}", token.kind),
                token.span,
            ));
        }
        Ok(expr)
    }

    /// `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expression()?;

        while self.match_token(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and_expression()?;
            left = Expr::or(left, right);
        }

        Ok(left)
    }

    /// `comparison (AND comparison)*`
    fn parse_and_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison_expression()?;

        while self.match_token(&TokenKind::And) {
            self.advance();
            let right = self.parse_comparison_expression()?;
            left = Expr::and(left, right);
        }

        Ok(left)
    }

    /// `primary (op primary)*`
    fn parse_comparison_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary_expression()?;

        while let Some(op) = self.peek().and_then(|token| comparison_operator(&token.kind)) {
            self.advance();
            let right = self.parse_primary_expression()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_primary_expression(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Unexpected end of input".to_string(), None));
        };

        let expr = match &token.kind {
            TokenKind::LParen => {
                let inner = self.parse_or_expression()?;
                self.expect(TokenKind::RParen)?;
                Expr::paren(inner)
            }
            TokenKind::Identifier(name) => {
                let data_type = if self.match_token(&TokenKind::DoubleColon) {
                    self.advance();
                    Some(self.parse_data_type()?)
                } else {
                    None
                };
                Expr::VarRef(VarRef::new(name.to_string(), data_type))
            }
            TokenKind::String(s) => Expr::string(s.to_string()),
            TokenKind::Regex(pattern) => {
                let re = Regex::new(pattern).map_err(|e| {
                    ParseError::at_position(format!("Invalid regex /{pattern}/: {e}"), token.span)
                })?;
                Expr::Literal(Literal::Regex(RegexLiteral(re)))
            }
            TokenKind::Integer(n) => Expr::Literal(Literal::Integer(*n)),
            TokenKind::Unsigned(n) => Expr::Literal(Literal::Unsigned(*n)),
            TokenKind::Number(v) => Expr::Literal(Literal::Float(*v)),
            TokenKind::Duration(d) => Expr::Literal(Literal::Duration(*d)),
            TokenKind::True => Expr::boolean(true),
            TokenKind::False => Expr::boolean(false),
            TokenKind::Minus => self.parse_negative_literal(token.span)?,
            other => {
                return Err(ParseError::at_position(
                    format!("Expected expression, found {:?}", other),
                    token.span,
                ))
            }
        };

        Ok(expr)
    }

    /// Type cast after `::`.
    fn parse_data_type(&mut self) -> Result<DataType, ParseError> {
        let token = self.expect(TokenKind::Identifier("".into()))?;
        match &token.kind {
            TokenKind::Identifier(name) if name.eq_ignore_ascii_case("tag") => Ok(DataType::Tag),
            TokenKind::Identifier(name) if name.eq_ignore_ascii_case("field") => Ok(DataType::Field),
            other => Err(ParseError::at_position(
                format!("Unknown type cast {:?}", other),
                token.span,
            )),
        }
    }

    fn parse_negative_literal(&mut self, minus: Span) -> Result<Expr, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::at_position(
                "Expected number after '-'".to_string(),
                minus,
            ));
        };

        let literal = match token.kind {
            TokenKind::Integer(n) => Literal::Integer(-n),
            TokenKind::Unsigned(n) if n == i64::MIN.unsigned_abs() => Literal::Integer(i64::MIN),
            TokenKind::Number(v) => Literal::Float(-v),
            TokenKind::Duration(d) => Literal::Duration(-d),
            ref other => {
                return Err(ParseError::at_position(
                    format!("Expected number after '-', found {:?}", other),
                    token.span,
                ))
            }
        };
        Ok(Expr::Literal(literal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, lhs, rhs)
    }

    #[test]
    fn test_simple_comparison() {
        let expr = parse_expr("_name = 'm0'").unwrap();
        assert_eq!(expr, eq(Expr::var_ref("_name"), Expr::string("m0")));
    }

    #[test]
    fn test_type_casts() {
        let expr = parse_expr("host::tag = 'a' AND usage::field > 1").unwrap();
        let Expr::Binary(and) = &expr else {
            panic!("Expected AND");
        };
        assert_eq!(and.op, BinaryOp::And);
        let Expr::Binary(lhs) = and.lhs.as_ref() else {
            panic!("Expected comparison on left side");
        };
        assert_eq!(*lhs.lhs, Expr::tag_ref("host"));
        let Expr::Binary(rhs) = and.rhs.as_ref() else {
            panic!("Expected comparison on right side");
        };
        assert_eq!(
            *rhs.lhs,
            Expr::VarRef(VarRef::new("usage", Some(DataType::Field)))
        );
        assert_eq!(*rhs.rhs, Expr::Literal(Literal::Integer(1)));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_expr("a = '1' AND b = '2' OR c = '3'").unwrap();
        let Expr::Binary(or) = &expr else {
            panic!("Expected OR at the root");
        };
        assert_eq!(or.op, BinaryOp::Or);
        assert!(matches!(or.lhs.as_ref(), Expr::Binary(b) if b.op == BinaryOp::And));
    }

    #[test]
    fn test_chains_are_left_associative() {
        let expr = parse_expr("a = '1' AND b = '2' AND c = '3'").unwrap();
        let Expr::Binary(root) = &expr else {
            panic!("Expected AND at the root");
        };
        assert!(matches!(root.lhs.as_ref(), Expr::Binary(b) if b.op == BinaryOp::And));
        assert!(matches!(root.rhs.as_ref(), Expr::Binary(b) if b.op == BinaryOp::Eq));
    }

    #[test]
    fn test_grouping_is_kept() {
        let expr = parse_expr("_name = 'm0' AND (tag1 != 'foo' OR tag2 = 'other')").unwrap();
        let Expr::Binary(root) = &expr else {
            panic!("Expected AND at the root");
        };
        assert!(matches!(root.rhs.as_ref(), Expr::Paren(inner) if matches!(inner.as_ref(), Expr::Binary(b) if b.op == BinaryOp::Or)));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expr("-0.5").unwrap(), Expr::Literal(Literal::Float(-0.5)));
        assert_eq!(parse_expr("-3").unwrap(), Expr::Literal(Literal::Integer(-3)));
        assert_eq!(
            parse_expr("-9223372036854775808").unwrap(),
            Expr::Literal(Literal::Integer(i64::MIN))
        );
        assert_eq!(parse_expr("10m").unwrap(), Expr::Literal(Literal::Duration(600_000_000_000)));
        assert_eq!(parse_expr("TRUE").unwrap(), Expr::boolean(true));
        assert_eq!(parse_expr(r#""$""#).unwrap(), Expr::var_ref("$"));
    }

    #[test]
    fn test_render_round_trip() {
        let inputs = [
            "host::tag = 'host1' AND _field::tag =~ /^us-west/ AND \"$\" = 0.5",
            "_name = 'm0' AND (tag1 != 'foo' OR tag2 = 'other')",
            "a = '1' AND (b = '2' AND c = '3')",
            "cpu::field >= -1.5 OR t < 5s",
            "(tag1 != 'foo' OR tag2 = 'other') OR _name = 'm0'",
            "region::tag !~ /a\\/b/",
        ];
        for input in inputs {
            let expr = parse_expr(input).unwrap();
            assert_eq!(expr.to_string(), input);
            assert_eq!(parse_expr(&expr.to_string()).unwrap(), expr);
        }
    }

    #[test]
    fn test_errors() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("a = ").is_err());
        assert!(parse_expr("(a = 'b'").is_err());
        assert!(parse_expr("a = 'b')").is_err());
        assert!(parse_expr("a::measurement = 'b'").is_err());
        assert!(parse_expr("a =~ /(/").is_err());

        let err = parse_expr("a = 'b' c").unwrap_err();
        assert_eq!(err.span, Some(Span::new(8, 9)));
    }
}
