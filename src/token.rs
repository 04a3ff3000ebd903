//! The token definition for the predicate expression language.

use std::borrow::Cow;

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    And,   // "AND"
    Or,    // "OR"
    True,  // "TRUE"
    False, // "FALSE"

    // Literals
    /// Bare or double-quoted identifier, unescaped.
    Identifier(Cow<'a, str>),
    /// Single-quoted string, unescaped.
    String(Cow<'a, str>),
    /// Regex pattern between slashes, with `\/` unescaped.
    Regex(Cow<'a, str>),
    Integer(i64),
    /// Integer too large for `i64`.
    Unsigned(u64),
    Number(f64),
    /// Duration in nanoseconds.
    Duration(i64),

    // Punctuation
    LParen,      // (
    RParen,      // )
    DoubleColon, // ::
    Minus,       // -

    // Operators
    Eq,         // =
    NotEq,      // != or <>
    EqRegex,    // =~
    NotEqRegex, // !~
    Lt,         // <
    Lte,        // <=
    Gt,         // >
    Gte,        // >=

    // Special
    Illegal, // An illegal/unknown character or malformed literal
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
