//! Lexer for predicate expressions.

use std::borrow::Cow;

use crate::ast::DURATION_UNITS;
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// Current position in the input (byte index).
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if pred(c) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        self.eat_while(char::is_whitespace);
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    /// Reads up to the closing `quote`; the opening one was consumed by the caller.
    ///
    /// `\\` and `\<quote>` unescape to the character, `\n` to a newline. For
    /// regexes only `\/` is unescaped, other escapes belong to the pattern.
    /// Returns `None` when the input ends before the closing quote.
    fn read_quoted(&mut self, quote: char, is_regex: bool) -> Option<Cow<'a, str>> {
        let content_start = self.position;
        let mut owned: Option<String> = None;

        loop {
            let before = self.position;
            let c = self.bump()?;
            if c == quote {
                return Some(match owned {
                    Some(s) => Cow::Owned(s),
                    None => Cow::Borrowed(&self.input[content_start..before]),
                });
            }
            if c != '\\' {
                if let Some(s) = owned.as_mut() {
                    s.push(c);
                }
                continue;
            }

            let escaped = self.bump()?;
            let buf = owned.get_or_insert_with(|| self.input[content_start..before].to_string());
            match escaped {
                e if e == quote => buf.push(e),
                '\\' if !is_regex => buf.push('\\'),
                'n' if !is_regex => buf.push('\n'),
                e => {
                    buf.push('\\');
                    buf.push(e);
                }
            }
        }
    }

    /// Reads an integer, float or duration literal starting at `start`.
    fn read_number(&mut self, start: usize) -> Token<'a> {
        let mut is_float = false;
        self.eat_while(|c| c.is_ascii_digit());

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
            is_float = true;
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let mut rest = self.input[self.position..].chars().skip(1);
            let has_exponent = match rest.next() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => rest.next().is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if has_exponent {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.eat_while(|c| c.is_ascii_digit());
                is_float = true;
            }
        }

        let text = &self.input[start..self.position];
        if is_float {
            let kind = text.parse::<f64>().map_or(TokenKind::Illegal, TokenKind::Number);
            return self.token(kind, start);
        }

        if self.peek().is_some_and(|c| c.is_alphabetic()) {
            let suffix_start = self.position;
            self.eat_while(char::is_alphabetic);
            let suffix = &self.input[suffix_start..self.position];
            let unit = match suffix {
                "µ" => Some(1_000),
                _ => DURATION_UNITS
                    .iter()
                    .find(|(name, _)| *name == suffix)
                    .map(|(_, unit)| *unit),
            };
            let kind = unit
                .zip(text.parse::<i64>().ok())
                .and_then(|(unit, n)| n.checked_mul(unit))
                .map_or(TokenKind::Illegal, TokenKind::Duration);
            return self.token(kind, start);
        }

        let kind = match text.parse::<i64>() {
            Ok(n) => TokenKind::Integer(n),
            Err(_) => text.parse::<u64>().map_or(TokenKind::Illegal, TokenKind::Unsigned),
        };
        self.token(kind, start)
    }

    /// Reads an identifier or keyword. Keywords are case-insensitive.
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let literal = &self.input[start..self.position];
        self.token(match_keyword(literal), start)
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Identifier(Cow::Borrowed(s)),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '-' => TokenKind::Minus,
            ':' => {
                if self.peek() == Some(':') {
                    self.bump();
                    TokenKind::DoubleColon
                } else {
                    TokenKind::Illegal
                }
            }
            '=' => {
                if self.peek() == Some('~') {
                    self.bump();
                    TokenKind::EqRegex
                } else {
                    TokenKind::Eq
                }
            }
            '!' => match self.peek() {
                Some('=') => {
                    self.bump();
                    TokenKind::NotEq
                }
                Some('~') => {
                    self.bump();
                    TokenKind::NotEqRegex
                }
                _ => TokenKind::Illegal,
            },
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    TokenKind::Lte
                }
                Some('>') => {
                    self.bump();
                    TokenKind::NotEq
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Gte
                } else {
                    TokenKind::Gt
                }
            }
            '\'' => self.read_quoted('\'', false).map_or(TokenKind::Illegal, TokenKind::String),
            '"' => self.read_quoted('"', false).map_or(TokenKind::Illegal, TokenKind::Identifier),
            '/' => self.read_quoted('/', true).map_or(TokenKind::Illegal, TokenKind::Regex),
            c if c.is_ascii_digit() => return Some(self.read_number(start)),
            c if c.is_ascii_alphabetic() || c == '_' => return Some(self.read_identifier(start)),
            _ => TokenKind::Illegal,
        };
        Some(self.token(kind, start))
    }
}
