// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Recursive descent over the token stream.
//!
//! Precedence, tightest first: modifiers, `NOT`, comparisons, `&&`, `||`. `&&` and `||` are
//! left-associative; comparisons don't chain.

use common::value::ValNumber;

use crate::{
    ast::{ComparisonOp, Expr, Literal, LogicalOp, Modifier, PathExpr, PathRoot, Segment},
    error::ParseError,
    lexer::{Token, TokenKind, tokenize},
};

/// Parse a rule expression.
///
/// Only syntax is checked here. Whether the fields and collections a rule mentions exist is up to
/// [`crate::validation::validate_rule`].
pub fn compile(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::EmptyExpression);
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        source_len: source.len(),
    };
    let expr = parser.or()?;

    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(unexpected(token)),
    }
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    source_len: usize,
}

fn unexpected(token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        found: token.kind.describe(),
        offset: token.offset,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|token| &token.kind == kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn end_of_input(&self) -> ParseError {
        ParseError::UnexpectedToken {
            found: "end of input".to_string(),
            offset: self.source_len,
        }
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and()?;
            left = Expr::logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;
        while self.eat(&TokenKind::And) {
            let right = self.comparison()?;
            left = Expr::logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.unary()?;

        let op = match self.peek().map(|token| &token.kind) {
            Some(TokenKind::Eq) => ComparisonOp::Eq,
            Some(TokenKind::Neq) => ComparisonOp::Neq,
            Some(TokenKind::Lt) => ComparisonOp::Lt,
            Some(TokenKind::Lte) => ComparisonOp::Lte,
            Some(TokenKind::Gt) => ComparisonOp::Gt,
            Some(TokenKind::Gte) => ComparisonOp::Gte,
            Some(TokenKind::AnyEq) => ComparisonOp::AnyEq,
            Some(TokenKind::AnyNeq) => ComparisonOp::AnyNeq,
            Some(TokenKind::AnyLt) => ComparisonOp::AnyLt,
            Some(TokenKind::AnyLte) => ComparisonOp::AnyLte,
            Some(TokenKind::AnyGt) => ComparisonOp::AnyGt,
            Some(TokenKind::AnyGte) => ComparisonOp::AnyGte,
            _ => return Ok(left),
        };
        self.position += 1;

        let right = self.unary()?;
        Ok(Expr::comparison(op, left, right))
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Ident("NOT".to_string())) {
            Ok(Expr::not(self.unary()?))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance().ok_or_else(|| self.end_of_input())?;

        match token.kind {
            TokenKind::LParen => {
                let inner = self.or()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(Expr::Group(Box::new(inner))),
                    Some(token) => Err(unexpected(&token)),
                    None => Err(self.end_of_input()),
                }
            }
            TokenKind::String { value, quote } => Ok(Expr::Literal(Literal::String { value, quote })),
            TokenKind::Number(raw) => Ok(Expr::Literal(Literal::Number {
                value: parse_number(&raw),
                raw,
            })),
            TokenKind::Ident(ident) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                "null" => Ok(Expr::Literal(Literal::Null)),
                _ => {
                    let mut path = parse_path(&ident, token.offset)?;
                    if let Some(Token {
                        kind: TokenKind::Modifier(name),
                        offset,
                    }) = self.peek().cloned()
                    {
                        self.position += 1;
                        path.modifier = Some(parse_modifier(&path, &name, offset)?);
                    }
                    Ok(Expr::Path(path))
                }
            },
            _ => Err(unexpected(&token)),
        }
    }
}

fn parse_number(raw: &str) -> ValNumber {
    if let Ok(n) = raw.parse::<i64>() {
        ValNumber::I64(n)
    } else if let Ok(n) = raw.trim_start_matches('+').parse::<u64>() {
        ValNumber::U64(n)
    } else {
        // The lexer only produces digits with an optional sign and fraction
        ValNumber::F64(raw.parse::<f64>().unwrap_or(f64::NAN))
    }
}

fn parse_modifier(path: &PathExpr, name: &str, offset: usize) -> Result<Modifier, ParseError> {
    let modifier = Modifier::from_name(name).ok_or_else(|| ParseError::UnknownModifier {
        modifier: name.to_string(),
        offset,
    })?;

    // `:isset` and `:changed` talk about the request body itself, one field at a time
    if matches!(modifier, Modifier::Isset | Modifier::Changed)
        && !(path.root == PathRoot::Body && path.segments.len() == 1)
    {
        return Err(ParseError::ModifierNotApplicable {
            modifier: name.to_string(),
            path: path.to_string(),
            offset,
        });
    }

    Ok(modifier)
}

fn parse_path(ident: &str, offset: usize) -> Result<PathExpr, ParseError> {
    let malformed = || ParseError::MalformedPath {
        path: ident.to_string(),
        offset,
    };

    let parts: Vec<&str> = ident.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(malformed());
    }

    let (root, rest) = match parts.as_slice() {
        ["@request", "auth", rest @ ..] => (PathRoot::Auth, rest),
        ["@request", "body", rest @ ..] => (PathRoot::Body, rest),
        ["@collection", name, rest @ ..] => (PathRoot::Collection(name.to_string()), rest),
        ["@yesterday"] => (PathRoot::Yesterday, &[][..]),
        ["@now"] => (PathRoot::Now, &[][..]),
        [first, ..] if first.starts_with('@') => {
            let name = match parts.as_slice() {
                ["@request", second, ..] => format!("@request.{second}"),
                _ => first.to_string(),
            };
            return Err(ParseError::UnknownContext { name, offset });
        }
        rest => (PathRoot::Record, rest),
    };

    let context_root = !matches!(
        root,
        PathRoot::Record | PathRoot::Yesterday | PathRoot::Now
    );
    if context_root && rest.is_empty() {
        return Err(malformed());
    }

    let segments = rest
        .iter()
        .map(|part| {
            if part.contains('@') {
                return Err(malformed());
            }
            Ok(match part.split_once("_via_") {
                Some((collection, field)) if !collection.is_empty() && !field.is_empty() => {
                    Segment::BackRelation {
                        collection: collection.to_string(),
                        field: field.to_string(),
                    }
                }
                _ => Segment::Field(part.to_string()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PathExpr {
        root,
        segments,
        modifier: None,
    })
}
