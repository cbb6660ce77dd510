// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The rule AST.
//!
//! The `Display` impls serialize an expression back to rule source. Serializing a parsed rule and
//! parsing the result again yields the same tree: quote styles, the raw text of numbers, and
//! explicit parentheses are all kept for that purpose.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use common::value::{Val, ValNumber};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Path(PathExpr),
    Not(Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Comparison(ComparisonOp, Box<Expr>, Box<Expr>),
    /// An explicitly parenthesized expression
    Group(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    AnyEq,
    AnyNeq,
    AnyLt,
    AnyLte,
    AnyGt,
    AnyGte,
}

impl ComparisonOp {
    /// Whether this is one of the `?`-prefixed (existential) operators.
    pub fn is_any(&self) -> bool {
        matches!(
            self,
            ComparisonOp::AnyEq
                | ComparisonOp::AnyNeq
                | ComparisonOp::AnyLt
                | ComparisonOp::AnyLte
                | ComparisonOp::AnyGt
                | ComparisonOp::AnyGte
        )
    }

    /// The element-wise operator, without the `?` prefix.
    pub fn base(&self) -> ComparisonOp {
        match self {
            ComparisonOp::AnyEq => ComparisonOp::Eq,
            ComparisonOp::AnyNeq => ComparisonOp::Neq,
            ComparisonOp::AnyLt => ComparisonOp::Lt,
            ComparisonOp::AnyLte => ComparisonOp::Lte,
            ComparisonOp::AnyGt => ComparisonOp::Gt,
            ComparisonOp::AnyGte => ComparisonOp::Gte,
            op => *op,
        }
    }

    /// The operator to use when the operands trade places (`a < b` is `b > a`).
    pub fn flip(&self) -> ComparisonOp {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Lte => ComparisonOp::Gte,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Gte => ComparisonOp::Lte,
            ComparisonOp::AnyLt => ComparisonOp::AnyGt,
            ComparisonOp::AnyLte => ComparisonOp::AnyGte,
            ComparisonOp::AnyGt => ComparisonOp::AnyLt,
            ComparisonOp::AnyGte => ComparisonOp::AnyLte,
            op => *op,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Neq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::AnyEq => "?=",
            ComparisonOp::AnyNeq => "?!=",
            ComparisonOp::AnyLt => "?<",
            ComparisonOp::AnyLte => "?<=",
            ComparisonOp::AnyGt => "?>",
            ComparisonOp::AnyGte => "?>=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
}

impl Quote {
    fn char(&self) -> char {
        match self {
            Quote::Double => '"',
            Quote::Single => '\'',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String { value: String, quote: Quote },
    /// A number, along with its source text
    Number { value: ValNumber, raw: String },
    Bool(bool),
    Null,
}

impl Literal {
    pub fn to_val(&self) -> Val {
        match self {
            Literal::String { value, .. } => Val::String(value.clone()),
            Literal::Number { value, .. } => Val::Number(value.clone()),
            Literal::Bool(b) => Val::Bool(*b),
            Literal::Null => Val::Null,
        }
    }
}

/// Where a path starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRoot {
    /// The record under test (or, on create, the record being proposed)
    Record,
    /// `@request.auth`
    Auth,
    /// `@request.body`
    Body,
    /// `@collection.<name>`
    Collection(String),
    /// `@yesterday`
    Yesterday,
    /// `@now`
    Now,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A field, possibly a relation to follow
    Field(String),
    /// `<collection>_via_<field>`: the records of `collection` whose `field` points back at the
    /// current record
    BackRelation { collection: String, field: String },
}

impl Segment {
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Segment::Field(name) => Some(name),
            Segment::BackRelation { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Isset,
    Changed,
    Length,
    Each,
    Lower,
}

impl Modifier {
    pub fn from_name(name: &str) -> Option<Modifier> {
        match name {
            "isset" => Some(Modifier::Isset),
            "changed" => Some(Modifier::Changed),
            "length" => Some(Modifier::Length),
            "each" => Some(Modifier::Each),
            "lower" => Some(Modifier::Lower),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Modifier::Isset => "isset",
            Modifier::Changed => "changed",
            Modifier::Length => "length",
            Modifier::Each => "each",
            Modifier::Lower => "lower",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub root: PathRoot,
    pub segments: Vec<Segment>,
    pub modifier: Option<Modifier>,
}

impl PathExpr {
    pub fn record(segments: Vec<Segment>) -> Self {
        PathExpr {
            root: PathRoot::Record,
            segments,
            modifier: None,
        }
    }
}

/// Identifies a node of a rule: the child indices to follow from the root (left operand is `0`,
/// right operand `1`, the operand of `NOT` or of a group `0`), plus the clause's source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AstPointer {
    pub path: Vec<usize>,
    pub clause: String,
}

impl Expr {
    pub fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
        Expr::Logical(op, Box::new(left), Box::new(right))
    }

    pub fn comparison(op: ComparisonOp, left: Expr, right: Expr) -> Expr {
        Expr::Comparison(op, Box::new(left), Box::new(right))
    }

    /// The node reached by following `path` from this one.
    pub fn node_at(&self, path: &[usize]) -> Option<&Expr> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        let child = match (self, *first) {
            (Expr::Not(inner), 0) | (Expr::Group(inner), 0) => inner,
            (Expr::Logical(_, left, _), 0) | (Expr::Comparison(_, left, _), 0) => left,
            (Expr::Logical(_, _, right), 1) | (Expr::Comparison(_, _, right), 1) => right,
            _ => return None,
        };

        child.node_at(rest)
    }

    /// Visit every path in this expression, left to right.
    pub fn paths(&self) -> Vec<&PathExpr> {
        fn collect<'a>(expr: &'a Expr, acc: &mut Vec<&'a PathExpr>) {
            match expr {
                Expr::Literal(_) => {}
                Expr::Path(path) => acc.push(path),
                Expr::Not(inner) | Expr::Group(inner) => collect(inner, acc),
                Expr::Logical(_, left, right) | Expr::Comparison(_, left, right) => {
                    collect(left, acc);
                    collect(right, acc);
                }
            }
        }

        let mut acc = vec![];
        collect(self, &mut acc);
        acc
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Path(path) => write!(f, "{path}"),
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::Logical(op, left, right) => {
                let op = match op {
                    LogicalOp::And => "&&",
                    LogicalOp::Or => "||",
                };
                write!(f, "{left} {op} {right}")
            }
            Expr::Comparison(op, left, right) => write!(f, "{left} {} {right}", op.symbol()),
            Expr::Group(inner) => write!(f, "({inner})"),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::String { value, quote } => {
                let quote = quote.char();
                write!(f, "{quote}")?;
                for c in value.chars() {
                    if c == quote || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "{quote}")
            }
            Literal::Number { raw, .. } => write!(f, "{raw}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl Display for PathExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = match &self.root {
            PathRoot::Record => vec![],
            PathRoot::Auth => vec!["@request".into(), "auth".into()],
            PathRoot::Body => vec!["@request".into(), "body".into()],
            PathRoot::Collection(name) => vec!["@collection".into(), name.clone()],
            PathRoot::Yesterday => vec!["@yesterday".into()],
            PathRoot::Now => vec!["@now".into()],
        };
        parts.extend(self.segments.iter().map(ToString::to_string));

        write!(f, "{}", parts.join("."))?;
        if let Some(modifier) = self.modifier {
            write!(f, ":{}", modifier.name())?;
        }
        Ok(())
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{name}"),
            Segment::BackRelation { collection, field } => write!(f, "{collection}_via_{field}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Expr {
        Expr::Path(PathExpr::record(vec![Segment::Field(name.into())]))
    }

    fn string(value: &str, quote: Quote) -> Expr {
        Expr::Literal(Literal::String {
            value: value.into(),
            quote,
        })
    }

    #[test]
    fn strings_keep_their_quotes() {
        assert_eq!(string("it's", Quote::Double).to_string(), r#""it's""#);
        assert_eq!(string("it's", Quote::Single).to_string(), r"'it\'s'");
        assert_eq!(string(r"a\b", Quote::Double).to_string(), r#""a\\b""#);
    }

    #[test]
    fn paths() {
        let path = PathExpr {
            root: PathRoot::Auth,
            segments: vec![
                Segment::BackRelation {
                    collection: "user_claims".into(),
                    field: "uid".into(),
                },
                Segment::Field("cid".into()),
            ],
            modifier: Some(Modifier::Each),
        };
        assert_eq!(path.to_string(), "@request.auth.user_claims_via_uid.cid:each");

        let path = PathExpr {
            root: PathRoot::Yesterday,
            segments: vec![],
            modifier: None,
        };
        assert_eq!(path.to_string(), "@yesterday");
    }

    #[test]
    fn node_at_follows_child_indices() {
        // uid = "u1" || NOT (manager = "u1")
        let left = Expr::comparison(ComparisonOp::Eq, field("uid"), string("u1", Quote::Double));
        let right = Expr::not(Expr::Group(Box::new(Expr::comparison(
            ComparisonOp::Eq,
            field("manager"),
            string("u1", Quote::Double),
        ))));
        let expr = Expr::logical(LogicalOp::Or, left.clone(), right);

        assert_eq!(expr.node_at(&[]), Some(&expr));
        assert_eq!(expr.node_at(&[0]), Some(&left));
        assert_eq!(
            expr.node_at(&[1, 0, 0]).map(ToString::to_string),
            Some(r#"manager = "u1""#.to_string())
        );
        assert_eq!(expr.node_at(&[0, 2]), None);
        assert_eq!(expr.paths().len(), 2);
    }

    #[test]
    fn operator_helpers() {
        assert!(ComparisonOp::AnyLte.is_any());
        assert!(!ComparisonOp::Lte.is_any());
        assert_eq!(ComparisonOp::AnyLte.base(), ComparisonOp::Lte);
        assert_eq!(ComparisonOp::AnyLt.flip(), ComparisonOp::AnyGt);
        assert_eq!(ComparisonOp::Neq.flip(), ComparisonOp::Neq);
    }
}
