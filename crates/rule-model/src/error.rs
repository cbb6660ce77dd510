// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use thiserror::Error;

use crate::collection::Operation;

/// A rule that could not be parsed. Offsets are byte offsets into the rule source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("Unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("Invalid escape sequence '\\{escape}' at offset {offset}")]
    InvalidEscape { escape: char, offset: usize },

    #[error("Unknown modifier ':{modifier}' at offset {offset}")]
    UnknownModifier { modifier: String, offset: usize },

    #[error("Unknown context '{name}' at offset {offset}")]
    UnknownContext { name: String, offset: usize },

    #[error("Malformed path '{path}' at offset {offset}")]
    MalformedPath { path: String, offset: usize },

    #[error("Modifier ':{modifier}' cannot be applied to '{path}' (offset {offset})")]
    ModifierNotApplicable {
        modifier: String,
        path: String,
        offset: usize,
    },

    #[error("Empty rule expression")]
    EmptyExpression,
}

impl ParseError {
    pub fn offset(&self) -> Option<usize> {
        match self {
            ParseError::UnexpectedToken { offset, .. }
            | ParseError::UnterminatedString { offset }
            | ParseError::InvalidEscape { offset, .. }
            | ParseError::UnknownModifier { offset, .. }
            | ParseError::UnknownContext { offset, .. }
            | ParseError::MalformedPath { offset, .. }
            | ParseError::ModifierNotApplicable { offset, .. } => Some(*offset),
            ParseError::EmptyExpression => None,
        }
    }
}

/// A syntactically valid rule that doesn't fit the schema of its collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Collection '{collection}' has no field '{field}'")]
    UnknownField { collection: String, field: String },

    #[error("Field '{field}' of '{collection}' is not a relation and cannot be traversed")]
    NotTraversable { collection: String, field: String },

    #[error("Invalid back-relation '{segment}': {reason}")]
    InvalidBackRelation { segment: String, reason: String },

    #[error("Modifier ':{modifier}' cannot be applied to '{path}': {reason}")]
    ModifierNotApplicable {
        modifier: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported use of '{path}': {reason}")]
    UnsupportedPath { path: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleErrorKind {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A rule rejected when its collection was saved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {op} rule of collection '{collection}': {kind}")]
pub struct RuleParseError {
    pub collection: String,
    pub op: Operation,
    pub kind: RuleErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate collection '{0}'")]
    DuplicateCollection(String),

    #[error("Duplicate field '{field}' in collection '{collection}'")]
    DuplicateField { collection: String, field: String },

    #[error("Relation '{field}' of '{collection}' targets unknown collection '{target}'")]
    UnknownRelationTarget {
        collection: String,
        field: String,
        target: String,
    },

    #[error("Relation '{field}' of '{collection}' has no target collection")]
    MissingRelationTarget { collection: String, field: String },
}
