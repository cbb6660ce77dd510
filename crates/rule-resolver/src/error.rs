// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use rule_model::{collection::Operation, error::ParseError};
use thiserror::Error;

use crate::store::StoreError;

/// Failures while evaluating a rule. A rule that merely evaluates to false or unknown is not an
/// error.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Collection '{collection}' has no field '{field}'")]
    UnknownField { collection: String, field: String },

    #[error("Field '{field}' of '{collection}' is not a relation and cannot be traversed")]
    NotTraversable { collection: String, field: String },

    #[error("Invalid back-relation '{segment}': {reason}")]
    InvalidBackRelation { segment: String, reason: String },

    #[error("'{0}' may only be used as one side of a comparison on a single field")]
    UnsupportedCrossCollection(String),

    #[error("'{0}' does not evaluate to a boolean")]
    NotBoolean(String),

    #[error("A {0} rule needs the record it applies to")]
    MissingRecord(Operation),

    #[error("Record '{id}' not found in '{collection}'")]
    RecordNotFound { collection: String, id: String },

    #[error("Rule evaluation canceled: deadline expired")]
    Canceled,

    #[error("Invalid rule: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
