// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::Serialize;

use rule_model::ast::AstPointer;

use crate::error::EvaluationError;

/// The outcome of checking an operation against its rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    /// The rule was false or unknown. The pointer names the clause responsible, and is absent when
    /// the rule is null (superusers only).
    Deny { pointer: Option<AstPointer> },
    /// The rule could not be evaluated. The operation is denied.
    RuleError { kind: RuleErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleErrorKind {
    Parse,
    Resolve,
    Store,
    Canceled,
    NotFound,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// HTTP status a host should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Decision::Allow => 200,
            Decision::Deny { .. } => 403,
            Decision::RuleError { kind, .. } => kind.status_code(),
        }
    }
}

impl RuleErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            RuleErrorKind::Canceled => 503,
            RuleErrorKind::NotFound => 404,
            RuleErrorKind::Parse | RuleErrorKind::Resolve | RuleErrorKind::Store => 500,
        }
    }
}

impl From<&EvaluationError> for RuleErrorKind {
    fn from(error: &EvaluationError) -> Self {
        match error {
            EvaluationError::Canceled => RuleErrorKind::Canceled,
            EvaluationError::Store(_) => RuleErrorKind::Store,
            EvaluationError::Parse(_) => RuleErrorKind::Parse,
            EvaluationError::RecordNotFound { .. } => RuleErrorKind::NotFound,
            EvaluationError::UnknownCollection(_)
            | EvaluationError::UnknownField { .. }
            | EvaluationError::NotTraversable { .. }
            | EvaluationError::InvalidBackRelation { .. }
            | EvaluationError::UnsupportedCrossCollection(_)
            | EvaluationError::NotBoolean(_)
            | EvaluationError::MissingRecord(_) => RuleErrorKind::Resolve,
        }
    }
}

impl From<EvaluationError> for Decision {
    fn from(error: EvaluationError) -> Self {
        Decision::RuleError {
            kind: RuleErrorKind::from(&error),
            message: error.to_string(),
        }
    }
}
