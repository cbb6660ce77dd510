// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use common::value::Val;

use super::{ExpressionBuilder, ParamEquality, SQLBuilder};

/// A column-like concept covering any usage where a collection field could be used in a filter.
/// For example, in `manager = 'u1'` or `manager = uid`, `manager`, `uid`, and `'u1'` all serve as
/// columns from our perspective.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// A field of the row being filtered
    Field(String),
    /// A field of the row, lower-cased (`LOWER("name")`)
    LowerField(String),
    /// A literal value such as a string or number. This will be mapped to a placeholder to avoid
    /// SQL injection.
    Param(Val),
    /// A null value
    Null,
}

impl Column {
    pub fn field(name: impl Into<String>) -> Self {
        Column::Field(name.into())
    }

    /// A literal column. `null` becomes [`Column::Null`] so that comparisons against it render as
    /// `IS NULL`/`IS NOT NULL`.
    pub fn literal(value: Val) -> Self {
        match value {
            Val::Null => Column::Null,
            value => Column::Param(value),
        }
    }
}

impl ParamEquality for Column {
    fn param_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (Column::Param(v1), Column::Param(v2)) => Some(common::value::eq_values(v1, v2)),
            (Column::Null, Column::Null) => Some(true),
            (Column::Param(_), Column::Null) | (Column::Null, Column::Param(_)) => Some(false),
            _ => None,
        }
    }
}

impl ExpressionBuilder for Column {
    fn build(&self, builder: &mut SQLBuilder) {
        match self {
            Column::Field(name) => builder.push_identifier(name),
            Column::LowerField(name) => {
                builder.push_str("LOWER(");
                builder.push_identifier(name);
                builder.push(')');
            }
            Column::Param(value) => builder.push_param(value.clone()),
            Column::Null => builder.push_str("NULL"),
        }
    }
}
