// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-memory evaluation of row filters.
//!
//! Evaluation is three-valued (Kleene), exactly like SQL: a field missing from the row is
//! unknown (`None`), unknown propagates through comparisons, `AND`/`OR` absorb it when the other
//! side decides the result, and `NOT` leaves it unknown. A row passes a filter only when the
//! filter evaluates to `Some(true)`.

use std::borrow::Cow;

use common::value::{
    Val, eq_values, gt_values, gte_values, lt_values, lte_values, neq_values,
};

use super::{Column, RowFilter};

/// Access to the field values of a row being filtered.
pub trait RowValues {
    /// The value of `field`, or `None` if the row doesn't carry it.
    fn field_value(&self, field: &str) -> Option<Cow<'_, Val>>;
}

impl RowFilter {
    /// Whether `row` passes this filter. Unknown counts as not passing.
    pub fn matches(&self, row: &dyn RowValues) -> bool {
        self.evaluate(row) == Some(true)
    }

    /// Three-valued evaluation against `row`.
    pub fn evaluate(&self, row: &dyn RowValues) -> Option<bool> {
        type ValueFn = fn(&Val, &Val) -> bool;

        let compare = |left: &Column, right: &Column, value_fn: ValueFn| {
            let left = column_value(left, row)?;
            let right = column_value(right, row)?;
            Some(value_fn(&left, &right))
        };

        match self {
            RowFilter::True => Some(true),
            RowFilter::False => Some(false),
            RowFilter::Eq(left, right) => compare(left, right, eq_values),
            RowFilter::Neq(left, right) => compare(left, right, neq_values),
            RowFilter::Lt(left, right) => compare(left, right, lt_values),
            RowFilter::Lte(left, right) => compare(left, right, lte_values),
            RowFilter::Gt(left, right) => compare(left, right, gt_values),
            RowFilter::Gte(left, right) => compare(left, right, gte_values),
            RowFilter::In(left, right) => compare(left, right, |element, list| match list {
                Val::List(values) => values.iter().any(|value| eq_values(element, value)),
                Val::Null => false,
                value => eq_values(element, value),
            }),
            RowFilter::And(left, right) => match left.evaluate(row) {
                Some(false) => Some(false),
                Some(true) => right.evaluate(row),
                None => match right.evaluate(row) {
                    Some(false) => Some(false),
                    _ => None,
                },
            },
            RowFilter::Or(left, right) => match left.evaluate(row) {
                Some(true) => Some(true),
                Some(false) => right.evaluate(row),
                None => match right.evaluate(row) {
                    Some(true) => Some(true),
                    _ => None,
                },
            },
            RowFilter::Not(predicate) => predicate.evaluate(row).map(|value| !value),
        }
    }
}

fn column_value<'a>(column: &'a Column, row: &'a dyn RowValues) -> Option<Cow<'a, Val>> {
    match column {
        Column::Field(name) => row.field_value(name),
        Column::LowerField(name) => row.field_value(name).map(|value| match value.as_ref() {
            Val::String(s) => Cow::Owned(Val::String(s.to_lowercase())),
            _ => value,
        }),
        Column::Param(value) => Some(Cow::Borrowed(value)),
        Column::Null => Some(Cow::Owned(Val::Null)),
    }
}
