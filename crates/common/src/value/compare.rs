// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Scalar comparisons shared by the rule evaluator and the in-memory store's row filters.
//!
//! Both sides of the list pushdown must agree on these exactly, so they live in one place.
//! Equality is strict by type (numbers compare numerically across representations). Ordering is
//! only defined between two numbers, two strings, or two booleans; everything else (including
//! `null`) is unordered and every ordering comparison on it is false.

use std::cmp::Ordering;

use super::Val;

pub fn eq_values(left: &Val, right: &Val) -> bool {
    match (left, right) {
        (Val::Number(left), Val::Number(right)) => left.partial_cmp(right) == Some(Ordering::Equal),
        (Val::List(left), Val::List(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| eq_values(l, r))
        }
        (Val::Object(left), Val::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(k, l)| right.get(k).is_some_and(|r| eq_values(l, r)))
        }
        (left, right) => left == right,
    }
}

pub fn neq_values(left: &Val, right: &Val) -> bool {
    !eq_values(left, right)
}

/// Ordering between two scalars, `None` if they are not comparable.
pub fn compare_values(left: &Val, right: &Val) -> Option<Ordering> {
    match (left, right) {
        (Val::Number(left), Val::Number(right)) => left.partial_cmp(right),
        (Val::String(left), Val::String(right)) => Some(left.cmp(right)),
        (Val::Bool(left), Val::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

pub fn lt_values(left: &Val, right: &Val) -> bool {
    compare_values(left, right) == Some(Ordering::Less)
}

pub fn lte_values(left: &Val, right: &Val) -> bool {
    matches!(
        compare_values(left, right),
        Some(Ordering::Less | Ordering::Equal)
    )
}

pub fn gt_values(left: &Val, right: &Val) -> bool {
    compare_values(left, right) == Some(Ordering::Greater)
}

pub fn gte_values(left: &Val, right: &Val) -> bool {
    matches!(
        compare_values(left, right),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_strict_by_type() {
        assert!(eq_values(&Val::from(1i64), &Val::from(1.0)));
        assert!(!eq_values(&Val::from("1"), &Val::from(1i64)));
        assert!(eq_values(&Val::Null, &Val::Null));
        assert!(!eq_values(&Val::Null, &Val::from("")));
        assert!(neq_values(&Val::Null, &Val::from("c1")));
    }

    #[test]
    fn ordering_requires_matching_types() {
        assert!(lt_values(&Val::from(4000i64), &Val::from(5000.0)));
        assert!(lte_values(&Val::from(5000i64), &Val::from(5000i64)));
        assert!(lt_values(
            &Val::from("2025-01-08T00:00:00Z"),
            &Val::from("2025-01-09T12:00:00.000Z")
        ));
        assert!(!gt_values(&Val::from("9"), &Val::from(1i64)));
        assert!(!lt_values(&Val::Null, &Val::from(1i64)));
        assert!(!gte_values(&Val::Null, &Val::Null));
    }
}
