// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use common::value::{
    Val, ValNumber, eq_values, gt_values, gte_values, lt_values, lte_values, neq_values,
};
use rule_model::ast::ComparisonOp;

/// The value of a path or literal once bound to the evaluation context.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Scalar(Val),
    /// Values collected across a multi-valued field, a multi-relation or a back-relation.
    /// Records without the field contribute `null`.
    Set(Vec<Val>),
    /// Not knowable: an unset optional relation, a dangling reference, a missing field
    Unknown,
}

impl Resolved {
    /// A stored value, where lists become sets.
    pub fn from_value(value: Val) -> Self {
        match value {
            Val::List(values) => Resolved::Set(values),
            value => Resolved::Scalar(value),
        }
    }

    pub fn length(self) -> Resolved {
        let length = match self {
            Resolved::Set(values) => values.len(),
            Resolved::Scalar(Val::Null) => 0,
            Resolved::Scalar(_) => 1,
            Resolved::Unknown => return Resolved::Unknown,
        };
        Resolved::Scalar(Val::Number(ValNumber::U64(length as u64)))
    }

    pub fn lowercase(self) -> Resolved {
        fn lower(value: Val) -> Val {
            match value {
                Val::String(s) => Val::String(s.to_lowercase()),
                value => value,
            }
        }

        match self {
            Resolved::Scalar(value) => Resolved::Scalar(lower(value)),
            Resolved::Set(values) => Resolved::Set(values.into_iter().map(lower).collect()),
            Resolved::Unknown => Resolved::Unknown,
        }
    }
}

/// Three-valued (Kleene) truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub fn is_true(self) -> bool {
        self == Truth::True
    }

    pub fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    pub fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }
}

impl std::ops::Not for Truth {
    type Output = Truth;

    fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }
}

impl From<bool> for Truth {
    fn from(value: bool) -> Self {
        if value { Truth::True } else { Truth::False }
    }
}

impl From<Truth> for Resolved {
    fn from(truth: Truth) -> Self {
        match truth {
            Truth::True => Resolved::Scalar(Val::Bool(true)),
            Truth::False => Resolved::Scalar(Val::Bool(false)),
            Truth::Unknown => Resolved::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Quantifier {
    Any,
    All,
}

/// One side of a comparison: its value, and whether `:each` asked for universal quantification.
#[derive(Debug, Clone)]
pub(crate) struct Operand {
    pub value: Resolved,
    pub each: bool,
}

impl Operand {
    pub fn new(value: Resolved) -> Self {
        Operand { value, each: false }
    }

    /// The elements to compare and how to quantify over them, or `None` if the operand is
    /// unknown.
    ///
    /// `:each` is universal; the `?` operators are existential; otherwise a set is compared
    /// element-wise and universally, with an empty set standing for `null`.
    pub fn elements(&self, op: ComparisonOp) -> Option<(Quantifier, Vec<Val>)> {
        match &self.value {
            Resolved::Unknown => None,
            Resolved::Scalar(value) => Some((Quantifier::Any, vec![value.clone()])),
            Resolved::Set(values) if self.each => Some((Quantifier::All, values.clone())),
            Resolved::Set(values) if op.is_any() => Some((Quantifier::Any, values.clone())),
            Resolved::Set(values) if values.is_empty() => Some((Quantifier::All, vec![Val::Null])),
            Resolved::Set(values) => Some((Quantifier::All, values.clone())),
        }
    }
}

/// `left op right` for single values. `op` may be a `?` operator, which compares like its base.
pub(crate) fn compare_scalars(op: ComparisonOp, left: &Val, right: &Val) -> bool {
    match op.base() {
        ComparisonOp::Eq => eq_values(left, right),
        ComparisonOp::Neq => neq_values(left, right),
        ComparisonOp::Lt => lt_values(left, right),
        ComparisonOp::Lte => lte_values(left, right),
        ComparisonOp::Gt => gt_values(left, right),
        _ => gte_values(left, right),
    }
}

/// Compare two operands. The left operand's quantifier is the outer one.
pub(crate) fn compare(op: ComparisonOp, left: &Operand, right: &Operand) -> Truth {
    let (Some((left_quantifier, left_values)), Some((right_quantifier, right_values))) =
        (left.elements(op), right.elements(op))
    else {
        return Truth::Unknown;
    };

    let inner = |x: &Val| quantify(right_quantifier, &right_values, |y| compare_scalars(op, x, y));
    quantify(left_quantifier, &left_values, inner).into()
}

fn quantify(quantifier: Quantifier, values: &[Val], predicate: impl Fn(&Val) -> bool) -> bool {
    match quantifier {
        Quantifier::Any => values.iter().any(predicate),
        Quantifier::All => values.iter().all(predicate),
    }
}
