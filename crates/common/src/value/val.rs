// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{cmp::Ordering, collections::HashMap, fmt::Display};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ValNumber {
    I64(i64),
    U64(u64),
    F64(f64),
}

impl ValNumber {
    pub fn as_f64(&self) -> f64 {
        match self {
            ValNumber::I64(n) => *n as f64,
            ValNumber::U64(n) => *n as f64,
            ValNumber::F64(n) => *n,
        }
    }
}

impl Display for ValNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValNumber::I64(n) => write!(f, "{n}"),
            ValNumber::U64(n) => write!(f, "{n}"),
            ValNumber::F64(n) => write!(f, "{n}"),
        }
    }
}

impl From<serde_json::Number> for ValNumber {
    fn from(value: serde_json::Number) -> Self {
        if let Some(n) = value.as_i64() {
            ValNumber::I64(n)
        } else if let Some(n) = value.as_u64() {
            ValNumber::U64(n)
        } else {
            ValNumber::F64(value.as_f64().unwrap_or(f64::NAN))
        }
    }
}

impl From<i64> for ValNumber {
    fn from(value: i64) -> Self {
        ValNumber::I64(value)
    }
}

impl From<u64> for ValNumber {
    fn from(value: u64) -> Self {
        ValNumber::U64(value)
    }
}

impl From<f64> for ValNumber {
    fn from(value: f64) -> Self {
        ValNumber::F64(value)
    }
}

/// Partial ordering across representations so that `1`, `1u64` and `1.0` compare equal.
impl PartialOrd for ValNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ValNumber::I64(left), ValNumber::I64(right)) => Some(left.cmp(right)),
            (ValNumber::U64(left), ValNumber::U64(right)) => Some(left.cmp(right)),
            (ValNumber::I64(left), ValNumber::U64(right)) => Some(compare_i64_u64(*left, *right)),
            (ValNumber::U64(left), ValNumber::I64(right)) => {
                Some(compare_i64_u64(*right, *left).reverse())
            }
            (left, right) => left.as_f64().partial_cmp(&right.as_f64()),
        }
    }
}

fn compare_i64_u64(left: i64, right: u64) -> Ordering {
    match u64::try_from(left) {
        Ok(left) => left.cmp(&right),
        Err(_) => Ordering::Less,
    }
}

/// A value stored in a record field, supplied in a request body, or bound to a rule literal.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Val {
    Bool(bool),
    Number(ValNumber),
    String(String),
    List(Vec<Val>),
    Object(HashMap<String, Val>),
    Null,
}

impl Val {
    pub fn get(&self, key: &str) -> Option<&Val> {
        match self {
            Val::Object(o) => o.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::String(value.to_string())
    }
}

impl From<String> for Val {
    fn from(value: String) -> Self {
        Val::String(value)
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Bool(value)
    }
}

impl From<i64> for Val {
    fn from(value: i64) -> Self {
        Val::Number(value.into())
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Val::Number(value.into())
    }
}

impl Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::Bool(b) => write!(f, "{b}"),
            Val::Number(n) => write!(f, "{n}"),
            Val::String(s) => write!(f, "\"{s}\""),
            Val::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Val::Object(o) => {
                write!(f, "{{")?;
                for (i, (k, v)) in o.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Val::Null => write!(f, "null"),
        }
    }
}

impl From<Val> for serde_json::Value {
    fn from(value: Val) -> Self {
        match value {
            Val::Null => serde_json::Value::Null,
            Val::Bool(b) => serde_json::Value::Bool(b),
            Val::Number(n) => match n {
                ValNumber::I64(n) => serde_json::Value::from(n),
                ValNumber::U64(n) => serde_json::Value::from(n),
                // NaN and infinities have no JSON representation
                ValNumber::F64(n) => serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            },
            Val::String(s) => serde_json::Value::String(s),
            Val::List(l) => serde_json::Value::Array(l.into_iter().map(Into::into).collect()),
            Val::Object(o) => {
                serde_json::Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Val {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Val::Null,
            serde_json::Value::Bool(b) => Val::Bool(b),
            serde_json::Value::Number(n) => Val::Number(n.into()),
            serde_json::Value::String(s) => Val::String(s),
            serde_json::Value::Array(l) => Val::List(l.into_iter().map(|v| v.into()).collect()),
            serde_json::Value::Object(o) => Val::Object(
                o.into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect::<HashMap<_, _>>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_eq() {
        let one_u64: ValNumber = ValNumber::from(1u64);
        let one_i64: ValNumber = ValNumber::from(1i64);
        let one_f64: ValNumber = ValNumber::from(1.0);

        let ones = vec![one_u64, one_i64, one_f64];

        for left in &ones {
            for right in &ones {
                assert!(left.partial_cmp(right) == Some(Ordering::Equal))
            }
        }
    }

    #[test]
    fn test_number_lt() {
        let min_i64 = ValNumber::from(i64::MIN);
        let min_f64 = ValNumber::from(f64::MIN);

        let max_u64 = ValNumber::from(u64::MAX);
        let max_i64 = ValNumber::from(i64::MAX);
        let max_f64 = ValNumber::from(f64::MAX);

        let mins = vec![min_i64, min_f64];
        let maxs = vec![max_u64, max_i64, max_f64];

        // any min is less than any max
        for left in &mins {
            for right in &maxs {
                assert!(left.partial_cmp(right) == Some(Ordering::Less));
                assert!(right.partial_cmp(left) == Some(Ordering::Greater));
            }
        }
    }

    #[test]
    fn json_conversion_keeps_null_distinct_from_missing() {
        let json = serde_json::json!({"uid": "u1", "manager": null});
        let val = Val::from(json);

        assert_eq!(val.get("uid"), Some(&Val::String("u1".into())));
        assert_eq!(val.get("manager"), Some(&Val::Null));
        assert_eq!(val.get("absent"), None);
    }
}
