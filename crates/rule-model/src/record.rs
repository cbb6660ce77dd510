// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{borrow::Cow, collections::HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::value::Val;
use rule_sql::RowValues;

/// Field values keyed by field name. Serialized as a plain JSON object.
///
/// A key that is absent differs from a key present with `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "serde_json::Map<String, serde_json::Value>",
    into = "serde_json::Map<String, serde_json::Value>"
)]
pub struct Fields(HashMap<String, Val>);

impl Fields {
    pub fn new() -> Self {
        Fields(HashMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Val> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Fields {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Fields(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<Fields> for serde_json::Map<String, serde_json::Value> {
    fn from(fields: Fields) -> Self {
        fields.0.into_iter().map(|(k, v)| (k, v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<Val>, const N: usize> From<[(K, V); N]> for Fields {
    fn from(entries: [(K, V); N]) -> Self {
        Fields(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A stored record. Serialized as a JSON object whose `id` key is the record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("A record must be a JSON object")]
    NotAnObject,
    #[error("A record must have a string 'id'")]
    MissingId,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: impl Into<Fields>) -> Self {
        Record {
            id: id.into(),
            fields: fields.into(),
        }
    }

    /// The value of a field. `id` is always present.
    pub fn get(&self, name: &str) -> Option<Cow<'_, Val>> {
        if name == "id" {
            Some(Cow::Owned(Val::String(self.id.clone())))
        } else {
            self.fields.get(name).map(Cow::Borrowed)
        }
    }

}

impl RowValues for Record {
    fn field_value(&self, field: &str) -> Option<Cow<'_, Val>> {
        self.get(field)
    }
}

impl TryFrom<serde_json::Value> for Record {
    type Error = RecordError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let serde_json::Value::Object(mut map) = value else {
            return Err(RecordError::NotAnObject);
        };
        let Some(serde_json::Value::String(id)) = map.remove("id") else {
            return Err(RecordError::MissingId);
        };
        Ok(Record {
            id,
            fields: map.into(),
        })
    }
}

impl From<Record> for serde_json::Value {
    fn from(record: Record) -> Self {
        let mut map: serde_json::Map<String, serde_json::Value> = record.fields.into();
        map.insert("id".to_string(), serde_json::Value::String(record.id));
        serde_json::Value::Object(map)
    }
}
