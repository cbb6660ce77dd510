// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;

use rule_model::record::Record;
use rule_sql::RowFilter;

use crate::store::{RecordStore, StoreError};

/// A [`RecordStore`] over records held in memory, keyed by collection name. Filters are evaluated
/// row by row with the same three-valued semantics as rules.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    collections: RwLock<IndexMap<String, Vec<Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from a JSON object mapping collection names to arrays of records.
    pub fn from_json(value: serde_json::Value) -> Result<Self, StoreError> {
        let collections: IndexMap<String, Vec<Record>> = serde_json::from_value(value)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;

        Ok(MemoryRecordStore {
            collections: RwLock::new(collections),
        })
    }

    /// Insert a record, replacing any record with the same id.
    pub fn insert(&self, collection: &str, record: Record) {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let rows = collections.entry(collection.to_string()).or_default();

        match rows.iter_mut().find(|row| row.id == record.id) {
            Some(existing) => *existing = record,
            None => rows.push(record),
        }
    }

    pub fn remove(&self, collection: &str, id: &str) -> Option<Record> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let rows = collections.get_mut(collection)?;
        let position = rows.iter().position(|row| row.id == id)?;
        Some(rows.remove(position))
    }

    fn with_rows<T>(&self, collection: &str, f: impl FnOnce(&[Record]) -> T) -> T {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(collections.get(collection).map(Vec::as_slice).unwrap_or_default())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.with_rows(collection, |rows| {
            rows.iter().find(|row| row.id == id).cloned()
        }))
    }

    async fn exists_where(&self, collection: &str, filter: &RowFilter) -> Result<bool, StoreError> {
        Ok(self.with_rows(collection, |rows| {
            rows.iter().any(|row| filter.matches(row))
        }))
    }

    async fn select_rows_filtered(
        &self,
        collection: &str,
        filter: &RowFilter,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.with_rows(collection, |rows| {
            rows.iter().filter(|row| filter.matches(*row)).cloned().collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use common::value::Val;
    use rule_sql::Column;

    use super::*;

    fn store() -> MemoryRecordStore {
        MemoryRecordStore::from_json(serde_json::json!({
            "jobs": [
                {"id": "j1", "client": "c1", "status": "open"},
                {"id": "j2", "client": "c2", "status": "closed"},
                {"id": "j3", "status": "open"}
            ]
        }))
        .unwrap()
    }

    fn client_is(id: &str) -> RowFilter {
        RowFilter::eq(Column::field("client"), Column::literal(Val::from(id)))
    }

    #[tokio::test]
    async fn lookups() {
        let store = store();

        let job = store.find_by_id("jobs", "j2").await.unwrap().unwrap();
        assert_eq!(job.get("status").as_deref(), Some(&Val::from("closed")));
        assert!(store.find_by_id("jobs", "j9").await.unwrap().is_none());
        assert!(store.find_by_id("clients", "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filters_are_three_valued() {
        let store = store();

        assert!(store.exists_where("jobs", &client_is("c1")).await.unwrap());
        assert!(!store.exists_where("jobs", &client_is("c9")).await.unwrap());

        // j3 has no client: NOT (client = "c1") is unknown for it, so it is not returned
        let rows = store
            .select_rows_filtered("jobs", &!client_is("c1"))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["j2"]);

        assert!(
            !store
                .exists_where("clients", &RowFilter::True)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn insert_replaces_by_id() {
        let store = store();
        store.insert("jobs", Record::new("j1", [("client", "c9")]));
        store.insert("jobs", Record::new("j4", [("client", "c9")]));

        let rows = store
            .select_rows_filtered("jobs", &client_is("c9"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        assert!(store.remove("jobs", "j4").is_some());
        assert!(store.remove("jobs", "j4").is_none());
    }

    #[test]
    fn rejects_malformed_fixtures() {
        assert!(MemoryRecordStore::from_json(serde_json::json!({"jobs": [{"client": "c1"}]})).is_err());
    }
}
