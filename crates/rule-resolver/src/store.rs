// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_trait::async_trait;
use thiserror::Error;

use rule_model::record::Record;
use rule_sql::RowFilter;

/// The reads rule evaluation needs from the record store. Every call is expected to be an indexed
/// lookup: by primary key, or by the columns a [`RowFilter`] names.
///
/// Collections are identified by name.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// Whether any row of `collection` passes `filter`.
    async fn exists_where(&self, collection: &str, filter: &RowFilter) -> Result<bool, StoreError>;

    /// The rows of `collection` that pass `filter`.
    async fn select_rows_filtered(
        &self,
        collection: &str,
        filter: &RowFilter,
    ) -> Result<Vec<Record>, StoreError>;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store read canceled")]
    Canceled,

    #[error("Invalid store data: {0}")]
    InvalidData(String),

    #[error("Store error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}
