// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use rule_model::{
    collection::{Collection, Operation, Schema},
    record::{Fields, Record},
};

use crate::{
    error::EvaluationError,
    store::{RecordStore, StoreError},
};

/// Who is performing the operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<CallerIdentity>", into = "Option<CallerIdentity>")]
pub enum Caller {
    #[default]
    Anonymous,
    Authenticated {
        id: String,
        /// Id or name of the auth collection the caller belongs to
        collection_id: String,
    },
}

impl Caller {
    pub fn authenticated(id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Caller::Authenticated {
            id: id.into(),
            collection_id: collection_id.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CallerIdentity {
    id: String,
    collection_id: String,
}

impl From<Option<CallerIdentity>> for Caller {
    fn from(identity: Option<CallerIdentity>) -> Self {
        match identity {
            // An empty id is how the anonymous caller is spelled on the wire
            Some(CallerIdentity { id, collection_id }) if !id.is_empty() => {
                Caller::Authenticated { id, collection_id }
            }
            _ => Caller::Anonymous,
        }
    }
}

impl From<Caller> for Option<CallerIdentity> {
    fn from(caller: Caller) -> Self {
        match caller {
            Caller::Anonymous => None,
            Caller::Authenticated { id, collection_id } => Some(CallerIdentity { id, collection_id }),
        }
    }
}

/// A request to decide a single operation on a single record.
#[derive(Debug, Clone, Deserialize)]
pub struct Evaluate {
    pub collection_id: String,
    pub op: Operation,
    #[serde(default)]
    pub caller: Caller,
    /// The stored record, for view, update and delete
    #[serde(default)]
    pub record: Option<Record>,
    /// Id of the stored record, to be loaded when `record` isn't supplied
    #[serde(default)]
    pub record_id: Option<String>,
    /// The request payload, for create and update
    #[serde(default)]
    pub body: Option<Fields>,
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
    /// Store reads after this instant fail the evaluation with a cancellation
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl Evaluate {
    pub fn new(collection_id: impl Into<String>, op: Operation) -> Self {
        Evaluate {
            collection_id: collection_id.into(),
            op,
            caller: Caller::Anonymous,
            record: None,
            record_id: None,
            body: None,
            now: Utc::now(),
            deadline: None,
        }
    }

    pub fn with_caller(self, caller: Caller) -> Self {
        Evaluate { caller, ..self }
    }

    pub fn with_record(self, record: Record) -> Self {
        Evaluate {
            record: Some(record),
            ..self
        }
    }

    pub fn with_record_id(self, id: impl Into<String>) -> Self {
        Evaluate {
            record_id: Some(id.into()),
            ..self
        }
    }

    pub fn with_body(self, body: impl Into<Fields>) -> Self {
        Evaluate {
            body: Some(body.into()),
            ..self
        }
    }

    pub fn with_now(self, now: DateTime<Utc>) -> Self {
        Evaluate { now, ..self }
    }

    pub fn with_deadline(self, deadline: Instant) -> Self {
        Evaluate {
            deadline: Some(deadline),
            ..self
        }
    }
}

/// A request to list the records of a collection visible to a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ListRequest {
    pub collection_id: String,
    #[serde(default)]
    pub caller: Caller,
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl ListRequest {
    pub fn new(collection_id: impl Into<String>, caller: Caller) -> Self {
        ListRequest {
            collection_id: collection_id.into(),
            caller,
            now: Utc::now(),
            deadline: None,
        }
    }

    pub fn with_now(self, now: DateTime<Utc>) -> Self {
        ListRequest { now, ..self }
    }

    pub fn with_deadline(self, deadline: Instant) -> Self {
        ListRequest {
            deadline: Some(deadline),
            ..self
        }
    }
}

/// Run a store read, failing with [`EvaluationError::Canceled`] if `deadline` passes first.
pub(crate) async fn guarded<T>(
    deadline: Option<Instant>,
    read: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, EvaluationError> {
    let result = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, read)
            .await
            .map_err(|_| EvaluationError::Canceled)?,
        None => read.await,
    };

    result.map_err(|error| match error {
        StoreError::Canceled => EvaluationError::Canceled,
        error => EvaluationError::Store(error),
    })
}

/// Everything a rule is evaluated against.
pub(crate) struct EvaluationContext<'a> {
    pub schema: &'a Schema,
    pub collection: &'a Collection,
    pub op: Operation,
    pub caller: &'a Caller,
    /// The record under test. On create, the record proposed by the body. Absent while planning a
    /// list query.
    pub record: Option<&'a Record>,
    pub body: Option<&'a Fields>,
    pub now: DateTime<Utc>,
    pub store: &'a dyn RecordStore,
    pub deadline: Option<Instant>,
    lookups: Mutex<HashMap<(String, String), Option<Record>>>,
}

impl<'a> EvaluationContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schema: &'a Schema,
        collection: &'a Collection,
        op: Operation,
        caller: &'a Caller,
        record: Option<&'a Record>,
        body: Option<&'a Fields>,
        now: DateTime<Utc>,
        store: &'a dyn RecordStore,
        deadline: Option<Instant>,
    ) -> Self {
        EvaluationContext {
            schema,
            collection,
            op,
            caller,
            record,
            body,
            now,
            store,
            deadline,
            lookups: Mutex::new(HashMap::new()),
        }
    }

    /// Run a store read under the evaluation deadline.
    pub async fn guarded<T>(
        &self,
        read: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EvaluationError> {
        guarded(self.deadline, read).await
    }

    /// Load a record by id. Lookups are remembered for the rest of the evaluation.
    pub async fn find_by_id(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<Record>, EvaluationError> {
        let key = (collection.name.clone(), id.to_string());
        if let Some(found) = self
            .lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(found.clone());
        }

        let found = self
            .guarded(self.store.find_by_id(&collection.name, id))
            .await?;
        self.lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, found.clone());
        Ok(found)
    }
}
