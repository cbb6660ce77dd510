// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use rule_model::{collection::Schema, validation::validate_collection};
use rule_resolver::{BinderConfig, Caller, MemoryRecordStore, RuleBinder};

pub fn schema() -> Schema {
    let schema: Schema = serde_json::from_str(include_str!("../fixtures/schema.json")).unwrap();
    for collection in schema.collections() {
        validate_collection(&schema, collection).unwrap();
    }
    schema
}

pub fn store() -> MemoryRecordStore {
    MemoryRecordStore::from_json(serde_json::from_str(include_str!("../fixtures/records.json")).unwrap())
        .unwrap()
}

pub fn binder() -> RuleBinder {
    binder_with(BinderConfig::default())
}

pub fn binder_with(config: BinderConfig) -> RuleBinder {
    RuleBinder::new(schema(), Arc::new(store()), config)
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
}

pub fn user(id: &str) -> Caller {
    Caller::authenticated(id, "users")
}
