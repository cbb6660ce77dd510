// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::Path;

use anyhow::{Result, anyhow};
use serde::de::DeserializeOwned;

use rule_model::collection::Schema;
use rule_resolver::MemoryRecordStore;

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json_str = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read file '{}': {}", path.display(), e))?;
    serde_json::from_str(&json_str)
        .map_err(|e| anyhow!("Failed to parse JSON file '{}': {}", path.display(), e))
}

/// Load collections and check their structure. Rules are left to the caller to compile.
pub fn load_schema(path: &Path) -> Result<Schema> {
    load_json(path)
}

/// Load records keyed by collection name, as in `{"users": [{"id": "u1", ...}]}`.
pub fn load_store(path: &Path) -> Result<MemoryRecordStore> {
    let records: serde_json::Value = load_json(path)?;
    MemoryRecordStore::from_json(records)
        .map_err(|e| anyhow!("Invalid records in '{}': {}", path.display(), e))
}
