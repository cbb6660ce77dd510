// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::debug;

use rule_model::{ast::Expr, compile, error::ParseError};

/// Compiled rules, keyed by their source text.
///
/// Uses a read-write lock, since we expect many concurrent reads and writes only when a rule is
/// first used or its collection is saved.
#[derive(Default)]
pub struct RuleCache {
    compiled: RwLock<HashMap<String, Arc<Expr>>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled form of `source`, compiling it on first use.
    pub async fn get_or_compile(&self, source: &str) -> Result<Arc<Expr>, ParseError> {
        if let Some(expr) = self.compiled.read().await.get(source) {
            return Ok(expr.clone());
        }

        let mut writer = self.compiled.write().await;

        // Another writer may have compiled it between dropping the read lock and acquiring the
        // write lock
        if let Some(expr) = writer.get(source) {
            return Ok(expr.clone());
        }

        debug!(rule = source, "Compiling rule");
        let expr = Arc::new(compile(source)?);
        writer.insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    /// Forget the compiled form of each of `sources`.
    pub async fn evict<'s>(&self, sources: impl IntoIterator<Item = &'s str>) {
        let mut writer = self.compiled.write().await;
        for source in sources {
            writer.remove(source);
        }
    }

    pub async fn len(&self) -> usize {
        self.compiled.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.compiled.read().await.is_empty()
    }
}
