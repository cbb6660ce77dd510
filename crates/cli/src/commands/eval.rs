// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};
use tracing::debug;

use rule_env::Environment;
use rule_model::collection::Schema;
use rule_resolver::{BinderConfig, Decision, Evaluate, MemoryRecordStore, RuleBinder};

use crate::{
    commands::command::{CommandDefinition, get_required, schema_file_arg},
    loader::{load_json, load_schema, load_store},
};

pub struct EvalCommandDefinition {}

#[async_trait]
impl CommandDefinition for EvalCommandDefinition {
    fn command(&self) -> Command {
        Command::new("eval")
            .about("Decide a single request against a schema and a set of records")
            .arg(schema_file_arg())
            .arg(
                Arg::new("records")
                    .help("The path to the JSON records file.")
                    .long_help(
                        "The path to a JSON file mapping collection names to their records, \
                         as in `{\"users\": [{\"id\": \"u1\"}]}`.",
                    )
                    .required(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .index(2),
            )
            .arg(
                Arg::new("request")
                    .help("The path to the JSON request file.")
                    .required(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .index(3),
            )
    }

    /// Print the decision as JSON. A denial is a successful run.
    async fn execute(&self, matches: &ArgMatches, env: Arc<dyn Environment>) -> Result<()> {
        let schema_path: PathBuf = get_required(matches, "schema")?;
        let records_path: PathBuf = get_required(matches, "records")?;
        let request_path: PathBuf = get_required(matches, "request")?;

        let schema = load_schema(&schema_path)?;
        let store = load_store(&records_path)?;
        let request: Evaluate = load_json(&request_path)?;

        let decision = evaluate(schema, store, &request, env.as_ref()).await?;
        debug!(status = decision.status_code(), "Evaluated");

        println!("{}", serde_json::to_string_pretty(&decision)?);
        Ok(())
    }
}

/// Decide `request` with a binder configured from `env`.
pub async fn evaluate(
    schema: Schema,
    store: MemoryRecordStore,
    request: &Evaluate,
    env: &dyn Environment,
) -> Result<Decision> {
    let config = BinderConfig::from_env(env)?;
    let binder = RuleBinder::new(schema, Arc::new(store), config);

    Ok(binder.evaluate(request).await)
}
