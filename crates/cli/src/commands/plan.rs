// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{fmt::Write, path::PathBuf, sync::Arc};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};

use rule_env::Environment;
use rule_model::collection::Schema;
use rule_resolver::{BinderConfig, Caller, ListPlan, ListRequest, MemoryRecordStore, RuleBinder};

use crate::{
    commands::command::{CommandDefinition, get, get_required, schema_file_arg},
    loader::{load_schema, load_store},
};

const DEFAULT_CALLER_COLLECTION: &str = "users";

pub struct PlanCommandDefinition {}

#[async_trait]
impl CommandDefinition for PlanCommandDefinition {
    fn command(&self) -> Command {
        Command::new("plan")
            .about("Show the SQL a list request is filtered with")
            .arg(schema_file_arg())
            .arg(
                Arg::new("collection")
                    .help("The id or name of the collection to list.")
                    .required(true)
                    .index(2),
            )
            .arg(
                Arg::new("caller")
                    .help("Id of the caller. Anonymous if not specified.")
                    .long("caller")
                    .required(false)
                    .num_args(1),
            )
            .arg(
                Arg::new("caller-collection")
                    .help("The auth collection the caller belongs to.")
                    .long("caller-collection")
                    .required(false)
                    .default_value(DEFAULT_CALLER_COLLECTION)
                    .num_args(1),
            )
            .arg(
                Arg::new("records")
                    .help("The path to a JSON records file.")
                    .long_help(
                        "The path to a JSON records file. Parts of the rule that depend only on \
                         the caller are evaluated against these records; without them, such parts \
                         can't be decided and are left to the post-filter.",
                    )
                    .long("records")
                    .required(false)
                    .value_parser(clap::value_parser!(PathBuf))
                    .num_args(1),
            )
    }

    async fn execute(&self, matches: &ArgMatches, env: Arc<dyn Environment>) -> Result<()> {
        let schema_path: PathBuf = get_required(matches, "schema")?;
        let collection: String = get_required(matches, "collection")?;
        let caller: Option<String> = get(matches, "caller");
        let caller_collection: String = get_required(matches, "caller-collection")?;
        let records_path: Option<PathBuf> = get(matches, "records");

        let schema = load_schema(&schema_path)?;
        let store = match records_path {
            Some(path) => load_store(&path)?,
            None => MemoryRecordStore::new(),
        };

        let caller = match caller {
            Some(id) => Caller::authenticated(id, caller_collection),
            None => Caller::Anonymous,
        };
        let request = ListRequest::new(collection, caller);

        print!("{}", plan(schema, store, &request, env.as_ref()).await?);
        Ok(())
    }
}

/// Plan `request` and render the plan as SQL.
pub async fn plan(
    schema: Schema,
    store: MemoryRecordStore,
    request: &ListRequest,
    env: &dyn Environment,
) -> Result<String> {
    let table = schema
        .get(&request.collection_id)
        .map(|collection| collection.name.clone())
        .ok_or_else(|| anyhow!("Unknown collection '{}'", request.collection_id))?;

    let config = BinderConfig::from_env(env)?;
    let binder = RuleBinder::new(schema, Arc::new(store), config);
    let list_plan = binder.plan_list(request).await?;

    render(&list_plan, &table)
}

/// The statement, one comment line per parameter, then whether rows need evaluating.
pub fn render(plan: &ListPlan, table: &str) -> Result<String> {
    let (sql, params) = plan.to_sql(table);

    let mut rendered = String::new();
    writeln!(rendered, "{sql};")?;
    for (index, param) in params.iter().enumerate() {
        writeln!(rendered, "-- ${} = {}", index + 1, param)?;
    }
    if plan.exact {
        writeln!(rendered, "-- exact: selected rows are returned as is")?;
    } else {
        writeln!(rendered, "-- post-filter: each selected row is evaluated against the rule")?;
    }

    Ok(rendered)
}
