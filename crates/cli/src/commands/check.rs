// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use clap::{ArgMatches, Command};
use colored::Colorize;
use rule_env::Environment;
use rule_model::{collection::Schema, error::RuleParseError, validation::compile_rule};

use crate::{
    commands::command::{CommandDefinition, get_required, schema_file_arg},
    loader::load_schema,
};

pub struct CheckCommandDefinition {}

#[async_trait]
impl CommandDefinition for CheckCommandDefinition {
    fn command(&self) -> Command {
        Command::new("check")
            .about("Compile and validate every rule of a schema")
            .arg(schema_file_arg())
    }

    async fn execute(&self, matches: &ArgMatches, _env: Arc<dyn Environment>) -> Result<()> {
        let schema_path: PathBuf = get_required(matches, "schema")?;
        let schema = load_schema(&schema_path)?;

        let errors = check_schema(&schema);

        if errors.is_empty() {
            println!(
                "{}",
                format!(
                    "All rules of {} collections are valid",
                    schema.collections().len()
                )
                .green()
            );
            return Ok(());
        }

        for error in &errors {
            eprintln!("{}", error.to_string().red());
        }
        Err(anyhow!("{} invalid rule(s)", errors.len()))
    }
}

/// Compile every rule of every collection, collecting all failures rather than stopping at the
/// first one.
pub fn check_schema(schema: &Schema) -> Vec<RuleParseError> {
    schema
        .collections()
        .iter()
        .flat_map(|collection| {
            collection.rule_sources().filter_map(move |(op, source)| {
                compile_rule(source, schema, collection)
                    .err()
                    .map(|kind| RuleParseError {
                        collection: collection.name.clone(),
                        op,
                        kind,
                    })
            })
        })
        .collect()
}
