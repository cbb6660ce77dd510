// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rendered list filters executed by SQLite and checked against row-by-row evaluation.

mod support;

use std::sync::Arc;

use sqlx::{
    Connection, Row, Sqlite, SqliteConnection,
    query::Query,
    sqlite::SqliteArguments,
};

use common::value::{Val, ValNumber};
use rule_model::{collection::Operation, record::Record};
use rule_resolver::{BinderConfig, Caller, Evaluate, ListRequest, RuleBinder};

use support::{now, schema, store, user};

const RULES: [&str; 12] = [
    "hours != 2",
    "NOT (hours < 3)",
    "category != 'internal'",
    "uid = @request.auth.id",
    "uid != @request.auth.id",
    "NOT (category = 'internal' && hours >= 2)",
    "category:lower = 'billable' || hours < 3",
    "hours = null || category != null",
    "uid = job",
    "NOT (uid = job)",
    "hours > 1 && NOT (hours >= 3 || category = 'billable')",
    "NOT (NOT (hours <= 2) || uid != @request.auth.id)",
];

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Every field is set on every row, nulls included, as it would be in a table.
fn rows() -> Vec<Record> {
    let row = |id: &str, uid: Val, job: Val, category: Val, hours: Val| {
        Record::new(
            id,
            [("uid", uid), ("job", job), ("category", category), ("hours", hours)],
        )
    };

    vec![
        row("te1", "u1".into(), "j1".into(), "billable".into(), Val::from(2i64)),
        row("te2", "u2".into(), "j1".into(), "internal".into(), Val::from(3i64)),
        row("te3", "u1".into(), Val::Null, Val::Null, Val::Null),
        row("te4", Val::Null, "j1".into(), "Billable".into(), Val::from(1.5)),
        row("te5", "u2".into(), Val::Null, "internal".into(), Val::Null),
        row("te6", Val::Null, Val::Null, Val::Null, Val::from(2i64)),
    ]
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Val) -> SqliteQuery<'q> {
    match value {
        Val::Null => query.bind(None::<String>),
        Val::Bool(value) => query.bind(*value),
        Val::String(value) => query.bind(value.clone()),
        Val::Number(ValNumber::I64(value)) => query.bind(*value),
        Val::Number(ValNumber::U64(value)) => query.bind(*value as f64),
        Val::Number(ValNumber::F64(value)) => query.bind(*value),
        value => panic!("not a column value: {value:?}"),
    }
}

async fn database() -> SqliteConnection {
    let mut connection = SqliteConnection::connect("sqlite::memory:").await.unwrap();
    sqlx::query(
        r#"CREATE TABLE "time_entries" ("id" TEXT PRIMARY KEY, "uid" TEXT, "job" TEXT, "category" TEXT, "hours" REAL)"#,
    )
    .execute(&mut connection)
    .await
    .unwrap();

    for row in rows() {
        let query = sqlx::query(r#"INSERT INTO "time_entries" VALUES ($1, $2, $3, $4, $5)"#)
            .bind(row.id.clone());
        let query = ["uid", "job", "category", "hours"]
            .into_iter()
            .fold(query, |query, field| {
                bind_value(query, &row.get(field).unwrap())
            });
        query.execute(&mut connection).await.unwrap();
    }

    connection
}

async fn selected_ids(connection: &mut SqliteConnection, sql: &str, params: &[Val]) -> Vec<String> {
    let query = params
        .iter()
        .fold(sqlx::query(sql), |query, param| bind_value(query, param));
    let mut ids: Vec<String> = query
        .fetch_all(connection)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get("id"))
        .collect();
    ids.sort();
    ids
}

async fn binder_with_rule(rule: &str) -> RuleBinder {
    let binder = RuleBinder::new(schema(), Arc::new(store()), BinderConfig::default());
    let entries = binder
        .schema()
        .await
        .get("time_entries")
        .unwrap()
        .clone()
        .with_rule(Operation::List, Some(rule));
    binder.save_collection(entries).await.unwrap();
    binder
}

#[tokio::test]
async fn executed_filters_agree_with_the_evaluator() {
    let mut connection = database().await;

    for rule in RULES {
        let binder = binder_with_rule(rule).await;

        for caller in [Caller::Anonymous, user("u1"), user("u2")] {
            let request = ListRequest::new("time_entries", caller.clone()).with_now(now());
            let plan = binder.plan_list(&request).await.unwrap();
            assert!(plan.exact, "{rule} is fully pushed down");

            let (sql, params) = plan.to_sql("time_entries");
            let selected = selected_ids(&mut connection, &sql, &params).await;

            let mut allowed = vec![];
            for row in rows() {
                let evaluate = Evaluate::new("time_entries", Operation::List)
                    .with_caller(caller.clone())
                    .with_record(row.clone())
                    .with_now(now());
                if binder.evaluate(&evaluate).await.is_allowed() {
                    allowed.push(row.id);
                }
            }
            allowed.sort();

            assert_eq!(selected, allowed, "{rule} by {caller:?}: {sql}");
        }
    }
}

#[tokio::test]
async fn stored_nulls_pass_inequalities() {
    let mut connection = database().await;
    let binder = binder_with_rule("hours != 2").await;

    let plan = binder
        .plan_list(&ListRequest::new("time_entries", Caller::Anonymous).with_now(now()))
        .await
        .unwrap();
    let (sql, params) = plan.to_sql("time_entries");
    assert_eq!(
        sql,
        r#"SELECT * FROM "time_entries" WHERE "hours" IS DISTINCT FROM $1"#
    );

    assert_eq!(
        selected_ids(&mut connection, &sql, &params).await,
        vec!["te2", "te3", "te4", "te5"]
    );
}
