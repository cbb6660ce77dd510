// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Resolution of paths such as `client.owner`, `@request.auth.user_claims_via_uid.cid` or
//! `@request.body.contact.client` to values.
//!
//! Each hop is an indexed read: a forward relation loads the target records by id, a back-relation
//! `X_via_Y` selects the records of `X` whose `Y` references the current records. Paths are
//! followed exactly as written. An unset or dangling relation stops resolution with
//! [`Resolved::Unknown`]; a field the schema doesn't know is an error.

use std::borrow::Cow;

use chrono::Duration;
use futures::future::try_join_all;
use indexmap::IndexMap;

use common::value::{Val, eq_values, format_timestamp};
use rule_model::{
    ast::{Modifier, PathExpr, PathRoot, Segment},
    collection::{Collection, FieldDef, Operation},
    record::Record,
    validation::AUTH_IDENTITY_FIELDS,
};
use rule_sql::{Column, RowFilter};

use crate::{
    context::{Caller, EvaluationContext},
    error::EvaluationError,
    resolved::{Resolved, Truth},
};

/// The record(s) reached so far while walking a path.
enum Cursor<'r> {
    One(Cow<'r, Record>),
    /// Keyed by record id, so that records reached several ways count once
    Many(IndexMap<String, Record>),
}

impl Cursor<'_> {
    fn ids(&self) -> Vec<String> {
        match self {
            Cursor::One(record) => vec![record.id.clone()],
            Cursor::Many(records) => records.keys().cloned().collect(),
        }
    }
}

impl<'a> EvaluationContext<'a> {
    /// Resolve a path, applying its modifier (other than `:each`, which only affects how a
    /// comparison quantifies).
    pub async fn resolve(&self, path: &PathExpr) -> Result<Resolved, EvaluationError> {
        match path.modifier {
            Some(Modifier::Isset) => return Ok(Truth::from(self.body_key_set(path)).into()),
            Some(Modifier::Changed) => return Ok(Truth::from(self.body_key_changed(path)).into()),
            _ => {}
        }

        let resolved = match &path.root {
            PathRoot::Record => match self.record {
                Some(record) => {
                    self.walk(self.collection, Cursor::One(Cow::Borrowed(record)), &path.segments)
                        .await?
                }
                None => Resolved::Unknown,
            },
            PathRoot::Body => match self.body {
                Some(body) => {
                    let proposed = Record {
                        id: String::new(),
                        fields: body.clone(),
                    };
                    self.walk(self.collection, Cursor::One(Cow::Owned(proposed)), &path.segments)
                        .await?
                }
                None => Resolved::Unknown,
            },
            PathRoot::Auth => self.resolve_auth(&path.segments).await?,
            PathRoot::Collection(_) => {
                return Err(EvaluationError::UnsupportedCrossCollection(path.to_string()));
            }
            PathRoot::Yesterday => {
                Resolved::Scalar(Val::String(format_timestamp(&(self.now - Duration::hours(24)))))
            }
            PathRoot::Now => Resolved::Scalar(Val::String(format_timestamp(&self.now))),
        };

        Ok(match path.modifier {
            Some(Modifier::Length) => resolved.length(),
            Some(Modifier::Lower) => resolved.lowercase(),
            _ => resolved,
        })
    }

    fn body_field<'p>(&self, path: &'p PathExpr) -> Option<&'p str> {
        match (&path.root, path.segments.as_slice()) {
            (PathRoot::Body, [Segment::Field(name)]) => Some(name),
            _ => None,
        }
    }

    /// Whether the request body carries the key at all, whatever its value.
    fn body_key_set(&self, path: &PathExpr) -> bool {
        let writing = matches!(self.op, Operation::Create | Operation::Update);
        match (self.body_field(path), self.body) {
            (Some(name), Some(body)) if writing => body.contains(name),
            _ => false,
        }
    }

    /// Whether an update's body carries the key with a value different from the stored record's.
    fn body_key_changed(&self, path: &PathExpr) -> bool {
        if self.op != Operation::Update {
            return false;
        }

        let (Some(name), Some(body), Some(prior)) = (self.body_field(path), self.body, self.record)
        else {
            return false;
        };

        match (body.get(name), prior.get(name)) {
            (Some(proposed), Some(stored)) => !eq_values(proposed, &stored),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    async fn resolve_auth(&self, segments: &[Segment]) -> Result<Resolved, EvaluationError> {
        let (id, collection_id) = match self.caller {
            Caller::Anonymous => {
                return Ok(match segments {
                    [Segment::Field(name)] if AUTH_IDENTITY_FIELDS.contains(&name.as_str()) => {
                        Resolved::Scalar(Val::String(String::new()))
                    }
                    // Nothing points back at nobody
                    [Segment::BackRelation { .. }, ..] => Resolved::Set(vec![]),
                    _ => Resolved::Unknown,
                });
            }
            Caller::Authenticated { id, collection_id } => (id, collection_id),
        };

        let auth_collection = self
            .schema
            .get(collection_id)
            .ok_or_else(|| EvaluationError::UnknownCollection(collection_id.clone()))?;

        if let [Segment::Field(name)] = segments {
            match name.as_str() {
                "id" => return Ok(Resolved::Scalar(Val::String(id.clone()))),
                "collectionId" => return Ok(Resolved::Scalar(auth_collection.id.as_str().into())),
                "collectionName" => {
                    return Ok(Resolved::Scalar(auth_collection.name.as_str().into()));
                }
                _ => {}
            }
        }

        match self.find_by_id(auth_collection, id).await? {
            Some(caller_record) => {
                self.walk(auth_collection, Cursor::One(Cow::Owned(caller_record)), segments)
                    .await
            }
            // The caller's record is gone
            None => Ok(Resolved::Unknown),
        }
    }

    async fn walk(
        &self,
        start: &'a Collection,
        start_cursor: Cursor<'_>,
        segments: &[Segment],
    ) -> Result<Resolved, EvaluationError> {
        let mut collection = start;
        let mut cursor = start_cursor;

        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();

            match segment {
                Segment::Field(name) => {
                    let field = self.field(collection, name)?;
                    if last {
                        return Ok(terminal(&cursor, name));
                    }

                    if !field.is_relation() {
                        return Err(EvaluationError::NotTraversable {
                            collection: collection.name.clone(),
                            field: name.clone(),
                        });
                    }
                    let target = self.relation_target(&field)?;

                    cursor = match self.follow(&cursor, name, target).await? {
                        Some(next) => next,
                        None => return Ok(Resolved::Unknown),
                    };
                    collection = target;
                }
                Segment::BackRelation {
                    collection: source_name,
                    field: field_name,
                } => {
                    let source = self
                        .schema
                        .get(source_name)
                        .ok_or_else(|| EvaluationError::UnknownCollection(source_name.clone()))?;
                    let relation = source.find_field(field_name).ok_or_else(|| {
                        EvaluationError::InvalidBackRelation {
                            segment: segment.to_string(),
                            reason: format!("'{}' has no field '{field_name}'", source.name),
                        }
                    })?;
                    let points_back = relation.is_relation()
                        && self
                            .schema
                            .relation_target(&relation)
                            .is_some_and(|target| target.id == collection.id);
                    if !points_back {
                        return Err(EvaluationError::InvalidBackRelation {
                            segment: segment.to_string(),
                            reason: format!(
                                "'{}.{field_name}' is not a relation to '{}'",
                                source.name, collection.name
                            ),
                        });
                    }

                    // A record not yet saved has nothing pointing back at it
                    let filter = cursor
                        .ids()
                        .into_iter()
                        .filter(|id| !id.is_empty())
                        .map(|id| references(&relation, id))
                        .fold(RowFilter::False, RowFilter::or);

                    let rows = if filter.is_false() {
                        vec![]
                    } else {
                        self.guarded(self.store.select_rows_filtered(&source.name, &filter))
                            .await?
                    };

                    cursor = Cursor::Many(rows.into_iter().map(|row| (row.id.clone(), row)).collect());
                    collection = source;
                }
            }
        }

        // The path ended on a back-relation: the ids of the related records
        Ok(match cursor {
            Cursor::One(record) => Resolved::Scalar(Val::String(record.id.clone())),
            Cursor::Many(records) => {
                Resolved::Set(records.into_keys().map(Val::String).collect())
            }
        })
    }

    fn field(&self, collection: &'a Collection, name: &str) -> Result<Cow<'a, FieldDef>, EvaluationError> {
        collection
            .find_field(name)
            .ok_or_else(|| EvaluationError::UnknownField {
                collection: collection.name.clone(),
                field: name.to_string(),
            })
    }

    fn relation_target(&self, field: &FieldDef) -> Result<&'a Collection, EvaluationError> {
        self.schema.relation_target(field).ok_or_else(|| {
            EvaluationError::UnknownCollection(field.target_collection.clone().unwrap_or_default())
        })
    }

    /// Follow the relation field `name` from the current record(s). `None` when a single
    /// relation is unset or dangling.
    async fn follow(
        &self,
        cursor: &Cursor<'_>,
        name: &str,
        target: &Collection,
    ) -> Result<Option<Cursor<'static>>, EvaluationError> {
        match cursor {
            Cursor::One(record) => match record.get(name).as_deref() {
                Some(Val::List(ids)) => Ok(Some(Cursor::Many(self.load_all(target, ids).await?))),
                Some(Val::String(id)) if !id.is_empty() => Ok(self
                    .find_by_id(target, id)
                    .await?
                    .map(|found| Cursor::One(Cow::Owned(found)))),
                _ => Ok(None),
            },
            Cursor::Many(records) => {
                let ids: Vec<Val> = records
                    .values()
                    .filter_map(|record| record.get(name).map(Cow::into_owned))
                    .flat_map(|value| match value {
                        Val::List(ids) => ids,
                        value => vec![value],
                    })
                    .collect();
                Ok(Some(Cursor::Many(self.load_all(target, &ids).await?)))
            }
        }
    }

    /// Load the records `ids` point to, concurrently. Unset and dangling ids are skipped.
    async fn load_all(
        &self,
        target: &Collection,
        ids: &[Val],
    ) -> Result<IndexMap<String, Record>, EvaluationError> {
        let mut unique: Vec<&str> = Vec::new();
        for id in ids.iter().filter_map(Val::as_str) {
            if !id.is_empty() && !unique.contains(&id) {
                unique.push(id);
            }
        }

        let found = try_join_all(unique.into_iter().map(|id| self.find_by_id(target, id))).await?;
        Ok(found
            .into_iter()
            .flatten()
            .map(|record| (record.id.clone(), record))
            .collect())
    }
}

/// The value of `name` at the end of a path.
fn terminal(cursor: &Cursor<'_>, name: &str) -> Resolved {
    match cursor {
        Cursor::One(record) => match record.get(name) {
            Some(value) => Resolved::from_value(value.into_owned()),
            None => Resolved::Unknown,
        },
        Cursor::Many(records) => {
            let values = records
                .values()
                .flat_map(|record| match record.get(name).map(Cow::into_owned) {
                    Some(Val::List(values)) => values,
                    Some(value) => vec![value],
                    None => vec![Val::Null],
                })
                .collect();
            Resolved::Set(values)
        }
    }
}

/// Rows whose relation field `relation` references the record `id`.
fn references(relation: &FieldDef, id: String) -> RowFilter {
    if relation.multiple {
        RowFilter::In(Column::literal(Val::String(id)), Column::field(&relation.name))
    } else {
        RowFilter::eq(Column::field(&relation.name), Column::literal(Val::String(id)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use rule_model::{
        collection::{CollectionType, FieldKind, Schema},
        compile,
        ast::Expr,
        record::Fields,
    };

    use super::*;
    use crate::memory_store::MemoryRecordStore;

    fn schema() -> Schema {
        let users = Collection::new("_pb_users", "users", CollectionType::Auth)
            .with_field(FieldDef::new("name", FieldKind::Text));
        let claims = Collection::new("pbc_claims", "claims", CollectionType::Base)
            .with_field(FieldDef::new("name", FieldKind::Text));
        let user_claims = Collection::new("pbc_user_claims", "user_claims", CollectionType::Base)
            .with_field(FieldDef::relation("uid", "users"))
            .with_field(FieldDef::relation("cid", "claims"));
        let clients = Collection::new("pbc_clients", "clients", CollectionType::Base)
            .with_field(FieldDef::new("name", FieldKind::Text));
        let contacts = Collection::new("pbc_contacts", "contacts", CollectionType::Base)
            .with_field(FieldDef::relation("client", "clients"));
        let jobs = Collection::new("pbc_jobs", "jobs", CollectionType::Base)
            .with_field(FieldDef::relation("client", "clients").optional())
            .with_field(FieldDef::relation("contact", "contacts").optional())
            .with_field(FieldDef::relation("members", "users").multiple())
            .with_field(FieldDef::new("tags", FieldKind::Select).multiple());
        let time_entries = Collection::new("pbc_time_entries", "time_entries", CollectionType::Base)
            .with_field(FieldDef::relation("job", "jobs").optional());

        Schema::new(vec![users, claims, user_claims, clients, contacts, jobs, time_entries]).unwrap()
    }

    fn store() -> MemoryRecordStore {
        MemoryRecordStore::from_json(serde_json::json!({
            "users": [
                {"id": "u1", "name": "Alice"},
                {"id": "u2", "name": "Bob"}
            ],
            "claims": [
                {"id": "cl1", "name": "job"},
                {"id": "cl2", "name": "payroll"}
            ],
            "user_claims": [
                {"id": "uc1", "uid": "u1", "cid": "cl1"},
                {"id": "uc2", "uid": "u1", "cid": "cl2"},
                {"id": "uc3", "uid": "u2", "cid": "cl2"}
            ],
            "clients": [{"id": "c1", "name": "Acme"}],
            "contacts": [{"id": "k1", "client": "c1"}],
            "time_entries": [
                {"id": "te1", "job": "j1"},
                {"id": "te2", "job": ""}
            ]
        }))
        .unwrap()
    }

    fn path(source: &str) -> PathExpr {
        match compile(source).unwrap() {
            Expr::Path(path) => path,
            expr => panic!("not a path: {expr}"),
        }
    }

    struct Fixture {
        schema: Schema,
        store: MemoryRecordStore,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                schema: schema(),
                store: store(),
            }
        }

        async fn resolve(
            &self,
            op: Operation,
            caller: &Caller,
            record: Option<&Record>,
            body: Option<&Fields>,
            source: &str,
        ) -> Result<Resolved, EvaluationError> {
            let jobs = self.schema.get("jobs").unwrap();
            let now = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
            let context = EvaluationContext::new(
                &self.schema,
                jobs,
                op,
                caller,
                record,
                body,
                now,
                &self.store,
                None,
            );
            context.resolve(&path(source)).await
        }
    }

    fn strings(values: &[&str]) -> Resolved {
        Resolved::Set(values.iter().map(|v| Val::from(*v)).collect())
    }

    #[tokio::test]
    async fn forward_relations() {
        let fixture = Fixture::new();
        let caller = Caller::Anonymous;
        let job = Record::new("j1", [("client", Val::from("c1")), ("contact", Val::from("k1"))]);
        let resolve = |source| fixture.resolve(Operation::View, &caller, Some(&job), None, source);

        assert_eq!(resolve("client.name").await.unwrap(), Resolved::Scalar("Acme".into()));
        assert_eq!(resolve("contact.client.name").await.unwrap(), Resolved::Scalar("Acme".into()));
        assert_eq!(resolve("client").await.unwrap(), Resolved::Scalar("c1".into()));
        // `members` is absent from the record
        assert_eq!(resolve("members.name").await.unwrap(), Resolved::Unknown);
    }

    #[tokio::test]
    async fn unset_and_dangling_relations_are_unknown() {
        let fixture = Fixture::new();
        let caller = Caller::Anonymous;

        for client in [Val::Null, Val::from(""), Val::from("c404")] {
            let job = Record::new("j1", [("client", client)]);
            let resolved = fixture
                .resolve(Operation::View, &caller, Some(&job), None, "client.name")
                .await
                .unwrap();
            assert_eq!(resolved, Resolved::Unknown);
        }
    }

    #[tokio::test]
    async fn multi_relations_are_sets() {
        let fixture = Fixture::new();
        let caller = Caller::Anonymous;
        let job = Record::new(
            "j1",
            [(
                "members",
                Val::List(vec!["u1".into(), "u2".into(), "u404".into(), "u1".into()]),
            )],
        );

        let resolved = fixture
            .resolve(Operation::View, &caller, Some(&job), None, "members.name")
            .await
            .unwrap();
        assert_eq!(resolved, strings(&["Alice", "Bob"]));

        let resolved = fixture
            .resolve(Operation::View, &caller, Some(&job), None, "members.name:lower")
            .await
            .unwrap();
        assert_eq!(resolved, strings(&["alice", "bob"]));
    }

    #[tokio::test]
    async fn back_relations_from_the_caller() {
        let fixture = Fixture::new();
        let caller = Caller::authenticated("u1", "users");
        let resolve =
            |source| fixture.resolve(Operation::Create, &caller, None, None, source);

        assert_eq!(
            resolve("@request.auth.user_claims_via_uid.cid.name").await.unwrap(),
            strings(&["job", "payroll"])
        );
        assert_eq!(
            resolve("@request.auth.user_claims_via_uid:length").await.unwrap(),
            Resolved::Scalar(Val::Number(2u64.into()))
        );
        assert_eq!(resolve("@request.auth.name").await.unwrap(), Resolved::Scalar("Alice".into()));
        assert_eq!(
            resolve("@request.auth.collectionName").await.unwrap(),
            Resolved::Scalar("users".into())
        );
    }

    #[tokio::test]
    async fn unsaved_records_have_no_back_references() {
        let fixture = Fixture::new();
        let caller = Caller::authenticated("u1", "users");
        let saved = Record::new("j1", [("client", "c1")]);
        // Not saved yet, so without an id
        let proposed = Record::new("", [("client", "c1")]);

        let resolved = fixture
            .resolve(Operation::Update, &caller, Some(&saved), None, "time_entries_via_job:length")
            .await
            .unwrap();
        assert_eq!(resolved, Resolved::Scalar(Val::Number(1u64.into())));

        // te2 has no job, which must not read as a reference to `proposed`
        let resolved = fixture
            .resolve(Operation::Create, &caller, Some(&proposed), None, "time_entries_via_job:length")
            .await
            .unwrap();
        assert_eq!(resolved, Resolved::Scalar(Val::Number(0u64.into())));
    }

    #[tokio::test]
    async fn anonymous_caller() {
        let fixture = Fixture::new();
        let caller = Caller::Anonymous;
        let resolve = |source| fixture.resolve(Operation::View, &caller, None, None, source);

        assert_eq!(resolve("@request.auth.id").await.unwrap(), Resolved::Scalar("".into()));
        assert_eq!(
            resolve("@request.auth.collectionId").await.unwrap(),
            Resolved::Scalar("".into())
        );
        assert_eq!(resolve("@request.auth.name").await.unwrap(), Resolved::Unknown);
        assert_eq!(
            resolve("@request.auth.user_claims_via_uid.cid").await.unwrap(),
            Resolved::Set(vec![])
        );
    }

    #[tokio::test]
    async fn body_paths_and_modifiers() {
        let fixture = Fixture::new();
        let caller = Caller::authenticated("u1", "users");
        let prior = Record::new("j1", [("client", "c1")]);
        let body = Fields::from([("client", Val::from("c2")), ("contact", Val::from("k1"))]);

        let resolve = |op, source| fixture.resolve(op, &caller, Some(&prior), Some(&body), source);

        assert_eq!(
            resolve(Operation::Create, "@request.body.contact.client").await.unwrap(),
            Resolved::Scalar("c1".into())
        );
        assert_eq!(
            resolve(Operation::Update, "@request.body.client:changed").await.unwrap(),
            Resolved::Scalar(true.into())
        );
        assert_eq!(
            resolve(Operation::Create, "@request.body.client:changed").await.unwrap(),
            Resolved::Scalar(false.into())
        );
        assert_eq!(
            resolve(Operation::Update, "@request.body.tags:isset").await.unwrap(),
            Resolved::Scalar(false.into())
        );
        assert_eq!(
            resolve(Operation::Update, "@request.body.contact:isset").await.unwrap(),
            Resolved::Scalar(true.into())
        );
        assert_eq!(
            resolve(Operation::Update, "@request.body.tags").await.unwrap(),
            Resolved::Unknown
        );
    }

    #[tokio::test]
    async fn timestamps() {
        let fixture = Fixture::new();
        let caller = Caller::Anonymous;

        assert_eq!(
            fixture
                .resolve(Operation::List, &caller, None, None, "@yesterday")
                .await
                .unwrap(),
            Resolved::Scalar("2025-01-09T12:00:00.000Z".into())
        );
        assert_eq!(
            fixture
                .resolve(Operation::List, &caller, None, None, "@now")
                .await
                .unwrap(),
            Resolved::Scalar("2025-01-10T12:00:00.000Z".into())
        );
    }

    #[tokio::test]
    async fn structural_errors() {
        let fixture = Fixture::new();
        let caller = Caller::Anonymous;
        let job = Record::new("j1", [("client", "c1")]);
        let resolve = |source| fixture.resolve(Operation::View, &caller, Some(&job), None, source);

        assert!(matches!(
            resolve("client.nickname").await,
            Err(EvaluationError::UnknownField { .. })
        ));
        assert!(matches!(
            resolve("tags.name").await,
            Err(EvaluationError::NotTraversable { .. })
        ));
        assert!(matches!(
            resolve("user_claims_via_uid.id").await,
            Err(EvaluationError::InvalidBackRelation { .. })
        ));
        assert!(matches!(
            resolve("@collection.clients.name").await,
            Err(EvaluationError::UnsupportedCrossCollection(_))
        ));
    }
}
