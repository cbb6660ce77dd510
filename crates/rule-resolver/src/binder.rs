// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{borrow::Cow, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, instrument, warn};

use common::{
    env_const::{
        DEFAULT_SUPERUSER_COLLECTION, get_eval_timeout, get_superuser_collection,
        is_list_pushdown_enabled,
    },
    value::Val,
};
use rule_env::{EnvError, Environment};
use rule_model::{
    ast::{AstPointer, Expr},
    collection::{Collection, Operation, Schema},
    error::{RuleParseError, SchemaError},
    record::Record,
    validation::validate_collection,
};

use crate::{
    cache::RuleCache,
    context::{Caller, Evaluate, EvaluationContext, ListRequest, guarded},
    decision::{Decision, RuleErrorKind},
    error::EvaluationError,
    pushdown::ListPlan,
    store::RecordStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    /// Id or name of the collection whose callers bypass every rule
    pub superuser_collection: String,
    /// Deadline for evaluations whose request doesn't carry one
    pub eval_timeout: Option<Duration>,
    /// Whether list rules are translated into store filters. When off, every row is evaluated.
    pub list_pushdown: bool,
}

impl Default for BinderConfig {
    fn default() -> Self {
        BinderConfig {
            superuser_collection: DEFAULT_SUPERUSER_COLLECTION.to_string(),
            eval_timeout: None,
            list_pushdown: true,
        }
    }
}

impl BinderConfig {
    pub fn from_env(env: &dyn Environment) -> Result<Self, EnvError> {
        Ok(BinderConfig {
            superuser_collection: get_superuser_collection(env),
            eval_timeout: get_eval_timeout(env)?,
            list_pushdown: is_list_pushdown_enabled(env)?,
        })
    }
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Rule(#[from] RuleParseError),
}

#[derive(Error, Debug)]
pub enum ListError {
    /// The list rule is null and the caller is not a superuser
    #[error("Listing is restricted to superusers")]
    Forbidden,

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl ListError {
    pub fn status_code(&self) -> u16 {
        match self {
            ListError::Forbidden => 403,
            ListError::Evaluation(error) => RuleErrorKind::from(error).status_code(),
        }
    }
}

/// How a list request is to be filtered.
enum ListRule {
    Unrestricted,
    Rule(Arc<Expr>),
}

/// Binds the rules of a schema to requests and decides them.
///
/// The schema can be replaced one collection at a time with [`RuleBinder::save_collection`];
/// evaluations already in flight keep the schema they started with.
pub struct RuleBinder {
    schema: RwLock<Arc<Schema>>,
    store: Arc<dyn RecordStore>,
    cache: RuleCache,
    config: BinderConfig,
}

impl RuleBinder {
    pub fn new(schema: Schema, store: Arc<dyn RecordStore>, config: BinderConfig) -> Self {
        RuleBinder {
            schema: RwLock::new(Arc::new(schema)),
            store,
            cache: RuleCache::new(),
            config,
        }
    }

    pub async fn schema(&self) -> Arc<Schema> {
        self.schema.read().await.clone()
    }

    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    /// Add or replace a collection. Every rule of the collection must parse and validate against
    /// the resulting schema, otherwise the schema is left unchanged.
    pub async fn save_collection(&self, collection: Collection) -> Result<(), SaveError> {
        let mut writer = self.schema.write().await;

        let saved = writer.with_collection(collection.clone())?;
        validate_collection(&saved, &collection)?;

        let previous = writer
            .collections()
            .iter()
            .find(|existing| existing.id == collection.id)
            .map(|existing| {
                existing
                    .rule_sources()
                    .map(|(_, source)| source.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        *writer = Arc::new(saved);
        drop(writer);

        self.cache.evict(previous.iter().map(String::as_str)).await;
        debug!(collection = %collection.name, "Saved collection");
        Ok(())
    }

    #[instrument(
        name = "RuleBinder::evaluate",
        skip_all,
        fields(collection = %request.collection_id, op = %request.op)
    )]
    pub async fn evaluate(&self, request: &Evaluate) -> Decision {
        let decision = self
            .decide(request)
            .await
            .unwrap_or_else(Decision::from);

        match &decision {
            Decision::Allow => {}
            Decision::Deny { pointer } => debug!(?pointer, "Denied"),
            Decision::RuleError { kind, message } => warn!(?kind, %message, "Rule error"),
        }
        decision
    }

    async fn decide(&self, request: &Evaluate) -> Result<Decision, EvaluationError> {
        let schema = self.schema().await;
        let collection = find_collection(&schema, &request.collection_id)?;

        if self.is_superuser(&schema, &request.caller) {
            return Ok(Decision::Allow);
        }
        let Some(source) = collection.rule(request.op) else {
            return Ok(Decision::Deny { pointer: None });
        };
        if source.trim().is_empty() {
            return Ok(Decision::Allow);
        }

        let expr = self.cache.get_or_compile(source).await?;
        let deadline = self.deadline(request.deadline);
        let record = self.record_under_test(collection, request, deadline).await?;
        let body = match request.op {
            Operation::Create | Operation::Update => request.body.as_ref(),
            _ => None,
        };

        let context = EvaluationContext::new(
            &schema,
            collection,
            request.op,
            &request.caller,
            Some(record.as_ref()),
            body,
            request.now,
            self.store.as_ref(),
            deadline,
        );
        let verdict = context.evaluate(&expr).await?;

        if verdict.truth.is_true() {
            return Ok(Decision::Allow);
        }
        let clause = expr
            .node_at(&verdict.blame)
            .map(ToString::to_string)
            .unwrap_or_else(|| expr.to_string());
        Ok(Decision::Deny {
            pointer: Some(AstPointer {
                path: verdict.blame,
                clause,
            }),
        })
    }

    /// The record a rule sees: on create, the one the body proposes; otherwise the stored one,
    /// loaded by id if the request doesn't carry it.
    async fn record_under_test<'r>(
        &self,
        collection: &Collection,
        request: &'r Evaluate,
        deadline: Option<Instant>,
    ) -> Result<Cow<'r, Record>, EvaluationError> {
        if request.op == Operation::Create {
            let body = request.body.clone().unwrap_or_default();
            let id = match body.get("id") {
                Some(Val::String(id)) => id.clone(),
                _ => String::new(),
            };
            return Ok(Cow::Owned(Record::new(id, body)));
        }

        if let Some(record) = &request.record {
            return Ok(Cow::Borrowed(record));
        }
        let Some(id) = &request.record_id else {
            return Err(EvaluationError::MissingRecord(request.op));
        };

        guarded(deadline, self.store.find_by_id(&collection.name, id))
            .await?
            .map(Cow::Owned)
            .ok_or_else(|| EvaluationError::RecordNotFound {
                collection: collection.name.clone(),
                id: id.clone(),
            })
    }

    /// The store filter for a list request, and whether rows still need checking.
    #[instrument(
        name = "RuleBinder::plan_list",
        skip_all,
        fields(collection = %request.collection_id)
    )]
    pub async fn plan_list(&self, request: &ListRequest) -> Result<ListPlan, ListError> {
        let schema = self.schema().await;
        let collection = find_collection(&schema, &request.collection_id)?;
        let deadline = self.deadline(request.deadline);

        let (plan, _) = self.plan(&schema, collection, request, deadline).await?;
        Ok(plan)
    }

    /// The records of a collection the caller may list.
    #[instrument(
        name = "RuleBinder::list",
        skip_all,
        fields(collection = %request.collection_id)
    )]
    pub async fn list(&self, request: &ListRequest) -> Result<Vec<Record>, ListError> {
        let schema = self.schema().await;
        let collection = find_collection(&schema, &request.collection_id)?;
        let deadline = self.deadline(request.deadline);

        let (plan, expr) = self.plan(&schema, collection, request, deadline).await?;
        let rows = guarded(
            deadline,
            self.store
                .select_rows_filtered(&collection.name, &plan.filter),
        )
        .await?;

        let Some(expr) = expr.filter(|_| !plan.exact) else {
            return Ok(rows);
        };

        let fetched = rows.len();
        let mut visible = Vec::with_capacity(fetched);
        for row in rows {
            let context = EvaluationContext::new(
                &schema,
                collection,
                Operation::List,
                &request.caller,
                Some(&row),
                None,
                request.now,
                self.store.as_ref(),
                deadline,
            );
            if context.evaluate(&expr).await?.truth.is_true() {
                visible.push(row);
            }
        }

        debug!(fetched, visible = visible.len(), "Filtered listed rows");
        Ok(visible)
    }

    async fn plan(
        &self,
        schema: &Schema,
        collection: &Collection,
        request: &ListRequest,
        deadline: Option<Instant>,
    ) -> Result<(ListPlan, Option<Arc<Expr>>), ListError> {
        let expr = match self.list_rule(schema, collection, &request.caller).await? {
            ListRule::Unrestricted => return Ok((ListPlan::allow_all(), None)),
            ListRule::Rule(expr) => expr,
        };

        if !self.config.list_pushdown {
            return Ok((ListPlan::evaluate_all(), Some(expr)));
        }

        let context = EvaluationContext::new(
            schema,
            collection,
            Operation::List,
            &request.caller,
            None,
            None,
            request.now,
            self.store.as_ref(),
            deadline,
        );
        let plan = context.plan_list(&expr).await?;
        debug!(exact = plan.exact, filter = ?plan.filter, "Planned list");
        Ok((plan, Some(expr)))
    }

    async fn list_rule(
        &self,
        schema: &Schema,
        collection: &Collection,
        caller: &Caller,
    ) -> Result<ListRule, ListError> {
        if self.is_superuser(schema, caller) {
            return Ok(ListRule::Unrestricted);
        }

        match collection.rule(Operation::List) {
            None => Err(ListError::Forbidden),
            Some(source) if source.trim().is_empty() => Ok(ListRule::Unrestricted),
            Some(source) => {
                let expr = self
                    .cache
                    .get_or_compile(source)
                    .await
                    .map_err(EvaluationError::from)?;
                Ok(ListRule::Rule(expr))
            }
        }
    }

    fn is_superuser(&self, schema: &Schema, caller: &Caller) -> bool {
        let Caller::Authenticated { collection_id, .. } = caller else {
            return false;
        };
        let superusers = &self.config.superuser_collection;

        collection_id == superusers
            || schema
                .get(collection_id)
                .is_some_and(|collection| collection.matches(superusers))
    }

    fn deadline(&self, requested: Option<Instant>) -> Option<Instant> {
        requested.or_else(|| {
            self.config
                .eval_timeout
                .map(|timeout| Instant::now() + timeout)
        })
    }
}

fn find_collection<'s>(schema: &'s Schema, id_or_name: &str) -> Result<&'s Collection, EvaluationError> {
    schema
        .get(id_or_name)
        .ok_or_else(|| EvaluationError::UnknownCollection(id_or_name.to_string()))
}
