// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Three-valued evaluation of a rule.
//!
//! `&&` and `||` short-circuit left to right. Every non-true outcome carries the path of the node
//! to blame, so that a denial can point at the clause that failed.
//!
//! A comparison against `@collection.X.field` never loads the rows of `X`. It becomes one or two
//! existence checks against the store:
//!
//! - `?=` (and the other `?` operators): some row matches.
//! - `:each`: no row fails to match.
//! - plain operators: no row fails to match, and, if `null` doesn't match either, some row
//!   exists (an empty collection compares as `null`).

use async_recursion::async_recursion;

use common::value::Val;
use rule_model::ast::{ComparisonOp, Expr, Literal, LogicalOp, Modifier, PathExpr, PathRoot, Segment};
use rule_sql::{Column, RowFilter};

use crate::{
    context::EvaluationContext,
    error::EvaluationError,
    resolved::{Operand, Quantifier, Resolved, Truth, compare, compare_scalars},
};

/// The outcome of evaluating a (sub)rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Verdict {
    pub truth: Truth,
    /// Child indices leading to the node responsible for a false or unknown outcome
    pub blame: Vec<usize>,
}

impl Verdict {
    fn new(truth: Truth, blame: Vec<usize>) -> Self {
        Verdict { truth, blame }
    }
}

fn child(pointer: &[usize], index: usize) -> Vec<usize> {
    let mut child = pointer.to_vec();
    child.push(index);
    child
}

/// The `@collection` path of a comparison operand, if it is one.
pub(crate) fn cross_collection_path(expr: &Expr) -> Option<&PathExpr> {
    match expr {
        Expr::Path(path) if matches!(path.root, PathRoot::Collection(_)) => Some(path),
        Expr::Group(inner) => cross_collection_path(inner),
        _ => None,
    }
}

impl<'a> EvaluationContext<'a> {
    pub(crate) async fn evaluate(&self, expr: &Expr) -> Result<Verdict, EvaluationError> {
        self.eval_node(expr, vec![]).await
    }

    #[async_recursion]
    pub(crate) async fn eval_node(
        &self,
        expr: &Expr,
        pointer: Vec<usize>,
    ) -> Result<Verdict, EvaluationError> {
        match expr {
            Expr::Logical(LogicalOp::And, left, right) => {
                let left = self.eval_node(left, child(&pointer, 0)).await?;
                match left.truth {
                    Truth::False => Ok(left),
                    Truth::True => self.eval_node(right, child(&pointer, 1)).await,
                    Truth::Unknown => {
                        let right = self.eval_node(right, child(&pointer, 1)).await?;
                        Ok(if right.truth == Truth::False { right } else { left })
                    }
                }
            }
            Expr::Logical(LogicalOp::Or, left, right) => {
                let left = self.eval_node(left, child(&pointer, 0)).await?;
                if left.truth.is_true() {
                    return Ok(left);
                }
                let right = self.eval_node(right, child(&pointer, 1)).await?;
                let truth = left.truth.or(right.truth);
                // When both sides fail, the disjunction as a whole is to blame
                Ok(Verdict::new(truth, pointer))
            }
            Expr::Not(inner) => {
                let inner = self.eval_node(inner, child(&pointer, 0)).await?;
                Ok(Verdict::new(!inner.truth, pointer))
            }
            Expr::Group(inner) => self.eval_node(inner, child(&pointer, 0)).await,
            Expr::Comparison(op, left, right) => {
                let truth = self.comparison(*op, left, right).await?;
                Ok(Verdict::new(truth, pointer))
            }
            Expr::Literal(Literal::Bool(value)) => Ok(Verdict::new((*value).into(), pointer)),
            Expr::Literal(_) => Err(EvaluationError::NotBoolean(expr.to_string())),
            Expr::Path(path) => {
                let truth = match self.resolve(path).await? {
                    Resolved::Scalar(Val::Bool(value)) => value.into(),
                    Resolved::Scalar(Val::Null) | Resolved::Unknown => Truth::Unknown,
                    _ => return Err(EvaluationError::NotBoolean(expr.to_string())),
                };
                Ok(Verdict::new(truth, pointer))
            }
        }
    }

    async fn comparison(
        &self,
        op: ComparisonOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Truth, EvaluationError> {
        if let Some(path) = cross_collection_path(left) {
            let other = self.operand(right).await?;
            return self.cross_collection(op, path, other).await;
        }
        if let Some(path) = cross_collection_path(right) {
            let other = self.operand(left).await?;
            return self.cross_collection(op.flip(), path, other).await;
        }

        let left = self.operand(left).await?;
        if left.value == Resolved::Unknown {
            return Ok(Truth::Unknown);
        }
        let right = self.operand(right).await?;

        Ok(compare(op, &left, &right))
    }

    /// The value of a comparison operand. Nested boolean expressions become `true`/`false` or
    /// unknown.
    #[async_recursion]
    pub(crate) async fn operand(&self, expr: &Expr) -> Result<Operand, EvaluationError> {
        Ok(match expr {
            Expr::Literal(literal) => Operand::new(Resolved::Scalar(literal.to_val())),
            Expr::Path(path) => Operand {
                value: self.resolve(path).await?,
                each: path.modifier == Some(Modifier::Each),
            },
            Expr::Group(inner) => self.operand(inner).await?,
            _ => Operand::new(self.eval_node(expr, vec![]).await?.truth.into()),
        })
    }

    /// `@collection.X.field op other`, checked with existence queries against `X`. The rows of
    /// `X` are the inner quantifier; the elements of `other` the outer one.
    async fn cross_collection(
        &self,
        op: ComparisonOp,
        path: &PathExpr,
        other: Operand,
    ) -> Result<Truth, EvaluationError> {
        let PathRoot::Collection(name) = &path.root else {
            return Err(EvaluationError::UnsupportedCrossCollection(path.to_string()));
        };
        let target = self
            .schema
            .get(name)
            .ok_or_else(|| EvaluationError::UnknownCollection(name.clone()))?;
        let [Segment::Field(field)] = path.segments.as_slice() else {
            return Err(EvaluationError::UnsupportedCrossCollection(path.to_string()));
        };
        if target.find_field(field).is_none() {
            return Err(EvaluationError::UnknownField {
                collection: target.name.clone(),
                field: field.clone(),
            });
        }

        let each = path.modifier == Some(Modifier::Each);
        let column = if path.modifier == Some(Modifier::Lower) {
            Column::LowerField(field.clone())
        } else {
            Column::Field(field.clone())
        };

        let Some((quantifier, values)) = other.elements(op) else {
            return Ok(Truth::Unknown);
        };

        for value in values {
            let filter = row_filter(op, column.clone(), Column::literal(value.clone()));
            let holds = if op.is_any() && !each {
                self.exists(&target.name, &filter).await?
            } else if self.exists(&target.name, &!filter).await? {
                false
            } else {
                each
                    || compare_scalars(op, &Val::Null, &value)
                    || self.exists(&target.name, &RowFilter::True).await?
            };

            match quantifier {
                Quantifier::Any if holds => return Ok(Truth::True),
                Quantifier::All if !holds => return Ok(Truth::False),
                _ => {}
            }
        }

        Ok((quantifier == Quantifier::All).into())
    }

    async fn exists(&self, collection: &str, filter: &RowFilter) -> Result<bool, EvaluationError> {
        self.guarded(self.store.exists_where(collection, filter)).await
    }
}

/// `left op right` as a row filter. `?` operators filter like their base operator.
pub(crate) fn row_filter(op: ComparisonOp, left: Column, right: Column) -> RowFilter {
    match op.base() {
        ComparisonOp::Eq => RowFilter::eq(left, right),
        ComparisonOp::Neq => RowFilter::neq(left, right),
        ComparisonOp::Lt => RowFilter::Lt(left, right),
        ComparisonOp::Lte => RowFilter::Lte(left, right),
        ComparisonOp::Gt => RowFilter::Gt(left, right),
        _ => RowFilter::Gte(left, right),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use rule_model::{
        collection::{Collection, CollectionType, FieldDef, FieldKind, Operation, Schema},
        compile,
        record::{Fields, Record},
    };

    use super::*;
    use crate::{context::Caller, memory_store::MemoryRecordStore};

    fn schema() -> Schema {
        let users = Collection::new("_pb_users", "users", CollectionType::Auth);
        let clients = Collection::new("pbc_clients", "clients", CollectionType::Base)
            .with_field(FieldDef::new("name", FieldKind::Text));
        let jobs = Collection::new("pbc_jobs", "jobs", CollectionType::Base)
            .with_field(FieldDef::relation("client", "clients").optional())
            .with_field(FieldDef::new("status", FieldKind::Text))
            .with_field(FieldDef::new("tags", FieldKind::Select).multiple());

        Schema::new(vec![users, clients, jobs]).unwrap()
    }

    fn store() -> MemoryRecordStore {
        MemoryRecordStore::from_json(serde_json::json!({
            "clients": [{"id": "c1", "name": "Acme"}, {"id": "c2", "name": "Globex"}],
            "jobs": [
                {"id": "j1", "client": "c1", "status": "open"},
                {"id": "j2", "client": "c1", "status": "closed"}
            ]
        }))
        .unwrap()
    }

    async fn eval_with(
        collection: &str,
        record: &Record,
        body: Option<&Fields>,
        source: &str,
    ) -> Result<Verdict, EvaluationError> {
        let schema = schema();
        let store = store();
        let caller = Caller::authenticated("u1", "users");
        let collection = schema.get(collection).unwrap();
        let context = EvaluationContext::new(
            &schema,
            collection,
            Operation::View,
            &caller,
            Some(record),
            body,
            Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap(),
            &store,
            None,
        );
        context.evaluate(&compile(source).unwrap()).await
    }

    async fn truth(collection: &str, record: &Record, source: &str) -> Truth {
        eval_with(collection, record, None, source).await.unwrap().truth
    }

    fn job() -> Record {
        Record::new(
            "j1",
            [
                ("client", Val::from("c1")),
                ("status", Val::from("open")),
                ("tags", Val::List(vec!["a".into(), "b".into()])),
            ],
        )
    }

    #[tokio::test]
    async fn connectives_are_kleene() {
        let job = job();
        // `client.name` is known, `missing` is absent from the record
        let cases = [
            ("status = 'open' && client.name = 'Acme'", Truth::True),
            ("status = 'open' && missing = 1", Truth::Unknown),
            ("status = 'x' && missing = 1", Truth::False),
            ("missing = 1 && status = 'x'", Truth::False),
            ("missing = 1 || status = 'open'", Truth::True),
            ("missing = 1 || status = 'x'", Truth::Unknown),
            ("NOT (missing = 1)", Truth::Unknown),
            ("NOT (status = 'x')", Truth::True),
            ("(status = 'open') = true", Truth::True),
            ("true", Truth::True),
        ];

        let schema = schema();
        let jobs = schema.get("jobs").unwrap().clone();
        let schema = schema
            .with_collection(jobs.with_field(FieldDef::new("missing", FieldKind::Number)))
            .unwrap();
        let store = store();
        let caller = Caller::Anonymous;
        let now = Utc::now();

        for (source, expected) in cases {
            let context = EvaluationContext::new(
                &schema,
                schema.get("jobs").unwrap(),
                Operation::View,
                &caller,
                Some(&job),
                None,
                now,
                &store,
                None,
            );
            let verdict = context.evaluate(&compile(source).unwrap()).await.unwrap();
            assert_eq!(verdict.truth, expected, "{source}");
        }
    }

    #[tokio::test]
    async fn blame_points_at_the_failing_clause() {
        let rule = "@request.auth.id != '' && (status = 'closed' || client = 'c2')";
        let verdict = eval_with("jobs", &job(), None, rule).await.unwrap();

        assert_eq!(verdict.truth, Truth::False);
        assert_eq!(verdict.blame, vec![1, 0]);

        let expr = compile(rule).unwrap();
        assert_eq!(
            expr.node_at(&verdict.blame).unwrap().to_string(),
            "status = 'closed' || client = 'c2'"
        );

        let verdict = eval_with("jobs", &job(), None, "status = 'open' && tags ?= 'z'")
            .await
            .unwrap();
        assert_eq!(verdict.blame, vec![1]);
    }

    #[tokio::test]
    async fn set_operators() {
        let job = job();
        assert_eq!(truth("jobs", &job, "tags ?= 'a'").await, Truth::True);
        assert_eq!(truth("jobs", &job, "tags ?= 'z'").await, Truth::False);
        assert_eq!(truth("jobs", &job, "tags:each != 'z'").await, Truth::True);
        assert_eq!(truth("jobs", &job, "tags:each ?= 'a'").await, Truth::False);
        assert_eq!(truth("jobs", &job, "tags:length = 2").await, Truth::True);
    }

    #[tokio::test]
    async fn cross_collection_existence() {
        let c1 = Record::new("c1", [("name", "Acme")]);
        let c2 = Record::new("c2", [("name", "Globex")]);

        // Jobs reference c1 only
        assert_eq!(truth("clients", &c1, "@collection.jobs.client != id").await, Truth::False);
        assert_eq!(truth("clients", &c2, "@collection.jobs.client != id").await, Truth::True);
        assert_eq!(truth("clients", &c1, "@collection.jobs.client ?= id").await, Truth::True);
        assert_eq!(truth("clients", &c2, "id ?= @collection.jobs.client").await, Truth::False);
        assert_eq!(
            truth("clients", &c1, "@collection.jobs.status:each = 'open'").await,
            Truth::False
        );
        assert_eq!(
            truth("clients", &c1, "@collection.jobs.client:each = 'c1'").await,
            Truth::True
        );
        assert_eq!(
            truth("clients", &c1, "@collection.jobs.status:lower ?= 'CLOSED'").await,
            Truth::False
        );
        assert_eq!(
            truth("clients", &c1, "@collection.jobs.status ?= 'closed'").await,
            Truth::True
        );
        // All jobs share the client, so the universal reading holds
        assert_eq!(truth("clients", &c1, "@collection.jobs.client = 'c1'").await, Truth::True);
        assert_eq!(
            truth("clients", &c1, "@collection.clients.name ?= 'Globex'").await,
            Truth::True
        );
    }

    #[tokio::test]
    async fn structural_errors_are_not_false() {
        let result = eval_with("jobs", &job(), None, "'text'").await;
        assert!(matches!(result, Err(EvaluationError::NotBoolean(_))));

        let result = eval_with("jobs", &job(), None, "status.name = 'x'").await;
        assert!(matches!(result, Err(EvaluationError::NotTraversable { .. })));
    }
}
