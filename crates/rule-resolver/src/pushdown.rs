// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Translation of list rules into row filters for the store.
//!
//! Parts of the rule that don't mention the row (the caller, the time) are evaluated once, up
//! front, to `true` or `false`. Comparisons between the collection's own single-valued fields and
//! such values become filter predicates. Anything else (relations, back-relations, cross-collection
//! checks) can't be expressed as a filter on the row and is widened to `true`; the plan is then
//! inexact and every returned row is evaluated against the rule.
//!
//! An exact filter agrees with the rule on every row, unknowns included. An inexact one returns a
//! superset of the rows the rule allows.

use async_recursion::async_recursion;

use common::value::Val;
use rule_model::ast::{ComparisonOp, Expr, LogicalOp, Modifier, PathRoot, Segment};
use rule_model::collection::FieldKind;
use rule_sql::{Column, ExpressionBuilder, RowFilter, Select};

use crate::{
    context::EvaluationContext,
    error::EvaluationError,
    evaluator::{cross_collection_path, row_filter},
    resolved::{Resolved, Truth},
};

/// A list rule as a store filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPlan {
    pub filter: RowFilter,
    /// Whether `filter` selects exactly the rows the rule allows. When it doesn't, it selects a
    /// superset and rows must still be evaluated one by one.
    pub exact: bool,
}

impl ListPlan {
    /// Every row, with no further checks.
    pub fn allow_all() -> Self {
        ListPlan {
            filter: RowFilter::True,
            exact: true,
        }
    }

    /// Every row, each to be evaluated against the rule.
    pub fn evaluate_all() -> Self {
        ListPlan {
            filter: RowFilter::True,
            exact: false,
        }
    }

    /// The `SELECT` statement for this plan, with its parameters.
    pub fn to_sql(&self, table: &str) -> (String, Vec<Val>) {
        Select {
            table,
            predicate: &self.filter,
        }
        .to_sql()
    }
}

enum Pushdown {
    Exact(RowFilter),
    Superset(RowFilter),
}

impl Pushdown {
    fn combine(self, other: Pushdown, op: fn(RowFilter, RowFilter) -> RowFilter) -> Pushdown {
        match (self, other) {
            (Pushdown::Exact(left), Pushdown::Exact(right)) => Pushdown::Exact(op(left, right)),
            (Pushdown::Exact(left) | Pushdown::Superset(left), Pushdown::Exact(right) | Pushdown::Superset(right)) => {
                Pushdown::Superset(op(left, right))
            }
        }
    }
}

/// Whether the value of `expr` depends on the row being filtered.
fn depends_on_row(expr: &Expr) -> bool {
    expr.paths()
        .iter()
        .any(|path| path.root == PathRoot::Record)
}

impl<'a> EvaluationContext<'a> {
    /// Plan a list rule. The context must not carry a record.
    pub(crate) async fn plan_list(&self, expr: &Expr) -> Result<ListPlan, EvaluationError> {
        Ok(match self.push_down(expr).await? {
            Pushdown::Exact(filter) => ListPlan {
                filter,
                exact: true,
            },
            Pushdown::Superset(filter) => ListPlan {
                filter,
                exact: false,
            },
        })
    }

    #[async_recursion]
    async fn push_down(&self, expr: &Expr) -> Result<Pushdown, EvaluationError> {
        if !depends_on_row(expr) {
            return Ok(match self.evaluate(expr).await?.truth {
                Truth::True => Pushdown::Exact(RowFilter::True),
                Truth::False => Pushdown::Exact(RowFilter::False),
                Truth::Unknown => Pushdown::Superset(RowFilter::True),
            });
        }

        match expr {
            Expr::Logical(LogicalOp::And, left, right) => {
                let left = self.push_down(left).await?;
                if let Pushdown::Exact(RowFilter::False) = left {
                    return Ok(left);
                }
                let right = self.push_down(right).await?;
                Ok(left.combine(right, RowFilter::and))
            }
            Expr::Logical(LogicalOp::Or, left, right) => {
                let left = self.push_down(left).await?;
                if let Pushdown::Exact(RowFilter::True) = left {
                    return Ok(left);
                }
                let right = self.push_down(right).await?;
                Ok(left.combine(right, RowFilter::or))
            }
            // Negating a superset doesn't give a superset of the negation
            Expr::Not(inner) => Ok(match self.push_down(inner).await? {
                Pushdown::Exact(filter) => Pushdown::Exact(!filter),
                Pushdown::Superset(_) => Pushdown::Superset(RowFilter::True),
            }),
            Expr::Group(inner) => self.push_down(inner).await,
            Expr::Comparison(op, left, right) => self.push_down_comparison(*op, left, right).await,
            Expr::Literal(_) | Expr::Path(_) => Ok(Pushdown::Superset(RowFilter::True)),
        }
    }

    async fn push_down_comparison(
        &self,
        op: ComparisonOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Pushdown, EvaluationError> {
        if cross_collection_path(left).is_some() || cross_collection_path(right).is_some() {
            return Ok(Pushdown::Superset(RowFilter::True));
        }

        match (self.row_column(left), self.row_column(right)) {
            (Some(left), Some(right)) => Ok(Pushdown::Exact(row_filter(op, left, right))),
            (Some(column), None) if !depends_on_row(right) => {
                Ok(match self.row_independent_value(right).await? {
                    Some(value) => Pushdown::Exact(row_filter(op, column, Column::literal(value))),
                    None => Pushdown::Superset(RowFilter::True),
                })
            }
            (None, Some(column)) if !depends_on_row(left) => {
                Ok(match self.row_independent_value(left).await? {
                    Some(value) => Pushdown::Exact(row_filter(op, Column::literal(value), column)),
                    None => Pushdown::Superset(RowFilter::True),
                })
            }
            _ => Ok(Pushdown::Superset(RowFilter::True)),
        }
    }

    /// The column for a single-valued field of the collection itself, if `expr` is one.
    fn row_column(&self, expr: &Expr) -> Option<Column> {
        let path = match expr {
            Expr::Group(inner) => return self.row_column(inner),
            Expr::Path(path) if path.root == PathRoot::Record => path,
            _ => return None,
        };

        let [Segment::Field(name)] = path.segments.as_slice() else {
            return None;
        };
        let field = self.collection.find_field(name)?;
        if field.multiple || field.kind == FieldKind::Json {
            return None;
        }

        match path.modifier {
            None => Some(Column::Field(name.clone())),
            Some(Modifier::Lower) => Some(Column::LowerField(name.clone())),
            Some(_) => None,
        }
    }

    async fn row_independent_value(&self, expr: &Expr) -> Result<Option<Val>, EvaluationError> {
        Ok(match self.operand(expr).await?.value {
            Resolved::Scalar(value) => Some(value),
            Resolved::Set(_) | Resolved::Unknown => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use rule_model::{
        collection::{Collection, CollectionType, FieldDef, Operation, Schema},
        compile,
    };

    use super::*;
    use crate::{context::Caller, memory_store::MemoryRecordStore};

    fn schema() -> Schema {
        let users = Collection::new("_pb_users", "users", CollectionType::Auth)
            .with_field(FieldDef::new("role", FieldKind::Text));
        let profiles = Collection::new("pbc_profiles", "profiles", CollectionType::Base)
            .with_field(FieldDef::relation("uid", "users"))
            .with_field(FieldDef::relation("manager", "users").optional())
            .with_field(FieldDef::new("name", FieldKind::Text))
            .with_field(FieldDef::new("tags", FieldKind::Select).multiple());

        Schema::new(vec![users, profiles]).unwrap()
    }

    async fn plan_for(caller: Caller, source: &str) -> ListPlan {
        let schema = schema();
        let store = MemoryRecordStore::from_json(serde_json::json!({
            "users": [{"id": "u1", "role": "admin"}]
        }))
        .unwrap();
        let context = EvaluationContext::new(
            &schema,
            schema.get("profiles").unwrap(),
            Operation::List,
            &caller,
            None,
            None,
            Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap(),
            &store,
            None,
        );
        context.plan_list(&compile(source).unwrap()).await.unwrap()
    }

    fn field_is(field: &str, value: &str) -> RowFilter {
        RowFilter::eq(Column::field(field), Column::literal(Val::from(value)))
    }

    #[tokio::test]
    async fn owner_rule_is_exact() {
        let plan = plan_for(
            Caller::authenticated("u1", "users"),
            r#"@request.auth.id != "" && (uid = @request.auth.id || manager = @request.auth.id)"#,
        )
        .await;

        assert!(plan.exact);
        assert_eq!(
            plan.filter,
            RowFilter::or(field_is("uid", "u1"), field_is("manager", "u1"))
        );
        assert_eq!(
            plan.to_sql("profiles"),
            (
                r#"SELECT * FROM "profiles" WHERE ("uid" = $1 OR "manager" = $2)"#.to_string(),
                vec![Val::from("u1"), Val::from("u1")]
            )
        );
    }

    #[tokio::test]
    async fn row_independent_parts_fold() {
        let plan = plan_for(Caller::Anonymous, r#"@request.auth.id != "" && uid = @request.auth.id"#).await;
        assert_eq!(plan, ListPlan { filter: RowFilter::False, exact: true });

        let plan = plan_for(
            Caller::authenticated("u1", "users"),
            r#"@request.auth.role = "admin" || uid = @request.auth.id"#,
        )
        .await;
        assert_eq!(plan, ListPlan::allow_all());
    }

    #[tokio::test]
    async fn unknown_row_independent_parts_widen() {
        // The anonymous caller has no role: unknown for every row
        let plan = plan_for(Caller::Anonymous, r#"@request.auth.role = "admin" || name = "x""#).await;
        assert_eq!(
            plan,
            ListPlan {
                filter: RowFilter::True,
                exact: false
            }
        );
    }

    #[tokio::test]
    async fn relations_and_sets_stay_in_memory() {
        let caller = Caller::authenticated("u1", "users");

        let plan = plan_for(caller.clone(), r#"name = "x" && uid.role = "admin""#).await;
        assert_eq!(plan.filter, field_is("name", "x"));
        assert!(!plan.exact);

        let plan = plan_for(caller.clone(), r#"tags ?= "a""#).await;
        assert_eq!(plan, ListPlan::evaluate_all());

        let plan = plan_for(caller.clone(), r#"NOT (name = "x" && uid.role = "admin")"#).await;
        assert_eq!(plan, ListPlan::evaluate_all());

        let plan = plan_for(caller, r#"NOT (name = "x")"#).await;
        assert_eq!(
            plan,
            ListPlan {
                filter: RowFilter::neq(Column::field("name"), Column::literal("x".into())),
                exact: true
            }
        );
    }

    #[tokio::test]
    async fn lower_and_field_to_field() {
        let plan = plan_for(Caller::Anonymous, r#"name:lower = "x" || uid = manager"#).await;
        assert!(plan.exact);
        assert_eq!(
            plan.filter,
            RowFilter::or(
                RowFilter::eq(Column::LowerField("name".into()), Column::literal("x".into())),
                RowFilter::eq(Column::field("uid"), Column::field("manager"))
            )
        );
    }
}
