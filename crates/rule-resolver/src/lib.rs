// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Evaluation of access rules against records.
//!
//! The [`RuleBinder`] is the entry point: given an [`Evaluate`] request, it finds the rule for
//! the collection and operation, binds it to the caller, the record, the request body and the
//! evaluation time, and produces a [`Decision`]. Records reachable through relations are read from
//! a [`RecordStore`], one indexed read at a time.
//!
//! Evaluation is three-valued: a value that cannot be known (an unset optional relation, a field
//! missing from the record) makes comparisons unknown rather than failing, and an unknown result
//! at the top denies.

mod binder;
mod cache;
mod context;
mod decision;
mod error;
mod evaluator;
mod memory_store;
mod path_resolver;
mod pushdown;
mod resolved;
mod store;

pub use binder::{BinderConfig, ListError, RuleBinder, SaveError};
pub use cache::RuleCache;
pub use context::{Caller, Evaluate, ListRequest};
pub use decision::{Decision, RuleErrorKind};
pub use error::EvaluationError;
pub use memory_store::MemoryRecordStore;
pub use pushdown::ListPlan;
pub use resolved::{Resolved, Truth};
pub use store::{RecordStore, StoreError};
