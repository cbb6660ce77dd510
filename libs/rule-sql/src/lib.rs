// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Row filters over a single collection.
//!
//! A [`RowFilter`] is what the rule engine hands to the record store: the part of a list rule that
//! could be pushed down, or the condition of an indexed existence check. It can be rendered to a
//! parameterised SQL `WHERE` clause ([`ExpressionBuilder`]) or evaluated directly against a row
//! ([`RowFilter::matches`]) by stores that don't speak SQL.

mod column;
mod eval;
mod expression_builder;
mod predicate;
mod select;
mod sql_builder;

pub use column::Column;
pub use eval::RowValues;
pub use expression_builder::ExpressionBuilder;
pub use predicate::{ParamEquality, Predicate, RowFilter};
pub use select::Select;
pub use sql_builder::SQLBuilder;
