// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use common::value::Val;

use super::SQLBuilder;

/// A trait for types that can build themselves into an SQL expression.
///
/// Each constituent of an SQL expression (column, predicate, select) implements this trait, which
/// can then be used to hierarchically build an SQL string and the list of parameters to be
/// supplied to it.
pub trait ExpressionBuilder {
    /// Build the SQL expression into the given SQL builder
    fn build(&self, builder: &mut SQLBuilder);

    /// Build the SQL expression into a string and return it along with its parameters. This is
    /// useful for testing/debugging and for stores that execute the SQL themselves.
    fn to_sql(&self) -> (String, Vec<Val>)
    where
        Self: Sized,
    {
        let mut builder = SQLBuilder::new();
        self.build(&mut builder);
        builder.into_sql()
    }
}

impl<T: ExpressionBuilder> ExpressionBuilder for Box<T> {
    fn build(&self, builder: &mut SQLBuilder) {
        self.as_ref().build(builder)
    }
}
