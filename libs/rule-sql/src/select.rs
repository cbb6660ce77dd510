// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use super::{ExpressionBuilder, RowFilter, SQLBuilder};

/// `SELECT * FROM "<table>" WHERE <predicate>`
#[derive(Debug)]
pub struct Select<'a> {
    pub table: &'a str,
    pub predicate: &'a RowFilter,
}

impl ExpressionBuilder for Select<'_> {
    fn build(&self, builder: &mut SQLBuilder) {
        builder.push_str("SELECT * FROM ");
        builder.push_identifier(self.table);
        push_where(self.predicate, builder);
    }
}

fn push_where(predicate: &RowFilter, builder: &mut SQLBuilder) {
    // A trivially true filter needs no WHERE clause
    if !predicate.is_true() {
        builder.push_str(" WHERE ");
        predicate.build(builder);
    }
}
