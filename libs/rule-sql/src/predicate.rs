// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use super::{Column, ExpressionBuilder, SQLBuilder};

/// A predicate is a boolean expression that can be used in a WHERE clause.
#[derive(Debug, PartialEq, Clone)]
pub enum Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    True,
    False,
    Eq(C, C),
    Neq(C, C),
    Lt(C, C),
    Lte(C, C),
    Gt(C, C),
    Gte(C, C),
    /// The first column's value is an element of the second (list-valued) column
    In(C, C),

    // Prefer Predicate::and(), which simplifies the clause
    And(Box<Predicate<C>>, Box<Predicate<C>>),
    // Prefer Predicate::or(), which simplifies the clause
    Or(Box<Predicate<C>>, Box<Predicate<C>>),
    // Prefer Predicate::not(), which simplifies the clause
    Not(Box<Predicate<C>>),
}

pub type RowFilter = Predicate<Column>;

impl<C> Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    /// Compare two columns and reduce to a simpler predicate if possible.
    pub fn eq(lhs: C, rhs: C) -> Predicate<C> {
        match lhs.param_eq(&rhs) {
            Some(result) => result.into(),
            None => Predicate::Eq(lhs, rhs),
        }
    }

    /// Compare two columns and reduce to a simpler predicate if possible
    pub fn neq(lhs: C, rhs: C) -> Predicate<C> {
        match lhs.param_eq(&rhs) {
            Some(result) => (!result).into(),
            None => Predicate::Neq(lhs, rhs),
        }
    }

    /// Logical and of two predicates, reducing to a simpler predicate if possible.
    pub fn and(lhs: Predicate<C>, rhs: Predicate<C>) -> Predicate<C> {
        match (lhs, rhs) {
            (Predicate::False, _) | (_, Predicate::False) => Predicate::False,
            (Predicate::True, rhs) => rhs,
            (lhs, Predicate::True) => lhs,
            (lhs, rhs) if lhs == rhs => lhs,
            (lhs, rhs) => Predicate::And(Box::new(lhs), Box::new(rhs)),
        }
    }

    /// Logical or of two predicates, reducing to a simpler predicate if possible.
    pub fn or(lhs: Predicate<C>, rhs: Predicate<C>) -> Predicate<C> {
        match (lhs, rhs) {
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (Predicate::False, rhs) => rhs,
            (lhs, Predicate::False) => lhs,
            (lhs, rhs) if lhs == rhs => lhs,
            (lhs, rhs) => Predicate::Or(Box::new(lhs), Box::new(rhs)),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Predicate::False)
    }
}

impl<C> From<bool> for Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    fn from(b: bool) -> Predicate<C> {
        if b { Predicate::True } else { Predicate::False }
    }
}

impl<C> std::ops::Not for Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    type Output = Predicate<C>;

    fn not(self) -> Self::Output {
        match self {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Eq(lhs, rhs) => Predicate::Neq(lhs, rhs),
            Predicate::Neq(lhs, rhs) => Predicate::Eq(lhs, rhs),
            Predicate::Not(predicate) => *predicate,
            // Ordering comparisons between incomparable values are false both ways, so `NOT (a < b)`
            // is not `a >= b` and has to stay wrapped.
            predicate => Predicate::Not(Box::new(predicate)),
        }
    }
}

/// Compare two parameters so that we can reduce a predicate to a boolean before passing it to
/// the store. With a simpler form, we may be able to skip the store completely. For example,
/// `Predicate::Eq(Column::Param(1), Column::Param(1))` can be reduced to true.
pub trait ParamEquality {
    /// Returns `None` if one of the columns is not a parameter, otherwise returns `Some(true)` if
    /// the parameters are equal, and `Some(false)` if they are not.
    fn param_eq(&self, other: &Self) -> Option<bool>;
}

impl ExpressionBuilder for RowFilter {
    /// Build a predicate into a SQL string.
    ///
    /// A stored `NULL` is a value like any other: `"hours" <> 2` holds for a null `hours`, and
    /// ordering comparisons involving it are false. Negations are pushed down to the comparisons so
    /// that no comparison under a `NOT` can be `NULL`.
    fn build(&self, builder: &mut SQLBuilder) {
        build_predicate(self, false, builder);
    }
}

fn build_predicate(predicate: &RowFilter, negated: bool, builder: &mut SQLBuilder) {
    match predicate {
        RowFilter::True | RowFilter::False => {
            let holds = predicate.is_true() != negated;
            builder.push_str(if holds { "TRUE" } else { "FALSE" });
        }
        RowFilter::Eq(column1, column2) if negated => build_neq(column1, column2, builder),
        RowFilter::Eq(column1, column2) => build_eq(column1, column2, builder),
        RowFilter::Neq(column1, column2) if negated => build_eq(column1, column2, builder),
        RowFilter::Neq(column1, column2) => build_neq(column1, column2, builder),
        RowFilter::Lt(column1, column2) => ordering(column1, column2, "<", negated, builder),
        RowFilter::Lte(column1, column2) => ordering(column1, column2, "<=", negated, builder),
        RowFilter::Gt(column1, column2) => ordering(column1, column2, ">", negated, builder),
        RowFilter::Gte(column1, column2) => ordering(column1, column2, ">=", negated, builder),
        RowFilter::In(column1, column2) => {
            if negated {
                builder.push_str("NOT(COALESCE(");
            }
            column1.build(builder);
            builder.push_str(" = ANY(");
            column2.build(builder);
            builder.push(')');
            if negated {
                builder.push_str(", FALSE))");
            }
        }
        RowFilter::And(predicate1, predicate2) => {
            let op = if negated { "OR" } else { "AND" };
            logical_combine(predicate1, predicate2, op, negated, builder)
        }
        RowFilter::Or(predicate1, predicate2) => {
            let op = if negated { "AND" } else { "OR" };
            logical_combine(predicate1, predicate2, op, negated, builder)
        }
        RowFilter::Not(predicate) => build_predicate(predicate, !negated, builder),
    }
}

/// Equality where a `NULL` on one side never makes the comparison true. Outside a negation, a
/// comparison that is `NULL` rejects the row just like `FALSE`, so only field-to-field equality
/// (where two nulls are equal) needs the null-safe form.
fn build_eq(column1: &Column, column2: &Column, builder: &mut SQLBuilder) {
    match (column1, column2) {
        (column, Column::Null) | (Column::Null, column) => {
            column.build(builder);
            builder.push_str(" IS NULL");
        }
        (Column::Param(_), _) | (_, Column::Param(_)) => {
            relational_combine(column1, column2, "=", builder)
        }
        _ => relational_combine(column1, column2, "IS NOT DISTINCT FROM", builder),
    }
}

fn build_neq(column1: &Column, column2: &Column, builder: &mut SQLBuilder) {
    match (column1, column2) {
        (column, Column::Null) | (Column::Null, column) => {
            column.build(builder);
            builder.push_str(" IS NOT NULL");
        }
        _ => relational_combine(column1, column2, "IS DISTINCT FROM", builder),
    }
}

/// An ordering comparison. Negated, a `NULL` operand makes the comparison false before negating.
fn ordering(
    column1: &Column,
    column2: &Column,
    op: &'static str,
    negated: bool,
    builder: &mut SQLBuilder,
) {
    if negated {
        builder.push_str("NOT(COALESCE(");
        relational_combine(column1, column2, op, builder);
        builder.push_str(", FALSE))");
    } else {
        relational_combine(column1, column2, op, builder);
    }
}

/// Combine two expressions with a relational operator.
fn relational_combine<E1: ExpressionBuilder, E2: ExpressionBuilder>(
    left: &E1,
    right: &E2,
    op: &'static str,
    builder: &mut SQLBuilder,
) {
    left.build(builder);
    builder.push_space();
    builder.push_str(op);
    builder.push_space();
    right.build(builder);
}

/// Combine two predicates with a logical binary operator.
fn logical_combine(
    left: &RowFilter,
    right: &RowFilter,
    op: &'static str,
    negated: bool,
    builder: &mut SQLBuilder,
) {
    builder.push('(');
    build_predicate(left, negated, builder);
    builder.push_space();
    builder.push_str(op);
    builder.push_space();
    build_predicate(right, negated, builder);
    builder.push(')');
}

#[cfg(test)]
mod tests {
    use common::value::Val;

    use super::*;

    #[test]
    fn true_predicate() {
        assert_eq!(RowFilter::True.to_sql().0, "TRUE");
    }

    #[test]
    fn eq_predicate() {
        let predicate = RowFilter::eq(Column::field("uid"), Column::literal(Val::from("u1")));
        let (sql, params) = predicate.to_sql();

        assert_eq!(sql, r#""uid" = $1"#);
        assert_eq!(params, vec![Val::from("u1")]);
    }

    #[test]
    fn null_comparisons() {
        let is_null = RowFilter::eq(Column::field("manager"), Column::literal(Val::Null));
        let is_not_null = RowFilter::neq(Column::field("manager"), Column::Null);

        assert_eq!(is_null.to_sql().0, r#""manager" IS NULL"#);
        assert_eq!(is_not_null.to_sql().0, r#""manager" IS NOT NULL"#);
    }

    #[test]
    fn literal_comparisons_are_folded() {
        let same = RowFilter::eq(Column::literal(Val::from(1i64)), Column::literal(Val::from(1.0)));
        let different = RowFilter::neq(Column::literal(Val::from("a")), Column::Null);

        assert_eq!(same, RowFilter::True);
        assert_eq!(different, RowFilter::True);
    }

    #[test]
    fn and_or_simplification() {
        let eq = || RowFilter::eq(Column::field("uid"), Column::literal(Val::from("u1")));

        assert_eq!(RowFilter::and(RowFilter::True, eq()), eq());
        assert_eq!(RowFilter::and(eq(), RowFilter::False), RowFilter::False);
        assert_eq!(RowFilter::or(eq(), RowFilter::True), RowFilter::True);
        assert_eq!(RowFilter::or(RowFilter::False, eq()), eq());
        assert_eq!(RowFilter::or(eq(), eq()), eq());
    }

    #[test]
    fn nested_logical_and_negation() {
        let predicate = RowFilter::or(
            RowFilter::eq(Column::field("uid"), Column::literal(Val::from("u1"))),
            !RowFilter::Lt(
                Column::LowerField("name".into()),
                Column::literal(Val::from("m")),
            ),
        );

        let (sql, params) = predicate.to_sql();
        assert_eq!(sql, r#"("uid" = $1 OR NOT(COALESCE(LOWER("name") < $2, FALSE)))"#);
        assert_eq!(params, vec![Val::from("u1"), Val::from("m")]);
    }

    #[test]
    fn stored_nulls_are_values() {
        let hours = || Column::field("hours");
        let two = || Column::literal(Val::from(2i64));

        assert_eq!(
            RowFilter::neq(hours(), two()).to_sql().0,
            r#""hours" IS DISTINCT FROM $1"#
        );
        assert_eq!(
            RowFilter::eq(hours(), Column::field("minutes")).to_sql().0,
            r#""hours" IS NOT DISTINCT FROM "minutes""#
        );

        // Negations reach the comparisons
        let negated = !RowFilter::and(
            RowFilter::eq(hours(), two()),
            RowFilter::Gte(hours(), two()),
        );
        assert_eq!(
            negated.to_sql().0,
            r#"("hours" IS DISTINCT FROM $1 OR NOT(COALESCE("hours" >= $2, FALSE)))"#
        );

        let negated = RowFilter::Not(Box::new(RowFilter::neq(hours(), two())));
        assert_eq!(negated.to_sql().0, r#""hours" = $1"#);

        let not_member = !RowFilter::In(two(), Column::field("sizes"));
        assert_eq!(
            not_member.to_sql().0,
            r#"NOT(COALESCE($1 = ANY("sizes"), FALSE))"#
        );
    }

    #[test]
    fn membership_in_list_column() {
        let predicate = RowFilter::In(Column::literal(Val::from("u1")), Column::field("members"));
        assert_eq!(predicate.to_sql().0, r#"$1 = ANY("members")"#);
    }
}
