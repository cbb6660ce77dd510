// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Checks performed when a collection is saved: every rule must parse, and every path it mentions
//! must exist in the schema with a shape that fits how the path is used.

use crate::{
    ast::{Expr, Modifier, PathExpr, PathRoot, Segment},
    collection::{Collection, CollectionType, Schema},
    compile,
    error::{RuleErrorKind, RuleParseError, ValidationError},
};

/// Auth fields available even to anonymous callers
pub const AUTH_IDENTITY_FIELDS: [&str; 3] = ["id", "collectionId", "collectionName"];

/// Parse and validate every rule of `collection` against `schema`.
pub fn validate_collection(schema: &Schema, collection: &Collection) -> Result<(), RuleParseError> {
    for (op, source) in collection.rule_sources() {
        compile_rule(source, schema, collection).map_err(|kind| RuleParseError {
            collection: collection.name.clone(),
            op,
            kind,
        })?;
    }
    Ok(())
}

/// Parse and validate a single rule source.
pub fn compile_rule(
    source: &str,
    schema: &Schema,
    collection: &Collection,
) -> Result<Expr, RuleErrorKind> {
    let expr = compile(source)?;
    validate_rule(&expr, schema, collection)?;
    Ok(expr)
}

pub fn validate_rule(
    expr: &Expr,
    schema: &Schema,
    collection: &Collection,
) -> Result<(), ValidationError> {
    let validator = Validator { schema, collection };
    validator.expr(expr, false)
}

struct Validator<'a> {
    schema: &'a Schema,
    collection: &'a Collection,
}

/// What a path resolves to, as far as validation cares.
struct Shape {
    set_valued: bool,
}

impl<'a> Validator<'a> {
    fn expr(&self, expr: &Expr, comparison_operand: bool) -> Result<(), ValidationError> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Path(path) => {
                if matches!(path.root, PathRoot::Collection(_)) && !comparison_operand {
                    return Err(ValidationError::UnsupportedPath {
                        path: path.to_string(),
                        reason: "cross-collection references may only be compared".to_string(),
                    });
                }
                self.path(path)
            }
            Expr::Not(inner) => self.expr(inner, false),
            Expr::Group(inner) => self.expr(inner, comparison_operand),
            Expr::Logical(_, left, right) => {
                self.expr(left, false)?;
                self.expr(right, false)
            }
            Expr::Comparison(_, left, right) => {
                if is_cross_collection(left) && is_cross_collection(right) {
                    return Err(ValidationError::UnsupportedPath {
                        path: expr.to_string(),
                        reason: "only one side of a comparison may reference another collection"
                            .to_string(),
                    });
                }
                self.expr(left, true)?;
                self.expr(right, true)
            }
        }
    }

    fn path(&self, path: &PathExpr) -> Result<(), ValidationError> {
        let shape = match &path.root {
            PathRoot::Record => self.walk(self.collection, &path.segments)?,
            PathRoot::Body => {
                if !matches!(path.segments.first(), Some(Segment::Field(_))) {
                    return Err(ValidationError::UnsupportedPath {
                        path: path.to_string(),
                        reason: "request body paths start with a field".to_string(),
                    });
                }
                self.walk(self.collection, &path.segments)?
            }
            PathRoot::Auth => self.auth_path(path)?,
            PathRoot::Collection(name) => self.cross_collection_path(name, path)?,
            PathRoot::Yesterday | PathRoot::Now => {
                if let Some(modifier) = path.modifier {
                    return Err(modifier_error(modifier, path, "timestamps take no modifiers"));
                }
                Shape { set_valued: false }
            }
        };

        match path.modifier {
            Some(modifier @ (Modifier::Length | Modifier::Each)) if !shape.set_valued => Err(
                modifier_error(modifier, path, "the path does not resolve to multiple values"),
            ),
            _ => Ok(()),
        }
    }

    fn auth_path(&self, path: &PathExpr) -> Result<Shape, ValidationError> {
        if let [Segment::Field(name)] = path.segments.as_slice()
            && AUTH_IDENTITY_FIELDS.contains(&name.as_str())
        {
            return Ok(Shape { set_valued: false });
        }

        // Callers may come from any auth collection; the path has to make sense for one of them
        let mut first_error = None;
        for auth_collection in self.schema.auth_collections() {
            match self.walk(auth_collection, &path.segments) {
                Ok(shape) => return Ok(shape),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| ValidationError::UnknownField {
            collection: "@request.auth".to_string(),
            field: path
                .segments
                .first()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }))
    }

    fn cross_collection_path(&self, name: &str, path: &PathExpr) -> Result<Shape, ValidationError> {
        let target = self
            .schema
            .get(name)
            .ok_or_else(|| ValidationError::UnknownCollection(name.to_string()))?;

        let [Segment::Field(field_name)] = path.segments.as_slice() else {
            return Err(ValidationError::UnsupportedPath {
                path: path.to_string(),
                reason: "cross-collection references name a single field".to_string(),
            });
        };

        let field = target
            .find_field(field_name)
            .ok_or_else(|| ValidationError::UnknownField {
                collection: target.name.clone(),
                field: field_name.clone(),
            })?;

        if field.multiple {
            return Err(ValidationError::UnsupportedPath {
                path: path.to_string(),
                reason: "multi-valued fields of other collections cannot be compared".to_string(),
            });
        }

        if let Some(modifier @ Modifier::Length) = path.modifier {
            return Err(modifier_error(modifier, path, "use a back-relation to count records"));
        }

        // Each is the universal reading of the rows, which is always meaningful
        Ok(Shape { set_valued: true })
    }

    fn walk(&self, start: &Collection, segments: &[Segment]) -> Result<Shape, ValidationError> {
        let mut current = start;
        let mut set_valued = false;

        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();

            match segment {
                Segment::Field(name) => {
                    let field =
                        current
                            .find_field(name)
                            .ok_or_else(|| ValidationError::UnknownField {
                                collection: current.name.clone(),
                                field: name.clone(),
                            })?;
                    set_valued |= field.multiple;

                    if !last {
                        if !field.is_relation() {
                            return Err(ValidationError::NotTraversable {
                                collection: current.name.clone(),
                                field: name.clone(),
                            });
                        }
                        current = self.schema.relation_target(&field).ok_or_else(|| {
                            ValidationError::UnknownCollection(
                                field.target_collection.clone().unwrap_or_default(),
                            )
                        })?;
                    }
                }
                Segment::BackRelation { collection, field } => {
                    let invalid = |reason: String| ValidationError::InvalidBackRelation {
                        segment: segment.to_string(),
                        reason,
                    };

                    let source = self
                        .schema
                        .get(collection)
                        .ok_or_else(|| ValidationError::UnknownCollection(collection.clone()))?;
                    if source.kind == CollectionType::View {
                        return Err(invalid(format!("'{}' is a view collection", source.name)));
                    }

                    let relation = source
                        .find_field(field)
                        .ok_or_else(|| invalid(format!("'{}' has no field '{field}'", source.name)))?;
                    let points_back = relation.is_relation()
                        && self
                            .schema
                            .relation_target(&relation)
                            .is_some_and(|target| target.id == current.id);
                    if !points_back {
                        return Err(invalid(format!(
                            "'{}.{field}' is not a relation to '{}'",
                            source.name, current.name
                        )));
                    }

                    set_valued = true;
                    current = source;
                }
            }
        }

        Ok(Shape { set_valued })
    }
}

fn is_cross_collection(expr: &Expr) -> bool {
    match expr {
        Expr::Path(path) => matches!(path.root, PathRoot::Collection(_)),
        Expr::Group(inner) => is_cross_collection(inner),
        _ => false,
    }
}

fn modifier_error(modifier: Modifier, path: &PathExpr, reason: &str) -> ValidationError {
    ValidationError::ModifierNotApplicable {
        modifier: modifier.name().to_string(),
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
