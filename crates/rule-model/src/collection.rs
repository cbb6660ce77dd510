// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    borrow::Cow,
    collections::HashSet,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// The record operations a collection carries a rule for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    View,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::View,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::View => "view",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Base,
    View,
    Auth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Email,
    Url,
    Editor,
    Date,
    Autodate,
    Select,
    File,
    Json,
    Relation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
    /// Whether the field holds a list of values (multi-select, multi-file, multi-relation)
    #[serde(default)]
    pub multiple: bool,
    /// The id or name of the collection a relation points to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_collection: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDef {
            name: name.into(),
            kind,
            optional: false,
            multiple: false,
            target_collection: None,
        }
    }

    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        FieldDef {
            target_collection: Some(target.into()),
            ..FieldDef::new(name, FieldKind::Relation)
        }
    }

    pub fn optional(self) -> Self {
        FieldDef {
            optional: true,
            ..self
        }
    }

    pub fn multiple(self) -> Self {
        FieldDef {
            multiple: true,
            ..self
        }
    }

    pub fn is_relation(&self) -> bool {
        self.kind == FieldKind::Relation
    }
}

/// A collection and its access rules.
///
/// Each rule slot distinguishes three states: `None` (no rule: only superusers pass), `Some("")`
/// (everyone passes) and a non-empty expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default = "default_collection_type")]
    pub kind: CollectionType,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub list_rule: Option<String>,
    #[serde(default)]
    pub view_rule: Option<String>,
    #[serde(default)]
    pub create_rule: Option<String>,
    #[serde(default)]
    pub update_rule: Option<String>,
    #[serde(default)]
    pub delete_rule: Option<String>,
    /// The query backing a view collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_query: Option<String>,
}

fn default_collection_type() -> CollectionType {
    CollectionType::Base
}

impl Collection {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: CollectionType) -> Self {
        Collection {
            id: id.into(),
            name: name.into(),
            kind,
            fields: vec![],
            list_rule: None,
            view_rule: None,
            create_rule: None,
            update_rule: None,
            delete_rule: None,
            view_query: None,
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_rule(mut self, op: Operation, rule: Option<&str>) -> Self {
        *self.rule_slot_mut(op) = rule.map(ToString::to_string);
        self
    }

    /// Set every rule slot to `rule`.
    pub fn with_rules(self, rule: Option<&str>) -> Self {
        Operation::ALL
            .into_iter()
            .fold(self, |collection, op| collection.with_rule(op, rule))
    }

    pub fn rule(&self, op: Operation) -> Option<&str> {
        match op {
            Operation::List => self.list_rule.as_deref(),
            Operation::View => self.view_rule.as_deref(),
            Operation::Create => self.create_rule.as_deref(),
            Operation::Update => self.update_rule.as_deref(),
            Operation::Delete => self.delete_rule.as_deref(),
        }
    }

    fn rule_slot_mut(&mut self, op: Operation) -> &mut Option<String> {
        match op {
            Operation::List => &mut self.list_rule,
            Operation::View => &mut self.view_rule,
            Operation::Create => &mut self.create_rule,
            Operation::Update => &mut self.update_rule,
            Operation::Delete => &mut self.delete_rule,
        }
    }

    /// The non-empty rule sources of this collection.
    pub fn rule_sources(&self) -> impl Iterator<Item = (Operation, &str)> {
        Operation::ALL
            .into_iter()
            .filter_map(|op| self.rule(op).map(|rule| (op, rule)))
            .filter(|(_, rule)| !rule.trim().is_empty())
    }

    /// Look up a field, including the implicit system fields (`id` everywhere; `created` and
    /// `updated` on base and auth collections; `email`, `emailVisibility` and `verified` on auth
    /// collections).
    pub fn find_field(&self, name: &str) -> Option<Cow<'_, FieldDef>> {
        if let Some(field) = self.fields.iter().find(|field| field.name == name) {
            return Some(Cow::Borrowed(field));
        }

        let system_kind = match (self.kind, name) {
            (_, "id") => FieldKind::Text,
            (CollectionType::Base | CollectionType::Auth, "created" | "updated") => {
                FieldKind::Autodate
            }
            (CollectionType::Auth, "email") => FieldKind::Email,
            (CollectionType::Auth, "emailVisibility" | "verified") => FieldKind::Bool,
            _ => return None,
        };

        Some(Cow::Owned(FieldDef::new(name, system_kind)))
    }

    pub fn matches(&self, id_or_name: &str) -> bool {
        self.id == id_or_name || self.name == id_or_name
    }
}

/// All collections known to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDefinition", into = "SchemaDefinition")]
pub struct Schema {
    collections: Vec<Collection>,
}

#[derive(Serialize, Deserialize)]
struct SchemaDefinition {
    collections: Vec<Collection>,
}

impl TryFrom<SchemaDefinition> for Schema {
    type Error = SchemaError;

    fn try_from(definition: SchemaDefinition) -> Result<Self, Self::Error> {
        Schema::new(definition.collections)
    }
}

impl From<Schema> for SchemaDefinition {
    fn from(schema: Schema) -> Self {
        SchemaDefinition {
            collections: schema.collections,
        }
    }
}

impl Schema {
    /// Build a schema, checking that names are unique and that every relation points to a known
    /// collection. Rules are not checked here (see [`crate::validation`]).
    pub fn new(collections: Vec<Collection>) -> Result<Self, SchemaError> {
        let schema = Schema { collections };
        schema.check_structure()?;
        Ok(schema)
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Find a collection by id or name.
    pub fn get(&self, id_or_name: &str) -> Option<&Collection> {
        self.collections
            .iter()
            .find(|collection| collection.id == id_or_name)
            .or_else(|| {
                self.collections
                    .iter()
                    .find(|collection| collection.name == id_or_name)
            })
    }

    /// The collection a relation field points to.
    pub fn relation_target(&self, field: &FieldDef) -> Option<&Collection> {
        field
            .target_collection
            .as_deref()
            .and_then(|target| self.get(target))
    }

    pub fn auth_collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections
            .iter()
            .filter(|collection| collection.kind == CollectionType::Auth)
    }

    /// A copy of this schema with `collection` added, or replacing the collection with the same
    /// id.
    pub fn with_collection(&self, collection: Collection) -> Result<Schema, SchemaError> {
        let mut collections = self.collections.clone();
        match collections.iter_mut().find(|c| c.id == collection.id) {
            Some(existing) => *existing = collection,
            None => collections.push(collection),
        }
        Schema::new(collections)
    }

    fn check_structure(&self) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        for collection in &self.collections {
            // A collection may use the same string as id and name
            let keys: HashSet<&str> = HashSet::from([collection.id.as_str(), collection.name.as_str()]);
            for key in keys {
                if !names.insert(key) {
                    return Err(SchemaError::DuplicateCollection(key.to_string()));
                }
            }

            let mut fields = HashSet::new();
            for field in &collection.fields {
                if !fields.insert(field.name.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        collection: collection.name.clone(),
                        field: field.name.clone(),
                    });
                }

                if field.is_relation() {
                    let target = field.target_collection.as_deref().ok_or_else(|| {
                        SchemaError::MissingRelationTarget {
                            collection: collection.name.clone(),
                            field: field.name.clone(),
                        }
                    })?;
                    if !self.collections.iter().any(|c| c.matches(target)) {
                        return Err(SchemaError::UnknownRelationTarget {
                            collection: collection.name.clone(),
                            field: field.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
