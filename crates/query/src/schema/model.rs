//! Static field descriptor trees.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::access::{CapabilitySet, ObjectType, Scope, Action};
use crate::types::{OnyxType, ScalarType};

/// How a field stores its value.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ScalarType),
    Array(ScalarType),
    Structure,
    Identifiers,
    Relation(RelationDef),
}

/// A link from one model to another.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// True for to-many relations.
    pub many: bool,
    /// For to-many relations, the column on the related table that holds
    /// the parent id; for to-one relations, the column on this table that
    /// holds the related id.
    pub join_column: String,
    /// Text field of the related model shown for this relation in searches.
    pub display: Option<String>,
    pub model: Arc<ModelSchema>,
}

/// A single field of a model.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
    pub required: bool,
    pub default: Option<JsonValue>,
    pub max_length: Option<usize>,
}

impl FieldDef {
    pub fn onyx_type(&self) -> OnyxType {
        match &self.kind {
            FieldKind::Scalar(scalar) => scalar.onyx_type(),
            FieldKind::Array(base) => OnyxType::Array(*base),
            FieldKind::Structure => OnyxType::Structure,
            FieldKind::Identifiers => OnyxType::Identifiers,
            FieldKind::Relation(_) => OnyxType::Relation,
        }
    }

    pub fn relation(&self) -> Option<&RelationDef> {
        match &self.kind {
            FieldKind::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// True for choice fields and arrays of choices.
    pub fn is_choice(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Scalar(ScalarType::Choice) | FieldKind::Array(ScalarType::Choice)
        )
    }
}

/// A table and its fields.
pub struct ModelSchema {
    table: String,
    fields: Vec<FieldDef>,
    index: HashMap<String, usize>,
}

impl ModelSchema {
    /// Builds a model. Field names must already be unique.
    pub(crate) fn new(table: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name.clone(), i))
            .collect();
        Self {
            table: table.into(),
            fields,
            index,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Follows a `__`-joined path of field names through relations.
    pub fn field_at(&self, path: &str) -> Option<&FieldDef> {
        let mut model = self;
        let mut components = path.split("__").peekable();
        while let Some(component) = components.next() {
            let field = model.field(component)?;
            if components.peek().is_none() {
                return Some(field);
            }
            model = &field.relation()?.model;
        }
        None
    }

    /// Every field path in the tree, parents before their children.
    pub fn paths(&self) -> Vec<(String, &FieldDef)> {
        let mut out = Vec::new();
        self.collect_paths(None, &mut out);
        out
    }

    fn collect_paths<'a>(&'a self, prefix: Option<&str>, out: &mut Vec<(String, &'a FieldDef)>) {
        for field in &self.fields {
            let path = match prefix {
                Some(prefix) => format!("{}__{}", prefix, field.name),
                None => field.name.clone(),
            };
            out.push((path.clone(), field));
            if let Some(relation) = field.relation() {
                relation.model.collect_paths(Some(&path), out);
            }
        }
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("table", &self.table)
            .field("fields", &self.fields.iter().map(|f| &f.name).collect::<Vec<_>>())
            .finish()
    }
}

/// A permission group generated from a project's configuration.
#[derive(Debug, Clone)]
pub struct GroupDef {
    /// `<project>.<scope>`
    pub name: String,
    pub scope: Scope,
    /// Actions granted anywhere in the group, in canonical order.
    pub actions: Vec<Action>,
    pub capabilities: CapabilitySet,
}

/// A project: its root model and its permission groups.
#[derive(Debug)]
pub struct ProjectSchema {
    pub code: String,
    pub name: String,
    pub description: String,
    pub app_label: String,
    pub object_type: ObjectType,
    pub model: Arc<ModelSchema>,
    pub groups: Vec<GroupDef>,
}

impl ProjectSchema {
    pub fn group(&self, scope: Scope) -> Option<&GroupDef> {
        self.groups.iter().find(|g| g.scope == scope)
    }
}
