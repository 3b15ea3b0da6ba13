//! Resolution of user-supplied field paths against a project schema.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use super::paths::{SEPARATOR, include_exclude_fields};
use super::suggest::{DEFAULT_CUTOFF, DEFAULT_SUGGESTIONS, suggestions};
use crate::access::{Action, PermissionGate, UserContext};
use crate::choices::ChoiceRegistry;
use crate::error::{FieldError, FieldErrors};
use crate::schema::{FieldDef, ModelSchema, ProjectSchema, RelationDef};
use crate::types::{Lookup, OnyxType};

/// A relation crossed on the way to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationHop {
    /// Path of the relation field, e.g. `records`.
    pub path: String,
    /// Table the relation points at.
    pub table: String,
    pub many: bool,
    pub join_column: String,
}

impl RelationHop {
    fn new(path: String, relation: &RelationDef) -> Self {
        Self {
            path,
            table: relation.model.table().to_string(),
            many: relation.many,
            join_column: relation.join_column.clone(),
        }
    }
}

/// A field path resolved against a schema, with its lookup split off.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// The path as supplied, lookup included.
    pub key: String,
    /// The field path without the lookup.
    pub path: String,
    /// Name of the terminal field.
    pub name: String,
    pub lookup: Lookup,
    pub onyx_type: OnyxType,
    /// Relations crossed before the terminal field, outermost first.
    pub hops: Vec<RelationHop>,
    /// Table holding the terminal field.
    pub table: String,
    /// The relation itself, when the terminal field is one.
    pub target: Option<RelationHop>,
    pub required: bool,
    pub description: String,
    /// Active values, for choice fields.
    pub choices: Option<BTreeSet<String>>,
}

impl ResolvedField {
    /// True when any hop, or the field itself, is a to-many relation.
    pub fn many_valued(&self) -> bool {
        self.hops.iter().any(|hop| hop.many) || self.target.as_ref().is_some_and(|t| t.many)
    }

    pub fn is_relation(&self) -> bool {
        self.onyx_type == OnyxType::Relation
    }

    /// Path of the outermost relation crossed, if any.
    pub fn root_relation(&self) -> Option<&str> {
        self.hops
            .first()
            .or(self.target.as_ref())
            .map(|hop| hop.path.as_str())
    }
}

/// Resolves fields for one user, project and action.
pub struct FieldHandler<'a> {
    schema: &'a ProjectSchema,
    gate: PermissionGate<'a>,
    action: Action,
    choices: &'a ChoiceRegistry,
}

impl<'a> FieldHandler<'a> {
    pub fn new(
        schema: &'a ProjectSchema,
        user: &'a UserContext,
        action: Action,
        choices: &'a ChoiceRegistry,
    ) -> Self {
        Self {
            schema,
            gate: PermissionGate::new(user, &schema.code, schema.object_type),
            action,
            choices,
        }
    }

    pub fn schema(&self) -> &'a ProjectSchema {
        self.schema
    }

    pub fn gate(&self) -> &PermissionGate<'a> {
        &self.gate
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn choices(&self) -> &'a ChoiceRegistry {
        self.choices
    }

    /// Field paths the user may perform the handler's action on.
    pub fn available_fields(&self) -> BTreeSet<String> {
        self.gate.available_fields(self.action)
    }

    fn unknown(&self, key: &str) -> FieldError {
        self.gate.unknown_field(self.action, key)
    }

    /// Resolves a single field path.
    ///
    /// With `allow_lookup` false, any lookup suffix is rejected.
    #[instrument(skip(self), fields(project = %self.schema.code, action = %self.action))]
    pub fn resolve(&self, key: &str, allow_lookup: bool) -> Result<ResolvedField, FieldError> {
        if key.is_empty() || key.ends_with('_') {
            return Err(self.unknown(key));
        }

        let components: Vec<&str> = key.split(SEPARATOR).collect();
        let mut model: &ModelSchema = &self.schema.model;
        let mut hops = Vec::new();

        for (i, component) in components.iter().enumerate() {
            let Some(field) = model.field(component) else {
                return Err(self.unknown(key));
            };
            let path = components[..=i].join(SEPARATOR);
            let rest = components[i + 1..].join(SEPARATOR);

            let descends = match (field.relation(), components.get(i + 1)) {
                (Some(relation), Some(next)) => relation.model.field(next).is_some(),
                _ => false,
            };

            if !descends {
                if let Some(lookup) = Lookup::parse(&rest) {
                    return self.finish(key, path, field, model, lookup, hops, allow_lookup);
                }
            }

            match field.relation() {
                Some(relation) if i + 1 < components.len() => {
                    hops.push(RelationHop::new(path, relation));
                    model = &relation.model;
                }
                _ => {
                    if self.gate.check_field_visible(self.action, &path).is_err() {
                        return Err(self.unknown(key));
                    }
                    let labels = Lookup::ALL.iter().map(|l| l.label());
                    return Err(FieldError::UnknownLookup {
                        suggestions: suggestions(&rest, labels, DEFAULT_SUGGESTIONS, DEFAULT_CUTOFF),
                        lookup: rest,
                    });
                }
            }
        }

        Err(self.unknown(key))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        key: &str,
        path: String,
        field: &FieldDef,
        model: &ModelSchema,
        lookup: Lookup,
        hops: Vec<RelationHop>,
        allow_lookup: bool,
    ) -> Result<ResolvedField, FieldError> {
        if self.gate.check_field_visible(self.action, &path).is_err() {
            return Err(self.unknown(key));
        }

        let onyx_type = field.onyx_type();
        if !allow_lookup && lookup != Lookup::Bare {
            return Err(FieldError::LookupNotAllowed { lookup });
        }
        if allow_lookup && !onyx_type.is_lookup_valid(lookup) {
            let labels = onyx_type.lookups().iter().map(|l| l.label());
            return Err(FieldError::UnknownLookup {
                lookup: lookup.label().to_string(),
                suggestions: suggestions(lookup.label(), labels, DEFAULT_SUGGESTIONS, 0.0),
            });
        }

        self.gate.check_field_access(self.action, &path)?;

        let choices = field
            .is_choice()
            .then(|| self.choices.valid_values(&self.schema.code, &field.name));
        let target = field
            .relation()
            .map(|relation| RelationHop::new(path.clone(), relation));

        debug!(key = %key, path = %path, lookup = %lookup, "Resolved field");

        Ok(ResolvedField {
            key: key.to_string(),
            path,
            name: field.name.clone(),
            lookup,
            onyx_type,
            hops,
            table: model.table().to_string(),
            target,
            required: field.required,
            description: field.description.clone(),
            choices,
        })
    }

    /// Resolves several fields, collecting every error keyed by field.
    pub fn resolve_many<I, S>(
        &self,
        keys: I,
        allow_lookup: bool,
    ) -> Result<Vec<ResolvedField>, FieldErrors>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = Vec::new();
        let mut errors = FieldErrors::new();

        for key in keys {
            let key = key.as_ref();
            match self.resolve(key, allow_lookup) {
                Ok(field) => resolved.push(field),
                Err(error) => errors.push(key, error),
            }
        }

        errors.into_result(resolved)
    }

    /// Available fields narrowed by `include` and `exclude`.
    ///
    /// Both lists must name fields the user can see, without lookups.
    pub fn include_exclude(
        &self,
        include: &[String],
        exclude: &[String],
    ) -> Result<Vec<String>, FieldErrors> {
        self.resolve_many(include.iter().chain(exclude), false)?;
        Ok(include_exclude_fields(
            self.available_fields(),
            include,
            exclude,
        ))
    }
}
