//! Error types for the query engine.
//!
//! Field-level problems are collected rather than raised one at a time:
//! every resolution, permission or coercion failure for a request ends up in
//! a single [`FieldErrors`] map keyed by the offending field key. Structural
//! problems with a query document fail immediately since no field context
//! exists yet.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

use crate::access::{Action, ObjectType};
use crate::fields::with_suggestions;
use crate::types::Lookup;

/// The primary error type for the crate.
#[derive(Error, Debug)]
pub enum OnyxError {
    /// Query, search and summary errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Project-level access errors
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Project schema and configuration errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Permission string encoding errors
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// Choice administration errors
    #[error(transparent)]
    Choice(#[from] ChoiceError),

    /// Storage backend errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result alias for crate operations.
pub type OnyxResult<T> = Result<T, OnyxError>;

/// A problem with a single field reference or its value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// The field does not exist, or the caller cannot see it.
    #[error("{}", with_suggestions("This field is unknown.", .suggestions))]
    UnknownField {
        field: String,
        suggestions: Vec<String>,
    },

    /// The field is visible but the action is not granted on it.
    #[error("You cannot {} this field.", .action.description())]
    ForbiddenAction { field: String, action: Action },

    /// The lookup is not recognised, or is not legal for the field's type.
    #[error("{}", with_suggestions("Invalid lookup.", .suggestions))]
    UnknownLookup {
        lookup: String,
        suggestions: Vec<String>,
    },

    /// A lookup was supplied where only a bare field is meaningful.
    #[error("Lookups are not allowed.")]
    LookupNotAllowed { lookup: Lookup },

    /// The raw value could not be coerced for the field's type and lookup.
    #[error("{message}")]
    InvalidValue { value: String, message: String },

    /// Relation fields cannot be grouped on.
    #[error("Cannot summarise over a relational field.")]
    RelationalSummary { field: String },
}

impl FieldError {
    /// Creates a coercion error for a raw value.
    pub fn invalid_value(value: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError::InvalidValue {
            value: value.into(),
            message: message.into(),
        }
    }
}

/// Field-keyed collection of errors.
///
/// Serializes to `{"<field>": ["<message>", ...]}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(BTreeMap<String, Vec<FieldError>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error against a field key.
    pub fn push(&mut self, field: impl Into<String>, error: FieldError) {
        self.0.entry(field.into()).or_default().push(error);
    }

    /// Merges another collection into this one.
    pub fn extend(&mut self, other: FieldErrors) {
        for (field, errors) in other.0 {
            self.0.entry(field).or_default().extend(errors);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with at least one error.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Errors recorded against a field key.
    pub fn get(&self, field: &str) -> &[FieldError] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<FieldError>)> {
        self.0.iter()
    }

    /// Returns `Ok(value)` if no errors were recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, errors) in &self.0 {
            for error in errors {
                if !first {
                    write!(f, "; ")?;
                }
                first = false;
                write!(f, "{}: {}", field, error)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, errors) in &self.0 {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            map.serialize_entry(field, &messages)?;
        }
        map.end()
    }
}

/// Malformed query document shapes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Expected a JSON object.")]
    NotAnObject,

    #[error("Expected exactly one key, found {found}.")]
    WrongArity { found: usize },

    #[error("The '{operator}' operator expects a list of queries.")]
    ExpectedList { operator: String },

    #[error("The '{operator}' operator expects a single query.")]
    ExpectedQuery { operator: String },

    #[error("The '{operator}' operator requires at least one query.")]
    EmptyOperands { operator: String },

    #[error("The '{operator}' operator accepts at most {max} queries, received {found}.")]
    TooManyOperands {
        operator: String,
        found: usize,
        max: usize,
    },

    #[error("Query nesting exceeds the maximum depth of {max}.")]
    TooDeep { max: usize },

    #[error("The value for '{field}' must be a string, number, boolean or null.")]
    InvalidAtomValue { field: String },

    #[error("Field names cannot be empty.")]
    EmptyField,
}

/// Errors raised while validating or compiling a query, search or summary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The document shape is malformed.
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// One or more field references failed validation.
    #[error("{0}")]
    Fields(FieldErrors),

    /// A summary would return more groups than allowed.
    #[error("The current summary would return too many distinct values.")]
    TooManyDistinctValues { count: usize, max: usize },

    /// A summary spans more than one related table.
    #[error("Cannot summarise over more than one related table.")]
    MultiRelationSummary { relations: Vec<String> },
}

impl From<FieldErrors> for QueryError {
    fn from(errors: FieldErrors) -> Self {
        QueryError::Fields(errors)
    }
}

/// Project-level access errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Deliberately identical for missing and invisible projects.
    #[error("Project not found.")]
    ProjectNotFound { project: String },

    #[error("You do not have permission to {} {object_type} in the {project} project.", .action.description())]
    Forbidden {
        project: String,
        object_type: ObjectType,
        action: Action,
    },
}

/// Errors encoding or decoding permission strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("permission '{permission}' has no app label")]
    MissingAppLabel { permission: String },

    #[error("permission '{permission}' has no action")]
    MissingAction { permission: String },

    #[error("permission '{permission}' has no project")]
    MissingProject { permission: String },

    #[error("permission '{permission}' names a field without an object type")]
    FieldWithoutObjectType { permission: String },

    #[error("invalid {component} '{value}' in permission")]
    InvalidComponent { component: String, value: String },

    #[error("unknown action '{action}'")]
    UnknownAction { action: String },

    #[error("unknown object type '{object_type}'")]
    UnknownObjectType { object_type: String },
}

/// Errors from the project schema registry and configuration loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid project code: {code}")]
    InvalidProjectCode { code: String },

    #[error("invalid field name '{field}' in {model}")]
    InvalidFieldName { model: String, field: String },

    #[error("duplicate field '{field}' in {model}")]
    DuplicateField { model: String, field: String },

    #[error("relation field '{field}' has no model")]
    MissingRelationModel { field: String },

    #[error("field '{field}' of type {field_type} cannot have a nested model")]
    UnexpectedModel { field: String, field_type: String },

    #[error("display field '{display}' of relation '{field}' is not a text field")]
    InvalidDisplayField { field: String, display: String },

    #[error("unknown project: {code}")]
    UnknownProject { code: String },

    #[error("project already registered: {code}")]
    DuplicateProject { code: String },

    #[error("configuration references unknown field '{field}' in project {project}")]
    UnknownField { project: String, field: String },

    #[error("field '{field}' in project {project} is not a choice field")]
    NotAChoiceField { project: String, field: String },

    #[error("invalid project configuration: {message}")]
    Config { message: String },
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        SchemaError::Config {
            message: e.to_string(),
        }
    }
}

/// Errors from choice administration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChoiceError {
    #[error("choice value cannot be empty for {project}.{field}")]
    EmptyValue { project: String, field: String },

    #[error("unknown choice '{value}' for {project}.{field}")]
    UnknownChoice {
        project: String,
        field: String,
        value: String,
    },

    #[error("duplicate choice '{value}' for {project}.{field}")]
    DuplicateChoice {
        project: String,
        field: String,
        value: String,
    },
}

/// Errors originating from a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// The predicate uses something the backend cannot express.
    #[error("unsupported by {backend_name}: {message}")]
    Unsupported {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_message() {
        let error = FieldError::UnknownField {
            field: "contry".into(),
            suggestions: vec!["country".into()],
        };
        assert_eq!(
            error.to_string(),
            "This field is unknown. Perhaps you meant: country"
        );

        let bare = FieldError::UnknownField {
            field: "zzz".into(),
            suggestions: vec![],
        };
        assert_eq!(bare.to_string(), "This field is unknown.");
    }

    #[test]
    fn test_forbidden_action_message() {
        let error = FieldError::ForbiddenAction {
            field: "country".into(),
            action: Action::History,
        };
        assert_eq!(
            error.to_string(),
            "You cannot get the history of this field."
        );
    }

    #[test]
    fn test_field_errors_collect_and_serialize() {
        let mut errors = FieldErrors::new();
        errors.push("b", FieldError::LookupNotAllowed { lookup: Lookup::In });
        errors.push(
            "a",
            FieldError::invalid_value("x", "Enter a whole number."),
        );
        errors.push(
            "a",
            FieldError::invalid_value("y", "Enter a whole number."),
        );

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("a").len(), 2);
        assert!(errors.get("missing").is_empty());

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "a": ["Enter a whole number.", "Enter a whole number."],
                "b": ["Lookups are not allowed."]
            })
        );
    }

    #[test]
    fn test_into_result() {
        assert_eq!(FieldErrors::new().into_result(5), Ok(5));
        let mut errors = FieldErrors::new();
        errors.push("x", FieldError::LookupNotAllowed { lookup: Lookup::Ne });
        assert!(errors.into_result(()).is_err());
    }

    #[test]
    fn test_storage_style_conversion() {
        let error: OnyxError = QueryError::TooManyDistinctValues { count: 5, max: 2 }.into();
        assert!(matches!(error, OnyxError::Query(_)));
        assert_eq!(
            error.to_string(),
            "The current summary would return too many distinct values."
        );
    }
}
