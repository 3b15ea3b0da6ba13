//! Declarative project configuration.
//!
//! A project file describes the record model, the permission groups and
//! the choice values of one project:
//!
//! ```json
//! {
//!   "code": "mpx",
//!   "model": {
//!     "table": "mpx",
//!     "fields": [
//!       {"name": "country", "type": "choice"},
//!       {"name": "records", "type": "relation", "many": true,
//!        "model": {"table": "mpx_records", "fields": [{"name": "ct_value", "type": "decimal"}]}}
//!     ]
//!   },
//!   "groups": [{"scope": "analyst", "permissions": [{"action": ["get", "filter"], "fields": ["country"]}]}],
//!   "choices": [{"field": "country", "options": ["eng", {"choice": "scot", "description": "Scotland"}]}]
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::model::{FieldDef, FieldKind, GroupDef, ModelSchema, ProjectSchema, RelationDef};
use crate::access::{Action, Capability, CapabilitySet, ObjectType, Scope};
use crate::error::SchemaError;
use crate::types::{OnyxType, ScalarType};

/// Naming rules for project codes, field names and tables.
///
/// Project codes cannot contain `_` and field names cannot contain `__` or
/// end in `_`, so that permission strings and field paths stay parseable.
struct NameRules {
    project_code: Regex,
    field_name: Regex,
    table_name: Regex,
}

impl NameRules {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            project_code: Regex::new(r"^[a-z][a-z0-9-]*$")?,
            field_name: Regex::new(r"^[a-z][a-z0-9]*(_[a-z0-9]+)*$")?,
            table_name: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?,
        })
    }
}

fn default_app_label() -> String {
    "data".to_string()
}

/// Configuration of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub code: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// App label used when encoding permission strings.
    #[serde(default = "default_app_label")]
    pub app_label: String,

    #[serde(default)]
    pub object_type: ObjectType,

    pub model: ModelConfig,

    #[serde(default)]
    pub groups: Vec<GroupConfig>,

    #[serde(default)]
    pub choices: Vec<ChoiceConfig>,

    #[serde(default)]
    pub choice_constraints: Vec<ChoiceConstraintConfig>,
}

impl ProjectConfig {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A table and its fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub table: String,
    pub fields: Vec<FieldConfig>,
}

/// A single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    /// Type label, e.g. `text`, `choice`, `relation`, `array`.
    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<JsonValue>,

    #[serde(default)]
    pub max_length: Option<usize>,

    /// Element type of an array field.
    #[serde(default)]
    pub base: Option<ScalarType>,

    /// Whether a relation is to-many. Defaults to true.
    #[serde(default)]
    pub many: Option<bool>,

    #[serde(default)]
    pub join_column: Option<String>,

    /// Text field of the related model searched for this relation.
    #[serde(default)]
    pub display: Option<String>,

    /// Related model of a relation field.
    #[serde(default)]
    pub model: Option<ModelConfig>,
}

/// A permission group for one scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub scope: Scope,
    pub permissions: Vec<PermissionConfig>,
}

/// Actions granted on a list of field paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    pub action: ActionList,
    pub fields: Vec<String>,
}

/// One action or several.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionList {
    One(Action),
    Many(Vec<Action>),
}

impl ActionList {
    pub fn actions(&self) -> Vec<Action> {
        match self {
            ActionList::One(action) => vec![*action],
            ActionList::Many(actions) => actions.clone(),
        }
    }
}

/// The values of one choice field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceConfig {
    pub field: String,
    pub options: Vec<ChoiceOption>,
}

/// A choice value, optionally with a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceOption {
    Plain(String),
    Described { choice: String, description: String },
}

impl ChoiceOption {
    pub fn value(&self) -> &str {
        match self {
            ChoiceOption::Plain(value) => value,
            ChoiceOption::Described { choice, .. } => choice,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ChoiceOption::Plain(_) => None,
            ChoiceOption::Described { description, .. } => Some(description),
        }
    }
}

/// The choices of other fields that one choice value is compatible with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceConstraintConfig {
    pub field: String,
    pub option: String,
    pub constraints: Vec<ChoiceConfig>,
}

impl ProjectSchema {
    /// Builds and validates a project schema from its configuration.
    pub fn from_config(config: &ProjectConfig) -> Result<Self, SchemaError> {
        let rules = NameRules::new().map_err(|e| SchemaError::Config {
            message: e.to_string(),
        })?;

        if !rules.project_code.is_match(&config.code) {
            return Err(SchemaError::InvalidProjectCode {
                code: config.code.clone(),
            });
        }

        let model = Arc::new(build_model(&rules, &config.model)?);

        let mut groups = Vec::with_capacity(config.groups.len());
        for group in &config.groups {
            groups.push(build_group(config, &model, group)?);
        }

        for choice in &config.choices {
            check_choice_field(config, &model, &choice.field)?;
        }
        for constraint in &config.choice_constraints {
            check_choice_field(config, &model, &constraint.field)?;
            for target in &constraint.constraints {
                check_choice_field(config, &model, &target.field)?;
            }
        }

        debug!(project = %config.code, groups = groups.len(), "Built project schema");

        Ok(ProjectSchema {
            code: config.code.clone(),
            name: config.name.clone().unwrap_or_else(|| config.code.clone()),
            description: config.description.clone().unwrap_or_default(),
            app_label: config.app_label.clone(),
            object_type: config.object_type,
            model,
            groups,
        })
    }
}

fn build_model(rules: &NameRules, config: &ModelConfig) -> Result<ModelSchema, SchemaError> {
    if !rules.table_name.is_match(&config.table) {
        return Err(SchemaError::Config {
            message: format!("invalid table name: {}", config.table),
        });
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(config.fields.len());

    for field in &config.fields {
        if !rules.field_name.is_match(&field.name) {
            return Err(SchemaError::InvalidFieldName {
                model: config.table.clone(),
                field: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                model: config.table.clone(),
                field: field.name.clone(),
            });
        }
        fields.push(build_field(rules, field)?);
    }

    Ok(ModelSchema::new(config.table.clone(), fields))
}

fn build_field(rules: &NameRules, config: &FieldConfig) -> Result<FieldDef, SchemaError> {
    let onyx_type = OnyxType::parse(&config.field_type).ok_or_else(|| SchemaError::Config {
        message: format!(
            "unknown type '{}' for field '{}'",
            config.field_type, config.name
        ),
    })?;

    if onyx_type != OnyxType::Relation && config.model.is_some() {
        return Err(SchemaError::UnexpectedModel {
            field: config.name.clone(),
            field_type: onyx_type.label().to_string(),
        });
    }

    let kind = match onyx_type {
        OnyxType::Relation => {
            let model_config =
                config
                    .model
                    .as_ref()
                    .ok_or_else(|| SchemaError::MissingRelationModel {
                        field: config.name.clone(),
                    })?;
            let model = build_model(rules, model_config)?;
            let many = config.many.unwrap_or(true);

            if let Some(display) = &config.display {
                let is_text = model
                    .field(display)
                    .is_some_and(|f| f.onyx_type() == OnyxType::Text);
                if !is_text {
                    return Err(SchemaError::InvalidDisplayField {
                        field: config.name.clone(),
                        display: display.clone(),
                    });
                }
            }

            let join_column = match &config.join_column {
                Some(column) => column.clone(),
                None if many => "parent_id".to_string(),
                None => format!("{}_id", config.name),
            };

            FieldKind::Relation(RelationDef {
                many,
                join_column,
                display: config.display.clone(),
                model: Arc::new(model),
            })
        }
        OnyxType::Array(_) => FieldKind::Array(config.base.unwrap_or(ScalarType::Text)),
        OnyxType::Structure => FieldKind::Structure,
        OnyxType::Identifiers => FieldKind::Identifiers,
        OnyxType::Text => FieldKind::Scalar(ScalarType::Text),
        OnyxType::Choice => FieldKind::Scalar(ScalarType::Choice),
        OnyxType::Integer => FieldKind::Scalar(ScalarType::Integer),
        OnyxType::Decimal => FieldKind::Scalar(ScalarType::Decimal),
        OnyxType::Date => FieldKind::Scalar(ScalarType::Date),
        OnyxType::DateTime => FieldKind::Scalar(ScalarType::DateTime),
        OnyxType::Boolean => FieldKind::Scalar(ScalarType::Boolean),
    };

    Ok(FieldDef {
        name: config.name.clone(),
        kind,
        description: config.description.clone(),
        required: config.required,
        default: config.default.clone(),
        max_length: config.max_length,
    })
}

fn build_group(
    project: &ProjectConfig,
    model: &ModelSchema,
    config: &GroupConfig,
) -> Result<GroupDef, SchemaError> {
    let code = project.code.as_str();
    let object_type = project.object_type;
    let mut capabilities = CapabilitySet::new();
    let mut granted = vec![Action::Access];

    capabilities.insert(Capability::project(Action::Access, code));
    capabilities.insert(Capability::object(Action::Access, code, object_type));

    for permission in &config.permissions {
        for action in permission.action.actions() {
            granted.push(action);
            capabilities.insert(Capability::project(action, code));
            capabilities.insert(Capability::object(action, code, object_type));

            for field in &permission.fields {
                if model.field_at(field).is_none() {
                    return Err(SchemaError::UnknownField {
                        project: code.to_string(),
                        field: field.clone(),
                    });
                }
                capabilities.insert(Capability::field(
                    Action::Access,
                    code,
                    object_type,
                    field.clone(),
                ));
                capabilities.insert(Capability::field(action, code, object_type, field.clone()));
            }
        }
    }

    let actions = Action::ALL
        .into_iter()
        .filter(|action| granted.contains(action))
        .collect();

    Ok(GroupDef {
        name: format!("{}.{}", code, config.scope),
        scope: config.scope,
        actions,
        capabilities,
    })
}

fn check_choice_field(
    project: &ProjectConfig,
    model: &ModelSchema,
    field: &str,
) -> Result<(), SchemaError> {
    let found = model
        .paths()
        .into_iter()
        .find(|(_, def)| def.name == field)
        .map(|(_, def)| def.is_choice());

    match found {
        Some(true) => Ok(()),
        Some(false) => Err(SchemaError::NotAChoiceField {
            project: project.code.clone(),
            field: field.to_string(),
        }),
        None => Err(SchemaError::UnknownField {
            project: project.code.clone(),
            field: field.to_string(),
        }),
    }
}
