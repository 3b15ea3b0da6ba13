//! Descriptions of a project's fields and of the type and lookup catalogues.

use std::collections::BTreeSet;

use serde_json::{Map, Value as JsonValue, json};

use super::paths::SEPARATOR;
use super::resolver::FieldHandler;
use crate::access::Action;
use crate::coerce::{DATE_INPUT_FORMATS, DATETIME_INPUT_FORMATS};
use crate::error::FieldError;
use crate::schema::{FieldDef, FieldKind, ModelSchema};
use crate::types::{DATE_FORMAT, DATETIME_FORMAT, Lookup, OnyxType, ScalarType};

fn readable(format: &str) -> String {
    format
        .replace("%Y", "YYYY")
        .replace("%m", "MM")
        .replace("%d", "DD")
        .replace("%H", "HH")
        .replace("%M", "MM")
        .replace("%S", "SS")
        .replace("%.f", ".ffffff")
}

fn format_restrictions(inputs: &[&str], output: &str) -> Vec<String> {
    let inputs: Vec<String> = inputs.iter().map(|f| readable(f)).collect();
    vec![
        format!("Input formats: {}", inputs.join(", ")),
        format!("Output format: {}", readable(output)),
    ]
}

impl FieldHandler<'_> {
    /// Describes the project and every field available to the handler's
    /// action, nested by relation.
    pub fn describe_fields(&self) -> JsonValue {
        let schema = self.schema();
        let available = self.available_fields();
        json!({
            "name": schema.name,
            "description": schema.description,
            "fields": self.describe_model(&schema.model, None, &available),
        })
    }

    fn describe_model(
        &self,
        model: &ModelSchema,
        prefix: Option<&str>,
        available: &BTreeSet<String>,
    ) -> JsonValue {
        let mut out = Map::new();

        for field in model.fields() {
            let path = match prefix {
                Some(prefix) => format!("{}{}{}", prefix, SEPARATOR, field.name),
                None => field.name.clone(),
            };
            let nested_prefix = format!("{}{}", path, SEPARATOR);
            let listed = available.contains(&path)
                || available.iter().any(|a| a.starts_with(&nested_prefix));
            if !listed {
                continue;
            }
            out.insert(field.name.clone(), self.describe_field(field, &path, available));
        }

        JsonValue::Object(out)
    }

    fn describe_field(
        &self,
        field: &FieldDef,
        path: &str,
        available: &BTreeSet<String>,
    ) -> JsonValue {
        let gate = self.gate();
        let actions: Vec<&str> = gate
            .user()
            .capabilities()
            .field_actions(gate.project(), gate.object_type(), path)
            .into_iter()
            .filter(|action| *action != Action::Access)
            .map(|action| action.label())
            .collect();

        let onyx_type = field.onyx_type();
        let mut spec = Map::new();
        spec.insert("description".into(), field.description.clone().into());
        spec.insert("type".into(), onyx_type.label().into());
        spec.insert("required".into(), field.required.into());
        spec.insert("actions".into(), json!(actions));

        if let FieldKind::Relation(relation) = &field.kind {
            spec.insert(
                "fields".into(),
                self.describe_model(&relation.model, Some(path), available),
            );
            return JsonValue::Object(spec);
        }

        if let Some(default) = &field.default {
            spec.insert("default".into(), default.clone());
        }

        if field.is_choice() {
            let values = self.choices().valid_values(&self.schema().code, &field.name);
            if !values.is_empty() {
                spec.insert("values".into(), json!(values));
            }
        }

        let mut restrictions = Vec::new();
        match &field.kind {
            FieldKind::Array(base) => {
                restrictions.push(format!("Array type: {}", base.onyx_type().label()));
            }
            FieldKind::Scalar(ScalarType::Date) => {
                restrictions.extend(format_restrictions(DATE_INPUT_FORMATS, DATE_FORMAT));
            }
            FieldKind::Scalar(ScalarType::DateTime) => {
                restrictions.extend(format_restrictions(DATETIME_INPUT_FORMATS, DATETIME_FORMAT));
            }
            FieldKind::Scalar(ScalarType::Text) => {
                if let Some(max_length) = field.max_length {
                    restrictions.push(format!("Max length: {}", max_length));
                }
            }
            _ => {}
        }
        if !restrictions.is_empty() {
            spec.insert("restrictions".into(), json!(restrictions));
        }

        JsonValue::Object(spec)
    }

    /// Stored choices of a choice field the user can see, active or not.
    pub fn describe_choices(&self, field: &str) -> Result<JsonValue, FieldError> {
        let resolved = self.resolve(field, false)?;
        if resolved.onyx_type != OnyxType::Choice {
            return Err(FieldError::invalid_value(
                field,
                format!("This field is not a {} field.", OnyxType::Choice.label()),
            ));
        }

        let mut choices = self.choices().choices(&self.schema().code, &resolved.name);
        choices.sort_by(|a, b| a.value.cmp(&b.value));

        let mut out = Map::new();
        for choice in choices {
            out.insert(
                choice.value,
                json!({"description": choice.description, "is_active": choice.is_active}),
            );
        }
        Ok(JsonValue::Object(out))
    }
}

/// Every type with the lookups it accepts.
pub fn describe_types() -> JsonValue {
    OnyxType::CATALOGUE
        .iter()
        .map(|onyx_type| {
            let lookups: Vec<&str> = onyx_type
                .lookups()
                .iter()
                .filter(|l| **l != Lookup::Bare)
                .map(|l| l.label())
                .collect();
            json!({
                "type": onyx_type.label(),
                "description": onyx_type.description(),
                "lookups": lookups,
            })
        })
        .collect()
}

/// Every lookup with the types that accept it.
pub fn describe_lookups() -> JsonValue {
    Lookup::ALL
        .iter()
        .map(|lookup| {
            let types: Vec<&str> = OnyxType::CATALOGUE
                .iter()
                .filter(|t| t.is_lookup_valid(*lookup))
                .map(|t| t.label())
                .collect();
            json!({
                "lookup": lookup.label(),
                "description": lookup.description(),
                "types": types,
            })
        })
        .collect()
}
