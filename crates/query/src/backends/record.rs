//! Typed records with nested related rows.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::error::BackendError;
use crate::schema::{FieldKind, ModelSchema};
use crate::types::Value;

static NULL: Value = Value::Null;

/// A row of a model together with its related rows, keyed by relation name.
///
/// A to-one relation holds at most one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: i64,
    pub values: BTreeMap<String, Value>,
    pub relations: BTreeMap<String, Vec<Record>>,
}

impl Record {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn with_related(mut self, relation: impl Into<String>, rows: Vec<Record>) -> Self {
        self.relations.insert(relation.into(), rows);
        self
    }

    /// The stored value, NULL when absent.
    pub fn value(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn related(&self, relation: &str) -> &[Record] {
        self.relations.get(relation).map(Vec::as_slice).unwrap_or_default()
    }

    /// Builds a record tree from a JSON object shaped like the model.
    ///
    /// `next_id` numbers every row, related rows included.
    pub fn from_json<F>(model: &ModelSchema, json: &JsonValue, next_id: &mut F) -> Result<Self, BackendError>
    where
        F: FnMut() -> i64,
    {
        let object = json.as_object().ok_or_else(|| BackendError::SerializationError {
            message: format!("expected an object for a {} row", model.table()),
        })?;

        let mut record = Record::new(next_id());
        for (name, raw) in object {
            let field = model.field(name).ok_or_else(|| BackendError::SerializationError {
                message: format!("unknown field '{}' for {}", name, model.table()),
            })?;

            match &field.kind {
                FieldKind::Relation(relation) => {
                    let rows = match raw {
                        JsonValue::Null => Vec::new(),
                        JsonValue::Array(items) if relation.many => items
                            .iter()
                            .map(|item| Record::from_json(&relation.model, item, next_id))
                            .collect::<Result<Vec<_>, _>>()?,
                        JsonValue::Object(_) if !relation.many => {
                            vec![Record::from_json(&relation.model, raw, next_id)?]
                        }
                        _ => {
                            return Err(BackendError::SerializationError {
                                message: format!("invalid rows for relation '{}'", name),
                            });
                        }
                    };
                    record.relations.insert(name.clone(), rows);
                }
                _ => {
                    let value = Value::from_json(raw, field.onyx_type()).ok_or_else(|| {
                        BackendError::SerializationError {
                            message: format!(
                                "invalid {} value for '{}': {}",
                                field.onyx_type(),
                                name,
                                raw
                            ),
                        }
                    })?;
                    record.values.insert(name.clone(), value);
                }
            }
        }

        Ok(record)
    }

    /// Renders the record the way it would be read back, nested by relation.
    pub fn to_json(&self, model: &ModelSchema) -> JsonValue {
        let mut object = Map::new();
        for field in model.fields() {
            let value = match &field.kind {
                FieldKind::Relation(relation) => {
                    let rows = self.related(&field.name);
                    if relation.many {
                        rows.iter().map(|row| row.to_json(&relation.model)).collect()
                    } else {
                        rows.first()
                            .map(|row| row.to_json(&relation.model))
                            .unwrap_or(JsonValue::Null)
                    }
                }
                _ => self.value(&field.name).to_json(),
            };
            object.insert(field.name.clone(), value);
        }
        JsonValue::Object(object)
    }
}
