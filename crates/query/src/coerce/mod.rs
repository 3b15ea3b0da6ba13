//! Per-type value coercion for each lookup.
//!
//! Raw values arrive as strings. Equality lookups on scalar fields treat a
//! blank value as NULL; `isnull` insists on a boolean token, and `length`,
//! `iso_year`, `week` and the range lookups insist on non-blank values.

mod parse;

use chrono::{NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;

pub use parse::{
    DATE_INPUT_FORMATS, DATETIME_INPUT_FORMATS, parse_date, parse_datetime, parse_decimal,
    parse_integer, parse_search_datetime, split_list, strtobool,
};

use crate::choices::ChoiceRegistry;
use crate::config::QueryConfig;
use crate::error::FieldError;
use crate::fields::ResolvedField;
use crate::types::{Lookup, OnyxType, ScalarType, Value};

/// A coerced lookup value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
    Range(Value, Value),
}

impl Operand {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Operand::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[Value]> {
        match self {
            Operand::List(values) => Some(values),
            _ => None,
        }
    }
}

/// Cleans raw values for resolved fields.
pub struct LookupCoercer<'a> {
    choices: &'a ChoiceRegistry,
    project: &'a str,
    config: &'a QueryConfig,
    now: NaiveDateTime,
}

impl<'a> LookupCoercer<'a> {
    pub fn new(choices: &'a ChoiceRegistry, project: &'a str, config: &'a QueryConfig) -> Self {
        Self {
            choices,
            project,
            config,
            now: Utc::now().naive_utc(),
        }
    }

    /// Fixes the instant `today` and `now` resolve to.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    /// Coerces `raw` for the field's type and lookup.
    pub fn clean(&self, field: &ResolvedField, raw: &str) -> Result<Operand, FieldError> {
        let lookup = field.lookup;

        if lookup == Lookup::IsNull {
            return strict_bool(raw).map(|b| Operand::Value(Value::Boolean(b)));
        }

        match field.onyx_type {
            OnyxType::Relation | OnyxType::Identifiers => Err(FieldError::invalid_value(
                raw,
                format!("The '{}' lookup cannot be used on this field.", lookup),
            )),
            OnyxType::Array(base) => self.clean_array(field, base, lookup, raw),
            OnyxType::Structure => self.clean_structure(lookup, raw),
            scalar => {
                let scalar = scalar.scalar().ok_or_else(|| {
                    FieldError::invalid_value(raw, "This field cannot be filtered.")
                })?;
                self.clean_scalar(field, scalar, lookup, raw)
            }
        }
    }

    fn clean_scalar(
        &self,
        field: &ResolvedField,
        scalar: ScalarType,
        lookup: Lookup,
        raw: &str,
    ) -> Result<Operand, FieldError> {
        match lookup {
            Lookup::Bare | Lookup::Exact | Lookup::Ne => {
                self.nullable(field, scalar, raw).map(Operand::Value)
            }
            Lookup::In | Lookup::NotIn => {
                let items = self.items(raw)?;
                items
                    .into_iter()
                    .map(|item| self.nullable(field, scalar, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Operand::List)
            }
            Lookup::Contains
            | Lookup::StartsWith
            | Lookup::EndsWith
            | Lookup::IExact
            | Lookup::IContains
            | Lookup::IStartsWith
            | Lookup::IEndsWith => non_blank(raw).map(|s| Operand::Value(Value::text(s))),
            Lookup::Lt | Lookup::Lte | Lookup::Gt | Lookup::Gte => {
                self.strict(field, scalar, raw).map(Operand::Value)
            }
            Lookup::Range => {
                let (low, high) = pair(raw)?;
                Ok(Operand::Range(
                    self.strict(field, scalar, low)?,
                    self.strict(field, scalar, high)?,
                ))
            }
            Lookup::Length | Lookup::IsoYear | Lookup::Week => {
                strict_integer(raw).map(Operand::Value)
            }
            Lookup::LengthIn | Lookup::IsoYearIn | Lookup::WeekIn => self.integer_list(raw),
            Lookup::LengthRange | Lookup::IsoYearRange | Lookup::WeekRange => integer_range(raw),
            other => Err(unsupported(raw, other)),
        }
    }

    fn clean_array(
        &self,
        field: &ResolvedField,
        base: ScalarType,
        lookup: Lookup,
        raw: &str,
    ) -> Result<Operand, FieldError> {
        match lookup {
            Lookup::Bare
            | Lookup::Exact
            | Lookup::Contains
            | Lookup::ContainedBy
            | Lookup::Overlap => {
                let items: Vec<&str> = self
                    .items(raw)?
                    .into_iter()
                    .filter(|item| !item.is_empty())
                    .collect();
                if items.is_empty() {
                    return Err(FieldError::invalid_value(raw, "Enter at least one value."));
                }
                items
                    .into_iter()
                    .map(|item| self.strict(field, base, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(|values| Operand::Value(Value::Array(values)))
            }
            Lookup::Length => strict_integer(raw).map(Operand::Value),
            Lookup::LengthIn => self.integer_list(raw),
            Lookup::LengthRange => integer_range(raw),
            other => Err(unsupported(raw, other)),
        }
    }

    fn clean_structure(&self, lookup: Lookup, raw: &str) -> Result<Operand, FieldError> {
        match lookup {
            Lookup::Bare | Lookup::Exact | Lookup::Contains | Lookup::ContainedBy => {
                match serde_json::from_str::<JsonValue>(raw) {
                    Ok(value @ JsonValue::Object(_)) => Ok(Operand::Value(Value::Json(value))),
                    _ => Err(FieldError::invalid_value(
                        raw,
                        format!("Value must be a JSON object: '{}'.", raw),
                    )),
                }
            }
            Lookup::HasKey => non_blank(raw).map(|key| Operand::Value(Value::text(key))),
            Lookup::HasKeys | Lookup::HasAnyKeys => {
                let keys = self
                    .items(raw)?
                    .into_iter()
                    .map(|key| non_blank(key).map(Value::text))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Operand::List(keys))
            }
            other => Err(unsupported(raw, other)),
        }
    }

    /// Splits a list value and applies the length limit.
    fn items<'r>(&self, raw: &'r str) -> Result<Vec<&'r str>, FieldError> {
        let items = split_list(raw);
        let max = self.config.max_iterable_input;
        if items.len() > max {
            return Err(FieldError::invalid_value(
                raw,
                format!(
                    "Ensure this value has at most {} items (it has {}).",
                    max,
                    items.len()
                ),
            ));
        }
        Ok(items)
    }

    fn integer_list(&self, raw: &str) -> Result<Operand, FieldError> {
        self.items(raw)?
            .into_iter()
            .map(strict_integer)
            .collect::<Result<Vec<_>, _>>()
            .map(Operand::List)
    }

    /// Blank means NULL.
    fn nullable(
        &self,
        field: &ResolvedField,
        scalar: ScalarType,
        raw: &str,
    ) -> Result<Value, FieldError> {
        if raw.trim().is_empty() {
            Ok(Value::Null)
        } else {
            self.strict(field, scalar, raw)
        }
    }

    fn strict(
        &self,
        field: &ResolvedField,
        scalar: ScalarType,
        raw: &str,
    ) -> Result<Value, FieldError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(blank(raw));
        }

        match scalar {
            ScalarType::Text => Ok(Value::text(trimmed)),
            ScalarType::Choice => self
                .choices
                .normalize(self.project, &field.name, trimmed)
                .map(Value::Text),
            ScalarType::Integer => parse_integer(trimmed).map(Value::Integer).ok_or_else(|| {
                FieldError::invalid_value(raw, format!("Enter a whole number: '{}'.", raw))
            }),
            ScalarType::Decimal => parse_decimal(trimmed).map(Value::Decimal).ok_or_else(|| {
                FieldError::invalid_value(raw, format!("Enter a number: '{}'.", raw))
            }),
            ScalarType::Date => self.date(trimmed).map(Value::Date).ok_or_else(|| {
                FieldError::invalid_value(raw, format!("Enter a valid date: '{}'.", raw))
            }),
            ScalarType::DateTime => self.datetime(trimmed).map(Value::DateTime).ok_or_else(|| {
                FieldError::invalid_value(raw, format!("Enter a valid date/time: '{}'.", raw))
            }),
            ScalarType::Boolean => strict_bool(raw).map(Value::Boolean),
        }
    }

    fn date(&self, raw: &str) -> Option<chrono::NaiveDate> {
        match raw.to_lowercase().as_str() {
            "today" | "now" => Some(self.now.date()),
            _ => parse_date(raw),
        }
    }

    fn datetime(&self, raw: &str) -> Option<NaiveDateTime> {
        match raw.to_lowercase().as_str() {
            "now" => Some(self.now),
            "today" => Some(self.now.date().and_time(NaiveTime::MIN)),
            _ => parse_datetime(raw),
        }
    }
}

fn blank(raw: &str) -> FieldError {
    FieldError::invalid_value(raw, "This value may not be blank.")
}

fn unsupported(raw: &str, lookup: Lookup) -> FieldError {
    FieldError::invalid_value(
        raw,
        format!("The '{}' lookup cannot be used on this field.", lookup),
    )
}

fn non_blank(raw: &str) -> Result<&str, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { Err(blank(raw)) } else { Ok(trimmed) }
}

fn strict_bool(raw: &str) -> Result<bool, FieldError> {
    strtobool(raw).ok_or_else(|| {
        FieldError::invalid_value(raw, format!("Must be a valid boolean: '{}'.", raw))
    })
}

fn strict_integer(raw: &str) -> Result<Value, FieldError> {
    let trimmed = non_blank(raw)?;
    parse_integer(trimmed)
        .map(Value::Integer)
        .ok_or_else(|| FieldError::invalid_value(raw, format!("Enter a whole number: '{}'.", raw)))
}

fn pair(raw: &str) -> Result<(&str, &str), FieldError> {
    match split_list(raw).as_slice() {
        [low, high] => Ok((*low, *high)),
        items => Err(FieldError::invalid_value(
            raw,
            format!("Enter exactly two values, received {}.", items.len()),
        )),
    }
}

fn integer_range(raw: &str) -> Result<Operand, FieldError> {
    let (low, high) = pair(raw)?;
    Ok(Operand::Range(strict_integer(low)?, strict_integer(high)?))
}
