//! In-memory record store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Datelike;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::record::Record;
use super::{BackendKind, QueryBackend};
use crate::error::BackendError;
use crate::fields::{RelationHop, SEPARATOR};
use crate::query::{Comparison, Operator, Predicate, Transform};
use crate::schema::ProjectSchema;
use crate::summary::{SummaryPlan, SummaryRow};
use crate::types::Value;

#[derive(Default)]
struct State {
    records: Vec<Record>,
    next_id: i64,
}

/// Holds a project's records in memory and evaluates predicates directly.
pub struct MemoryBackend {
    schema: Arc<ProjectSchema>,
    state: RwLock<State>,
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("project", &self.schema.code)
            .field("records", &self.state.read().records.len())
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    pub fn new(schema: Arc<ProjectSchema>) -> Self {
        Self {
            schema,
            state: RwLock::new(State::default()),
        }
    }

    /// Stores an already-built record, keeping its ids.
    pub fn push(&self, record: Record) {
        let mut state = self.state.write();
        state.next_id = state.next_id.max(max_id(&record));
        state.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records satisfying the predicate.
    pub fn records(&self, predicate: &Predicate) -> Vec<Record> {
        self.state
            .read()
            .records
            .iter()
            .filter(|record| matches(record, predicate))
            .cloned()
            .collect()
    }
}

fn max_id(record: &Record) -> i64 {
    record
        .relations
        .values()
        .flatten()
        .map(max_id)
        .fold(record.id, i64::max)
}

impl QueryBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn schema(&self) -> &ProjectSchema {
        &self.schema
    }

    fn insert(&self, record: &JsonValue) -> Result<i64, BackendError> {
        let mut state = self.state.write();
        let mut next_id = state.next_id;
        let record = Record::from_json(&self.schema.model, record, &mut || {
            next_id += 1;
            next_id
        })?;
        let id = record.id;
        state.next_id = next_id;
        state.records.push(record);
        debug!(project = %self.schema.code, id, "Inserted record");
        Ok(id)
    }

    fn filter(&self, predicate: &Predicate) -> Result<Vec<i64>, BackendError> {
        let state = self.state.read();
        let mut ids: Vec<i64> = state
            .records
            .iter()
            .filter(|record| matches(record, predicate))
            .map(|record| record.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&self, ids: &[i64]) -> Result<Vec<JsonValue>, BackendError> {
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.records.iter().find(|r| r.id == *id))
            .map(|record| record.to_json(&self.schema.model))
            .collect())
    }

    fn summarise(&self, plan: &SummaryPlan) -> Result<Vec<SummaryRow>, BackendError> {
        let state = self.state.read();
        let mut groups: Vec<SummaryRow> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in state.records.iter().filter(|r| matches(r, &plan.predicate)) {
            let rows: Vec<&Record> = match &plan.relation {
                Some(relation) => rows_at(record, &relation.hops).into_iter().flatten().collect(),
                None => vec![record],
            };

            for row in rows {
                let values: Vec<Value> = plan
                    .fields
                    .iter()
                    .map(|field| {
                        let source = if field.hops.is_empty() { record } else { row };
                        source.value(&field.column).clone()
                    })
                    .collect();
                let key = JsonValue::Array(values.iter().map(Value::to_json).collect()).to_string();

                match index.get(&key) {
                    Some(&i) => groups[i].count += 1,
                    None => {
                        index.insert(key, groups.len());
                        groups.push(SummaryRow { values, count: 1 });
                    }
                }
            }
        }

        Ok(groups)
    }
}

/// Name of a relation within its parent model.
fn relation_name(hop: &RelationHop) -> &str {
    hop.path.rsplit(SEPARATOR).next().unwrap_or(&hop.path)
}

/// Rows reached by following the hops; None stands for a missing row.
fn rows_at<'r>(record: &'r Record, hops: &[RelationHop]) -> Vec<Option<&'r Record>> {
    let mut frontier = vec![Some(record)];
    for hop in hops {
        let name = relation_name(hop);
        frontier = frontier
            .into_iter()
            .flat_map(|row| match row.map(|r| r.related(name)) {
                Some(related) if !related.is_empty() => related.iter().map(Some).collect(),
                _ => vec![None],
            })
            .collect();
    }
    frontier
}

/// Evaluates a predicate against one record.
pub(crate) fn matches(record: &Record, predicate: &Predicate) -> bool {
    predicate.evaluate(&mut |comparison: &Comparison| compare(record, comparison))
}

fn compare(record: &Record, comparison: &Comparison) -> bool {
    let field = &comparison.field;
    let rows = rows_at(record, &field.hops);

    if let Some(target) = &field.target {
        let name = relation_name(target);
        return comparison.op == Operator::IsNull
            && rows
                .iter()
                .any(|row| row.is_none_or(|r| r.related(name).is_empty()));
    }

    rows.iter().any(|row| {
        let value = row.map(|r| r.value(&field.column)).unwrap_or(&Value::Null);
        holds(value, comparison.transform, &comparison.op)
    })
}

fn transform(value: &Value, transform: Transform) -> Value {
    let date = match value {
        Value::Date(d) => Some(*d),
        Value::DateTime(dt) => Some(dt.date()),
        _ => None,
    };
    match (transform, value) {
        (Transform::Length, Value::Text(s)) => Value::Integer(s.chars().count() as i64),
        (Transform::Length, Value::Array(items)) => Value::Integer(items.len() as i64),
        (Transform::Year, _) => date.map_or(Value::Null, |d| Value::Integer(d.year() as i64)),
        (Transform::IsoYear, _) => {
            date.map_or(Value::Null, |d| Value::Integer(d.iso_week().year() as i64))
        }
        (Transform::Week, _) => {
            date.map_or(Value::Null, |d| Value::Integer(d.iso_week().week() as i64))
        }
        _ => Value::Null,
    }
}

fn text_test(value: &Value, f: impl Fn(&str) -> bool) -> bool {
    value.as_text().is_some_and(f)
}

/// `a` contains `b` in the JSON containment sense.
fn json_contains(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Object(a), JsonValue::Object(b)) => b
            .iter()
            .all(|(key, bv)| a.get(key).is_some_and(|av| json_contains(av, bv))),
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            b.iter().all(|bv| a.iter().any(|av| json_contains(av, bv)))
        }
        _ => a == b,
    }
}

fn array_contains(haystack: &[Value], needles: &[Value]) -> bool {
    needles.iter().all(|n| haystack.iter().any(|h| h.matches(n)))
}

fn holds(value: &Value, transform_by: Option<Transform>, op: &Operator) -> bool {
    let transformed;
    let value = match transform_by {
        Some(t) => {
            transformed = transform(value, t);
            &transformed
        }
        None => value,
    };

    if *op == Operator::IsNull {
        return value.is_null();
    }
    if value.is_null() {
        return false;
    }

    match op {
        Operator::Exact(expected) => value.matches(expected),
        Operator::IExact(s) => text_test(value, |v| v.to_lowercase() == s.to_lowercase()),
        Operator::In(values) => values.iter().any(|v| value.matches(v)),
        Operator::Contains(needle) => match (value, needle) {
            (Value::Text(v), Value::Text(n)) => v.contains(n.as_str()),
            (Value::Array(v), Value::Array(n)) => array_contains(v, n),
            (Value::Json(v), Value::Json(n)) => json_contains(v, n),
            _ => false,
        },
        Operator::IContains(s) => text_test(value, |v| v.to_lowercase().contains(&s.to_lowercase())),
        Operator::StartsWith(s) => text_test(value, |v| v.starts_with(s.as_str())),
        Operator::IStartsWith(s) => {
            text_test(value, |v| v.to_lowercase().starts_with(&s.to_lowercase()))
        }
        Operator::EndsWith(s) => text_test(value, |v| v.ends_with(s.as_str())),
        Operator::IEndsWith(s) => {
            text_test(value, |v| v.to_lowercase().ends_with(&s.to_lowercase()))
        }
        Operator::Lt(bound) => value.compare(bound).is_some_and(|o| o.is_lt()),
        Operator::Lte(bound) => value.compare(bound).is_some_and(|o| o.is_le()),
        Operator::Gt(bound) => value.compare(bound).is_some_and(|o| o.is_gt()),
        Operator::Gte(bound) => value.compare(bound).is_some_and(|o| o.is_ge()),
        Operator::Range(low, high) => {
            value.compare(low).is_some_and(|o| o.is_ge())
                && value.compare(high).is_some_and(|o| o.is_le())
        }
        Operator::IsNull => false,
        Operator::ContainedBy(container) => match (value, container) {
            (Value::Array(v), Value::Array(c)) => array_contains(c, v),
            (Value::Json(v), Value::Json(c)) => json_contains(c, v),
            _ => false,
        },
        Operator::Overlap(other) => match (value, other) {
            (Value::Array(v), Value::Array(o)) => v.iter().any(|x| o.iter().any(|y| x.matches(y))),
            _ => false,
        },
        Operator::HasKey(key) => json_object(value).is_some_and(|o| o.contains_key(key)),
        Operator::HasKeys(keys) => {
            json_object(value).is_some_and(|o| keys.iter().all(|k| o.contains_key(k)))
        }
        Operator::HasAnyKeys(keys) => {
            json_object(value).is_some_and(|o| keys.iter().any(|k| o.contains_key(k)))
        }
    }
}

fn json_object(value: &Value) -> Option<&serde_json::Map<String, JsonValue>> {
    match value {
        Value::Json(JsonValue::Object(map)) => Some(map),
        _ => None,
    }
}
