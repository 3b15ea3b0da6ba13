//! Validation and compilation of query documents into predicates.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use super::atoms::{AtomRef, Combinator, flatten, layers};
use super::document::{QueryAtom, QueryNode};
use super::predicate::{FieldRef, Operator, Predicate, Transform};
use crate::coerce::{LookupCoercer, Operand};
use crate::config::QueryConfig;
use crate::error::{FieldError, FieldErrors, QueryError};
use crate::fields::{FieldHandler, ResolvedField};
use crate::types::{Lookup, OnyxType, Value};

/// A validated query.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    /// Resolved fields of every atom, in document order.
    pub fields: Vec<ResolvedField>,
}

impl CompiledQuery {
    /// Distinct field paths, in first-use order.
    pub fn field_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !paths.contains(&field.path.as_str()) {
                paths.push(&field.path);
            }
        }
        paths
    }
}

/// Compiles query documents for one user, project and action.
pub struct QueryCompiler<'a> {
    handler: &'a FieldHandler<'a>,
    config: &'a QueryConfig,
    coercer: LookupCoercer<'a>,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(handler: &'a FieldHandler<'a>, config: &'a QueryConfig) -> Self {
        let coercer = LookupCoercer::new(handler.choices(), &handler.schema().code, config);
        Self {
            handler,
            config,
            coercer,
        }
    }

    /// Fixes the instant `today` and `now` resolve to.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.coercer = self.coercer.with_now(now);
        self
    }

    pub fn handler(&self) -> &FieldHandler<'a> {
        self.handler
    }

    /// Parses a JSON document and compiles it.
    pub fn compile_json(&self, document: &JsonValue) -> Result<CompiledQuery, QueryError> {
        let node = QueryNode::parse(document, self.config)?;
        self.compile(&node)
    }

    /// Validates every atom of the document and builds its predicate.
    ///
    /// Every failing atom is reported, keyed by its field key.
    #[instrument(skip_all, fields(project = %self.handler.schema().code, action = %self.handler.action()))]
    pub fn compile(&self, node: &QueryNode) -> Result<CompiledQuery, QueryError> {
        let (shape, atoms) = flatten(node);
        let mut compiled: Vec<Option<(ResolvedField, Predicate)>> = vec![None; atoms.len()];
        let mut errors = FieldErrors::new();

        // Keys are resolved once, the first time a layer holds them; later
        // layers only clean their values against the cached field.
        let mut resolved: HashMap<&str, Result<ResolvedField, FieldError>> = HashMap::new();
        for (depth, layer) in layers(&atoms).into_iter().enumerate() {
            let fresh = layer
                .iter()
                .filter(|r| !resolved.contains_key(atoms[r.0].key.as_str()))
                .count();
            debug!(layer = depth, atoms = layer.len(), fresh, "Validating layer");

            for atom_ref in layer {
                let atom = atoms[atom_ref.0];
                let resolution = resolved
                    .entry(atom.key.as_str())
                    .or_insert_with(|| self.handler.resolve(&atom.key, true));
                let result = match resolution {
                    Ok(field) => self.build(field, atom).map(|p| (field.clone(), p)),
                    Err(error) => Err(error.clone()),
                };
                match result {
                    Ok(result) => compiled[atom_ref.0] = Some(result),
                    Err(error) => {
                        if !errors.get(&atom.key).contains(&error) {
                            errors.push(&atom.key, error);
                        }
                    }
                }
            }
        }

        if !errors.is_empty() {
            warn!(fields = errors.len(), "Rejected query");
            return Err(QueryError::Fields(errors));
        }

        let mut fields = Vec::with_capacity(compiled.len());
        let mut predicates = Vec::with_capacity(compiled.len());
        for (field, predicate) in compiled.into_iter().flatten() {
            fields.push(field);
            predicates.push(Some(predicate));
        }

        let predicate = shape.reduce(
            &mut |r: AtomRef| predicates[r.0].take().unwrap_or(Predicate::False),
            &|combinator: Combinator, children: Vec<Predicate>| match combinator {
                Combinator::And => Predicate::all(children),
                Combinator::Or => Predicate::any(children),
                Combinator::Xor => Predicate::parity(children),
            },
            &|child: Predicate| !child,
        );

        debug!(predicate = %predicate, "Compiled query");
        Ok(CompiledQuery { predicate, fields })
    }

    /// Resolves, cleans and rewrites a single atom.
    pub fn atom(&self, atom: &QueryAtom) -> Result<(ResolvedField, Predicate), FieldError> {
        let field = self.handler.resolve(&atom.key, true)?;
        let predicate = self.build(&field, atom)?;
        Ok((field, predicate))
    }

    /// Cleans an atom's value for an already resolved field and rewrites it.
    fn build(&self, field: &ResolvedField, atom: &QueryAtom) -> Result<Predicate, FieldError> {
        let operand = self.coercer.clean(field, &atom.value)?;
        atom_predicate(field, operand).ok_or_else(|| {
            FieldError::invalid_value(
                atom.value.as_str(),
                format!("The '{}' lookup cannot be used on this field.", field.lookup),
            )
        })
    }
}

fn compare(field: &FieldRef, transform: Option<Transform>, op: Operator) -> Predicate {
    Predicate::compare(field.clone(), transform, op)
}

/// Type-aware emptiness test used by `isnull`.
fn null_check(field: &FieldRef) -> Predicate {
    let length_zero = || compare(field, Some(Transform::Length), Operator::Exact(Value::Integer(0)));
    match field.onyx_type {
        OnyxType::Array(_) => length_zero(),
        OnyxType::Structure => compare(
            field,
            None,
            Operator::Exact(Value::Json(JsonValue::Object(Default::default()))),
        ),
        OnyxType::Identifiers => compare(field, None, Operator::IsNull) | length_zero(),
        _ => compare(field, None, Operator::IsNull),
    }
}

/// Equality where a NULL value means IS NULL.
fn equals(field: &FieldRef, transform: Option<Transform>, value: Value) -> Predicate {
    if value.is_null() {
        compare(field, transform, Operator::IsNull)
    } else {
        compare(field, transform, Operator::Exact(value))
    }
}

/// Membership where NULL items are replaced by an IS NULL alternative.
fn in_list(field: &FieldRef, transform: Option<Transform>, values: Vec<Value>) -> Predicate {
    let has_null = values.iter().any(Value::is_null);
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    let is_null = || compare(field, transform, Operator::IsNull);

    match (values.is_empty(), has_null) {
        (true, true) => is_null(),
        (true, false) => Predicate::False,
        (false, false) => compare(field, transform, Operator::In(values)),
        (false, true) => compare(field, transform, Operator::In(values)) | is_null(),
    }
}

fn texts(values: Vec<Value>) -> Option<Vec<String>> {
    values
        .into_iter()
        .map(|v| match v {
            Value::Text(s) => Some(s),
            _ => None,
        })
        .collect()
}

/// Builds the predicate of a cleaned atom.
///
/// `ne` holds only for non-NULL values that differ from the operand. `in`
/// with a blank slot also matches NULL, and `notin` is its negation.
/// Returns None when the operand shape does not fit the lookup.
fn atom_predicate(field: &ResolvedField, operand: Operand) -> Option<Predicate> {
    let f = &FieldRef::from(field);
    let text = |v: Value| match v {
        Value::Text(s) => Some(s),
        _ => None,
    };

    let predicate = match (field.lookup, operand) {
        (Lookup::IsNull, Operand::Value(Value::Boolean(true))) => null_check(f),
        (Lookup::IsNull, Operand::Value(Value::Boolean(false))) => !null_check(f),

        (Lookup::Bare | Lookup::Exact, Operand::Value(v)) => equals(f, None, v),
        (Lookup::Ne, Operand::Value(Value::Null)) => !compare(f, None, Operator::IsNull),
        (Lookup::Ne, Operand::Value(v)) => {
            !compare(f, None, Operator::IsNull) & !compare(f, None, Operator::Exact(v))
        }
        (Lookup::In, Operand::List(values)) => in_list(f, None, values),
        (Lookup::NotIn, Operand::List(values)) => !in_list(f, None, values),

        (Lookup::Contains, Operand::Value(v)) => compare(f, None, Operator::Contains(v)),
        (Lookup::IExact, Operand::Value(v)) => compare(f, None, Operator::IExact(text(v)?)),
        (Lookup::IContains, Operand::Value(v)) => compare(f, None, Operator::IContains(text(v)?)),
        (Lookup::StartsWith, Operand::Value(v)) => {
            compare(f, None, Operator::StartsWith(text(v)?))
        }
        (Lookup::IStartsWith, Operand::Value(v)) => {
            compare(f, None, Operator::IStartsWith(text(v)?))
        }
        (Lookup::EndsWith, Operand::Value(v)) => compare(f, None, Operator::EndsWith(text(v)?)),
        (Lookup::IEndsWith, Operand::Value(v)) => {
            compare(f, None, Operator::IEndsWith(text(v)?))
        }

        (Lookup::Lt, Operand::Value(v)) => compare(f, None, Operator::Lt(v)),
        (Lookup::Lte, Operand::Value(v)) => compare(f, None, Operator::Lte(v)),
        (Lookup::Gt, Operand::Value(v)) => compare(f, None, Operator::Gt(v)),
        (Lookup::Gte, Operand::Value(v)) => compare(f, None, Operator::Gte(v)),
        (Lookup::Range, Operand::Range(low, high)) => compare(f, None, Operator::Range(low, high)),

        (Lookup::Length, Operand::Value(v)) => equals(f, Some(Transform::Length), v),
        (Lookup::IsoYear, Operand::Value(v)) => equals(f, Some(Transform::IsoYear), v),
        (Lookup::Week, Operand::Value(v)) => equals(f, Some(Transform::Week), v),
        (Lookup::LengthIn, Operand::List(values)) => in_list(f, Some(Transform::Length), values),
        (Lookup::IsoYearIn, Operand::List(values)) => {
            in_list(f, Some(Transform::IsoYear), values)
        }
        (Lookup::WeekIn, Operand::List(values)) => in_list(f, Some(Transform::Week), values),
        (Lookup::LengthRange, Operand::Range(low, high)) => {
            compare(f, Some(Transform::Length), Operator::Range(low, high))
        }
        (Lookup::IsoYearRange, Operand::Range(low, high)) => {
            compare(f, Some(Transform::IsoYear), Operator::Range(low, high))
        }
        (Lookup::WeekRange, Operand::Range(low, high)) => {
            compare(f, Some(Transform::Week), Operator::Range(low, high))
        }

        (Lookup::ContainedBy, Operand::Value(v)) => compare(f, None, Operator::ContainedBy(v)),
        (Lookup::Overlap, Operand::Value(v)) => compare(f, None, Operator::Overlap(v)),
        (Lookup::HasKey, Operand::Value(v)) => compare(f, None, Operator::HasKey(text(v)?)),
        (Lookup::HasKeys, Operand::List(values)) => {
            compare(f, None, Operator::HasKeys(texts(values)?))
        }
        (Lookup::HasAnyKeys, Operand::List(values)) => {
            compare(f, None, Operator::HasAnyKeys(texts(values)?))
        }
        _ => return None,
    };
    Some(predicate)
}
