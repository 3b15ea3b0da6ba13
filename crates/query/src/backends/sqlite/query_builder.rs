//! Renders predicates into SQLite SQL.
//!
//! Every comparison renders as `COALESCE(<test>, 0)` so that a test against
//! NULL is false rather than unknown, and `NOT` of it is true. Comparisons
//! through relations become `EXISTS` subqueries over a chain of left joins
//! starting at the outer row; a missing related row joins as all-NULL.

use rust_decimal::prelude::ToPrimitive;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde_json::Value as JsonValue;

use crate::error::BackendError;
use crate::fields::RelationHop;
use crate::query::{Comparison, FieldRef, Operator, Predicate, Transform};
use crate::types::{DATE_FORMAT, OnyxType, Value};

/// Storage format for datetimes. Fixed precision keeps text ordering
/// consistent with time ordering.
pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Alias of the root table in generated statements.
pub const ROOT: &str = "t0";

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    String(String),
    Integer(i64),
    Float(f64),
    Null,
}

impl SqlParam {
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Converts a typed value to its stored form.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Text(s) => SqlParam::String(s.clone()),
            Value::Integer(i) => SqlParam::Integer(*i),
            Value::Decimal(d) => d.to_f64().map_or(SqlParam::Null, SqlParam::Float),
            Value::Date(d) => SqlParam::String(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => SqlParam::String(dt.format(SQL_DATETIME_FORMAT).to_string()),
            Value::Boolean(b) => SqlParam::Integer(i64::from(*b)),
            Value::Array(_) | Value::Json(_) => SqlParam::String(value.to_json().to_string()),
        }
    }

    /// Converts a JSON leaf to the form `json_extract` returns it in.
    fn from_json_leaf(json: &JsonValue) -> Option<Self> {
        match json {
            JsonValue::Null => Some(SqlParam::Null),
            JsonValue::Bool(b) => Some(SqlParam::Integer(i64::from(*b))),
            JsonValue::Number(n) => n
                .as_i64()
                .map(SqlParam::Integer)
                .or_else(|| n.as_f64().map(SqlParam::Float)),
            JsonValue::String(s) => Some(SqlParam::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            SqlParam::String(s) => ValueRef::Text(s.as_bytes()),
            SqlParam::Integer(i) => ValueRef::Integer(*i),
            SqlParam::Float(f) => ValueRef::Real(*f),
            SqlParam::Null => ValueRef::Null,
        }))
    }
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Adds a parameter and returns its placeholder.
    pub fn add_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Quotes an identifier.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column reference `alias."column"`.
pub fn column(alias: &str, name: &str) -> String {
    format!("{}.{}", alias, quote(name))
}

/// Join condition between a parent alias and the alias of a hop's table.
pub fn join_condition(hop: &RelationHop, parent: &str, child: &str) -> String {
    if hop.many {
        format!("{} = {}", column(child, &hop.join_column), column(parent, "id"))
    } else {
        format!("{} = {}", column(child, "id"), column(parent, &hop.join_column))
    }
}

/// Renders predicates against the root table aliased as [`ROOT`].
pub struct QueryBuilder {
    root_table: String,
    fragment: SqlFragment,
    aliases: usize,
}

impl QueryBuilder {
    pub fn new(root_table: impl Into<String>) -> Self {
        Self {
            root_table: root_table.into(),
            fragment: SqlFragment::default(),
            aliases: 0,
        }
    }

    /// Builds the `WHERE` condition for a predicate.
    pub fn build(mut self, predicate: &Predicate) -> Result<SqlFragment, BackendError> {
        let sql = self.predicate(predicate)?;
        self.fragment.sql = sql;
        Ok(self.fragment)
    }

    fn alias(&mut self) -> String {
        self.aliases += 1;
        format!("r{}", self.aliases)
    }

    fn param(&mut self, param: SqlParam) -> String {
        self.fragment.add_param(param)
    }

    fn predicate(&mut self, predicate: &Predicate) -> Result<String, BackendError> {
        Ok(match predicate {
            Predicate::True => "1".to_string(),
            Predicate::False => "0".to_string(),
            Predicate::Compare(comparison) => self.comparison(comparison)?,
            Predicate::And(children) => self.join(children, " AND ")?,
            Predicate::Or(children) => self.join(children, " OR ")?,
            Predicate::Xor(children) => {
                let parts = self.parts(children)?;
                format!("(({}) % 2 = 1)", parts.join(" + "))
            }
            Predicate::Not(child) => format!("NOT {}", self.predicate(child)?),
        })
    }

    fn parts(&mut self, children: &[Predicate]) -> Result<Vec<String>, BackendError> {
        children
            .iter()
            .map(|child| self.predicate(child).map(|sql| format!("({})", sql)))
            .collect()
    }

    fn join(&mut self, children: &[Predicate], separator: &str) -> Result<String, BackendError> {
        Ok(format!("({})", self.parts(children)?.join(separator)))
    }

    fn comparison(&mut self, comparison: &Comparison) -> Result<String, BackendError> {
        let field = &comparison.field;
        if field.hops.is_empty() && field.target.is_none() {
            let expr = column(ROOT, &field.column);
            return self.test(&expr, field, comparison.transform, &comparison.op);
        }

        // Rows reached through the hops, starting at a copy of the outer row
        let start = self.alias();
        let mut from = format!("{} AS {}", quote(&self.root_table), start);
        let mut parent = start.clone();
        for hop in &field.hops {
            let alias = self.alias();
            from.push_str(&format!(
                " LEFT JOIN {} AS {} ON {}",
                quote(&hop.table),
                alias,
                join_condition(hop, &parent, &alias)
            ));
            parent = alias;
        }

        let test = match &field.target {
            Some(target) => {
                if comparison.op != Operator::IsNull {
                    return Ok("0".to_string());
                }
                let alias = self.alias();
                from.push_str(&format!(
                    " LEFT JOIN {} AS {} ON {}",
                    quote(&target.table),
                    alias,
                    join_condition(target, &parent, &alias)
                ));
                format!("{} IS NULL", column(&alias, "id"))
            }
            None => {
                let expr = column(&parent, &field.column);
                self.test(&expr, field, comparison.transform, &comparison.op)?
            }
        };

        Ok(format!(
            "EXISTS (SELECT 1 FROM {} WHERE {} = {} AND {})",
            from,
            column(&start, "id"),
            column(ROOT, "id"),
            test
        ))
    }

    /// Two-valued test of an expression.
    fn test(
        &mut self,
        expr: &str,
        field: &FieldRef,
        transform: Option<Transform>,
        op: &Operator,
    ) -> Result<String, BackendError> {
        let expr = match transform {
            Some(transform) => transformed(expr, field.onyx_type, transform),
            None => expr.to_string(),
        };
        if *op == Operator::IsNull {
            return Ok(format!("{} IS NULL", expr));
        }
        Ok(format!("COALESCE({}, 0)", self.operator(&expr, op)?))
    }

    fn operator(&mut self, expr: &str, op: &Operator) -> Result<String, BackendError> {
        Ok(match op {
            Operator::Exact(value) => {
                let p = self.param(SqlParam::from_value(value));
                format!("{} = {}", expr, p)
            }
            Operator::IExact(s) => {
                let p = self.param(SqlParam::string(s));
                format!("lower({}) = lower({})", expr, p)
            }
            Operator::In(values) => {
                if values.is_empty() {
                    return Ok("0".to_string());
                }
                let placeholders = self.list(values);
                format!("{} IN ({})", expr, placeholders)
            }
            Operator::Contains(Value::Text(s)) => {
                let p = self.param(SqlParam::string(s));
                format!("instr({}, {}) > 0", expr, p)
            }
            Operator::Contains(Value::Array(items)) => {
                if items.is_empty() {
                    return Ok(format!("{} IS NOT NULL", expr));
                }
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let p = self.param(SqlParam::from_value(item));
                        format!("EXISTS (SELECT 1 FROM json_each({}) WHERE value = {})", expr, p)
                    })
                    .collect();
                format!("({})", parts.join(" AND "))
            }
            Operator::Contains(Value::Json(needle)) => self.json_contains(expr, "$", needle)?,
            Operator::Contains(other) => return Err(unsupported(format!("contains {}", other))),
            Operator::IContains(s) => {
                let p = self.param(SqlParam::string(s));
                format!("instr(lower({}), lower({})) > 0", expr, p)
            }
            Operator::StartsWith(s) => {
                let p = self.param(SqlParam::string(s));
                format!("substr({}, 1, length({})) = {}", expr, p, p)
            }
            Operator::IStartsWith(s) => {
                let p = self.param(SqlParam::string(s));
                format!("lower(substr({}, 1, length({}))) = lower({})", expr, p, p)
            }
            Operator::EndsWith(s) => {
                let p = self.param(SqlParam::string(s));
                format!(
                    "({} IS NOT NULL AND (length({}) = 0 OR substr({}, -length({})) = {}))",
                    expr, p, expr, p, p
                )
            }
            Operator::IEndsWith(s) => {
                let p = self.param(SqlParam::string(s));
                format!(
                    "({} IS NOT NULL AND (length({}) = 0 OR lower(substr({}, -length({}))) = lower({})))",
                    expr, p, expr, p, p
                )
            }
            Operator::Lt(value) => self.binary(expr, "<", value),
            Operator::Lte(value) => self.binary(expr, "<=", value),
            Operator::Gt(value) => self.binary(expr, ">", value),
            Operator::Gte(value) => self.binary(expr, ">=", value),
            Operator::Range(low, high) => {
                let low = self.param(SqlParam::from_value(low));
                let high = self.param(SqlParam::from_value(high));
                format!("{} BETWEEN {} AND {}", expr, low, high)
            }
            Operator::IsNull => format!("{} IS NULL", expr),
            Operator::ContainedBy(Value::Array(items)) => {
                if items.is_empty() {
                    format!("json_array_length({}) = 0", expr)
                } else {
                    let placeholders = self.list(items);
                    format!(
                        "({} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM json_each({}) WHERE value NOT IN ({})))",
                        expr, expr, placeholders
                    )
                }
            }
            Operator::ContainedBy(other) => {
                return Err(unsupported(format!("contained_by {}", other)));
            }
            Operator::Overlap(Value::Array(items)) => {
                if items.is_empty() {
                    return Ok("0".to_string());
                }
                let placeholders = self.list(items);
                format!(
                    "EXISTS (SELECT 1 FROM json_each({}) WHERE value IN ({}))",
                    expr, placeholders
                )
            }
            Operator::Overlap(other) => return Err(unsupported(format!("overlap {}", other))),
            Operator::HasKey(key) => self.has_key(expr, key),
            Operator::HasKeys(keys) => self.has_keys(expr, keys, " AND "),
            Operator::HasAnyKeys(keys) => self.has_keys(expr, keys, " OR "),
        })
    }

    fn list(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.param(SqlParam::from_value(v)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn binary(&mut self, expr: &str, symbol: &str, value: &Value) -> String {
        let p = self.param(SqlParam::from_value(value));
        format!("{} {} {}", expr, symbol, p)
    }

    fn has_key(&mut self, expr: &str, key: &str) -> String {
        let p = self.param(SqlParam::String(json_path("$", key)));
        format!(
            "(json_type({}) = 'object' AND json_type({}, {}) IS NOT NULL)",
            expr, expr, p
        )
    }

    fn has_keys(&mut self, expr: &str, keys: &[String], separator: &str) -> String {
        if keys.is_empty() {
            return if separator == " AND " {
                format!("json_type({}) = 'object'", expr)
            } else {
                "0".to_string()
            };
        }
        let parts: Vec<String> = keys.iter().map(|key| self.has_key(expr, key)).collect();
        format!("({})", parts.join(separator))
    }

    /// Containment of a JSON object, compared leaf by leaf.
    fn json_contains(
        &mut self,
        expr: &str,
        path: &str,
        needle: &JsonValue,
    ) -> Result<String, BackendError> {
        let JsonValue::Object(map) = needle else {
            return Err(unsupported("containment of non-object structures"));
        };

        let p = self.param(SqlParam::string(path));
        let mut parts = vec![format!("json_type({}, {}) = 'object'", expr, p)];
        for (key, value) in map {
            let child = json_path(path, key);
            match value {
                JsonValue::Object(_) => parts.push(self.json_contains(expr, &child, value)?),
                JsonValue::Array(_) => {
                    return Err(unsupported("containment of arrays within structures"));
                }
                JsonValue::Null => {
                    let p = self.param(SqlParam::String(child));
                    parts.push(format!("json_type({}, {}) = 'null'", expr, p));
                }
                leaf => {
                    let p = self.param(SqlParam::String(child));
                    let param = SqlParam::from_json_leaf(leaf).unwrap_or(SqlParam::Null);
                    let v = self.param(param);
                    let kind = if leaf.is_boolean() {
                        format!(" AND json_type({}, {}) IN ('true', 'false')", expr, p)
                    } else {
                        String::new()
                    };
                    parts.push(format!("(json_extract({}, {}) = {}{})", expr, p, v, kind));
                }
            }
        }
        Ok(format!("({})", parts.join(" AND ")))
    }
}

fn json_path(parent: &str, key: &str) -> String {
    format!("{}.\"{}\"", parent, key.replace('\\', "\\\\").replace('"', "\\\""))
}

fn transformed(expr: &str, onyx_type: OnyxType, transform: Transform) -> String {
    match transform {
        Transform::Length => match onyx_type {
            OnyxType::Array(_) | OnyxType::Identifiers => format!("json_array_length({})", expr),
            _ => format!("length({})", expr),
        },
        Transform::Year => format!("CAST(strftime('%Y', {}) AS INTEGER)", expr),
        Transform::IsoYear => format!("CAST(strftime('%G', {}) AS INTEGER)", expr),
        Transform::Week => format!("CAST(strftime('%V', {}) AS INTEGER)", expr),
    }
}

fn unsupported(message: impl Into<String>) -> BackendError {
    BackendError::Unsupported {
        backend_name: "sqlite".to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;

    fn field(path: &str, onyx_type: OnyxType, hops: Vec<RelationHop>) -> FieldRef {
        FieldRef {
            path: path.into(),
            column: path.rsplit("__").next().unwrap_or(path).into(),
            table: "mpx".into(),
            onyx_type,
            hops,
            target: None,
        }
    }

    fn records() -> RelationHop {
        RelationHop {
            path: "records".into(),
            table: "mpx_records".into(),
            many: true,
            join_column: "parent_id".into(),
        }
    }

    fn build(predicate: &Predicate) -> SqlFragment {
        QueryBuilder::new("mpx").build(predicate).unwrap()
    }

    #[test]
    fn test_add_param() {
        let mut fragment = SqlFragment::new("");
        assert_eq!(fragment.add_param(SqlParam::Integer(1)), "?1");
        assert_eq!(fragment.add_param(SqlParam::string("a")), "?2");
        assert_eq!(fragment.params.len(), 2);
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("mpx"), "\"mpx\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(column("t0", "id"), "t0.\"id\"");
    }

    #[test]
    fn test_root_comparison() {
        let p = Predicate::compare(
            field("tests", OnyxType::Integer, vec![]),
            None,
            Operator::Gt(Value::Integer(3)),
        );
        let fragment = build(&p);
        assert_eq!(fragment.sql, "COALESCE(t0.\"tests\" > ?1, 0)");
        assert_eq!(fragment.params, vec![SqlParam::Integer(3)]);
    }

    #[test]
    fn test_negation_and_isnull() {
        let f = field("country", OnyxType::Choice, vec![]);
        let p = !Predicate::compare(f.clone(), None, Operator::IsNull)
            & !Predicate::compare(f, None, Operator::Exact(Value::text("eng")));
        let fragment = build(&p);
        assert_eq!(
            fragment.sql,
            "((NOT t0.\"country\" IS NULL) AND (NOT COALESCE(t0.\"country\" = ?1, 0)))"
        );
    }

    #[test]
    fn test_relation_comparison() {
        let p = Predicate::compare(
            field("records__test_result", OnyxType::Choice, vec![records()]),
            None,
            Operator::Exact(Value::text("pos")),
        );
        let fragment = build(&p);
        assert_eq!(
            fragment.sql,
            "EXISTS (SELECT 1 FROM \"mpx\" AS r1 LEFT JOIN \"mpx_records\" AS r2 ON r2.\"parent_id\" = r1.\"id\" \
             WHERE r1.\"id\" = t0.\"id\" AND COALESCE(r2.\"test_result\" = ?1, 0))"
        );
    }

    #[test]
    fn test_relation_isnull() {
        let mut f = field("records", OnyxType::Relation, vec![]);
        f.target = Some(records());
        let fragment = build(&Predicate::compare(f.clone(), None, Operator::IsNull));
        assert!(fragment.sql.contains("r2.\"id\" IS NULL"));

        let fragment = build(&Predicate::compare(f, None, Operator::Exact(Value::Integer(1))));
        assert_eq!(fragment.sql, "0");
    }

    #[test]
    fn test_transforms() {
        assert_eq!(
            transformed("x", OnyxType::Array(ScalarType::Integer), Transform::Length),
            "json_array_length(x)"
        );
        assert_eq!(transformed("x", OnyxType::Text, Transform::Length), "length(x)");
        assert_eq!(
            transformed("x", OnyxType::Date, Transform::Week),
            "CAST(strftime('%V', x) AS INTEGER)"
        );
    }

    #[test]
    fn test_xor_and_constants() {
        let f = field("tests", OnyxType::Integer, vec![]);
        let p = Predicate::Xor(vec![
            Predicate::compare(f.clone(), None, Operator::Exact(Value::Integer(1))),
            Predicate::compare(f, None, Operator::Exact(Value::Integer(2))),
        ]);
        assert!(build(&p).sql.ends_with("% 2 = 1)"));
        assert_eq!(build(&Predicate::True).sql, "1");
        assert_eq!(build(&Predicate::False).sql, "0");
    }

    #[test]
    fn test_value_params() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(SqlParam::from_value(&Value::Date(date)), SqlParam::string("2024-03-01"));
        assert_eq!(SqlParam::from_value(&Value::Boolean(true)), SqlParam::Integer(1));
        assert_eq!(
            SqlParam::from_value(&Value::DateTime(date.and_hms_opt(1, 2, 3).unwrap())),
            SqlParam::string("2024-03-01 01:02:03.000000")
        );
        assert_eq!(
            SqlParam::from_value(&Value::Array(vec![Value::Integer(1)])),
            SqlParam::string("[1]")
        );
    }

    #[test]
    fn test_unsupported_structure_containment() {
        let p = Predicate::compare(
            field("metadata", OnyxType::Structure, vec![]),
            None,
            Operator::Contains(Value::Json(serde_json::json!({"a": [1]}))),
        );
        assert!(matches!(
            QueryBuilder::new("mpx").build(&p),
            Err(BackendError::Unsupported { .. })
        ));
    }
}
