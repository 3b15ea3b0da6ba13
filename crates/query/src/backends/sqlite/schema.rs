//! SQLite tables for a project's model tree.

use rusqlite::Connection;
use tracing::debug;

use super::query_builder::quote;
use crate::error::BackendError;
use crate::schema::{FieldKind, ModelSchema};
use crate::types::ScalarType;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// A table and the columns it needs, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<(String, &'static str)>,
}

impl TableDef {
    pub fn create_sql(&self) -> String {
        let mut columns = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        columns.extend(
            self.columns
                .iter()
                .map(|(name, sql_type)| format!("{} {}", quote(name), sql_type)),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&self.name),
            columns.join(", ")
        )
    }
}

fn scalar_type(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Integer | ScalarType::Boolean => "INTEGER",
        ScalarType::Decimal => "REAL",
        ScalarType::Text | ScalarType::Choice | ScalarType::Date | ScalarType::DateTime => "TEXT",
    }
}

/// Tables for a model and every model beneath it, parents first.
pub fn tables(model: &ModelSchema) -> Vec<TableDef> {
    let mut out = Vec::new();
    collect_tables(model, None, &mut out);
    out
}

fn collect_tables(model: &ModelSchema, parent_column: Option<&str>, out: &mut Vec<TableDef>) {
    let mut columns = Vec::new();
    if let Some(parent_column) = parent_column {
        columns.push((parent_column.to_string(), "INTEGER"));
    }

    let mut children = Vec::new();
    for field in model.fields() {
        match &field.kind {
            FieldKind::Scalar(scalar) => columns.push((field.name.clone(), scalar_type(*scalar))),
            FieldKind::Array(_) | FieldKind::Structure | FieldKind::Identifiers => {
                columns.push((field.name.clone(), "TEXT"))
            }
            FieldKind::Relation(relation) if relation.many => {
                children.push((relation, Some(relation.join_column.as_str())));
            }
            FieldKind::Relation(relation) => {
                columns.push((relation.join_column.clone(), "INTEGER"));
                children.push((relation, None));
            }
        }
    }

    out.push(TableDef {
        name: model.table().to_string(),
        columns,
    });
    for (relation, parent_column) in children {
        collect_tables(&relation.model, parent_column, out);
    }
}

fn internal(message: String) -> impl FnOnce(rusqlite::Error) -> BackendError {
    move |e| BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message: format!("{}: {}", message, e),
        source: Some(Box::new(e)),
    }
}

/// Creates the version table and every model table.
pub fn initialize_schema(conn: &Connection, model: &ModelSchema) -> Result<(), BackendError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(internal("Failed to create schema_version table".into()))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .ok();
    if version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )
        .map_err(internal("Failed to set schema_version".into()))?;
    }

    for table in tables(model) {
        conn.execute(&table.create_sql(), [])
            .map_err(internal(format!("Failed to create table {}", table.name)))?;
        debug!(table = %table.name, columns = table.columns.len(), "Created table");
    }
    Ok(())
}
