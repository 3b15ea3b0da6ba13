//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, instrument};

use super::query_builder::{QueryBuilder, ROOT, SqlFragment, SqlParam, column, join_condition, quote};
use super::schema;
use crate::backends::record::Record;
use crate::backends::{BackendKind, QueryBackend};
use crate::error::BackendError;
use crate::query::Predicate;
use crate::schema::{FieldKind, ModelSchema, ProjectSchema};
use crate::summary::{SummaryPlan, SummaryRow};
use crate::types::{OnyxType, Value};

/// SQLite store for one project's records.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
    schema: Arc<ProjectSchema>,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("project", &self.schema.code)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

fn connection_failed(e: impl ToString) -> BackendError {
    BackendError::ConnectionFailed {
        backend_name: "sqlite".to_string(),
        message: e.to_string(),
    }
}

fn query_failed(e: rusqlite::Error) -> BackendError {
    BackendError::QueryError {
        message: e.to_string(),
    }
}

impl SqliteBackend {
    /// Creates an in-memory database holding the project's tables.
    pub fn in_memory(schema: Arc<ProjectSchema>) -> Result<Self, BackendError> {
        Self::with_config(":memory:", schema, SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based database.
    pub fn open<P: AsRef<Path>>(path: P, schema: Arc<ProjectSchema>) -> Result<Self, BackendError> {
        Self::with_config(path, schema, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration and initializes its
    /// tables.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        schema: Arc<ProjectSchema>,
        config: SqliteBackendConfig,
    ) -> Result<Self, BackendError> {
        let path_str = path.as_ref().to_string_lossy();
        let is_memory = path_str == ":memory:";

        // Every connection to ":memory:" is its own database, so an
        // in-memory pool holds exactly one connection for its whole life.
        let pool = if is_memory {
            Pool::builder()
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
                .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
                .build(SqliteConnectionManager::memory())
        } else {
            Pool::builder()
                .max_size(config.max_connections)
                .min_idle(Some(config.min_connections))
                .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
                .build(SqliteConnectionManager::file(path.as_ref()))
        }
        .map_err(connection_failed)?;

        let backend = Self {
            pool,
            config,
            is_memory,
            schema,
        };

        backend.configure_connection()?;
        backend.init_schema()?;
        Ok(backend)
    }

    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Creates the project's tables if they do not exist.
    pub fn init_schema(&self) -> Result<(), BackendError> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn, &self.schema.model)
    }

    pub(crate) fn get_connection(
        &self,
    ) -> Result<PooledConnection<SqliteConnectionManager>, BackendError> {
        self.pool.get().map_err(connection_failed)
    }

    fn configure_connection(&self) -> Result<(), BackendError> {
        let conn = self.get_connection()?;

        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms as u64))
            .map_err(|e| BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: format!("Failed to set busy timeout: {}", e),
                source: None,
            })?;

        if self.config.enable_foreign_keys {
            conn.execute("PRAGMA foreign_keys = ON", [])
                .map_err(|e| BackendError::Internal {
                    backend_name: "sqlite".to_string(),
                    message: format!("Failed to enable foreign keys: {}", e),
                    source: None,
                })?;
        }

        if self.config.enable_wal && !self.is_memory {
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
                .map_err(|e| BackendError::Internal {
                    backend_name: "sqlite".to_string(),
                    message: format!("Failed to enable WAL mode: {}", e),
                    source: None,
                })?;
        }

        Ok(())
    }

    /// Renders the `WHERE` condition selecting a predicate's records.
    pub fn where_clause(&self, predicate: &Predicate) -> Result<SqlFragment, BackendError> {
        QueryBuilder::new(self.schema.model.table()).build(predicate)
    }

    /// Renders the statement returning the ids of matching records.
    pub fn filter_sql(&self, predicate: &Predicate) -> Result<SqlFragment, BackendError> {
        let mut fragment = self.where_clause(predicate)?;
        fragment.sql = format!(
            "SELECT {} FROM {} AS {} WHERE {} ORDER BY {}",
            column(ROOT, "id"),
            quote(self.schema.model.table()),
            ROOT,
            fragment.sql,
            column(ROOT, "id"),
        );
        Ok(fragment)
    }

    /// Renders the grouped count statement for a summary plan.
    pub fn summary_sql(&self, plan: &SummaryPlan) -> Result<SqlFragment, BackendError> {
        let mut fragment = self.where_clause(&plan.predicate)?;

        let mut from = format!("{} AS {}", quote(self.schema.model.table()), ROOT);
        let mut related = ROOT.to_string();
        if let Some(relation) = &plan.relation {
            for (i, hop) in relation.hops.iter().enumerate() {
                let alias = format!("s{}", i + 1);
                from.push_str(&format!(
                    " JOIN {} AS {} ON {}",
                    quote(&hop.table),
                    alias,
                    join_condition(hop, &related, &alias)
                ));
                related = alias;
            }
        }

        let columns: Vec<String> = plan
            .fields
            .iter()
            .map(|field| {
                let alias = if field.hops.is_empty() { ROOT } else { related.as_str() };
                column(alias, &field.column)
            })
            .collect();

        let mut sql = String::from("SELECT ");
        for c in &columns {
            sql.push_str(c);
            sql.push_str(", ");
        }
        sql.push_str(&format!("COUNT(*) FROM {} WHERE {}", from, fragment.sql));
        if !columns.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }
        fragment.sql = sql;
        Ok(fragment)
    }

    fn insert_row(
        conn: &Connection,
        model: &ModelSchema,
        record: &Record,
        parent: Option<(&str, i64)>,
    ) -> Result<i64, BackendError> {
        let mut names: Vec<String> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();
        if let Some((join_column, parent_id)) = parent {
            names.push(quote(join_column));
            params.push(SqlParam::Integer(parent_id));
        }

        // To-one rows are written first so this row can point at them
        for field in model.fields() {
            match &field.kind {
                FieldKind::Relation(relation) if !relation.many => {
                    if let Some(row) = record.related(&field.name).first() {
                        let id = Self::insert_row(conn, &relation.model, row, None)?;
                        names.push(quote(&relation.join_column));
                        params.push(SqlParam::Integer(id));
                    }
                }
                FieldKind::Relation(_) => {}
                _ => {
                    if let Some(value) = record.values.get(&field.name) {
                        names.push(quote(&field.name));
                        params.push(SqlParam::from_value(value));
                    }
                }
            }
        }

        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(model.table()))
        } else {
            let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(model.table()),
                names.join(", "),
                placeholders.join(", ")
            )
        };
        conn.execute(&sql, params_from_iter(params.iter()))
            .map_err(query_failed)?;
        let id = conn.last_insert_rowid();

        for field in model.fields() {
            if let FieldKind::Relation(relation) = &field.kind {
                if relation.many {
                    for row in record.related(&field.name) {
                        Self::insert_row(conn, &relation.model, row, Some((&relation.join_column, id)))?;
                    }
                }
            }
        }

        Ok(id)
    }

    fn read_row(
        conn: &Connection,
        model: &ModelSchema,
        id: i64,
    ) -> Result<Option<JsonValue>, BackendError> {
        let sql = format!("SELECT * FROM {} WHERE \"id\" = ?1", quote(model.table()));
        let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([id]).map_err(query_failed)?;
        let Some(row) = rows.next().map_err(query_failed)? else {
            return Ok(None);
        };

        let mut stored: Map<String, JsonValue> = Map::new();
        let mut links: Vec<(String, Option<i64>)> = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let raw: SqlValue = row.get(i).map_err(query_failed)?;
            match model.field(name) {
                Some(field) if !matches!(field.kind, FieldKind::Relation(_)) => {
                    stored.insert(name.clone(), stored_value(raw, field.onyx_type()).to_json());
                }
                _ => {
                    let link = match raw {
                        SqlValue::Integer(i) => Some(i),
                        _ => None,
                    };
                    links.push((name.clone(), link));
                }
            }
        }
        drop(rows);

        let mut object = Map::new();
        for field in model.fields() {
            let value = match &field.kind {
                FieldKind::Relation(relation) if relation.many => {
                    let sql = format!(
                        "SELECT \"id\" FROM {} WHERE {} = ?1 ORDER BY \"id\"",
                        quote(relation.model.table()),
                        quote(&relation.join_column)
                    );
                    let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
                    let ids = stmt
                        .query_map([id], |row| row.get::<_, i64>(0))
                        .map_err(query_failed)?
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(query_failed)?;
                    let mut items = Vec::new();
                    for child in ids {
                        if let Some(item) = Self::read_row(conn, &relation.model, child)? {
                            items.push(item);
                        }
                    }
                    JsonValue::Array(items)
                }
                FieldKind::Relation(relation) => {
                    let link = links
                        .iter()
                        .find(|(name, _)| *name == relation.join_column)
                        .and_then(|(_, link)| *link);
                    match link {
                        Some(link) => Self::read_row(conn, &relation.model, link)?
                            .unwrap_or(JsonValue::Null),
                        None => JsonValue::Null,
                    }
                }
                _ => stored.remove(&field.name).unwrap_or(JsonValue::Null),
            };
            object.insert(field.name.clone(), value);
        }

        Ok(Some(JsonValue::Object(object)))
    }
}

/// Converts a stored column value back to a typed value.
pub(crate) fn stored_value(raw: SqlValue, onyx_type: OnyxType) -> Value {
    let json = match raw {
        SqlValue::Null => return Value::Null,
        SqlValue::Integer(i) if onyx_type == OnyxType::Boolean => JsonValue::Bool(i != 0),
        SqlValue::Integer(i) => JsonValue::from(i),
        SqlValue::Real(f) => JsonValue::from(f),
        SqlValue::Text(text) => match onyx_type {
            OnyxType::Array(_) | OnyxType::Structure | OnyxType::Identifiers => {
                serde_json::from_str(&text).unwrap_or(JsonValue::Null)
            }
            _ => JsonValue::String(text),
        },
        SqlValue::Blob(_) => return Value::Null,
    };
    Value::from_json(&json, onyx_type).unwrap_or(Value::Null)
}

impl QueryBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn schema(&self) -> &ProjectSchema {
        &self.schema
    }

    #[instrument(skip_all, fields(project = %self.schema.code))]
    fn insert(&self, record: &JsonValue) -> Result<i64, BackendError> {
        let record = Record::from_json(&self.schema.model, record, &mut || 0)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction().map_err(query_failed)?;
        let id = Self::insert_row(&tx, &self.schema.model, &record, None)?;
        tx.commit().map_err(query_failed)?;

        debug!(id, "Inserted record");
        Ok(id)
    }

    #[instrument(skip_all, fields(project = %self.schema.code))]
    fn filter(&self, predicate: &Predicate) -> Result<Vec<i64>, BackendError> {
        let fragment = self.filter_sql(predicate)?;
        debug!(sql = %fragment.sql, params = fragment.params.len(), "Filtering records");

        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&fragment.sql).map_err(query_failed)?;
        let ids = stmt
            .query_map(params_from_iter(fragment.params.iter()), |row| row.get::<_, i64>(0))
            .map_err(query_failed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_failed)?;
        Ok(ids)
    }

    fn fetch(&self, ids: &[i64]) -> Result<Vec<JsonValue>, BackendError> {
        let conn = self.get_connection()?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = Self::read_row(&conn, &self.schema.model, *id)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    #[instrument(skip_all, fields(project = %self.schema.code))]
    fn summarise(&self, plan: &SummaryPlan) -> Result<Vec<SummaryRow>, BackendError> {
        let fragment = self.summary_sql(plan)?;
        debug!(sql = %fragment.sql, "Summarising records");

        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&fragment.sql).map_err(query_failed)?;
        let width = plan.fields.len();
        let rows = stmt
            .query_map(params_from_iter(fragment.params.iter()), |row| {
                let mut values = Vec::with_capacity(width);
                for (i, field) in plan.fields.iter().enumerate() {
                    values.push(stored_value(row.get(i)?, field.onyx_type));
                }
                let count: i64 = row.get(width)?;
                Ok(SummaryRow {
                    values,
                    count: count.max(0) as u64,
                })
            })
            .map_err(query_failed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_failed)?;

        Ok(rows.into_iter().filter(|row| row.count > 0).collect())
    }
}
