//! SQLite backend.
//!
//! Each model of a project gets its own table with an integer `id` key.
//! To-one relations are stored as a join column on the parent table and
//! to-many relations as a join column on the child table. Arrays,
//! identifiers and structures are stored as JSON text and queried through
//! SQLite's JSON functions.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use onyx_query::backends::QueryBackend;
//! use onyx_query::backends::sqlite::SqliteBackend;
//! use onyx_query::schema::{ProjectConfig, ProjectSchema};
//! use onyx_query::query::Predicate;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProjectConfig::from_json(&std::fs::read_to_string("project.json")?)?;
//! let schema = Arc::new(ProjectSchema::from_config(&config)?);
//! let backend = SqliteBackend::open("onyx.db", schema)?;
//! let ids = backend.filter(&Predicate::True)?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod query_builder;
mod schema;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use query_builder::{QueryBuilder, SqlFragment, SqlParam};
pub use schema::{SCHEMA_VERSION, TableDef, tables};
