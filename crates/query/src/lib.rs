//! Onyx query engine.
//!
//! Resolves user-supplied field paths against a project's field tree,
//! checks every reference against the caller's permissions, coerces raw
//! string values per field type and lookup, and compiles nested boolean
//! query documents, free-text searches and grouped summaries into typed
//! predicates that storage backends execute.
//!
//! # Architecture
//!
//! - [`types`] - Field types, lookups and typed values
//! - [`schema`] - Project configuration and field descriptor trees
//! - [`access`] - Actions, capabilities and the permission gate
//! - [`choices`] - Choice values and their constraints
//! - [`fields`] - Field path resolution, suggestions and descriptions
//! - [`coerce`] - Per-type value coercion
//! - [`query`] - Query documents and their compilation to predicates
//! - [`search`] - Free-text search
//! - [`summary`] - Grouped counts
//! - [`backends`] - In-memory and SQLite record stores
//!
//! # Quick Start
//!
//! ```
//! use onyx_query::access::{Action, CapabilitySet, ObjectType, UserContext};
//! use onyx_query::choices::ChoiceRegistry;
//! use onyx_query::fields::FieldHandler;
//! use onyx_query::query::QueryCompiler;
//! use onyx_query::schema::{ProjectConfig, ProjectSchema};
//! use onyx_query::QueryConfig;
//! use serde_json::json;
//!
//! let config = ProjectConfig::from_json(r#"{
//!     "code": "mpx",
//!     "model": {"table": "mpx", "fields": [
//!         {"name": "run_name", "type": "text"},
//!         {"name": "tests", "type": "integer"}
//!     ]}
//! }"#).unwrap();
//! let schema = ProjectSchema::from_config(&config).unwrap();
//!
//! let caps = CapabilitySet::builder()
//!     .grant_object("mpx", ObjectType::Records, Action::Filter)
//!     .grant_fields("mpx", ObjectType::Records, Action::Filter, ["run_name", "tests"])
//!     .build();
//! let user = UserContext::new("alice", caps);
//! let choices = ChoiceRegistry::new();
//! let limits = QueryConfig::default();
//!
//! let handler = FieldHandler::new(&schema, &user, Action::Filter, &choices);
//! let compiled = QueryCompiler::new(&handler, &limits)
//!     .compile_json(&json!({"|": [{"tests__gt": "2"}, {"run_name": "r1"}]}))
//!     .unwrap();
//! assert_eq!(compiled.field_paths(), vec!["tests", "run_name"]);
//! ```

pub mod access;
pub mod backends;
pub mod choices;
pub mod coerce;
pub mod config;
pub mod error;
pub mod fields;
pub mod query;
pub mod schema;
pub mod search;
pub mod summary;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::QueryConfig;
pub use error::{
    AccessError, BackendError, ChoiceError, FieldError, FieldErrors, OnyxError, OnyxResult,
    PermissionError, QueryError, SchemaError, StructureError,
};
pub use search::SearchCompiler;
pub use summary::{SummaryCompiler, SummaryOutput, SummaryPlan};
