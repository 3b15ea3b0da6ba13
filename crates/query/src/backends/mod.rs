//! Storage backends that execute compiled predicates and summaries.
//!
//! Both backends evaluate comparisons two-valued: a comparison against a
//! NULL value is false, so negating it is true. Comparisons that cross a
//! to-many relation hold when any related row satisfies them, and a record
//! with no related rows behaves as if it had a single all-NULL row.

mod memory;
mod record;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt;

use serde_json::Value as JsonValue;

use crate::config::QueryConfig;
use crate::error::{BackendError, OnyxResult};
use crate::query::Predicate;
use crate::schema::ProjectSchema;
use crate::summary::{SummaryOutput, SummaryPlan, SummaryRow};

pub use memory::MemoryBackend;
pub use record::Record;

/// Identifies a backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Records held in process memory.
    Memory,
    /// SQLite database (file-based or in-memory).
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// A store of one project's records.
pub trait QueryBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn schema(&self) -> &ProjectSchema;

    /// Stores a record given as a JSON object shaped like the project
    /// model, with related rows nested under their relation names.
    ///
    /// Returns the new record's id.
    fn insert(&self, record: &JsonValue) -> Result<i64, BackendError>;

    /// Ids of the records satisfying the predicate, ascending.
    fn filter(&self, predicate: &Predicate) -> Result<Vec<i64>, BackendError>;

    fn count(&self, predicate: &Predicate) -> Result<usize, BackendError> {
        Ok(self.filter(predicate)?.len())
    }

    /// Reads records back as JSON, in the order given. Unknown ids are
    /// skipped.
    fn fetch(&self, ids: &[i64]) -> Result<Vec<JsonValue>, BackendError>;

    /// Counts the groups of a summary plan, unordered.
    fn summarise(&self, plan: &SummaryPlan) -> Result<Vec<SummaryRow>, BackendError>;

    /// Runs a summary, enforcing the group limit and ordering the groups.
    fn summary(&self, plan: &SummaryPlan, config: &QueryConfig) -> OnyxResult<SummaryOutput> {
        let rows = self.summarise(plan)?;
        Ok(SummaryOutput::new(plan, rows, config)?)
    }
}
