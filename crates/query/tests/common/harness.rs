//! Test context and backend construction.
//!
//! [`TestContext`] loads the fixture project once and compiles queries,
//! searches and summaries for a chosen user. [`TestContext::backends`]
//! returns every available backend seeded with the same records so that a
//! test can check they agree.

use std::sync::Arc;

use onyx_query::QueryConfig;
use onyx_query::access::{Action, CapabilitySet, ObjectType, Scope, UserContext};
use onyx_query::backends::{MemoryBackend, QueryBackend};
use onyx_query::choices::ChoiceRegistry;
use onyx_query::error::QueryError;
use onyx_query::fields::{FieldHandler, ResolvedField};
use onyx_query::query::{Predicate, QueryCompiler, QueryNode};
use onyx_query::schema::{ProjectSchema, SchemaRegistry};
use onyx_query::search::SearchCompiler;
use onyx_query::summary::{SummaryCompiler, SummaryPlan};
use serde_json::Value;

use super::fixtures::PROJECT;

/// A loaded project with its choices and limits.
pub struct TestContext {
    pub schema: Arc<ProjectSchema>,
    pub choices: ChoiceRegistry,
    pub config: QueryConfig,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    pub fn with_config(config: QueryConfig) -> Self {
        let choices = ChoiceRegistry::new();
        let mut registry = SchemaRegistry::new();
        let schema = registry
            .load_json(PROJECT, &choices)
            .expect("fixture project should load");
        Self {
            schema,
            choices,
            config,
        }
    }

    /// Can get, list and filter on every field except `climb_id`, which it
    /// can only see and get.
    pub fn analyst(&self) -> UserContext {
        let paths: Vec<String> = self
            .schema
            .model
            .paths()
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| path != "climb_id")
            .collect();

        let mut builder = CapabilitySet::builder()
            .grant_access("mpx", ObjectType::Records, ["climb_id"])
            .grant_fields("mpx", ObjectType::Records, Action::Get, ["climb_id"]);
        for action in [Action::Get, Action::List, Action::Filter] {
            builder = builder
                .grant_object("mpx", ObjectType::Records, action)
                .grant_fields("mpx", ObjectType::Records, action, paths.iter().cloned());
        }
        UserContext::new("analyst", builder.build())
    }

    /// Can filter on `run_name` and `country` only.
    pub fn restricted(&self) -> UserContext {
        let caps = CapabilitySet::builder()
            .grant_fields("mpx", ObjectType::Records, Action::Filter, ["run_name", "country"])
            .build();
        UserContext::new("restricted", caps)
    }

    /// A member of the project's configured groups.
    pub fn member(&self, scopes: &[Scope]) -> UserContext {
        let groups = scopes
            .iter()
            .filter_map(|scope| self.schema.group(*scope))
            .map(|group| &group.capabilities);
        UserContext::from_groups("member", groups)
    }

    pub fn handler<'a>(&'a self, user: &'a UserContext, action: Action) -> FieldHandler<'a> {
        FieldHandler::new(&self.schema, user, action, &self.choices)
    }

    pub fn resolve(
        &self,
        user: &UserContext,
        action: Action,
        key: &str,
    ) -> Result<ResolvedField, onyx_query::FieldError> {
        self.handler(user, action).resolve(key, true)
    }

    /// Compiles a document for `user` filtering.
    pub fn compile_as(&self, user: &UserContext, document: &Value) -> Result<Predicate, QueryError> {
        let handler = self.handler(user, Action::Filter);
        QueryCompiler::new(&handler, &self.config)
            .compile_json(document)
            .map(|compiled| compiled.predicate)
    }

    /// Compiles a document for the analyst.
    pub fn compile(&self, document: &Value) -> Result<Predicate, QueryError> {
        self.compile_as(&self.analyst(), document)
    }

    /// Compiles a free-text search for the analyst.
    pub fn search(&self, text: &str) -> Predicate {
        let user = self.analyst();
        let handler = self.handler(&user, Action::List);
        SearchCompiler::new(&handler).compile(text)
    }

    /// Plans a summary for the analyst.
    pub fn summary(&self, fields: &[&str], query: Option<&Value>) -> Result<SummaryPlan, QueryError> {
        let user = self.analyst();
        let handler = self.handler(&user, Action::Filter);
        let node = query
            .map(|document| QueryNode::parse(document, &self.config))
            .transpose()?;
        SummaryCompiler::new(&handler, &self.config).plan(fields, node.as_ref())
    }

    pub fn memory_backend(&self, records: &[Value]) -> MemoryBackend {
        let backend = MemoryBackend::new(Arc::clone(&self.schema));
        for record in records {
            backend.insert(record).expect("fixture record should insert");
        }
        backend
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite_backend(&self, records: &[Value]) -> onyx_query::backends::sqlite::SqliteBackend {
        let backend = onyx_query::backends::sqlite::SqliteBackend::in_memory(Arc::clone(&self.schema))
            .expect("in-memory database should open");
        for record in records {
            backend.insert(record).expect("fixture record should insert");
        }
        backend
    }

    /// Every available backend, each seeded with `records`.
    pub fn backends(&self, records: &[Value]) -> Vec<Box<dyn QueryBackend>> {
        #[allow(unused_mut)]
        let mut backends: Vec<Box<dyn QueryBackend>> = vec![Box::new(self.memory_backend(records))];
        #[cfg(feature = "sqlite")]
        backends.push(Box::new(self.sqlite_backend(records)));
        backends
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Defines a test that runs once per backend, each seeded with
/// [`seed_records`](super::fixtures::seed_records).
///
/// # Example
///
/// ```ignore
/// backend_test!(counts_everything, |_ctx, backend| {
///     assert_eq!(backend.count(&Predicate::True).unwrap(), 4);
/// });
/// ```
#[allow(unused_macros)]
macro_rules! backend_test {
    ($test_name:ident, $test_fn:expr) => {
        paste::paste! {
            #[test]
            fn [<memory_ $test_name>]() {
                let ctx = $crate::common::TestContext::new();
                let backend = ctx.memory_backend(&$crate::common::seed_records());
                let test_fn: fn(&$crate::common::TestContext, &dyn onyx_query::backends::QueryBackend) =
                    $test_fn;
                test_fn(&ctx, &backend);
            }

            #[cfg(feature = "sqlite")]
            #[test]
            fn [<sqlite_ $test_name>]() {
                let ctx = $crate::common::TestContext::new();
                let backend = ctx.sqlite_backend(&$crate::common::seed_records());
                let test_fn: fn(&$crate::common::TestContext, &dyn onyx_query::backends::QueryBackend) =
                    $test_fn;
                test_fn(&ctx, &backend);
            }
        }
    };
}
