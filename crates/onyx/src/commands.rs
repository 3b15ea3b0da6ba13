//! Subcommand implementations.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use serde_json::{Value as JsonValue, json};
use tracing::info;

use onyx_query::access::{Action, CapabilitySet, UserContext};
use onyx_query::backends::{MemoryBackend, QueryBackend};
use onyx_query::choices::ChoiceRegistry;
use onyx_query::fields::FieldHandler;
use onyx_query::query::{CompiledQuery, Predicate, QueryCompiler, QueryDocument};
use onyx_query::schema::{ProjectSchema, SchemaRegistry};
use onyx_query::{OnyxError, QueryConfig, QueryError, SearchCompiler, SummaryCompiler};

#[cfg(feature = "sqlite")]
use onyx_query::backends::sqlite::{SqlFragment, SqliteBackend};

use crate::config::{CliConfig, Command};

/// Everything a command needs: the project, the caller and the limits.
pub struct Session {
    pub schema: Arc<ProjectSchema>,
    pub choices: ChoiceRegistry,
    pub user: UserContext,
    pub limits: QueryConfig,
    config: CliConfig,
}

impl Session {
    pub fn load(config: CliConfig) -> anyhow::Result<Self> {
        let text = fs::read_to_string(&config.project)
            .with_context(|| format!("reading {}", config.project.display()))?;
        let choices = ChoiceRegistry::new();
        let schema = SchemaRegistry::new().load_json(&text, &choices)?;

        let mut groups = Vec::new();
        for scope in &config.scope {
            match schema.group(*scope) {
                Some(group) => groups.push(&group.capabilities),
                None => bail!("project {} has no {} group", schema.code, scope),
            }
        }
        let mut capabilities = CapabilitySet::union_of(groups);
        if let Some(path) = &config.permissions {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let permissions: Vec<String> = serde_json::from_str(&text)?;
            capabilities.merge(&CapabilitySet::from_permissions(&permissions)?);
        }
        let user = UserContext::new(config.user.clone(), capabilities);

        info!(
            project = %schema.code,
            user = %user.username(),
            capabilities = user.capabilities().len(),
            "Loaded session"
        );

        Ok(Self {
            schema,
            choices,
            user,
            limits: config.query_config(),
            config,
        })
    }

    fn handler(&self, action: Action) -> anyhow::Result<FieldHandler<'_>> {
        let handler = FieldHandler::new(&self.schema, &self.user, action, &self.choices);
        handler.gate().check_project(action).map_err(OnyxError::from)?;
        Ok(handler)
    }

    fn backend(&self) -> anyhow::Result<Box<dyn QueryBackend>> {
        if let Some(path) = &self.config.database {
            return open_database(path, self.schema.clone());
        }
        let Some(path) = &self.config.records else {
            bail!("--database or --records is required to run queries");
        };
        let backend = MemoryBackend::new(self.schema.clone());
        for record in read_records(path)? {
            backend.insert(&record)?;
        }
        Ok(Box::new(backend))
    }

    pub fn run(&self) -> anyhow::Result<JsonValue> {
        match &self.config.command {
            Command::Fields { action } => Ok(self.handler(*action)?.describe_fields()),
            Command::Permissions => Ok(json!(
                self.user.capabilities().to_permissions(&self.config.app_label)?
            )),
            Command::Query {
                document,
                params,
                action,
                sql,
                execute,
            } => {
                let handler = self.handler(*action)?;
                let node = match document {
                    Some(document) => Some(QueryDocument::parse_str(document, &self.limits)?),
                    None => QueryDocument::from_params(split_params(params)?, &self.limits)?,
                };
                let predicate = match node {
                    Some(node) => {
                        let CompiledQuery { predicate, .. } =
                            QueryCompiler::new(&handler, &self.limits).compile(&node)?;
                        predicate
                    }
                    None => Predicate::True,
                };
                self.predicate_output(predicate, *sql, *execute)
            }
            Command::Search {
                text,
                action,
                sql,
                execute,
            } => {
                let handler = self.handler(*action)?;
                let predicate = SearchCompiler::new(&handler).compile(text);
                self.predicate_output(predicate, *sql, *execute)
            }
            Command::Summary {
                fields,
                query,
                sql,
                execute,
            } => {
                let handler = self.handler(Action::List)?;
                let node = query
                    .as_deref()
                    .map(|q| QueryDocument::parse_str(q, &self.limits))
                    .transpose()
                    .map_err(QueryError::from)?;
                let plan = SummaryCompiler::new(&handler, &self.limits)
                    .plan(fields.as_slice(), node.as_ref())?;

                let mut output = json!({
                    "columns": plan.columns(),
                    "count": plan.count_name,
                    "predicate": plan.predicate.to_string(),
                });
                if *sql {
                    output["sql"] = self.summary_sql(&plan)?;
                }
                if *execute {
                    let summary = self.backend()?.summary(&plan, &self.limits)?;
                    output["data"] = summary.to_json();
                }
                Ok(output)
            }
            Command::Ingest { file } => {
                let backend = self.backend()?;
                let mut ids = Vec::new();
                for record in read_records(file)? {
                    ids.push(backend.insert(&record)?);
                }
                info!(records = ids.len(), backend = %backend.kind(), "Ingested records");
                Ok(json!({ "ids": ids }))
            }
        }
    }

    fn predicate_output(
        &self,
        predicate: Predicate,
        sql: bool,
        execute: bool,
    ) -> anyhow::Result<JsonValue> {
        let mut output = json!({ "predicate": predicate.to_string() });
        if sql {
            output["sql"] = self.filter_sql(&predicate)?;
        }
        if execute {
            let backend = self.backend()?;
            let ids = backend.filter(&predicate)?;
            output["count"] = json!(ids.len());
            output["data"] = JsonValue::Array(backend.fetch(&ids)?);
        }
        Ok(output)
    }

    #[cfg(feature = "sqlite")]
    fn filter_sql(&self, predicate: &Predicate) -> anyhow::Result<JsonValue> {
        let backend = SqliteBackend::in_memory(self.schema.clone())?;
        Ok(fragment_json(&backend.filter_sql(predicate)?))
    }

    #[cfg(not(feature = "sqlite"))]
    fn filter_sql(&self, _predicate: &Predicate) -> anyhow::Result<JsonValue> {
        bail!("Rendering SQL requires the 'sqlite' feature")
    }

    #[cfg(feature = "sqlite")]
    fn summary_sql(&self, plan: &onyx_query::SummaryPlan) -> anyhow::Result<JsonValue> {
        let backend = SqliteBackend::in_memory(self.schema.clone())?;
        Ok(fragment_json(&backend.summary_sql(plan)?))
    }

    #[cfg(not(feature = "sqlite"))]
    fn summary_sql(&self, _plan: &onyx_query::SummaryPlan) -> anyhow::Result<JsonValue> {
        bail!("Rendering SQL requires the 'sqlite' feature")
    }
}

#[cfg(feature = "sqlite")]
fn fragment_json(fragment: &SqlFragment) -> JsonValue {
    json!({
        "text": fragment.sql,
        "params": fragment.params.iter().map(|p| format!("{:?}", p)).collect::<Vec<_>>(),
    })
}

#[cfg(feature = "sqlite")]
fn open_database(path: &Path, schema: Arc<ProjectSchema>) -> anyhow::Result<Box<dyn QueryBackend>> {
    info!(database = %path.display(), "Opening SQLite backend");
    Ok(Box::new(SqliteBackend::open(path, schema)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_database(_path: &Path, _schema: Arc<ProjectSchema>) -> anyhow::Result<Box<dyn QueryBackend>> {
    bail!(
        "The database option requires the 'sqlite' feature. \
         Build with: cargo build -p onyx-cli --features sqlite"
    )
}

fn read_records(path: &Path) -> anyhow::Result<Vec<JsonValue>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match serde_json::from_str(&text)? {
        JsonValue::Array(records) => Ok(records),
        _ => bail!("{} must hold a JSON array of records", path.display()),
    }
}

/// Splits `key=value` pairs at the first `=`.
pub fn split_params(params: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    params
        .iter()
        .map(|param| match param.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => bail!("expected key=value, got '{}'", param),
        })
        .collect()
}

/// Renders a failure as the JSON body a client would receive.
pub fn error_output(error: &anyhow::Error) -> JsonValue {
    let query_error = match error.downcast_ref::<OnyxError>() {
        Some(OnyxError::Query(e)) => Some(e),
        _ => error.downcast_ref::<QueryError>(),
    };
    match query_error {
        Some(QueryError::Fields(errors)) => json!({ "messages": errors }),
        _ => json!({ "messages": { "detail": error.to_string() } }),
    }
}
