//! Registry of loaded project schemas.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::config::ProjectConfig;
use super::model::ProjectSchema;
use crate::choices::ChoiceRegistry;
use crate::error::{OnyxResult, SchemaError};

/// In-memory registry of project schemas, indexed by project code.
///
/// Schemas are immutable once registered; reloading a project swaps the
/// `Arc` so in-flight requests keep the schema they started with.
#[derive(Default)]
pub struct SchemaRegistry {
    projects: HashMap<String, Arc<ProjectSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<Arc<ProjectSchema>> {
        self.projects.get(code).cloned()
    }

    /// Gets a schema, failing if the project is not registered.
    pub fn require(&self, code: &str) -> Result<Arc<ProjectSchema>, SchemaError> {
        self.get(code).ok_or_else(|| SchemaError::UnknownProject {
            code: code.to_string(),
        })
    }

    /// Registers a new schema.
    pub fn register(&mut self, schema: ProjectSchema) -> Result<Arc<ProjectSchema>, SchemaError> {
        if self.projects.contains_key(&schema.code) {
            return Err(SchemaError::DuplicateProject {
                code: schema.code.clone(),
            });
        }
        Ok(self.replace(schema))
    }

    /// Registers a schema, replacing any existing one with the same code.
    pub fn replace(&mut self, schema: ProjectSchema) -> Arc<ProjectSchema> {
        let schema = Arc::new(schema);
        self.projects
            .insert(schema.code.clone(), Arc::clone(&schema));
        schema
    }

    pub fn unregister(&mut self, code: &str) -> Result<Arc<ProjectSchema>, SchemaError> {
        self.projects
            .remove(code)
            .ok_or_else(|| SchemaError::UnknownProject {
                code: code.to_string(),
            })
    }

    /// Registered project codes, sorted.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.projects.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Builds a project from its configuration, syncs its choices and
    /// constraints into `choices`, and registers it.
    ///
    /// Loading an already registered project replaces its schema.
    pub fn load(
        &mut self,
        config: &ProjectConfig,
        choices: &ChoiceRegistry,
    ) -> OnyxResult<Arc<ProjectSchema>> {
        let schema = ProjectSchema::from_config(config)?;

        let mut changed = 0;
        for choice in &config.choices {
            changed += choices
                .sync_choices(&config.code, &choice.field, &choice.options)?
                .len();
        }
        choices.set_constraints(&config.code, &config.choice_constraints)?;

        let schema = self.replace(schema);
        info!(
            project = %schema.code,
            groups = schema.groups.len(),
            choice_changes = changed,
            "Loaded project"
        );
        Ok(schema)
    }

    /// Parses a project configuration document and loads it.
    pub fn load_json(
        &mut self,
        json: &str,
        choices: &ChoiceRegistry,
    ) -> OnyxResult<Arc<ProjectSchema>> {
        let config = ProjectConfig::from_json(json)?;
        self.load(&config, choices)
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("projects", &self.codes())
            .finish()
    }
}
