//! Shared fixtures for unit tests.

use crate::access::{Action, CapabilitySet, ObjectType, UserContext};
use crate::choices::ChoiceRegistry;
use crate::schema::{ProjectConfig, ProjectSchema};

pub(crate) const PROJECT: &str = r#"{
    "code": "mpx",
    "name": "Mpox",
    "model": {
        "table": "mpx",
        "fields": [
            {"name": "climb_id", "type": "text", "required": true, "description": "Unique identifier."},
            {"name": "run_name", "type": "text", "max_length": 100},
            {"name": "country", "type": "choice"},
            {"name": "region", "type": "choice"},
            {"name": "tests", "type": "integer"},
            {"name": "score", "type": "decimal"},
            {"name": "collection_month", "type": "date"},
            {"name": "submitted", "type": "datetime"},
            {"name": "is_published", "type": "bool", "default": false},
            {"name": "scores", "type": "array", "base": "integer"},
            {"name": "tags", "type": "array", "base": "choice"},
            {"name": "metadata", "type": "structure"},
            {"name": "site", "type": "relation", "many": false, "display": "code",
             "model": {"table": "mpx_site", "fields": [
                {"name": "code", "type": "text"},
                {"name": "name", "type": "text"}
             ]}},
            {"name": "records", "type": "relation",
             "model": {"table": "mpx_records", "fields": [
                {"name": "test_id", "type": "integer"},
                {"name": "test_result", "type": "choice"},
                {"name": "ct_value", "type": "decimal"}
             ]}},
            {"name": "analyses", "type": "relation",
             "model": {"table": "mpx_analyses", "fields": [
                {"name": "name", "type": "text"}
             ]}}
        ]
    },
    "groups": [
        {"scope": "analyst", "permissions": [
            {"action": ["get", "list", "filter"], "fields": ["run_name", "country"]}
        ]}
    ],
    "choices": [
        {"field": "country", "options": ["eng", "scot", "wales", "ni"]},
        {"field": "region", "options": ["ne", "nw", "se"]},
        {"field": "tags", "options": ["alpha", "beta", "gamma"]},
        {"field": "test_result", "options": ["pos", "neg"]}
    ]
}"#;

pub(crate) fn config() -> ProjectConfig {
    ProjectConfig::from_json(PROJECT).unwrap()
}

pub(crate) fn schema() -> ProjectSchema {
    ProjectSchema::from_config(&config()).unwrap()
}

pub(crate) fn choices() -> ChoiceRegistry {
    let config = config();
    let registry = ChoiceRegistry::new();
    for choice in &config.choices {
        registry
            .sync_choices(&config.code, &choice.field, &choice.options)
            .unwrap();
    }
    registry
}

/// Every field visible and usable for get, list and filter, except
/// `climb_id` which is visible but only gettable.
pub(crate) fn analyst(schema: &ProjectSchema) -> UserContext {
    let paths: Vec<String> = schema
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

/// Sees `run_name` and `country` only.
pub(crate) fn restricted() -> UserContext {
    let caps = CapabilitySet::builder()
        .grant_object("mpx", ObjectType::Records, Action::Filter)
        .grant_fields("mpx", ObjectType::Records, Action::Filter, ["run_name", "country"])
        .build();
    UserContext::new("restricted", caps)
}
