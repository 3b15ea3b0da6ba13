//! Project configuration and record fixtures.

use serde_json::{Map, Value, json};

/// The Mpox test project: a root model with a to-one `site`, and to-many
/// `records` and `analyses`.
pub const PROJECT: &str = r#"{
    "code": "mpx",
    "name": "Mpox",
    "model": {
        "table": "mpx",
        "fields": [
            {"name": "climb_id", "type": "text", "required": true},
            {"name": "run_name", "type": "text"},
            {"name": "country", "type": "choice"},
            {"name": "region", "type": "choice"},
            {"name": "tests", "type": "integer"},
            {"name": "score", "type": "decimal"},
            {"name": "collection_month", "type": "date"},
            {"name": "submitted", "type": "datetime"},
            {"name": "is_published", "type": "bool"},
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
            {"action": ["get", "list", "filter"], "fields": ["run_name", "country", "tests"]}
        ]},
        {"scope": "uploader", "permissions": [
            {"action": "add", "fields": ["climb_id", "run_name", "country"]}
        ]}
    ],
    "choices": [
        {"field": "country", "options": ["eng", "scot", "wales", "ni"]},
        {"field": "region", "options": ["ne", "nw", "se"]},
        {"field": "tags", "options": ["alpha", "beta", "gamma"]},
        {"field": "test_result", "options": ["pos", "neg"]}
    ],
    "choice_constraints": [
        {"field": "country", "option": "eng", "constraints": [
            {"field": "region", "options": ["ne", "nw"]}
        ]},
        {"field": "country", "option": "scot", "constraints": [
            {"field": "region", "options": ["se"]}
        ]}
    ]
}"#;

/// A root record under construction.
#[derive(Debug, Clone)]
pub struct RecordFixture {
    fields: Map<String, Value>,
    records: Vec<Value>,
    analyses: Vec<Value>,
}

impl RecordFixture {
    pub fn new(climb_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("climb_id".to_string(), json!(climb_id));
        Self {
            fields,
            records: Vec::new(),
            analyses: Vec::new(),
        }
    }

    /// Sets any root field.
    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    pub fn with_run_name(self, run_name: &str) -> Self {
        self.with("run_name", json!(run_name))
    }

    pub fn with_country(self, country: &str) -> Self {
        self.with("country", json!(country))
    }

    pub fn with_tests(self, tests: i64) -> Self {
        self.with("tests", json!(tests))
    }

    pub fn with_scores(self, scores: &[i64]) -> Self {
        self.with("scores", json!(scores))
    }

    pub fn with_site(self, code: &str, name: &str) -> Self {
        self.with("site", json!({"code": code, "name": name}))
    }

    /// Adds a related test record.
    pub fn with_record(mut self, test_id: i64, test_result: &str) -> Self {
        self.records
            .push(json!({"test_id": test_id, "test_result": test_result}));
        self
    }

    pub fn with_analysis(mut self, name: &str) -> Self {
        self.analyses.push(json!({"name": name}));
        self
    }

    pub fn build(self) -> Value {
        let mut fields = self.fields;
        if !self.records.is_empty() {
            fields.insert("records".to_string(), Value::Array(self.records));
        }
        if !self.analyses.is_empty() {
            fields.insert("analyses".to_string(), Value::Array(self.analyses));
        }
        Value::Object(fields)
    }
}

/// Four records covering NULLs, empty arrays, empty structures and records
/// without related rows.
///
/// | climb_id | run_name | country | tests | scores  | records        | analyses |
/// |----------|----------|---------|-------|---------|----------------|----------|
/// | C-1      | r1       | eng     | 1     | [1,2,3] | pos, neg       | a1       |
/// | C-2      | r1       | eng     | 2     | []      | neg            |          |
/// | C-3      | r2       |         | 3     | [4]     |                | a2       |
/// | C-4      | r2       | scot    |       |         | pos            |          |
pub fn seed_records() -> Vec<Value> {
    vec![
        RecordFixture::new("C-1")
            .with_run_name("r1")
            .with_country("eng")
            .with("region", json!("ne"))
            .with_tests(1)
            .with("score", json!(1.5))
            .with("collection_month", json!("2023-01-01"))
            .with("submitted", json!("2023-01-15 10:30:00"))
            .with("is_published", json!(true))
            .with_scores(&[1, 2, 3])
            .with("tags", json!(["alpha"]))
            .with("metadata", json!({"lab": "x", "batch": 1}))
            .with_site("lon", "London")
            .with_record(1, "pos")
            .with_record(2, "neg")
            .with_analysis("a1")
            .build(),
        RecordFixture::new("C-2")
            .with_run_name("r1")
            .with_country("eng")
            .with_tests(2)
            .with("is_published", json!(false))
            .with_scores(&[])
            .with("tags", json!(["beta", "gamma"]))
            .with("metadata", json!({}))
            .with_site("bir", "Birmingham")
            .with_record(3, "neg")
            .build(),
        RecordFixture::new("C-3")
            .with_run_name("r2")
            .with_tests(3)
            .with("collection_month", json!("2022-06-01"))
            .with_scores(&[4])
            .with("metadata", json!({"lab": "y"}))
            .with_analysis("a2")
            .build(),
        RecordFixture::new("C-4")
            .with_run_name("r2")
            .with_country("scot")
            .with("submitted", json!("2021-01-03 08:00:00"))
            .with_record(4, "pos")
            .build(),
    ]
}
