//! Grouped counts over a project's records.
//!
//! A summary groups the records matching an optional query by one or more
//! fields and counts each group. At most one related table may take part;
//! when one does, records without related rows are left out and the count
//! column is named after the relation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, instrument, warn};

use crate::config::QueryConfig;
use crate::error::{FieldError, FieldErrors, QueryError};
use crate::fields::{FieldHandler, RelationHop, ResolvedField, SEPARATOR};
use crate::query::{CompiledQuery, FieldRef, Predicate, QueryCompiler, QueryNode};
use crate::types::Value;

/// The related table a summary joins through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRelation {
    /// Path of the relation, e.g. `records`.
    pub path: String,
    /// Relations crossed from the root table, outermost first.
    pub hops: Vec<RelationHop>,
}

/// A validated summary, ready for a backend.
#[derive(Debug, Clone)]
pub struct SummaryPlan {
    /// Grouping fields: the requested ones, then any the query adds.
    pub fields: Vec<FieldRef>,
    pub relation: Option<SummaryRelation>,
    pub count_name: String,
    /// Records counted; `True` without a query.
    pub predicate: Predicate,
}

impl SummaryPlan {
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.path.as_str()).collect()
    }

    /// Records without related rows are not counted.
    pub fn excludes_empty_relation(&self) -> bool {
        self.relation.is_some()
    }
}

/// Builds summary plans for one user, project and action.
pub struct SummaryCompiler<'a> {
    handler: &'a FieldHandler<'a>,
    config: &'a QueryConfig,
}

impl<'a> SummaryCompiler<'a> {
    pub fn new(handler: &'a FieldHandler<'a>, config: &'a QueryConfig) -> Self {
        Self { handler, config }
    }

    /// Validates the grouping fields and the query together, reporting
    /// every field error at once.
    #[instrument(skip_all, fields(project = %self.handler.schema().code))]
    pub fn plan<S: AsRef<str>>(
        &self,
        fields: &[S],
        query: Option<&QueryNode>,
    ) -> Result<SummaryPlan, QueryError> {
        let mut errors = FieldErrors::new();
        let mut resolved: Vec<ResolvedField> = Vec::new();

        for key in fields {
            let key = key.as_ref();
            match self.handler.resolve(key, false) {
                Ok(field) if field.is_relation() => errors.push(
                    key,
                    FieldError::RelationalSummary {
                        field: key.to_string(),
                    },
                ),
                Ok(field) => resolved.push(field),
                Err(error) => errors.push(key, error),
            }
        }

        let compiled: Option<CompiledQuery> = match query {
            Some(node) => match QueryCompiler::new(self.handler, self.config).compile(node) {
                Ok(compiled) => Some(compiled),
                Err(QueryError::Fields(query_errors)) => {
                    errors.extend(query_errors);
                    None
                }
                Err(other) => return Err(other),
            },
            None => None,
        };

        if !errors.is_empty() {
            warn!(fields = errors.len(), "Rejected summary");
            return Err(QueryError::Fields(errors));
        }

        let mut predicate = Predicate::True;
        if let Some(compiled) = compiled {
            for field in compiled.fields {
                let present = resolved.iter().any(|f| f.path == field.path);
                if !present && !field.is_relation() {
                    resolved.push(field);
                }
            }
            predicate = compiled.predicate;
        }

        let relation = summary_relation(&resolved)?;
        let count_name = match &relation {
            Some(relation) => format!("{}{}count", relation.path, SEPARATOR),
            None => "count".to_string(),
        };

        let plan = SummaryPlan {
            fields: resolved.iter().map(FieldRef::from).collect(),
            relation,
            count_name,
            predicate,
        };
        debug!(columns = ?plan.columns(), count = %plan.count_name, "Planned summary");
        Ok(plan)
    }
}

/// The single related table the fields live on, if any.
fn summary_relation(fields: &[ResolvedField]) -> Result<Option<SummaryRelation>, QueryError> {
    let mut relations: BTreeMap<&str, SummaryRelation> = BTreeMap::new();

    for field in fields {
        let Some(last) = field.hops.last() else {
            continue;
        };
        relations
            .entry(field.table.as_str())
            .or_insert_with(|| SummaryRelation {
                path: last.path.clone(),
                hops: field.hops.clone(),
            });
    }

    if relations.len() > 1 {
        let mut paths: Vec<String> = relations.into_values().map(|r| r.path).collect();
        paths.sort();
        return Err(QueryError::MultiRelationSummary { relations: paths });
    }
    Ok(relations.into_values().next())
}

/// Orders NULL first, then by value, falling back to the rendered text for
/// values of unrelated types.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .compare(b)
            .unwrap_or_else(|| a.to_string().cmp(&b.to_string())),
    }
}

/// One group of a summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub values: Vec<Value>,
    pub count: u64,
}

/// The groups of an executed summary, ordered by the grouping fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutput {
    pub columns: Vec<String>,
    pub count_name: String,
    pub rows: Vec<SummaryRow>,
}

impl SummaryOutput {
    /// Applies the group limit and sorts the groups.
    pub fn new(
        plan: &SummaryPlan,
        mut rows: Vec<SummaryRow>,
        config: &QueryConfig,
    ) -> Result<Self, QueryError> {
        if rows.len() > config.max_summary_output {
            warn!(
                groups = rows.len(),
                max = config.max_summary_output,
                "Summary exceeds the group limit"
            );
            return Err(QueryError::TooManyDistinctValues {
                count: rows.len(),
                max: config.max_summary_output,
            });
        }

        rows.sort_by(|a, b| {
            a.values
                .iter()
                .zip(&b.values)
                .map(|(x, y)| compare_values(x, y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        Ok(Self {
            columns: plan.columns().into_iter().map(String::from).collect(),
            count_name: plan.count_name.clone(),
            rows,
        })
    }

    /// Renders each group as `{"<field>": value, ..., "<count_name>": n}`.
    pub fn to_json(&self) -> JsonValue {
        self.rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (column, value) in self.columns.iter().zip(&row.values) {
                    object.insert(column.clone(), value.to_json());
                }
                object.insert(self.count_name.clone(), row.count.into());
                JsonValue::Object(object)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Action;
    use crate::testing;
    use serde_json::json;

    fn plan(fields: &[&str], query: Option<JsonValue>) -> Result<SummaryPlan, QueryError> {
        let schema = testing::schema();
        let user = testing::analyst(&schema);
        let choices = testing::choices();
        let config = QueryConfig::default();
        let handler = FieldHandler::new(&schema, &user, Action::Filter, &choices);
        let node = query.map(|q| QueryNode::parse(&q, &config).unwrap());
        SummaryCompiler::new(&handler, &config).plan(fields, node.as_ref())
    }

    #[test]
    fn test_root_summary() {
        let plan = plan(&["country"], None).unwrap();
        assert_eq!(plan.columns(), vec!["country"]);
        assert_eq!(plan.count_name, "count");
        assert!(!plan.excludes_empty_relation());
        assert_eq!(plan.predicate, Predicate::True);
    }

    #[test]
    fn test_related_summary() {
        let plan = plan(&["run_name", "records__test_result"], None).unwrap();
        assert_eq!(plan.count_name, "records__count");
        let relation = plan.relation.unwrap();
        assert_eq!(relation.path, "records");
        assert_eq!(relation.hops[0].table, "mpx_records");
    }

    #[test]
    fn test_query_fields_are_added() {
        let plan = plan(
            &["country"],
            Some(json!({"&": [{"tests__gt": 1}, {"country": "eng"}, {"records__isnull": false}]})),
        )
        .unwrap();
        assert_eq!(plan.columns(), vec!["country", "tests"]);
        assert_ne!(plan.predicate, Predicate::True);
    }

    #[test]
    fn test_multi_relation_rejected() {
        let err = plan(&["records__test_result", "analyses__name"], None).unwrap_err();
        assert_eq!(
            err,
            QueryError::MultiRelationSummary {
                relations: vec!["analyses".into(), "records".into()]
            }
        );

        let err = plan(&["records__test_result"], Some(json!({"site__code": "A"}))).unwrap_err();
        assert!(matches!(err, QueryError::MultiRelationSummary { .. }));
    }

    #[test]
    fn test_field_errors_are_merged() {
        let err = plan(
            &["records", "tests__gt", "contry"],
            Some(json!({"tests": "x"})),
        )
        .unwrap_err();
        let QueryError::Fields(errors) = err else {
            panic!("expected field errors");
        };
        assert_eq!(
            errors.get("records")[0].to_string(),
            "Cannot summarise over a relational field."
        );
        assert!(matches!(errors.get("tests__gt")[0], FieldError::LookupNotAllowed { .. }));
        assert!(errors.contains("contry"));
        assert!(errors.contains("tests"));
    }

    #[test]
    fn test_output_limit_and_order() {
        let plan = plan(&["country"], None).unwrap();
        let rows = vec![
            SummaryRow { values: vec![Value::text("wales")], count: 1 },
            SummaryRow { values: vec![Value::Null], count: 4 },
            SummaryRow { values: vec![Value::text("eng")], count: 2 },
        ];

        let small = QueryConfig {
            max_summary_output: 2,
            ..Default::default()
        };
        assert_eq!(
            SummaryOutput::new(&plan, rows.clone(), &small).unwrap_err(),
            QueryError::TooManyDistinctValues { count: 3, max: 2 }
        );

        let output = SummaryOutput::new(&plan, rows, &QueryConfig::default()).unwrap();
        assert_eq!(
            output.to_json(),
            json!([
                {"country": null, "count": 4},
                {"country": "eng", "count": 2},
                {"country": "wales", "count": 1}
            ])
        );
    }
}
