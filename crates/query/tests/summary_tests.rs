//! Grouped counts against every backend.

mod common;

use common::*;
use onyx_query::error::{FieldError, OnyxError, QueryError};
use onyx_query::{QueryConfig, SummaryPlan};
use serde_json::{Value, json};

fn run(ctx: &TestContext, plan: &SummaryPlan) -> Vec<(String, Value)> {
    ctx.backends(&seed_records())
        .iter()
        .map(|backend| {
            let output = backend
                .summary(plan, &ctx.config)
                .unwrap_or_else(|e| panic!("{} summary failed: {}", backend.kind(), e));
            (backend.kind().to_string(), output.to_json())
        })
        .collect()
}

fn assert_summary(ctx: &TestContext, plan: &SummaryPlan, expected: Value) {
    for (kind, output) in run(ctx, plan) {
        assert_eq!(output, expected, "{} backend", kind);
    }
}

#[test]
fn test_root_field_groups_null_first() {
    let ctx = TestContext::new();
    let plan = ctx.summary(&["country"], None).unwrap();
    assert_summary(
        &ctx,
        &plan,
        json!([
            {"country": null, "count": 1},
            {"country": "eng", "count": 2},
            {"country": "scot", "count": 1}
        ]),
    );
}

#[test]
fn test_related_field_excludes_records_without_rows() {
    let ctx = TestContext::new();
    let plan = ctx
        .summary(&["records__test_result", "run_name"], None)
        .unwrap();
    assert_eq!(plan.count_name, "records__count");
    assert!(plan.excludes_empty_relation());

    // C-3 has no test records and forms no group
    assert_summary(
        &ctx,
        &plan,
        json!([
            {"records__test_result": "neg", "run_name": "r1", "records__count": 2},
            {"records__test_result": "pos", "run_name": "r1", "records__count": 1},
            {"records__test_result": "pos", "run_name": "r2", "records__count": 1}
        ]),
    );
}

#[test]
fn test_to_one_relation_summary() {
    let ctx = TestContext::new();
    let plan = ctx.summary(&["site__code"], None).unwrap();
    assert_eq!(plan.count_name, "site__count");
    assert_summary(
        &ctx,
        &plan,
        json!([
            {"site__code": "bir", "site__count": 1},
            {"site__code": "lon", "site__count": 1}
        ]),
    );
}

#[test]
fn test_query_fields_join_the_grouping() {
    let ctx = TestContext::new();
    let plan = ctx
        .summary(&["run_name"], Some(&json!({"country": "ENG"})))
        .unwrap();
    assert_eq!(plan.columns(), vec!["run_name", "country"]);
    assert_summary(
        &ctx,
        &plan,
        json!([{"run_name": "r1", "country": "eng", "count": 2}]),
    );
}

#[test]
fn test_two_related_tables_rejected() {
    let ctx = TestContext::new();
    let err = ctx
        .summary(&["records__test_result", "analyses__name"], None)
        .unwrap_err();
    assert_eq!(
        err,
        QueryError::MultiRelationSummary {
            relations: vec!["analyses".to_string(), "records".to_string()]
        }
    );
}

#[test]
fn test_query_on_second_relation_rejected() {
    let ctx = TestContext::new();
    let err = ctx
        .summary(&["records__test_result"], Some(&json!({"analyses__name": "a1"})))
        .unwrap_err();
    assert!(matches!(err, QueryError::MultiRelationSummary { .. }));
}

#[test]
fn test_field_errors() {
    let ctx = TestContext::new();
    let err = ctx
        .summary(&["records", "country__in", "contry"], None)
        .unwrap_err();
    let QueryError::Fields(errors) = err else {
        panic!("expected field errors, got {:?}", err);
    };
    assert!(matches!(errors.get("records")[0], FieldError::RelationalSummary { .. }));
    assert!(matches!(errors.get("country__in")[0], FieldError::LookupNotAllowed { .. }));
    assert!(matches!(errors.get("contry")[0], FieldError::UnknownField { .. }));
}

#[test]
fn test_too_many_groups_rejected() {
    let config = QueryConfig {
        max_summary_output: 2,
        ..QueryConfig::default()
    };
    let ctx = TestContext::with_config(config);
    let plan = ctx.summary(&["tests"], None).unwrap();

    for backend in ctx.backends(&seed_records()) {
        let err = backend.summary(&plan, &ctx.config).unwrap_err();
        assert!(
            matches!(
                err,
                OnyxError::Query(QueryError::TooManyDistinctValues { count: 4, max: 2 })
            ),
            "{} backend: {:?}",
            backend.kind(),
            err
        );
    }
}
