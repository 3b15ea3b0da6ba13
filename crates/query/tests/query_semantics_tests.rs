//! Query semantics checked against every backend.
//!
//! Each test compiles documents as the analyst and asserts the matching
//! `climb_id`s, so the memory and SQLite backends must agree row for row.

mod common;

use common::*;
use onyx_query::error::{FieldError, QueryError};
use onyx_query::query::QueryNode;
use serde_json::{Value, json};

fn check(ctx: &TestContext, document: Value, expected: &[&str]) {
    let backends = ctx.backends(&seed_records());
    let predicate = ctx
        .compile(&document)
        .unwrap_or_else(|e| panic!("{} failed to compile: {}", document, e));
    assert_matches(&backends, &predicate, expected);
}

// ============================================================================
// Not-equal and NULL
// ============================================================================

#[test]
fn test_ne_never_matches_null() {
    let ctx = TestContext::new();
    let records = vec![
        RecordFixture::new("A").with_country("eng").build(),
        RecordFixture::new("B").with_country("eng").build(),
        RecordFixture::new("C").build(),
    ];
    let backends = ctx.backends(&records);

    let predicate = ctx.compile(&json!({"country__ne": "eng"})).unwrap();
    assert_matches(&backends, &predicate, &[]);
}

#[test]
fn test_ne_excludes_value_and_null() {
    let ctx = TestContext::new();
    check(&ctx, json!({"country__ne": "eng"}), &["C-4"]);
    check(&ctx, json!({"tests__ne": "2"}), &["C-1", "C-3"]);
}

#[test]
fn test_ne_blank_means_not_null() {
    let ctx = TestContext::new();
    check(&ctx, json!({"tests__ne": ""}), &["C-1", "C-2", "C-3"]);
}

#[test]
fn test_blank_equality_means_null() {
    let ctx = TestContext::new();
    check(&ctx, json!({"tests": ""}), &["C-4"]);
    check(&ctx, json!({"country": ""}), &["C-3"]);
}

#[test]
fn test_negated_equality_includes_null() {
    let ctx = TestContext::new();
    check(&ctx, json!({"~": {"country": "eng"}}), &["C-3", "C-4"]);
}

// ============================================================================
// In and not-in
// ============================================================================

#[test]
fn test_in_with_blank_slot_includes_null() {
    let ctx = TestContext::new();
    check(&ctx, json!({"tests__in": "1,2,,"}), &["C-1", "C-2", "C-4"]);
}

#[test]
fn test_notin_with_blank_slot_excludes_null() {
    let ctx = TestContext::new();
    check(&ctx, json!({"tests__notin": "1,2,,"}), &["C-3"]);
}

#[test]
fn test_notin_without_blank_keeps_null() {
    let ctx = TestContext::new();
    check(&ctx, json!({"tests__in": "1,2"}), &["C-1", "C-2"]);
    check(&ctx, json!({"tests__notin": "1,2"}), &["C-3", "C-4"]);
}

#[test]
fn test_list_of_blanks_is_null_check() {
    let ctx = TestContext::new();
    check(&ctx, json!({"tests__in": ",,"}), &["C-4"]);
    check(&ctx, json!({"tests__notin": ""}), &["C-1", "C-2", "C-3"]);
}

#[test]
fn test_range_requires_two_values() {
    let ctx = TestContext::new();
    for value in ["", "1", "1,2,3"] {
        let err = ctx.compile(&json!({"tests__range": value})).unwrap_err();
        assert!(matches!(err, QueryError::Fields(_)), "{:?}", value);
    }
}

// ============================================================================
// Choices
// ============================================================================

#[test]
fn test_choice_matching_ignores_case_and_whitespace() {
    let ctx = TestContext::new();
    for value in ["eng", "ENG", " Eng "] {
        check(&ctx, json!({"country": value}), &["C-1", "C-2"]);
    }
    check(&ctx, json!({"country__in": "ENG,Scot"}), &["C-1", "C-2", "C-4"]);
}

#[test]
fn test_invalid_choice_suggests() {
    let ctx = TestContext::new();
    let err = ctx.compile(&json!({"country": "ing"})).unwrap_err();
    let QueryError::Fields(errors) = err else {
        panic!("expected field errors, got {:?}", err);
    };
    let FieldError::InvalidValue { value, message } = &errors.get("country")[0] else {
        panic!("expected an invalid value error");
    };
    assert_eq!(value, "ing");
    assert!(message.contains("Perhaps you meant: eng"), "{}", message);
}

#[test]
fn test_inactive_choice_rejected() {
    let ctx = TestContext::new();
    ctx.choices
        .sync_choices("mpx", "country", &[])
        .expect("deactivating choices should succeed");
    assert!(ctx.compile(&json!({"country": "eng"})).is_err());
}

// ============================================================================
// Numbers, dates, booleans and text
// ============================================================================

#[test]
fn test_numeric_comparisons() {
    let ctx = TestContext::new();
    check(&ctx, json!({"tests__gte": "2"}), &["C-2", "C-3"]);
    check(&ctx, json!({"tests__range": "2,3"}), &["C-2", "C-3"]);
    check(&ctx, json!({"score__lt": "2"}), &["C-1"]);
    check(&ctx, json!({"tests__isnull": "true"}), &["C-4"]);
}

#[test]
fn test_isnull_rejects_blank() {
    let ctx = TestContext::new();
    for value in ["", " ", "maybe"] {
        assert!(
            ctx.compile(&json!({"tests__isnull": value})).is_err(),
            "{:?}",
            value
        );
    }
}

#[test]
fn test_date_comparisons() {
    let ctx = TestContext::new();
    check(&ctx, json!({"collection_month__gte": "2023-01-01"}), &["C-1"]);
    // 2023-01-01 falls in the last ISO week of 2022
    check(&ctx, json!({"collection_month__iso_year": "2022"}), &["C-1", "C-3"]);
    check(&ctx, json!({"submitted__range": "2023-01-01,2023-12-31"}), &["C-1"]);
}

#[test]
fn test_iso_week_of_early_january() {
    let ctx = TestContext::new();
    // 2021-01-03 is a Sunday in ISO week 53 of 2020
    check(&ctx, json!({"submitted__iso_year": "2020"}), &["C-4"]);
    check(&ctx, json!({"submitted__week": "53"}), &["C-4"]);
    check(&ctx, json!({"submitted__week__in": "2,53"}), &["C-1", "C-4"]);
}

#[test]
fn test_boolean_tokens() {
    let ctx = TestContext::new();
    check(&ctx, json!({"is_published": "yes"}), &["C-1"]);
    check(&ctx, json!({"is_published": "OFF"}), &["C-2"]);
    check(&ctx, json!({"is_published__in": "true,"}), &["C-1", "C-3", "C-4"]);
}

#[test]
fn test_text_lookups() {
    let ctx = TestContext::new();
    check(&ctx, json!({"run_name__icontains": "R1"}), &["C-1", "C-2"]);
    check(&ctx, json!({"run_name__contains": "R1"}), &[]);
    check(&ctx, json!({"run_name__endswith": "2"}), &["C-3", "C-4"]);
}

// ============================================================================
// Arrays and structures
// ============================================================================

#[test]
fn test_array_isnull_means_empty() {
    let ctx = TestContext::new();
    check(&ctx, json!({"scores__isnull": "true"}), &["C-2"]);
}

#[test]
fn test_array_lookups() {
    let ctx = TestContext::new();
    check(&ctx, json!({"scores__length": "3"}), &["C-1"]);
    check(&ctx, json!({"scores__length__range": "1,3"}), &["C-1", "C-3"]);
    check(&ctx, json!({"scores__contains": "1,2"}), &["C-1"]);
    check(&ctx, json!({"scores__overlap": "3,4"}), &["C-1", "C-3"]);
    check(&ctx, json!({"tags__contains": "beta"}), &["C-2"]);
}

#[test]
fn test_structure_lookups() {
    let ctx = TestContext::new();
    check(&ctx, json!({"metadata__has_key": "lab"}), &["C-1", "C-3"]);
    check(&ctx, json!({"metadata__contains": "{\"lab\": \"x\"}"}), &["C-1"]);
    check(&ctx, json!({"metadata__isnull": "true"}), &["C-2"]);
}

// ============================================================================
// Relations
// ============================================================================

#[test]
fn test_to_many_comparison_is_existential() {
    let ctx = TestContext::new();
    check(&ctx, json!({"records__test_result": "pos"}), &["C-1", "C-4"]);
    check(&ctx, json!({"records__test_result": "neg"}), &["C-1", "C-2"]);
}

#[test]
fn test_each_comparison_picks_its_own_row() {
    let ctx = TestContext::new();
    check(
        &ctx,
        json!({"&": [{"records__test_result": "pos"}, {"records__test_id": "2"}]}),
        &["C-1"],
    );
}

#[test]
fn test_empty_relation_behaves_as_null_row() {
    let ctx = TestContext::new();
    check(&ctx, json!({"records__test_result__isnull": "true"}), &["C-3"]);
    check(&ctx, json!({"records__isnull": "true"}), &["C-3"]);
    check(&ctx, json!({"~": {"records__test_result": "neg"}}), &["C-3", "C-4"]);
}

#[test]
fn test_to_one_relation() {
    let ctx = TestContext::new();
    check(&ctx, json!({"site__code": "lon"}), &["C-1"]);
    check(&ctx, json!({"site__isnull": "true"}), &["C-3", "C-4"]);
}

// ============================================================================
// Combinators
// ============================================================================

#[test]
fn test_or_and_not() {
    let ctx = TestContext::new();
    check(
        &ctx,
        json!({"|": [{"country": "scot"}, {"tests__gt": "2"}]}),
        &["C-3", "C-4"],
    );
    check(
        &ctx,
        json!({"&": [{"run_name": "r1"}, {"~": {"tests": "1"}}]}),
        &["C-2"],
    );
}

#[test]
fn test_xor_is_parity() {
    let ctx = TestContext::new();
    // C-1 matches all three, C-2 matches two
    check(
        &ctx,
        json!({"^": [{"country": "eng"}, {"tests": "1"}, {"run_name": "r1"}]}),
        &["C-1"],
    );
}

#[test]
fn test_range_from_repeated_field() {
    let ctx = TestContext::new();
    check(
        &ctx,
        json!({"&": [{"tests__gte": "2"}, {"tests__lte": "2"}]}),
        &["C-2"],
    );
}

#[test]
fn test_query_params_are_anded() {
    let ctx = TestContext::new();
    let node = QueryNode::from_params(
        [("country", "eng"), ("tests__gt", "1"), ("search", "ignored")],
        &ctx.config,
    )
    .unwrap()
    .unwrap();
    check(&ctx, node.to_json(), &["C-2"]);
}
