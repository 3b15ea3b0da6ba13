//! Storage behaviour shared by every backend.

#[macro_use]
mod common;

use common::*;
use onyx_query::backends::BackendKind;
use onyx_query::query::Predicate;
use serde_json::json;

backend_test!(counts_every_record, |_ctx, backend| {
    assert_eq!(backend.count(&Predicate::True).unwrap(), 4);
    assert_eq!(backend.count(&Predicate::False).unwrap(), 0);
});

backend_test!(filter_returns_ascending_ids, |_ctx, backend| {
    let ids = backend.filter(&Predicate::True).unwrap();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
    assert_eq!(ids.len(), 4);
});

backend_test!(fetch_skips_unknown_ids, |_ctx, backend| {
    let ids = backend.filter(&Predicate::True).unwrap();
    let fetched = backend.fetch(&[ids[1], 9999, ids[0]]).unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0]["climb_id"], "C-2");
    assert_eq!(fetched[1]["climb_id"], "C-1");
});

backend_test!(fetch_renders_every_field, |_ctx, backend| {
    let ids = backend.filter(&Predicate::True).unwrap();
    let record = &backend.fetch(&ids[2..3]).unwrap()[0];

    assert_eq!(record["climb_id"], "C-3");
    assert_eq!(record["country"], serde_json::Value::Null);
    assert_eq!(record["scores"], json!([4]));
    assert_eq!(record["collection_month"], "2022-06-01");
    assert_eq!(record["site"], serde_json::Value::Null);
    assert_eq!(record["records"], json!([]));
    assert_eq!(record["analyses"], json!([{"name": "a2"}]));
});

backend_test!(insert_appends, |ctx, backend| {
    let before = backend.filter(&Predicate::True).unwrap();
    let id = backend
        .insert(&RecordFixture::new("C-5").with_country("wales").build())
        .unwrap();
    assert!(before.iter().all(|existing| *existing < id));

    let predicate = ctx.compile(&json!({"country": "Wales"})).unwrap();
    assert_eq!(backend.filter(&predicate).unwrap(), vec![id]);
});

backend_test!(reports_its_kind, |_ctx, backend| {
    assert!(matches!(backend.kind(), BackendKind::Memory | BackendKind::Sqlite));
    assert_eq!(backend.schema().code, "mpx");
});
