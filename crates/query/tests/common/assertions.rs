//! Assertions over backend results.

use onyx_query::backends::QueryBackend;
use onyx_query::query::Predicate;

/// `climb_id`s of the records matching `predicate`, sorted.
///
/// Record ids differ between backends, so results are compared by
/// `climb_id`.
pub fn climb_ids(backend: &dyn QueryBackend, predicate: &Predicate) -> Vec<String> {
    let ids = backend
        .filter(predicate)
        .unwrap_or_else(|e| panic!("{} filter failed: {}", backend.kind(), e));
    let records = backend
        .fetch(&ids)
        .unwrap_or_else(|e| panic!("{} fetch failed: {}", backend.kind(), e));
    let mut climb_ids: Vec<String> = records
        .iter()
        .filter_map(|record| record["climb_id"].as_str().map(String::from))
        .collect();
    climb_ids.sort();
    climb_ids
}

/// Asserts every backend returns exactly `expected` for `predicate`.
pub fn assert_matches(backends: &[Box<dyn QueryBackend>], predicate: &Predicate, expected: &[&str]) {
    for backend in backends {
        assert_eq!(
            climb_ids(backend.as_ref(), predicate),
            expected,
            "{} backend, predicate {}",
            backend.kind(),
            predicate
        );
    }
}
