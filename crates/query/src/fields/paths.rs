//! Conversions between nested field documents and `__`-joined field paths.

use std::collections::BTreeSet;

use serde_json::{Map, Value as JsonValue};

use crate::error::{FieldError, FieldErrors};

/// Separator between the components of a field path.
pub const SEPARATOR: &str = "__";

/// Flattens a nested JSON document into the set of field paths it touches.
///
/// Objects contribute their keys, joined to nested keys with `__`; lists
/// contribute the paths of their items; other values end a path. Keys that
/// already contain `__` are rejected.
pub fn flatten_fields(value: &JsonValue) -> Result<BTreeSet<String>, FieldErrors> {
    let mut out = BTreeSet::new();
    let mut errors = FieldErrors::new();
    collect(value, None, &mut out, &mut errors);
    errors.into_result(out)
}

fn collect(
    value: &JsonValue,
    prefix: Option<&str>,
    out: &mut BTreeSet<String>,
    errors: &mut FieldErrors,
) -> bool {
    match value {
        JsonValue::Object(map) => {
            let mut any = false;
            for (key, item) in map {
                if key.contains(SEPARATOR) {
                    errors.push(
                        key.clone(),
                        FieldError::invalid_value(
                            key.clone(),
                            "Field names cannot contain the '__' separator.",
                        ),
                    );
                    continue;
                }
                let path = match prefix {
                    Some(prefix) => format!("{}{}{}", prefix, SEPARATOR, key),
                    None => key.clone(),
                };
                if !collect(item, Some(&path), out, errors) {
                    out.insert(path);
                }
                any = true;
            }
            any
        }
        JsonValue::Array(items) => {
            let mut any = false;
            for item in items {
                any |= collect(item, prefix, out, errors);
            }
            any
        }
        _ => false,
    }
}

/// Builds a nested document of empty objects from field paths.
///
/// Empty components end a path early.
pub fn unflatten_fields<I, S>(fields: I) -> JsonValue
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut root = Map::new();
    for field in fields {
        let mut current = &mut root;
        for piece in field.as_ref().split(SEPARATOR) {
            if piece.is_empty() {
                break;
            }
            let entry = current
                .entry(piece.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            current = match entry {
                JsonValue::Object(map) => map,
                _ => break,
            };
        }
    }
    JsonValue::Object(root)
}

fn covers(prefix: &str, field: &str) -> bool {
    field == prefix
        || field
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Keeps fields equal to or nested under an `include` entry, then drops
/// fields equal to or nested under an `exclude` entry.
///
/// An empty `include` keeps everything.
pub fn include_exclude_fields<S: AsRef<str>>(
    fields: impl IntoIterator<Item = String>,
    include: &[S],
    exclude: &[S],
) -> Vec<String> {
    fields
        .into_iter()
        .filter(|field| include.is_empty() || include.iter().any(|inc| covers(inc.as_ref(), field)))
        .filter(|field| !exclude.iter().any(|exc| covers(exc.as_ref(), field)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_fields() {
        let doc = json!({
            "run_name": "a",
            "records": [{"test_result": "pos"}, {"ct_value": 1.5}],
            "site": {"code": "x"},
            "empty": {}
        });
        let paths: Vec<String> = flatten_fields(&doc).unwrap().into_iter().collect();
        assert_eq!(
            paths,
            vec![
                "empty",
                "records__ct_value",
                "records__test_result",
                "run_name",
                "site__code"
            ]
        );
    }

    #[test]
    fn test_flatten_rejects_separator_in_keys() {
        let errors = flatten_fields(&json!({"site__code": "x"})).unwrap_err();
        assert!(errors.contains("site__code"));
    }

    #[test]
    fn test_unflatten_fields() {
        let doc = unflatten_fields(["run_name", "records__ct_value", "records__test_result", ""]);
        assert_eq!(
            doc,
            json!({"run_name": {}, "records": {"ct_value": {}, "test_result": {}}})
        );
    }

    #[test]
    fn test_include_exclude_fields() {
        let fields = vec![
            "run_name".to_string(),
            "records".to_string(),
            "records__ct_value".to_string(),
            "records_extra".to_string(),
        ];

        let included = include_exclude_fields(fields.clone(), &["records"], &[]);
        assert_eq!(included, vec!["records", "records__ct_value"]);

        let excluded = include_exclude_fields(fields.clone(), &[] as &[&str], &["records"]);
        assert_eq!(excluded, vec!["run_name", "records_extra"]);

        let both = include_exclude_fields(fields, &["records"], &["records__ct_value"]);
        assert_eq!(both, vec!["records"]);
    }
}
