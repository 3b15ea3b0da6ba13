//! Free-text search across a user's permitted fields.
//!
//! Each whitespace-separated term is matched against every field its form
//! allows: text and choice fields by case-insensitive substring, numbers
//! and dates by equality, four-digit years against the year of dates, and
//! `true`/`false` against booleans. A record matches when every term
//! matches some field.

use tracing::{debug, instrument};

use crate::coerce::{parse_decimal, parse_integer, parse_search_datetime};
use crate::fields::{FieldHandler, SEPARATOR};
use crate::query::{FieldRef, Operator, Predicate, Transform};
use crate::types::{OnyxType, Value};

/// Splits a search string into terms, stripping surrounding quotes.
pub fn search_terms(search: &str) -> Vec<String> {
    search
        .split_whitespace()
        .map(|term| term.trim_matches(|c| c == '\'' || c == '"').trim().to_string())
        .filter(|term| !term.is_empty())
        .collect()
}

fn year(term: &str) -> Option<i64> {
    (term.len() == 4 && term.bytes().all(|b| b.is_ascii_digit()))
        .then(|| term.parse().ok())
        .flatten()
}

fn boolean(term: &str) -> Option<bool> {
    match term.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Searchable fields grouped by how a term is matched against them.
#[derive(Debug, Default)]
struct SearchFields {
    text: Vec<FieldRef>,
    integer: Vec<FieldRef>,
    decimal: Vec<FieldRef>,
    date: Vec<FieldRef>,
    datetime: Vec<FieldRef>,
    boolean: Vec<FieldRef>,
}

/// Compiles search strings for one user and action.
pub struct SearchCompiler<'a> {
    handler: &'a FieldHandler<'a>,
}

impl<'a> SearchCompiler<'a> {
    pub fn new(handler: &'a FieldHandler<'a>) -> Self {
        Self { handler }
    }

    /// Root-level fields the user may act on, plus the display field of
    /// each permitted relation.
    fn fields(&self) -> SearchFields {
        let mut fields = SearchFields::default();
        let model = &self.handler.schema().model;
        let available = self.handler.available_fields();

        for field in model.fields() {
            let path = match field.relation() {
                Some(relation) => match &relation.display {
                    Some(display) => format!("{}{}{}", field.name, SEPARATOR, display),
                    None => continue,
                },
                None => field.name.clone(),
            };
            if !available.contains(&path) {
                continue;
            }
            let Ok(resolved) = self.handler.resolve(&path, false) else {
                continue;
            };
            let field_ref = FieldRef::from(&resolved);
            match resolved.onyx_type {
                OnyxType::Text | OnyxType::Choice => fields.text.push(field_ref),
                OnyxType::Integer => fields.integer.push(field_ref),
                OnyxType::Decimal => fields.decimal.push(field_ref),
                OnyxType::Date => fields.date.push(field_ref),
                OnyxType::DateTime => fields.datetime.push(field_ref),
                OnyxType::Boolean => fields.boolean.push(field_ref),
                _ => {}
            }
        }

        fields
    }

    /// Builds the predicate for a search string.
    ///
    /// A term no field can match makes the whole search false, as does a
    /// search with no terms.
    #[instrument(skip(self), fields(project = %self.handler.schema().code))]
    pub fn compile(&self, search: &str) -> Predicate {
        let terms = search_terms(search);
        if terms.is_empty() {
            return Predicate::False;
        }

        let fields = self.fields();
        let predicate = Predicate::all(terms.iter().map(|term| term_predicate(&fields, term)));
        debug!(terms = terms.len(), predicate = %predicate, "Compiled search");
        predicate
    }
}

fn exact(field: &FieldRef, transform: Option<Transform>, value: Value) -> Predicate {
    Predicate::compare(field.clone(), transform, Operator::Exact(value))
}

fn term_predicate(fields: &SearchFields, term: &str) -> Predicate {
    let mut matches = Vec::new();

    for field in &fields.text {
        matches.push(Predicate::compare(
            field.clone(),
            None,
            Operator::IContains(term.to_string()),
        ));
    }

    if let Some(value) = parse_integer(term) {
        matches.extend(fields.integer.iter().map(|f| exact(f, None, Value::Integer(value))));
    }

    if let Some(value) = parse_decimal(term) {
        matches.extend(fields.decimal.iter().map(|f| exact(f, None, Value::Decimal(value))));
    }

    if let Some(timestamp) = parse_search_datetime(term) {
        let date = timestamp.date();
        matches.extend(fields.date.iter().map(|f| exact(f, None, Value::Date(date))));
        matches.extend(
            fields
                .datetime
                .iter()
                .map(|f| exact(f, None, Value::DateTime(timestamp))),
        );
    }

    if let Some(year) = year(term) {
        for field in fields.date.iter().chain(&fields.datetime) {
            matches.push(exact(field, Some(Transform::Year), Value::Integer(year)));
        }
    }

    if let Some(value) = boolean(term) {
        matches.extend(fields.boolean.iter().map(|f| exact(f, None, Value::Boolean(value))));
    }

    Predicate::any(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Action;
    use crate::query::Comparison;
    use crate::testing;

    fn compile(search: &str) -> Predicate {
        let schema = testing::schema();
        let user = testing::analyst(&schema);
        let choices = testing::choices();
        let handler = FieldHandler::new(&schema, &user, Action::List, &choices);
        SearchCompiler::new(&handler).compile(search)
    }

    fn compared(predicate: &Predicate) -> Vec<String> {
        let mut out = Vec::new();
        predicate.evaluate(&mut |c: &Comparison| {
            out.push(c.to_string());
            false
        });
        out
    }

    #[test]
    fn test_search_terms() {
        assert_eq!(
            search_terms("  eng 'run 1' \"x\" '' "),
            vec!["eng", "run", "1", "x"]
        );
    }

    #[test]
    fn test_text_term() {
        let p = compile("eng");
        let compared = compared(&p);
        assert!(compared.contains(&"country__icontains \"eng\"".to_string()));
        assert!(compared.contains(&"run_name__icontains \"eng\"".to_string()));
        assert!(compared.contains(&"site__code__icontains \"eng\"".to_string()));
        assert!(!compared.iter().any(|c| c.starts_with("tests")));
        // climb_id is not listable
        assert!(!compared.iter().any(|c| c.starts_with("climb_id")));
    }

    #[test]
    fn test_number_terms() {
        let whole = compared(&compile("3.0"));
        assert!(whole.contains(&"tests__exact \"3\"".to_string()));
        assert!(whole.contains(&"score__exact \"3.0\"".to_string()));

        let fraction = compared(&compile("3.5"));
        assert!(!fraction.iter().any(|c| c.starts_with("tests")));
        assert!(fraction.iter().any(|c| c.starts_with("score")));
    }

    #[test]
    fn test_year_term() {
        let compared = compared(&compile("2024"));
        assert!(compared.contains(&"collection_month__exact \"2024-01-01\"".to_string()));
        assert!(compared.contains(&"collection_month__year__exact \"2024\"".to_string()));
        assert!(compared.contains(&"submitted__year__exact \"2024\"".to_string()));
    }

    #[test]
    fn test_timestamp_term_keeps_time() {
        let compared = compared(&compile("2023-01-15T10:30"));
        assert!(compared.contains(&"submitted__exact \"2023-01-15 10:30:00\"".to_string()));
        assert!(compared.contains(&"collection_month__exact \"2023-01-15\"".to_string()));
    }

    #[test]
    fn test_boolean_term() {
        let compared = compared(&compile("TRUE"));
        assert!(compared.contains(&"is_published__exact \"true\"".to_string()));
        assert!(!compared.iter().any(|c| c.starts_with("tests")));
    }

    #[test]
    fn test_terms_are_conjunctive() {
        let p = compile("eng 2024");
        assert!(matches!(p, Predicate::And(ref children) if children.len() == 2));
    }

    #[test]
    fn test_empty_search_is_false() {
        assert_eq!(compile("   "), Predicate::False);
    }

    #[test]
    fn test_unmatchable_term_is_false() {
        let schema = testing::schema();
        let user = testing::restricted();
        let choices = testing::choices();
        // The restricted user has no listable fields
        let handler = FieldHandler::new(&schema, &user, Action::List, &choices);
        let p = SearchCompiler::new(&handler).compile("eng");
        assert_eq!(p, Predicate::False);
    }
}
