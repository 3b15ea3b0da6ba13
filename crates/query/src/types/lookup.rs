//! Lookup operators.
//!
//! A lookup is the trailing `__<name>` suffix of a field key, selecting the
//! comparison applied between the stored value and the query value. The
//! empty suffix is the bare equality lookup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The lookup operators understood by the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Lookup {
    /// Bare field key, equality.
    Bare,
    Exact,
    Ne,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    IExact,
    IContains,
    IStartsWith,
    IEndsWith,
    Length,
    LengthIn,
    LengthRange,
    Lt,
    Lte,
    Gt,
    Gte,
    Range,
    IsoYear,
    IsoYearIn,
    IsoYearRange,
    Week,
    WeekIn,
    WeekRange,
    IsNull,
    ContainedBy,
    Overlap,
    HasKey,
    HasKeys,
    HasAnyKeys,
}

impl Lookup {
    /// Every lookup, in catalogue order. The bare lookup comes first.
    pub const ALL: [Lookup; 32] = [
        Lookup::Bare,
        Lookup::Exact,
        Lookup::Ne,
        Lookup::In,
        Lookup::NotIn,
        Lookup::Contains,
        Lookup::StartsWith,
        Lookup::EndsWith,
        Lookup::IExact,
        Lookup::IContains,
        Lookup::IStartsWith,
        Lookup::IEndsWith,
        Lookup::Length,
        Lookup::LengthIn,
        Lookup::LengthRange,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::Range,
        Lookup::IsoYear,
        Lookup::IsoYearIn,
        Lookup::IsoYearRange,
        Lookup::Week,
        Lookup::WeekIn,
        Lookup::WeekRange,
        Lookup::IsNull,
        Lookup::ContainedBy,
        Lookup::Overlap,
        Lookup::HasKey,
        Lookup::HasKeys,
        Lookup::HasAnyKeys,
    ];

    /// Returns the label used in field keys (`""` for the bare lookup).
    pub fn label(&self) -> &'static str {
        match self {
            Lookup::Bare => "",
            Lookup::Exact => "exact",
            Lookup::Ne => "ne",
            Lookup::In => "in",
            Lookup::NotIn => "notin",
            Lookup::Contains => "contains",
            Lookup::StartsWith => "startswith",
            Lookup::EndsWith => "endswith",
            Lookup::IExact => "iexact",
            Lookup::IContains => "icontains",
            Lookup::IStartsWith => "istartswith",
            Lookup::IEndsWith => "iendswith",
            Lookup::Length => "length",
            Lookup::LengthIn => "length__in",
            Lookup::LengthRange => "length__range",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Range => "range",
            Lookup::IsoYear => "iso_year",
            Lookup::IsoYearIn => "iso_year__in",
            Lookup::IsoYearRange => "iso_year__range",
            Lookup::Week => "week",
            Lookup::WeekIn => "week__in",
            Lookup::WeekRange => "week__range",
            Lookup::IsNull => "isnull",
            Lookup::ContainedBy => "contained_by",
            Lookup::Overlap => "overlap",
            Lookup::HasKey => "has_key",
            Lookup::HasKeys => "has_keys",
            Lookup::HasAnyKeys => "has_any_keys",
        }
    }

    /// Human-readable description of the lookup.
    pub fn description(&self) -> &'static str {
        match self {
            Lookup::Bare | Lookup::Exact => "The field's value must be equal to the query value.",
            Lookup::Ne => "The field's value must not be equal to the query value.",
            Lookup::In => "The field's value must be in the list of query values.",
            Lookup::NotIn => "The field's value must not be in the list of query values.",
            Lookup::Contains => "The field's value must contain the query value.",
            Lookup::StartsWith => "The field's value must start with the query value.",
            Lookup::EndsWith => "The field's value must end with the query value.",
            Lookup::IExact => "The field's value must be equal to the query value, ignoring case.",
            Lookup::IContains => "The field's value must contain the query value, ignoring case.",
            Lookup::IStartsWith => {
                "The field's value must start with the query value, ignoring case."
            }
            Lookup::IEndsWith => "The field's value must end with the query value, ignoring case.",
            Lookup::Length => "The length of the field's value must be equal to the query value.",
            Lookup::LengthIn => {
                "The length of the field's value must be in the list of query values."
            }
            Lookup::LengthRange => {
                "The length of the field's value must be in the range of query values."
            }
            Lookup::Lt => "The field's value must be less than the query value.",
            Lookup::Lte => "The field's value must be less than or equal to the query value.",
            Lookup::Gt => "The field's value must be greater than the query value.",
            Lookup::Gte => "The field's value must be greater than or equal to the query value.",
            Lookup::Range => "The field's value must be in the range of query values.",
            Lookup::IsoYear => {
                "The ISO 8601 week-numbering year of the field's value must be equal to the query value."
            }
            Lookup::IsoYearIn => {
                "The ISO 8601 week-numbering year of the field's value must be in the list of query values."
            }
            Lookup::IsoYearRange => {
                "The ISO 8601 week-numbering year of the field's value must be in the range of query values."
            }
            Lookup::Week => {
                "The ISO 8601 week number of the field's value must be equal to the query value."
            }
            Lookup::WeekIn => {
                "The ISO 8601 week number of the field's value must be in the list of query values."
            }
            Lookup::WeekRange => {
                "The ISO 8601 week number of the field's value must be in the range of query values."
            }
            Lookup::IsNull => "The field's value must be empty.",
            Lookup::ContainedBy => {
                "The field's value must be equal to, or a subset of, the query value."
            }
            Lookup::Overlap => "The field's value must overlap with the query value.",
            Lookup::HasKey => "The field's top-level keys must contain the query value.",
            Lookup::HasKeys => "The field's top-level keys must contain all of the query values.",
            Lookup::HasAnyKeys => {
                "The field's top-level keys must contain any of the query values."
            }
        }
    }

    /// Parses a lookup label, returning None for unknown labels.
    ///
    /// Labels are matched exactly: `"EXACT"` is not a lookup.
    pub fn parse(s: &str) -> Option<Self> {
        Lookup::ALL.iter().copied().find(|lookup| lookup.label() == s)
    }

    /// Returns true for lookups whose query value is a list.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Lookup::In
                | Lookup::NotIn
                | Lookup::LengthIn
                | Lookup::IsoYearIn
                | Lookup::WeekIn
                | Lookup::HasKeys
                | Lookup::HasAnyKeys
        )
    }

    /// Returns true for lookups whose query value is a two-element range.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Lookup::Range | Lookup::LengthRange | Lookup::IsoYearRange | Lookup::WeekRange
        )
    }

    /// Returns true for the bare and `exact` equality lookups.
    pub fn is_equality(&self) -> bool {
        matches!(self, Lookup::Bare | Lookup::Exact)
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Lookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Lookup::parse(s).ok_or_else(|| format!("unknown lookup: {}", s))
    }
}

impl From<Lookup> for String {
    fn from(lookup: Lookup) -> Self {
        lookup.label().to_string()
    }
}

impl TryFrom<String> for Lookup {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_labels_are_unique() {
        let mut labels: Vec<&str> = Lookup::ALL.iter().map(|l| l.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), Lookup::ALL.len());
    }

    #[test]
    fn test_lookup_parse() {
        assert_eq!(Lookup::parse(""), Some(Lookup::Bare));
        assert_eq!(Lookup::parse("notin"), Some(Lookup::NotIn));
        assert_eq!(Lookup::parse("length__range"), Some(Lookup::LengthRange));
        assert_eq!(Lookup::parse("iso_year__in"), Some(Lookup::IsoYearIn));
        assert_eq!(Lookup::parse("EXACT"), None);
        assert_eq!(Lookup::parse("between"), None);
    }

    #[test]
    fn test_lookup_list_and_range_flags() {
        assert!(Lookup::In.is_list());
        assert!(Lookup::HasKeys.is_list());
        assert!(!Lookup::Range.is_list());
        assert!(Lookup::WeekRange.is_range());
        assert!(!Lookup::Exact.is_range());
    }

    #[test]
    fn test_lookup_serde() {
        let json = serde_json::to_string(&Lookup::ContainedBy).unwrap();
        assert_eq!(json, "\"contained_by\"");
        let parsed: Lookup = serde_json::from_str("\"has_any_keys\"").unwrap();
        assert_eq!(parsed, Lookup::HasAnyKeys);
    }
}
