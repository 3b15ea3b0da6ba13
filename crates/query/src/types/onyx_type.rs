//! Field types and the lookups each type accepts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::lookup::Lookup;

/// Scalar types, usable on their own or as the element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Text,
    Choice,
    Integer,
    Decimal,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    #[serde(rename = "bool")]
    Boolean,
}

impl ScalarType {
    /// Returns the field type of a standalone field of this scalar type.
    pub fn onyx_type(&self) -> OnyxType {
        match self {
            ScalarType::Text => OnyxType::Text,
            ScalarType::Choice => OnyxType::Choice,
            ScalarType::Integer => OnyxType::Integer,
            ScalarType::Decimal => OnyxType::Decimal,
            ScalarType::Date => OnyxType::Date,
            ScalarType::DateTime => OnyxType::DateTime,
            ScalarType::Boolean => OnyxType::Boolean,
        }
    }

    /// Parses a scalar type label.
    pub fn parse(s: &str) -> Option<Self> {
        OnyxType::parse(s)?.scalar()
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.onyx_type().label())
    }
}

/// The semantic type of a field.
///
/// Each type carries a fixed, ordered set of legal lookups. Arrays carry the
/// scalar type of their elements; their lookups are container-oriented and
/// do not depend on the element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnyxType {
    Text,
    Choice,
    Integer,
    Decimal,
    Date,
    DateTime,
    Boolean,
    Relation,
    Array(ScalarType),
    Structure,
    Identifiers,
}

const TEXT_LOOKUPS: &[Lookup] = &[
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
    Lookup::IsNull,
];

const CHOICE_LOOKUPS: &[Lookup] = &[
    Lookup::Bare,
    Lookup::Exact,
    Lookup::Ne,
    Lookup::In,
    Lookup::NotIn,
    Lookup::IsNull,
];

const NUMBER_LOOKUPS: &[Lookup] = &[
    Lookup::Bare,
    Lookup::Exact,
    Lookup::Ne,
    Lookup::In,
    Lookup::NotIn,
    Lookup::Lt,
    Lookup::Lte,
    Lookup::Gt,
    Lookup::Gte,
    Lookup::Range,
    Lookup::IsNull,
];

const DATE_LOOKUPS: &[Lookup] = &[
    Lookup::Bare,
    Lookup::Exact,
    Lookup::Ne,
    Lookup::In,
    Lookup::NotIn,
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
];

const BOOLEAN_LOOKUPS: &[Lookup] = &[
    Lookup::Bare,
    Lookup::Exact,
    Lookup::Ne,
    Lookup::In,
    Lookup::NotIn,
    Lookup::IsNull,
];

const LINK_LOOKUPS: &[Lookup] = &[Lookup::IsNull];

const ARRAY_LOOKUPS: &[Lookup] = &[
    Lookup::Bare,
    Lookup::Exact,
    Lookup::Contains,
    Lookup::ContainedBy,
    Lookup::Overlap,
    Lookup::Length,
    Lookup::LengthIn,
    Lookup::LengthRange,
    Lookup::IsNull,
];

const STRUCTURE_LOOKUPS: &[Lookup] = &[
    Lookup::Bare,
    Lookup::Exact,
    Lookup::Contains,
    Lookup::ContainedBy,
    Lookup::HasKey,
    Lookup::HasKeys,
    Lookup::HasAnyKeys,
    Lookup::IsNull,
];

impl OnyxType {
    /// The type catalogue, one entry per type label.
    pub const CATALOGUE: [OnyxType; 11] = [
        OnyxType::Text,
        OnyxType::Choice,
        OnyxType::Integer,
        OnyxType::Decimal,
        OnyxType::Date,
        OnyxType::DateTime,
        OnyxType::Boolean,
        OnyxType::Relation,
        OnyxType::Array(ScalarType::Text),
        OnyxType::Structure,
        OnyxType::Identifiers,
    ];

    /// Returns the front-facing type label.
    pub fn label(&self) -> &'static str {
        match self {
            OnyxType::Text => "text",
            OnyxType::Choice => "choice",
            OnyxType::Integer => "integer",
            OnyxType::Decimal => "decimal",
            OnyxType::Date => "date",
            OnyxType::DateTime => "datetime",
            OnyxType::Boolean => "bool",
            OnyxType::Relation => "relation",
            OnyxType::Array(_) => "array",
            OnyxType::Structure => "structure",
            OnyxType::Identifiers => "identifiers",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OnyxType::Text => "A string of characters.",
            OnyxType::Choice => "A restricted set of options.",
            OnyxType::Integer => "A whole number.",
            OnyxType::Decimal => "A decimal number.",
            OnyxType::Date => "A date.",
            OnyxType::DateTime => "A date and time.",
            OnyxType::Boolean => "A true or false value.",
            OnyxType::Relation => "A link to a row, or multiple rows, in another table.",
            OnyxType::Array(_) => "A list of values.",
            OnyxType::Structure => "An arbitrary JSON structure.",
            OnyxType::Identifiers => {
                "A many-to-many linkage with another table, captured in a set of identifiers."
            }
        }
    }

    /// Returns the ordered set of lookups legal for this type.
    pub fn lookups(&self) -> &'static [Lookup] {
        match self {
            OnyxType::Text => TEXT_LOOKUPS,
            OnyxType::Choice => CHOICE_LOOKUPS,
            OnyxType::Integer | OnyxType::Decimal => NUMBER_LOOKUPS,
            OnyxType::Date | OnyxType::DateTime => DATE_LOOKUPS,
            OnyxType::Boolean => BOOLEAN_LOOKUPS,
            OnyxType::Relation | OnyxType::Identifiers => LINK_LOOKUPS,
            OnyxType::Array(_) => ARRAY_LOOKUPS,
            OnyxType::Structure => STRUCTURE_LOOKUPS,
        }
    }

    /// Returns true if the lookup is legal for this type.
    pub fn is_lookup_valid(&self, lookup: Lookup) -> bool {
        self.lookups().contains(&lookup)
    }

    /// Returns the element type of an array.
    pub fn base(&self) -> Option<ScalarType> {
        match self {
            OnyxType::Array(base) => Some(*base),
            _ => None,
        }
    }

    /// Returns the scalar type of a single-column field.
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            OnyxType::Text => Some(ScalarType::Text),
            OnyxType::Choice => Some(ScalarType::Choice),
            OnyxType::Integer => Some(ScalarType::Integer),
            OnyxType::Decimal => Some(ScalarType::Decimal),
            OnyxType::Date => Some(ScalarType::Date),
            OnyxType::DateTime => Some(ScalarType::DateTime),
            OnyxType::Boolean => Some(ScalarType::Boolean),
            _ => None,
        }
    }

    /// Returns true for types whose values live in a single column.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            OnyxType::Relation | OnyxType::Array(_) | OnyxType::Structure | OnyxType::Identifiers
        )
    }

    /// Parses a type label. Array labels parse with a text base.
    pub fn parse(s: &str) -> Option<Self> {
        OnyxType::CATALOGUE
            .iter()
            .copied()
            .find(|t| t.label() == s.to_lowercase())
    }
}

impl fmt::Display for OnyxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for OnyxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OnyxType::parse(s).ok_or_else(|| format!("unknown field type: {}", s))
    }
}
