//! Typed predicate trees handed to the storage backends.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use crate::fields::{RelationHop, ResolvedField};
use crate::types::{OnyxType, Value};

/// A function applied to the stored value before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Calendar year of a date.
    Year,
    /// ISO 8601 week-numbering year of a date.
    IsoYear,
    /// ISO 8601 week number of a date.
    Week,
    /// Number of characters of text, or items of an array.
    Length,
}

impl Transform {
    pub fn label(&self) -> &'static str {
        match self {
            Transform::Year => "year",
            Transform::IsoYear => "iso_year",
            Transform::Week => "week",
            Transform::Length => "length",
        }
    }
}

/// A comparison operator with its typed operand.
///
/// `Contains`, `ContainedBy` and `Overlap` take text for text fields, an
/// array for array fields and a JSON object for structures.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Exact(Value),
    IExact(String),
    In(Vec<Value>),
    Contains(Value),
    IContains(String),
    StartsWith(String),
    IStartsWith(String),
    EndsWith(String),
    IEndsWith(String),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Range(Value, Value),
    IsNull,
    ContainedBy(Value),
    Overlap(Value),
    HasKey(String),
    HasKeys(Vec<String>),
    HasAnyKeys(Vec<String>),
}

impl Operator {
    pub fn label(&self) -> &'static str {
        match self {
            Operator::Exact(_) => "exact",
            Operator::IExact(_) => "iexact",
            Operator::In(_) => "in",
            Operator::Contains(_) => "contains",
            Operator::IContains(_) => "icontains",
            Operator::StartsWith(_) => "startswith",
            Operator::IStartsWith(_) => "istartswith",
            Operator::EndsWith(_) => "endswith",
            Operator::IEndsWith(_) => "iendswith",
            Operator::Lt(_) => "lt",
            Operator::Lte(_) => "lte",
            Operator::Gt(_) => "gt",
            Operator::Gte(_) => "gte",
            Operator::Range(_, _) => "range",
            Operator::IsNull => "isnull",
            Operator::ContainedBy(_) => "contained_by",
            Operator::Overlap(_) => "overlap",
            Operator::HasKey(_) => "has_key",
            Operator::HasKeys(_) => "has_keys",
            Operator::HasAnyKeys(_) => "has_any_keys",
        }
    }
}

/// The storage-facing description of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// `__`-joined field path from the root model.
    pub path: String,
    /// Column holding the value.
    pub column: String,
    /// Table holding the column.
    pub table: String,
    pub onyx_type: OnyxType,
    /// Relations crossed from the root table, outermost first.
    pub hops: Vec<RelationHop>,
    /// Set when the field is itself a relation.
    pub target: Option<RelationHop>,
}

impl From<&ResolvedField> for FieldRef {
    fn from(field: &ResolvedField) -> Self {
        Self {
            path: field.path.clone(),
            column: field.name.clone(),
            table: field.table.clone(),
            onyx_type: field.onyx_type,
            hops: field.hops.clone(),
            target: field.target.clone(),
        }
    }
}

/// A single-field test.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: FieldRef,
    pub transform: Option<Transform>,
    pub op: Operator,
}

/// A boolean combination of comparisons.
///
/// Comparisons through to-many relations hold when any related row
/// satisfies them. A comparison against a NULL value is false.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    Compare(Comparison),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// True when an odd number of children are true.
    Xor(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: FieldRef, transform: Option<Transform>, op: Operator) -> Self {
        Predicate::Compare(Comparison {
            field,
            transform,
            op,
        })
    }

    /// Conjunction. Empty input is true.
    pub fn all<I: IntoIterator<Item = Predicate>>(predicates: I) -> Self {
        let mut children: Vec<Predicate> = predicates.into_iter().collect();
        match children.len() {
            0 => Predicate::True,
            1 => children.remove(0),
            _ => Predicate::And(children),
        }
    }

    /// Disjunction. Empty input is false.
    pub fn any<I: IntoIterator<Item = Predicate>>(predicates: I) -> Self {
        let mut children: Vec<Predicate> = predicates.into_iter().collect();
        match children.len() {
            0 => Predicate::False,
            1 => children.remove(0),
            _ => Predicate::Or(children),
        }
    }

    /// Odd parity. Empty input is false.
    pub fn parity<I: IntoIterator<Item = Predicate>>(predicates: I) -> Self {
        let mut children: Vec<Predicate> = predicates.into_iter().collect();
        match children.len() {
            0 => Predicate::False,
            1 => children.remove(0),
            _ => Predicate::Xor(children),
        }
    }

    /// Paths of every field the predicate compares, sorted.
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::True | Predicate::False => {}
            Predicate::Compare(comparison) => {
                out.insert(comparison.field.path.as_str());
            }
            Predicate::And(children) | Predicate::Or(children) | Predicate::Xor(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Predicate::Not(child) => child.collect_fields(out),
        }
    }

    /// Evaluates the tree given the truth of each comparison.
    pub fn evaluate<F>(&self, compare: &mut F) -> bool
    where
        F: FnMut(&Comparison) -> bool,
    {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::Compare(comparison) => compare(comparison),
            Predicate::And(children) => children.iter().all(|c| c.evaluate(compare)),
            Predicate::Or(children) => children.iter().any(|c| c.evaluate(compare)),
            Predicate::Xor(children) => {
                children.iter().filter(|c| c.evaluate(compare)).count() % 2 == 1
            }
            Predicate::Not(child) => !child.evaluate(compare),
        }
    }
}

/// Combines two predicates, splicing in the children of either side that
/// is already the same combinator.
fn join(
    lhs: Predicate,
    rhs: Predicate,
    wrap: fn(Vec<Predicate>) -> Predicate,
    unwrap: fn(Predicate) -> Result<Vec<Predicate>, Predicate>,
) -> Predicate {
    let mut children = Vec::new();
    for side in [lhs, rhs] {
        match unwrap(side) {
            Ok(inner) => children.extend(inner),
            Err(other) => children.push(other),
        }
    }
    wrap(children)
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        join(self, rhs, Predicate::And, |p| match p {
            Predicate::And(children) => Ok(children),
            other => Err(other),
        })
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        join(self, rhs, Predicate::Or, |p| match p {
            Predicate::Or(children) => Ok(children),
            other => Err(other),
        })
    }
}

impl BitXor for Predicate {
    type Output = Predicate;

    fn bitxor(self, rhs: Predicate) -> Predicate {
        join(self, rhs, Predicate::Xor, |p| match p {
            Predicate::Xor(children) => Ok(children),
            other => Err(other),
        })
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        match self {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }
}

fn operand_text(op: &Operator) -> Option<String> {
    let list = |values: &[Value]| {
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    match op {
        Operator::IsNull => None,
        Operator::Exact(v)
        | Operator::Contains(v)
        | Operator::Lt(v)
        | Operator::Lte(v)
        | Operator::Gt(v)
        | Operator::Gte(v)
        | Operator::ContainedBy(v)
        | Operator::Overlap(v) => Some(format!("{:?}", v.to_string())),
        Operator::IExact(s)
        | Operator::IContains(s)
        | Operator::StartsWith(s)
        | Operator::IStartsWith(s)
        | Operator::EndsWith(s)
        | Operator::IEndsWith(s)
        | Operator::HasKey(s) => Some(format!("{:?}", s)),
        Operator::In(values) => Some(format!("[{}]", list(values))),
        Operator::Range(low, high) => Some(format!("[{}, {}]", low, high)),
        Operator::HasKeys(keys) | Operator::HasAnyKeys(keys) => {
            Some(format!("[{}]", keys.join(", ")))
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field.path)?;
        if let Some(transform) = self.transform {
            write!(f, "__{}", transform.label())?;
        }
        write!(f, "__{}", self.op.label())?;
        if let Some(operand) = operand_text(&self.op) {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, children: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::False => write!(f, "FALSE"),
            Predicate::Compare(comparison) => write!(f, "{}", comparison),
            Predicate::And(children) => write_children(f, children, "AND"),
            Predicate::Or(children) => write_children(f, children, "OR"),
            Predicate::Xor(children) => write_children(f, children, "XOR"),
            Predicate::Not(child) => write!(f, "NOT {}", child),
        }
    }
}
