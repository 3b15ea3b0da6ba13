//! Query documents: nested boolean expressions over field/value atoms.
//!
//! A document is a single-key JSON object. The key is an operator (`&`,
//! `|`, `^` taking a list of documents, `~` taking one document) or a
//! field key with an optional lookup suffix, whose value is a string,
//! number, boolean or null.

use std::fmt;

use serde_json::Value as JsonValue;

use crate::config::QueryConfig;
use crate::error::StructureError;

pub const AND: &str = "&";
pub const OR: &str = "|";
pub const XOR: &str = "^";
pub const NOT: &str = "~";

/// Query parameters that never name a field.
pub const RESERVED_PARAMS: [&str; 5] = ["cursor", "include", "exclude", "summarise", "search"];

/// A field key and its raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAtom {
    pub key: String,
    pub value: String,
}

impl QueryAtom {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A node of a query document.
///
/// The root node is the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Atom(QueryAtom),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Xor(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

/// A parsed query document.
pub type QueryDocument = QueryNode;

impl QueryNode {
    pub fn atom(key: impl Into<String>, value: impl Into<String>) -> Self {
        QueryNode::Atom(QueryAtom::new(key, value))
    }

    /// Parses and structurally validates a JSON document.
    pub fn parse(value: &JsonValue, config: &QueryConfig) -> Result<Self, StructureError> {
        parse_node(value, config, 1)
    }

    pub fn parse_str(json: &str, config: &QueryConfig) -> Result<Self, StructureError> {
        let value: JsonValue =
            serde_json::from_str(json).map_err(|e| StructureError::InvalidJson {
                message: e.to_string(),
            })?;
        Self::parse(&value, config)
    }

    /// Builds the implicit AND of `field[__lookup]=value` parameters.
    ///
    /// Reserved parameters are skipped. Returns None when no field
    /// parameters remain.
    pub fn from_params<I, K, V>(params: I, config: &QueryConfig) -> Result<Option<Self>, StructureError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut atoms = Vec::new();
        for (key, value) in params {
            let key = key.as_ref();
            if RESERVED_PARAMS.contains(&key) {
                continue;
            }
            if key.is_empty() {
                return Err(StructureError::EmptyField);
            }
            atoms.push(QueryNode::atom(key, value.as_ref()));
        }

        if atoms.is_empty() {
            return Ok(None);
        }
        if atoms.len() > config.max_iterable_input {
            return Err(StructureError::TooManyOperands {
                operator: AND.to_string(),
                found: atoms.len(),
                max: config.max_iterable_input,
            });
        }
        Ok(Some(QueryNode::And(atoms)))
    }

    /// Atoms in document order.
    pub fn atoms(&self) -> Vec<&QueryAtom> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a QueryAtom>) {
        match self {
            QueryNode::Atom(atom) => out.push(atom),
            QueryNode::And(children) | QueryNode::Or(children) | QueryNode::Xor(children) => {
                for child in children {
                    child.collect_atoms(out);
                }
            }
            QueryNode::Not(child) => child.collect_atoms(out),
        }
    }

    /// Converts back to the JSON document form.
    pub fn to_json(&self) -> JsonValue {
        let (key, value) = match self {
            QueryNode::Atom(atom) => (atom.key.as_str(), JsonValue::String(atom.value.clone())),
            QueryNode::And(children) => (AND, children_json(children)),
            QueryNode::Or(children) => (OR, children_json(children)),
            QueryNode::Xor(children) => (XOR, children_json(children)),
            QueryNode::Not(child) => (NOT, child.to_json()),
        };
        let mut map = serde_json::Map::new();
        map.insert(key.to_string(), value);
        JsonValue::Object(map)
    }
}

fn children_json(children: &[QueryNode]) -> JsonValue {
    JsonValue::Array(children.iter().map(QueryNode::to_json).collect())
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

fn parse_node(value: &JsonValue, config: &QueryConfig, depth: usize) -> Result<QueryNode, StructureError> {
    if depth > config.max_query_depth {
        return Err(StructureError::TooDeep {
            max: config.max_query_depth,
        });
    }

    let map = value.as_object().ok_or(StructureError::NotAnObject)?;
    if map.len() != 1 {
        return Err(StructureError::WrongArity { found: map.len() });
    }
    let Some((key, operand)) = map.iter().next() else {
        return Err(StructureError::WrongArity { found: 0 });
    };

    match key.as_str() {
        AND | OR | XOR => {
            let items = operand.as_array().ok_or_else(|| StructureError::ExpectedList {
                operator: key.clone(),
            })?;
            if items.is_empty() {
                return Err(StructureError::EmptyOperands {
                    operator: key.clone(),
                });
            }
            if items.len() > config.max_iterable_input {
                return Err(StructureError::TooManyOperands {
                    operator: key.clone(),
                    found: items.len(),
                    max: config.max_iterable_input,
                });
            }
            let children = items
                .iter()
                .map(|item| parse_node(item, config, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match key.as_str() {
                AND => QueryNode::And(children),
                OR => QueryNode::Or(children),
                _ => QueryNode::Xor(children),
            })
        }
        NOT => {
            if !operand.is_object() {
                return Err(StructureError::ExpectedQuery {
                    operator: key.clone(),
                });
            }
            Ok(QueryNode::Not(Box::new(parse_node(operand, config, depth + 1)?)))
        }
        "" => Err(StructureError::EmptyField),
        field => atom_value(field, operand).map(|value| QueryNode::atom(field, value)),
    }
}

/// Renders an atom value as the string the coercers expect.
fn atom_value(field: &str, value: &JsonValue) -> Result<String, StructureError> {
    match value {
        JsonValue::Null => Ok(String::new()),
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Bool(true) => Ok("True".to_string()),
        JsonValue::Bool(false) => Ok("False".to_string()),
        JsonValue::Number(n) => Ok(n.to_string()),
        _ => Err(StructureError::InvalidAtomValue {
            field: field.to_string(),
        }),
    }
}
