//! Actions, object types and group scopes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Actions that can be granted on a project, object type or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// See that the project or field exists.
    Access,
    /// Explicitly hidden.
    NoAccess,
    /// Retrieve a single object.
    Get,
    /// List objects.
    List,
    /// Filter objects on a field.
    Filter,
    /// Read an object's history.
    History,
    /// Identify values.
    Identify,
    /// Create objects.
    Add,
    /// Validate a creation without saving.
    TestAdd,
    /// Update objects.
    Change,
    /// Validate an update without saving.
    TestChange,
    /// Delete objects.
    Delete,
}

impl Action {
    /// All actions in canonical order.
    pub const ALL: [Action; 12] = [
        Action::Access,
        Action::NoAccess,
        Action::Get,
        Action::List,
        Action::Filter,
        Action::History,
        Action::Identify,
        Action::Add,
        Action::TestAdd,
        Action::Change,
        Action::TestChange,
        Action::Delete,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Action::Access => "access",
            Action::NoAccess => "noaccess",
            Action::Get => "get",
            Action::List => "list",
            Action::Filter => "filter",
            Action::History => "history",
            Action::Identify => "identify",
            Action::Add => "add",
            Action::TestAdd => "testadd",
            Action::Change => "change",
            Action::TestChange => "testchange",
            Action::Delete => "delete",
        }
    }

    /// Verb phrase used in error messages.
    pub fn description(&self) -> &'static str {
        match self {
            Action::Access => "access",
            Action::NoAccess => "not access",
            Action::Get => "get",
            Action::List => "list",
            Action::Filter => "filter",
            Action::History => "get the history of",
            Action::Identify => "identify values from",
            Action::Add => "create",
            Action::TestAdd => "test creating",
            Action::Change => "update",
            Action::TestChange => "test updating",
            Action::Delete => "delete",
        }
    }

    /// Parses an action label, returning None for unknown labels.
    pub fn parse(s: &str) -> Option<Self> {
        Action::ALL.iter().copied().find(|a| a.label() == s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::parse(s).ok_or_else(|| format!("unknown action: {}", s))
    }
}

/// The kinds of object a project exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    #[default]
    Records,
    Analyses,
}

impl ObjectType {
    pub fn label(&self) -> &'static str {
        match self {
            ObjectType::Records => "records",
            ObjectType::Analyses => "analyses",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "records" => Some(ObjectType::Records),
            "analyses" => Some(ObjectType::Analyses),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Group scopes within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Admin,
    Uploader,
    Analyst,
}

impl Scope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Scope::Admin),
            "uploader" => Some(Scope::Uploader),
            "analyst" => Some(Scope::Analyst),
            _ => None,
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::parse(s).ok_or_else(|| format!("unknown scope: {}", s))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Admin => write!(f, "admin"),
            Scope::Uploader => write!(f, "uploader"),
            Scope::Analyst => write!(f, "analyst"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_labels_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.label()), Some(action));
            assert!(!action.label().contains('_'));
        }
        assert_eq!(Action::parse("no_access"), None);
    }

    #[test]
    fn test_action_serde_matches_label() {
        for action in Action::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.label()));
        }
    }

    #[test]
    fn test_object_type() {
        assert_eq!(ObjectType::parse("analyses"), Some(ObjectType::Analyses));
        assert_eq!(ObjectType::default().to_string(), "records");
        assert_eq!(ObjectType::parse("Records"), None);
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("uploader".parse::<Scope>(), Ok(Scope::Uploader));
        assert_eq!(Scope::Analyst.to_string(), "analyst");
        assert!("owner".parse::<Scope>().is_err());
    }
}
