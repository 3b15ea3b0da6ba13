//! Structured capabilities and per-user capability sets.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::action::{Action, ObjectType};
use super::permission::{get_permission, parse_permission};
use crate::error::PermissionError;

/// A single granted capability.
///
/// Coarser capabilities leave `object_type` and `field` unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capability {
    pub action: Action,
    pub project: String,
    pub object_type: Option<ObjectType>,
    pub field: Option<String>,
}

impl Capability {
    /// A project-level capability.
    pub fn project(action: Action, project: impl Into<String>) -> Self {
        Self {
            action,
            project: project.into(),
            object_type: None,
            field: None,
        }
    }

    /// An object-level capability.
    pub fn object(action: Action, project: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            action,
            project: project.into(),
            object_type: Some(object_type),
            field: None,
        }
    }

    /// A field-level capability.
    pub fn field(
        action: Action,
        project: impl Into<String>,
        object_type: ObjectType,
        field: impl Into<String>,
    ) -> Self {
        Self {
            action,
            project: project.into(),
            object_type: Some(object_type),
            field: Some(field.into()),
        }
    }

    /// Encodes the capability as a permission string.
    pub fn to_permission(&self, app_label: &str) -> Result<String, PermissionError> {
        get_permission(
            app_label,
            self.action.label(),
            &self.project,
            self.object_type.map(|o| o.label()),
            self.field.as_deref(),
        )
    }

    /// Decodes a permission string, returning its app label and capability.
    pub fn from_permission(permission: &str) -> Result<(String, Self), PermissionError> {
        let parsed = parse_permission(permission)?;

        let action = Action::parse(&parsed.action).ok_or_else(|| {
            PermissionError::UnknownAction {
                action: parsed.action.clone(),
            }
        })?;
        let object_type = parsed
            .object_type
            .as_deref()
            .map(|label| {
                ObjectType::parse(label).ok_or_else(|| PermissionError::UnknownObjectType {
                    object_type: label.to_string(),
                })
            })
            .transpose()?;

        Ok((
            parsed.app_label,
            Self {
                action,
                project: parsed.project,
                object_type,
                field: parsed.field,
            },
        ))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.action, self.project)?;
        if let Some(object_type) = self.object_type {
            write!(f, "_{}", object_type)?;
        }
        if let Some(field) = &self.field {
            write!(f, "__{}", field)?;
        }
        Ok(())
    }
}

type ObjectKey = (String, ObjectType);

/// An indexed set of capabilities.
///
/// Field grants are indexed by (project, object type, action) so that both
/// membership checks and "which fields can this user filter on" scans avoid
/// walking the whole set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySet {
    projects: HashMap<String, HashSet<Action>>,
    objects: HashMap<ObjectKey, HashSet<Action>>,
    fields: HashMap<ObjectKey, HashMap<Action, BTreeSet<String>>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> CapabilitySetBuilder {
        CapabilitySetBuilder::default()
    }

    /// Builds a set from permission strings, ignoring their app labels.
    pub fn from_permissions<I, S>(permissions: I) -> Result<Self, PermissionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for permission in permissions {
            let (_, capability) = Capability::from_permission(permission.as_ref())?;
            set.insert(capability);
        }
        Ok(set)
    }

    /// The union of several sets, as granted through group membership.
    pub fn union_of<'a, I>(sets: I) -> Self
    where
        I: IntoIterator<Item = &'a CapabilitySet>,
    {
        let mut union = Self::new();
        for set in sets {
            union.merge(set);
        }
        union
    }

    pub fn insert(&mut self, capability: Capability) {
        match (capability.object_type, capability.field) {
            (None, _) => {
                self.projects
                    .entry(capability.project)
                    .or_default()
                    .insert(capability.action);
            }
            (Some(object_type), None) => {
                self.objects
                    .entry((capability.project, object_type))
                    .or_default()
                    .insert(capability.action);
            }
            (Some(object_type), Some(field)) => {
                self.fields
                    .entry((capability.project, object_type))
                    .or_default()
                    .entry(capability.action)
                    .or_default()
                    .insert(field);
            }
        }
    }

    /// Adds every capability of another set.
    pub fn merge(&mut self, other: &CapabilitySet) {
        for capability in other.iter() {
            self.insert(capability);
        }
    }

    pub fn contains(&self, capability: &Capability) -> bool {
        match (capability.object_type, capability.field.as_deref()) {
            (None, _) => self.has_project_action(&capability.project, capability.action),
            (Some(object_type), None) => {
                self.has_object_action(&capability.project, object_type, capability.action)
            }
            (Some(object_type), Some(field)) => self.has_field_action(
                &capability.project,
                object_type,
                capability.action,
                field,
            ),
        }
    }

    pub fn has_project_action(&self, project: &str, action: Action) -> bool {
        self.projects
            .get(project)
            .is_some_and(|actions| actions.contains(&action))
    }

    pub fn has_object_action(&self, project: &str, object_type: ObjectType, action: Action) -> bool {
        self.objects
            .get(&(project.to_string(), object_type))
            .is_some_and(|actions| actions.contains(&action))
    }

    pub fn has_field_action(
        &self,
        project: &str,
        object_type: ObjectType,
        action: Action,
        field: &str,
    ) -> bool {
        self.fields
            .get(&(project.to_string(), object_type))
            .and_then(|by_action| by_action.get(&action))
            .is_some_and(|fields| fields.contains(field))
    }

    /// Field paths granted for an action, in sorted order.
    pub fn fields(&self, project: &str, object_type: ObjectType, action: Action) -> BTreeSet<String> {
        self.fields
            .get(&(project.to_string(), object_type))
            .and_then(|by_action| by_action.get(&action))
            .cloned()
            .unwrap_or_default()
    }

    /// Actions granted on a field path.
    pub fn field_actions(&self, project: &str, object_type: ObjectType, field: &str) -> Vec<Action> {
        let Some(by_action) = self.fields.get(&(project.to_string(), object_type)) else {
            return Vec::new();
        };
        Action::ALL
            .into_iter()
            .filter(|action| {
                by_action
                    .get(action)
                    .is_some_and(|fields| fields.contains(field))
            })
            .collect()
    }

    /// Iterates over every capability in the set.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        let projects = self.projects.iter().flat_map(|(project, actions)| {
            actions
                .iter()
                .map(move |action| Capability::project(*action, project.clone()))
        });
        let objects = self.objects.iter().flat_map(|((project, object_type), actions)| {
            actions
                .iter()
                .map(move |action| Capability::object(*action, project.clone(), *object_type))
        });
        let fields = self.fields.iter().flat_map(|((project, object_type), by_action)| {
            by_action.iter().flat_map(move |(action, fields)| {
                fields.iter().map(move |field| {
                    Capability::field(*action, project.clone(), *object_type, field.clone())
                })
            })
        });
        projects.chain(objects).chain(fields)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.objects.is_empty() && self.fields.is_empty()
    }

    /// Encodes every capability as a sorted list of permission strings.
    pub fn to_permissions(&self, app_label: &str) -> Result<Vec<String>, PermissionError> {
        let mut permissions = self
            .iter()
            .map(|capability| capability.to_permission(app_label))
            .collect::<Result<Vec<_>, _>>()?;
        permissions.sort();
        Ok(permissions)
    }
}

/// Builder for capability sets.
#[derive(Default)]
pub struct CapabilitySetBuilder {
    set: CapabilitySet,
}

impl CapabilitySetBuilder {
    /// Grants an action on a project and on one of its object types.
    pub fn grant_object(mut self, project: &str, object_type: ObjectType, action: Action) -> Self {
        self.set.insert(Capability::project(Action::Access, project));
        self.set.insert(Capability::project(action, project));
        self.set
            .insert(Capability::object(Action::Access, project, object_type));
        self.set.insert(Capability::object(action, project, object_type));
        self
    }

    /// Grants an action on fields, together with access to them.
    pub fn grant_fields<I, S>(
        mut self,
        project: &str,
        object_type: ObjectType,
        action: Action,
        fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self = self.grant_object(project, object_type, action);
        for field in fields {
            let field = field.into();
            self.set.insert(Capability::field(
                Action::Access,
                project,
                object_type,
                field.clone(),
            ));
            self.set
                .insert(Capability::field(action, project, object_type, field));
        }
        self
    }

    /// Grants only visibility of fields.
    pub fn grant_access<I, S>(self, project: &str, object_type: ObjectType, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant_fields(project, object_type, Action::Access, fields)
    }

    /// Adds a single capability.
    pub fn capability(mut self, capability: Capability) -> Self {
        self.set.insert(capability);
        self
    }

    pub fn build(self) -> CapabilitySet {
        self.set
    }
}

/// The caller of a request and the capabilities granted to them.
#[derive(Debug, Clone)]
pub struct UserContext {
    username: String,
    capabilities: Arc<CapabilitySet>,
}

impl UserContext {
    pub fn new(username: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            username: username.into(),
            capabilities: Arc::new(capabilities),
        }
    }

    /// A user whose capabilities are the union of their groups' grants.
    pub fn from_groups<'a, I>(username: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = &'a CapabilitySet>,
    {
        Self::new(username, CapabilitySet::union_of(groups))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}
