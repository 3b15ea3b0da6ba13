//! Project and field permission checks.
//!
//! Field checks run in two stages. A caller without the access capability
//! on a field path is told the field is unknown, exactly as if it did not
//! exist; only once the field is visible are they told a specific action
//! is forbidden.

use std::collections::BTreeSet;

use tracing::debug;

use super::action::{Action, ObjectType};
use super::capabilities::UserContext;
use crate::error::{AccessError, FieldError};
use crate::fields::{DEFAULT_CUTOFF, DEFAULT_SUGGESTIONS, suggestions};

/// Permission checks for one user, project and object type.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGate<'a> {
    user: &'a UserContext,
    project: &'a str,
    object_type: ObjectType,
}

impl<'a> PermissionGate<'a> {
    pub fn new(user: &'a UserContext, project: &'a str, object_type: ObjectType) -> Self {
        Self {
            user,
            project,
            object_type,
        }
    }

    pub fn user(&self) -> &'a UserContext {
        self.user
    }

    pub fn project(&self) -> &'a str {
        self.project
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Checks the user may perform `action` on the project's objects.
    pub fn check_project(&self, action: Action) -> Result<(), AccessError> {
        let caps = self.user.capabilities();

        if !caps.has_project_action(self.project, Action::Access) {
            debug!(user = %self.user.username(), project = %self.project, "Project not visible");
            return Err(AccessError::ProjectNotFound {
                project: self.project.to_string(),
            });
        }

        let granted = caps.has_project_action(self.project, action)
            && caps.has_object_action(self.project, self.object_type, action);
        if !granted {
            return Err(AccessError::Forbidden {
                project: self.project.to_string(),
                object_type: self.object_type,
                action,
            });
        }
        Ok(())
    }

    /// Checks the user may see `field_path`.
    pub fn check_field_visible(&self, action: Action, field_path: &str) -> Result<(), FieldError> {
        let caps = self.user.capabilities();
        if caps.has_field_action(self.project, self.object_type, Action::Access, field_path) {
            Ok(())
        } else {
            debug!(field = %field_path, "Field not visible");
            Err(self.unknown_field(action, field_path))
        }
    }

    /// Checks the user may perform `action` on `field_path`.
    pub fn check_field_access(&self, action: Action, field_path: &str) -> Result<(), FieldError> {
        self.check_field_visible(action, field_path)?;

        let caps = self.user.capabilities();
        if caps.has_field_action(self.project, self.object_type, action, field_path) {
            Ok(())
        } else {
            debug!(field = %field_path, action = %action, "Field action forbidden");
            Err(FieldError::ForbiddenAction {
                field: field_path.to_string(),
                action,
            })
        }
    }

    /// Field paths the user may perform `action` on.
    pub fn available_fields(&self, action: Action) -> BTreeSet<String> {
        self.user
            .capabilities()
            .fields(self.project, self.object_type, action)
    }

    /// An unknown-field error suggesting only fields available for `action`.
    pub fn unknown_field(&self, action: Action, field: &str) -> FieldError {
        let available = self.available_fields(action);
        FieldError::UnknownField {
            field: field.to_string(),
            suggestions: suggestions(
                field,
                available.iter().map(String::as_str),
                DEFAULT_SUGGESTIONS,
                DEFAULT_CUTOFF,
            ),
        }
    }
}
