//! Permission string encoding.
//!
//! Permission strings are the serialization boundary with the capability
//! store:
//!
//! ```text
//! app.<action>_<project>
//! app.<action>_<project>_<objectType>
//! app.<action>_<project>_<objectType>__<fieldPath>
//! ```
//!
//! Encoding and decoding round-trip for every input [`get_permission`]
//! accepts.

use crate::error::PermissionError;

/// A permission string split into its components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionCodename {
    pub app_label: String,
    pub action: String,
    pub project: String,
    pub object_type: Option<String>,
    pub field: Option<String>,
}

fn invalid(component: &str, value: &str) -> PermissionError {
    PermissionError::InvalidComponent {
        component: component.to_string(),
        value: value.to_string(),
    }
}

/// Builds a permission string.
pub fn get_permission(
    app_label: &str,
    action: &str,
    project: &str,
    object_type: Option<&str>,
    field: Option<&str>,
) -> Result<String, PermissionError> {
    let described = || format!("{}.{}_{}", app_label, action, project);

    if app_label.is_empty() {
        return Err(PermissionError::MissingAppLabel {
            permission: described(),
        });
    }
    if action.is_empty() {
        return Err(PermissionError::MissingAction {
            permission: described(),
        });
    }
    if project.is_empty() {
        return Err(PermissionError::MissingProject {
            permission: described(),
        });
    }
    if app_label.contains('.') {
        return Err(invalid("app label", app_label));
    }
    if action.contains('_') || action.contains('.') {
        return Err(invalid("action", action));
    }
    if project.contains('_') || project.contains('.') {
        return Err(invalid("project", project));
    }

    let mut codename = format!("{}_{}", action, project);

    if let Some(object_type) = object_type {
        if object_type.is_empty()
            || object_type.contains("__")
            || object_type.starts_with('_')
            || object_type.ends_with('_')
        {
            return Err(invalid("object type", object_type));
        }
        codename.push('_');
        codename.push_str(object_type);
    }

    if let Some(field) = field {
        if object_type.is_none() {
            return Err(PermissionError::FieldWithoutObjectType {
                permission: format!("{}.{}__{}", app_label, codename, field),
            });
        }
        if field.is_empty() {
            return Err(invalid("field", field));
        }
        codename.push_str("__");
        codename.push_str(field);
    }

    Ok(format!("{}.{}", app_label, codename))
}

/// Splits a permission string into its components.
pub fn parse_permission(permission: &str) -> Result<PermissionCodename, PermissionError> {
    let err_permission = || permission.to_string();

    let (app_label, codename) =
        permission
            .split_once('.')
            .ok_or_else(|| PermissionError::MissingAppLabel {
                permission: err_permission(),
            })?;

    if app_label.is_empty() {
        return Err(PermissionError::MissingAppLabel {
            permission: err_permission(),
        });
    }

    let (head, field) = match codename.split_once("__") {
        Some((head, field)) => (head, Some(field)),
        None => (codename, None),
    };

    let mut parts = head.splitn(3, '_');
    let action = parts.next().unwrap_or_default();
    let project = parts.next().ok_or_else(|| PermissionError::MissingProject {
        permission: err_permission(),
    })?;
    let object_type = parts.next();

    if action.is_empty() {
        return Err(PermissionError::MissingAction {
            permission: err_permission(),
        });
    }
    if project.is_empty() {
        return Err(PermissionError::MissingProject {
            permission: err_permission(),
        });
    }
    if let Some(object_type) = object_type {
        if object_type.is_empty() {
            return Err(invalid("object type", object_type));
        }
    }
    if let Some(field) = field {
        if object_type.is_none() {
            return Err(PermissionError::FieldWithoutObjectType {
                permission: err_permission(),
            });
        }
        if field.is_empty() {
            return Err(invalid("field", field));
        }
    }

    Ok(PermissionCodename {
        app_label: app_label.to_string(),
        action: action.to_string(),
        project: project.to_string(),
        object_type: object_type.map(str::to_string),
        field: field.map(str::to_string),
    })
}
