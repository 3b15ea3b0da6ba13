//! Per-project choice values and their constraints.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ChoiceError, FieldError};
use crate::fields::{DEFAULT_CUTOFF, suggestions, with_suggestions};
use crate::schema::{ChoiceConstraintConfig, ChoiceOption};

/// Identifies a choice value within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoiceKey {
    pub field: String,
    pub value: String,
}

impl ChoiceKey {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ChoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}

/// A stored choice value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceValue {
    pub project: String,
    pub field: String,
    pub value: String,
    pub description: String,
    pub is_active: bool,
    pub constraints: BTreeSet<ChoiceKey>,
}

impl ChoiceValue {
    pub fn key(&self) -> ChoiceKey {
        ChoiceKey::new(self.field.clone(), self.value.clone())
    }
}

/// A change made while syncing a field's choices with configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceChange {
    Created { field: String, value: String },
    Reactivated { field: String, value: String },
    Renamed { field: String, from: String, to: String },
    DescriptionChanged { field: String, value: String },
    Deactivated { field: String, value: String },
}

#[derive(Debug, Default)]
struct ProjectChoices {
    fields: HashMap<String, Vec<ChoiceValue>>,
}

impl ProjectChoices {
    fn find(&self, field: &str, value: &str) -> Option<&ChoiceValue> {
        let value = value.trim().to_lowercase();
        self.fields
            .get(field)?
            .iter()
            .find(|c| c.value.to_lowercase() == value)
    }

    fn find_mut(&mut self, key: &ChoiceKey) -> Option<&mut ChoiceValue> {
        self.fields
            .get_mut(&key.field)?
            .iter_mut()
            .find(|c| c.value == key.value)
    }

    fn values(&self) -> impl Iterator<Item = &ChoiceValue> {
        self.fields.values().flatten()
    }

    fn rename_references(&mut self, field: &str, from: &str, to: &str) {
        let old = ChoiceKey::new(field, from);
        for choice in self.fields.values_mut().flatten() {
            if choice.constraints.remove(&old) {
                choice.constraints.insert(ChoiceKey::new(field, to));
            }
        }
    }
}

/// Thread-safe registry of choice values, keyed by project.
///
/// Requests only read from the registry; configuration syncs take the write
/// lock for the duration of one field or one constraint update.
#[derive(Default)]
pub struct ChoiceRegistry {
    projects: RwLock<HashMap<String, ProjectChoices>>,
}

impl ChoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active values of a field.
    pub fn valid_values(&self, project: &str, field: &str) -> BTreeSet<String> {
        self.values_where(project, field, |c| c.is_active)
    }

    /// Active and inactive values of a field.
    pub fn all_values(&self, project: &str, field: &str) -> BTreeSet<String> {
        self.values_where(project, field, |_| true)
    }

    fn values_where(
        &self,
        project: &str,
        field: &str,
        keep: impl Fn(&ChoiceValue) -> bool,
    ) -> BTreeSet<String> {
        let projects = self.projects.read();
        projects
            .get(project)
            .and_then(|p| p.fields.get(field))
            .map(|choices| {
                choices
                    .iter()
                    .filter(|c| keep(c))
                    .map(|c| c.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of a field's stored choices.
    pub fn choices(&self, project: &str, field: &str) -> Vec<ChoiceValue> {
        let projects = self.projects.read();
        projects
            .get(project)
            .and_then(|p| p.fields.get(field))
            .cloned()
            .unwrap_or_default()
    }

    /// Maps a raw value to its stored casing.
    ///
    /// Matching trims whitespace and ignores case. Only active values match.
    pub fn normalize(&self, project: &str, field: &str, raw: &str) -> Result<String, FieldError> {
        let wanted = raw.trim().to_lowercase();
        let active = self.valid_values(project, field);

        if let Some(found) = active.iter().find(|v| v.to_lowercase() == wanted) {
            return Ok(found.clone());
        }

        let prefix = format!(
            "Select a valid choice. '{}' is not one of the available choices.",
            raw
        );
        let suggested = suggestions(raw.trim(), active.iter().map(String::as_str), 1, DEFAULT_CUTOFF);
        Err(FieldError::invalid_value(
            raw,
            with_suggestions(&prefix, &suggested),
        ))
    }

    /// Syncs a field's stored choices with its configured options.
    ///
    /// Existing values are matched case-insensitively. Matches are
    /// reactivated, renamed to the configured casing and given the
    /// configured description; new options are created; stored values no
    /// longer configured are deactivated, never removed.
    pub fn sync_choices(
        &self,
        project: &str,
        field: &str,
        options: &[ChoiceOption],
    ) -> Result<Vec<ChoiceChange>, ChoiceError> {
        let mut listed = HashSet::new();
        for option in options {
            let value = option.value().trim();
            if value.is_empty() {
                return Err(ChoiceError::EmptyValue {
                    project: project.to_string(),
                    field: field.to_string(),
                });
            }
            if !listed.insert(value.to_lowercase()) {
                return Err(ChoiceError::DuplicateChoice {
                    project: project.to_string(),
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }

        let mut projects = self.projects.write();
        let project_choices = projects.entry(project.to_string()).or_default();
        let mut changes = Vec::new();
        let mut renames = Vec::new();

        {
            let stored = project_choices.fields.entry(field.to_string()).or_default();

            for option in options {
                let value = option.value().trim();
                let lowered = value.to_lowercase();

                match stored.iter_mut().find(|c| c.value.to_lowercase() == lowered) {
                    Some(choice) => {
                        if !choice.is_active {
                            choice.is_active = true;
                            changes.push(ChoiceChange::Reactivated {
                                field: field.to_string(),
                                value: value.to_string(),
                            });
                        }
                        if choice.value != value {
                            renames.push((choice.value.clone(), value.to_string()));
                            changes.push(ChoiceChange::Renamed {
                                field: field.to_string(),
                                from: choice.value.clone(),
                                to: value.to_string(),
                            });
                            choice.value = value.to_string();
                        }
                        if let Some(description) = option.description() {
                            if choice.description != description {
                                choice.description = description.to_string();
                                changes.push(ChoiceChange::DescriptionChanged {
                                    field: field.to_string(),
                                    value: value.to_string(),
                                });
                            }
                        }
                    }
                    None => {
                        stored.push(ChoiceValue {
                            project: project.to_string(),
                            field: field.to_string(),
                            value: value.to_string(),
                            description: option.description().unwrap_or_default().to_string(),
                            is_active: true,
                            constraints: BTreeSet::new(),
                        });
                        changes.push(ChoiceChange::Created {
                            field: field.to_string(),
                            value: value.to_string(),
                        });
                    }
                }
            }

            for choice in stored.iter_mut() {
                if choice.is_active && !listed.contains(&choice.value.to_lowercase()) {
                    choice.is_active = false;
                    changes.push(ChoiceChange::Deactivated {
                        field: field.to_string(),
                        value: choice.value.clone(),
                    });
                }
            }
        }

        for (from, to) in renames {
            project_choices.rename_references(field, &from, &to);
        }

        for change in &changes {
            info!(project = %project, change = ?change, "Choice updated");
        }
        Ok(changes)
    }

    /// Replaces a project's constraints with the configured ones.
    ///
    /// Every configured link is stored in both directions.
    pub fn set_constraints(
        &self,
        project: &str,
        configs: &[ChoiceConstraintConfig],
    ) -> Result<(), ChoiceError> {
        let mut projects = self.projects.write();
        let project_choices = projects.entry(project.to_string()).or_default();

        let mut links = Vec::new();
        for config in configs {
            let source = resolve_key(project_choices, project, &config.field, &config.option)?;
            for target in &config.constraints {
                for option in &target.options {
                    let target_key =
                        resolve_key(project_choices, project, &target.field, option.value())?;
                    links.push((source.clone(), target_key));
                }
            }
        }

        for choice in project_choices.fields.values_mut().flatten() {
            choice.constraints.clear();
        }

        for (a, b) in links {
            if let Some(choice) = project_choices.find_mut(&a) {
                choice.constraints.insert(b.clone());
            }
            if let Some(choice) = project_choices.find_mut(&b) {
                choice.constraints.insert(a);
            }
        }

        debug!(project = %project, "Choice constraints set");
        Ok(())
    }

    /// Adds a single one-directional constraint.
    pub fn link(&self, project: &str, from: &ChoiceKey, to: &ChoiceKey) -> Result<(), ChoiceError> {
        let mut projects = self.projects.write();
        let project_choices = projects.entry(project.to_string()).or_default();
        let from = resolve_key(project_choices, project, &from.field, &from.value)?;
        let to = resolve_key(project_choices, project, &to.field, &to.value)?;
        if let Some(choice) = project_choices.find_mut(&from) {
            choice.constraints.insert(to);
        }
        Ok(())
    }

    /// Choices constrained by a value.
    pub fn constraints_for(&self, project: &str, field: &str, value: &str) -> Vec<ChoiceKey> {
        let projects = self.projects.read();
        projects
            .get(project)
            .and_then(|p| p.find(field, value))
            .map(|c| c.constraints.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Links A→B with no matching B→A.
    pub fn asymmetric_constraints(&self, project: &str) -> Vec<(ChoiceKey, ChoiceKey)> {
        let projects = self.projects.read();
        let Some(project_choices) = projects.get(project) else {
            return Vec::new();
        };

        let mut missing = Vec::new();
        for choice in project_choices.values() {
            let key = choice.key();
            for target in &choice.constraints {
                let reciprocal = project_choices
                    .fields
                    .get(&target.field)
                    .and_then(|values| values.iter().find(|c| c.value == target.value))
                    .is_some_and(|c| c.constraints.contains(&key));
                if !reciprocal {
                    missing.push((key.clone(), target.clone()));
                }
            }
        }
        missing.sort();
        missing
    }

    /// True when every constraint is reciprocated.
    pub fn set_constraints_consistent(&self, project: &str) -> bool {
        let missing = self.asymmetric_constraints(project);
        for (from, to) in &missing {
            warn!(project = %project, from = %from, to = %to, "Constraint is not reciprocated");
        }
        missing.is_empty()
    }
}

impl fmt::Debug for ChoiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let projects = self.projects.read();
        let mut codes: Vec<&String> = projects.keys().collect();
        codes.sort();
        f.debug_struct("ChoiceRegistry")
            .field("projects", &codes)
            .finish()
    }
}

fn resolve_key(
    choices: &ProjectChoices,
    project: &str,
    field: &str,
    value: &str,
) -> Result<ChoiceKey, ChoiceError> {
    choices
        .find(field, value)
        .map(ChoiceValue::key)
        .ok_or_else(|| ChoiceError::UnknownChoice {
            project: project.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ChoiceConfig;

    fn plain(values: &[&str]) -> Vec<ChoiceOption> {
        values.iter().map(|v| ChoiceOption::Plain(v.to_string())).collect()
    }

    fn registry() -> ChoiceRegistry {
        let registry = ChoiceRegistry::new();
        registry
            .sync_choices("mpx", "country", &plain(&["eng", "scot", "wales", "ni"]))
            .unwrap();
        registry
            .sync_choices("mpx", "region", &plain(&["ne", "nw", "se"]))
            .unwrap();
        registry
    }

    #[test]
    fn test_normalize_case_and_whitespace() {
        let registry = registry();
        assert_eq!(registry.normalize("mpx", "country", "ENG").unwrap(), "eng");
        assert_eq!(registry.normalize("mpx", "country", "  Scot ").unwrap(), "scot");
    }

    #[test]
    fn test_normalize_invalid_suggests() {
        let registry = registry();
        let err = registry.normalize("mpx", "country", "ing").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Select a valid choice. 'ing'"));
        assert!(message.ends_with("Perhaps you meant: eng"));
    }

    #[test]
    fn test_sync_lifecycle() {
        let registry = registry();
        let changes = registry
            .sync_choices(
                "mpx",
                "country",
                &[
                    ChoiceOption::Plain("ENG".into()),
                    ChoiceOption::Described {
                        choice: "scot".into(),
                        description: "Scotland".into(),
                    },
                    ChoiceOption::Plain("wales".into()),
                ],
            )
            .unwrap();

        assert!(changes.contains(&ChoiceChange::Renamed {
            field: "country".into(),
            from: "eng".into(),
            to: "ENG".into()
        }));
        assert!(changes.contains(&ChoiceChange::DescriptionChanged {
            field: "country".into(),
            value: "scot".into()
        }));
        assert!(changes.contains(&ChoiceChange::Deactivated {
            field: "country".into(),
            value: "ni".into()
        }));

        assert!(!registry.valid_values("mpx", "country").contains("ni"));
        assert!(registry.all_values("mpx", "country").contains("ni"));
        assert!(registry.normalize("mpx", "country", "ni").is_err());

        let changes = registry
            .sync_choices("mpx", "country", &plain(&["ENG", "scot", "wales", "ni"]))
            .unwrap();
        assert_eq!(
            changes,
            vec![ChoiceChange::Reactivated {
                field: "country".into(),
                value: "ni".into()
            }]
        );
    }

    #[test]
    fn test_sync_rejects_duplicates_and_blanks() {
        let registry = ChoiceRegistry::new();
        assert!(matches!(
            registry.sync_choices("mpx", "country", &plain(&["eng", "ENG"])),
            Err(ChoiceError::DuplicateChoice { .. })
        ));
        assert!(matches!(
            registry.sync_choices("mpx", "country", &plain(&[" "])),
            Err(ChoiceError::EmptyValue { .. })
        ));
    }

    #[test]
    fn test_constraints_are_symmetric() {
        let registry = registry();
        registry
            .set_constraints(
                "mpx",
                &[ChoiceConstraintConfig {
                    field: "country".into(),
                    option: "eng".into(),
                    constraints: vec![ChoiceConfig {
                        field: "region".into(),
                        options: plain(&["NE", "nw"]),
                    }],
                }],
            )
            .unwrap();

        assert_eq!(
            registry.constraints_for("mpx", "country", "eng"),
            vec![ChoiceKey::new("region", "ne"), ChoiceKey::new("region", "nw")]
        );
        assert_eq!(
            registry.constraints_for("mpx", "region", "ne"),
            vec![ChoiceKey::new("country", "eng")]
        );
        assert!(registry.set_constraints_consistent("mpx"));
    }

    #[test]
    fn test_one_way_link_is_inconsistent() {
        let registry = registry();
        registry
            .link(
                "mpx",
                &ChoiceKey::new("country", "scot"),
                &ChoiceKey::new("region", "se"),
            )
            .unwrap();
        assert!(!registry.set_constraints_consistent("mpx"));
        assert_eq!(
            registry.asymmetric_constraints("mpx"),
            vec![(ChoiceKey::new("country", "scot"), ChoiceKey::new("region", "se"))]
        );

        registry
            .link(
                "mpx",
                &ChoiceKey::new("region", "se"),
                &ChoiceKey::new("country", "scot"),
            )
            .unwrap();
        assert!(registry.set_constraints_consistent("mpx"));
    }

    #[test]
    fn test_rename_keeps_constraints() {
        let registry = registry();
        registry
            .set_constraints(
                "mpx",
                &[ChoiceConstraintConfig {
                    field: "country".into(),
                    option: "eng".into(),
                    constraints: vec![ChoiceConfig {
                        field: "region".into(),
                        options: plain(&["ne"]),
                    }],
                }],
            )
            .unwrap();
        registry
            .sync_choices("mpx", "country", &plain(&["Eng", "scot", "wales", "ni"]))
            .unwrap();

        assert_eq!(
            registry.constraints_for("mpx", "region", "ne"),
            vec![ChoiceKey::new("country", "Eng")]
        );
        assert!(registry.set_constraints_consistent("mpx"));
    }

    #[test]
    fn test_unknown_constraint_target() {
        let registry = registry();
        let result = registry.set_constraints(
            "mpx",
            &[ChoiceConstraintConfig {
                field: "country".into(),
                option: "eng".into(),
                constraints: vec![ChoiceConfig {
                    field: "region".into(),
                    options: plain(&["sw"]),
                }],
            }],
        );
        assert!(matches!(result, Err(ChoiceError::UnknownChoice { .. })));
    }
}
