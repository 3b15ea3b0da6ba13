//! Project schemas: field descriptor trees, permission groups and the
//! configuration they are built from.

mod config;
mod model;
mod registry;

pub use config::{
    ActionList, ChoiceConfig, ChoiceConstraintConfig, ChoiceOption, FieldConfig, GroupConfig,
    ModelConfig, PermissionConfig, ProjectConfig,
};
pub use model::{FieldDef, FieldKind, GroupDef, ModelSchema, ProjectSchema, RelationDef};
pub use registry::SchemaRegistry;
