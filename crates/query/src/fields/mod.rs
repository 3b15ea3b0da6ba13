//! Field path resolution, suggestions and field descriptions.

mod describe;
mod paths;
mod resolver;
mod suggest;

pub use describe::{describe_lookups, describe_types};
pub use paths::{SEPARATOR, flatten_fields, include_exclude_fields, unflatten_fields};
pub use resolver::{FieldHandler, RelationHop, ResolvedField};
pub use suggest::{
    DEFAULT_CUTOFF, DEFAULT_SUGGESTIONS, levenshtein, similarity, suggestions, with_suggestions,
};
