//! Choice values and constraints.

mod registry;

pub use registry::{ChoiceChange, ChoiceKey, ChoiceRegistry, ChoiceValue};
