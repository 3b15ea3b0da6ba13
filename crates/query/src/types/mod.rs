//! Core types: the field type taxonomy, lookups, and typed values.

mod lookup;
mod onyx_type;
mod value;

pub use lookup::Lookup;
pub use onyx_type::{OnyxType, ScalarType};
pub use value::{DATE_FORMAT, DATETIME_FORMAT, Value};
