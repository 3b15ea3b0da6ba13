//! Query engine limits.
//!
//! The limits are passed explicitly to the document parser, the query
//! compiler and the summary compiler.
//!
//! # Example
//!
//! ```rust
//! use onyx_query::QueryConfig;
//!
//! let config = QueryConfig {
//!     max_iterable_input: 50,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

/// Limits applied while validating and executing queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum length of any list-valued lookup value or operator list.
    #[serde(default = "default_max_iterable_input")]
    pub max_iterable_input: usize,

    /// Maximum number of distinct groups a summary may return.
    #[serde(default = "default_max_summary_output")]
    pub max_summary_output: usize,

    /// Maximum nesting depth of a query document.
    #[serde(default = "default_max_query_depth")]
    pub max_query_depth: usize,
}

fn default_max_iterable_input() -> usize {
    100
}

fn default_max_summary_output() -> usize {
    10000
}

fn default_max_query_depth() -> usize {
    32
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_iterable_input: default_max_iterable_input(),
            max_summary_output: default_max_summary_output(),
            max_query_depth: default_max_query_depth(),
        }
    }
}

impl QueryConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_iterable_input == 0 {
            errors.push("Max iterable input cannot be 0".to_string());
        }

        if self.max_summary_output == 0 {
            errors.push("Max summary output cannot be 0".to_string());
        }

        if self.max_query_depth == 0 {
            errors.push("Max query depth cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
