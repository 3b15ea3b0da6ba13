//! Command-line configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ONYX_LOG_LEVEL` | warn | Log level |
//! | `ONYX_MAX_ITERABLE_INPUT` | 100 | Longest accepted value list |
//! | `ONYX_MAX_SUMMARY_OUTPUT` | 10000 | Most groups a summary may return |
//! | `ONYX_MAX_QUERY_DEPTH` | 32 | Deepest accepted query document |
//! | `ONYX_APP_LABEL` | data | App label of permission strings |
//! | `ONYX_PROJECT` | | Project configuration file |
//! | `ONYX_DATABASE` | | SQLite database file |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use onyx_query::QueryConfig;
use onyx_query::access::{Action, Scope};

#[derive(Debug, Clone, Parser)]
#[command(name = "onyx")]
#[command(about = "Compile and run permission-checked Onyx queries")]
pub struct CliConfig {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "ONYX_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Maximum length of a list-valued lookup value or operator list.
    #[arg(long, env = "ONYX_MAX_ITERABLE_INPUT", default_value = "100")]
    pub max_iterable_input: usize,

    /// Maximum number of groups a summary may return.
    #[arg(long, env = "ONYX_MAX_SUMMARY_OUTPUT", default_value = "10000")]
    pub max_summary_output: usize,

    /// Maximum nesting depth of a query document.
    #[arg(long, env = "ONYX_MAX_QUERY_DEPTH", default_value = "32")]
    pub max_query_depth: usize,

    /// App label prefixed to permission strings.
    #[arg(long, env = "ONYX_APP_LABEL", default_value = "data")]
    pub app_label: String,

    /// Project configuration file (JSON).
    #[arg(short, long, env = "ONYX_PROJECT")]
    pub project: PathBuf,

    /// Project groups the caller belongs to (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<Scope>,

    /// File holding a JSON array of the caller's permission strings.
    #[arg(long)]
    pub permissions: Option<PathBuf>,

    /// Name of the caller, for logs.
    #[arg(long, default_value = "cli")]
    pub user: String,

    /// SQLite database holding the project's records.
    #[arg(long, env = "ONYX_DATABASE")]
    pub database: Option<PathBuf>,

    /// File holding a JSON array of records to query in memory.
    #[arg(long, conflicts_with = "database")]
    pub records: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Describe the fields available to the caller.
    Fields {
        #[arg(long, default_value = "get")]
        action: Action,
    },

    /// Print the caller's capabilities as permission strings.
    Permissions,

    /// Compile a query document, given as JSON or as key=value pairs.
    Query {
        /// Query document (JSON).
        document: Option<String>,

        /// A `field__lookup=value` pair; repeatable, ANDed together.
        #[arg(long = "param", conflicts_with = "document")]
        params: Vec<String>,

        #[arg(long, default_value = "filter")]
        action: Action,

        /// Print the rendered SQL.
        #[arg(long)]
        sql: bool,

        /// Run the query and print the matching records.
        #[arg(long)]
        execute: bool,
    },

    /// Compile a free-text search.
    Search {
        text: String,

        #[arg(long, default_value = "list")]
        action: Action,

        #[arg(long)]
        sql: bool,

        #[arg(long)]
        execute: bool,
    },

    /// Plan a grouped count.
    Summary {
        /// Grouping field; repeatable.
        #[arg(long = "field", required = true)]
        fields: Vec<String>,

        /// Query document (JSON) restricting the counted records.
        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        sql: bool,

        #[arg(long)]
        execute: bool,
    },

    /// Store records from a JSON array file.
    Ingest { file: PathBuf },
}

impl CliConfig {
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            max_iterable_input: self.max_iterable_input,
            max_summary_output: self.max_summary_output,
            max_query_depth: self.max_query_depth,
        }
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.query_config().validate().err().unwrap_or_default();

        if self.app_label.is_empty() {
            errors.push("App label cannot be empty".to_string());
        }

        if self.scope.is_empty() && self.permissions.is_none() {
            errors.push("Either --scope or --permissions is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
