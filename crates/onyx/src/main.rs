//! Onyx command-line interface.
//!
//! Loads a project configuration and the caller's groups or permission
//! strings, then compiles queries, searches and summaries against them.
//! Output is JSON on stdout; validation failures print the field-keyed
//! error messages and exit with status 1.

mod commands;
mod config;

use clap::Parser;
use tracing::info;

use crate::commands::{Session, error_output};
use crate::config::CliConfig;

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("onyx={},onyx_query={}", level, level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(project = %config.project.display(), "Starting onyx");

    let result = Session::load(config).and_then(|session| session.run());
    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error_output(&error))?);
            std::process::exit(1);
        }
    }
}
