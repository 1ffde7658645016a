//! Log subscriber setup.
//!
//! `RUST_LOG` wins over the verbosity flags when set.

use crate::config::Verbosity;
use crate::error::{CliError, CliResult};
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to the verbosity default
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()))
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// parseable.
pub fn init(verbosity: Verbosity, json: bool) -> CliResult<()> {
    let builder = fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(verbosity.is_verbose());
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| CliError::config(format!("log subscriber: {e}")))
}
