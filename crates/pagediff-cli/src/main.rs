//! pagediff CLI
//!
//! ## Usage
//!
//! ```bash
//! pagediff website add Example https://example.com --owner ops@example.com
//! pagediff page add <website-id> Home /
//! pagediff compare <page-id>
//! pagediff compare-all <website-id>
//! pagediff serve --port 8080
//! ```

use clap::Parser;
use pagediff_cli::{handlers, logging, Cli, CliConfig, CliError, CliResult};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<bool> {
    let cli = Cli::parse();
    let config = CliConfig::from_cli(&cli)?;
    logging::init(config.verbosity, config.log_json)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("Failed to create runtime: {e}")))?;
    rt.block_on(handlers::execute(&config, cli.command))
}
