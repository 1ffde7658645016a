//! CLI configuration

use crate::commands::Cli;
use crate::error::CliResult;
use pagediff::EngineConfig;
use serde::{Deserialize, Serialize};

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - errors only
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// From the `-q` flag and `-v` count
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Default log filter directive for this level
    #[must_use]
    pub const fn log_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn,pagediff=info",
            Self::Verbose => "info,pagediff=debug",
            Self::Debug => "debug",
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Logs as JSON lines
    pub log_json: bool,
    /// Results as JSON
    pub json_output: bool,
    /// Engine settings after file and flag overrides
    pub engine: EngineConfig,
}

impl CliConfig {
    /// Resolve configuration from parsed arguments.
    ///
    /// The YAML file (if any) is loaded first; `--state` and `--store`
    /// override it.
    pub fn from_cli(cli: &Cli) -> CliResult<Self> {
        let mut engine = match &cli.config {
            Some(path) => EngineConfig::from_yaml_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(state) = &cli.state {
            engine = engine.with_state_file(state);
        }
        if let Some(store) = &cli.store {
            engine = engine.with_store_dir(store);
        }
        Ok(Self {
            verbosity: Verbosity::from_flags(cli.quiet, cli.verbose),
            log_json: cli.log_json,
            json_output: cli.json,
            engine,
        })
    }
}
