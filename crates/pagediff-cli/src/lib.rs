//! pagediff CLI library
//!
//! Command definitions, configuration resolution, logging setup, and the
//! HTTP API served by `pagediff serve`.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
mod commands;
mod config;
mod context;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    BaselinesArgs, Cli, Commands, CompareAllArgs, CompareArgs, HistoryArgs, PageAddArgs,
    PageCommand, PageListArgs, PageRemoveArgs, ServeArgs, SetBaselineArgs, WebsiteAddArgs,
    WebsiteCommand,
};
pub use config::{CliConfig, Verbosity};
pub use context::AppContext;
pub use error::{CliError, CliResult};
pub use output::{comparison_row, format_percentage, Reporter};
