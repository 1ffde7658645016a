//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// pagediff: capture monitored pages and compare them against their baselines
#[derive(Parser, Debug)]
#[command(name = "pagediff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// YAML configuration file
    #[arg(long, env = "PAGEDIFF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// State file holding websites, pages and comparisons
    #[arg(long, env = "PAGEDIFF_STATE", global = true)]
    pub state: Option<PathBuf>,

    /// Directory holding stored screenshots
    #[arg(long, env = "PAGEDIFF_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage websites
    #[command(subcommand)]
    Website(WebsiteCommand),

    /// Manage pages
    #[command(subcommand)]
    Page(PageCommand),

    /// Capture a page and compare it against its baseline
    Compare(CompareArgs),

    /// Compare every page of a website
    CompareAll(CompareAllArgs),

    /// List a page's comparisons, newest first
    History(HistoryArgs),

    /// List images that can become a comparison's baseline
    Baselines(BaselinesArgs),

    /// Override the baseline of a comparison and every later one
    SetBaseline(SetBaselineArgs),

    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Show effective configuration
    Config,
}

/// Website subcommands
#[derive(Subcommand, Debug)]
pub enum WebsiteCommand {
    /// Register a website
    Add(WebsiteAddArgs),
    /// List websites
    List,
}

/// Arguments for `website add`
#[derive(Args, Debug)]
pub struct WebsiteAddArgs {
    /// Display name
    pub name: String,

    /// Base URL page paths are resolved against
    pub url: String,

    /// Owner email, notified on failures
    #[arg(long)]
    pub owner: Option<String>,

    /// Editor email, notified on failures (repeatable)
    #[arg(long = "editor")]
    pub editors: Vec<String>,
}

/// Page subcommands
#[derive(Subcommand, Debug)]
pub enum PageCommand {
    /// Add a page to a website
    Add(PageAddArgs),
    /// List a website's pages, newest first
    List(PageListArgs),
    /// Remove a page and its comparisons
    Remove(PageRemoveArgs),
}

/// Arguments for `page add`
#[derive(Args, Debug)]
pub struct PageAddArgs {
    /// Website id
    pub website: String,

    /// Display name
    pub name: String,

    /// Path relative to the website URL
    pub path: String,
}

/// Arguments for `page list`
#[derive(Args, Debug)]
pub struct PageListArgs {
    /// Website id
    pub website: String,
}

/// Arguments for `page remove`
#[derive(Args, Debug)]
pub struct PageRemoveArgs {
    /// Page id
    pub page: String,
}

/// Arguments for the compare command
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Page id
    pub page: String,

    /// Exit non-zero when the difference exceeds this percentage
    #[arg(long)]
    pub fail_above: Option<f64>,
}

/// Arguments for the compare-all command
#[derive(Args, Debug)]
pub struct CompareAllArgs {
    /// Website id
    pub website: String,
}

/// Arguments for the history command
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Page id
    pub page: String,
}

/// Arguments for the baselines command
#[derive(Args, Debug)]
pub struct BaselinesArgs {
    /// Comparison id
    pub comparison: String,
}

/// Arguments for the set-baseline command
#[derive(Args, Debug)]
pub struct SetBaselineArgs {
    /// Comparison id
    pub comparison: String,

    /// Image reference (as listed by `baselines`)
    pub image: String,
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Allow cross-origin requests
    #[arg(long)]
    pub cors: bool,
}
