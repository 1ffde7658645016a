//! Subcommand implementations

use crate::api;
use crate::commands::{
    BaselinesArgs, Commands, CompareAllArgs, CompareArgs, HistoryArgs, PageCommand, ServeArgs,
    SetBaselineArgs, WebsiteAddArgs, WebsiteCommand,
};
use crate::config::CliConfig;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{format_percentage, Reporter};
use pagediff::{ImageRef, Recipient, Repository};
use std::net::SocketAddr;
use std::time::Duration;

/// How often `compare-all` polls job progress
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Run one subcommand. Returns `false` when the command completed but its
/// result should fail the process (e.g. a diff above `--fail-above`).
pub async fn execute(config: &CliConfig, command: Commands) -> CliResult<bool> {
    let out = Reporter::new(config.verbosity.is_quiet(), config.json_output);

    if let Commands::Config = command {
        if config.json_output {
            out.emit_json(&config.engine)?;
        } else {
            print!("{}", config.engine.to_yaml()?);
        }
        return Ok(true);
    }

    let ctx = AppContext::open(config.engine.clone())?;
    match command {
        Commands::Website(WebsiteCommand::Add(args)) => add_website(&ctx, &out, args).await,
        Commands::Website(WebsiteCommand::List) => {
            out.websites(&ctx.repo.websites().await)?;
            Ok(true)
        }
        Commands::Page(PageCommand::Add(args)) => {
            let page = ctx.repo.insert_page(&args.website, args.name, args.path).await?;
            if out.json {
                out.emit_json(&page)?;
            } else {
                out.success(&format!("Added page {} ({})", page.id, page.path));
            }
            Ok(true)
        }
        Commands::Page(PageCommand::List(args)) => {
            out.pages(&ctx.repo.pages_for_website(&args.website).await?)?;
            Ok(true)
        }
        Commands::Page(PageCommand::Remove(args)) => {
            let page = ctx.repo.delete_page(&args.page).await?;
            out.success(&format!("Removed page {} and its comparisons", page.name));
            Ok(true)
        }
        Commands::Compare(args) => compare(&ctx, &out, &args).await,
        Commands::CompareAll(args) => compare_all(&ctx, &out, &args).await,
        Commands::History(HistoryArgs { page }) => {
            out.history(&ctx.engine.history(&page).await?)?;
            Ok(true)
        }
        Commands::Baselines(BaselinesArgs { comparison }) => {
            out.candidates(&ctx.engine.list_candidates(&comparison).await?)?;
            Ok(true)
        }
        Commands::SetBaseline(SetBaselineArgs { comparison, image }) => {
            let updated = ctx
                .engine
                .override_baseline(&comparison, &ImageRef::new(image))
                .await?;
            if out.json {
                out.emit_json(&updated)?;
            } else {
                out.success(&format!(
                    "Baseline of {} set; diff {}",
                    updated.id,
                    format_percentage(updated.diff_percentage)
                ));
            }
            Ok(true)
        }
        Commands::Serve(args) => serve(ctx, &args).await,
        Commands::Config => Ok(true),
    }
}

async fn add_website(ctx: &AppContext, out: &Reporter, args: WebsiteAddArgs) -> CliResult<bool> {
    let mut website = ctx.repo.insert_website(args.name, args.url).await?;
    if args.owner.is_some() || !args.editors.is_empty() {
        website.owner = args.owner.map(Recipient::new);
        website.editors = args.editors.into_iter().map(Recipient::new).collect();
        ctx.repo.update_website(&website).await?;
    }
    if out.json {
        out.emit_json(&website)?;
    } else {
        out.success(&format!("Added website {} ({})", website.id, website.url));
    }
    Ok(true)
}

async fn compare(ctx: &AppContext, out: &Reporter, args: &CompareArgs) -> CliResult<bool> {
    let outcome = ctx.engine.run_comparison(&args.page).await?;
    if out.json {
        out.emit_json(&outcome)?;
    } else if outcome.is_first_comparison {
        out.success(&format!("{}: first capture stored as baseline", outcome.comparison_id));
    } else {
        out.success(&format!(
            "{}: {} of pixels differ",
            outcome.comparison_id,
            format_percentage(outcome.diff_percentage)
        ));
    }

    let within = match (args.fail_above, outcome.diff_percentage) {
        (Some(limit), Some(actual)) => actual <= limit,
        _ => true,
    };
    if !within {
        out.failure(&format!(
            "difference {} exceeds {}",
            format_percentage(outcome.diff_percentage),
            format_percentage(args.fail_above)
        ));
    }
    Ok(within)
}

async fn compare_all(ctx: &AppContext, out: &Reporter, args: &CompareAllArgs) -> CliResult<bool> {
    let submission = ctx.bulk.submit(&args.website).await?;
    out.info(&format!(
        "Comparing {} page(s), job {}",
        submission.pages.len(),
        submission.job_id
    ));

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let mut last_seen = usize::MAX;
    let progress = loop {
        ticker.tick().await;
        let progress = ctx.bulk.status(&submission.job_id).await?;
        if progress.attempted() != last_seen {
            last_seen = progress.attempted();
            out.progress(&progress);
        }
        if progress.done {
            break progress;
        }
    };

    if out.json {
        out.emit_json(&progress)?;
    }
    for failed in &progress.failed {
        out.failure(&format!("{} ({}): {}", failed.page_name, failed.page_path, failed.error_message));
    }
    Ok(progress.failed.is_empty())
}

async fn serve(ctx: AppContext, args: &ServeArgs) -> CliResult<bool> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| CliError::invalid_argument(format!("bad listen address: {e}")))?;
    println!("pagediff API listening on http://{addr}");
    api::serve(ctx, addr, args.cors).await?;
    Ok(true)
}
