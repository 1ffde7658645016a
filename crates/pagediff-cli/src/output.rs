//! Output formatting

use crate::error::CliResult;
use console::{style, Term};
use pagediff::{BaselineCandidate, BulkProgress, Comparison, ComparisonStatus, Page, Website};
use serde::Serialize;

/// Writes human or JSON output to stdout
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print JSON instead of text
    pub json: bool,
}

impl Reporter {
    /// Create a reporter on stdout
    #[must_use]
    pub fn new(quiet: bool, json: bool) -> Self {
        let term = Term::stdout();
        Self {
            use_color: term.features().colors_supported(),
            term,
            quiet,
            json,
        }
    }

    fn line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }

    /// Print `value` as pretty JSON
    pub fn emit_json<T: Serialize + ?Sized>(&self, value: &T) -> CliResult<()> {
        self.line(&serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "OK".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        self.line(&styled);
    }

    /// Websites, one per line
    pub fn websites(&self, websites: &[Website]) -> CliResult<()> {
        if self.json {
            return self.emit_json(websites);
        }
        self.header("Websites");
        for site in websites {
            self.info(&format!("{}  {}  {}", site.id, site.name, site.url));
        }
        Ok(())
    }

    /// Pages, one per line
    pub fn pages(&self, pages: &[Page]) -> CliResult<()> {
        if self.json {
            return self.emit_json(pages);
        }
        self.header("Pages");
        for page in pages {
            self.info(&format!("{}  {}  {}", page.id, page.name, page.path));
        }
        Ok(())
    }

    /// Comparison history, newest first
    pub fn history(&self, comparisons: &[Comparison]) -> CliResult<()> {
        if self.json {
            return self.emit_json(comparisons);
        }
        self.header("Comparisons");
        for c in comparisons {
            self.info(&comparison_row(c));
        }
        Ok(())
    }

    /// Baseline candidates
    pub fn candidates(&self, candidates: &[BaselineCandidate]) -> CliResult<()> {
        if self.json {
            return self.emit_json(candidates);
        }
        self.header("Baseline candidates");
        for c in candidates {
            self.info(&format!(
                "{}  {:<8}  {}  {}",
                c.created_at.format("%Y-%m-%d %H:%M:%S"),
                c.role.as_str(),
                format_percentage(c.diff_percentage),
                c.image
            ));
        }
        Ok(())
    }

    /// Bulk progress line
    pub fn progress(&self, progress: &BulkProgress) {
        if self.json {
            return;
        }
        self.info(&format!(
            "[{}/{}] {} succeeded, {} failed",
            progress.attempted(),
            progress.total,
            progress.succeeded,
            progress.failed.len()
        ));
    }
}

/// Percentage with two decimals, `-` when absent
#[must_use]
pub fn format_percentage(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |p| format!("{p:.2}%"))
}

/// One history line: time, status, percentage, id
#[must_use]
pub fn comparison_row(c: &Comparison) -> String {
    let status = match c.status {
        ComparisonStatus::Completed => "completed",
        ComparisonStatus::Failed => "FAILED",
        ComparisonStatus::Pending => "pending",
    };
    format!(
        "{}  {:<9}  {:>8}  {}",
        c.created_at.format("%Y-%m-%d %H:%M:%S"),
        status,
        format_percentage(c.diff_percentage),
        c.id
    )
}
