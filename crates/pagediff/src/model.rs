//! Data model: websites, pages, comparisons, baseline candidates.

use crate::result::{PageDiffError, PageDiffResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference naming stored image bytes (e.g. `/screenshots/ab12-1700000000000.png`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Wrap a reference string
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The reference as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Someone who receives failure notifications for a website
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Email address
    pub email: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Recipient {
    /// Create a recipient
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A registered website
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Website {
    /// Identifier
    pub id: String,
    /// Human name
    pub name: String,
    /// Base URL every page path is resolved against
    pub url: String,
    /// Owner, notified on failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Recipient>,
    /// Users with edit permission, notified on failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editors: Vec<Recipient>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Website {
    /// Owner followed by editors
    #[must_use]
    pub fn recipients(&self) -> Vec<Recipient> {
        self.owner
            .iter()
            .chain(self.editors.iter())
            .cloned()
            .collect()
    }
}

/// A monitored path on a website
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Identifier
    pub id: String,
    /// Owning website
    pub website_id: String,
    /// Human name
    pub name: String,
    /// Path relative to the website URL
    pub path: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Join a page path onto a website base URL
///
/// # Errors
///
/// Returns error if the base URL or the joined result is not a valid URL
pub fn resolve_url(base: &str, path: &str) -> PageDiffResult<String> {
    let base = url::Url::parse(base)
        .map_err(|e| PageDiffError::config(format!("invalid website URL '{base}': {e}")))?;
    let joined = base
        .join(path)
        .map_err(|e| PageDiffError::config(format!("invalid page path '{path}': {e}")))?;
    Ok(joined.to_string())
}

/// Lifecycle state of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    /// Created, capture/diff in progress
    #[default]
    Pending,
    /// Capture (and diff, if any) succeeded
    Completed,
    /// Capture or diff failed
    Failed,
}

impl ComparisonStatus {
    /// Whether the comparison can no longer change status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One capture-and-diff attempt for a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Identifier
    pub id: String,
    /// Owning page
    pub page_id: String,
    /// Creation time, orders comparisons within a page
    pub created_at: DateTime<Utc>,
    /// Lifecycle state
    pub status: ComparisonStatus,
    /// "Before" image
    pub baseline_image: Option<ImageRef>,
    /// Image captured by this comparison
    pub current_image: Option<ImageRef>,
    /// Difference visualization
    pub diff_image: Option<ImageRef>,
    /// Share of differing pixels (0-100)
    pub diff_percentage: Option<f64>,
}

impl Comparison {
    /// A fresh pending comparison
    #[must_use]
    pub fn pending(id: impl Into<String>, page_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            page_id: page_id.into(),
            created_at: now,
            status: ComparisonStatus::Pending,
            baseline_image: None,
            current_image: None,
            diff_image: None,
            diff_percentage: None,
        }
    }

    /// Baseline and current image as candidate entries, baseline first
    #[must_use]
    pub fn candidates(&self) -> Vec<BaselineCandidate> {
        let mut out = Vec::with_capacity(2);
        for (image, role) in [
            (&self.baseline_image, CandidateRole::Baseline),
            (&self.current_image, CandidateRole::Current),
        ] {
            if let Some(image) = image {
                out.push(BaselineCandidate {
                    id: format!("{}-{}", self.id, role.as_str()),
                    source_comparison_id: self.id.clone(),
                    image: image.clone(),
                    role,
                    created_at: self.created_at,
                    diff_percentage: self.diff_percentage,
                });
            }
        }
        out
    }
}

/// Which slot of a comparison a candidate image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateRole {
    /// The comparison's baseline image
    Baseline,
    /// The comparison's current image
    Current,
}

impl CandidateRole {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Current => "current",
        }
    }
}

/// A previously seen image that may become the new baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineCandidate {
    /// `<comparison id>-<role>`
    pub id: String,
    /// Comparison the image belongs to
    pub source_comparison_id: String,
    /// The image
    pub image: ImageRef,
    /// Slot the image occupies
    pub role: CandidateRole,
    /// Creation time of the source comparison
    pub created_at: DateTime<Utc>,
    /// Diff percentage of the source comparison
    pub diff_percentage: Option<f64>,
}

/// What `run_comparison` reports to its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonOutcome {
    /// The comparison row that was created
    pub comparison_id: String,
    /// Final status
    pub status: ComparisonStatus,
    /// Computed percentage, absent on first comparison
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_percentage: Option<f64>,
    /// Whether the capture became the page's first baseline
    pub is_first_comparison: bool,
}
