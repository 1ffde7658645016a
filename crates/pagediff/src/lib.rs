//! pagediff: visual regression monitoring for websites
//!
//! Each monitored page is captured as a full-page screenshot and compared
//! against its baseline. Differences are measured with a perceptual YIQ
//! metric and rendered as a diff image.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   pagediff comparison flow                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐  │
//! │  │ Capture  │──►│ Baseline │──►│ Normalize │──►│   Diff   │  │
//! │  │ (CDP)    │   │ lookup   │   │ (pad)     │   │  (YIQ)   │  │
//! │  └──────────┘   └──────────┘   └───────────┘   └──────────┘  │
//! │        │                                            │        │
//! │        ▼                                            ▼        │
//! │  ┌──────────────────┐                   ┌──────────────────┐ │
//! │  │  ContentStore    │◄──────────────────│   Repository     │ │
//! │  └──────────────────┘                   └──────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```no_run
//! use pagediff::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> PageDiffResult<()> {
//! let config = EngineConfig::default();
//! let store: Arc<dyn ContentStore> = Arc::new(FsContentStore::open(&config.store_dir)?);
//! let repo = Arc::new(InMemoryRepository::open(&config.state_file)?);
//! let site = repo.insert_website("Example", "https://example.com").await?;
//! let page = repo.insert_page(&site.id, "Home", "/").await?;
//!
//! let capture = capture_from_config(&config, Arc::clone(&store))?;
//! let engine = ComparisonEngine::new(&config, repo, store, capture, Arc::new(LogNotifier));
//! let outcome = engine.run_comparison(&page.id).await?;
//! println!("{:?}", outcome.diff_percentage);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod baseline;
mod bulk;
#[allow(clippy::module_name_repetitions)]
mod capture;
mod config;
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
mod diff;
mod model;
mod normalize;
mod notify;
mod orchestrator;
mod raster;
mod repository;
mod result;
mod store;

pub use bulk::{BulkProgress, BulkRunner, BulkSubmission, DEFAULT_FINISHED_JOBS_KEPT};
pub use capture::{capture_from_config, Renderer, ScreenshotCapture, StoringCapture};
#[cfg(feature = "browser")]
pub use capture::ChromiumRenderer;
pub use config::{EngineConfig, CANONICAL_HEIGHT, CANONICAL_WIDTH, CAPTURE_TIMEOUT_MS};
pub use diff::{
    color_delta, diff, diff_percentage, normalize_and_diff, DiffConfig, DiffOutcome,
    DEFAULT_TOLERANCE, MAX_YIQ_DELTA,
};
pub use model::{
    resolve_url, BaselineCandidate, CandidateRole, Comparison, ComparisonOutcome,
    ComparisonStatus, ImageRef, Page, Recipient, Website,
};
pub use normalize::normalize;
pub use notify::{
    notify_bulk_quietly, notify_quietly, BulkFailure, ComparisonFailure, FailureNotifier,
    LogNotifier, PageFailure,
};
pub use orchestrator::{ComparisonEngine, PageGuard, PageLocks};
pub use raster::{RasterImage, CHANNELS, WHITE};
pub use repository::{InMemoryRepository, Repository};
pub use result::{PageDiffError, PageDiffResult};
pub use store::{ContentStore, FsContentStore, MemoryContentStore, REF_PREFIX};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::bulk::*;
    pub use super::capture::*;
    pub use super::config::*;
    pub use super::diff::*;
    pub use super::model::*;
    pub use super::normalize::*;
    pub use super::notify::*;
    pub use super::orchestrator::*;
    pub use super::raster::*;
    pub use super::repository::*;
    pub use super::result::*;
    pub use super::store::*;
}
