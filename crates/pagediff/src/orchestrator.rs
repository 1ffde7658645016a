//! The comparison pipeline.
//!
//! [`ComparisonEngine::run_comparison`] captures a page, pairs the capture
//! with the page's latest baseline, and stores the diff. Runs for the same
//! page are serialized through [`PageLocks`]; different pages proceed
//! concurrently.

use crate::capture::ScreenshotCapture;
use crate::config::EngineConfig;
use crate::diff::{normalize_and_diff, DiffConfig};
use crate::model::{
    resolve_url, Comparison, ComparisonOutcome, ComparisonStatus, ImageRef, Page, Website,
};
use crate::notify::{notify_quietly, ComparisonFailure, FailureNotifier};
use crate::raster::RasterImage;
use crate::repository::Repository;
use crate::result::{PageDiffError, PageDiffResult};
use crate::store::ContentStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = HashMap<String, Arc<Mutex<()>>>;

/// One async mutex per page id.
///
/// An entry lives only while some caller holds or waits for its lock.
#[derive(Debug, Default)]
pub struct PageLocks {
    locks: Arc<StdMutex<LockTable>>,
}

impl PageLocks {
    /// Empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `page_id`
    pub async fn acquire(&self, page_id: &str) -> PageGuard {
        let lock = Arc::clone(lock_table(&self.locks).entry(page_id.to_string()).or_default());
        PageGuard {
            page_id: page_id.to_string(),
            guard: Some(lock.lock_owned().await),
            table: Arc::clone(&self.locks),
        }
    }

    /// Number of pages currently locked or awaited
    #[must_use]
    pub fn len(&self) -> usize {
        lock_table(&self.locks).len()
    }

    /// Whether no page is locked or awaited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock_table(&self.locks).is_empty()
    }
}

fn lock_table(table: &StdMutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive access to one page, released on drop
#[derive(Debug)]
pub struct PageGuard {
    page_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<StdMutex<LockTable>>,
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_table(&self.table);
        // The table's own handle is the last one: nobody is waiting.
        if locks
            .get(&self.page_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.page_id);
        }
    }
}

/// Runs comparisons against injected collaborators
#[derive(Debug)]
pub struct ComparisonEngine {
    pub(crate) repo: Arc<dyn Repository>,
    pub(crate) store: Arc<dyn ContentStore>,
    pub(crate) capture: Arc<dyn ScreenshotCapture>,
    pub(crate) notifier: Arc<dyn FailureNotifier>,
    pub(crate) diff_config: DiffConfig,
    pub(crate) viewport: (u32, u32),
    pub(crate) locks: PageLocks,
}

impl ComparisonEngine {
    /// Engine with the diff and viewport settings of `config`
    pub fn new(
        config: &EngineConfig,
        repo: Arc<dyn Repository>,
        store: Arc<dyn ContentStore>,
        capture: Arc<dyn ScreenshotCapture>,
        notifier: Arc<dyn FailureNotifier>,
    ) -> Self {
        Self {
            repo,
            store,
            capture,
            notifier,
            diff_config: config.diff_config(),
            viewport: config.viewport(),
            locks: PageLocks::new(),
        }
    }

    /// The repository
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// The content store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// The notifier
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn FailureNotifier> {
        &self.notifier
    }

    /// Capture viewport baselines are expected to match
    #[must_use]
    pub const fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Capture `page_id`, compare against its latest baseline, persist the result.
    ///
    /// Once the comparison row exists, every failure marks it failed and
    /// sends one failure notification before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns error if the page or website is missing, the capture fails,
    /// or a stored image cannot be read, decoded, or written
    #[tracing::instrument(skip(self), fields(comparison_id = tracing::field::Empty))]
    pub async fn run_comparison(&self, page_id: &str) -> PageDiffResult<ComparisonOutcome> {
        let _guard = self.locks.acquire(page_id).await;

        let page = self.repo.page(page_id).await?;
        let website = self.repo.website(&page.website_id).await?;
        let url = resolve_url(&website.url, &page.path)?;

        let comparison = self.repo.create_comparison(&page.id, Utc::now()).await?;
        tracing::Span::current().record("comparison_id", comparison.id.as_str());
        tracing::info!(url = %url, "comparison started");

        match self.execute(comparison.clone(), &url).await {
            Ok(outcome) => {
                tracing::info!(
                    diff_percentage = ?outcome.diff_percentage,
                    first = outcome.is_first_comparison,
                    "comparison completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.record_failure(comparison, &page, &website, &url, &e)
                    .await;
                Err(e)
            }
        }
    }

    async fn execute(&self, mut comparison: Comparison, url: &str) -> PageDiffResult<ComparisonOutcome> {
        let current = self.capture.capture(url).await?;

        let Some(prior) = self
            .repo
            .latest_with_baseline(&comparison.page_id, &comparison.id)
            .await?
        else {
            tracing::info!(image = %current, "no prior baseline, capture becomes the baseline");
            comparison.baseline_image = Some(current.clone());
            comparison.current_image = Some(current);
            comparison.status = ComparisonStatus::Completed;
            self.repo.update_comparison(&comparison).await?;
            return Ok(ComparisonOutcome {
                comparison_id: comparison.id,
                status: ComparisonStatus::Completed,
                diff_percentage: None,
                is_first_comparison: true,
            });
        };

        let (baseline_ref, baseline) = self.canonical_baseline(&prior, url).await?;
        let current_image = self.load(&current).await?;

        let outcome = normalize_and_diff(&baseline, &current_image, &self.diff_config)?;
        let diff_ref = self.store.write("diff", outcome.image.encode_png()?).await?;
        tracing::debug!(
            differing = outcome.differing_pixels,
            total = outcome.total_pixels,
            "diff computed"
        );

        comparison.baseline_image = Some(baseline_ref);
        comparison.current_image = Some(current);
        comparison.diff_image = Some(diff_ref);
        comparison.diff_percentage = Some(outcome.diff_percentage);
        comparison.status = ComparisonStatus::Completed;
        self.repo.update_comparison(&comparison).await?;

        Ok(ComparisonOutcome {
            comparison_id: comparison.id,
            status: ComparisonStatus::Completed,
            diff_percentage: Some(outcome.diff_percentage),
            is_first_comparison: false,
        })
    }

    /// The prior comparison's baseline, replaced by a fresh capture when it
    /// was not taken at the canonical viewport or cannot be decoded.
    async fn canonical_baseline(
        &self,
        prior: &Comparison,
        url: &str,
    ) -> PageDiffResult<(ImageRef, RasterImage)> {
        let reference = prior
            .baseline_image
            .clone()
            .ok_or_else(|| PageDiffError::not_found("baseline image", &prior.id))?;

        match self.load(&reference).await {
            Ok(image) if image.dimensions() == self.viewport => return Ok((reference, image)),
            Ok(image) => {
                let (width, height) = image.dimensions();
                tracing::warn!(
                    baseline = %reference,
                    width,
                    height,
                    "baseline not at capture viewport, refreshing"
                );
            }
            Err(e) => {
                tracing::warn!(baseline = %reference, error = %e, "baseline unreadable, refreshing");
            }
        }

        if let Err(e) = self.store.delete(&reference).await {
            tracing::debug!(baseline = %reference, error = %e, "stale baseline not deleted");
        }
        let fresh = self.capture.capture(url).await?;
        self.repo.set_baseline(&prior.id, &fresh).await?;
        let image = self.load(&fresh).await?;
        Ok((fresh, image))
    }

    /// Read and decode a stored image
    pub(crate) async fn load(&self, reference: &ImageRef) -> PageDiffResult<RasterImage> {
        let bytes = self.store.read(reference).await?;
        RasterImage::decode(&bytes)
    }

    async fn record_failure(
        &self,
        mut comparison: Comparison,
        page: &Page,
        website: &Website,
        url: &str,
        error: &PageDiffError,
    ) {
        tracing::error!(error = %error, url, "comparison failed");

        comparison.status = ComparisonStatus::Failed;
        if let Err(e) = self.repo.update_comparison(&comparison).await {
            tracing::error!(error = %e, "could not mark comparison failed");
        }

        let failure = ComparisonFailure {
            comparison_id: Some(comparison.id),
            page_name: page.name.clone(),
            page_path: page.path.clone(),
            page_url: url.to_string(),
            website_name: website.name.clone(),
            website_url: website.url.clone(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        };
        notify_quietly(self.notifier.as_ref(), &website.recipients(), &failure).await;
    }

    /// Every comparison of a page, newest first
    ///
    /// # Errors
    ///
    /// Returns error if the repository lookup fails
    pub async fn history(&self, page_id: &str) -> PageDiffResult<Vec<Comparison>> {
        self.repo.page(page_id).await?;
        self.repo.comparisons_for_page(page_id).await
    }
}
