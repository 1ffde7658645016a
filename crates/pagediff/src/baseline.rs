//! Baseline candidates and manual overrides.

use crate::diff::normalize_and_diff;
use crate::model::{BaselineCandidate, Comparison, ComparisonStatus, ImageRef};
use crate::orchestrator::ComparisonEngine;
use crate::result::PageDiffResult;

impl ComparisonEngine {
    /// Images from the page's completed comparisons that could serve as its
    /// baseline, newest comparison first, baseline before current within one.
    ///
    /// # Errors
    ///
    /// Returns error if `comparison_id` does not exist
    pub async fn list_candidates(&self, comparison_id: &str) -> PageDiffResult<Vec<BaselineCandidate>> {
        let comparison = self.repo.comparison(comparison_id).await?;
        let history = self.repo.comparisons_for_page(&comparison.page_id).await?;
        Ok(history
            .iter()
            .filter(|c| c.status == ComparisonStatus::Completed)
            .flat_map(Comparison::candidates)
            .collect())
    }

    /// Make `image` the baseline of `comparison_id` and of every later
    /// comparison of the same page.
    ///
    /// The target's diff is recomputed when it has a current image. If the
    /// recompute or its save fails the override still stands and the old
    /// diff fields are kept.
    /// Status is left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the comparison does not exist or the baseline cannot
    /// be persisted
    #[tracing::instrument(skip(self, image), fields(image = %image))]
    pub async fn override_baseline(
        &self,
        comparison_id: &str,
        image: &ImageRef,
    ) -> PageDiffResult<Comparison> {
        let page_id = self.repo.comparison(comparison_id).await?.page_id;
        let _guard = self.locks.acquire(&page_id).await;

        let target = self.repo.comparison(comparison_id).await?;
        self.repo.set_baseline(&target.id, image).await?;

        if let Some(current) = &target.current_image {
            if let Err(e) = self.refresh_diff(&target.id, image, current).await {
                tracing::warn!(error = %e, "diff not recomputed after baseline override");
            }
        }

        let propagated = self
            .repo
            .set_baseline_after(&target.page_id, target.created_at, image)
            .await?;
        tracing::info!(propagated, "baseline overridden");

        self.repo.comparison(&target.id).await
    }

    async fn refresh_diff(
        &self,
        comparison_id: &str,
        baseline: &ImageRef,
        current: &ImageRef,
    ) -> PageDiffResult<()> {
        let (diff_image, percentage) = self.rediff(baseline, current).await?;
        let mut updated = self.repo.comparison(comparison_id).await?;
        updated.diff_image = Some(diff_image);
        updated.diff_percentage = Some(percentage);
        self.repo.update_comparison(&updated).await
    }

    async fn rediff(&self, baseline: &ImageRef, current: &ImageRef) -> PageDiffResult<(ImageRef, f64)> {
        let baseline = self.load(baseline).await?;
        let current = self.load(current).await?;
        let outcome = normalize_and_diff(&baseline, &current, &self.diff_config)?;
        let diff_image = self.store.write("diff", outcome.image.encode_png()?).await?;
        Ok((diff_image, outcome.diff_percentage))
    }
}
