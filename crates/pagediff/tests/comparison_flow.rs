//! End-to-end comparison flows against in-memory collaborators.
//!
//! Captures are scripted so every scenario is deterministic and runs
//! without a browser.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pagediff::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const RED: [u8; 4] = [255, 0, 0, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

// ============================================================================
// Fakes
// ============================================================================

#[derive(Debug)]
enum Shot {
    Image(RasterImage),
    /// Stored bytes that are not an image
    Corrupt,
    Timeout,
}

/// Hands out scripted screenshots, then plain white canonical pages
#[derive(Debug)]
struct ScriptedCapture {
    store: Arc<dyn ContentStore>,
    script: Mutex<VecDeque<Shot>>,
    calls: AtomicUsize,
}

impl ScriptedCapture {
    fn new(store: Arc<dyn ContentStore>, shots: Vec<Shot>) -> Self {
        Self {
            store,
            script: Mutex::new(shots.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenshotCapture for ScriptedCapture {
    async fn capture(&self, url: &str) -> PageDiffResult<ImageRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let shot = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Shot::Image(RasterImage::white(CANONICAL_WIDTH, CANONICAL_HEIGHT)));
        match shot {
            Shot::Image(image) => self.store.write(url, image.encode_png()?).await,
            Shot::Corrupt => self.store.write(url, b"not a png".to_vec()).await,
            Shot::Timeout => Err(PageDiffError::CaptureTimeout {
                url: url.to_string(),
                ms: CAPTURE_TIMEOUT_MS,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct RecordingNotifier {
    failures: Mutex<Vec<ComparisonFailure>>,
    bulk: Mutex<Vec<BulkFailure>>,
    /// Record, then report a delivery error
    undeliverable: bool,
}

impl RecordingNotifier {
    fn delivered(&self) -> PageDiffResult<()> {
        if self.undeliverable {
            Err(PageDiffError::store("mail relay unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify_failure(
        &self,
        _recipients: &[Recipient],
        failure: &ComparisonFailure,
    ) -> PageDiffResult<()> {
        self.failures.lock().unwrap().push(failure.clone());
        self.delivered()
    }

    async fn notify_bulk_failure(
        &self,
        _recipients: &[Recipient],
        failure: &BulkFailure,
    ) -> PageDiffResult<()> {
        self.bulk.lock().unwrap().push(failure.clone());
        self.delivered()
    }
}

struct Harness {
    repo: Arc<InMemoryRepository>,
    store: Arc<MemoryContentStore>,
    capture: Arc<ScriptedCapture>,
    notifier: Arc<RecordingNotifier>,
    engine: Arc<ComparisonEngine>,
    website: Website,
    page: Page,
}

/// Delegates to an in-memory repository but refuses comparison updates
/// once `reject_updates` is set
#[derive(Debug)]
struct FlakyRepository {
    inner: Arc<InMemoryRepository>,
    reject_updates: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn website(&self, id: &str) -> PageDiffResult<Website> {
        self.inner.website(id).await
    }

    async fn page(&self, id: &str) -> PageDiffResult<Page> {
        self.inner.page(id).await
    }

    async fn pages_for_website(&self, website_id: &str) -> PageDiffResult<Vec<Page>> {
        self.inner.pages_for_website(website_id).await
    }

    async fn create_comparison(
        &self,
        page_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> PageDiffResult<Comparison> {
        self.inner.create_comparison(page_id, now).await
    }

    async fn comparison(&self, id: &str) -> PageDiffResult<Comparison> {
        self.inner.comparison(id).await
    }

    async fn update_comparison(&self, comparison: &Comparison) -> PageDiffResult<()> {
        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(PageDiffError::store("state file is read-only"));
        }
        self.inner.update_comparison(comparison).await
    }

    async fn latest_with_baseline(
        &self,
        page_id: &str,
        exclude: &str,
    ) -> PageDiffResult<Option<Comparison>> {
        self.inner.latest_with_baseline(page_id, exclude).await
    }

    async fn comparisons_for_page(&self, page_id: &str) -> PageDiffResult<Vec<Comparison>> {
        self.inner.comparisons_for_page(page_id).await
    }

    async fn set_baseline(&self, comparison_id: &str, image: &ImageRef) -> PageDiffResult<()> {
        self.inner.set_baseline(comparison_id, image).await
    }

    async fn set_baseline_after(
        &self,
        page_id: &str,
        after: chrono::DateTime<Utc>,
        image: &ImageRef,
    ) -> PageDiffResult<usize> {
        self.inner.set_baseline_after(page_id, after, image).await
    }
}

async fn harness(shots: Vec<Shot>) -> Harness {
    harness_with(shots, RecordingNotifier::default()).await
}

async fn harness_with(shots: Vec<Shot>, notifier: RecordingNotifier) -> Harness {
    let repo = Arc::new(InMemoryRepository::new());
    let store = Arc::new(MemoryContentStore::new());
    let capture = Arc::new(ScriptedCapture::new(store.clone(), shots));
    let notifier = Arc::new(notifier);

    let mut website = repo
        .insert_website("Example", "https://example.com")
        .await
        .unwrap();
    website.owner = Some(Recipient::new("owner@example.com").with_name("Owner"));
    repo.update_website(&website).await.unwrap();
    let page = repo.insert_page(&website.id, "Home", "/").await.unwrap();

    let engine = Arc::new(ComparisonEngine::new(
        &EngineConfig::default(),
        repo.clone(),
        store.clone(),
        capture.clone(),
        notifier.clone(),
    ));

    Harness {
        repo,
        store,
        capture,
        notifier,
        engine,
        website,
        page,
    }
}

fn canonical(pixel: [u8; 4]) -> RasterImage {
    RasterImage::new_filled(CANONICAL_WIDTH, CANONICAL_HEIGHT, pixel)
}

/// White canonical page extended by `extra` black rows
fn tall_page(extra: u32) -> RasterImage {
    let mut image = RasterImage::new_filled(CANONICAL_WIDTH, CANONICAL_HEIGHT + extra, BLACK);
    image.blit_top_left(&canonical(WHITE));
    image
}

async fn stored(h: &Harness, image: &RasterImage) -> ImageRef {
    h.store
        .write("seed", image.encode_png().unwrap())
        .await
        .unwrap()
}

async fn decode(h: &Harness, reference: &ImageRef) -> RasterImage {
    RasterImage::decode(&h.store.read(reference).await.unwrap()).unwrap()
}

fn count_pixels(image: &RasterImage, pixel: [u8; 4]) -> u64 {
    let mut count = 0;
    for y in 0..image.height() {
        for x in 0..image.width() {
            if image.pixel(x, y) == Some(pixel) {
                count += 1;
            }
        }
    }
    count
}

// ============================================================================
// Single comparisons
// ============================================================================

#[tokio::test]
async fn test_first_comparison_becomes_baseline() {
    let h = harness(vec![Shot::Image(canonical(WHITE))]).await;

    let outcome = h.engine.run_comparison(&h.page.id).await.unwrap();

    assert!(outcome.is_first_comparison);
    assert_eq!(outcome.status, ComparisonStatus::Completed);
    assert_eq!(outcome.diff_percentage, None);

    let row = h.repo.comparison(&outcome.comparison_id).await.unwrap();
    assert_eq!(row.status, ComparisonStatus::Completed);
    assert!(row.baseline_image.is_some());
    assert_eq!(row.baseline_image, row.current_image);
    assert_eq!(row.diff_image, None);
    assert_eq!(row.diff_percentage, None);
    assert!(h.notifier.failures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_identical_capture_scores_zero() {
    let h = harness(vec![
        Shot::Image(canonical(WHITE)),
        Shot::Image(canonical(WHITE)),
    ])
    .await;

    let first = h.engine.run_comparison(&h.page.id).await.unwrap();
    let second = h.engine.run_comparison(&h.page.id).await.unwrap();

    assert!(!second.is_first_comparison);
    assert_eq!(second.diff_percentage, Some(0.0));

    let first_row = h.repo.comparison(&first.comparison_id).await.unwrap();
    let second_row = h.repo.comparison(&second.comparison_id).await.unwrap();
    assert_eq!(second_row.baseline_image, first_row.baseline_image);
    assert_ne!(second_row.current_image, first_row.current_image);

    let diff = decode(&h, second_row.diff_image.as_ref().unwrap()).await;
    assert_eq!(diff.dimensions(), (CANONICAL_WIDTH, CANONICAL_HEIGHT));
    assert_eq!(count_pixels(&diff, RED), 0);
}

#[tokio::test]
async fn test_taller_capture_is_padded_and_scored() {
    let h = harness(vec![Shot::Image(canonical(WHITE)), Shot::Image(tall_page(150))]).await;

    h.engine.run_comparison(&h.page.id).await.unwrap();
    let outcome = h.engine.run_comparison(&h.page.id).await.unwrap();

    let total = f64::from(CANONICAL_WIDTH * (CANONICAL_HEIGHT + 150));
    let differing = f64::from(CANONICAL_WIDTH * 150);
    let expected = differing / total * 100.0;
    let actual = outcome.diff_percentage.unwrap();
    assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");

    let row = h.repo.comparison(&outcome.comparison_id).await.unwrap();
    let diff = decode(&h, row.diff_image.as_ref().unwrap()).await;
    assert_eq!(diff.dimensions(), (CANONICAL_WIDTH, CANONICAL_HEIGHT + 150));
    assert_eq!(count_pixels(&diff, RED), u64::from(CANONICAL_WIDTH * 150));
}

#[tokio::test]
async fn test_legacy_baseline_is_refreshed() {
    let h = harness(vec![
        Shot::Image(canonical(WHITE)),
        Shot::Image(canonical(WHITE)),
    ])
    .await;

    let legacy = stored(&h, &RasterImage::white(1024, 768)).await;
    let mut seeded = Comparison::pending("legacy", &h.page.id, Utc::now() - Duration::hours(1));
    seeded.status = ComparisonStatus::Completed;
    seeded.baseline_image = Some(legacy.clone());
    seeded.current_image = Some(legacy.clone());
    h.repo.insert_comparison(seeded).await.unwrap();

    let outcome = h.engine.run_comparison(&h.page.id).await.unwrap();

    assert_eq!(h.capture.calls(), 2);
    assert_eq!(outcome.diff_percentage, Some(0.0));
    assert!(!h.store.exists(&legacy).await);

    let prior = h.repo.comparison("legacy").await.unwrap();
    let row = h.repo.comparison(&outcome.comparison_id).await.unwrap();
    assert_ne!(prior.baseline_image, Some(legacy));
    assert_eq!(prior.baseline_image, row.baseline_image);

    let baseline = decode(&h, row.baseline_image.as_ref().unwrap()).await;
    assert_eq!(baseline.dimensions(), (CANONICAL_WIDTH, CANONICAL_HEIGHT));
}

#[tokio::test]
async fn test_missing_baseline_bytes_trigger_recapture() {
    let h = harness(vec![
        Shot::Image(canonical(WHITE)),
        Shot::Image(canonical(WHITE)),
    ])
    .await;

    let mut seeded = Comparison::pending("gone", &h.page.id, Utc::now() - Duration::hours(1));
    seeded.status = ComparisonStatus::Completed;
    seeded.baseline_image = Some(ImageRef::new("/screenshots/never-written.png"));
    h.repo.insert_comparison(seeded).await.unwrap();

    let outcome = h.engine.run_comparison(&h.page.id).await.unwrap();
    assert_eq!(outcome.status, ComparisonStatus::Completed);
    assert_eq!(h.capture.calls(), 2);
}

#[tokio::test]
async fn test_capture_timeout_marks_failed_and_notifies_once() {
    let h = harness(vec![Shot::Timeout]).await;

    let err = h.engine.run_comparison(&h.page.id).await.unwrap_err();
    assert!(err.is_render_failure());

    let history = h.engine.history(&h.page.id).await.unwrap();
    assert_eq!(history.len(), 1);
    let row = &history[0];
    assert_eq!(row.status, ComparisonStatus::Failed);
    assert_eq!(row.baseline_image, None);
    assert_eq!(row.current_image, None);
    assert_eq!(row.diff_image, None);

    let failures = h.notifier.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].comparison_id.as_deref(), Some(row.id.as_str()));
    assert_eq!(failures[0].page_url, "https://example.com/");
    assert_eq!(failures[0].website_name, h.website.name);
    assert!(failures[0].error_message.contains("30000"));
}

#[tokio::test]
async fn test_undecodable_capture_marks_failed_and_keeps_error() {
    let h = harness(vec![Shot::Image(canonical(WHITE)), Shot::Corrupt]).await;

    h.engine.run_comparison(&h.page.id).await.unwrap();
    let err = h.engine.run_comparison(&h.page.id).await.unwrap_err();
    assert!(err.is_image_io(), "{err}");

    let history = h.engine.history(&h.page.id).await.unwrap();
    assert_eq!(history.len(), 2);
    let newest = &history[0];
    assert_eq!(newest.status, ComparisonStatus::Failed);
    assert_eq!(newest.baseline_image, None);
    assert_eq!(newest.current_image, None);
    assert_eq!(newest.diff_image, None);
    assert_eq!(newest.diff_percentage, None);
    assert_eq!(history[1].status, ComparisonStatus::Completed);

    let failures = h.notifier.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].comparison_id.as_deref(), Some(newest.id.as_str()));
    assert_eq!(failures[0].error_message, err.to_string());
}

#[tokio::test]
async fn test_notification_error_does_not_replace_original() {
    let notifier = RecordingNotifier {
        undeliverable: true,
        ..RecordingNotifier::default()
    };
    let h = harness_with(vec![Shot::Image(canonical(WHITE)), Shot::Corrupt], notifier).await;

    h.engine.run_comparison(&h.page.id).await.unwrap();
    let err = h.engine.run_comparison(&h.page.id).await.unwrap_err();

    assert!(err.is_image_io(), "{err}");
    assert!(!err.to_string().contains("mail relay"));
    assert_eq!(h.notifier.failures.lock().unwrap().len(), 1);
    let newest = &h.engine.history(&h.page.id).await.unwrap()[0];
    assert_eq!(newest.status, ComparisonStatus::Failed);
}

#[tokio::test]
async fn test_failed_comparison_is_not_a_baseline_source() {
    let h = harness(vec![Shot::Timeout, Shot::Image(canonical(WHITE))]).await;

    assert!(h.engine.run_comparison(&h.page.id).await.is_err());
    let outcome = h.engine.run_comparison(&h.page.id).await.unwrap();
    assert!(outcome.is_first_comparison);
}

#[tokio::test]
async fn test_unknown_page_creates_nothing() {
    let h = harness(vec![]).await;
    let err = h.engine.run_comparison("missing").await.unwrap_err();
    assert!(matches!(err, PageDiffError::NotFound { .. }));
    assert_eq!(h.capture.calls(), 0);
    assert!(h.notifier.failures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_on_one_page_are_serialized() {
    let h = harness(vec![]).await;

    let (a, b) = tokio::join!(
        h.engine.run_comparison(&h.page.id),
        h.engine.run_comparison(&h.page.id)
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let firsts = outcomes.iter().filter(|o| o.is_first_comparison).count();
    assert_eq!(firsts, 1);
    assert!(outcomes
        .iter()
        .all(|o| o.status == ComparisonStatus::Completed));
}

// ============================================================================
// Baseline management
// ============================================================================

async fn seed_history(h: &Harness) -> (Vec<Comparison>, ImageRef) {
    let original = stored(h, &canonical(WHITE)).await;
    let base = Utc::now() - Duration::hours(3);
    let mut rows = Vec::new();
    for i in 0..3 {
        let current = stored(h, &canonical(WHITE)).await;
        let mut row = Comparison::pending(format!("c{i}"), &h.page.id, base + Duration::hours(i));
        row.status = ComparisonStatus::Completed;
        row.baseline_image = Some(original.clone());
        row.current_image = Some(current);
        row.diff_percentage = Some(0.0);
        h.repo.insert_comparison(row.clone()).await.unwrap();
        rows.push(row);
    }
    (rows, original)
}

#[tokio::test]
async fn test_override_propagates_forward_only() {
    let h = harness(vec![]).await;
    let (rows, original) = seed_history(&h).await;
    let replacement = stored(&h, &canonical(BLACK)).await;

    let mut later = rows[2].clone();
    later.diff_percentage = Some(12.5);
    later.diff_image = Some(ImageRef::new("/screenshots/earlier-diff.png"));
    h.repo.update_comparison(&later).await.unwrap();

    let updated = h
        .engine
        .override_baseline(&rows[1].id, &replacement)
        .await
        .unwrap();

    assert_eq!(updated.baseline_image, Some(replacement.clone()));
    assert_eq!(updated.status, ComparisonStatus::Completed);
    assert_eq!(updated.diff_percentage, Some(100.0));
    assert_ne!(updated.diff_image, None);

    let c0 = h.repo.comparison(&rows[0].id).await.unwrap();
    let c2 = h.repo.comparison(&rows[2].id).await.unwrap();
    assert_eq!(c0.baseline_image, Some(original));
    assert_eq!(c0.diff_percentage, Some(0.0));
    assert_eq!(c2.baseline_image, Some(replacement));
    assert_eq!(c2.diff_percentage, Some(12.5));
    assert_eq!(c2.diff_image, later.diff_image);
}

#[tokio::test]
async fn test_override_survives_failed_recompute() {
    let h = harness(vec![]).await;
    let (rows, _) = seed_history(&h).await;
    let dangling = ImageRef::new("/screenshots/missing.png");

    let updated = h
        .engine
        .override_baseline(&rows[2].id, &dangling)
        .await
        .unwrap();

    assert_eq!(updated.baseline_image, Some(dangling));
    assert_eq!(updated.diff_percentage, Some(0.0));
    assert_eq!(updated.diff_image, None);
}

#[tokio::test]
async fn test_override_survives_unsaved_recompute() {
    let h = harness(vec![]).await;
    let (rows, _) = seed_history(&h).await;
    let replacement = stored(&h, &canonical(BLACK)).await;

    let flaky = Arc::new(FlakyRepository {
        inner: h.repo.clone(),
        reject_updates: std::sync::atomic::AtomicBool::new(true),
    });
    let engine = ComparisonEngine::new(
        &EngineConfig::default(),
        flaky,
        h.store.clone(),
        h.capture.clone(),
        h.notifier.clone(),
    );

    let updated = engine
        .override_baseline(&rows[0].id, &replacement)
        .await
        .unwrap();

    assert_eq!(updated.baseline_image, Some(replacement.clone()));
    assert_eq!(updated.diff_percentage, Some(0.0));
    for row in &rows[1..] {
        let later = h.repo.comparison(&row.id).await.unwrap();
        assert_eq!(later.baseline_image, Some(replacement.clone()));
    }
}

#[tokio::test]
async fn test_override_then_run_uses_new_baseline() {
    let h = harness(vec![Shot::Image(canonical(BLACK))]).await;
    let (rows, _) = seed_history(&h).await;
    let replacement = stored(&h, &canonical(BLACK)).await;

    h.engine
        .override_baseline(&rows[2].id, &replacement)
        .await
        .unwrap();
    let outcome = h.engine.run_comparison(&h.page.id).await.unwrap();

    assert_eq!(outcome.diff_percentage, Some(0.0));
    let row = h.repo.comparison(&outcome.comparison_id).await.unwrap();
    assert_eq!(row.baseline_image, Some(replacement));
}

#[tokio::test]
async fn test_candidates_newest_first_and_skip_failed() {
    let h = harness(vec![]).await;
    let (rows, _) = seed_history(&h).await;

    let mut failed = Comparison::pending("failed", &h.page.id, Utc::now());
    failed.status = ComparisonStatus::Failed;
    h.repo.insert_comparison(failed).await.unwrap();

    let candidates = h.engine.list_candidates(&rows[0].id).await.unwrap();
    assert_eq!(candidates.len(), 6);
    assert_eq!(candidates[0].source_comparison_id, rows[2].id);
    assert_eq!(candidates[0].role, CandidateRole::Baseline);
    assert_eq!(candidates[1].role, CandidateRole::Current);
    assert_eq!(candidates[5].source_comparison_id, rows[0].id);
    assert!(candidates
        .iter()
        .all(|c| c.source_comparison_id != "failed"));
}

#[tokio::test]
async fn test_candidates_for_unknown_comparison() {
    let h = harness(vec![]).await;
    let err = h.engine.list_candidates("nope").await.unwrap_err();
    assert!(matches!(err, PageDiffError::NotFound { .. }));
}

// ============================================================================
// Bulk runs
// ============================================================================

#[tokio::test]
async fn test_bulk_run_reports_failures_once() {
    let h = harness(vec![Shot::Timeout, Shot::Image(canonical(WHITE))]).await;
    h.repo
        .insert_page(&h.website.id, "Pricing", "/pricing")
        .await
        .unwrap();

    let runner = BulkRunner::new(h.engine.clone());
    let submission = runner.submit(&h.website.id).await.unwrap();
    assert_eq!(submission.pages.len(), 2);
    assert!(!submission.already_running);

    let progress = runner.wait(&submission.job_id).await.unwrap();
    assert!(progress.done);
    assert_eq!(progress.total, 2);
    assert_eq!(progress.succeeded, 1);
    assert_eq!(progress.failed.len(), 1);
    assert_eq!(progress.attempted(), 2);

    assert_eq!(h.notifier.failures.lock().unwrap().len(), 1);
    let bulk = h.notifier.bulk.lock().unwrap();
    assert_eq!(bulk.len(), 1);
    assert_eq!(bulk[0].total_pages, 2);
    assert_eq!(bulk[0].successful_pages, 1);

    let again = runner.submit(&h.website.id).await.unwrap();
    assert_ne!(again.job_id, submission.job_id);
}

#[tokio::test]
async fn test_bulk_runner_forgets_oldest_finished_jobs() {
    let h = harness(vec![]).await;
    let runner = BulkRunner::with_retention(h.engine.clone(), 2);

    let mut job_ids = Vec::new();
    for _ in 0..3 {
        let submission = runner.submit(&h.website.id).await.unwrap();
        runner.wait(&submission.job_id).await.unwrap();
        job_ids.push(submission.job_id);
    }

    let err = runner.status(&job_ids[0]).await.unwrap_err();
    assert!(matches!(err, PageDiffError::NotFound { .. }));
    for kept in &job_ids[1..] {
        assert!(runner.status(kept).await.unwrap().done);
    }
}

#[tokio::test]
async fn test_bulk_run_without_pages_is_rejected() {
    let h = harness(vec![]).await;
    let empty = h
        .repo
        .insert_website("Empty", "https://empty.example")
        .await
        .unwrap();

    let runner = BulkRunner::new(h.engine.clone());
    let err = runner.submit(&empty.id).await.unwrap_err();
    assert!(matches!(err, PageDiffError::NotFound { .. }));
    assert!(runner.status("unknown").await.is_err());
}
