//! Wiring of the engine collaborators shared by commands and the HTTP API.

use crate::error::CliResult;
use async_trait::async_trait;
use pagediff::{
    capture_from_config, BulkRunner, ComparisonEngine, ContentStore, EngineConfig,
    FailureNotifier, FsContentStore, ImageRef, InMemoryRepository, LogNotifier, PageDiffError,
    PageDiffResult, ScreenshotCapture,
};
use std::sync::Arc;

/// Stand-in capture when no browser backend is compiled in.
/// Every capture fails with the configuration error that explains why.
#[derive(Debug)]
struct UnavailableCapture {
    reason: String,
}

#[async_trait]
impl ScreenshotCapture for UnavailableCapture {
    async fn capture(&self, _url: &str) -> PageDiffResult<ImageRef> {
        Err(PageDiffError::config(self.reason.clone()))
    }
}

/// Everything a command needs, cheap to clone
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Effective engine configuration
    pub config: EngineConfig,
    /// Persistent repository
    pub repo: Arc<InMemoryRepository>,
    /// Screenshot storage
    pub store: Arc<dyn ContentStore>,
    /// Comparison engine
    pub engine: Arc<ComparisonEngine>,
    /// Bulk job scheduler
    pub bulk: BulkRunner,
}

impl AppContext {
    /// Open the state file and image directory named in `config`
    pub fn open(config: EngineConfig) -> CliResult<Self> {
        let repo = Arc::new(InMemoryRepository::open(&config.state_file)?);
        let store: Arc<dyn ContentStore> = Arc::new(FsContentStore::open(&config.store_dir)?);
        let capture = match capture_from_config(&config, Arc::clone(&store)) {
            Ok(capture) => capture,
            Err(e) => {
                tracing::debug!(error = %e, "screenshot capture unavailable");
                Arc::new(UnavailableCapture {
                    reason: e.to_string(),
                })
            }
        };
        Ok(Self::with_parts(config, repo, store, capture, Arc::new(LogNotifier)))
    }

    /// Assemble from explicit collaborators
    #[must_use]
    pub fn with_parts(
        config: EngineConfig,
        repo: Arc<InMemoryRepository>,
        store: Arc<dyn ContentStore>,
        capture: Arc<dyn ScreenshotCapture>,
        notifier: Arc<dyn FailureNotifier>,
    ) -> Self {
        let engine = Arc::new(ComparisonEngine::new(
            &config,
            repo.clone(),
            Arc::clone(&store),
            capture,
            notifier,
        ));
        let bulk = BulkRunner::new(Arc::clone(&engine));
        Self {
            config,
            repo,
            store,
            engine,
            bulk,
        }
    }
}
