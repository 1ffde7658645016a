//! Whole-website comparison runs.
//!
//! [`BulkRunner::submit`] returns immediately with the page list; the pages
//! are compared one after another on a background task whose progress is
//! published through a `watch` channel. One summary notification is sent
//! at the end if any page failed.

use crate::model::Page;
use crate::notify::{notify_bulk_quietly, BulkFailure, PageFailure};
use crate::orchestrator::ComparisonEngine;
use crate::result::{PageDiffError, PageDiffResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Progress of one bulk job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkProgress {
    /// Job identifier
    pub job_id: String,
    /// Website being compared
    pub website_id: String,
    /// Pages in the job
    pub total: usize,
    /// Pages compared successfully so far
    pub succeeded: usize,
    /// Pages that failed so far
    pub failed: Vec<PageFailure>,
    /// Whether every page has been attempted
    pub done: bool,
}

impl BulkProgress {
    /// Pages attempted so far
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

/// Returned by [`BulkRunner::submit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSubmission {
    /// Job identifier
    pub job_id: String,
    /// Pages that will be compared, in run order
    pub pages: Vec<Page>,
    /// True when an existing job for the website was returned instead
    pub already_running: bool,
}

/// Finished jobs whose progress stays queryable by default
pub const DEFAULT_FINISHED_JOBS_KEPT: usize = 64;

#[derive(Debug, Default)]
struct Jobs {
    progress: HashMap<String, watch::Receiver<BulkProgress>>,
    pages: HashMap<String, Vec<Page>>,
    running: HashMap<String, String>,
    finished: VecDeque<String>,
    keep_finished: usize,
}

impl Jobs {
    /// Retire a finished job, forgetting the oldest beyond the retention limit
    fn finish(&mut self, website_id: &str, job_id: &str) {
        self.running.remove(website_id);
        self.pages.remove(job_id);
        self.finished.push_back(job_id.to_string());
        while self.finished.len() > self.keep_finished {
            if let Some(old) = self.finished.pop_front() {
                self.progress.remove(&old);
            }
        }
    }
}

/// Schedules bulk runs on the tokio runtime
#[derive(Debug, Clone)]
pub struct BulkRunner {
    engine: Arc<ComparisonEngine>,
    jobs: Arc<Mutex<Jobs>>,
}

impl BulkRunner {
    /// Runner over `engine`
    #[must_use]
    pub fn new(engine: Arc<ComparisonEngine>) -> Self {
        Self::with_retention(engine, DEFAULT_FINISHED_JOBS_KEPT)
    }

    /// Runner that keeps the progress of at most `keep_finished` finished jobs
    #[must_use]
    pub fn with_retention(engine: Arc<ComparisonEngine>, keep_finished: usize) -> Self {
        Self {
            engine,
            jobs: Arc::new(Mutex::new(Jobs {
                keep_finished,
                ..Jobs::default()
            })),
        }
    }

    /// The engine pages are compared with
    #[must_use]
    pub fn engine(&self) -> &Arc<ComparisonEngine> {
        &self.engine
    }

    /// Start comparing every page of `website_id`.
    ///
    /// A website with a job still running gets that job back.
    ///
    /// # Errors
    ///
    /// Returns error if the website does not exist or has no pages
    pub async fn submit(&self, website_id: &str) -> PageDiffResult<BulkSubmission> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job_id) = jobs.running.get(website_id) {
            tracing::info!(website_id, job_id = %job_id, "bulk job already running");
            return Ok(BulkSubmission {
                job_id: job_id.clone(),
                pages: jobs.pages.get(job_id).cloned().unwrap_or_default(),
                already_running: true,
            });
        }

        let website = self.engine.repository().website(website_id).await?;
        let pages = self.engine.repository().pages_for_website(website_id).await?;
        if pages.is_empty() {
            return Err(PageDiffError::not_found("pages of website", website_id));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = watch::channel(BulkProgress {
            job_id: job_id.clone(),
            website_id: website_id.to_string(),
            total: pages.len(),
            succeeded: 0,
            failed: Vec::new(),
            done: false,
        });
        jobs.progress.insert(job_id.clone(), rx);
        jobs.pages.insert(job_id.clone(), pages.clone());
        jobs.running.insert(website_id.to_string(), job_id.clone());
        drop(jobs);

        tracing::info!(website_id, job_id = %job_id, pages = pages.len(), "bulk job submitted");

        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.jobs);
        let run_pages = pages.clone();
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            for page in &run_pages {
                let result = engine.run_comparison(&page.id).await;
                tx.send_modify(|p| match result {
                    Ok(_) => p.succeeded += 1,
                    Err(e) => p.failed.push(PageFailure {
                        page_id: page.id.clone(),
                        page_name: page.name.clone(),
                        page_path: page.path.clone(),
                        error_message: e.to_string(),
                    }),
                });
            }

            let summary = tx.borrow().clone();
            tracing::info!(
                job_id = %summary.job_id,
                succeeded = summary.succeeded,
                failed = summary.failed.len(),
                "bulk job finished"
            );
            if !summary.failed.is_empty() {
                let failure = BulkFailure {
                    website_name: website.name.clone(),
                    website_url: website.url.clone(),
                    total_pages: summary.total,
                    failed_pages: summary.failed,
                    successful_pages: summary.succeeded,
                    timestamp: Utc::now(),
                };
                notify_bulk_quietly(engine.notifier().as_ref(), &website.recipients(), &failure)
                    .await;
            }

            let mut jobs = registry.lock().await;
            jobs.finish(&website.id, &task_job_id);
            tx.send_modify(|p| p.done = true);
        });

        Ok(BulkSubmission {
            job_id,
            pages,
            already_running: false,
        })
    }

    /// Latest progress of a job
    ///
    /// # Errors
    ///
    /// Returns error if the job is unknown or has been forgotten
    pub async fn status(&self, job_id: &str) -> PageDiffResult<BulkProgress> {
        let jobs = self.jobs.lock().await;
        let rx = jobs
            .progress
            .get(job_id)
            .ok_or_else(|| PageDiffError::not_found("bulk job", job_id))?;
        let progress = rx.borrow().clone();
        Ok(progress)
    }

    /// Wait until a job has attempted every page
    ///
    /// # Errors
    ///
    /// Returns error if the job is unknown or its task died early
    pub async fn wait(&self, job_id: &str) -> PageDiffResult<BulkProgress> {
        let mut rx = {
            let jobs = self.jobs.lock().await;
            jobs.progress
                .get(job_id)
                .cloned()
                .ok_or_else(|| PageDiffError::not_found("bulk job", job_id))?
        };
        let progress = rx
            .wait_for(|p| p.done)
            .await
            .map_err(|_| PageDiffError::store(format!("bulk job {job_id} stopped before finishing")))?
            .clone();
        Ok(progress)
    }
}
