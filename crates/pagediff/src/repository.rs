//! Persistence for websites, pages, and comparisons.
//!
//! The engine only needs the [`Repository`] trait. [`InMemoryRepository`]
//! implements it over in-process maps and can snapshot itself to a JSON file
//! so the CLI keeps state between runs.

use crate::model::{Comparison, ImageRef, Page, Website};
use crate::result::{PageDiffError, PageDiffResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Read/write access to the rows the engine touches
#[async_trait]
pub trait Repository: Send + Sync + std::fmt::Debug {
    /// Look up a website
    async fn website(&self, id: &str) -> PageDiffResult<Website>;

    /// Look up a page
    async fn page(&self, id: &str) -> PageDiffResult<Page>;

    /// Pages of a website, newest first
    async fn pages_for_website(&self, website_id: &str) -> PageDiffResult<Vec<Page>>;

    /// Insert a new pending comparison for `page_id`
    async fn create_comparison(
        &self,
        page_id: &str,
        now: DateTime<Utc>,
    ) -> PageDiffResult<Comparison>;

    /// Look up a comparison
    async fn comparison(&self, id: &str) -> PageDiffResult<Comparison>;

    /// Replace a stored comparison with `comparison`
    async fn update_comparison(&self, comparison: &Comparison) -> PageDiffResult<()>;

    /// Most recent comparison of `page_id` other than `exclude` that has a baseline
    async fn latest_with_baseline(
        &self,
        page_id: &str,
        exclude: &str,
    ) -> PageDiffResult<Option<Comparison>>;

    /// Every comparison of `page_id`, newest first
    async fn comparisons_for_page(&self, page_id: &str) -> PageDiffResult<Vec<Comparison>>;

    /// Set the baseline of one comparison
    async fn set_baseline(&self, comparison_id: &str, image: &ImageRef) -> PageDiffResult<()>;

    /// Set the baseline of every comparison of `page_id` created strictly after `after`.
    /// Returns how many rows changed.
    async fn set_baseline_after(
        &self,
        page_id: &str,
        after: DateTime<Utc>,
        image: &ImageRef,
    ) -> PageDiffResult<usize>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tables {
    #[serde(default)]
    websites: BTreeMap<String, Website>,
    #[serde(default)]
    pages: BTreeMap<String, Page>,
    #[serde(default)]
    comparisons: BTreeMap<String, Comparison>,
}

/// Map-backed repository with optional write-through JSON snapshot
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    snapshot: Option<PathBuf>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Newest first; creation-time ties broken by id for a stable order
fn newest_first(rows: &mut [Comparison]) {
    rows.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

impl InMemoryRepository {
    /// Empty repository without persistence
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from `path` if it exists; every mutation is written back to it
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> PageDiffResult<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Tables::default()
        };
        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(path),
        })
    }

    /// Snapshot file, if any
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Write the current state to the snapshot file
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails
    pub async fn flush(&self) -> PageDiffResult<()> {
        let tables = self.tables.read().await;
        self.persist(&tables).await
    }

    /// Write-through after every mutation when a snapshot file is set
    async fn persist(&self, tables: &Tables) -> PageDiffResult<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(tables)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Register a website
    ///
    /// # Errors
    ///
    /// Returns error if the URL does not parse
    pub async fn insert_website(
        &self,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> PageDiffResult<Website> {
        let url = url.into();
        url::Url::parse(&url)
            .map_err(|e| PageDiffError::config(format!("invalid website URL '{url}': {e}")))?;
        let website = Website {
            id: new_id(),
            name: name.into(),
            url,
            owner: None,
            editors: Vec::new(),
            created_at: Utc::now(),
        };
        let mut tables = self.tables.write().await;
        tables.websites.insert(website.id.clone(), website.clone());
        self.persist(&tables).await?;
        Ok(website)
    }

    /// Replace a stored website (e.g. to change its recipients)
    ///
    /// # Errors
    ///
    /// Returns error if the website does not exist
    pub async fn update_website(&self, website: &Website) -> PageDiffResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .websites
            .get_mut(&website.id)
            .ok_or_else(|| PageDiffError::not_found("website", &website.id))?;
        *slot = website.clone();
        self.persist(&tables).await
    }

    /// All websites, oldest first
    pub async fn websites(&self) -> Vec<Website> {
        let mut sites: Vec<Website> = self.tables.read().await.websites.values().cloned().collect();
        sites.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sites
    }

    /// Declare a page on a website
    ///
    /// # Errors
    ///
    /// Returns error if the website does not exist
    pub async fn insert_page(
        &self,
        website_id: &str,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> PageDiffResult<Page> {
        let mut tables = self.tables.write().await;
        if !tables.websites.contains_key(website_id) {
            return Err(PageDiffError::not_found("website", website_id));
        }
        let page = Page {
            id: new_id(),
            website_id: website_id.to_string(),
            name: name.into(),
            path: path.into(),
            created_at: Utc::now(),
        };
        tables.pages.insert(page.id.clone(), page.clone());
        self.persist(&tables).await?;
        Ok(page)
    }

    /// Delete a page and every comparison it owns
    ///
    /// # Errors
    ///
    /// Returns error if the page does not exist
    pub async fn delete_page(&self, page_id: &str) -> PageDiffResult<Page> {
        let mut tables = self.tables.write().await;
        let page = tables
            .pages
            .remove(page_id)
            .ok_or_else(|| PageDiffError::not_found("page", page_id))?;
        tables.comparisons.retain(|_, c| c.page_id != page_id);
        self.persist(&tables).await?;
        Ok(page)
    }

    /// Insert a fully-formed comparison (used to import history)
    ///
    /// # Errors
    ///
    /// Returns error if the page does not exist or the snapshot write fails
    pub async fn insert_comparison(&self, comparison: Comparison) -> PageDiffResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.pages.contains_key(&comparison.page_id) {
            return Err(PageDiffError::not_found("page", &comparison.page_id));
        }
        tables
            .comparisons
            .insert(comparison.id.clone(), comparison);
        self.persist(&tables).await
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn website(&self, id: &str) -> PageDiffResult<Website> {
        self.tables
            .read()
            .await
            .websites
            .get(id)
            .cloned()
            .ok_or_else(|| PageDiffError::not_found("website", id))
    }

    async fn page(&self, id: &str) -> PageDiffResult<Page> {
        self.tables
            .read()
            .await
            .pages
            .get(id)
            .cloned()
            .ok_or_else(|| PageDiffError::not_found("page", id))
    }

    async fn pages_for_website(&self, website_id: &str) -> PageDiffResult<Vec<Page>> {
        let tables = self.tables.read().await;
        if !tables.websites.contains_key(website_id) {
            return Err(PageDiffError::not_found("website", website_id));
        }
        let mut pages: Vec<Page> = tables
            .pages
            .values()
            .filter(|p| p.website_id == website_id)
            .cloned()
            .collect();
        pages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pages)
    }

    async fn create_comparison(
        &self,
        page_id: &str,
        now: DateTime<Utc>,
    ) -> PageDiffResult<Comparison> {
        let mut tables = self.tables.write().await;
        if !tables.pages.contains_key(page_id) {
            return Err(PageDiffError::not_found("page", page_id));
        }
        let comparison = Comparison::pending(new_id(), page_id, now);
        tables
            .comparisons
            .insert(comparison.id.clone(), comparison.clone());
        self.persist(&tables).await?;
        Ok(comparison)
    }

    async fn comparison(&self, id: &str) -> PageDiffResult<Comparison> {
        self.tables
            .read()
            .await
            .comparisons
            .get(id)
            .cloned()
            .ok_or_else(|| PageDiffError::not_found("comparison", id))
    }

    async fn update_comparison(&self, comparison: &Comparison) -> PageDiffResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .comparisons
            .get_mut(&comparison.id)
            .ok_or_else(|| PageDiffError::not_found("comparison", &comparison.id))?;
        *slot = comparison.clone();
        self.persist(&tables).await
    }

    async fn latest_with_baseline(
        &self,
        page_id: &str,
        exclude: &str,
    ) -> PageDiffResult<Option<Comparison>> {
        let mut rows = self.comparisons_for_page(page_id).await?;
        rows.retain(|c| c.id != exclude && c.baseline_image.is_some());
        Ok(rows.into_iter().next())
    }

    async fn comparisons_for_page(&self, page_id: &str) -> PageDiffResult<Vec<Comparison>> {
        let mut rows: Vec<Comparison> = self
            .tables
            .read()
            .await
            .comparisons
            .values()
            .filter(|c| c.page_id == page_id)
            .cloned()
            .collect();
        newest_first(&mut rows);
        Ok(rows)
    }

    async fn set_baseline(&self, comparison_id: &str, image: &ImageRef) -> PageDiffResult<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .comparisons
            .get_mut(comparison_id)
            .ok_or_else(|| PageDiffError::not_found("comparison", comparison_id))?;
        row.baseline_image = Some(image.clone());
        self.persist(&tables).await
    }

    async fn set_baseline_after(
        &self,
        page_id: &str,
        after: DateTime<Utc>,
        image: &ImageRef,
    ) -> PageDiffResult<usize> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for row in tables
            .comparisons
            .values_mut()
            .filter(|c| c.page_id == page_id && c.created_at > after)
        {
            row.baseline_image = Some(image.clone());
            changed += 1;
        }
        self.persist(&tables).await?;
        Ok(changed)
    }
}
