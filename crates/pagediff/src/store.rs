//! Content store for image bytes.
//!
//! Images are write-once: every write gets a fresh reference, and a
//! reference is never rewritten in place.

use crate::model::ImageRef;
use crate::result::{PageDiffError, PageDiffResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Prefix every reference handed out by the stores
pub const REF_PREFIX: &str = "/screenshots/";

/// Flat, reference-addressed byte store
#[async_trait]
pub trait ContentStore: Send + Sync + std::fmt::Debug {
    /// Read the bytes behind `reference`
    async fn read(&self, reference: &ImageRef) -> PageDiffResult<Vec<u8>>;

    /// Store `bytes`, naming the file after `hint` (usually the captured URL)
    async fn write(&self, hint: &str, bytes: Vec<u8>) -> PageDiffResult<ImageRef>;

    /// Remove the bytes behind `reference`
    async fn delete(&self, reference: &ImageRef) -> PageDiffResult<()>;

    /// Whether `reference` currently resolves
    async fn exists(&self, reference: &ImageRef) -> bool;
}

/// Name for a new object: `<sha256(hint)[..16]>-<millis>-<seq>.png`
fn object_name(hint: &str, seq: u64) -> String {
    let digest = Sha256::digest(hint.as_bytes());
    let hash = format!("{digest:x}");
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}-{millis}-{seq}.png", &hash[..16])
}

/// File name behind a reference, rejecting anything that could escape the root
fn file_name(reference: &ImageRef) -> PageDiffResult<&str> {
    let name = reference
        .as_str()
        .strip_prefix(REF_PREFIX)
        .unwrap_or_else(|| reference.as_str());
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(PageDiffError::store(format!(
            "invalid image reference: {reference}"
        )));
    }
    Ok(name)
}

/// Store backed by a directory on disk
#[derive(Debug)]
pub struct FsContentStore {
    root: PathBuf,
    seq: AtomicU64,
}

impl FsContentStore {
    /// Open (and create if needed) a store rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(root: impl Into<PathBuf>) -> PageDiffResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            seq: AtomicU64::new(0),
        })
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path on disk for `reference`
    ///
    /// # Errors
    ///
    /// Returns error if the reference is malformed
    pub fn path_for(&self, reference: &ImageRef) -> PageDiffResult<PathBuf> {
        Ok(self.root.join(file_name(reference)?))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn read(&self, reference: &ImageRef) -> PageDiffResult<Vec<u8>> {
        let path = self.path_for(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PageDiffError::not_found("image", reference.as_str()))
            }
            Err(e) => Err(PageDiffError::image_io(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write(&self, hint: &str, bytes: Vec<u8>) -> PageDiffResult<ImageRef> {
        let name = object_name(hint, self.seq.fetch_add(1, Ordering::Relaxed));
        let path = self.root.join(&name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            PageDiffError::image_io(format!("Failed to write {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "stored image");
        Ok(ImageRef::new(format!("{REF_PREFIX}{name}")))
    }

    async fn delete(&self, reference: &ImageRef) -> PageDiffResult<()> {
        let path = self.path_for(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PageDiffError::not_found("image", reference.as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, reference: &ImageRef) -> bool {
        match self.path_for(reference) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// In-process store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: RwLock<HashMap<ImageRef, Vec<u8>>>,
    seq: AtomicU64,
}

impl MemoryContentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Place bytes under a caller-chosen reference
    pub async fn insert(&self, reference: ImageRef, bytes: Vec<u8>) {
        self.objects.write().await.insert(reference, bytes);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn read(&self, reference: &ImageRef) -> PageDiffResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| PageDiffError::not_found("image", reference.as_str()))
    }

    async fn write(&self, hint: &str, bytes: Vec<u8>) -> PageDiffResult<ImageRef> {
        let name = object_name(hint, self.seq.fetch_add(1, Ordering::Relaxed));
        let reference = ImageRef::new(format!("{REF_PREFIX}{name}"));
        self.objects.write().await.insert(reference.clone(), bytes);
        Ok(reference)
    }

    async fn delete(&self, reference: &ImageRef) -> PageDiffResult<()> {
        self.objects
            .write()
            .await
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| PageDiffError::not_found("image", reference.as_str()))
    }

    async fn exists(&self, reference: &ImageRef) -> bool {
        self.objects.read().await.contains_key(reference)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_object_name_shape() {
        let name = object_name("https://example.com/", 7);
        assert!(name.ends_with("-7.png"));
        assert_eq!(name.split('-').next().unwrap().len(), 16);
    }

    #[test]
    fn test_file_name_rejects_traversal() {
        assert!(file_name(&ImageRef::new("/screenshots/../etc/passwd")).is_err());
        assert!(file_name(&ImageRef::new("/screenshots/")).is_err());
        assert!(file_name(&ImageRef::new("/screenshots/a/b.png")).is_err());
        assert_eq!(file_name(&ImageRef::new("/screenshots/a.png")).unwrap(), "a.png");
        assert_eq!(file_name(&ImageRef::new("a.png")).unwrap(), "a.png");
    }

    #[tokio::test]
    async fn test_fs_store_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::open(dir.path().join("shots")).unwrap();

        let r = store.write("https://example.com/", vec![1, 2, 3]).await.unwrap();
        assert!(r.as_str().starts_with(REF_PREFIX));
        assert!(store.exists(&r).await);
        assert_eq!(store.read(&r).await.unwrap(), vec![1, 2, 3]);

        store.delete(&r).await.unwrap();
        assert!(!store.exists(&r).await);
        assert!(store.read(&r).await.unwrap_err().is_image_io());
        assert!(store.delete(&r).await.is_err());
    }

    #[tokio::test]
    async fn test_fs_store_refs_are_unique() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::open(dir.path()).unwrap();
        let a = store.write("same", vec![1]).await.unwrap();
        let b = store.write("same", vec![2]).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.read(&a).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryContentStore::new();
        assert!(store.is_empty().await);
        let r = store.write("diff", vec![9]).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.read(&r).await.unwrap(), vec![9]);
        store.delete(&r).await.unwrap();
        assert!(store.read(&r).await.unwrap_err().is_image_io());
    }
}
