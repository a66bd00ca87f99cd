use crate::engine::{FileBucket, FileBucketInner};
use crate::error::{FileBlobError, FileBlobErrorExt};
use crate::signer::UrlSigner;
use private::Sealed;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

/// Smallest non-final part accepted by `complete_multipart_upload`.
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
/// Page size used when a listing asks for `0`.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct FileBucketConfig {
    min_part_size: u64,
    default_page_size: usize,
    url_signer: Option<Arc<dyn UrlSigner>>,
    create_dir: bool,
    stale_after: Duration,
    purge_on_open: bool,
}

impl Default for FileBucketConfig {
    fn default() -> Self {
        Self {
            min_part_size: DEFAULT_MIN_PART_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            url_signer: None,
            create_dir: true,
            stale_after: Duration::from_secs(3600),
            purge_on_open: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}

#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct FileBucketBuilder<S: Sealed = NoRoot> {
    state: S,
    config: FileBucketConfig,
}

#[allow(private_bounds)]
impl<S: Sealed> FileBucketBuilder<S> {
    #[must_use = "Sets the minimum size of every part but the last"]
    pub const fn min_part_size(mut self, bytes: u64) -> Self {
        self.config.min_part_size = bytes;
        self
    }

    #[must_use = "Sets the page size used when a listing does not ask for one"]
    pub const fn default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size;
        self
    }

    #[must_use = "Enables signed URLs"]
    pub fn url_signer(mut self, signer: Arc<dyn UrlSigner>) -> Self {
        self.config.url_signer = Some(signer);
        self
    }

    #[must_use = "Sets whether a missing root directory is created"]
    pub const fn create_dir(mut self, enable: bool) -> Self {
        self.config.create_dir = enable;
        self
    }

    #[must_use = "Sets the age after which temporary files count as abandoned"]
    pub const fn stale_after(mut self, age: Duration) -> Self {
        self.config.stale_after = age;
        self
    }

    #[must_use = "Sets whether abandoned temporary files are purged on open"]
    pub const fn purge_on_open(mut self, enable: bool) -> Self {
        self.config.purge_on_open = enable;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> FileBucketBuilder<N> {
        FileBucketBuilder { state, config: self.config }
    }
}

impl FileBucketBuilder<NoRoot> {
    #[must_use = "Creates a new bucket builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the directory that holds the bucket"]
    pub fn root(self, path: impl Into<PathBuf>) -> FileBucketBuilder<WithRoot> {
        self.transition(WithRoot(path.into()))
    }
}

impl FileBucketBuilder<WithRoot> {
    /// Opens the bucket.
    ///
    /// Creates the root when `create_dir(true)` (the default), resolves it to a
    /// canonical path and, unless disabled, purges temporary files older than
    /// `stale_after` left by interrupted writers.
    ///
    /// # Errors
    ///
    /// - [`FileBlobError::InvalidFormat`] for a zero default page size.
    /// - [`FileBlobError::NotFound`] if the root is missing and may not be created.
    /// - [`FileBlobError::Io`] if the root cannot be created or resolved.
    pub async fn open(self) -> Result<FileBucket, FileBlobError> {
        let root = &self.state.0;
        if self.config.default_page_size == 0 {
            return Err(FileBlobError::invalid_format("default page size must be positive"));
        }

        if self.config.create_dir {
            fs::create_dir_all(root)
                .await
                .context(format!("Failed to bootstrap bucket root: {}", root.display()))?;
        }

        let canonical = fs::canonicalize(root).await.map_err(|e| {
            FileBlobError::from_io(e, &root.display().to_string(), "Resolving bucket root")
        })?;
        if !fs::metadata(&canonical).await.context("Stat bucket root")?.is_dir() {
            return Err(FileBlobError::invalid_format(format!(
                "bucket root {} is not a directory",
                canonical.display()
            )));
        }

        let bucket = FileBucket {
            inner: Arc::new(FileBucketInner {
                root: canonical,
                min_part_size: self.config.min_part_size,
                default_page_size: self.config.default_page_size,
                url_signer: self.config.url_signer,
                stale_after: self.config.stale_after,
                tmp_counter: AtomicU64::new(1),
                publish_locks: std::array::from_fn(|_| Mutex::new(())),
            }),
        };

        if self.config.purge_on_open {
            bucket.purge_stale().await;
        }

        info!(root = %bucket.root().display(), signed_urls = bucket.url_signer().is_some(), "Bucket opened");
        Ok(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stow_blob::ErrorCode;

    #[tokio::test]
    async fn missing_root_is_not_created_when_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FileBucket::builder()
            .root(tmp.path().join("absent"))
            .create_dir(false)
            .open()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn root_is_created_and_canonical() {
        let tmp = tempfile::tempdir().unwrap();
        let bucket = FileBucket::builder().root(tmp.path().join("nested/root")).open().await.unwrap();
        assert!(bucket.root().is_absolute());
        assert!(bucket.root().ends_with("nested/root"));
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let result = FileBucket::builder().root(tmp.path()).default_page_size(0).open().await;
        assert!(matches!(result, Err(FileBlobError::InvalidFormat { .. })));
    }
}
