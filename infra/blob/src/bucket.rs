use crate::driver::{self, Cancelled, Driver, DriverError};
use crate::error::{BlobError, DriverFailure};
use crate::list::ListIterator;
use crate::metadata;
use crate::prefixed::PrefixedDriver;
use crate::reader::Reader;
use crate::types::{
    Attributes, CompletePart, CopyOptions, ListOptions, ListPage, ListPartsOptions, ListPartsPage,
    ObjectInfo, PartInfo, SignedUrlOptions,
};
use crate::writer::{PartWriter, Writer, WriterOptions};
use md5::{Digest, Md5};
use std::mem;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Part numbers accepted by multipart operations.
const PART_NUMBERS: std::ops::RangeInclusive<u32> = 1..=10_000;

const DEFAULT_MULTIPART_CONTENT_TYPE: &str = "application/octet-stream";

/// A backend-independent handle to one bucket.
///
/// Cheap to clone; clones share the driver and the closed state.
///
/// # Examples
///
/// ```rust,ignore
/// let bucket = Bucket::new(driver);
/// bucket.write_all("notes/today.txt", b"hello", WriterOptions::default()).await?;
/// assert_eq!(bucket.read_all("notes/today.txt").await?, b"hello");
/// bucket.close().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Bucket {
    inner: Arc<BucketInner>,
}

#[derive(Debug)]
struct BucketInner {
    driver: Arc<dyn Driver>,
    /// Held for reading by every operation so `close` waits for in-flight calls.
    closed: RwLock<bool>,
}

impl Bucket {
    /// Wraps a driver.
    pub fn new<D: Driver + 'static>(driver: D) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    /// Wraps an already shared driver.
    #[must_use]
    pub fn from_arc(driver: Arc<dyn Driver>) -> Self {
        Self { inner: Arc::new(BucketInner { driver, closed: RwLock::new(false) }) }
    }

    /// The driver behind this bucket.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.inner.driver
    }

    /// A view that scopes every key under `prefix`.
    ///
    /// The view has its own closed state and never closes the shared driver.
    ///
    /// # Errors
    /// Returns [`BlobError::InvalidArgument`] for an empty prefix.
    pub fn prefixed(&self, prefix: impl Into<String>) -> Result<Self, BlobError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(BlobError::invalid("bucket prefix must not be empty"));
        }
        Ok(Self::from_arc(Arc::new(PrefixedDriver::new(Arc::clone(&self.inner.driver), prefix))))
    }

    async fn open_guard(&self) -> Result<RwLockReadGuard<'_, bool>, BlobError> {
        let guard = self.inner.closed.read().await;
        if *guard {
            return Err(BlobError::Closed { context: None });
        }
        Ok(guard)
    }

    fn wrap(&self, op: &'static str, key: &str, err: DriverError) -> BlobError {
        wrap_error(self.inner.driver.as_ref(), op, key, err)
    }

    /// Returns the attributes of `key`, with lower-cased metadata keys.
    ///
    /// # Errors
    /// A `NotFound` class error if the object does not exist.
    #[instrument(skip(self), fields(driver = self.inner.driver.name()))]
    pub async fn attributes(&self, key: &str) -> Result<Attributes, BlobError> {
        check_key(key)?;
        let _open = self.open_guard().await?;
        let mut attrs =
            self.inner.driver.attributes(key).await.map_err(|e| self.wrap("attributes", key, e))?;
        attrs.metadata = metadata::lowercase_keys(mem::take(&mut attrs.metadata));
        Ok(attrs)
    }

    /// # Errors
    /// Any failure other than `NotFound`.
    pub async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        match self.attributes(key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Reads the whole object into memory.
    ///
    /// # Errors
    /// A `NotFound` class error if the object does not exist.
    pub async fn read_all(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let mut reader = self.new_range_reader(key, 0, -1).await?;
        let data = reader.read_to_end().await?;
        reader.close();
        Ok(data)
    }

    /// # Errors
    /// A `NotFound` class error if the object does not exist.
    pub async fn new_reader(&self, key: &str) -> Result<Reader, BlobError> {
        self.new_range_reader(key, 0, -1).await
    }

    /// Opens a reader over `length` bytes starting at `offset`.
    ///
    /// A negative `length` reads to the end; zero yields an empty reader without
    /// touching the content.
    ///
    /// # Errors
    /// * [`BlobError::InvalidArgument`] for a negative offset.
    /// * A `NotFound` class error if the object does not exist.
    /// * An `InvalidArgument` class error if `offset` lies past the end.
    #[instrument(skip(self), fields(driver = self.inner.driver.name()))]
    pub async fn new_range_reader(
        &self,
        key: &str,
        offset: i64,
        length: i64,
    ) -> Result<Reader, BlobError> {
        check_key(key)?;
        let offset = u64::try_from(offset).map_err(|_| {
            BlobError::invalid(format!("range reader offset must be non-negative, got {offset}"))
        })?;
        let length = u64::try_from(length).ok();

        let _open = self.open_guard().await?;
        let inner = self
            .inner
            .driver
            .new_range_reader(key, offset, length)
            .await
            .map_err(|e| self.wrap("new_range_reader", key, e))?;
        Ok(Reader::new(Arc::clone(&self.inner.driver), key, inner))
    }

    /// Starts writing `key`.
    ///
    /// Without an explicit content type the driver writer is opened lazily, once
    /// 512 bytes have been buffered or at close, whichever comes first.
    ///
    /// # Errors
    /// [`BlobError::InvalidArgument`] for bad metadata or an unparsable content type.
    #[instrument(skip(self, opts), fields(driver = self.inner.driver.name()))]
    pub async fn new_writer(&self, key: &str, opts: WriterOptions) -> Result<Writer, BlobError> {
        check_key(key)?;
        let metadata = metadata::normalize(&opts.metadata)?;
        let content_type = opts
            .content_type
            .as_deref()
            .map(|ct| {
                ct.parse::<mime::Mime>()
                    .map(|m| m.to_string())
                    .map_err(|e| BlobError::invalid(format!("invalid content type {ct:?}: {e}")))
            })
            .transpose()?;

        let cancel = opts.cancel.map_or_else(CancellationToken::new, |t| t.child_token());
        let dopts = driver::WriterOptions {
            cache_control: opts.cache_control,
            content_disposition: opts.content_disposition,
            content_encoding: opts.content_encoding,
            content_language: opts.content_language,
            content_md5: opts.content_md5.clone(),
            metadata,
            cancel: cancel.clone(),
        };

        let _open = self.open_guard().await?;
        let driver = Arc::clone(&self.inner.driver);
        match content_type {
            Some(ct) => {
                let inner = driver
                    .new_typed_writer(key, &ct, dopts)
                    .await
                    .map_err(|e| self.wrap("new_writer", key, e))?;
                Ok(Writer::opened(driver, key, inner, opts.content_md5, cancel))
            },
            None => Ok(Writer::pending(driver, key, dopts, opts.content_md5)),
        }
    }

    /// Writes `data` in one go. Computes Content-MD5 when none was given.
    ///
    /// # Errors
    /// See [`Bucket::new_writer`] and [`Writer::close`].
    pub async fn write_all(
        &self,
        key: &str,
        data: &[u8],
        mut opts: WriterOptions,
    ) -> Result<(), BlobError> {
        if opts.content_md5.is_none() {
            opts.content_md5 = Some(Md5::digest(data).to_vec());
        }
        let mut writer = self.new_writer(key, opts).await?;
        if let Err(err) = writer.write(data).await {
            writer.abort().await;
            return Err(err);
        }
        writer.close().await
    }

    /// Replaces `dst` with a copy of `src`, attributes included.
    ///
    /// # Errors
    /// * A `NotFound` class error if `src` does not exist.
    /// * [`BlobError::Cancelled`] if `opts.cancel` fired first; `dst` is unchanged.
    #[instrument(skip(self, opts), fields(driver = self.inner.driver.name()))]
    pub async fn copy(&self, dst: &str, src: &str, opts: CopyOptions) -> Result<(), BlobError> {
        check_key(dst)?;
        check_key(src)?;
        let _open = self.open_guard().await?;
        self.inner.driver.copy(dst, src, &opts.token()).await.map_err(|e| self.wrap("copy", src, e))
    }

    /// # Errors
    /// A `NotFound` class error if the object does not exist.
    #[instrument(skip(self), fields(driver = self.inner.driver.name()))]
    pub async fn delete(&self, key: &str) -> Result<(), BlobError> {
        check_key(key)?;
        let _open = self.open_guard().await?;
        self.inner.driver.delete(key).await.map_err(|e| self.wrap("delete", key, e))?;
        debug!(key, "Object deleted");
        Ok(())
    }

    /// Issues a URL granting `opts.method` on `key` until the expiry elapses.
    ///
    /// # Errors
    /// * [`BlobError::InvalidArgument`] for a zero expiry.
    /// * An `Unimplemented` class error if the driver cannot sign.
    #[instrument(skip(self), fields(driver = self.inner.driver.name()))]
    pub async fn signed_url(&self, key: &str, opts: SignedUrlOptions) -> Result<String, BlobError> {
        check_key(key)?;
        if opts.expiry.is_zero() {
            return Err(BlobError::invalid("signed URL expiry must be positive"));
        }
        let _open = self.open_guard().await?;
        self.inner.driver.signed_url(key, &opts).await.map_err(|e| self.wrap("signed_url", key, e))
    }

    /// Iterates over every entry matching `opts`, fetching pages on demand.
    #[must_use]
    pub fn list(&self, opts: ListOptions) -> ListIterator {
        ListIterator::new(self.clone(), opts)
    }

    /// Fetches a single page.
    ///
    /// # Errors
    /// Propagates the classified driver error.
    #[instrument(skip(self), fields(driver = self.inner.driver.name()))]
    pub async fn list_page(&self, opts: &ListOptions) -> Result<ListPage, BlobError> {
        let _open = self.open_guard().await?;
        let page = self
            .inner
            .driver
            .list_paged(opts)
            .await
            .map_err(|e| self.wrap("list", &opts.prefix, e))?;
        debug!(
            prefix = %opts.prefix,
            count = page.objects.len(),
            more = page.next_page_token.is_some(),
            "Listing page produced"
        );
        Ok(page)
    }

    /// Starts a multipart upload and returns its id.
    ///
    /// # Errors
    /// [`BlobError::InvalidArgument`] for bad metadata or content type.
    #[instrument(skip(self, opts), fields(driver = self.inner.driver.name()))]
    pub async fn new_multipart_upload(
        &self,
        key: &str,
        opts: WriterOptions,
    ) -> Result<String, BlobError> {
        check_key(key)?;
        let metadata = metadata::normalize(&opts.metadata)?;
        let content_type = match opts.content_type.as_deref() {
            Some(ct) => ct
                .parse::<mime::Mime>()
                .map_err(|e| BlobError::invalid(format!("invalid content type {ct:?}: {e}")))?
                .to_string(),
            None => DEFAULT_MULTIPART_CONTENT_TYPE.to_owned(),
        };
        let dopts = driver::WriterOptions {
            cache_control: opts.cache_control,
            content_disposition: opts.content_disposition,
            content_encoding: opts.content_encoding,
            content_language: opts.content_language,
            content_md5: None,
            metadata,
            cancel: opts.cancel.unwrap_or_default(),
        };

        let _open = self.open_guard().await?;
        let upload_id = self
            .inner
            .driver
            .new_multipart_upload(key, &content_type, dopts)
            .await
            .map_err(|e| self.wrap("new_multipart_upload", key, e))?;
        info!(key, upload_id = %upload_id, "Multipart upload started");
        Ok(upload_id)
    }

    /// Opens a writer for one part. Only `content_md5` and `cancel` are honored.
    ///
    /// # Errors
    /// * [`BlobError::InvalidArgument`] for a part number outside `1..=10000`.
    /// * A `NotFound` class error if the upload does not exist.
    #[instrument(skip(self, opts), fields(driver = self.inner.driver.name()))]
    pub async fn new_part_writer(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        opts: WriterOptions,
    ) -> Result<PartWriter, BlobError> {
        check_key(key)?;
        check_part_number(part_number)?;
        let cancel = opts.cancel.map_or_else(CancellationToken::new, |t| t.child_token());
        let dopts = driver::WriterOptions {
            content_md5: opts.content_md5,
            cancel: cancel.clone(),
            ..driver::WriterOptions::default()
        };

        let _open = self.open_guard().await?;
        let inner = self
            .inner
            .driver
            .new_part_writer(key, upload_id, part_number, dopts)
            .await
            .map_err(|e| self.wrap("new_part_writer", key, e))?;
        Ok(PartWriter::new(Arc::clone(&self.inner.driver), key, inner, cancel))
    }

    /// Assembles the listed parts, in order, into `key`.
    ///
    /// On failure the upload stays pending and can be retried or aborted.
    ///
    /// # Errors
    /// * [`BlobError::InvalidArgument`] when `parts` is empty.
    /// * `InvalidArgument` class errors naming a missing or undersized part.
    /// * [`BlobError::Cancelled`] if `opts.cancel` fired before the object was published.
    #[instrument(skip(self, parts, opts), fields(driver = self.inner.driver.name(), parts = parts.len()))]
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletePart],
        opts: CopyOptions,
    ) -> Result<ObjectInfo, BlobError> {
        check_key(key)?;
        if parts.is_empty() {
            return Err(BlobError::invalid("a multipart upload needs at least one part"));
        }
        for part in parts {
            check_part_number(part.part_number)?;
        }
        let _open = self.open_guard().await?;
        let info = self
            .inner
            .driver
            .complete_multipart_upload(key, upload_id, parts, &opts.token())
            .await
            .map_err(|e| self.wrap("complete_multipart_upload", key, e))?;
        info!(key, upload_id, etag = %info.etag, size = info.size, "Multipart upload completed");
        Ok(info)
    }

    /// Discards an upload and its parts. Aborting an unknown upload succeeds.
    ///
    /// # Errors
    /// Propagates the classified driver error.
    #[instrument(skip(self), fields(driver = self.inner.driver.name()))]
    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), BlobError> {
        check_key(key)?;
        let _open = self.open_guard().await?;
        self.inner
            .driver
            .abort_multipart_upload(key, upload_id)
            .await
            .map_err(|e| self.wrap("abort_multipart_upload", key, e))
    }

    /// Uploads the whole of `src` as part `part_number` of `dst`'s upload.
    ///
    /// # Errors
    /// A `NotFound` class error if `src` or the upload does not exist.
    #[instrument(skip(self, opts), fields(driver = self.inner.driver.name()))]
    pub async fn copy_object_part(
        &self,
        dst: &str,
        src: &str,
        upload_id: &str,
        part_number: u32,
        opts: CopyOptions,
    ) -> Result<PartInfo, BlobError> {
        check_key(dst)?;
        check_key(src)?;
        check_part_number(part_number)?;
        let _open = self.open_guard().await?;
        self.inner
            .driver
            .copy_object_part(dst, src, upload_id, part_number, &opts.token())
            .await
            .map_err(|e| self.wrap("copy_object_part", src, e))
    }

    /// Lists the parts uploaded so far, ordered by part number.
    ///
    /// # Errors
    /// A `NotFound` class error if the upload does not exist.
    #[instrument(skip(self), fields(driver = self.inner.driver.name()))]
    pub async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        opts: ListPartsOptions,
    ) -> Result<ListPartsPage, BlobError> {
        check_key(key)?;
        let _open = self.open_guard().await?;
        self.inner
            .driver
            .list_parts(key, upload_id, &opts)
            .await
            .map_err(|e| self.wrap("list_parts", key, e))
    }

    /// Releases the bucket. Later operations fail with [`BlobError::Closed`].
    ///
    /// Waits for in-flight operations to finish first.
    ///
    /// # Errors
    /// [`BlobError::Closed`] if the bucket was already closed.
    pub async fn close(&self) -> Result<(), BlobError> {
        let mut closed = self.inner.closed.write().await;
        if *closed {
            return Err(BlobError::Closed { context: Some("close called twice".into()) });
        }
        *closed = true;
        drop(closed);
        info!(driver = self.inner.driver.name(), "Bucket closed");
        self.inner.driver.close().await.map_err(|e| self.wrap("close", "", e))
    }
}

/// Classifies a driver error once, at the boundary. Cancellation passes through.
pub(crate) fn wrap_error(
    driver: &dyn Driver,
    op: &'static str,
    key: &str,
    err: DriverError,
) -> BlobError {
    if err.is::<Cancelled>() {
        return BlobError::Cancelled { context: Some(key.to_owned().into()) };
    }
    let code = driver.error_code(&err);
    BlobError::from(DriverFailure { code, op, key: key.to_owned(), source: err })
}

fn check_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() {
        return Err(BlobError::invalid("object key must not be empty"));
    }
    Ok(())
}

fn check_part_number(part_number: u32) -> Result<(), BlobError> {
    if PART_NUMBERS.contains(&part_number) {
        Ok(())
    } else {
        Err(BlobError::invalid(format!("part number {part_number} is outside 1..=10000")))
    }
}
