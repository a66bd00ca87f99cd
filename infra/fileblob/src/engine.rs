//! The [`FileBucket`] driver: objects as plain files beneath a root directory.

use crate::builder::FileBucketBuilder;
use crate::error::{FileBlobError, FileBlobErrorExt};
use crate::reader::FileReader;
use crate::signer::UrlSigner;
use crate::writer::{FileWriter, TMP_PREFIX};
use crate::{escape, list, maintenance, multipart, xattrs};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use stow_blob::driver::{self, DriverError, DriverResult, WriterOptions};
use stow_blob::{
    Attributes, CompletePart, ErrorCode, ListOptions, ListPage, ListPartsOptions, ListPartsPage,
    ObjectInfo, PartInfo, ReaderAttributes, SignedUrlOptions,
};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// The internal shared state of a [`FileBucket`].
#[derive(Debug)]
pub struct FileBucketInner {
    /// Canonical root directory; every object lives beneath it.
    pub(crate) root: PathBuf,
    pub(crate) min_part_size: u64,
    pub(crate) default_page_size: usize,
    pub(crate) url_signer: Option<Arc<dyn UrlSigner>>,
    pub(crate) stale_after: Duration,
    pub(crate) tmp_counter: AtomicU64,
    pub(crate) publish_locks: [Mutex<()>; PUBLISH_STRIPES],
}

pub(crate) const PUBLISH_STRIPES: usize = 64;

/// A blob driver over a local directory.
///
/// Keys map to files through a reversible escaping scheme, attributes live in
/// `.attrs` side files and writes publish with an atomic rename. The handle is
/// reference-counted and cheap to clone.
///
/// # Example
///
/// ```rust
/// use stow_blob::{Bucket, WriterOptions};
/// use stow_fileblob::FileBucket;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let tmp = tempfile::tempdir()?;
/// let driver = FileBucket::builder().root(tmp.path()).open().await?;
/// let bucket = Bucket::new(driver);
///
/// bucket.write_all("notes/today.txt", b"remember the milk", WriterOptions::default()).await?;
/// assert_eq!(bucket.read_all("notes/today.txt").await?, b"remember the milk");
/// bucket.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileBucket {
    pub(crate) inner: Arc<FileBucketInner>,
}

impl Deref for FileBucket {
    type Target = FileBucketInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FileBucket {
    #[must_use = "The bucket is not opened until you call .open()"]
    pub fn builder() -> FileBucketBuilder {
        FileBucketBuilder::new()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn url_signer(&self) -> Option<&Arc<dyn UrlSigner>> {
        self.url_signer.as_ref()
    }

    /// Removes abandoned temporary files and empty directories.
    ///
    /// Returns how many temporary files were removed and how many could not be.
    pub async fn purge_stale(&self) -> (usize, usize) {
        maintenance::purge_stale(&self.root, self.stale_after).await
    }

    /// Resolves `key` to its content file beneath the root.
    ///
    /// # Errors
    /// * [`FileBlobError::InvalidFormat`] for the empty key, which would name the root.
    /// * [`FileBlobError::ReservedSuffix`] when any segment ends in `.attrs`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, FileBlobError> {
        let relative = escape::encode(key);
        if relative.is_empty() {
            return Err(FileBlobError::invalid_format("object key must not be empty"));
        }
        for component in Path::new(&relative).components() {
            let Component::Normal(segment) = component else {
                return Err(FileBlobError::Internal {
                    message: format!("key {key:?} escaped to unsafe path {relative:?}").into(),
                    context: None,
                });
            };
            // A `x.attrs` directory would shadow the side-record of `x`.
            if segment.to_str().is_some_and(xattrs::is_attrs_file) {
                return Err(FileBlobError::ReservedSuffix { key: key.to_owned(), context: None });
            }
        }
        Ok(self.root.join(relative))
    }

    /// Serializes publishing and removal of one content file and its side-record.
    pub(crate) fn publish_lock(&self, path: &Path) -> &Mutex<()> {
        let stripe = fxhash::hash64(path) % PUBLISH_STRIPES as u64;
        &self.publish_locks[usize::try_from(stripe).unwrap_or_default()]
    }

    pub(crate) fn tmp_name(&self) -> String {
        let counter = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        format!("{TMP_PREFIX}{}.{counter}", std::process::id())
    }

    pub(crate) async fn stat(&self, key: &str) -> Result<(PathBuf, std::fs::Metadata), FileBlobError> {
        let path = self.path_for(key)?;
        let meta =
            fs::metadata(&path).await.map_err(|e| FileBlobError::from_io(e, key, "Stat object"))?;
        ensure_object(key, &meta)?;
        Ok((path, meta))
    }

    pub(crate) async fn load_attributes(&self, key: &str) -> Result<Attributes, FileBlobError> {
        let (path, meta) = self.stat(key).await?;
        let xa = xattrs::read(&path).await?;
        Ok(Attributes {
            cache_control: xa.cache_control,
            content_disposition: xa.content_disposition,
            content_encoding: xa.content_encoding,
            content_language: xa.content_language,
            content_type: xa.content_type,
            metadata: xa.metadata,
            mod_time: mod_time(&meta),
            size: meta.len(),
            md5: xa.md5,
            etag: xa.etag,
            parts: xa.parts,
        })
    }

    async fn open_range(
        &self,
        key: &str,
        offset: u64,
        length: Option<u64>,
    ) -> Result<FileReader, FileBlobError> {
        if length == Some(0) {
            let (path, meta) = self.stat(key).await?;
            let attrs = reader_attributes(&path, &meta, offset).await?;
            return Ok(FileReader::empty(attrs));
        }

        // Metadata comes from the open handle, so it describes the bytes being read
        // even if the object is replaced meanwhile.
        let path = self.path_for(key)?;
        let mut file =
            fs::File::open(&path).await.map_err(|e| FileBlobError::from_io(e, key, "Open object"))?;
        let meta = file.metadata().await.context("Stat open object")?;
        ensure_object(key, &meta)?;
        let attrs = reader_attributes(&path, &meta, offset).await?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await.context("Seek failed")?;
        }
        Ok(FileReader::new(file.take(length.unwrap_or(u64::MAX)), attrs))
    }

    pub(crate) fn writer_attrs(content_type: &str, opts: &WriterOptions) -> xattrs::XAttrs {
        xattrs::XAttrs {
            cache_control: opts.cache_control.clone(),
            content_disposition: opts.content_disposition.clone(),
            content_encoding: opts.content_encoding.clone(),
            content_language: opts.content_language.clone(),
            content_type: content_type.to_owned(),
            metadata: opts.metadata.clone(),
            ..xattrs::XAttrs::default()
        }
    }

    async fn copy_object(&self, dst: &str, src: &str, cancel: &CancellationToken) -> DriverResult<()> {
        let (src_path, _) = self.stat(src).await?;
        let src_attrs = xattrs::read(&src_path).await?;
        let (etag, parts) = (src_attrs.etag.clone(), src_attrs.parts.clone());

        let mut writer = FileWriter::create(self, dst, src_attrs, None, cancel.clone()).await?;
        writer.append_file(&src_path, src).await?;

        // Identical bytes keep the source's identity, composite ETags included.
        writer
            .commit(move |xa| {
                if !parts.is_empty() {
                    xa.etag = etag;
                    xa.parts = parts;
                }
            })
            .await
    }

    async fn delete_object(&self, key: &str) -> Result<(), FileBlobError> {
        let (path, _) = self.stat(key).await?;
        let _publish = self.publish_lock(&path).lock().await;
        fs::remove_file(&path).await.map_err(|e| FileBlobError::from_io(e, key, "Delete object"))?;
        match fs::remove_file(xattrs::attrs_path(&path)).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                return Err(err).context(format!("Failed to delete attributes of {key:?}"));
            },
            _ => {},
        }
        debug!(key, "Object deleted");
        Ok(())
    }
}

fn ensure_object(key: &str, meta: &std::fs::Metadata) -> Result<(), FileBlobError> {
    if meta.is_dir() {
        return Err(FileBlobError::NotFound {
            key: key.to_owned(),
            context: Some("Key names a directory".into()),
        });
    }
    Ok(())
}

async fn reader_attributes(
    path: &Path,
    meta: &std::fs::Metadata,
    offset: u64,
) -> Result<ReaderAttributes, FileBlobError> {
    let size = meta.len();
    if offset > size {
        return Err(FileBlobError::InvalidRange { offset, size, context: None });
    }
    let xa = xattrs::read(path).await?;
    Ok(ReaderAttributes { content_type: xa.content_type, mod_time: mod_time(meta), size })
}

pub(crate) fn mod_time(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map_or_else(|_| DateTime::<Utc>::UNIX_EPOCH, DateTime::from)
}

#[async_trait]
impl driver::Driver for FileBucket {
    fn name(&self) -> &'static str {
        "fileblob"
    }

    fn error_code(&self, err: &DriverError) -> ErrorCode {
        if let Some(err) = err.downcast_ref::<FileBlobError>() {
            err.code()
        } else if let Some(err) = err.downcast_ref::<std::io::Error>() {
            ErrorCode::from(err)
        } else {
            ErrorCode::Unknown
        }
    }

    async fn attributes(&self, key: &str) -> DriverResult<Attributes> {
        Ok(self.load_attributes(key).await?)
    }

    async fn list_paged(&self, opts: &ListOptions) -> DriverResult<ListPage> {
        Ok(list::list_paged(self, opts).await?)
    }

    async fn new_range_reader(
        &self,
        key: &str,
        offset: u64,
        length: Option<u64>,
    ) -> DriverResult<Box<dyn driver::Reader>> {
        Ok(Box::new(self.open_range(key, offset, length).await?))
    }

    #[instrument(skip(self, opts))]
    async fn new_typed_writer(
        &self,
        key: &str,
        content_type: &str,
        opts: WriterOptions,
    ) -> DriverResult<Box<dyn driver::Writer>> {
        let attrs = Self::writer_attrs(content_type, &opts);
        let writer = FileWriter::create(self, key, attrs, opts.content_md5, opts.cancel).await?;
        Ok(Box::new(writer))
    }

    #[instrument(skip(self))]
    async fn copy(&self, dst: &str, src: &str, cancel: &CancellationToken) -> DriverResult<()> {
        self.copy_object(dst, src, cancel).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> DriverResult<()> {
        Ok(self.delete_object(key).await?)
    }

    async fn signed_url(&self, key: &str, opts: &SignedUrlOptions) -> DriverResult<String> {
        let Some(signer) = &self.url_signer else {
            return Err(Box::new(FileBlobError::Unimplemented {
                message: "no URL signer configured".into(),
                context: None,
            }));
        };
        self.path_for(key)?;
        Ok(signer.url_from_key(key, opts)?.into())
    }

    #[instrument(skip(self, opts))]
    async fn new_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
        opts: WriterOptions,
    ) -> DriverResult<String> {
        Ok(multipart::create(self, key, content_type, &opts).await?)
    }

    #[instrument(skip(self, opts))]
    async fn new_part_writer(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        opts: WriterOptions,
    ) -> DriverResult<Box<dyn driver::PartWriter>> {
        let writer =
            multipart::part_writer(self, key, upload_id, part_number, opts.content_md5, opts.cancel)
                .await?;
        Ok(Box::new(writer))
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletePart],
        cancel: &CancellationToken,
    ) -> DriverResult<ObjectInfo> {
        multipart::complete(self, key, upload_id, parts, cancel).await
    }

    #[instrument(skip(self))]
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> DriverResult<()> {
        Ok(multipart::abort(self, key, upload_id).await?)
    }

    #[instrument(skip(self))]
    async fn copy_object_part(
        &self,
        dst: &str,
        src: &str,
        upload_id: &str,
        part_number: u32,
        cancel: &CancellationToken,
    ) -> DriverResult<PartInfo> {
        multipart::copy_part(self, dst, src, upload_id, part_number, cancel).await
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        opts: &ListPartsOptions,
    ) -> DriverResult<ListPartsPage> {
        Ok(multipart::list_parts(self, key, upload_id, *opts).await?)
    }
}
