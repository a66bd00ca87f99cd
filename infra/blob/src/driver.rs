//! The contract every storage backend implements.
//!
//! Drivers are deliberately thin: they do no content sniffing, no metadata
//! normalization and no digest checks against caller expectations beyond what
//! their medium requires. The [`Bucket`](crate::Bucket) facade layers those on
//! top of any implementation.

use crate::error::ErrorCode;
use crate::types::{
    Attributes, CompletePart, ListOptions, ListPage, ListPartsOptions, ListPartsPage, ObjectInfo,
    PartInfo, ReaderAttributes, SignedUrlOptions,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Backend errors travel boxed; the backend classifies them via [`Driver::error_code`].
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type DriverResult<T> = Result<T, DriverError>;

/// Returned by a driver when a write observed its cancellation token.
///
/// The facade reports it as [`BlobError::Cancelled`](crate::BlobError::Cancelled)
/// without wrapping.
#[derive(Debug, Clone, Copy, Default, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Options handed to a driver writer. Metadata keys are already lower-cased.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    /// Expected MD5 of the written bytes; drivers reject a mismatch at close.
    pub content_md5: Option<Vec<u8>>,
    pub metadata: BTreeMap<String, String>,
    /// Checked before the point of no return. Cancelled writes leave no trace.
    pub cancel: CancellationToken,
}

/// A ranged read in progress.
pub trait Reader: AsyncRead + Send + Unpin + Debug {
    fn attributes(&self) -> &ReaderAttributes;
}

/// A single-object write. Nothing is visible to readers until `close` succeeds.
#[async_trait]
pub trait Writer: Send + Debug {
    async fn write(&mut self, buf: &[u8]) -> DriverResult<usize>;

    /// Publishes the object, or discards everything if the write was cancelled.
    async fn close(self: Box<Self>) -> DriverResult<()>;
}

/// A write of one multipart upload part.
#[async_trait]
pub trait PartWriter: Send + Debug {
    async fn write(&mut self, buf: &[u8]) -> DriverResult<usize>;

    async fn close(self: Box<Self>) -> DriverResult<PartInfo>;
}

/// The capability set of a storage backend.
///
/// Implementations must be safe under concurrent invocation against the same
/// key: readers observe fully-old or fully-new content, and the last writer to
/// finalize wins.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Short backend name used in traces.
    fn name(&self) -> &'static str;

    /// Maps an error produced by this driver into the shared taxonomy.
    fn error_code(&self, err: &DriverError) -> ErrorCode;

    /// Fails with a `NotFound` class error when the object is absent.
    async fn attributes(&self, key: &str) -> DriverResult<Attributes>;

    /// Returns objects in lexicographic key order, strictly after `page_token`.
    async fn list_paged(&self, opts: &ListOptions) -> DriverResult<ListPage>;

    /// `length == None` reads to the end; `Some(0)` must not touch the content.
    async fn new_range_reader(
        &self,
        key: &str,
        offset: u64,
        length: Option<u64>,
    ) -> DriverResult<Box<dyn Reader>>;

    async fn new_typed_writer(
        &self,
        key: &str,
        content_type: &str,
        opts: WriterOptions,
    ) -> DriverResult<Box<dyn Writer>>;

    /// Replaces `dst` with the content and attributes of `src`.
    ///
    /// A cancelled copy leaves `dst` as it was.
    async fn copy(&self, dst: &str, src: &str, cancel: &CancellationToken) -> DriverResult<()>;

    async fn delete(&self, key: &str) -> DriverResult<()>;

    /// Fails with an `Unimplemented` class error when the backend cannot sign.
    async fn signed_url(&self, key: &str, opts: &SignedUrlOptions) -> DriverResult<String>;

    /// Starts an upload and returns its opaque id.
    async fn new_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
        opts: WriterOptions,
    ) -> DriverResult<String>;

    async fn new_part_writer(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        opts: WriterOptions,
    ) -> DriverResult<Box<dyn PartWriter>>;

    /// Assembles the listed parts, in the given order, into `key`.
    ///
    /// A failed or cancelled completion leaves the upload pending.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletePart],
        cancel: &CancellationToken,
    ) -> DriverResult<ObjectInfo>;

    /// Removing an upload that no longer exists is not an error.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> DriverResult<()>;

    /// Uploads the whole of `src` as one part of `dst`'s upload.
    async fn copy_object_part(
        &self,
        dst: &str,
        src: &str,
        upload_id: &str,
        part_number: u32,
        cancel: &CancellationToken,
    ) -> DriverResult<PartInfo>;

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        opts: &ListPartsOptions,
    ) -> DriverResult<ListPartsPage>;

    async fn close(&self) -> DriverResult<()> {
        Ok(())
    }
}
