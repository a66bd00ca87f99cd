use crate::bucket::wrap_error;
use crate::driver::{self, Driver};
use crate::error::BlobError;
use crate::sniff::{SNIFF_LEN, detect_content_type};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Options for [`Bucket::new_writer`](crate::Bucket::new_writer).
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    /// Sniffed from the first 512 bytes when unset.
    pub content_type: Option<String>,
    /// When set, `close` fails unless the written bytes hash to this MD5.
    pub content_md5: Option<Vec<u8>>,
    /// Keys may not be empty and are lower-cased; case-insensitive duplicates are rejected.
    pub metadata: BTreeMap<String, String>,
    /// Cancelling this token before `close` returns aborts the write.
    pub cancel: Option<CancellationToken>,
}

impl WriterOptions {
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn content_md5(mut self, md5: impl Into<Vec<u8>>) -> Self {
        self.content_md5 = Some(md5.into());
        self
    }

    #[must_use]
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug)]
enum State {
    /// No driver writer yet: buffering until the content type can be sniffed.
    Pending { opts: driver::WriterOptions, buf: Vec<u8> },
    Open(Box<dyn driver::Writer>),
    Done,
}

/// Writes an object. The previous object, if any, stays readable until
/// [`Writer::close`] succeeds.
///
/// Dropping a writer without closing it cancels the write.
#[derive(Debug)]
pub struct Writer {
    driver: Arc<dyn Driver>,
    key: String,
    state: State,
    content_md5: Option<Vec<u8>>,
    hasher: Md5,
    cancel: CancellationToken,
}

impl Writer {
    pub(crate) fn opened(
        driver: Arc<dyn Driver>,
        key: &str,
        inner: Box<dyn driver::Writer>,
        content_md5: Option<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            driver,
            key: key.to_owned(),
            state: State::Open(inner),
            content_md5,
            hasher: Md5::new(),
            cancel,
        }
    }

    pub(crate) fn pending(
        driver: Arc<dyn Driver>,
        key: &str,
        opts: driver::WriterOptions,
        content_md5: Option<Vec<u8>>,
    ) -> Self {
        let cancel = opts.cancel.clone();
        Self {
            driver,
            key: key.to_owned(),
            state: State::Pending { opts, buf: Vec::with_capacity(SNIFF_LEN) },
            content_md5,
            hasher: Md5::new(),
            cancel,
        }
    }

    /// Token that aborts this write when cancelled.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Writes `buf`, returning the number of bytes accepted.
    ///
    /// Bytes may be buffered; success is only guaranteed once `close` returns `Ok`.
    ///
    /// # Errors
    /// Returns the classified driver error if opening or writing fails.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, BlobError> {
        if self.content_md5.is_some() {
            self.hasher.update(buf);
        }
        match &mut self.state {
            State::Open(inner) => {
                write_through(self.driver.as_ref(), &self.key, inner.as_mut(), buf).await?;
                Ok(buf.len())
            },
            State::Pending { buf: pending, .. } => {
                pending.extend_from_slice(buf);
                if pending.len() >= SNIFF_LEN {
                    self.open().await?;
                }
                Ok(buf.len())
            },
            State::Done => Err(BlobError::Internal {
                message: "write after the writer finished".into(),
                context: Some(self.key.clone().into()),
            }),
        }
    }

    /// Sniffs the buffered bytes, opens the driver writer and flushes the buffer into it.
    async fn open(&mut self) -> Result<(), BlobError> {
        let State::Pending { opts, buf } = mem::replace(&mut self.state, State::Done) else {
            return Ok(());
        };
        let content_type = detect_content_type(&buf);
        debug!(key = %self.key, content_type, "Content type sniffed");

        let mut inner = self
            .driver
            .new_typed_writer(&self.key, content_type, opts)
            .await
            .map_err(|e| wrap_error(self.driver.as_ref(), "new_writer", &self.key, e))?;
        write_through(self.driver.as_ref(), &self.key, inner.as_mut(), &buf).await?;
        self.state = State::Open(inner);
        Ok(())
    }

    /// Finalizes the write.
    ///
    /// # Errors
    /// * [`BlobError::DigestMismatch`] if `content_md5` was set and does not match;
    ///   nothing is published in that case.
    /// * [`BlobError::Cancelled`] if the cancellation token fired.
    /// * The classified driver error otherwise.
    pub async fn close(mut self) -> Result<(), BlobError> {
        if let Some(expected) = self.content_md5.take() {
            let calculated = mem::take(&mut self.hasher).finalize();
            if calculated.as_slice() != expected.as_slice() {
                self.cancel.cancel();
                if let State::Open(inner) = mem::replace(&mut self.state, State::Done) {
                    let _ = inner.close().await;
                }
                return Err(BlobError::DigestMismatch {
                    expected: hex::encode_upper(&expected),
                    calculated: hex::encode_upper(calculated),
                    context: Some(self.key.clone().into()),
                });
            }
        }

        if matches!(self.state, State::Pending { .. }) {
            self.open().await?;
        }
        let State::Open(inner) = mem::replace(&mut self.state, State::Done) else {
            return Err(BlobError::Internal {
                message: "writer has no open driver writer".into(),
                context: Some(self.key.clone().into()),
            });
        };
        inner.close().await.map_err(|e| wrap_error(self.driver.as_ref(), "close", &self.key, e))
    }

    /// Cancels the write and releases it. The previous object is left untouched.
    pub async fn abort(mut self) {
        self.cancel.cancel();
        if let State::Open(inner) = mem::replace(&mut self.state, State::Done) {
            let _ = inner.close().await;
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if matches!(self.state, State::Done) {
            return;
        }
        self.cancel.cancel();
        if cfg!(debug_assertions) {
            warn!(key = %self.key, driver = self.driver.name(), "Blob writer dropped without close");
        }
    }
}

async fn write_through(
    driver: &dyn Driver,
    key: &str,
    inner: &mut dyn driver::Writer,
    mut buf: &[u8],
) -> Result<(), BlobError> {
    while !buf.is_empty() {
        let n = inner.write(buf).await.map_err(|e| wrap_error(driver, "write", key, e))?;
        if n == 0 {
            return Err(BlobError::Internal {
                message: "driver writer accepted zero bytes".into(),
                context: Some(key.to_owned().into()),
            });
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// Writes one part of a multipart upload.
#[derive(Debug)]
pub struct PartWriter {
    driver: Arc<dyn Driver>,
    key: String,
    inner: Option<Box<dyn driver::PartWriter>>,
    cancel: CancellationToken,
}

impl PartWriter {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        key: &str,
        inner: Box<dyn driver::PartWriter>,
        cancel: CancellationToken,
    ) -> Self {
        Self { driver, key: key.to_owned(), inner: Some(inner), cancel }
    }

    /// # Errors
    /// Returns the classified driver error if the write fails.
    pub async fn write(&mut self, mut buf: &[u8]) -> Result<usize, BlobError> {
        let total = buf.len();
        let Some(inner) = self.inner.as_mut() else {
            return Err("write after the part writer finished".into());
        };
        while !buf.is_empty() {
            let n = inner
                .write(buf)
                .await
                .map_err(|e| wrap_error(self.driver.as_ref(), "write_part", &self.key, e))?;
            if n == 0 {
                return Err("driver part writer accepted zero bytes".into());
            }
            buf = &buf[n..];
        }
        Ok(total)
    }

    /// Persists the part and returns its identity for completion.
    ///
    /// # Errors
    /// Returns [`BlobError::Cancelled`] if cancelled, or the classified driver error
    /// (for example a digest mismatch reported by the driver).
    pub async fn close(mut self) -> Result<crate::PartInfo, BlobError> {
        let Some(inner) = self.inner.take() else {
            return Err("part writer already finished".into());
        };
        inner.close().await.map_err(|e| wrap_error(self.driver.as_ref(), "close_part", &self.key, e))
    }
}

impl Drop for PartWriter {
    fn drop(&mut self) {
        if self.inner.is_some() {
            self.cancel.cancel();
            if cfg!(debug_assertions) {
                warn!(key = %self.key, "Part writer dropped without close");
            }
        }
    }
}
