use crate::bucket::wrap_error;
use crate::driver::{self, Driver};
use crate::error::BlobError;
use chrono::{DateTime, Utc};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::warn;

/// Reads an object, or a byte range of it.
///
/// Callers release the reader with [`Reader::close`]; dropping it open is logged.
#[derive(Debug)]
pub struct Reader {
    driver: Arc<dyn Driver>,
    key: String,
    inner: Box<dyn driver::Reader>,
    closed: bool,
}

impl Reader {
    pub(crate) fn new(driver: Arc<dyn Driver>, key: &str, inner: Box<dyn driver::Reader>) -> Self {
        Self { driver, key: key.to_owned(), inner, closed: false }
    }

    /// Media type of the whole object.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.inner.attributes().content_type
    }

    #[must_use]
    pub fn mod_time(&self) -> DateTime<Utc> {
        self.inner.attributes().mod_time
    }

    /// Size of the whole object, not of the requested range.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.attributes().size
    }

    /// Reads the remaining bytes of the range.
    ///
    /// # Errors
    /// Returns the classified driver error if the underlying read fails.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, BlobError> {
        let mut out = Vec::new();
        self.read_to_end_into(&mut out).await?;
        Ok(out)
    }

    async fn read_to_end_into(&mut self, out: &mut Vec<u8>) -> Result<usize, BlobError> {
        match AsyncReadExt::read_to_end(&mut self.inner, out).await {
            Ok(n) => Ok(n),
            Err(err) => Err(wrap_error(self.driver.as_ref(), "read", &self.key, err.into())),
        }
    }

    /// Releases the reader.
    pub fn close(mut self) {
        self.closed = true;
    }
}

impl AsyncRead for Reader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        if !self.closed && cfg!(debug_assertions) {
            warn!(key = %self.key, driver = self.driver.name(), "Blob reader dropped without close");
        }
    }
}
