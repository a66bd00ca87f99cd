use crate::bucket::Bucket;
use crate::error::BlobError;
use crate::types::{ListOptions, ObjectInfo};
use futures::Stream;
use std::collections::VecDeque;

/// Walks a listing page by page, yielding one entry at a time.
#[derive(Debug)]
pub struct ListIterator {
    bucket: Bucket,
    opts: ListOptions,
    page: VecDeque<ObjectInfo>,
    exhausted: bool,
}

impl ListIterator {
    pub(crate) fn new(bucket: Bucket, opts: ListOptions) -> Self {
        Self { bucket, opts, page: VecDeque::new(), exhausted: false }
    }

    /// Returns the next entry, or `None` once the listing is exhausted.
    ///
    /// # Errors
    /// Propagates the error of the page fetch that failed.
    pub async fn next(&mut self) -> Result<Option<ObjectInfo>, BlobError> {
        loop {
            if let Some(obj) = self.page.pop_front() {
                return Ok(Some(obj));
            }
            if self.exhausted {
                return Ok(None);
            }
            let page = self.bucket.list_page(&self.opts).await?;
            self.exhausted = page.next_page_token.is_none();
            self.opts.page_token = page.next_page_token;
            self.page.extend(page.objects);
        }
    }

    /// Adapts the iterator into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<ObjectInfo, BlobError>> + Send {
        futures::stream::try_unfold(self, |mut it| async move {
            Ok(it.next().await?.map(|obj| (obj, it)))
        })
    }

    /// Drains the remaining entries.
    ///
    /// # Errors
    /// Propagates the first failed page fetch.
    pub async fn collect_all(mut self) -> Result<Vec<ObjectInfo>, BlobError> {
        let mut out = Vec::new();
        while let Some(obj) = self.next().await? {
            out.push(obj);
        }
        Ok(out)
    }
}
