use crate::driver::{Driver, DriverResult, PartWriter, Reader, Writer, WriterOptions};
use crate::error::ErrorCode;
use crate::types::{
    Attributes, CompletePart, ListOptions, ListPage, ListPartsOptions, ListPartsPage, ObjectInfo,
    PartInfo, SignedUrlOptions,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A driver view that stores every key under a fixed prefix.
///
/// Listing results come back with the prefix stripped, so callers never see it.
/// Page tokens are passed through untouched.
#[derive(Debug)]
pub struct PrefixedDriver {
    base: Arc<dyn Driver>,
    prefix: String,
}

impl PrefixedDriver {
    #[must_use]
    pub fn new(base: Arc<dyn Driver>, prefix: impl Into<String>) -> Self {
        Self { base, prefix: prefix.into() }
    }

    fn full(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn strip(&self, key: String) -> String {
        match key.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.to_owned(),
            None => key,
        }
    }
}

#[async_trait]
impl Driver for PrefixedDriver {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn error_code(&self, err: &crate::driver::DriverError) -> ErrorCode {
        self.base.error_code(err)
    }

    async fn attributes(&self, key: &str) -> DriverResult<Attributes> {
        self.base.attributes(&self.full(key)).await
    }

    async fn list_paged(&self, opts: &ListOptions) -> DriverResult<ListPage> {
        let scoped = ListOptions { prefix: self.full(&opts.prefix), ..opts.clone() };
        let mut page = self.base.list_paged(&scoped).await?;
        for obj in &mut page.objects {
            obj.key = self.strip(std::mem::take(&mut obj.key));
        }
        Ok(page)
    }

    async fn new_range_reader(
        &self,
        key: &str,
        offset: u64,
        length: Option<u64>,
    ) -> DriverResult<Box<dyn Reader>> {
        self.base.new_range_reader(&self.full(key), offset, length).await
    }

    async fn new_typed_writer(
        &self,
        key: &str,
        content_type: &str,
        opts: WriterOptions,
    ) -> DriverResult<Box<dyn Writer>> {
        self.base.new_typed_writer(&self.full(key), content_type, opts).await
    }

    async fn copy(&self, dst: &str, src: &str, cancel: &CancellationToken) -> DriverResult<()> {
        self.base.copy(&self.full(dst), &self.full(src), cancel).await
    }

    async fn delete(&self, key: &str) -> DriverResult<()> {
        self.base.delete(&self.full(key)).await
    }

    async fn signed_url(&self, key: &str, opts: &SignedUrlOptions) -> DriverResult<String> {
        self.base.signed_url(&self.full(key), opts).await
    }

    async fn new_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
        opts: WriterOptions,
    ) -> DriverResult<String> {
        self.base.new_multipart_upload(&self.full(key), content_type, opts).await
    }

    async fn new_part_writer(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        opts: WriterOptions,
    ) -> DriverResult<Box<dyn PartWriter>> {
        self.base.new_part_writer(&self.full(key), upload_id, part_number, opts).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletePart],
        cancel: &CancellationToken,
    ) -> DriverResult<ObjectInfo> {
        let mut info =
            self.base.complete_multipart_upload(&self.full(key), upload_id, parts, cancel).await?;
        info.key = self.strip(info.key);
        Ok(info)
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> DriverResult<()> {
        self.base.abort_multipart_upload(&self.full(key), upload_id).await
    }

    async fn copy_object_part(
        &self,
        dst: &str,
        src: &str,
        upload_id: &str,
        part_number: u32,
        cancel: &CancellationToken,
    ) -> DriverResult<PartInfo> {
        self.base
            .copy_object_part(&self.full(dst), &self.full(src), upload_id, part_number, cancel)
            .await
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        opts: &ListPartsOptions,
    ) -> DriverResult<ListPartsPage> {
        let mut page = self.base.list_parts(&self.full(key), upload_id, opts).await?;
        page.key = self.strip(page.key);
        Ok(page)
    }
}
