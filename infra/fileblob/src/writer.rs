//! Atomic writers: bytes go to a temporary file beside the target and become
//! visible with a single rename.

use crate::engine::FileBucket;
use crate::error::{FileBlobError, FileBlobErrorExt};
use crate::xattrs::{self, XAttrs};
use async_trait::async_trait;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use stow_blob::driver::{self, DriverResult};
use stow_blob::{Cancelled, PartInfo};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Name prefix of every in-flight temporary file.
pub(crate) const TMP_PREFIX: &str = "__tmp.";

const COPY_BUFFER: usize = 1024 * 1024;

/// A temporary file that is removed on drop unless persisted.
#[derive(Debug)]
pub(crate) struct TempFile {
    path: PathBuf,
    file: Option<BufWriter<fs::File>>,
    hasher: Md5,
    size: u64,
    armed: bool,
}

impl TempFile {
    pub(crate) async fn create(bucket: &FileBucket, dir: &Path) -> Result<Self, FileBlobError> {
        let path = dir.join(bucket.tmp_name());
        let file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await
            .context(format!("Temp creation failed: {}", path.display()))?;
        Ok(Self { path, file: Some(BufWriter::new(file)), hasher: Md5::new(), size: 0, armed: true })
    }

    pub(crate) async fn write(&mut self, buf: &[u8]) -> Result<usize, FileBlobError> {
        let file = self.file.as_mut().ok_or("write after seal")?;
        file.write_all(buf).await.context("Write failed")?;
        self.hasher.update(buf);
        self.size += buf.len() as u64;
        Ok(buf.len())
    }

    /// Appends the whole content of the file at `path`; `key` names it in errors.
    pub(crate) async fn append_file(&mut self, path: &Path, key: &str) -> Result<(), FileBlobError> {
        let mut src =
            fs::File::open(path).await.map_err(|e| FileBlobError::from_io(e, key, "Open source"))?;
        let mut buf = vec![0u8; COPY_BUFFER];
        loop {
            let n = src.read(&mut buf).await.context("Read failed")?;
            if n == 0 {
                return Ok(());
            }
            self.write(&buf[..n]).await?;
        }
    }

    /// Flushes and syncs the content, returning its MD5 and size.
    pub(crate) async fn seal(&mut self) -> Result<(Vec<u8>, u64), FileBlobError> {
        let mut file = self.file.take().ok_or("temp file sealed twice")?;
        file.flush().await.context("Flush failed")?;
        file.get_ref().sync_all().await.context("Hardware sync failed")?;
        Ok((self.hasher.finalize_reset().to_vec(), self.size))
    }

    /// Renames the sealed file onto `target`.
    pub(crate) async fn persist(mut self, target: &Path) -> Result<(), FileBlobError> {
        fs::rename(&self.path, target).await.context(format!(
            "Atomic swap failed: {} -> {}",
            self.path.display(),
            target.display()
        ))?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        drop(self.file.take());
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %err, "Temp file removal failed");
        }
    }
}

/// Writes `data` to `target` through a temporary file in the same directory.
pub(crate) async fn write_atomic(
    bucket: &FileBucket,
    target: &Path,
    data: &[u8],
) -> Result<(), FileBlobError> {
    let dir = target.parent().ok_or("target has no parent directory")?;
    let mut tmp = TempFile::create(bucket, dir).await?;
    tmp.write(data).await?;
    tmp.seal().await?;
    tmp.persist(target).await
}

pub(crate) async fn sync_dir(path: &Path) {
    match fs::File::open(path).await {
        Ok(dir) => {
            if let Err(err) = dir.sync_all().await {
                warn!(path = %path.display(), error = %err, "Directory sync failed");
            }
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Directory open failed");
        },
    }
}

fn check_digest(expected: Option<&[u8]>, calculated: &[u8]) -> Result<(), FileBlobError> {
    match expected {
        Some(expected) if expected != calculated => Err(FileBlobError::BadDigest {
            expected: hex::encode(expected),
            calculated: hex::encode(calculated),
            context: None,
        }),
        _ => Ok(()),
    }
}

/// Writer for one object. Publishes content and side-record on commit.
#[derive(Debug)]
pub(crate) struct FileWriter {
    bucket: FileBucket,
    key: String,
    target: PathBuf,
    tmp: TempFile,
    attrs: XAttrs,
    content_md5: Option<Vec<u8>>,
    cancel: CancellationToken,
}

impl FileWriter {
    pub(crate) async fn create(
        bucket: &FileBucket,
        key: &str,
        attrs: XAttrs,
        content_md5: Option<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Result<Self, FileBlobError> {
        let target = bucket.path_for(key)?;
        let dir = target.parent().ok_or("object path has no parent directory")?;
        fs::create_dir_all(dir)
            .await
            .context(format!("Failed to create directories for {}", target.display()))?;
        let tmp = TempFile::create(bucket, dir).await?;

        Ok(Self {
            bucket: bucket.clone(),
            key: key.to_owned(),
            target,
            tmp,
            attrs,
            content_md5,
            cancel,
        })
    }

    /// Appends the content of `path`, stopping early once the write is cancelled.
    pub(crate) async fn append_file(&mut self, path: &Path, key: &str) -> DriverResult<()> {
        if self.cancel.is_cancelled() {
            debug!(key = %self.key, "Write cancelled before copy");
            return Err(Box::new(Cancelled));
        }
        Ok(self.tmp.append_file(path, key).await?)
    }

    /// Seals the content, writes the side-record and renames into place.
    ///
    /// `finish` may adjust the side-record after the digest fields are filled.
    pub(crate) async fn commit(mut self, finish: impl FnOnce(&mut XAttrs) + Send) -> DriverResult<()> {
        let (md5, size) = self.tmp.seal().await?;
        check_digest(self.content_md5.as_deref(), &md5).context(format!("Writing {:?}", self.key))?;

        if self.cancel.is_cancelled() {
            debug!(key = %self.key, "Write cancelled before publish");
            return Err(Box::new(Cancelled));
        }

        self.attrs.etag = hex::encode(&md5);
        self.attrs.md5 = Some(md5);
        finish(&mut self.attrs);

        let bucket = self.bucket.clone();
        let _publish = bucket.publish_lock(&self.target).lock().await;
        write_atomic(&self.bucket, &xattrs::attrs_path(&self.target), &xattrs::encode(&self.attrs)?)
            .await?;
        self.tmp.persist(&self.target).await?;
        if let Some(dir) = self.target.parent() {
            sync_dir(dir).await;
        }

        debug!(key = %self.key, size, "Object published");
        Ok(())
    }
}

#[async_trait]
impl driver::Writer for FileWriter {
    async fn write(&mut self, buf: &[u8]) -> DriverResult<usize> {
        Ok(self.tmp.write(buf).await?)
    }

    async fn close(self: Box<Self>) -> DriverResult<()> {
        self.commit(|_| {}).await
    }
}

/// Writer for one part of a multipart upload.
#[derive(Debug)]
pub(crate) struct FilePartWriter {
    upload_dir: PathBuf,
    part_number: u32,
    tmp: TempFile,
    content_md5: Option<Vec<u8>>,
    cancel: CancellationToken,
}

impl FilePartWriter {
    pub(crate) async fn create(
        bucket: &FileBucket,
        upload_dir: PathBuf,
        part_number: u32,
        content_md5: Option<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Result<Self, FileBlobError> {
        let tmp = TempFile::create(bucket, &upload_dir).await?;
        Ok(Self { upload_dir, part_number, tmp, content_md5, cancel })
    }

    pub(crate) async fn append_file(&mut self, path: &Path, key: &str) -> DriverResult<()> {
        if self.cancel.is_cancelled() {
            return Err(Box::new(Cancelled));
        }
        Ok(self.tmp.append_file(path, key).await?)
    }
}

#[async_trait]
impl driver::PartWriter for FilePartWriter {
    async fn write(&mut self, buf: &[u8]) -> DriverResult<usize> {
        Ok(self.tmp.write(buf).await?)
    }

    async fn close(mut self: Box<Self>) -> DriverResult<PartInfo> {
        let (md5, size) = self.tmp.seal().await?;
        check_digest(self.content_md5.as_deref(), &md5)
            .context(format!("Writing part {}", self.part_number))?;

        if self.cancel.is_cancelled() {
            return Err(Box::new(Cancelled));
        }

        let etag = hex::encode(&md5);
        let target = self.upload_dir.join(crate::multipart::part_file_name(
            self.part_number,
            &etag,
            size,
        ));
        let Self { tmp, part_number, .. } = *self;
        tmp.persist(&target)
            .await
            .map_err(|err| match err {
                FileBlobError::Io { source, .. } => {
                    FileBlobError::from_io(source, &target.display().to_string(), "Publishing part")
                },
                other => other,
            })?;

        let last_modified = fs::metadata(&target)
            .await
            .and_then(|m| m.modified())
            .map_or_else(|_| chrono::Utc::now(), chrono::DateTime::from);

        debug!(part_number, size, "Part stored");
        Ok(PartInfo { part_number, last_modified, etag, size, actual_size: size })
    }
}
