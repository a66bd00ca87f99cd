//! Multipart uploads staged in a scratch directory beneath the root.
//!
//! `__multipart/<sha256(key)>/<upload-id>/` holds a `multipart.json` manifest,
//! its side-record with the attributes of the final object, and one file per
//! part named `<%05d part>.<etag>.<size>`.

use crate::engine::FileBucket;
use crate::error::{FileBlobError, FileBlobErrorExt};
use crate::writer::{self, FilePartWriter, FileWriter, TMP_PREFIX};
use crate::{maintenance, xattrs};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use stow_blob::driver::{self, DriverResult, WriterOptions};
use stow_blob::{CompletePart, ListPartsOptions, ListPartsPage, ObjectInfo, ObjectPartInfo, PartInfo};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Directory directly beneath the root that holds every pending upload.
pub(crate) const SCRATCH_ROOT: &str = "__multipart";

const MANIFEST_FILE: &str = "multipart.json";
const MANIFEST_VERSION: &str = "1";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: String,
    key: String,
}

pub(crate) fn part_file_name(part_number: u32, etag: &str, size: u64) -> String {
    format!("{part_number:05}.{etag}.{size}")
}

fn parse_part_file_name(name: &str) -> Option<(u32, &str, u64)> {
    let mut fields = name.splitn(3, '.');
    let number = fields.next()?.parse().ok()?;
    let etag = fields.next()?;
    let size = fields.next()?.parse().ok()?;
    Some((number, etag, size))
}

fn key_dir(bucket: &FileBucket, key: &str) -> PathBuf {
    bucket.root.join(SCRATCH_ROOT).join(hex::encode(Sha256::digest(key.as_bytes())))
}

/// `None` for ids this driver could never have issued.
fn upload_dir(bucket: &FileBucket, key: &str, upload_id: &str) -> Option<PathBuf> {
    Uuid::parse_str(upload_id).ok()?;
    Some(key_dir(bucket, key).join(upload_id))
}

fn missing_upload(key: &str, upload_id: &str) -> FileBlobError {
    FileBlobError::NotFound {
        key: key.to_owned(),
        context: Some(format!("No multipart upload {upload_id:?}").into()),
    }
}

/// Loads and validates the manifest, returning the upload directory.
async fn open_upload(
    bucket: &FileBucket,
    key: &str,
    upload_id: &str,
) -> Result<PathBuf, FileBlobError> {
    let dir = upload_dir(bucket, key, upload_id).ok_or_else(|| missing_upload(key, upload_id))?;
    let raw = match fs::read(dir.join(MANIFEST_FILE)).await {
        Ok(raw) => raw,
        Err(err) if matches!(err.kind(), io::ErrorKind::NotFound) => {
            return Err(missing_upload(key, upload_id));
        },
        Err(err) => return Err(err).context("Reading multipart manifest"),
    };
    let manifest: Manifest = serde_json::from_slice(&raw).context("Decoding multipart manifest")?;
    if manifest.version != MANIFEST_VERSION {
        return Err(FileBlobError::invalid_format(format!(
            "unsupported multipart manifest version {:?}",
            manifest.version
        )));
    }
    if manifest.key != key {
        return Err(FileBlobError::invalid_format(format!(
            "upload {upload_id:?} belongs to another key"
        )));
    }
    Ok(dir)
}

pub(crate) async fn create(
    bucket: &FileBucket,
    key: &str,
    content_type: &str,
    opts: &WriterOptions,
) -> Result<String, FileBlobError> {
    bucket.path_for(key)?;
    let upload_id = Uuid::new_v4().to_string();
    let dir = key_dir(bucket, key).join(&upload_id);
    fs::create_dir_all(&dir)
        .await
        .context(format!("Failed to create upload directory {}", dir.display()))?;

    let manifest_path = dir.join(MANIFEST_FILE);
    let attrs = FileBucket::writer_attrs(content_type, opts);
    writer::write_atomic(bucket, &xattrs::attrs_path(&manifest_path), &xattrs::encode(&attrs)?)
        .await?;
    let manifest = Manifest { version: MANIFEST_VERSION.to_owned(), key: key.to_owned() };
    let raw = serde_json::to_vec(&manifest).context("Encoding multipart manifest")?;
    writer::write_atomic(bucket, &manifest_path, &raw).await?;

    debug!(key, upload_id, "Multipart upload created");
    Ok(upload_id)
}

pub(crate) async fn part_writer(
    bucket: &FileBucket,
    key: &str,
    upload_id: &str,
    part_number: u32,
    content_md5: Option<Vec<u8>>,
    cancel: CancellationToken,
) -> Result<FilePartWriter, FileBlobError> {
    let dir = open_upload(bucket, key, upload_id).await?;
    FilePartWriter::create(bucket, dir, part_number, content_md5, cancel).await
}

/// Names of the part files in `dir`, skipping the manifest and in-flight files.
async fn part_files(dir: &Path) -> Result<Vec<(String, std::fs::Metadata)>, FileBlobError> {
    let mut entries = fs::read_dir(dir).await.context("Listing upload directory")?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await.context("Listing upload directory")? {
        let Ok(name) = entry.file_name().into_string() else { continue };
        if name.starts_with(MANIFEST_FILE) || name.starts_with(TMP_PREFIX) {
            continue;
        }
        match entry.metadata().await {
            Ok(meta) if meta.is_file() => out.push((name, meta)),
            Ok(_) => {},
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => return Err(err).context("Stat part file"),
        }
    }
    Ok(out)
}

pub(crate) async fn complete(
    bucket: &FileBucket,
    key: &str,
    upload_id: &str,
    parts: &[CompletePart],
    cancel: &CancellationToken,
) -> DriverResult<ObjectInfo> {
    let dir = open_upload(bucket, key, upload_id).await?;
    let attrs = xattrs::read(&dir.join(MANIFEST_FILE)).await?;
    let files = part_files(&dir).await?;

    let mut manifest = Vec::with_capacity(parts.len());
    let mut digests = Vec::with_capacity(parts.len());
    let mut paths = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let etag = stow_blob::etag::canonicalize(&part.etag);
        let invalid = || FileBlobError::InvalidPart {
            part_number: part.part_number,
            etag: etag.to_owned(),
            context: None,
        };
        let prefix = format!("{:05}.{etag}.", part.part_number);
        let (name, meta) =
            files.iter().find(|(name, _)| name.starts_with(&prefix)).ok_or_else(invalid)?;
        let (_, _, actual_size) = parse_part_file_name(name).ok_or_else(invalid)?;
        let digest = hex::decode(etag).map_err(|_| invalid())?;

        let is_last = i + 1 == parts.len();
        if !is_last && actual_size < bucket.min_part_size {
            return Err(Box::new(FileBlobError::PartTooSmall {
                part_number: part.part_number,
                size: actual_size,
                min: bucket.min_part_size,
                context: None,
            }));
        }

        manifest.push(ObjectPartInfo {
            number: part.part_number,
            etag: etag.to_owned(),
            size: meta.len(),
            actual_size,
        });
        digests.push(digest);
        paths.push(dir.join(name));
    }
    let etag = stow_blob::etag::composite(&digests);

    let mut writer = FileWriter::create(bucket, key, attrs, None, cancel.clone()).await?;
    for path in &paths {
        writer.append_file(path, key).await?;
    }
    let final_etag = etag.clone();
    writer
        .commit(move |xa| {
            xa.etag = final_etag;
            xa.parts = manifest;
        })
        .await?;

    remove_upload(bucket, key, &dir).await;

    let attrs = bucket.load_attributes(key).await?;
    debug!(key, upload_id, etag, "Multipart upload completed");
    Ok(ObjectInfo {
        key: key.to_owned(),
        mod_time: attrs.mod_time,
        size: attrs.size,
        md5: attrs.md5,
        etag,
        is_dir: false,
    })
}

/// Drops the upload directory, then the per-key directory if no other upload uses it.
async fn remove_upload(bucket: &FileBucket, key: &str, dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir).await
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %dir.display(), error = %err, "Upload directory removal failed");
    }
    let parent = key_dir(bucket, key);
    match fs::remove_dir(&parent).await {
        Err(err) if !maintenance::is_benign_rmdir_error(&err) => {
            warn!(path = %parent.display(), error = %err, "Upload key directory removal failed");
        },
        _ => {},
    }
}

pub(crate) async fn abort(bucket: &FileBucket, key: &str, upload_id: &str) -> Result<(), FileBlobError> {
    let Some(dir) = upload_dir(bucket, key, upload_id) else {
        return Ok(());
    };
    match fs::metadata(&dir).await {
        Ok(_) => {},
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).context("Stat upload directory"),
    }
    remove_upload(bucket, key, &dir).await;
    debug!(key, upload_id, "Multipart upload aborted");
    Ok(())
}

pub(crate) async fn copy_part(
    bucket: &FileBucket,
    dst: &str,
    src: &str,
    upload_id: &str,
    part_number: u32,
    cancel: &CancellationToken,
) -> DriverResult<PartInfo> {
    let (src_path, _) = bucket.stat(src).await?;
    let mut writer = part_writer(bucket, dst, upload_id, part_number, None, cancel.clone()).await?;
    writer.append_file(&src_path, src).await?;
    driver::PartWriter::close(Box::new(writer)).await
}

pub(crate) async fn list_parts(
    bucket: &FileBucket,
    key: &str,
    upload_id: &str,
    opts: ListPartsOptions,
) -> Result<ListPartsPage, FileBlobError> {
    let dir = open_upload(bucket, key, upload_id).await?;

    let mut parts: Vec<PartInfo> = part_files(&dir)
        .await?
        .into_iter()
        .filter_map(|(name, meta)| {
            let (part_number, etag, size) = parse_part_file_name(&name)?;
            Some(PartInfo {
                part_number,
                last_modified: crate::engine::mod_time(&meta),
                etag: etag.to_owned(),
                size,
                actual_size: size,
            })
        })
        .filter(|p| p.part_number > opts.part_number_marker)
        .collect();

    // A re-uploaded part number keeps only its most recent upload.
    parts.sort_by(|a, b| {
        a.part_number.cmp(&b.part_number).then_with(|| b.last_modified.cmp(&a.last_modified))
    });
    parts.dedup_by_key(|p| p.part_number);

    let is_truncated = opts.max_parts > 0 && parts.len() > opts.max_parts;
    if is_truncated {
        parts.truncate(opts.max_parts);
    }
    let next_part_number_marker =
        if is_truncated { parts.last().map_or(0, |p| p.part_number) } else { 0 };

    Ok(ListPartsPage {
        key: key.to_owned(),
        upload_id: upload_id.to_owned(),
        part_number_marker: opts.part_number_marker,
        next_part_number_marker,
        max_parts: opts.max_parts,
        is_truncated,
        parts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_names_round_trip() {
        let name = part_file_name(7, "0cc175b9c0f1b6a831c399e269772661", 1024);
        assert_eq!(name, "00007.0cc175b9c0f1b6a831c399e269772661.1024");
        assert_eq!(
            parse_part_file_name(&name),
            Some((7, "0cc175b9c0f1b6a831c399e269772661", 1024))
        );
        assert_eq!(parse_part_file_name("multipart.json"), None);
    }
}
