use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Expiry used by [`SignedUrlOptions::default`].
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Full attribute set of a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: String,
    /// Keys are lower-cased by the facade.
    pub metadata: BTreeMap<String, String>,
    pub mod_time: DateTime<Utc>,
    pub size: u64,
    pub md5: Option<Vec<u8>>,
    pub etag: String,
    /// Part manifest of objects assembled by a multipart upload.
    pub parts: Vec<ObjectPartInfo>,
}

/// The subset of attributes a reader carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderAttributes {
    pub content_type: String,
    pub mod_time: DateTime<Utc>,
    pub size: u64,
}

/// One listing entry: a real object or a synthesized "directory".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub mod_time: DateTime<Utc>,
    pub size: u64,
    pub md5: Option<Vec<u8>>,
    pub etag: String,
    /// Set for delimiter-collapsed entries; other fields are zeroed then.
    pub is_dir: bool,
}

impl ObjectInfo {
    /// A delimiter-collapsed "directory" entry.
    #[must_use]
    pub fn directory(key: impl Into<String>) -> Self {
        Self { key: key.into(), is_dir: true, ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: String,
    /// Empty means a flat namespace.
    pub delimiter: String,
    /// Zero selects the driver's default page size.
    pub page_size: usize,
    pub page_token: Option<String>,
}

impl ListOptions {
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), ..Self::default() }
    }

    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    #[must_use]
    pub const fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// `None` once the listing is exhausted.
    pub next_page_token: Option<String>,
}

/// A part as recorded in the manifest of a completed multipart object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPartInfo {
    pub number: u32,
    pub etag: String,
    pub size: u64,
    pub actual_size: u64,
}

/// A part as returned by a part writer or a part listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartInfo {
    pub part_number: u32,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub size: u64,
    pub actual_size: u64,
}

/// Identifies an uploaded part when completing an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletePart {
    pub part_number: u32,
    pub etag: String,
}

impl From<&PartInfo> for CompletePart {
    fn from(part: &PartInfo) -> Self {
        Self { part_number: part.part_number, etag: part.etag.clone() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListPartsOptions {
    /// Parts numbered at or below the marker are skipped.
    pub part_number_marker: u32,
    /// Zero means no limit.
    pub max_parts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPartsPage {
    pub key: String,
    pub upload_id: String,
    pub part_number_marker: u32,
    pub next_part_number_marker: u32,
    pub max_parts: usize,
    pub is_truncated: bool,
    pub parts: Vec<PartInfo>,
}

/// HTTP verb a signed URL authorizes.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Put,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedUrlOptions {
    pub expiry: Duration,
    pub method: HttpMethod,
}

impl Default for SignedUrlOptions {
    fn default() -> Self {
        Self { expiry: DEFAULT_SIGNED_URL_EXPIRY, method: HttpMethod::Get }
    }
}

/// Options for writes the driver assembles from data it already holds:
/// [`copy`](crate::Bucket::copy), [`copy_object_part`](crate::Bucket::copy_object_part)
/// and [`complete_multipart_upload`](crate::Bucket::complete_multipart_upload).
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Cancelling before the result is published leaves the destination untouched.
    pub cancel: Option<CancellationToken>,
}

impl CopyOptions {
    #[must_use]
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.as_ref().map_or_else(CancellationToken::new, CancellationToken::child_token)
    }
}
