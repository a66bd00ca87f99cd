//! JSON side-records holding the attributes of each object.
//!
//! `<path>.attrs` sits next to `<path>`. The field names follow the freedesktop
//! extended-attribute convention.

use crate::error::{FileBlobError, FileBlobErrorExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use stow_blob::ObjectPartInfo;
use tokio::fs;

/// Suffix of the side-record that holds an object's attributes.
pub const ATTRS_EXT: &str = ".attrs";

pub(crate) const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct XAttrs {
    #[serde(rename = "user.cache_control", default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(rename = "user.content_disposition", default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(rename = "user.content_encoding", default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(rename = "user.content_language", default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(rename = "user.content_type", default = "default_content_type")]
    pub content_type: String,
    #[serde(rename = "user.metadata", default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, with = "md5_base64", skip_serializing_if = "Option::is_none")]
    pub md5: Option<Vec<u8>>,
    #[serde(default)]
    pub etag: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ObjectPartInfo>,
}

impl Default for XAttrs {
    fn default() -> Self {
        Self {
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            content_language: None,
            content_type: default_content_type(),
            metadata: BTreeMap::new(),
            md5: None,
            etag: String::new(),
            parts: Vec::new(),
        }
    }
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_owned()
}

pub(crate) fn attrs_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(ATTRS_EXT);
    PathBuf::from(os)
}

pub(crate) fn is_attrs_file(name: &str) -> bool {
    name.ends_with(ATTRS_EXT)
}

/// Reads the side-record of `path`; a missing record yields the defaults.
pub(crate) async fn read(path: &Path) -> Result<XAttrs, FileBlobError> {
    let raw = match fs::read(attrs_path(path)).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(XAttrs::default()),
        Err(err) => return Err(err).context("Reading attributes"),
    };
    serde_json::from_slice(&raw).context(format!("Decoding attributes of {}", path.display()))
}

/// Synchronous twin of [`read`] for the blocking listing walk.
pub(crate) fn read_blocking(path: &Path) -> Result<XAttrs, FileBlobError> {
    let raw = match std::fs::read(attrs_path(path)) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(XAttrs::default()),
        Err(err) => return Err(err).context("Reading attributes"),
    };
    serde_json::from_slice(&raw).context(format!("Decoding attributes of {}", path.display()))
}

pub(crate) fn encode(attrs: &XAttrs) -> Result<Vec<u8>, FileBlobError> {
    serde_json::to_vec(attrs).context("Encoding attributes")
}

mod md5_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(md5: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match md5 {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let Some(encoded) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        STANDARD.decode(encoded).map(Some).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let attrs: XAttrs = serde_json::from_str("{}").unwrap();
        assert_eq!(attrs, XAttrs::default());
        assert_eq!(attrs.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn wire_names_are_stable() {
        let attrs = XAttrs {
            cache_control: Some("no-cache".into()),
            content_type: "text/plain".into(),
            metadata: BTreeMap::from([("foo".into(), "bar".into())]),
            md5: Some(vec![0xde, 0xad, 0xbe, 0xef]),
            etag: "deadbeef".into(),
            parts: vec![ObjectPartInfo { number: 1, etag: "x".into(), size: 3, actual_size: 3 }],
            ..XAttrs::default()
        };
        let json: serde_json::Value = serde_json::from_slice(&encode(&attrs).unwrap()).unwrap();
        assert_eq!(json["user.cache_control"], "no-cache");
        assert_eq!(json["user.content_type"], "text/plain");
        assert_eq!(json["user.metadata"]["foo"], "bar");
        assert_eq!(json["md5"], "3q2+7w==");
        assert_eq!(json["parts"][0]["actualSize"], 3);
        assert!(json.get("user.content_language").is_none());

        let back: XAttrs = serde_json::from_value(json).unwrap();
        assert_eq!(back, attrs);
    }

    #[tokio::test]
    async fn absent_record_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let attrs = read(&dir.path().join("nothing")).await.unwrap();
        assert_eq!(attrs.content_type, DEFAULT_CONTENT_TYPE);
        assert!(attrs.metadata.is_empty());
    }

    #[test]
    fn side_record_path_appends_the_extension() {
        assert_eq!(attrs_path(Path::new("a/b.txt")), Path::new("a/b.txt.attrs"));
        assert!(is_attrs_file("b.txt.attrs"));
    }
}
