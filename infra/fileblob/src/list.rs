//! Paged listing as a single ordered directory walk.
//!
//! Siblings are visited in the order of their decoded names, with directories
//! sorted as `name/`, which makes a depth-first walk yield keys in byte order.
//! Prefix pruning, delimiter collapsing and resumption after the page token all
//! happen in that one pass.

use crate::engine::{self, FileBucket};
use crate::error::{FileBlobError, FileBlobErrorExt};
use crate::multipart::SCRATCH_ROOT;
use crate::writer::TMP_PREFIX;
use crate::{escape, xattrs};
use std::cmp::Ordering;
use std::io;
use std::path::Path;
use stow_blob::{ListOptions, ListPage, ObjectInfo};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub(crate) async fn list_paged(
    bucket: &FileBucket,
    opts: &ListOptions,
) -> Result<ListPage, FileBlobError> {
    let root = bucket.root.clone();
    let opts = opts.clone();
    let page_size = if opts.page_size == 0 { bucket.default_page_size } else { opts.page_size };

    let page = tokio::task::spawn_blocking(move || walk(&root, &opts, page_size))
        .await
        .map_err(|err| FileBlobError::from(format!("listing task failed: {err}")))??;
    debug!(objects = page.objects.len(), more = page.next_page_token.is_some(), "Listing page produced");
    Ok(page)
}

/// Cursor state carried through the walk.
struct Cursor<'a> {
    prefix: &'a str,
    delimiter: &'a str,
    token: Option<&'a str>,
    page_size: usize,
    /// The most recently synthesized directory entry.
    last_prefix: Option<String>,
    objects: Vec<ObjectInfo>,
    next_page_token: Option<String>,
}

impl Cursor<'_> {
    fn is_seen(&self, key: &str) -> bool {
        self.token.is_some_and(|token| key <= token)
    }

    /// The delimiter-collapsed form of `key`, if it has one.
    fn collapse<'k>(&self, key: &'k str) -> Option<&'k str> {
        if self.delimiter.is_empty() || !key.starts_with(self.prefix) {
            return None;
        }
        let at = key[self.prefix.len()..].find(self.delimiter)?;
        Some(&key[..self.prefix.len() + at + self.delimiter.len()])
    }

    /// Queues an entry; returns `false` once the page is full.
    fn push(&mut self, info: ObjectInfo) -> bool {
        if self.objects.len() == self.page_size {
            // Another entry exists, so the listing continues after the last one.
            self.next_page_token = self.objects.last().map(|o| o.key.clone());
            return false;
        }
        self.objects.push(info);
        true
    }

    /// Emits a collapsed directory entry unless already emitted or seen.
    fn push_dir(&mut self, dir: &str) -> bool {
        if self.last_prefix.as_deref() == Some(dir) || self.is_seen(dir) {
            return true;
        }
        self.last_prefix = Some(dir.to_owned());
        self.push(ObjectInfo::directory(dir))
    }
}

fn walk(root: &Path, opts: &ListOptions, page_size: usize) -> Result<ListPage, FileBlobError> {
    let mut cursor = Cursor {
        prefix: &opts.prefix,
        delimiter: &opts.delimiter,
        token: opts.page_token.as_deref(),
        page_size,
        last_prefix: None,
        objects: Vec::new(),
        next_page_token: None,
    };

    let mut it = WalkDir::new(root).min_depth(1).sort_by(compare_entries).into_iter();
    while let Some(next) = it.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(err) if err.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound) => {
                continue;
            },
            Err(err) => return Err(io::Error::from(err)).context("Walking bucket directory"),
        };
        let Some(key) = entry_key(root, entry.path()) else { continue };

        if entry.file_type().is_dir() {
            if entry.depth() == 1 && entry.file_name() == SCRATCH_ROOT {
                it.skip_current_dir();
                continue;
            }
            let dir_prefix = format!("{key}/");
            let relevant =
                dir_prefix.starts_with(cursor.prefix) || cursor.prefix.starts_with(&dir_prefix);
            // Everything beneath sorts before the token unless the token is inside.
            let behind_token = cursor
                .token
                .is_some_and(|token| dir_prefix.as_str() < token && !token.starts_with(&dir_prefix));
            if !relevant || behind_token {
                it.skip_current_dir();
                continue;
            }
            if let Some(collapsed) = cursor.collapse(&dir_prefix) {
                it.skip_current_dir();
                let collapsed = collapsed.to_owned();
                if has_object(entry.path()) && !cursor.push_dir(&collapsed) {
                    break;
                }
            }
            continue;
        }

        if !entry.file_type().is_file() || is_internal(&entry) || !key.starts_with(cursor.prefix) {
            continue;
        }
        if let Some(collapsed) = cursor.collapse(&key) {
            let collapsed = collapsed.to_owned();
            if !cursor.push_dir(&collapsed) {
                break;
            }
            continue;
        }
        if cursor.is_seen(&key) {
            continue;
        }
        let Some(info) = object_info(&entry, key)? else { continue };
        if !cursor.push(info) {
            break;
        }
    }

    Ok(ListPage { objects: cursor.objects, next_page_token: cursor.next_page_token })
}

fn object_info(entry: &DirEntry, key: String) -> Result<Option<ObjectInfo>, FileBlobError> {
    let meta = match entry.metadata() {
        Ok(meta) => meta,
        // Deleted since the directory was read.
        Err(err) if err.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound) => {
            return Ok(None);
        },
        Err(err) => return Err(io::Error::from(err)).context("Stat listed object"),
    };
    let xa = xattrs::read_blocking(entry.path())?;
    Ok(Some(ObjectInfo {
        key,
        mod_time: engine::mod_time(&meta),
        size: meta.len(),
        md5: xa.md5,
        etag: xa.etag,
        is_dir: false,
    }))
}

fn entry_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
    Some(escape::decode(&segments?.join("/")))
}

fn sort_name(entry: &DirEntry) -> String {
    let mut name = escape::decode(&entry.file_name().to_string_lossy());
    if entry.file_type().is_dir() {
        name.push('/');
    }
    name
}

fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    sort_name(a)
        .cmp(&sort_name(b))
        .then_with(|| a.file_type().is_dir().cmp(&b.file_type().is_dir()))
}

/// Side-records and in-flight temporary files are never objects.
fn is_internal(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_none_or(|name| xattrs::is_attrs_file(name) || name.starts_with(TMP_PREFIX))
}

/// True when the directory holds at least one object at any depth.
fn has_object(dir: &Path) -> bool {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| e.file_type().is_file() && !is_internal(&e))
}
