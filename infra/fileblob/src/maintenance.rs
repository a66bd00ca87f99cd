use crate::writer::TMP_PREFIX;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Removes temporary files older than `stale_after` and prunes empty directories.
pub(crate) async fn purge_stale(root: &Path, stale_after: Duration) -> (usize, usize) {
    let root = root.to_path_buf();
    let now = SystemTime::now();

    match tokio::task::spawn_blocking(move || remove_stale(&root, now, stale_after)).await {
        Ok((removed, failed)) => {
            if removed > 0 || failed > 0 {
                info!(removed, failed, "Purged stale temporary files");
            }
            (removed, failed)
        },
        Err(e) => {
            error!(error = %e, "Stale file purge task panicked");
            (0, 0)
        },
    }
}

fn remove_stale(root: &Path, now: SystemTime, threshold: Duration) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .flatten()
        .for_each(|entry| {
            let path = entry.path();

            if entry.file_type().is_file() {
                if is_tmp(&entry) && is_stale(&entry, now, threshold) {
                    match std::fs::remove_file(path) {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Stale temp removal failed");
                            failed += 1;
                        },
                    }
                }
            } else if entry.file_type().is_dir() {
                match std::fs::remove_dir(path) {
                    Err(e) if !is_benign_rmdir_error(&e) => {
                        warn!(path = %path.display(), error = %e, "Empty directory removal failed");
                    },
                    _ => {},
                }
            }
        });

    (removed, failed)
}

/// Directories still in use, or already gone, are not worth reporting.
pub(crate) fn is_benign_rmdir_error(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::DirectoryNotEmpty | io::ErrorKind::NotFound)
}

fn is_tmp(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with(TMP_PREFIX))
}

fn is_stale(entry: &DirEntry, now: SystemTime, threshold: Duration) -> bool {
    entry
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
        .is_none_or(|age| age >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_only_stale_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::write(root.join("a/b/__tmp.1.1"), b"partial").unwrap();
        std::fs::write(root.join("a/object"), b"kept").unwrap();
        std::fs::create_dir_all(root.join("empty/nested")).unwrap();

        let (removed, failed) = remove_stale(root, SystemTime::now(), Duration::ZERO);

        assert_eq!((removed, failed), (1, 0));
        assert!(root.join("a/object").exists());
        assert!(!root.join("a/b").exists());
        assert!(!root.join("empty").exists());
        assert!(root.exists());
    }

    #[test]
    fn fresh_temp_files_survive() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("__tmp.7.3"), b"in flight").unwrap();

        let (removed, _) = remove_stale(tmp.path(), SystemTime::now(), Duration::from_secs(3600));

        assert_eq!(removed, 0);
        assert!(tmp.path().join("__tmp.7.3").exists());
    }

    #[test]
    fn only_busy_or_missing_directories_are_benign() {
        let busy = tempfile::tempdir().unwrap();
        std::fs::write(busy.path().join("object"), b"x").unwrap();
        let err = std::fs::remove_dir(busy.path()).unwrap_err();
        assert!(is_benign_rmdir_error(&err), "{err}");

        let err = std::fs::remove_dir(busy.path().join("missing")).unwrap_err();
        assert!(is_benign_rmdir_error(&err), "{err}");

        assert!(!is_benign_rmdir_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_benign_rmdir_error(&io::Error::from(io::ErrorKind::NotADirectory)));
    }
}
