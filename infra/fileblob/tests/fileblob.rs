use proptest::prelude::*;
use std::time::Duration;
use stow_blob::{
    BlobError, Bucket, CompletePart, CopyOptions, Driver, ErrorCode, ListOptions, WriterOptions,
};
use stow_fileblob::{ATTRS_EXT, FileBlobError, FileBucket};
use tempfile::TempDir;

async fn open(temp: &TempDir) -> Bucket {
    Bucket::new(FileBucket::builder().root(temp.path()).open().await.unwrap())
}

fn driver_error(err: &BlobError) -> &FileBlobError {
    match err {
        BlobError::Driver { source, .. } => {
            source.source.downcast_ref::<FileBlobError>().expect("fileblob error")
        },
        other => panic!("expected a driver error, got {other}"),
    }
}

#[tokio::test]
async fn test_objects_are_plain_files_with_side_records() {
    let temp = TempDir::new().unwrap();
    let bucket = open(&temp).await;

    let opts = WriterOptions::default().content_type("text/markdown").metadata("Owner", "ops");
    bucket.write_all("docs/readme.md", b"# hello", opts).await.unwrap();

    let content = temp.path().join("docs/readme.md");
    assert_eq!(std::fs::read(&content).unwrap(), b"# hello");

    let attrs = std::fs::read_to_string(temp.path().join(format!("docs/readme.md{ATTRS_EXT}")))
        .unwrap();
    assert!(attrs.contains("\"user.content_type\":\"text/markdown\""), "{attrs}");
    assert!(attrs.contains("\"owner\":\"ops\""), "{attrs}");
}

#[tokio::test]
async fn test_traversal_keys_stay_beneath_root() {
    let temp = TempDir::new().unwrap();
    let bucket = open(&temp).await;

    bucket.write_all("../escape", b"x", WriterOptions::default()).await.unwrap();
    bucket.write_all("/abs", b"y", WriterOptions::default()).await.unwrap();

    assert!(temp.path().join(".__0x2e__/escape").is_file());
    assert!(temp.path().join("__0x2f__abs").is_file());
    assert!(!temp.path().parent().unwrap().join("escape").exists());
    assert_eq!(bucket.read_all("../escape").await.unwrap(), b"x");
}

#[tokio::test]
async fn test_attrs_suffix_is_reserved() {
    let temp = TempDir::new().unwrap();
    let bucket = open(&temp).await;

    let err = bucket
        .write_all("notes.attrs", b"x", WriterOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(matches!(driver_error(&err), FileBlobError::ReservedSuffix { .. }));

    let err = bucket.read_all("notes.attrs").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    // A directory segment named like a side-record is reserved as well.
    let err = bucket.write_all("x.attrs/y", b"x", WriterOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(matches!(driver_error(&err), FileBlobError::ReservedSuffix { .. }));
    bucket.write_all("x", b"plain", WriterOptions::default()).await.unwrap();
    assert_eq!(bucket.read_all("x").await.unwrap(), b"plain");
    assert!(!temp.path().join("x.attrs").is_dir());
}

#[tokio::test]
async fn test_empty_key_is_rejected_by_the_driver() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let driver = FileBucket::builder().root(&root).open().await.unwrap();

    let Err(err) = driver.new_typed_writer("", "text/plain", stow_blob::driver::WriterOptions::default()).await else {
        panic!("writer opened for the empty key");
    };
    let err = err.downcast_ref::<FileBlobError>().expect("fileblob error");
    assert!(matches!(err, FileBlobError::InvalidFormat { .. }), "{err}");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let beside: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(beside, ["root"], "nothing is created next to the root");
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_minimum_part_size_is_five_mebibytes() {
    let temp = TempDir::new().unwrap();
    let bucket = open(&temp).await;
    let key = "video.bin";

    let upload_parts = |first: usize| {
        let bucket = bucket.clone();
        async move {
            let upload = bucket.new_multipart_upload(key, WriterOptions::default()).await.unwrap();
            let mut parts = Vec::new();
            for (number, body) in [(1, vec![7u8; first]), (2, b"tail".to_vec())] {
                let mut w = bucket
                    .new_part_writer(key, &upload, number, WriterOptions::default())
                    .await
                    .unwrap();
                w.write(&body).await.unwrap();
                parts.push(CompletePart::from(&w.close().await.unwrap()));
            }
            (upload, parts)
        }
    };

    let (upload, parts) = upload_parts(4 * 1024 * 1024).await;
    let err = bucket
        .complete_multipart_upload(key, &upload, &parts, CopyOptions::default())
        .await
        .unwrap_err();
    assert!(
        matches!(driver_error(&err), FileBlobError::PartTooSmall { part_number: 1, .. }),
        "{err}"
    );
    bucket.abort_multipart_upload(key, &upload).await.unwrap();

    let (upload, parts) = upload_parts(5 * 1024 * 1024).await;
    let info = bucket
        .complete_multipart_upload(key, &upload, &parts, CopyOptions::default())
        .await
        .unwrap();
    assert!(info.etag.ends_with("-2"), "{}", info.etag);
    assert_eq!(info.size, 5 * 1024 * 1024 + 4);
    let scratch = std::fs::read_dir(temp.path().join("__multipart")).unwrap().count();
    assert_eq!(scratch, 0, "finished uploads leave no scratch state");
}

#[tokio::test]
async fn test_pending_uploads_are_not_listed() {
    let temp = TempDir::new().unwrap();
    let bucket = open(&temp).await;

    let upload = bucket.new_multipart_upload("big", WriterOptions::default()).await.unwrap();
    let mut w = bucket.new_part_writer("big", &upload, 1, WriterOptions::default()).await.unwrap();
    w.write(b"part").await.unwrap();
    w.close().await.unwrap();
    bucket.write_all("small", b"x", WriterOptions::default()).await.unwrap();

    let listed = bucket.list(ListOptions::default()).collect_all().await.unwrap();
    let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["small"]);
    assert!(!bucket.exists("big").await.unwrap());
}

#[tokio::test]
async fn test_stale_temp_files_are_purged_on_open() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("sub")).unwrap();
    std::fs::write(temp.path().join("sub/__tmp.99.1"), b"abandoned").unwrap();

    // Fresh by the default threshold.
    FileBucket::builder().root(temp.path()).open().await.unwrap();
    assert!(temp.path().join("sub/__tmp.99.1").exists());

    let bucket = FileBucket::builder()
        .root(temp.path())
        .stale_after(Duration::ZERO)
        .open()
        .await
        .unwrap();
    assert!(!temp.path().join("sub/__tmp.99.1").exists());
    assert!(!temp.path().join("sub").exists(), "empty directories are pruned");
    assert!(bucket.root().exists());
}

#[tokio::test]
async fn test_deleting_last_object_leaves_no_empty_listing_entries() {
    let temp = TempDir::new().unwrap();
    let bucket = open(&temp).await;

    bucket.write_all("a/b/c", b"x", WriterOptions::default()).await.unwrap();
    bucket.write_all("z", b"y", WriterOptions::default()).await.unwrap();
    bucket.delete("a/b/c").await.unwrap();

    let opts = ListOptions::default().delimiter("/");
    let listed = bucket.list(opts).collect_all().await.unwrap();
    let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["z"], "directories without objects are not reported");
}

fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof!["[a-c]{1,3}", Just("_".to_owned()), Just(".".to_owned())], 1..4)
        .prop_map(|segments| segments.join("/"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn listing_is_sorted_and_complete(
        keys in prop::collection::btree_set(key_strategy(), 1..12),
        page_size in 1usize..5,
    ) {
        // A key cannot be both an object and a directory of other objects.
        prop_assume!(keys.iter().all(|k| {
            let dir = format!("{k}/");
            !keys.iter().any(|other| other.starts_with(&dir))
        }));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let listed = rt.block_on(async {
            let temp = TempDir::new().unwrap();
            let bucket = open(&temp).await;
            for key in &keys {
                bucket.write_all(key, key.as_bytes(), WriterOptions::default()).await.unwrap();
            }
            let opts = ListOptions { page_size, ..ListOptions::default() };
            bucket.list(opts).collect_all().await.unwrap()
        });

        let listed: Vec<String> = listed.into_iter().map(|o| o.key).collect();
        let expected: Vec<String> = keys.into_iter().collect();
        prop_assert_eq!(listed, expected);
    }
}
