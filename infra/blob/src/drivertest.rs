//! Conformance suite every [`Driver`] is expected to pass.
//!
//! Drive it from a backend's integration tests:
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn conformance() {
//!     stow_blob::drivertest::run_conformance(&MyHarness::new()).await;
//! }
//! ```
//!
//! Checks panic with a descriptive message on the first violation.

use crate::{
    Bucket, CancellationToken, CompletePart, CopyOptions, Driver, ErrorCode, HttpMethod,
    ListOptions, ListPartsOptions, ObjectInfo, SignedUrlOptions, WriterOptions, etag,
};
use async_trait::async_trait;
use md5::{Digest, Md5};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Supplies fresh, empty drivers to the suite.
#[async_trait]
pub trait Harness: Send + Sync {
    /// A driver over an empty bucket. Called once per check.
    async fn make_driver(&self) -> Arc<dyn Driver>;

    /// Minimum size of every non-last part, as configured on the drivers.
    fn min_part_size(&self) -> usize;

    /// Whether the drivers were given a URL signer.
    fn signs_urls(&self) -> bool {
        false
    }

    /// Resolves a signed URL to the key and method it grants.
    ///
    /// # Errors
    /// A description of why the URL was rejected.
    fn verify_signed_url(&self, url: &str) -> Result<(String, HttpMethod), String> {
        Err(format!("harness cannot verify {url}"))
    }
}

/// Runs every check in turn.
pub async fn run_conformance<H: Harness>(harness: &H) {
    check_write_read(harness).await;
    check_key_shapes(harness).await;
    check_range_reads(harness).await;
    check_attributes(harness).await;
    check_sniffing(harness).await;
    check_digest_mismatch(harness).await;
    check_copy(harness).await;
    check_delete(harness).await;
    check_pagination(harness).await;
    check_delimiter(harness).await;
    check_cancellation(harness).await;
    check_signed_urls(harness).await;
    check_closed(harness).await;
    check_multipart(harness).await;
    check_multipart_rejections(harness).await;
    check_copy_object_part(harness).await;
    check_multipart_cancellation(harness).await;
    check_concurrency(harness).await;
    check_concurrent_multipart(harness).await;
}

async fn bucket<H: Harness>(harness: &H) -> Bucket {
    Bucket::from_arc(harness.make_driver().await)
}

fn cancelled() -> CopyOptions {
    let token = CancellationToken::new();
    token.cancel();
    CopyOptions::default().cancel(token)
}

fn keys(objects: &[ObjectInfo]) -> Vec<&str> {
    objects.iter().map(|o| o.key.as_str()).collect()
}

async fn put(bucket: &Bucket, key: &str, data: &[u8]) {
    bucket
        .write_all(key, data, WriterOptions::default())
        .await
        .unwrap_or_else(|e| panic!("write_all({key:?}) failed: {e}"));
}

pub async fn check_write_read<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let data = b"hello world";
    put(&b, "fidelity", data).await;

    assert_eq!(b.read_all("fidelity").await.expect("read_all"), data);
    let attrs = b.attributes("fidelity").await.expect("attributes");
    assert_eq!(attrs.size, 11);
    assert_eq!(attrs.md5.as_deref(), Some(Md5::digest(data).as_slice()));
    assert_eq!(attrs.etag, etag::md5_hex(data));

    put(&b, "fidelity", b"replaced").await;
    assert_eq!(b.read_all("fidelity").await.expect("read_all after overwrite"), b"replaced");

    let err = b.read_all("missing").await.expect_err("reading a missing key");
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert!(!b.exists("missing").await.expect("exists"));
}

pub async fn check_key_shapes<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let shapes = [
        "nested/path/file.txt",
        "../escape",
        "double//slash",
        "trailing/",
        ".",
        "up/..",
        "/leading",
        "ctrl\u{1}char",
        "__0x41__",
        "under__score",
        "spaces and ünïcødé",
        "back\\slash",
    ];
    for key in shapes {
        put(&b, key, key.as_bytes()).await;
    }
    for key in shapes {
        assert_eq!(b.read_all(key).await.expect("read back"), key.as_bytes(), "key {key:?}");
    }

    let listed = b.list(ListOptions::default()).collect_all().await.expect("list");
    let mut expected = shapes.to_vec();
    expected.sort_unstable();
    assert_eq!(keys(&listed), expected, "every key listed once, in byte order");
}

pub async fn check_range_reads<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    put(&b, "range", b"0123456789").await;

    let cases: [(i64, i64, &[u8]); 6] = [
        (0, -1, b"0123456789"),
        (3, 4, b"3456"),
        (8, -1, b"89"),
        (8, 100, b"89"),
        (4, 0, b""),
        (10, -1, b""),
    ];
    for (offset, length, want) in cases {
        let mut r = b.new_range_reader("range", offset, length).await.expect("range reader");
        assert_eq!(r.size(), 10, "reader reports the object size");
        assert_eq!(r.read_to_end().await.expect("read range"), want, "range ({offset}, {length})");
        r.close();
    }

    let err = b.new_range_reader("range", 11, -1).await.expect_err("offset past the end");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    let err = b.new_range_reader("range", -1, -1).await.expect_err("negative offset");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    let err = b.new_range_reader("nope", 0, 0).await.expect_err("missing object");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

pub async fn check_attributes<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let opts = WriterOptions {
        cache_control: Some("no-cache".into()),
        content_disposition: Some("inline".into()),
        content_encoding: Some("identity".into()),
        content_language: Some("en".into()),
        ..WriterOptions::default()
    }
    .content_type("text/csv")
    .metadata("Foo", "a")
    .metadata("BAR", "b");
    b.write_all("attrs", b"a,b\n1,2\n", opts).await.expect("write with attributes");

    let attrs = b.attributes("attrs").await.expect("attributes");
    assert_eq!(attrs.cache_control.as_deref(), Some("no-cache"));
    assert_eq!(attrs.content_disposition.as_deref(), Some("inline"));
    assert_eq!(attrs.content_encoding.as_deref(), Some("identity"));
    assert_eq!(attrs.content_language.as_deref(), Some("en"));
    assert_eq!(attrs.content_type, "text/csv");
    assert_eq!(attrs.metadata.get("foo").map(String::as_str), Some("a"));
    assert_eq!(attrs.metadata.get("bar").map(String::as_str), Some("b"));
    assert_eq!(attrs.metadata.len(), 2);

    let dup = WriterOptions::default().metadata("Foo", "a").metadata("foo", "b");
    let err = b.write_all("dup", b"x", dup).await.expect_err("duplicate metadata keys");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(!b.exists("dup").await.expect("exists"), "nothing persisted on rejection");

    let err = b
        .write_all("bad-ct", b"x", WriterOptions::default().content_type("not a media type"))
        .await
        .expect_err("invalid content type");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = b.write_all("", b"x", WriterOptions::default()).await.expect_err("empty key");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

pub async fn check_sniffing<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    put(&b, "page", b"<!DOCTYPE html><html><body>hi</body></html>").await;
    let attrs = b.attributes("page").await.expect("attributes");
    assert_eq!(attrs.content_type, "text/html; charset=utf-8");

    // Spread over two writes so sniffing happens once the buffer fills.
    let binary: Vec<u8> = (0..1000u32).map(|i| (i % 7) as u8).collect();
    let mut w = b.new_writer("binary", WriterOptions::default()).await.expect("writer");
    w.write(&binary[..100]).await.expect("first write");
    w.write(&binary[100..]).await.expect("second write");
    w.close().await.expect("close");
    let attrs = b.attributes("binary").await.expect("attributes");
    assert_eq!(attrs.content_type, "application/octet-stream");
    assert_eq!(b.read_all("binary").await.expect("read"), binary);
}

pub async fn check_digest_mismatch<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    put(&b, "digest", b"original").await;

    let wrong = Md5::digest(b"something else").to_vec();
    let err = b
        .write_all("digest", b"new content", WriterOptions::default().content_md5(wrong.clone()))
        .await
        .expect_err("mismatched Content-MD5");
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
    assert_eq!(b.read_all("digest").await.expect("read"), b"original");

    let big = vec![b'z'; 4096];
    let err = b
        .write_all("digest-new", &big, WriterOptions::default().content_md5(wrong))
        .await
        .expect_err("mismatched Content-MD5 on a fresh key");
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
    assert!(!b.exists("digest-new").await.expect("exists"));
}

pub async fn check_copy<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let opts = WriterOptions::default().content_type("text/plain").metadata("origin", "src");
    b.write_all("copy/src", b"payload", opts).await.expect("write src");

    b.copy("copy/dst", "copy/src", CopyOptions::default()).await.expect("copy");
    assert_eq!(b.read_all("copy/dst").await.expect("read dst"), b"payload");
    let attrs = b.attributes("copy/dst").await.expect("attributes");
    assert_eq!(attrs.content_type, "text/plain");
    assert_eq!(attrs.metadata.get("origin").map(String::as_str), Some("src"));

    let err = b
        .copy("copy/other", "copy/missing", CopyOptions::default())
        .await
        .expect_err("copy from a missing key");
    assert_eq!(err.code(), ErrorCode::NotFound);

    let before = b.attributes("copy/dst").await.expect("attributes before cancelled copy");
    put(&b, "copy/newer", b"newer payload").await;
    let err = b.copy("copy/dst", "copy/newer", cancelled()).await.expect_err("cancelled copy");
    assert_eq!(err.code(), ErrorCode::Aborted);
    assert_eq!(b.read_all("copy/dst").await.expect("read dst"), b"payload");
    assert_eq!(b.attributes("copy/dst").await.expect("attributes").etag, before.etag);

    let err = b.copy("copy/fresh", "copy/newer", cancelled()).await.expect_err("cancelled copy");
    assert_eq!(err.code(), ErrorCode::Aborted);
    assert!(!b.exists("copy/fresh").await.expect("exists"));
}

pub async fn check_delete<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    put(&b, "gone", b"bye").await;
    b.delete("gone").await.expect("delete");
    assert!(!b.exists("gone").await.expect("exists"));

    let err = b.delete("gone").await.expect_err("second delete");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

pub async fn check_pagination<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    for key in ["a-0", "a-1", "a-2"] {
        put(&b, key, key.as_bytes()).await;
    }

    let mut opts = ListOptions::default().page_size(1);
    let mut pages = Vec::new();
    loop {
        let page = b.list_page(&opts).await.expect("list page");
        pages.push(keys(&page.objects).into_iter().map(str::to_owned).collect::<Vec<_>>());
        match page.next_page_token {
            Some(token) => opts.page_token = Some(token),
            None => break,
        }
    }
    assert_eq!(pages, vec![vec!["a-0"], vec!["a-1"], vec!["a-2"]]);

    // An insert behind the cursor's successor shows up; nothing is skipped or repeated.
    let mut opts = ListOptions::default().page_size(1);
    let first = b.list_page(&opts).await.expect("first page");
    assert_eq!(keys(&first.objects), ["a-0"]);
    put(&b, "a-0a", b"late").await;

    let mut seen: Vec<String> = first.objects.into_iter().map(|o| o.key).collect();
    opts.page_token = first.next_page_token;
    while opts.page_token.is_some() {
        let page = b.list_page(&opts).await.expect("next page");
        seen.extend(page.objects.into_iter().map(|o| o.key));
        opts.page_token = page.next_page_token;
    }
    assert_eq!(seen, ["a-0", "a-0a", "a-1", "a-2"]);

    let all = b.list(ListOptions::prefix("a-").page_size(2)).collect_all().await.expect("list");
    assert_eq!(keys(&all), ["a-0", "a-0a", "a-1", "a-2"]);
}

pub async fn check_delimiter<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    for key in ["dir/a.txt", "dir/b.txt", "dir2/c.txt", "f.txt"] {
        put(&b, key, key.as_bytes()).await;
    }

    let listed =
        b.list(ListOptions::default().delimiter("/")).collect_all().await.expect("list root");
    assert_eq!(keys(&listed), ["dir/", "dir2/", "f.txt"]);
    assert_eq!(listed.iter().map(|o| o.is_dir).collect::<Vec<_>>(), [true, true, false]);

    let paged = b
        .list(ListOptions::default().delimiter("/").page_size(1))
        .collect_all()
        .await
        .expect("list root one per page");
    assert_eq!(keys(&paged), ["dir/", "dir2/", "f.txt"]);

    let inner =
        b.list(ListOptions::prefix("dir/").delimiter("/")).collect_all().await.expect("list dir");
    assert_eq!(keys(&inner), ["dir/a.txt", "dir/b.txt"]);

    let flat = b.list(ListOptions::prefix("dir")).collect_all().await.expect("flat list");
    assert_eq!(keys(&flat), ["dir/a.txt", "dir/b.txt", "dir2/c.txt"]);
}

pub async fn check_cancellation<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    put(&b, "atomic", b"original").await;

    let token = CancellationToken::new();
    let opts = WriterOptions::default().content_type("text/plain").cancel(token.clone());
    let mut w = b.new_writer("atomic", opts).await.expect("writer");
    w.write(&[b'x'; 2048]).await.expect("partial write");
    token.cancel();
    let err = w.close().await.expect_err("close after cancel");
    assert_eq!(err.code(), ErrorCode::Aborted);
    assert_eq!(b.read_all("atomic").await.expect("read"), b"original");

    let mut w = b.new_writer("atomic", WriterOptions::default()).await.expect("writer");
    w.write(&[b'y'; 4096]).await.expect("write before drop");
    drop(w);
    assert_eq!(b.read_all("atomic").await.expect("read after drop"), b"original");

    let mut w = b.new_writer("atomic", WriterOptions::default()).await.expect("writer");
    w.write(&[b'z'; 1024]).await.expect("write before abort");
    w.abort().await;
    assert_eq!(b.read_all("atomic").await.expect("read after abort"), b"original");

    let listed = b.list(ListOptions::default()).collect_all().await.expect("list");
    assert_eq!(keys(&listed), ["atomic"], "no temporary artifacts are listed");
}

pub async fn check_signed_urls<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let opts = SignedUrlOptions { expiry: Duration::from_secs(60), method: HttpMethod::Put };

    if !harness.signs_urls() {
        let err = b.signed_url("signed", opts).await.expect_err("no signer configured");
        assert_eq!(err.code(), ErrorCode::Unimplemented);
        return;
    }

    let url = b.signed_url("signed/key", opts).await.expect("signed url");
    let (key, method) = harness.verify_signed_url(&url).expect("verify signed url");
    assert_eq!(key, "signed/key");
    assert_eq!(method, HttpMethod::Put);

    let get = b.signed_url("signed/key", SignedUrlOptions::default()).await.expect("get url");
    assert_ne!(get, url);
    assert_eq!(harness.verify_signed_url(&get).expect("verify get url").1, HttpMethod::Get);

    let mut tampered = url.clone();
    let last = tampered.pop().expect("non-empty url");
    tampered.push(if last == 'A' { 'B' } else { 'A' });
    assert!(harness.verify_signed_url(&tampered).is_err(), "tampered URL must be rejected");

    let err = b
        .signed_url("signed/key", SignedUrlOptions { expiry: Duration::ZERO, ..opts })
        .await
        .expect_err("zero expiry");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

pub async fn check_closed<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    put(&b, "before-close", b"x").await;
    b.close().await.expect("first close");

    let err = b.attributes("before-close").await.expect_err("use after close");
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
    let err = b.close().await.expect_err("second close");
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
}

pub async fn check_multipart<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let key = "mp/object.bin";
    let opts = WriterOptions::default().content_type("application/x-test").metadata("Kind", "mp");
    let upload = b.new_multipart_upload(key, opts).await.expect("new upload");

    let p1 = vec![b'a'; harness.min_part_size()];
    let p2 = b"tail".to_vec();

    let mut w = b.new_part_writer(key, &upload, 1, WriterOptions::default()).await.expect("part 1");
    w.write(&p1).await.expect("write part 1");
    let part1 = w.close().await.expect("close part 1");
    assert_eq!(part1.part_number, 1);
    assert_eq!(part1.etag, etag::md5_hex(&p1));
    assert_eq!(part1.size, p1.len() as u64);

    let mut w = b.new_part_writer(key, &upload, 2, WriterOptions::default()).await.expect("part 2");
    w.write(&p2).await.expect("write part 2");
    let part2 = w.close().await.expect("close part 2");

    let listed =
        b.list_parts(key, &upload, ListPartsOptions::default()).await.expect("list parts");
    assert_eq!(listed.parts.iter().map(|p| p.part_number).collect::<Vec<_>>(), [1, 2]);
    assert!(!listed.is_truncated);

    let parts = [
        CompletePart::from(&part1),
        CompletePart { part_number: 2, etag: format!("\"{}\"", part2.etag) },
    ];
    let info = b
        .complete_multipart_upload(key, &upload, &parts, CopyOptions::default())
        .await
        .expect("complete");
    assert_eq!(info.etag, etag::composite([Md5::digest(&p1), Md5::digest(&p2)]));
    assert_eq!(info.size, (p1.len() + p2.len()) as u64);

    let mut whole = p1.clone();
    whole.extend_from_slice(&p2);
    assert_eq!(b.read_all(key).await.expect("read assembled object"), whole);

    let attrs = b.attributes(key).await.expect("attributes");
    assert_eq!(attrs.etag, info.etag);
    assert_eq!(attrs.content_type, "application/x-test");
    assert_eq!(attrs.metadata.get("kind").map(String::as_str), Some("mp"));
    assert_eq!(attrs.parts.iter().map(|p| p.number).collect::<Vec<_>>(), [1, 2]);

    b.abort_multipart_upload(key, &upload).await.expect("abort after completion is a no-op");
    let err = b
        .new_part_writer(key, &upload, 3, WriterOptions::default())
        .await
        .expect_err("upload is gone");
    assert_eq!(err.code(), ErrorCode::NotFound);

    let listed = b.list(ListOptions::default()).collect_all().await.expect("list");
    assert_eq!(keys(&listed), [key], "scratch space is never listed");
}

pub async fn check_multipart_rejections<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let key = "mp/small";
    let upload = b.new_multipart_upload(key, WriterOptions::default()).await.expect("new upload");

    let small = vec![b's'; harness.min_part_size() - 1];
    let mut w = b.new_part_writer(key, &upload, 1, WriterOptions::default()).await.expect("part 1");
    w.write(&small).await.expect("write part 1");
    let part1 = w.close().await.expect("close part 1");
    let mut w = b.new_part_writer(key, &upload, 2, WriterOptions::default()).await.expect("part 2");
    w.write(b"end").await.expect("write part 2");
    let part2 = w.close().await.expect("close part 2");

    let parts = [CompletePart::from(&part1), CompletePart::from(&part2)];
    let err = b
        .complete_multipart_upload(key, &upload, &parts, CopyOptions::default())
        .await
        .expect_err("too small");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(!b.exists(key).await.expect("exists"), "no object after a failed completion");

    let bogus = [CompletePart { part_number: 1, etag: "0123456789abcdef0123456789abcdef".into() }];
    let err = b
        .complete_multipart_upload(key, &upload, &bogus, CopyOptions::default())
        .await
        .expect_err("unknown part");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    // Only the last part may be small, so a single small part completes.
    let wrong = Md5::digest(b"nope").to_vec();
    let mut w = b
        .new_part_writer(key, &upload, 3, WriterOptions::default().content_md5(wrong))
        .await
        .expect("part 3");
    w.write(b"body").await.expect("write part 3");
    let err = w.close().await.expect_err("part digest mismatch");
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
    let listed =
        b.list_parts(key, &upload, ListPartsOptions::default()).await.expect("list parts");
    assert_eq!(listed.parts.len(), 2, "rejected part was not stored");

    let info = b
        .complete_multipart_upload(
            key,
            &upload,
            &[CompletePart::from(&part2)],
            CopyOptions::default(),
        )
        .await
        .expect("single small part completes");
    assert_eq!(info.size, 3);

    b.abort_multipart_upload(key, &upload).await.expect("abort");
    b.abort_multipart_upload(key, &upload).await.expect("second abort is a no-op");
    b.abort_multipart_upload(key, "no-such-upload").await.expect("unknown upload abort");
}

pub async fn check_copy_object_part<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let src = vec![b'c'; harness.min_part_size()];
    put(&b, "copy-part/src", &src).await;

    let key = "copy-part/dst";
    let upload = b.new_multipart_upload(key, WriterOptions::default()).await.expect("new upload");
    let part1 = b
        .copy_object_part(key, "copy-part/src", &upload, 1, CopyOptions::default())
        .await
        .expect("copy part");
    assert_eq!(part1.etag, etag::md5_hex(&src));

    let mut w = b.new_part_writer(key, &upload, 2, WriterOptions::default()).await.expect("part 2");
    w.write(b"end").await.expect("write part 2");
    let part2 = w.close().await.expect("close part 2");

    let parts = [CompletePart::from(&part1), CompletePart::from(&part2)];
    b.complete_multipart_upload(key, &upload, &parts, CopyOptions::default())
        .await
        .expect("complete");

    let mut whole = src;
    whole.extend_from_slice(b"end");
    assert_eq!(b.read_all(key).await.expect("read"), whole);

    let err = b
        .copy_object_part(key, "copy-part/missing", &upload, 1, CopyOptions::default())
        .await
        .expect_err("copy from missing source");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

pub async fn check_multipart_cancellation<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let src = vec![b'k'; harness.min_part_size()];
    put(&b, "mp-cancel/src", &src).await;

    let key = "mp-cancel/dst";
    let upload = b.new_multipart_upload(key, WriterOptions::default()).await.expect("new upload");
    let err = b
        .copy_object_part(key, "mp-cancel/src", &upload, 1, cancelled())
        .await
        .expect_err("cancelled part copy");
    assert_eq!(err.code(), ErrorCode::Aborted);
    let listed =
        b.list_parts(key, &upload, ListPartsOptions::default()).await.expect("list parts");
    assert!(listed.parts.is_empty(), "cancelled part copy stores nothing");

    let mut w = b.new_part_writer(key, &upload, 1, WriterOptions::default()).await.expect("part 1");
    w.write(b"only part").await.expect("write part 1");
    let part = w.close().await.expect("close part 1");
    let parts = [CompletePart::from(&part)];

    let err = b
        .complete_multipart_upload(key, &upload, &parts, cancelled())
        .await
        .expect_err("cancelled completion");
    assert_eq!(err.code(), ErrorCode::Aborted);
    assert!(!b.exists(key).await.expect("exists"), "no object after a cancelled completion");
    let listed =
        b.list_parts(key, &upload, ListPartsOptions::default()).await.expect("upload still pending");
    assert_eq!(listed.parts.len(), 1);

    b.complete_multipart_upload(key, &upload, &parts, CopyOptions::default())
        .await
        .expect("completion after a cancelled attempt");
    assert_eq!(b.read_all(key).await.expect("read"), b"only part");
}

/// Overwrites race with readers; a reader sees one whole version, never a mix.
pub async fn check_concurrency<H: Harness>(harness: &H) {
    const WRITERS: u8 = 8;
    const READERS: usize = 4;
    const ROUNDS: usize = 16;

    let b = bucket(harness).await;
    let key = "race/object";
    let payload = |n: u8| vec![b'a' + n; 8 * 1024];
    let versions: Arc<Vec<Vec<u8>>> = Arc::new((0..=WRITERS).map(payload).collect());
    put(&b, key, &versions[0]).await;

    let mut tasks = JoinSet::new();
    for n in 1..=WRITERS {
        let (b, data) = (b.clone(), versions[usize::from(n)].clone());
        tasks.spawn(async move {
            for _ in 0..ROUNDS {
                b.write_all(key, &data, WriterOptions::default()).await.expect("concurrent write");
            }
        });
    }
    for _ in 0..READERS {
        let (b, versions) = (b.clone(), Arc::clone(&versions));
        tasks.spawn(async move {
            for _ in 0..ROUNDS {
                let got = b.read_all(key).await.expect("concurrent read");
                assert!(versions.contains(&got), "read a torn object of {} bytes", got.len());
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task panicked");
    }

    let last = b.read_all(key).await.expect("final read");
    assert!(versions.contains(&last));
    let attrs = b.attributes(key).await.expect("final attributes");
    assert_eq!(attrs.etag, etag::md5_hex(&last), "attributes belong to the stored content");

    let listed = b.list(ListOptions::default()).collect_all().await.expect("list");
    assert_eq!(keys(&listed), [key], "no temporary artifacts are listed");
}

/// Two uploads to one key stay independent; the later completion wins.
pub async fn check_concurrent_multipart<H: Harness>(harness: &H) {
    let b = bucket(harness).await;
    let key = "race/multipart";
    let first = b.new_multipart_upload(key, WriterOptions::default()).await.expect("upload 1");
    let second = b.new_multipart_upload(key, WriterOptions::default()).await.expect("upload 2");
    assert_ne!(first, second, "every upload gets its own id");

    let mut tasks = JoinSet::new();
    for (upload, fill) in [(first.clone(), b'1'), (second.clone(), b'2')] {
        let b = b.clone();
        tasks.spawn(async move {
            let mut w = b
                .new_part_writer(key, &upload, 1, WriterOptions::default())
                .await
                .expect("part writer");
            w.write(&[fill; 1024]).await.expect("write part");
            let part = w.close().await.expect("close part");
            (upload, part)
        });
    }
    let mut done = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        done.push(joined.expect("task panicked"));
    }

    for (upload, part) in &done {
        let listed =
            b.list_parts(key, upload, ListPartsOptions::default()).await.expect("list parts");
        assert_eq!(listed.parts.len(), 1, "parts never leak between uploads");
        assert_eq!(listed.parts[0].etag, part.etag);
    }

    let find = |id: &str| done.iter().find(|(u, _)| u == id).expect("finished upload");
    let (_, part1) = find(&first);
    let (_, part2) = find(&second);
    b.complete_multipart_upload(key, &first, &[CompletePart::from(part1)], CopyOptions::default())
        .await
        .expect("complete first");
    b.complete_multipart_upload(key, &second, &[CompletePart::from(part2)], CopyOptions::default())
        .await
        .expect("complete second");
    assert_eq!(b.read_all(key).await.expect("read"), vec![b'2'; 1024]);
    let attrs = b.attributes(key).await.expect("attributes");
    assert_eq!(attrs.etag, etag::composite([Md5::digest([b'2'; 1024])]));
}
