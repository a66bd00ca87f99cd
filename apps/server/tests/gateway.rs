use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use std::time::Duration;
use stow_blob::{HttpMethod, SignedUrlOptions, WriterOptions, etag};
use stow_server::{Server, ServerConfig};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

async fn server(temp: &TempDir) -> Server {
    let mut cfg = ServerConfig::default();
    cfg.storage.root = temp.path().to_path_buf();
    cfg.signing.secret = "gateway-test".to_owned();
    Server::builder().config(cfg).build().await.unwrap()
}

/// Path and query of a URL signed by the server's own bucket.
async fn signed(server: &Server, key: &str, method: HttpMethod) -> String {
    let opts = SignedUrlOptions { expiry: Duration::from_secs(60), method };
    let url = server.state().bucket.signed_url(key, opts).await.unwrap();
    let url = Url::parse(&url).unwrap();
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

async fn body_bytes(res: axum::response::Response) -> Vec<u8> {
    res.into_body().collect().await.unwrap().to_bytes().to_vec()
}

#[tokio::test]
async fn put_then_get_round_trips_with_headers() {
    let temp = TempDir::new().unwrap();
    let server = server(&temp).await;

    let put = signed(&server, "docs/hello.txt", HttpMethod::Put).await;
    let res = server
        .router()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&put)
                .header(header::CONTENT_TYPE, "text/plain")
                .header(header::CACHE_CONTROL, "max-age=60")
                .body(Body::from("hello gateway"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let get = signed(&server, "docs/hello.txt", HttpMethod::Get).await;
    let res = server
        .router()
        .oneshot(Request::builder().uri(&get).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(headers[header::CONTENT_LENGTH], "13");
    assert_eq!(headers[header::CACHE_CONTROL], "max-age=60");
    let etag = format!("\"{}\"", etag::md5_hex(b"hello gateway"));
    assert_eq!(headers[header::ETAG], etag.as_str());
    assert!(headers.contains_key(header::LAST_MODIFIED));
    assert_eq!(body_bytes(res).await, b"hello gateway");
}

#[tokio::test]
async fn content_md5_mismatch_is_precondition_failed() {
    let temp = TempDir::new().unwrap();
    let server = server(&temp).await;

    let put = signed(&server, "checked", HttpMethod::Put).await;
    let wrong = STANDARD.encode([0u8; 16]);
    let res = server
        .router()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&put)
                .header("content-md5", wrong)
                .body(Body::from("payload"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
    assert!(!server.state().bucket.exists("checked").await.unwrap());

    let res = server
        .router()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&put)
                .header("content-md5", "%%%")
                .body(Body::from("payload"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn method_must_match_the_signed_one() {
    let temp = TempDir::new().unwrap();
    let server = server(&temp).await;
    let bucket = &server.state().bucket;
    bucket.write_all("keep", b"x", WriterOptions::default()).await.unwrap();

    let get = signed(&server, "keep", HttpMethod::Get).await;
    let res = server
        .router()
        .oneshot(Request::builder().method("DELETE").uri(&get).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(bucket.exists("keep").await.unwrap());

    let delete = signed(&server, "keep", HttpMethod::Delete).await;
    let res = server
        .router()
        .oneshot(Request::builder().method("DELETE").uri(&delete).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(!bucket.exists("keep").await.unwrap());
}

#[tokio::test]
async fn tampered_or_unsigned_requests_are_forbidden() {
    let temp = TempDir::new().unwrap();
    let server = server(&temp).await;

    let get = signed(&server, "secret.txt", HttpMethod::Get).await;
    let forged = get.replace("secret.txt", "other.txt");
    for uri in [forged.as_str(), "/blob", "/blob?obj=secret.txt"] {
        let res = server
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn missing_objects_are_not_found() {
    let temp = TempDir::new().unwrap();
    let server = server(&temp).await;

    let get = signed(&server, "absent", HttpMethod::Get).await;
    let res = server
        .router()
        .oneshot(Request::builder().uri(&get).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_secret_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut cfg = ServerConfig::default();
    cfg.storage.root = temp.path().to_path_buf();
    assert!(Server::builder().config(cfg).build().await.is_err());
}

#[tokio::test]
async fn head_uses_the_get_signature_and_sends_no_body() {
    let temp = TempDir::new().unwrap();
    let server = server(&temp).await;
    let opts = WriterOptions { content_type: Some("text/plain".to_owned()), ..Default::default() };
    server.state().bucket.write_all("meta.txt", b"four", opts).await.unwrap();

    let get = signed(&server, "meta.txt", HttpMethod::Get).await;
    let res = server
        .router()
        .oneshot(Request::builder().method("HEAD").uri(&get).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_LENGTH], "4");
    assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain");
    let etag = format!("\"{}\"", etag::md5_hex(b"four"));
    assert_eq!(res.headers()[header::ETAG], etag.as_str());
    assert!(body_bytes(res).await.is_empty());

    let put = signed(&server, "meta.txt", HttpMethod::Put).await;
    let res = server
        .router()
        .oneshot(Request::builder().method("HEAD").uri(&put).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn etag_matches_the_served_body_after_overwrite() {
    let temp = TempDir::new().unwrap();
    let server = server(&temp).await;
    let bucket = &server.state().bucket;
    bucket.write_all("swap", b"first", WriterOptions::default()).await.unwrap();
    bucket.write_all("swap", b"second!", WriterOptions::default()).await.unwrap();

    let get = signed(&server, "swap", HttpMethod::Get).await;
    let res = server
        .router()
        .oneshot(Request::builder().uri(&get).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let etag = res.headers()[header::ETAG].to_str().unwrap().to_owned();
    let body = body_bytes(res).await;
    assert_eq!(body, b"second!");
    assert_eq!(etag, format!("\"{}\"", etag::md5_hex(&body)));
}
