use crate::error::{ApiError, ApiErrorExt};
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::io;
use std::sync::Arc;
use stow_blob::{Attributes, Bucket, Reader, WriterOptions};
use stow_fileblob::UrlSigner;
use tokio::io::AsyncReadExt;
use tower_http::trace::TraceLayer;
use tracing::debug;
use url::Url;

const CHUNK: usize = 64 * 1024;
const OPEN_ATTEMPTS: usize = 3;

/// Everything a request handler needs.
#[derive(Debug, Clone)]
pub struct AppState {
    pub bucket: Bucket,
    pub signer: Arc<dyn UrlSigner>,
    /// Public URL of the blob endpoint; signed URLs are verified against it.
    pub base_url: Url,
}

pub fn init(state: AppState) -> Router {
    Router::new()
        .route("/blob", get(read_blob).put(write_blob).delete(delete_blob))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves the signed query to a key and rejects a method other than the signed one.
/// A URL signed for GET also authorizes HEAD.
fn authorize(state: &AppState, method: &Method, uri: &Uri) -> Result<String, ApiError> {
    let mut url = state.base_url.clone();
    url.set_query(uri.query());
    let (key, signed) = state.signer.key_from_url(&url)?;
    let effective = if method == Method::HEAD { &Method::GET } else { method };
    if effective.as_str() != signed.as_ref() {
        return Err(ApiError::MethodMismatch {
            signed: signed.to_string(),
            actual: method.to_string(),
            context: Some(format!("object {key:?}").into()),
        });
    }
    Ok(key)
}

async fn read_blob(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError> {
    let key = authorize(&state, &method, &uri)?;
    let (reader, attrs) = open_consistent(&state.bucket, &key).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(reader.content_type())?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(reader.size()));
    headers.insert(header::ETAG, header_value(&format!("\"{}\"", attrs.etag))?);
    let last_modified = reader.mod_time().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    headers.insert(header::LAST_MODIFIED, header_value(&last_modified)?);
    if let Some(cache_control) = &attrs.cache_control {
        headers.insert(header::CACHE_CONTROL, header_value(cache_control)?);
    }

    if method == Method::HEAD {
        reader.close();
        return Ok((headers, Body::empty()).into_response());
    }
    debug!(key, size = reader.size(), "Serving object");
    Ok((headers, Body::from_stream(chunks(reader))).into_response())
}

/// Opens `key` along with attributes of the same version, retrying when the
/// object is replaced between the two lookups.
async fn open_consistent(bucket: &Bucket, key: &str) -> Result<(Reader, Attributes), ApiError> {
    for _ in 0..OPEN_ATTEMPTS {
        let reader = bucket.new_reader(key).await?;
        let attrs = bucket.attributes(key).await?;
        if attrs.size == reader.size() && attrs.mod_time == reader.mod_time() {
            return Ok((reader, attrs));
        }
        debug!(key, "Object replaced while opening, retrying");
        reader.close();
    }
    Err(ApiError::from(format!("object {key:?} kept changing while being opened")))
}

async fn write_blob(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let key = authorize(&state, &method, &uri)?;
    let opts = writer_options(&headers)?;

    let mut writer = state.bucket.new_writer(&key, opts).await?;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let written = match chunk {
            Ok(chunk) => writer.write(&chunk).await.map(|_| ()).map_err(ApiError::from),
            Err(err) => Err(ApiError::bad_request(format!("request body: {err}"))),
        };
        if let Err(err) = written {
            writer.abort().await;
            return Err(err);
        }
    }
    writer.close().await.context(format!("Storing {key:?}"))?;

    debug!(key, "Object stored");
    Ok(StatusCode::CREATED)
}

async fn delete_blob(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<StatusCode, ApiError> {
    let key = authorize(&state, &method, &uri)?;
    state.bucket.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn writer_options(headers: &HeaderMap) -> Result<WriterOptions, ApiError> {
    let text = |name: header::HeaderName| -> Result<Option<String>, ApiError> {
        headers
            .get(&name)
            .map(|v| {
                v.to_str()
                    .map(str::to_owned)
                    .map_err(|_| ApiError::bad_request(format!("{name} is not valid text")))
            })
            .transpose()
    };

    let content_md5 = text(header::HeaderName::from_static("content-md5"))?
        .map(|v| STANDARD.decode(v.trim()))
        .transpose()
        .map_err(|_| ApiError::bad_request("Content-MD5 is not valid base64"))?;

    Ok(WriterOptions {
        content_type: text(header::CONTENT_TYPE)?,
        cache_control: text(header::CACHE_CONTROL)?,
        content_disposition: text(header::CONTENT_DISPOSITION)?,
        content_encoding: text(header::CONTENT_ENCODING)?,
        content_language: text(header::CONTENT_LANGUAGE)?,
        content_md5,
        ..WriterOptions::default()
    })
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::from(format!("attribute {value:?} is not a valid header value")))
}

/// Streams the reader in chunks and closes it at end of input.
fn chunks(reader: Reader) -> impl Stream<Item = io::Result<Bytes>> + Send {
    futures::stream::try_unfold(reader, |mut reader| async move {
        let mut buf = BytesMut::with_capacity(CHUNK);
        if reader.read_buf(&mut buf).await? == 0 {
            reader.close();
            return Ok(None);
        }
        Ok::<_, io::Error>(Some((buf.freeze(), reader)))
    })
}
