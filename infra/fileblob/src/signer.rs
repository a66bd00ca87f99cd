//! Signed URLs for serving bucket objects over HTTP.

use crate::error::FileBlobError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use stow_blob::{HttpMethod, SignedUrlOptions};
use url::{Url, form_urlencoded};

type HmacSha256 = Hmac<Sha256>;

/// Turns keys into URLs and back.
///
/// The fileblob driver has no HTTP surface of its own; a signer lets an
/// application hand out URLs that its own server later resolves.
pub trait UrlSigner: Send + Sync + fmt::Debug {
    /// A URL granting `opts.method` on `key` until `opts.expiry` from now.
    ///
    /// # Errors
    /// Implementation specific.
    fn url_from_key(&self, key: &str, opts: &SignedUrlOptions) -> Result<Url, FileBlobError>;

    /// The key and method a URL grants.
    ///
    /// # Errors
    /// [`FileBlobError::Signature`] for URLs that were not issued by this
    /// signer, were altered, or have expired.
    fn key_from_url(&self, url: &Url) -> Result<(String, HttpMethod), FileBlobError>;
}

/// Signs `obj`, `expiry` and `method` with HMAC-SHA256 into a `signature`
/// query parameter appended to a base URL.
pub struct UrlSignerHmac {
    base_url: Url,
    secret: Vec<u8>,
}

impl fmt::Debug for UrlSignerHmac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSignerHmac")
            .field("base_url", &self.base_url.as_str())
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl UrlSignerHmac {
    /// # Errors
    /// [`FileBlobError::InvalidFormat`] for an empty secret.
    pub fn new(base_url: Url, secret: impl Into<Vec<u8>>) -> Result<Self, FileBlobError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(FileBlobError::invalid_format("URL signing secret must not be empty"));
        }
        Ok(Self { base_url, secret })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, FileBlobError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| FileBlobError::from(format!("HMAC key rejected: {err}")))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub(crate) fn sign_until(
        &self,
        key: &str,
        method: HttpMethod,
        expires_at: i64,
    ) -> Result<Url, FileBlobError> {
        let payload = signed_payload(key, expires_at, method);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload)?.finalize().into_bytes());

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("obj", key)
            .append_pair("expiry", &expires_at.to_string())
            .append_pair("method", method.as_ref())
            .append_pair("signature", &signature);
        Ok(url)
    }

    pub(crate) fn verify_at(
        &self,
        url: &Url,
        now: i64,
    ) -> Result<(String, HttpMethod), FileBlobError> {
        let mut obj = None;
        let mut expiry = None;
        let mut method = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            let slot = match &*name {
                "obj" => &mut obj,
                "expiry" => &mut expiry,
                "method" => &mut method,
                "signature" => &mut signature,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }

        let (Some(obj), Some(expiry), Some(method), Some(signature)) =
            (obj, expiry, method, signature)
        else {
            return Err(FileBlobError::signature("missing signed query parameters"));
        };
        let expires_at: i64 =
            expiry.parse().map_err(|_| FileBlobError::signature("malformed expiry"))?;
        let method = HttpMethod::from_str(&method)
            .map_err(|_| FileBlobError::signature(format!("unsupported method {method:?}")))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| FileBlobError::signature("malformed signature"))?;

        self.mac(&signed_payload(&obj, expires_at, method))?
            .verify_slice(&signature)
            .map_err(|_| FileBlobError::signature("signature mismatch"))?;
        if now > expires_at {
            return Err(FileBlobError::signature("URL has expired"));
        }
        Ok((obj, method))
    }
}

impl UrlSigner for UrlSignerHmac {
    fn url_from_key(&self, key: &str, opts: &SignedUrlOptions) -> Result<Url, FileBlobError> {
        let ttl = i64::try_from(opts.expiry.as_secs())
            .map_err(|_| FileBlobError::invalid_format("signed URL expiry is too large"))?;
        let expires_at = Utc::now()
            .timestamp()
            .checked_add(ttl)
            .ok_or_else(|| FileBlobError::invalid_format("signed URL expiry is too large"))?;
        self.sign_until(key, opts.method, expires_at)
    }

    fn key_from_url(&self, url: &Url) -> Result<(String, HttpMethod), FileBlobError> {
        self.verify_at(url, Utc::now().timestamp())
    }
}

/// Form-encoded, key-sorted query that the MAC covers.
fn signed_payload(key: &str, expires_at: i64, method: HttpMethod) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("expiry", &expires_at.to_string())
        .append_pair("method", method.as_ref())
        .append_pair("obj", key)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stow_blob::ErrorCode;

    fn signer() -> UrlSignerHmac {
        UrlSignerHmac::new(Url::parse("http://localhost:8080/blob").unwrap(), "s3cr3t").unwrap()
    }

    #[test]
    fn signed_url_resolves_to_its_key() {
        let signer = signer();
        let opts = SignedUrlOptions { expiry: Duration::from_secs(60), method: HttpMethod::Put };
        let url = signer.url_from_key("dir/a b?.txt", &opts).unwrap();

        assert_eq!(url.path(), "/blob");
        let (key, method) = signer.key_from_url(&url).unwrap();
        assert_eq!(key, "dir/a b?.txt");
        assert_eq!(method, HttpMethod::Put);
    }

    #[test]
    fn expired_urls_are_rejected() {
        let signer = signer();
        let url = signer.sign_until("k", HttpMethod::Get, 1_000).unwrap();
        assert!(signer.verify_at(&url, 1_000).is_ok());

        let err = signer.verify_at(&url, 1_001).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn altered_fields_break_the_signature() {
        let signer = signer();
        let url = signer.sign_until("k", HttpMethod::Get, i64::MAX).unwrap();

        let mut forged = url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "method" { "DELETE".to_owned() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        forged.query_pairs_mut().clear().extend_pairs(pairs);
        assert!(matches!(signer.verify_at(&forged, 0), Err(FileBlobError::Signature { .. })));

        let other = UrlSignerHmac::new(signer.base_url().clone(), "other").unwrap();
        assert!(other.verify_at(&url, 0).is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let base = Url::parse("http://localhost/").unwrap();
        assert!(UrlSignerHmac::new(base, Vec::new()).is_err());
    }

    #[test]
    fn debug_hides_the_secret() {
        assert!(!format!("{:?}", signer()).contains("s3cr3t"));
    }
}
