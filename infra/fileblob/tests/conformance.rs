use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use stow_blob::drivertest::{Harness, run_conformance};
use stow_blob::{Driver, HttpMethod, PrefixedDriver};
use stow_fileblob::{FileBucket, UrlSigner, UrlSignerHmac};
use tempfile::TempDir;
use url::Url;

const MIN_PART: usize = 1024;

/// Opens a fresh bucket in its own temporary directory per check.
struct FileHarness {
    dirs: Mutex<Vec<TempDir>>,
    signer: Option<Arc<UrlSignerHmac>>,
    prefix: Option<&'static str>,
}

impl FileHarness {
    fn new() -> Self {
        Self { dirs: Mutex::new(Vec::new()), signer: None, prefix: None }
    }

    fn signing() -> Self {
        let base = Url::parse("http://localhost:8080/blob").unwrap();
        let signer = UrlSignerHmac::new(base, "conformance-secret").unwrap();
        Self { signer: Some(Arc::new(signer)), ..Self::new() }
    }

    fn prefixed(prefix: &'static str) -> Self {
        Self { prefix: Some(prefix), ..Self::signing() }
    }
}

#[async_trait]
impl Harness for FileHarness {
    async fn make_driver(&self) -> Arc<dyn Driver> {
        let dir = TempDir::new().unwrap();
        let mut builder = FileBucket::builder().root(dir.path()).min_part_size(MIN_PART as u64);
        if let Some(signer) = &self.signer {
            builder = builder.url_signer(signer.clone());
        }
        let bucket = builder.open().await.unwrap();
        self.dirs.lock().unwrap().push(dir);

        let driver: Arc<dyn Driver> = Arc::new(bucket);
        match self.prefix {
            Some(prefix) => Arc::new(PrefixedDriver::new(driver, prefix)),
            None => driver,
        }
    }

    fn min_part_size(&self) -> usize {
        MIN_PART
    }

    fn signs_urls(&self) -> bool {
        self.signer.is_some()
    }

    fn verify_signed_url(&self, url: &str) -> Result<(String, HttpMethod), String> {
        let signer = self.signer.as_ref().ok_or("no signer")?;
        let url = Url::parse(url).map_err(|e| e.to_string())?;
        let (key, method) = signer.key_from_url(&url).map_err(|e| e.to_string())?;
        match self.prefix {
            Some(prefix) => key
                .strip_prefix(prefix)
                .map(|k| (k.to_owned(), method))
                .ok_or_else(|| format!("{key:?} is outside {prefix:?}")),
            None => Ok((key, method)),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn conformance_without_signer() {
    run_conformance(&FileHarness::new()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn conformance_with_hmac_signer() {
    run_conformance(&FileHarness::signing()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn conformance_under_prefix() {
    run_conformance(&FileHarness::prefixed("tenant/")).await;
}
