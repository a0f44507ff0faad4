//! Platform implementations of the capability traits that talk to the
//! outside world.
//!
//! - [`ReqwestFetcher`]: remote suite documents over HTTP(S)
//!
//! The shell runner lives in [`crate::shell`].

use crate::traits::{DocumentFetcher, FetchError};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest is built without a bundled provider; install ring once.
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

pub struct ReqwestFetcher;

impl ReqwestFetcher {
    pub fn new() -> Self {
        install_crypto_provider();
        Self
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentFetcher for ReqwestFetcher {
    async fn fetch_text(&self, url: &str, timeout_ms: u64) -> Result<String, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::UnsupportedUrl(url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))?;

        let resp = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(format!("GET {}: {}", url, e))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(url, status = status.as_u16(), "fetched remote document");
        resp.text()
            .await
            .map_err(|e| FetchError::Network(format!("reading body: {}", e)))
    }
}
