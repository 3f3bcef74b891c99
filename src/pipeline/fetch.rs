//! HTTP GET with a 2xx check, shared by the content cache and image
//! acquisition.
//!
//! No retries happen here: the only fallback is the mirror list a page
//! carries, which is walked by [`crate::pipeline::acquire`].

use crate::config::RunConfig;
use crate::error::MangaPdfError;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A reusable client configured from a [`RunConfig`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout_secs: Option<u64>,
}

impl Fetcher {
    pub fn new(config: &RunConfig) -> Result<Self, MangaPdfError> {
        let mut headers = HeaderMap::new();
        if let Some(ref referer) = config.referer {
            let value = HeaderValue::from_str(referer).map_err(|e| {
                MangaPdfError::InvalidConfig(format!("Bad referer {referer:?}: {e}"))
            })?;
            headers.insert(REFERER, value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(secs) = config.download_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder.build().map_err(client_setup_error)?;

        Ok(Self {
            client,
            timeout_secs: config.download_timeout_secs,
        })
    }

    /// GET `url`; any non-2xx status is an error.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, MangaPdfError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        if !response.status().is_success() {
            return Err(MangaPdfError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(response)
    }

    /// GET `url` and buffer the whole body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, MangaPdfError> {
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        Ok(bytes.to_vec())
    }

    pub(crate) fn transport_error(&self, url: &str, e: reqwest::Error) -> MangaPdfError {
        match self.timeout_secs {
            Some(secs) if e.is_timeout() => MangaPdfError::DownloadTimeout {
                url: url.to_string(),
                secs,
            },
            _ => MangaPdfError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

/// The client could not be built; no request was ever attempted.
fn client_setup_error(e: impl std::fmt::Display) -> MangaPdfError {
    MangaPdfError::Internal(format!("HTTP client setup failed: {e}"))
}
