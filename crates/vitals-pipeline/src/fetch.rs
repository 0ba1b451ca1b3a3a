//! Upstream document fetching: a reqwest client with timeout and bounded
//! retry with exponential backoff.
//!
//! Retries cover transport failures and non-success statuses only; a
//! document that downloads but fails to parse is surfaced immediately and
//! never retried.

use std::time::Duration;
use tracing::{info, warn};
use vitals_common::{Result, VitalsError};

const USER_AGENT: &str = "vitals-pipeline/0.1";

/// HTTP fetcher for upstream source documents.
pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl Fetcher {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self> {
        if max_retries == 0 {
            return Err(VitalsError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| VitalsError::Fetch {
                url: String::new(),
                source: Box::new(e),
            })?;

        Ok(Self {
            client,
            max_retries,
        })
    }

    /// Fetch the raw bytes at `url`, retrying transient failures with
    /// exponential backoff (2^attempt seconds).
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.fetch_once(url).await {
                Ok(bytes) => {
                    info!(url, bytes = bytes.len(), "Fetched source document");
                    return Ok(bytes);
                },
                Err(e) => {
                    warn!(
                        url,
                        attempt,
                        max_retries = self.max_retries,
                        "Fetch attempt failed: {}",
                        e
                    );
                    last_error = Some(e);

                    if attempt < self.max_retries {
                        let backoff_secs = 2u64.pow(attempt);
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    }
                },
            }
        }

        // max_retries >= 1, so an error was recorded on every path here.
        Err(last_error.unwrap_or_else(|| VitalsError::Fetch {
            url: url.to_string(),
            source: "no attempt recorded an error".into(),
        }))
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VitalsError::Fetch {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VitalsError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| VitalsError::Fetch {
            url: url.to_string(),
            source: Box::new(e),
        })?;

        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a,b\n1,2".to_vec()))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(5, 1).unwrap();
        let bytes = fetcher.fetch(&format!("{}/data.csv", server.uri())).await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(5, 1).unwrap();
        let err = fetcher
            .fetch(&format!("{}/missing.pdf", server.uri()))
            .await
            .unwrap_err();
        match err {
            VitalsError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_retries_rejected() {
        assert!(Fetcher::new(5, 0).is_err());
    }
}
