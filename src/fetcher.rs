use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::config::FetchSettings;
use crate::error::{FetchFailure, ScrapeError};

/// Raw page content as returned by the server.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    /// `charset` from the Content-Type header, if any.
    pub declared_encoding: Option<String>,
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
}

/// HTTP GET with per-attempt timeout and exponential backoff.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl Fetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            timeout: settings.timeout(),
            max_retries: settings.max_retries.max(1),
            backoff_base: settings.backoff_base(),
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Fetch `url`, retrying transient failures up to `max_retries` total attempts.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, ScrapeError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(url).await {
                Ok(result) => {
                    debug!(url, attempt, status = result.status, bytes = result.bytes.len(), "Fetched");
                    return Ok(result);
                }
                Err(cause) if cause.is_transient() && attempt < self.max_retries => {
                    let backoff = self.backoff_delay(attempt);
                    warn!(
                        "Fetch of {} failed: {} (attempt {}/{}), backing off {:.1}s",
                        url,
                        cause,
                        attempt,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(cause) => {
                    return Err(ScrapeError::Network {
                        cause,
                        attempts: attempt,
                    })
                }
            }
        }
    }

    /// Delay after the given (1-based) failed attempt: base, 2×base, 4×base, ...
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchResult, FetchFailure> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status));
        }

        let declared_encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_param);
        let final_url = response.url().to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchResult {
            bytes,
            declared_encoding,
            status: status.as_u16(),
            final_url,
        })
    }
}

/// Pull `charset` out of a Content-Type value like `text/html; charset="utf-8"`.
fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
