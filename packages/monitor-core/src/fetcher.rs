//! Plain HTTP content fetcher.
//!
//! Fetches raw page text over HTTP and fingerprints it. No HTML parsing,
//! markdown conversion, or link discovery happens here; richer extraction
//! belongs to collaborators behind the same trait.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use crate::traits::ContentFetcher;
use crate::types::{FetchOutcome, FetchedPage};

/// Browser-like User-Agent to avoid trivial bot blocks
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .unwrap(),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().unwrap(),
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchOutcome {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return FetchOutcome::Failed {
                    error: format!("Invalid URL: {e}"),
                }
            }
        };

        let response = match self.client.get(parsed).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    format!("Request timed out after {}ms", timeout.as_millis())
                } else {
                    format!("Request failed: {e}")
                };
                return FetchOutcome::Failed { error };
            }
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::Failed {
                error: format!("HTTP {status}"),
            };
        }

        match response.text().await {
            Ok(body) => {
                tracing::debug!(url = %url, content_length = body.len(), "fetched page");
                FetchOutcome::Fetched(FetchedPage::from_content(url.to_string(), body, None))
            }
            Err(e) => FetchOutcome::Failed {
                error: format!("Failed to read response body: {e}"),
            },
        }
    }
}
