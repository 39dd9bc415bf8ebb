use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, ETAG, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::traits::ConditionalFetcher;
use crate::config::HttpConfig;
use crate::errors::{CacheError, CacheResult, FetchError};
use crate::models::{FetchOutcome, FreshResponse, ValidatorPair};

/// How a response status maps onto the cache's view of the world
#[derive(Debug, PartialEq, Eq)]
pub enum Classification {
    /// 2xx: body should be read; validators default to empty when absent
    Fresh(ValidatorPair),
    NotModified,
    ServerError(u16),
}

/// Classify a status line and its headers, independent of the body
pub fn classify(status: StatusCode, headers: &HeaderMap) -> Classification {
    if status == StatusCode::NOT_MODIFIED {
        return Classification::NotModified;
    }
    if !status.is_success() {
        return Classification::ServerError(status.as_u16());
    }

    let header_text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    Classification::Fresh(ValidatorPair::new(
        header_text(ETAG),
        header_text(LAST_MODIFIED),
    ))
}

/// reqwest-backed [`ConditionalFetcher`]
#[derive(Clone)]
pub struct HttpFetchClient {
    client: Client,
}

impl HttpFetchClient {
    pub fn new(config: &HttpConfig) -> CacheResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| CacheError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. one shared with the rest of an application
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn parse_url(url: &str) -> Result<Url, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            _ => Err(FetchError::invalid_url(url)),
        }
    }

    async fn fetch(&self, url: &str, validators: Option<&ValidatorPair>) -> Result<FetchOutcome, FetchError> {
        let parsed = Self::parse_url(url)?;

        let mut request = self.client.get(parsed);
        if let Some((name, value)) = validators.and_then(ValidatorPair::conditional_header) {
            debug!(url, header = name, value, "Sending conditional request");
            request = request.header(name, value);
        } else {
            debug!(url, "Sending unconditional request");
        }

        let response = request.send().await.map_err(FetchError::network)?;
        let status = response.status();

        match classify(status, response.headers()) {
            Classification::NotModified => {
                debug!(url, "304 Not Modified");
                Ok(FetchOutcome::NotModified)
            }
            Classification::ServerError(status) => {
                debug!(url, status, "Server returned an error status");
                Err(FetchError::ServerError { status })
            }
            Classification::Fresh(validators) => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::invalid_response(format!("Failed to read response: {e}")))?;

                debug!(
                    url,
                    status = status.as_u16(),
                    bytes = body.len(),
                    etag = %validators.etag,
                    last_modified = %validators.last_modified,
                    "Fetched fresh content"
                );

                Ok(FetchOutcome::Fresh(FreshResponse {
                    data: body.to_vec(),
                    validators,
                }))
            }
        }
    }
}

#[async_trait]
impl ConditionalFetcher for HttpFetchClient {
    async fn fetch_conditional(
        &self,
        url: &str,
        validators: Option<&ValidatorPair>,
    ) -> FetchOutcome {
        self.fetch(url, validators)
            .await
            .unwrap_or_else(FetchOutcome::Failed)
    }
}
