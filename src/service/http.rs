//! HTTP implementation of [`StreamService`] over the service's REST API.

use super::StreamService;
use super::wire::StreamContents;
use crate::config::{RetryConfig, ServiceConfig};
use crate::error::{Error, Result, TransportError};
use crate::retry::with_retry;
use crate::types::{ResourceId, StreamPage};
use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

/// Path of the stream contents endpoint, relative to the base URL
const STREAM_CONTENTS_PATH: &str = "v3/streams/contents";

/// Fetches stream pages with `reqwest`, retrying transient failures
pub struct HttpStreamService {
    /// HTTP client for API requests
    http_client: reqwest::Client,

    /// Fully resolved endpoint URL
    endpoint: Url,

    /// Service settings (page size, ranking, credentials)
    config: ServiceConfig,

    /// Backoff policy for transient failures
    retry: RetryConfig,
}

impl HttpStreamService {
    /// Create a new HTTP stream service
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the base URL is invalid, or [`Error::Network`] if the
    /// HTTP client cannot be created
    pub fn new(config: ServiceConfig, retry: RetryConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{}/{}", base, STREAM_CONTENTS_PATH)).map_err(|e| {
            Error::Config {
                message: format!("invalid base URL '{}': {}", config.base_url, e),
                key: Some("service.base_url".to_string()),
            }
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http_client,
            endpoint,
            config,
            retry,
        })
    }

    /// Build the request URL for one page
    pub(crate) fn page_url(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
    ) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("streamId", resource.as_str())
                .append_pair("count", &self.config.page_size.to_string())
                .append_pair("ranked", self.config.ranked.as_str())
                .append_pair("unreadOnly", if self.config.unread_only { "true" } else { "false" });
            if let Some(continuation) = continuation {
                query.append_pair("continuation", continuation);
            }
            if let Some(newer_than) = newer_than {
                query.append_pair("newerThan", &newer_than.timestamp_millis().to_string());
            }
        }
        url
    }

    async fn fetch_once(&self, url: &Url) -> std::result::Result<StreamPage, TransportError> {
        let mut request = self.http_client.get(url.clone());
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_request_error)?;

        // Check HTTP status before trying to parse the response body
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|body| !body.is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(match status.as_u16() {
                401 | 403 => TransportError::Unauthorized(message),
                code => TransportError::Http {
                    status: code,
                    message,
                },
            });
        }

        let body = response.bytes().await.map_err(map_request_error)?;
        let contents: StreamContents = serde_json::from_slice(&body)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(contents.into())
    }
}

#[async_trait::async_trait]
impl StreamService for HttpStreamService {
    async fn stream_contents(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
    ) -> Result<StreamPage> {
        let url = self.page_url(resource, continuation, newer_than);
        debug!(resource = %resource, continuation = ?continuation, "Fetching stream page");

        let page = with_retry(&self.retry, || self.fetch_once(&url)).await?;

        debug!(
            stream = %page.stream_id,
            items = page.item_count(),
            has_more = page.has_more(),
            "Fetched stream page"
        );
        Ok(page)
    }
}

fn map_request_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_decode() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Request(error.to_string())
    }
}
