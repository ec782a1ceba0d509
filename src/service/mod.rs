//! Stream contents service: the transport collaborator that delivers pages of a stream.
//!
//! - [`StreamService`] - the seam the sync core fetches pages through
//! - [`HttpStreamService`] - production implementation over the service's REST API
//! - [`wire`] - JSON payload types and their conversion into [`StreamPage`]

mod http;
pub mod wire;


pub use http::HttpStreamService;

use crate::error::Result;
use crate::types::{ResourceId, StreamPage};
use chrono::{DateTime, Utc};

/// Source of stream pages
///
/// Implementations own authentication, rate limiting, and retries; the sync core treats
/// any error returned here as fatal to the session.
#[async_trait::async_trait]
pub trait StreamService: Send + Sync {
    /// Fetch one page of `resource`
    ///
    /// # Arguments
    /// * `resource` - Stream to read
    /// * `continuation` - Cursor returned with the previous page (None for the first page)
    /// * `newer_than` - Only return items newer than this instant
    async fn stream_contents(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
    ) -> Result<StreamPage>;
}
