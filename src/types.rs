//! Core types for feedsync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Identifier of a remote stream (e.g. "all articles for account X")
///
/// The service treats these as opaque strings. The constructors below build the
/// well-known shapes used by feed-aggregation services.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wrap an already-formed stream identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Every article in the user's account
    pub fn global_all(user_id: &str) -> Self {
        Self(format!("user/{}/category/global.all", user_id))
    }

    /// Every article in one of the user's categories (folders)
    pub fn category(user_id: &str, label: &str) -> Self {
        Self(format!("user/{}/category/{}", user_id, label))
    }

    /// Articles the user has saved for later
    pub fn saved(user_id: &str) -> Self {
        Self(format!("user/{}/tag/global.saved", user_id))
    }

    /// A single feed, identified by its URL
    pub fn feed(url: &str) -> Self {
        Self(format!("feed/{}", url))
    }

    /// The raw stream identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique identifier for a node in the operation graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Lifecycle of a node in the operation graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    /// Waiting for dependencies, or for the queue to resume
    Pending,
    /// Currently running on the worker pool
    Executing,
    /// Ran to completion (successfully or with an error)
    Finished,
    /// Canceled before it could finish
    Canceled,
}

impl OperationState {
    /// Whether the node will never run (again)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Finished | OperationState::Canceled)
    }
}

/// One article as delivered by the stream service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    /// Service-assigned article identity
    pub id: String,
    /// Identifier of the feed the article belongs to (None if the service omitted it)
    pub feed_id: Option<String>,
    /// Display title of the owning feed
    pub feed_title: Option<String>,
    /// Article title
    pub title: Option<String>,
    /// Canonical link to the article
    pub url: Option<String>,
    /// Author name
    pub author: Option<String>,
    /// Full HTML content
    pub content_html: Option<String>,
    /// Summary / excerpt HTML
    pub summary: Option<String>,
    /// Publication time
    pub published: Option<DateTime<Utc>>,
    /// Last modification time
    pub updated: Option<DateTime<Utc>>,
    /// Whether the article is unread on the service
    pub unread: bool,
    /// Whether the article is saved/starred on the service
    pub starred: bool,
}

/// One fetched batch of the stream
#[derive(Clone, Debug, PartialEq)]
pub struct StreamPage {
    /// Identifier of the stream the page belongs to (as echoed by the service)
    pub stream_id: String,
    /// Items in service order
    pub items: Vec<ParsedItem>,
    /// Cursor for the next page; `None` means end of stream
    pub continuation: Option<String>,
}

impl StreamPage {
    /// Number of items in the page
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Whether more pages follow this one
    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }
}

/// Items of a single feed, in page order
#[derive(Clone, Debug, PartialEq)]
pub struct FeedItems {
    /// Feed identifier
    pub feed_id: String,
    /// Feed title, taken from the first item that carried one
    pub feed_title: Option<String>,
    /// Items belonging to the feed
    pub items: Vec<ParsedItem>,
}

/// A page's items partitioned by owning feed
///
/// Feeds keep the order in which they first appear in the page, and items keep
/// their page order within each feed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupedItems {
    feeds: Vec<FeedItems>,
    index: HashMap<String, usize>,
}

impl GroupedItems {
    /// Create an empty grouping
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to its feed's group, creating the group on first sight
    pub fn push(&mut self, feed_id: &str, item: ParsedItem) {
        let slot = match self.index.get(feed_id) {
            Some(&slot) => slot,
            None => {
                self.feeds.push(FeedItems {
                    feed_id: feed_id.to_string(),
                    feed_title: None,
                    items: Vec::new(),
                });
                self.index.insert(feed_id.to_string(), self.feeds.len() - 1);
                self.feeds.len() - 1
            }
        };

        let group = &mut self.feeds[slot];
        if group.feed_title.is_none() {
            group.feed_title = item.feed_title.clone();
        }
        group.items.push(item);
    }

    /// Items for one feed
    pub fn get(&self, feed_id: &str) -> Option<&FeedItems> {
        self.index.get(feed_id).map(|&slot| &self.feeds[slot])
    }

    /// Iterate over feeds in first-appearance order
    pub fn iter(&self) -> impl Iterator<Item = &FeedItems> {
        self.feeds.iter()
    }

    /// Number of distinct feeds
    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Total number of items across all feeds
    pub fn item_count(&self) -> usize {
        self.feeds.iter().map(|f| f.items.len()).sum()
    }

    /// Whether no items were grouped
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

/// Result of merging one page into the store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Number of feeds touched
    pub feeds: usize,
    /// Articles that did not exist before the merge
    pub articles_created: usize,
    /// Articles that existed and were updated in place
    pub articles_updated: usize,
}

impl MergeSummary {
    /// Total number of articles written by the merge
    pub fn articles(&self) -> usize {
        self.articles_created + self.articles_updated
    }
}

impl std::ops::AddAssign for MergeSummary {
    fn add_assign(&mut self, other: Self) {
        self.feeds += other.feeds;
        self.articles_created += other.articles_created;
        self.articles_updated += other.articles_updated;
    }
}

/// Lifecycle of a sync session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Constructed but not started
    Idle,
    /// Pages are being fetched and merged
    Running,
    /// The stream was fully ingested
    Finished,
    /// A stage failed and the session was aborted
    Failed,
    /// The caller canceled the session
    Canceled,
}

/// Summary of a successful sync session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Stream that was synced
    pub resource: ResourceId,
    /// Number of pages fetched (equals the number of chains)
    pub pages_fetched: usize,
    /// Number of fetch/group/merge chains created
    pub chains: usize,
    /// Total items received from the service
    pub items_fetched: usize,
    /// Articles created in the store
    pub articles_created: usize,
    /// Articles updated in the store
    pub articles_updated: usize,
    /// Wall-clock duration of the session
    pub elapsed: Duration,
}

/// Event emitted during a sync session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Session started
    Started {
        /// Stream being synced
        resource: ResourceId,
        /// Lower bound on item freshness, if any
        newer_than: Option<DateTime<Utc>>,
    },

    /// A page fetch was scheduled
    PageRequested {
        /// Stream being synced
        resource: ResourceId,
        /// Zero-based page number
        page: usize,
        /// Continuation token the page was requested with
        continuation: Option<String>,
    },

    /// A page was received from the service
    PageFetched {
        /// Zero-based page number
        page: usize,
        /// Stream identifier echoed by the service
        stream_id: String,
        /// Number of items in the page
        item_count: usize,
        /// Continuation token for the next page, if any
        continuation: Option<String>,
    },

    /// A page was partitioned by feed
    ItemsGrouped {
        /// Zero-based page number
        page: usize,
        /// Number of distinct feeds in the page
        feeds: usize,
        /// Number of items kept
        items: usize,
        /// Number of items dropped for lacking a feed identifier
        skipped: usize,
    },

    /// A page was merged into the store
    ItemsMerged {
        /// Zero-based page number
        page: usize,
        /// What the merge changed
        summary: MergeSummary,
    },

    /// The last page was observed
    EndOfStream {
        /// Total number of pages in the stream
        pages: usize,
    },

    /// Every merge finished; the stream is fully ingested
    Completed {
        /// Session summary
        report: SyncReport,
    },

    /// A stage failed and the session was aborted
    Failed {
        /// Error message
        error: String,
    },

    /// The session was canceled by the caller
    Canceled {
        /// Stream that was being synced
        resource: ResourceId,
    },
}
