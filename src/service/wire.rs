//! JSON payloads of the stream contents endpoint.

use crate::types::{ParsedItem, StreamPage};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Tag the service attaches to saved ("starred") articles
const SAVED_TAG_SUFFIX: &str = "/tag/global.saved";

/// Response body of `GET /v3/streams/contents`
#[derive(Debug, Deserialize)]
pub struct StreamContents {
    /// Stream identifier
    pub id: String,
    /// Cursor for the next page
    #[serde(default)]
    pub continuation: Option<String>,
    /// Entries in the page
    #[serde(default)]
    pub items: Vec<Entry>,
}

/// One entry of a stream page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Entry identifier
    pub id: String,
    /// Entry title
    #[serde(default)]
    pub title: Option<String>,
    /// Full content
    #[serde(default)]
    pub content: Option<Content>,
    /// Summary content
    #[serde(default)]
    pub summary: Option<Content>,
    /// Author name
    #[serde(default)]
    pub author: Option<String>,
    /// Alternate links (the first HTML one is the article URL)
    #[serde(default)]
    pub alternate: Vec<Link>,
    /// Canonical URL, when the service knows it
    #[serde(default)]
    pub canonical_url: Option<String>,
    /// Feed the entry came from
    #[serde(default)]
    pub origin: Option<Origin>,
    /// Publication time (unix milliseconds)
    #[serde(default)]
    pub published: Option<i64>,
    /// Last update time (unix milliseconds)
    #[serde(default)]
    pub updated: Option<i64>,
    /// Crawl time (unix milliseconds)
    #[serde(default)]
    pub crawled: Option<i64>,
    /// Whether the entry is unread
    #[serde(default)]
    pub unread: bool,
    /// User tags on the entry
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// HTML content block
#[derive(Debug, Deserialize)]
pub struct Content {
    /// HTML body
    pub content: String,
}

/// Hyperlink
#[derive(Debug, Deserialize)]
pub struct Link {
    /// Target URL
    pub href: String,
    /// MIME type
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
}

/// Feed an entry originates from
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    /// Feed stream identifier ("feed/<url>")
    #[serde(default)]
    pub stream_id: Option<String>,
    /// Feed title
    #[serde(default)]
    pub title: Option<String>,
    /// Feed homepage
    #[serde(default)]
    pub html_url: Option<String>,
}

/// User tag
#[derive(Debug, Deserialize)]
pub struct Tag {
    /// Tag identifier
    pub id: String,
    /// Tag label
    #[serde(default)]
    pub label: Option<String>,
}

impl From<StreamContents> for StreamPage {
    fn from(contents: StreamContents) -> Self {
        StreamPage {
            stream_id: contents.id,
            items: contents.items.into_iter().map(ParsedItem::from).collect(),
            // Some service versions send an empty string instead of omitting the field
            continuation: contents.continuation.filter(|c| !c.is_empty()),
        }
    }
}

impl From<Entry> for ParsedItem {
    fn from(entry: Entry) -> Self {
        let url = entry.canonical_url.or_else(|| {
            entry
                .alternate
                .iter()
                .find(|link| link.mime_type.as_deref().is_none_or(|t| t == "text/html"))
                .map(|link| link.href.clone())
        });
        let starred = entry.tags.iter().any(|tag| tag.id.ends_with(SAVED_TAG_SUFFIX));
        let (feed_id, feed_title) = match entry.origin {
            Some(origin) => (origin.stream_id, origin.title),
            None => (None, None),
        };

        ParsedItem {
            id: entry.id,
            feed_id,
            feed_title,
            title: entry.title,
            url,
            author: entry.author,
            content_html: entry.content.map(|c| c.content),
            summary: entry.summary.map(|c| c.content),
            published: entry.published.or(entry.crawled).and_then(from_millis),
            updated: entry.updated.and_then(from_millis),
            unread: entry.unread,
            starred,
        }
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
