
use crate::types::{GroupedItems, ParsedItem};
use chrono::{TimeZone, Utc};

/// Item of `feed` with a fixed publication time derived from `n`
pub(super) fn item(id: &str, feed: &str, n: i64) -> ParsedItem {
    ParsedItem {
        id: id.to_string(),
        feed_id: Some(feed.to_string()),
        feed_title: Some(format!("Feed {feed}")),
        title: Some(format!("Article {id}")),
        url: Some(format!("https://example.com/{id}")),
        author: Some("Jane".to_string()),
        content_html: Some(format!("<p>{id}</p>")),
        summary: None,
        published: Utc.timestamp_opt(1_700_000_000 + n * 60, 0).single(),
        updated: None,
        unread: true,
        starred: false,
    }
}

pub(super) fn grouped(items: Vec<ParsedItem>) -> GroupedItems {
    let mut grouped = GroupedItems::new();
    for item in items {
        let feed = item.feed_id.clone().unwrap();
        grouped.push(&feed, item);
    }
    grouped
}
