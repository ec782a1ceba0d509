//! Stream page fixtures and a mock stream server

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// User the fixture streams belong to
pub const TEST_USER: &str = "u-test";

/// Path of the stream contents endpoint
pub const CONTENTS_PATH: &str = "/v3/streams/contents";

/// Feeds the generated entries are spread over
pub const TEST_FEEDS: [&str; 3] = [
    "feed/https://alpha.example/rss",
    "feed/https://beta.example/atom",
    "feed/https://gamma.example/feed",
];

/// One stream entry in wire format
///
/// Entry `n` belongs to `TEST_FEEDS[n % 3]`; every fifth entry is read and every
/// seventh is starred.
pub fn entry(n: usize) -> Value {
    let feed = TEST_FEEDS[n % TEST_FEEDS.len()];
    let mut tags = Vec::new();
    if n % 7 == 0 {
        tags.push(json!({ "id": format!("user/{TEST_USER}/tag/global.saved") }));
    }

    json!({
        "id": format!("entry-{n:04}"),
        "title": format!("Entry {n}"),
        "author": "Test Author",
        "origin": { "streamId": feed, "title": format!("Feed {}", n % TEST_FEEDS.len()) },
        "alternate": [{ "href": format!("https://example.com/posts/{n}"), "type": "text/html" }],
        "content": { "content": format!("<p>Body of entry {n}</p>") },
        "published": 1_704_067_200_000_i64 + (n as i64) * 60_000,
        "unread": n % 5 != 0,
        "tags": tags,
    })
}

/// Entry without an origin, which cannot be attributed to a feed
pub fn orphan_entry(n: usize) -> Value {
    json!({
        "id": format!("orphan-{n:04}"),
        "title": format!("Orphan {n}"),
        "unread": true,
    })
}

/// Stream page body holding `entries`
pub fn page_body(stream_id: &str, entries: Vec<Value>, continuation: Option<&str>) -> Value {
    let mut body = json!({ "id": stream_id, "items": entries });
    if let Some(continuation) = continuation {
        body["continuation"] = json!(continuation);
    }
    body
}

/// Continuation token handed out after page `page`
pub fn continuation_for(page: usize) -> String {
    format!("cont-{}", page + 1)
}

/// Mount a paginated stream on `server`
///
/// `pages[i]` is the number of entries on page `i`; entry numbers run on across pages.
/// Every page except the last carries a continuation. Returns the total entry count.
pub async fn mount_stream(server: &MockServer, stream_id: &str, pages: &[usize]) -> usize {
    let mut next = 0;
    for (page, &count) in pages.iter().enumerate() {
        let entries: Vec<Value> = (next..next + count).map(entry).collect();
        next += count;

        let continuation = (page + 1 < pages.len()).then(|| continuation_for(page));
        let body = page_body(stream_id, entries, continuation.as_deref());

        let mock = Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .and(query_param("streamId", stream_id));
        let mock = if page == 0 {
            mock.and(query_param_is_missing("continuation"))
        } else {
            mock.and(query_param("continuation", continuation_for(page - 1)))
        };

        mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
    next
}

/// Mount a stream whose every request fails with `status`
pub async fn mount_failing_stream(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
