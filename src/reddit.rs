use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.reddit.com/";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("reddit: unauthorized")]
    Unauthorized,
    #[error("reddit: forbidden")]
    Forbidden,
    #[error("reddit: rate limited: {0}")]
    RateLimited(String),
    #[error("reddit: api error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reddit: malformed response: {0}")]
    MalformedResponse(&'static str),
    #[error("reddit: listing empty")]
    EmptyListing,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            base_url: None,
            timeout: Duration::from_secs(20),
            http_client: None,
        }
    }
}

/// Comment ordering requested when downloading a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[default]
    Confidence,
    Top,
    New,
    Controversial,
    Old,
    Qa,
}

impl CommentSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSort::Confidence => "confidence",
            CommentSort::Top => "top",
            CommentSort::New => "new",
            CommentSort::Controversial => "controversial",
            CommentSort::Old => "old",
            CommentSort::Qa => "qa",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "confidence" | "best" => Some(CommentSort::Confidence),
            "top" => Some(CommentSort::Top),
            "new" => Some(CommentSort::New),
            "controversial" => Some(CommentSort::Controversial),
            "old" => Some(CommentSort::Old),
            "qa" => Some(CommentSort::Qa),
            _ => None,
        }
    }
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    rate: RwLock<RateLimit>,
}

#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub used: f64,
    pub remaining: f64,
    pub reset_at: Option<SystemTime>,
}

/// Search terms that match both full and shortened links to a video.
pub fn video_search_query(video_id: &str) -> String {
    format!(
        "(url:3D{id} OR url:{id}) (site:youtube.com OR site:youtu.be)",
        id = video_id
    )
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            anyhow::bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).with_context(|| format!("reddit: parse base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            rate: RwLock::new(RateLimit::default()),
        })
    }

    pub fn rate_limit(&self) -> RateLimit {
        self.rate.read().clone()
    }

    pub fn search_url(&self, video_id: &str) -> Result<Url> {
        let mut url = self.base_url.join("search.json")?;
        url.query_pairs_mut()
            .append_pair("q", &video_search_query(video_id));
        Ok(url)
    }

    pub fn thread_url(&self, subreddit: &str, article: &str, sort: CommentSort) -> Result<Url> {
        let base = subreddit.trim_start_matches("r/");
        let mut url = self
            .base_url
            .join(&format!("r/{}/comments/{}.json", base, article))?;
        url.query_pairs_mut().append_pair("sort", sort.as_str());
        Ok(url)
    }

    /// Runs the video search and returns the raw, unvalidated posts.
    pub fn search_video(&self, video_id: &str) -> Result<Vec<Post>> {
        let url = self.search_url(video_id)?;
        let resp = self.get(url)?;
        let payload: Value = resp.json().context("reddit: decode search response")?;
        decode_search_listing(payload)
    }

    pub fn comments(&self, subreddit: &str, article: &str, sort: CommentSort) -> Result<PostComments> {
        let url = self.thread_url(subreddit, article, sort)?;
        let resp = self.get(url)?;
        let payload: Value = resp.json().context("reddit: decode thread response")?;
        decode_thread(payload)
    }

    fn get(&self, url: Url) -> Result<Response> {
        debug!(%url, "reddit request");
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json")
            .send()?;
        self.capture_rate(resp.headers());
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let err = match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            429 => ApiError::RateLimited(body),
            code => ApiError::Status { status: code, body },
        };
        Err(err.into())
    }

    fn capture_rate(&self, headers: &HeaderMap) {
        let remaining = header_float(headers, "x-ratelimit-remaining");
        let used = header_float(headers, "x-ratelimit-used");
        let reset = header_float(headers, "x-ratelimit-reset");
        if remaining == 0.0 && used == 0.0 && reset == 0.0 {
            return;
        }
        let reset_at = SystemTime::now().checked_add(Duration::from_secs_f64(reset.max(0.0)));
        let mut rate = self.rate.write();
        rate.remaining = remaining;
        rate.used = used;
        rate.reset_at = reset_at;
    }
}

fn header_float(headers: &HeaderMap, key: &str) -> f64 {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Unwraps a search listing. Anything that is not a non-empty `Listing` of
/// posts is reported as an [`ApiError`]; a single bad result fails the whole
/// listing.
pub fn decode_search_listing(payload: Value) -> Result<Vec<Post>> {
    let envelope: ListingEnvelope<Value> = serde_json::from_value(payload)
        .map_err(|_| ApiError::MalformedResponse("search payload is not a listing"))?;
    if envelope.kind != "Listing" {
        return Err(ApiError::MalformedResponse("search payload kind is not Listing").into());
    }
    if envelope.data.children.is_empty() {
        return Err(ApiError::EmptyListing.into());
    }
    envelope
        .data
        .children
        .into_iter()
        .map(|thing| {
            serde_json::from_value::<Post>(thing.data)
                .map_err(|_| anyhow::Error::from(ApiError::MalformedResponse("search result is not a post")))
        })
        .collect()
}

pub fn decode_thread(payload: Value) -> Result<PostComments> {
    let Value::Array(mut parts) = payload else {
        return Err(ApiError::MalformedResponse("thread payload is not an array").into());
    };
    if parts.len() < 2 {
        return Err(ApiError::MalformedResponse("thread payload missing elements").into());
    }
    let comments_value = parts.swap_remove(1);
    let post_value = parts.swap_remove(0);
    let post_listing: ListingEnvelope<Post> =
        serde_json::from_value(post_value).context("reddit: decode post listing")?;
    let comments_listing: ListingEnvelope<Comment> =
        serde_json::from_value(comments_value).context("reddit: decode comment listing")?;
    let post = post_listing
        .data
        .children
        .into_iter()
        .next()
        .map(|thing| thing.data)
        .ok_or(ApiError::EmptyListing)?;
    Ok(PostComments {
        post,
        comments: comments_listing.data,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing<T> {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

/// A link submission as returned by search. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub archived: bool,
}

impl Post {
    /// Reddit archives posts once they pass the retention window; archived
    /// posts accept no new comments.
    pub fn is_preserved_post(&self) -> bool {
        self.archived
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub replies: Option<Box<Listing<Comment>>>,
}

impl<'de> Deserialize<'de> for Comment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CommentHelper {
            id: String,
            #[serde(default)]
            name: String,
            #[serde(default)]
            body: String,
            #[serde(default)]
            author: String,
            #[serde(default)]
            score: i64,
            #[serde(default)]
            depth: i64,
            #[serde(default)]
            created_utc: f64,
            #[serde(default)]
            replies: serde_json::Value,
        }

        let helper = CommentHelper::deserialize(deserializer)?;
        // Leaf comments carry `"replies": ""` instead of null.
        let replies = if helper.replies.is_null() || helper.replies == "" {
            None
        } else {
            serde_json::from_value::<ListingEnvelope<Comment>>(helper.replies)
                .ok()
                .map(|listing| Box::new(listing.data))
        };
        Ok(Comment {
            id: helper.id,
            name: helper.name,
            body: helper.body,
            author: helper.author,
            score: helper.score,
            depth: helper.depth,
            created_utc: helper.created_utc,
            replies,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostComments {
    pub post: Post,
    pub comments: Listing<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingEnvelope<T> {
    kind: String,
    data: Listing<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> Client {
        Client::new(ClientConfig {
            user_agent: "vidthreads-test/0.1".into(),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_blank_user_agent() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }

    #[test]
    fn search_url_encodes_query() {
        let url = client().search_url("dQw4w9WgXcQ").unwrap();
        assert_eq!(url.path(), "/search.json");
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "q");
        assert_eq!(
            value,
            "(url:3DdQw4w9WgXcQ OR url:dQw4w9WgXcQ) (site:youtube.com OR site:youtu.be)"
        );
    }

    #[test]
    fn thread_url_includes_sort() {
        let url = client()
            .thread_url("r/videos", "abc123", CommentSort::Top)
            .unwrap();
        assert_eq!(url.path(), "/r/videos/comments/abc123.json");
        assert_eq!(url.query(), Some("sort=top"));
    }

    #[test]
    fn search_listing_requires_listing_kind() {
        let err = decode_search_listing(json!({"kind": "t3", "data": {"children": []}}))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::MalformedResponse(_))
        ));

        let err = decode_search_listing(json!({})).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn empty_search_listing_is_reported() {
        let err = decode_search_listing(json!({"kind": "Listing", "data": {"children": []}}))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::EmptyListing)));
    }

    #[test]
    fn search_listing_decodes_posts() {
        let payload = json!({
            "kind": "Listing",
            "data": {
                "children": [
                    {"kind": "t3", "data": {"id": "a1", "subreddit": "videos", "score": 12, "archived": true}},
                    {"kind": "t3", "data": {"id": "b2", "subreddit": "music"}}
                ]
            }
        });
        let posts = decode_search_listing(payload).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "a1");
        assert!(posts[0].is_preserved_post());
    }

    #[test]
    fn one_undecodable_result_fails_the_listing() {
        let payload = json!({
            "kind": "Listing",
            "data": {
                "children": [
                    {"kind": "t3", "data": {"id": "a1", "subreddit": "videos", "score": 12}},
                    {"kind": "t3", "data": {"subreddit": 42}}
                ]
            }
        });
        let err = decode_search_listing(payload).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn decodes_thread_with_empty_replies() {
        let payload = json!([
            {"kind": "Listing", "data": {"children": [
                {"kind": "t3", "data": {"id": "p1", "subreddit": "music", "num_comments": 1}}
            ]}},
            {"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {"id": "c1", "name": "t1_c1", "body": "hi", "replies": ""}}
            ]}}
        ]);
        let thread = decode_thread(payload).unwrap();
        assert_eq!(thread.post.id, "p1");
        assert_eq!(thread.comments.children.len(), 1);
        assert!(thread.comments.children[0].data.replies.is_none());
    }

    #[test]
    fn thread_payload_must_be_array() {
        assert!(decode_thread(json!({"kind": "Listing"})).is_err());
        assert!(decode_thread(json!([])).is_err());
    }
}
