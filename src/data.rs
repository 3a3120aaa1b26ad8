use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;

use crate::reddit::{self, CommentSort, Listing, Post, PostComments};

pub trait SearchService: Send + Sync {
    fn search_video(&self, video_id: &str) -> Result<Vec<Post>>;
}

pub trait ThreadService: Send + Sync {
    fn load_thread(&self, subreddit: &str, article: &str, sort: CommentSort) -> Result<PostComments>;
}

pub struct RedditSearchService {
    client: Arc<reddit::Client>,
}

impl RedditSearchService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl SearchService for RedditSearchService {
    fn search_video(&self, video_id: &str) -> Result<Vec<Post>> {
        self.client
            .search_video(video_id)
            .context("search video threads")
    }
}

pub struct RedditThreadService {
    client: Arc<reddit::Client>,
}

impl RedditThreadService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl ThreadService for RedditThreadService {
    fn load_thread(&self, subreddit: &str, article: &str, sort: CommentSort) -> Result<PostComments> {
        self.client
            .comments(subreddit, article, sort)
            .context("fetch thread")
    }
}

/// Serves a fixed result list for every video.
#[derive(Default)]
pub struct MockSearchService {
    posts: Vec<Post>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockSearchService {
    pub fn new(posts: Vec<Post>) -> Self {
        Self {
            posts,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchService for MockSearchService {
    fn search_video(&self, _video_id: &str) -> Result<Vec<Post>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("mock: search unavailable"));
        }
        Ok(self.posts.clone())
    }
}

/// Builds an empty comment listing for any requested thread and counts
/// downloads per thread.
#[derive(Default)]
pub struct MockThreadService {
    downloads: Mutex<HashMap<String, usize>>,
    failing: Mutex<Vec<String>>,
}

impl MockThreadService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, article: &str) {
        self.failing.lock().push(article.to_string());
    }

    pub fn downloads(&self, article: &str) -> usize {
        self.downloads.lock().get(article).copied().unwrap_or(0)
    }

    pub fn total_downloads(&self) -> usize {
        self.downloads.lock().values().sum()
    }
}

impl ThreadService for MockThreadService {
    fn load_thread(&self, subreddit: &str, article: &str, _sort: CommentSort) -> Result<PostComments> {
        *self.downloads.lock().entry(article.to_string()).or_insert(0) += 1;
        if self.failing.lock().iter().any(|id| id == article) {
            return Err(anyhow!("mock: thread {article} unavailable"));
        }
        Ok(PostComments {
            post: Post {
                id: article.into(),
                name: format!("t3_{article}"),
                subreddit: subreddit.into(),
                title: format!("{subreddit} / {article}"),
                ..Post::default()
            },
            comments: Listing {
                after: None,
                before: None,
                children: vec![],
            },
        })
    }
}
