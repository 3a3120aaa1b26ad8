use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::cache::ThreadKey;
use crate::confidence::post_confidence;
use crate::reddit::Post;
use crate::validator;

/// Filters applied before grouping.
#[derive(Debug, Clone, Default)]
pub struct SelectionRules {
    /// Lowercased community names to drop.
    pub excluded: HashSet<String>,
    pub min_score: i64,
}

impl SelectionRules {
    pub fn new<I, S>(excluded: I, min_score: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: excluded
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
            min_score,
        }
    }

    fn admits(&self, post: &Post) -> bool {
        !self.excluded.contains(&post.subreddit.to_ascii_lowercase()) && post.score >= self.min_score
    }
}

/// Community and thread referenced from the page around the video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferredHint {
    pub community: Option<String>,
    pub thread_id: Option<String>,
}

impl PreferredHint {
    pub fn is_empty(&self) -> bool {
        self.community.is_none() && self.thread_id.is_none()
    }

    fn is_preferred_thread(&self, post: &Post) -> bool {
        self.thread_id.as_deref() == Some(post.id.as_str())
    }

    fn is_preferred_community(&self, post: &Post) -> bool {
        self.community
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(&post.subreddit))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub post: Post,
    pub confidence: f64,
    pub official: bool,
}

impl Thread {
    pub fn community(&self) -> &str {
        &self.post.subreddit
    }

    pub fn key(&self) -> ThreadKey {
        ThreadKey::new(&self.post.subreddit, &self.post.id)
    }
}

/// Threads shown as tabs, one per community, in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadCollection {
    threads: Vec<Thread>,
}

impl ThreadCollection {
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Thread> {
        self.threads.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    pub fn communities(&self) -> Vec<&str> {
        self.threads.iter().map(Thread::community).collect()
    }

    /// Moves the thread at `index` to the front. Returns false when the
    /// index is out of range.
    pub fn promote(&mut self, index: usize) -> bool {
        if index >= self.threads.len() {
            return false;
        }
        let thread = self.threads.remove(index);
        self.threads.insert(0, thread);
        true
    }
}

impl From<Vec<Thread>> for ThreadCollection {
    fn from(threads: Vec<Thread>) -> Self {
        Self { threads }
    }
}

pub fn select(
    raw: &[Post],
    video_id: &str,
    rules: &SelectionRules,
    hint: &PreferredHint,
    now: i64,
) -> ThreadCollection {
    let mut groups: BTreeMap<&str, Vec<Thread>> = BTreeMap::new();
    let mut rejected = 0usize;
    for post in raw {
        if !validator::validate(post, video_id) {
            rejected += 1;
            continue;
        }
        if !rules.admits(post) {
            continue;
        }
        groups.entry(post.subreddit.as_str()).or_default().push(Thread {
            post: post.clone(),
            confidence: post_confidence(post, now),
            official: false,
        });
    }
    debug!(
        total = raw.len(),
        rejected,
        communities = groups.len(),
        "grouped search results"
    );

    let mut threads: Vec<Thread> = groups
        .into_values()
        .filter_map(|group| representative(group, hint))
        .collect();

    threads.sort_by(|a, b| display_order(a, b, hint));

    if let Some(pos) = threads
        .iter()
        .position(|thread| hint.is_preferred_community(&thread.post))
    {
        let preferred = threads.remove(pos);
        threads.insert(0, preferred);
    }

    if let Some(first) = threads.first_mut() {
        if hint.is_preferred_thread(&first.post) || hint.is_preferred_community(&first.post) {
            first.official = true;
        }
    }

    ThreadCollection { threads }
}

fn representative(group: Vec<Thread>, hint: &PreferredHint) -> Option<Thread> {
    if let Some(preferred) = group
        .iter()
        .position(|thread| hint.is_preferred_thread(&thread.post))
    {
        return group.into_iter().nth(preferred);
    }
    group.into_iter().min_by(group_order)
}

/// Best thread first within a community.
fn group_order(a: &Thread, b: &Thread) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.post.num_comments.cmp(&a.post.num_comments))
        .then_with(|| a.post.id.cmp(&b.post.id))
}

fn display_order(a: &Thread, b: &Thread, hint: &PreferredHint) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| {
            hint.is_preferred_thread(&b.post)
                .cmp(&hint.is_preferred_thread(&a.post))
        })
        .then_with(|| a.post.subreddit.cmp(&b.post.subreddit))
}
