use std::collections::HashMap;
use std::fmt;

use crate::reddit::PostComments;

/// Stable identity of a thread across searches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub community: String,
    pub id: String,
}

impl ThreadKey {
    pub fn new(community: &str, id: &str) -> Self {
        Self {
            community: community.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r/{}/{}", self.community, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedThread {
    pub thread: PostComments,
    pub official: bool,
}

/// Downloaded threads for the video currently on screen. There is no
/// eviction; the whole cache is dropped when the video changes.
#[derive(Debug, Default)]
pub struct ThreadCache {
    video_id: Option<String>,
    entries: HashMap<ThreadKey, CachedThread>,
}

impl ThreadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ThreadKey) -> Option<&CachedThread> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ThreadKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `payload`, replacing whatever was cached for `key`.
    pub fn put(&mut self, key: ThreadKey, payload: CachedThread) {
        self.entries.insert(key, payload);
    }

    /// Stores `payload` unless `key` is already cached, and returns the cached
    /// entry either way.
    pub fn insert_if_absent(&mut self, key: ThreadKey, payload: CachedThread) -> &CachedThread {
        self.entries.entry(key).or_insert(payload)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Binds the cache to `video_id`, dropping every entry if it was filled
    /// for a different video. Returns true when entries were discarded.
    pub fn reset_for_video(&mut self, video_id: &str) -> bool {
        if self.video_id.as_deref() == Some(video_id) {
            return false;
        }
        self.video_id = Some(video_id.to_string());
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        had_entries
    }
}
