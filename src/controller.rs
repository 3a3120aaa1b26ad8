use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::cache::{CachedThread, ThreadCache, ThreadKey};
use crate::config::Preferences;
use crate::data::{SearchService, ThreadService};
use crate::layout::{self, available_width_for, FrameCoalescer, TabLayout, DEFAULT_CONTAINER_GUTTER_PX};
use crate::reddit::{ApiError, Post, PostComments};
use crate::selector::{self, PreferredHint, ThreadCollection};
use crate::view::{LoadingStage, SectionView};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionState {
    Idle,
    Loading(LoadingStage),
    Populated,
    NoResults,
    TabPopulated(ThreadKey),
}

pub struct Options {
    pub search_service: Arc<dyn SearchService>,
    pub thread_service: Arc<dyn ThreadService>,
    pub preferences: Preferences,
    pub container_width: i64,
    pub container_gutter: i64,
}

impl Options {
    pub fn new(
        search_service: Arc<dyn SearchService>,
        thread_service: Arc<dyn ThreadService>,
        preferences: Preferences,
    ) -> Self {
        Self {
            search_service,
            thread_service,
            preferences,
            container_width: 640,
            container_gutter: DEFAULT_CONTAINER_GUTTER_PX,
        }
    }
}

struct PendingSearch {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

struct PendingThread {
    request_id: u64,
    key: ThreadKey,
    official: bool,
}

enum AsyncResponse {
    Search {
        request_id: u64,
        generation: u64,
        result: Result<Vec<Post>>,
    },
    Thread {
        request_id: u64,
        generation: u64,
        key: ThreadKey,
        official: bool,
        result: Result<PostComments>,
    },
}

/// Drives the Reddit comment section for one page. All state lives on the
/// caller's thread; network calls run on worker threads and report back
/// through a channel drained by [`CommentSection::poll`] or
/// [`CommentSection::settle`].
pub struct CommentSection<V: SectionView> {
    search_service: Arc<dyn SearchService>,
    thread_service: Arc<dyn ThreadService>,
    preferences: Preferences,
    view: V,
    video_id: Option<String>,
    hint: PreferredHint,
    threads: ThreadCollection,
    layout: TabLayout,
    cache: ThreadCache,
    state: SectionState,
    container_width: i64,
    container_gutter: i64,
    frames: FrameCoalescer,
    clock: fn() -> i64,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    // Bumped for every new video; responses from older generations are stale.
    generation: u64,
    // Shared by every request of the current generation.
    cancel_flag: Arc<AtomicBool>,
    pending_search: Option<PendingSearch>,
    pending_thread: Option<PendingThread>,
    render_failed: bool,
}

fn system_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// Only the first failed write is logged; the section keeps running.
fn note_render(failed: &mut bool, result: io::Result<()>) {
    if let Err(err) = result {
        if !*failed {
            warn!(error = %err, "failed to render comment section");
        }
        *failed = true;
    }
}

impl<V: SectionView> CommentSection<V> {
    pub fn new(options: Options, view: V) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            search_service: options.search_service,
            thread_service: options.thread_service,
            preferences: options.preferences,
            view,
            video_id: None,
            hint: PreferredHint::default(),
            threads: ThreadCollection::default(),
            layout: TabLayout::default(),
            cache: ThreadCache::new(),
            state: SectionState::Idle,
            container_width: options.container_width,
            container_gutter: options.container_gutter,
            frames: FrameCoalescer::default(),
            clock: system_now,
            response_tx,
            response_rx,
            next_request_id: 0,
            generation: 0,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            pending_search: None,
            pending_thread: None,
            render_failed: false,
        }
    }

    /// Replaces the wall clock used for ranking.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &SectionState {
        &self.state
    }

    pub fn threads(&self) -> &ThreadCollection {
        &self.threads
    }

    pub fn layout(&self) -> &TabLayout {
        &self.layout
    }

    pub fn active_index(&self) -> usize {
        self.layout.active
    }

    pub fn cache(&self) -> &ThreadCache {
        &self.cache
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn is_busy(&self) -> bool {
        self.pending_search.is_some() || self.pending_thread.is_some()
    }

    /// Starts over for a new video: in-flight requests are abandoned and the
    /// thread cache is emptied.
    pub fn load_video(&mut self, video_id: &str, hint: PreferredHint) {
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.cancel_flag = Arc::new(AtomicBool::new(false));
        self.generation = self.generation.wrapping_add(1);
        self.pending_search = None;
        self.pending_thread = None;

        if self.cache.reset_for_video(video_id) {
            debug!(video_id, "discarded cached threads from previous video");
        }
        self.video_id = Some(video_id.to_string());
        self.hint = hint;
        self.threads = ThreadCollection::default();
        self.layout = TabLayout::default();

        let stage = LoadingStage::Search {
            video_id: video_id.to_string(),
        };
        note_render(&mut self.render_failed, self.view.loading(&stage));
        self.state = SectionState::Loading(stage);

        let request_id = self.next_request_id();
        let cancel_flag = self.cancel_flag.clone();
        self.pending_search = Some(PendingSearch {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });

        let tx = self.response_tx.clone();
        let service = self.search_service.clone();
        let generation = self.generation;
        let video_id = video_id.to_string();
        info!(%video_id, "searching for discussions");
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.search_video(&video_id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Search {
                request_id,
                generation,
                result,
            });
        });
    }

    /// Applies every response that has arrived so far. Returns true when
    /// anything was handled.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    /// Blocks until no request is outstanding or `timeout` elapses. Returns
    /// false on timeout.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.response_rx.recv_timeout(remaining) {
                Ok(message) => self.handle_async_response(message),
                Err(_) => return false,
            }
        }
        true
    }

    /// A click on a visible tab. Returns false when the click is ignored.
    pub fn select_tab(&mut self, index: usize) -> bool {
        if !self.layout.is_visible(index) {
            return false;
        }
        let retry = matches!(self.state, SectionState::NoResults);
        if index == self.layout.active && !retry {
            return false;
        }
        self.layout.active = index;
        note_render(&mut self.render_failed, self.view.tabs(&self.threads, &self.layout));
        self.show_tab(index);
        true
    }

    /// A click on the `position`th overflow entry: the thread moves to the
    /// front and becomes the active tab.
    pub fn select_overflow(&mut self, position: usize) -> bool {
        let Some(index) = self.layout.overflow_index(position) else {
            return false;
        };
        if !self.threads.promote(index) {
            return false;
        }
        self.relayout(0);
        self.show_tab(0);
        true
    }

    /// Records a container resize. Layout is recomputed on the next
    /// [`CommentSection::on_frame`]. Returns true when a frame tick needs to
    /// be scheduled.
    pub fn resize(&mut self, container_width: i64) -> bool {
        self.frames.request(container_width)
    }

    pub fn on_frame(&mut self) -> bool {
        let Some(width) = self.frames.take_frame() else {
            return false;
        };
        self.container_width = width;
        if self.threads.is_empty() {
            return false;
        }
        let active = self.layout.active;
        self.relayout(active);
        true
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn relayout(&mut self, active: usize) {
        let available = available_width_for(self.container_width, self.container_gutter);
        let communities = self.threads.communities();
        self.layout = layout::layout(communities.as_slice(), available, active);
        debug!(
            available,
            visible = self.layout.visible.len(),
            overflow = self.layout.overflow.len(),
            "laid out tabs"
        );
        note_render(&mut self.render_failed, self.view.tabs(&self.threads, &self.layout));
    }

    fn show_no_results(&mut self) {
        self.state = SectionState::NoResults;
        note_render(&mut self.render_failed, self.view.no_results());
    }

    fn show_tab(&mut self, index: usize) {
        let Some(thread) = self.threads.get(index) else {
            return;
        };
        let key = thread.key();
        let official = thread.official;

        if let Some(cached) = self.cache.get(&key) {
            debug!(%key, "thread served from cache");
            if cached.official != official {
                let mut updated = cached.clone();
                updated.official = official;
                self.cache.put(key.clone(), updated);
            }
            self.pending_thread = None;
            if let Some(cached) = self.cache.get(&key) {
                note_render(&mut self.render_failed, self.view.thread(cached));
            }
            self.state = SectionState::TabPopulated(key);
            return;
        }

        self.download_thread(key, official);
    }

    fn download_thread(&mut self, key: ThreadKey, official: bool) {
        let stage = LoadingStage::Thread { key: key.clone() };
        note_render(&mut self.render_failed, self.view.loading(&stage));
        self.state = SectionState::Loading(stage);

        let request_id = self.next_request_id();
        self.pending_thread = Some(PendingThread {
            request_id,
            key: key.clone(),
            official,
        });

        let tx = self.response_tx.clone();
        let service = self.thread_service.clone();
        let cancel_flag = self.cancel_flag.clone();
        let generation = self.generation;
        let sort = self.preferences.thread_sort;
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.load_thread(&key.community, &key.id, sort);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Thread {
                request_id,
                generation,
                key,
                official,
                result,
            });
        });
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Search {
                request_id,
                generation,
                result,
            } => {
                let Some(pending) = &self.pending_search else {
                    debug!(request_id, "dropping unexpected search response");
                    return;
                };
                if generation != self.generation
                    || pending.request_id != request_id
                    || pending.cancel_flag.load(Ordering::SeqCst)
                {
                    debug!(request_id, "dropping stale search response");
                    return;
                }
                self.pending_search = None;

                match result {
                    Ok(posts) => self.apply_search_results(&posts),
                    Err(err) => {
                        match err.downcast_ref::<ApiError>() {
                            Some(ApiError::EmptyListing) => {
                                info!("search returned an empty listing")
                            }
                            Some(ApiError::MalformedResponse(reason)) => {
                                warn!(reason = *reason, "search returned a malformed response")
                            }
                            _ => warn!(error = ?err, "search request failed"),
                        }
                        self.show_no_results();
                    }
                }
            }
            AsyncResponse::Thread {
                request_id,
                generation,
                key,
                official,
                result,
            } => {
                if generation != self.generation {
                    debug!(%key, "dropping thread from a previous video");
                    return;
                }
                let current = self
                    .pending_thread
                    .as_ref()
                    .is_some_and(|pending| pending.request_id == request_id && pending.key == key);

                match result {
                    Ok(thread) => {
                        let payload = CachedThread { thread, official };
                        let cached = self.cache.insert_if_absent(key.clone(), payload);
                        if !current {
                            debug!(%key, "cached thread for a tab that is no longer selected");
                            return;
                        }
                        let official = self
                            .pending_thread
                            .take()
                            .map(|pending| pending.official)
                            .unwrap_or(official);
                        if cached.official != official {
                            let mut updated = cached.clone();
                            updated.official = official;
                            self.cache.put(key.clone(), updated);
                        }
                        if let Some(cached) = self.cache.get(&key) {
                            note_render(&mut self.render_failed, self.view.thread(cached));
                        }
                        self.state = SectionState::TabPopulated(key);
                    }
                    Err(err) => {
                        if !current {
                            return;
                        }
                        self.pending_thread = None;
                        warn!(%key, error = ?err, "thread download failed");
                        self.show_no_results();
                    }
                }
            }
        }
    }

    fn apply_search_results(&mut self, posts: &[Post]) {
        let Some(video_id) = self.video_id.clone() else {
            return;
        };
        let rules = self.preferences.selection_rules();
        let now = (self.clock)();
        self.threads = selector::select(posts, &video_id, &rules, &self.hint, now);
        if self.threads.is_empty() {
            info!(%video_id, results = posts.len(), "no matching threads");
            self.show_no_results();
            return;
        }
        info!(%video_id, threads = self.threads.len(), "found discussions");
        self.state = SectionState::Populated;
        self.relayout(0);
        self.show_tab(0);
    }
}
