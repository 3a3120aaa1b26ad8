//! Fits the ordered community tabs into the width of the comment section.
//!
//! Widths come from a fixed model of the tab chrome rather than measured
//! text, so the same collection always produces the same split.

/// Padding and border of a single tab.
pub const TAB_CHROME_PX: i64 = 21;
/// Width of one character of a community name.
pub const CHAR_PX: i64 = 7;
/// Space reserved next to the tabs for the overflow button.
pub const DEFAULT_CONTAINER_GUTTER_PX: i64 = 80;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabLayout {
    pub visible: Vec<usize>,
    pub overflow: Vec<usize>,
    pub active: usize,
}

impl TabLayout {
    pub fn has_overflow(&self) -> bool {
        !self.overflow.is_empty()
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.visible.contains(&index)
    }

    /// Collection index of the `position`th overflow entry.
    pub fn overflow_index(&self, position: usize) -> Option<usize> {
        self.overflow.get(position).copied()
    }
}

pub fn tab_width(community: &str) -> i64 {
    TAB_CHROME_PX + CHAR_PX * community.chars().count() as i64
}

pub fn available_width_for(container_width: i64, gutter: i64) -> i64 {
    container_width - gutter
}

/// Greedy single pass: tabs stay visible until the running width reaches the
/// available width; that tab and everything after it overflows. The running
/// width starts at the first tab's width, so the first tab is counted twice.
/// The first tab is always visible so the active thread keeps a tab.
pub fn layout<S: AsRef<str>>(communities: &[S], available_width: i64, active: usize) -> TabLayout {
    let Some(first) = communities.first() else {
        return TabLayout {
            active,
            ..TabLayout::default()
        };
    };

    let mut width = tab_width(first.as_ref());
    let mut cut = communities.len();
    for (index, community) in communities.iter().enumerate() {
        width += tab_width(community.as_ref());
        if index > 0 && width >= available_width {
            cut = index;
            break;
        }
    }

    TabLayout {
        visible: (0..cut).collect(),
        overflow: (cut..communities.len()).collect(),
        active,
    }
}

/// Collapses bursts of resize notifications into one layout pass per frame.
#[derive(Debug, Default)]
pub struct FrameCoalescer {
    pending: Option<i64>,
}

impl FrameCoalescer {
    /// Records a new container width. Returns true when this is the first
    /// request since the last frame, meaning a frame tick must be scheduled.
    pub fn request(&mut self, container_width: i64) -> bool {
        let schedule = self.pending.is_none();
        self.pending = Some(container_width);
        schedule
    }

    /// Called on the frame tick; yields the latest width if anything changed.
    pub fn take_frame(&mut self) -> Option<i64> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
