use std::io::{self, Write};

use crate::cache::{CachedThread, ThreadKey};
use crate::layout::TabLayout;
use crate::reddit::{Comment, Listing};
use crate::selector::ThreadCollection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingStage {
    Search { video_id: String },
    Thread { key: ThreadKey },
}

/// Receives render commands from the controller. Nothing flows back except
/// the selection events the host feeds into the controller and write errors,
/// which the controller logs.
pub trait SectionView {
    fn loading(&mut self, stage: &LoadingStage) -> io::Result<()>;
    fn no_results(&mut self) -> io::Result<()>;
    fn tabs(&mut self, collection: &ThreadCollection, layout: &TabLayout) -> io::Result<()>;
    fn thread(&mut self, payload: &CachedThread) -> io::Result<()>;
}

/// Writes a plain-text rendition of the section.
pub struct TextView<W: Write> {
    out: W,
    max_depth: usize,
}

impl<W: Write> TextView<W> {
    pub fn new(out: W) -> Self {
        Self { out, max_depth: 2 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_comments(&mut self, listing: &Listing<Comment>, depth: usize) -> io::Result<()> {
        if depth > self.max_depth {
            return Ok(());
        }
        let indent = "  ".repeat(depth);
        for thing in &listing.children {
            let comment = &thing.data;
            if comment.body.is_empty() {
                continue;
            }
            let first_line = comment.body.lines().next().unwrap_or_default();
            writeln!(
                self.out,
                "{indent}- {} ({}): {}",
                comment.author, comment.score, first_line
            )?;
            if let Some(replies) = &comment.replies {
                self.write_comments(replies, depth + 1)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> SectionView for TextView<W> {
    fn loading(&mut self, stage: &LoadingStage) -> io::Result<()> {
        match stage {
            LoadingStage::Search { video_id } => {
                writeln!(self.out, "Searching Reddit for {video_id}...")
            }
            LoadingStage::Thread { key } => writeln!(self.out, "Loading {key}..."),
        }
    }

    fn no_results(&mut self) -> io::Result<()> {
        writeln!(self.out, "No Reddit discussions found for this video.")
    }

    fn tabs(&mut self, collection: &ThreadCollection, layout: &TabLayout) -> io::Result<()> {
        let mut line = String::new();
        for &index in &layout.visible {
            let Some(thread) = collection.get(index) else {
                continue;
            };
            if index == layout.active {
                line.push_str(&format!("[*{}*] ", thread.community()));
            } else {
                line.push_str(&format!("[{}] ", thread.community()));
            }
        }
        if layout.has_overflow() {
            let hidden: Vec<&str> = layout
                .overflow
                .iter()
                .filter_map(|&index| collection.get(index))
                .map(|thread| thread.community())
                .collect();
            line.push_str(&format!("(+{}: {})", hidden.len(), hidden.join(", ")));
        }
        writeln!(self.out, "{}", line.trim_end())
    }

    fn thread(&mut self, payload: &CachedThread) -> io::Result<()> {
        let post = &payload.thread.post;
        let marker = if payload.official { " [official]" } else { "" };
        writeln!(
            self.out,
            "r/{} | {} ({} points, {} comments){}",
            post.subreddit, post.title, post.score, post.num_comments, marker
        )?;
        if !post.permalink.is_empty() {
            writeln!(self.out, "https://www.reddit.com{}", post.permalink)?;
        }
        self.write_comments(&payload.thread.comments, 0)
    }
}
