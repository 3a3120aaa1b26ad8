use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::config::{self, DisplayAction};
use crate::controller::{self, CommentSection, SectionState};
use crate::data::{RedditSearchService, RedditThreadService};
use crate::hints;
use crate::reddit::{self, CommentSort};
use crate::view::TextView;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Bare video id or a YouTube link.
    pub video: String,
    pub container_width: Option<i64>,
    /// Links found next to the video; the first Reddit link becomes the hint.
    pub hint_links: Vec<String>,
    pub sort: Option<CommentSort>,
    pub config_file: Option<PathBuf>,
    pub channel: Option<String>,
    pub remember: Option<DisplayAction>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let video_id = hints::video_id_from_url(&options.video)
        .with_context(|| format!("not a YouTube video id or link: {}", options.video))?;

    let mut cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    if let Some(sort) = options.sort {
        cfg.preferences.thread_sort = sort;
    }

    if let Some(channel) = options.channel.as_deref() {
        if let Some(action) = options.remember {
            let path =
                config::save_channel_display_action(options.config_file.clone(), channel, action)
                    .context("save display action")?;
            cfg.preferences.set_channel_display_action(channel, action);
            info!(channel, path = %path.display(), "saved display action");
        }
        if cfg.preferences.display_action_for_channel(channel) == DisplayAction::Native {
            println!("Channel {channel} shows its own comments; skipping Reddit.");
            return Ok(());
        }
    }

    let client = reddit::Client::new(reddit::ClientConfig {
        user_agent: cfg.reddit.user_agent.clone(),
        base_url: cfg.reddit.base_url.clone(),
        timeout: cfg.reddit.timeout,
        http_client: None,
    })
    .context("create reddit client")?;
    let client = Arc::new(client);

    let mut section_options = controller::Options::new(
        Arc::new(RedditSearchService::new(client.clone())),
        Arc::new(RedditThreadService::new(client.clone())),
        cfg.preferences.clone(),
    );
    section_options.container_gutter = cfg.layout.container_gutter_px;
    if let Some(width) = options.container_width {
        section_options.container_width = width;
    }

    let view = TextView::new(io::stdout().lock());
    let mut section = CommentSection::new(section_options, view);
    section.load_video(&video_id, hints::scan_links(&options.hint_links));

    // Search and the first thread each get one request timeout.
    if !section.settle(cfg.reddit.timeout.saturating_mul(2)) {
        bail!("timed out waiting for Reddit");
    }

    let rate = client.rate_limit();
    let reset_in = rate
        .reset_at
        .and_then(|at| at.duration_since(SystemTime::now()).ok())
        .map(|left| humantime::format_duration(left).to_string());
    debug!(
        used = rate.used,
        remaining = rate.remaining,
        reset_in = ?reset_in,
        "reddit rate limit"
    );
    if let SectionState::TabPopulated(key) = section.state() {
        info!(%key, threads = section.threads().len(), "showing thread");
    }
    Ok(())
}
