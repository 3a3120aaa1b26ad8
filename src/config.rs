use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::DEFAULT_CONTAINER_GUTTER_PX;
use crate::reddit::CommentSort;
use crate::selector::SelectionRules;

const DEFAULT_ENV_PREFIX: &str = "VIDTHREADS";

/// Communities that are never shown regardless of user settings. These only
/// repost links automatically and never carry discussion.
pub const ENFORCED_EXCLUDED_SUBREDDITS: &[&str] = &["autotldr", "youtubebot", "linkmirror"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            base_url: None,
            timeout: default_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    format!("vidthreads/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

/// Whether the Reddit threads or the site's own comments are shown first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayAction {
    #[default]
    Threads,
    Native,
}

impl DisplayAction {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "threads" | "reddit" => Some(DisplayAction::Threads),
            "native" => Some(DisplayAction::Native),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(default)]
    pub excluded_subreddits: Vec<String>,
    #[serde(default = "default_hidden_post_score_threshold")]
    pub hidden_post_score_threshold: i64,
    #[serde(default)]
    pub thread_sort: CommentSort,
    #[serde(default)]
    pub default_display_action: DisplayAction,
    #[serde(default)]
    pub channel_display_actions: HashMap<String, DisplayAction>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            excluded_subreddits: Vec::new(),
            hidden_post_score_threshold: default_hidden_post_score_threshold(),
            thread_sort: CommentSort::default(),
            default_display_action: DisplayAction::default(),
            channel_display_actions: HashMap::new(),
        }
    }
}

fn default_hidden_post_score_threshold() -> i64 {
    -4
}

impl Preferences {
    /// Built-in and user exclusions, lowercased.
    pub fn excluded_communities(&self) -> HashSet<String> {
        ENFORCED_EXCLUDED_SUBREDDITS
            .iter()
            .map(|name| name.to_string())
            .chain(self.excluded_subreddits.iter().cloned())
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn selection_rules(&self) -> SelectionRules {
        SelectionRules::new(self.excluded_communities(), self.hidden_post_score_threshold)
    }

    pub fn display_action_for_channel(&self, channel_id: &str) -> DisplayAction {
        self.channel_display_actions
            .get(channel_id)
            .copied()
            .unwrap_or(self.default_display_action)
    }

    pub fn set_channel_display_action(&mut self, channel_id: &str, action: DisplayAction) {
        self.channel_display_actions
            .insert(channel_id.to_string(), action);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_container_gutter")]
    pub container_gutter_px: i64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            container_gutter_px: default_container_gutter(),
        }
    }
}

fn default_container_gutter() -> i64 {
    DEFAULT_CONTAINER_GUTTER_PX
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = read_config_file(&default_path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reddit.user_agent" => {
            if !value.trim().is_empty() {
                cfg.reddit.user_agent = value;
            }
        }
        "reddit.base_url" => cfg.reddit.base_url = Some(value),
        "reddit.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.reddit.timeout = duration;
            }
        }
        "preferences.excluded_subreddits" => {
            cfg.preferences.excluded_subreddits = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "preferences.hidden_post_score_threshold" => {
            if let Ok(parsed) = value.parse::<i64>() {
                cfg.preferences.hidden_post_score_threshold = parsed;
            }
        }
        "preferences.thread_sort" => {
            if let Some(sort) = CommentSort::from_key(&value) {
                cfg.preferences.thread_sort = sort;
            }
        }
        "preferences.default_display_action" => {
            if let Some(action) = DisplayAction::from_key(&value) {
                cfg.preferences.default_display_action = action;
            }
        }
        "layout.container_gutter_px" => {
            if let Ok(parsed) = value.parse::<i64>() {
                cfg.layout.container_gutter_px = parsed;
            }
        }
        _ => {}
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vidthreads").join("config.yaml"))
}

/// Persists a per-channel display override, keeping the rest of the file.
pub fn save_channel_display_action(
    path: Option<PathBuf>,
    channel_id: &str,
    action: DisplayAction,
) -> Result<PathBuf> {
    let channel_id = channel_id.trim();
    anyhow::ensure!(!channel_id.is_empty(), "config: channel id is required");

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };
    cfg.preferences.set_channel_display_action(channel_id, action);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("VIDTHREADS_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.preferences.hidden_post_score_threshold, -4);
        assert_eq!(cfg.preferences.thread_sort, CommentSort::Confidence);
        assert_eq!(cfg.layout.container_gutter_px, 80);
        assert_eq!(cfg.reddit.timeout, Duration::from_secs(20));
    }

    #[test]
    fn reads_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "preferences:\n  excluded_subreddits: [Funny]\n  hidden_post_score_threshold: 2\n  thread_sort: top\nreddit:\n  timeout: 5s\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("VIDTHREADS_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.preferences.hidden_post_score_threshold, 2);
        assert_eq!(cfg.preferences.thread_sort, CommentSort::Top);
        assert_eq!(cfg.reddit.timeout, Duration::from_secs(5));
        assert!(cfg.preferences.excluded_communities().contains("funny"));
        assert!(cfg.preferences.excluded_communities().contains("autotldr"));
    }

    #[test]
    fn env_overrides() {
        env::set_var("VIDTHREADS_TEST_ENV_PREFERENCES__HIDDEN_POST_SCORE_THRESHOLD", "10");
        env::set_var("VIDTHREADS_TEST_ENV_PREFERENCES__THREAD_SORT", "new");
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("VIDTHREADS_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.preferences.hidden_post_score_threshold, 10);
        assert_eq!(cfg.preferences.thread_sort, CommentSort::New);
        env::remove_var("VIDTHREADS_TEST_ENV_PREFERENCES__HIDDEN_POST_SCORE_THRESHOLD");
        env::remove_var("VIDTHREADS_TEST_ENV_PREFERENCES__THREAD_SORT");
    }

    #[test]
    fn channel_display_action_falls_back_to_default() {
        let mut prefs = Preferences::default();
        assert_eq!(prefs.display_action_for_channel("UC123"), DisplayAction::Threads);
        prefs.set_channel_display_action("UC123", DisplayAction::Native);
        assert_eq!(prefs.display_action_for_channel("UC123"), DisplayAction::Native);
        assert_eq!(prefs.display_action_for_channel("UC999"), DisplayAction::Threads);
    }

    #[test]
    fn save_channel_action_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        save_channel_display_action(Some(path.clone()), "UC123", DisplayAction::Native).unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(
            saved.preferences.display_action_for_channel("UC123"),
            DisplayAction::Native
        );
        assert!(save_channel_display_action(Some(path), "  ", DisplayAction::Native).is_err());
    }

    #[test]
    fn selection_rules_use_threshold() {
        let prefs = Preferences {
            hidden_post_score_threshold: 3,
            excluded_subreddits: vec!["Music".into()],
            ..Preferences::default()
        };
        let rules = prefs.selection_rules();
        assert_eq!(rules.min_score, 3);
        assert!(rules.excluded.contains("music"));
    }
}
