//! Picks up links to Reddit that sit next to the video (the description,
//! pinned comments) and turns the first one into a [`PreferredHint`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::selector::PreferredHint;

static THREAD_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://([^/]+)/r/([A-Za-z0-9][A-Za-z0-9_]{2,20})(?:/comments/)?([A-Za-z0-9]*)")
        .expect("thread link pattern is valid")
});

static HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("href pattern is valid"));

static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,}$").expect("video id pattern is valid"));

/// First link pointing at a community wins; a thread id is only taken from
/// that same link.
pub fn scan_links<I, S>(links: I) -> PreferredHint
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for link in links {
        if let Some(caps) = THREAD_LINK.captures(link.as_ref()) {
            let community = caps.get(2).map(|m| m.as_str().to_string());
            let thread_id = caps
                .get(3)
                .map(|m| m.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            return PreferredHint {
                community,
                thread_id,
            };
        }
    }
    PreferredHint::default()
}

pub fn scan_markup(markup: &str) -> PreferredHint {
    scan_links(
        HREF.captures_iter(markup)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str())),
    )
}

/// Accepts a bare video id or a YouTube watch / short link.
pub fn video_id_from_url(input: &str) -> Option<String> {
    let input = input.trim();
    if VIDEO_ID.is_match(input) {
        return Some(input.to_string());
    }
    let url = url::Url::parse(input).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let id = match host {
        "youtu.be" => url.path_segments()?.next()?.to_string(),
        "youtube.com" => url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())?,
        _ => return None,
    };
    VIDEO_ID.is_match(&id).then_some(id)
}
