//! Decides whether a search hit really links to the video being watched.
//!
//! Reddit's `url:` search is fuzzy and happily returns posts for unrelated
//! videos whose ids share a prefix, so every hit is re-checked against the
//! post's own link before it is considered.

use percent_encoding::percent_decode_str;

use crate::reddit::Post;

const YOUTUBE_DOMAIN: &str = "youtube.com";
const SHORT_DOMAIN: &str = "youtu.be";
const REDIRECT_KEY: &str = "amp;u";

pub fn validate(post: &Post, video_id: &str) -> bool {
    if post.is_preserved_post() && post.num_comments < 1 {
        return false;
    }

    match post.domain.as_str() {
        YOUTUBE_DOMAIN => watch_link_matches(&post.url, video_id),
        SHORT_DOMAIN => short_link_matches(&post.url, video_id),
        _ => false,
    }
}

fn watch_link_matches(url: &str, video_id: &str) -> bool {
    let query = match url.find('?') {
        Some(pos) => &url[pos + 1..],
        None => url,
    };
    for pair in query.split('&') {
        let (key, value) = split_pair(pair);
        if key == "v" && value == Some(video_id) {
            return true;
        }
        if key == REDIRECT_KEY {
            let Some(value) = value else {
                continue;
            };
            // A wrapper that does not decode ends the scan as a non-match.
            let Some(inner) = decode_component(value) else {
                return false;
            };
            let inner = inner.replacen("/watch?", "", 1);
            if query_has_video(&inner, video_id) {
                return true;
            }
        }
    }
    false
}

fn short_link_matches(url: &str, video_id: &str) -> bool {
    let tail = match url.rfind('/') {
        Some(pos) => &url[pos + 1..],
        None => url,
    };
    let id = tail.split('?').next().unwrap_or_default();
    id == video_id
}

fn query_has_video(query: &str, video_id: &str) -> bool {
    query.split('&').any(|pair| {
        let (key, value) = split_pair(pair);
        key == "v" && value == Some(video_id)
    })
}

/// `key=value` with anything past a second `=` ignored.
fn split_pair(pair: &str) -> (&str, Option<&str>) {
    let mut parts = pair.split('=');
    let key = parts.next().unwrap_or_default();
    (key, parts.next())
}

/// Strict percent-decoding: every `%` must start a two-digit hex escape and
/// the bytes must be UTF-8.
fn decode_component(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let well_formed = bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return None;
    }
    percent_decode_str(value)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn post(domain: &str, url: &str) -> Post {
        Post {
            id: "t1".into(),
            subreddit: "videos".into(),
            domain: domain.into(),
            url: url.into(),
            num_comments: 3,
            ..Post::default()
        }
    }

    #[test]
    fn accepts_watch_link() {
        let item = post("youtube.com", "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(validate(&item, "dQw4w9WgXcQ"));
        assert!(!validate(&item, "dQw4w9WgXcR"));
    }

    #[test]
    fn accepts_watch_link_with_extra_parameters() {
        let item = post(
            "youtube.com",
            "https://www.youtube.com/watch?feature=share&v=abcDEF12345&t=42",
        );
        assert!(validate(&item, "abcDEF12345"));
    }

    #[test]
    fn accepts_redirect_wrapped_link() {
        let item = post(
            "youtube.com",
            "https://www.youtube.com/attribution_link?a=xyz&amp;u=%2Fwatch%3Fv%3DabcDEF12345%26feature%3Dshare",
        );
        assert!(validate(&item, "abcDEF12345"));
        assert!(!validate(&item, "zzzDEF12345"));
    }

    #[test]
    fn undecodable_redirect_is_not_a_match() {
        let item = post("youtube.com", "https://www.youtube.com/attribution_link?amp;u=%FF%FE");
        assert!(!validate(&item, "abc"));
    }

    #[test]
    fn malformed_escapes_in_redirect_are_not_a_match() {
        for url in [
            "https://www.youtube.com/attribution_link?amp;u=%2Fwatch%3Fv%3DabcDEF12345%zz",
            "https://www.youtube.com/attribution_link?amp;u=%2Fwatch%3Fv%3DabcDEF12345%2",
            "https://www.youtube.com/attribution_link?amp;u=%2Fwatch%3Fv%3DabcDEF12345%",
        ] {
            assert!(!validate(&post("youtube.com", url), "abcDEF12345"), "{url}");
        }
        assert_eq!(decode_component("%2Fwatch%3Fv%3Dx").as_deref(), Some("/watch?v=x"));
        assert_eq!(decode_component("50%"), None);
        assert_eq!(decode_component("%zz"), None);
    }

    #[test]
    fn accepts_short_link_with_and_without_query() {
        assert!(validate(&post("youtu.be", "https://youtu.be/abcDEF12345"), "abcDEF12345"));
        assert!(validate(
            &post("youtu.be", "https://youtu.be/abcDEF12345?t=10"),
            "abcDEF12345"
        ));
        assert!(!validate(&post("youtu.be", "https://youtu.be/abcDEF123"), "abcDEF12345"));
    }

    #[test]
    fn rejects_other_domains() {
        let item = post("vimeo.com", "https://vimeo.com/watch?v=abcDEF12345");
        assert!(!validate(&item, "abcDEF12345"));
    }

    #[test]
    fn rejects_archived_posts_without_comments() {
        let mut item = post("youtu.be", "https://youtu.be/abcDEF12345");
        item.archived = true;
        item.num_comments = 0;
        assert!(!validate(&item, "abcDEF12345"));

        item.num_comments = 1;
        assert!(validate(&item, "abcDEF12345"));
    }

    #[test]
    fn tolerates_malformed_urls() {
        assert!(!validate(&post("youtube.com", ""), "abc"));
        assert!(!validate(&post("youtube.com", "no-query-here"), "abc"));
        assert!(!validate(&post("youtube.com", "?&&=&v"), "abc"));
        assert!(!validate(&post("youtu.be", "https://youtu.be/"), "abc"));
        assert!(validate(&post("youtu.be", "abc"), "abc"));
    }

    proptest! {
        #[test]
        fn watch_links_match_only_their_id(
            id in "[A-Za-z0-9_-]{11}",
            other in "[A-Za-z0-9_-]{11}",
        ) {
            let item = post("youtube.com", &format!("https://www.youtube.com/watch?v={id}"));
            prop_assert!(validate(&item, &id));
            prop_assert_eq!(validate(&item, &other), id == other);
        }

        #[test]
        fn short_links_match_only_their_id(
            id in "[A-Za-z0-9_-]{11}",
            other in "[A-Za-z0-9_-]{11}",
            query in proptest::option::of("[a-z]=[0-9]{1,3}"),
        ) {
            let url = match &query {
                Some(q) => format!("https://youtu.be/{id}?{q}"),
                None => format!("https://youtu.be/{id}"),
            };
            let item = post("youtu.be", &url);
            prop_assert!(validate(&item, &id));
            prop_assert_eq!(validate(&item, &other), id == other);
        }
    }
}
