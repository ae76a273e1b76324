//! Gallery image URL canonicalization
//!
//! Thumbnail URLs on product pages carry a size/variant token run before the
//! extension (`81abc._AC_UX679_.jpg`). Removing it yields the original-size
//! asset and a key that is identical for every rendition of the same image.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::domain::DedupeKey;

/// Hosts that serve resizable product images
const CANONICAL_IMAGE_HOSTS: &[&str] = &[
    "media-amazon.com",
    "ssl-images-amazon.com",
    "images-amazon.com",
];

/// Case-insensitive substrings that mark 360°/video/sprite thumbnails
pub const ICON_VOCABULARY: &[&str] = &[
    "360",
    "sprite",
    "immersive",
    "video",
    "play",
    "turntable",
    "spin",
];

// One or more `._TOKEN` segments directly before the image extension.
// Matching the whole run at once keeps stripping idempotent.
static SIZE_SUFFIX_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\._[^./]*)+(\.(?:jpe?g|png|gif))$").expect("size suffix pattern is valid")
});

/// Remove the size/variant token run from a file name or path.
///
/// `81abc._AC_UX679_.jpg` → `81abc.jpg`, `x._AC_._SX300_.png` → `x.png`.
/// Names without such a run are returned unchanged.
pub fn strip_size_suffix(name: &str) -> String {
    SIZE_SUFFIX_RUN.replace(name, "$1").into_owned()
}

fn strip_query_and_fragment(raw: &str) -> &str {
    match raw.find(['?', '#']) {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

fn is_canonical_image_host(host: &str) -> bool {
    CANONICAL_IMAGE_HOSTS
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
}

/// Canonical high-resolution fetch URL.
///
/// Never fails: when the input cannot be parsed as a URL the query-stripped
/// input is returned as is.
pub fn normalize(raw: &str) -> String {
    let stripped = strip_query_and_fragment(raw.trim());
    let absolute = if stripped.starts_with("//") {
        format!("https:{stripped}")
    } else {
        stripped.to_string()
    };

    // Url lowercases scheme and host and leaves the path's casing alone
    let Ok(mut url) = Url::parse(&absolute) else {
        return stripped.to_string();
    };

    if url.host_str().is_some_and(is_canonical_image_host) {
        let path = strip_size_suffix(url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}

/// Resolution-independent key: lowercased base name with the token run removed
pub fn dedupe_key(raw: &str) -> DedupeKey {
    let normalized = normalize(raw);
    let path = Url::parse(&normalized)
        .map(|u| u.path().to_string())
        .unwrap_or(normalized);
    let basename = path.rsplit('/').next().unwrap_or_default();
    DedupeKey(strip_size_suffix(&basename.to_lowercase()))
}

/// True when the URL names a 360°/video/sprite style thumbnail
pub fn looks_like_icon(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    ICON_VOCABULARY.iter().any(|word| lowered.contains(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("81abcXYZL._AC_UX679_.jpg", "81abcXYZL.jpg")]
    #[case("81abc._AC_._SX300_.JPG", "81abc.JPG")]
    #[case("41Q._SL1500_.png", "41Q.png")]
    #[case("plain.jpg", "plain.jpg")]
    #[case("a._SX38_.webp", "a._SX38_.webp")]
    fn test_strip_size_suffix(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_size_suffix(input), expected);
    }

    #[test]
    fn test_normalize_canonical_host() {
        let raw = "https://M.Media-Amazon.com/images/I/81abcXYZL._AC_UX679_.jpg?foo=1#x";
        assert_eq!(
            normalize(raw),
            "https://m.media-amazon.com/images/I/81abcXYZL.jpg"
        );
    }

    #[test]
    fn test_normalize_protocol_relative() {
        assert_eq!(
            normalize("//images-eu.ssl-images-amazon.com/images/I/41Q._SS40_.jpg"),
            "https://images-eu.ssl-images-amazon.com/images/I/41Q.jpg"
        );
    }

    #[test]
    fn test_normalize_other_host_keeps_tokens() {
        assert_eq!(
            normalize("https://cdn.example.com/a/B._AC_.jpg?x=1"),
            "https://cdn.example.com/a/B._AC_.jpg"
        );
    }

    #[test]
    fn test_normalize_unparseable_returns_query_stripped() {
        assert_eq!(normalize("not a url?x=1"), "not a url");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = "https://m.media-amazon.com/images/I/71Zz._AC_SX300_SY300_QL70_ML2_.jpg";
        let once = normalize(raw);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_dedupe_key_ignores_resolution() {
        let a = dedupe_key("https://m.media-amazon.com/images/I/81ABC._AC_US40_.jpg");
        let b = dedupe_key("https://m.media-amazon.com/images/I/81abc._AC_SL1500_.jpg?x");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "81abc.jpg");
    }

    #[test]
    fn test_dedupe_key_strips_on_any_host() {
        let key = dedupe_key("https://cdn.example.com/p/Photo._SX300_.png");
        assert_eq!(key.as_str(), "photo.png");
    }

    #[rstest]
    #[case("https://m.media-amazon.com/images/I/360_icon.png", true)]
    #[case("https://m.media-amazon.com/images/I/SPRITE-sheet.png", true)]
    #[case("https://x/Immersive.jpg", true)]
    #[case("https://x/video-thumb.jpg", true)]
    #[case("https://x/PLAY-button.png", true)]
    #[case("https://x/turntable.jpg", true)]
    #[case("https://x/spin.jpg", true)]
    #[case("https://m.media-amazon.com/images/I/81abc.jpg", false)]
    fn test_looks_like_icon(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(looks_like_icon(url), expected);
    }
}
