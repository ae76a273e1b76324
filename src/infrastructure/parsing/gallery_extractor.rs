//! Gallery image discovery from rendered product markup
//!
//! Only the immersive-view rows are scanned (`div.ivRow > div.ivThumb >
//! div.ivThumbImage[style]`); other images on the page are ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use tracing::debug;

use super::MarkupExtractor;
use super::selectors::gallery;
use crate::domain::{CandidateImage, NormalizedImage};
use crate::infrastructure::config::defaults;
use crate::infrastructure::url_normalizer::{dedupe_key, looks_like_icon, normalize};

/// Position given to thumbnails without a usable position hint
pub const UNKNOWN_POSITION: u32 = u32::MAX;

static BACKGROUND_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\((?:"|')?(.*?)(?:"|')?\)"#).expect("background url pattern is valid")
});

static THUMB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ivImage_(\d+)").expect("thumbnail id pattern is valid"));

/// First `url(...)` token of an inline style, quotes removed
pub fn parse_background_url(style: &str) -> Option<&str> {
    BACKGROUND_URL
        .captures(style)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn thumb_position(thumb: &ElementRef<'_>) -> u32 {
    let element = thumb.value();
    element
        .attr("id")
        .and_then(|id| THUMB_ID.captures(id))
        .and_then(|c| c[1].parse().ok())
        .or_else(|| {
            element
                .attr("data-csa-c-posy")
                .and_then(|v| v.trim().parse().ok())
        })
        .unwrap_or(UNKNOWN_POSITION)
}

/// Ordered, deduplicated gallery URLs for one product page
#[derive(Debug, Clone)]
pub struct GalleryExtractor {
    max_want: usize,
}

impl Default for GalleryExtractor {
    fn default() -> Self {
        Self::new(defaults::MAX_IMAGES_PER_PRODUCT)
    }
}

impl GalleryExtractor {
    pub fn new(max_want: usize) -> Self {
        Self { max_want }
    }

    /// Every thumbnail with a background URL, in document order
    pub fn candidates(&self, html: &Html) -> Vec<CandidateImage> {
        let mut found = Vec::new();
        for row in html.select(&gallery::ROW) {
            for thumb in row.select(&gallery::THUMB) {
                let Some(image_div) = thumb.select(&gallery::THUMB_IMAGE).next() else {
                    continue;
                };
                let Some(raw_url) = image_div
                    .value()
                    .attr("style")
                    .and_then(parse_background_url)
                else {
                    continue;
                };
                found.push(CandidateImage {
                    position: thumb_position(&thumb),
                    raw_url: raw_url.to_string(),
                });
            }
        }
        found
    }

    /// Sort by position, drop icons, normalize, dedupe (first wins), truncate
    pub fn select(&self, mut candidates: Vec<CandidateImage>) -> Vec<NormalizedImage> {
        // sort_by_key is stable: equal positions keep document order
        candidates.sort_by_key(|c| c.position);

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for candidate in candidates {
            if selected.len() >= self.max_want {
                break;
            }
            if looks_like_icon(&candidate.raw_url) {
                debug!("Skipping icon-like thumbnail: {}", candidate.raw_url);
                continue;
            }
            let fetch_url = normalize(&candidate.raw_url);
            let key = dedupe_key(&fetch_url);
            if !seen.insert(key.clone()) {
                continue;
            }
            selected.push(NormalizedImage { fetch_url, key });
        }
        selected
    }
}

impl MarkupExtractor for GalleryExtractor {
    type Output = Vec<NormalizedImage>;

    fn extract(&self, html: &Html) -> Self::Output {
        let candidates = self.candidates(html);
        let total = candidates.len();
        let selected = self.select(candidates);
        debug!("Gallery: {} thumbnails, {} unique images kept", total, selected.len());
        selected
    }
}

/// Fetch URLs of the gallery in `markup`, at most `max_want`
pub fn extract_gallery_urls(markup: &str, max_want: usize) -> Vec<String> {
    let html = Html::parse_document(markup);
    GalleryExtractor::new(max_want)
        .extract(&html)
        .into_iter()
        .map(|image| image.fetch_url)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumb(id_attr: &str, url: &str) -> String {
        format!(
            r#"<div class="ivThumb" {id_attr}><div class="ivThumbImage" style="background: url(&quot;{url}&quot;);"></div></div>"#
        )
    }

    fn page(rows: &[String]) -> String {
        let rows: String = rows
            .iter()
            .map(|r| format!(r#"<div class="ivRow">{r}</div>"#))
            .collect();
        format!("<html><body><span id=\"productTitle\">T</span>{rows}</body></html>")
    }

    const IMG: &str = "https://m.media-amazon.com/images/I/";

    #[test]
    fn test_parse_background_url_variants() {
        assert_eq!(parse_background_url("background: url(a.jpg)"), Some("a.jpg"));
        assert_eq!(parse_background_url("background:url('b.jpg');"), Some("b.jpg"));
        assert_eq!(parse_background_url(r#"background-image: url("c.jpg")"#), Some("c.jpg"));
        assert_eq!(parse_background_url("color: red"), None);
        assert_eq!(parse_background_url("background: url()"), None);
    }

    #[test]
    fn test_orders_by_position_and_dedupes() {
        let row = [
            thumb(r#"id="ivImage_0""#, &format!("{IMG}A._AC_US40_.jpg")),
            thumb(r#"id="ivImage_3""#, &format!("{IMG}D._AC_US40_.jpg")),
            thumb(r#"id="ivImage_1""#, &format!("{IMG}B._AC_US40_.jpg")),
            thumb(r#"id="ivImage_2""#, &format!("{IMG}A._AC_SL1500_.jpg")),
        ]
        .concat();

        let urls = extract_gallery_urls(&page(&[row]), 50);
        assert_eq!(
            urls,
            vec![
                format!("{IMG}A.jpg"),
                format!("{IMG}B.jpg"),
                format!("{IMG}D.jpg"),
            ]
        );
    }

    #[test]
    fn test_position_falls_back_to_posy_then_sentinel() {
        let row = [
            thumb("", &format!("{IMG}Last.jpg")),
            thumb(r#"data-csa-c-posy="5""#, &format!("{IMG}Five.jpg")),
            thumb(r#"id="ivImage_1""#, &format!("{IMG}One.jpg")),
            thumb(r#"data-csa-c-posy="oops""#, &format!("{IMG}AlsoLast.jpg")),
        ]
        .concat();

        let urls = extract_gallery_urls(&page(&[row]), 50);
        let names: Vec<_> = urls.iter().map(|u| u.rsplit('/').next().unwrap()).collect();
        assert_eq!(names, vec!["One.jpg", "Five.jpg", "Last.jpg", "AlsoLast.jpg"]);
    }

    #[test]
    fn test_icons_and_styleless_thumbs_are_skipped() {
        let row = [
            thumb(r#"id="ivImage_0""#, &format!("{IMG}360_spin.jpg")),
            thumb(r#"id="ivImage_1""#, &format!("{IMG}video-play.jpg")),
            r#"<div class="ivThumb" id="ivImage_2"><div class="ivThumbImage"></div></div>"#
                .to_string(),
            thumb(r#"id="ivImage_3""#, &format!("{IMG}Real.jpg")),
        ]
        .concat();

        let urls = extract_gallery_urls(&page(&[row]), 50);
        assert_eq!(urls, vec![format!("{IMG}Real.jpg")]);
    }

    #[test]
    fn test_thumbnails_outside_rows_are_ignored() {
        let markup = format!(
            "<html><body>{}</body></html>",
            thumb(r#"id="ivImage_0""#, &format!("{IMG}Stray.jpg"))
        );
        assert!(extract_gallery_urls(&markup, 50).is_empty());
    }

    #[test]
    fn test_truncates_to_max_want_across_rows() {
        let rows: Vec<String> = (0..3)
            .map(|r| {
                (0..4)
                    .map(|c| {
                        let n = r * 4 + c;
                        thumb(&format!(r#"id="ivImage_{n}""#), &format!("{IMG}P{n}.jpg"))
                    })
                    .collect::<String>()
            })
            .collect();

        let urls = extract_gallery_urls(&page(&rows), 5);
        assert_eq!(urls.len(), 5);
        assert!(urls[0].ends_with("P0.jpg"));
        assert!(urls[4].ends_with("P4.jpg"));
    }

    #[test]
    fn test_zero_max_want_yields_nothing() {
        let row = [
            thumb(r#"id="ivImage_0""#, &format!("{IMG}A.jpg")),
            thumb(r#"id="ivImage_1""#, &format!("{IMG}B.jpg")),
        ]
        .concat();

        assert!(extract_gallery_urls(&page(&[row.clone()]), 0).is_empty());
        assert_eq!(extract_gallery_urls(&page(&[row]), 1).len(), 1);
    }

    #[test]
    fn test_empty_markup_yields_nothing() {
        assert!(extract_gallery_urls("", 50).is_empty());
        assert!(extract_gallery_urls("<html></html>", 50).is_empty());
    }
}
