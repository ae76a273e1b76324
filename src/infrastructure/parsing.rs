//! HTML parsing for product detail pages
//!
//! Selectors live in one place; each extractor is a pure function of the
//! parsed document so it can be exercised against saved markup.

pub mod gallery_extractor;
pub mod product_fields;
pub mod selectors;

// Re-export public types
pub use gallery_extractor::{GalleryExtractor, extract_gallery_urls, parse_background_url};
pub use product_fields::{ProductFieldExtractor, compose_price};

use scraper::Html;

/// Extractor over an already parsed document
pub trait MarkupExtractor {
    type Output;

    fn extract(&self, html: &Html) -> Self::Output;

    /// Parse `markup` and extract in one step
    fn extract_from_markup(&self, markup: &str) -> Self::Output {
        self.extract(&Html::parse_document(markup))
    }
}
