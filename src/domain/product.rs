use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifier::Identifier;

/// Gallery thumbnail found in rendered markup, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateImage {
    /// Gallery order hint (main image = 0); unknown positions sort last
    pub position: u32,
    pub raw_url: String,
}

/// Resolution-independent identity of an image asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupeKey(pub String);

impl DedupeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical, highest-resolution fetchable form of a gallery URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub fetch_url: String,
    pub key: DedupeKey,
}

/// Output formats accepted by the spreadsheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormatKind {
    Jpeg,
    Png,
}

impl ImageFormatKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Decoded image ready for embedding; `width`/`height` are always > 0
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormatKind,
    pub width: u32,
    pub height: u32,
    /// URL the bytes were fetched from
    pub source_url: String,
}

impl DecodedImage {
    /// Icon/badge sized: both sides at or below `threshold`
    pub fn is_icon_sized(&self, threshold: u32) -> bool {
        self.width <= threshold && self.height <= threshold
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("bytes", &self.bytes.len())
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("source_url", &self.source_url)
            .finish()
    }
}

/// Simple buybox indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyboxStatus {
    Qualified,
    NotQualified,
}

impl BuyboxStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Qualified => "Qualified",
            Self::NotQualified => "Not Qualified",
        }
    }
}

/// Text fields scraped from one product page, placeholders already applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFields {
    pub title: String,
    pub price: String,
    pub seller: String,
    pub buybox: BuyboxStatus,
}

/// One spreadsheet row worth of data.
///
/// Owned by the run that produced it and handed to the sink exactly once.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    pub identifier: Identifier,
    pub title: String,
    pub price: String,
    pub seller: String,
    pub buybox_status: BuyboxStatus,
    pub images: Vec<DecodedImage>,
}

impl OutputRecord {
    /// Text cells in column order
    pub fn text_cells(&self) -> [&str; 5] {
        [
            self.identifier.as_str(),
            &self.title,
            &self.price,
            &self.seller,
            self.buybox_status.label(),
        ]
    }
}
