//! Image retrieval and normalization.
//!
//! Bytes come from an [`ImageSource`]; they are decoded, re-encoded to a
//! format the spreadsheet accepts and filtered by size. Every problem is a
//! [`ImageRejection`] value so that one bad image never fails an identifier.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{DecodedImage, ImageFormatKind, NormalizedImage};
use crate::infrastructure::config::ImageConfig;

/// Where image bytes come from
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Body of a successful response, or an error for transport/status failures
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Why an image did not make it into the row
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageRejection {
    #[error("Download failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Empty response body")]
    EmptyBody,

    #[error("Response body too small ({len} bytes)")]
    TooSmallBody { len: usize },

    #[error("Undecodable image data: {0}")]
    Undecodable(String),

    #[error("Re-encoding failed: {0}")]
    Reencode(String),

    #[error("Icon-sized image ({width}x{height})")]
    IconSized { width: u32, height: u32 },
}

impl ImageRejection {
    /// Only transport failures may succeed on a later run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Decode `bytes`, keep JPEG/PNG as they are and re-encode anything else as PNG.
pub fn normalize_image_bytes(
    bytes: Vec<u8>,
    min_body_bytes: usize,
    icon_max_dimension: u32,
    source_url: &str,
) -> Result<DecodedImage, ImageRejection> {
    if bytes.is_empty() {
        return Err(ImageRejection::EmptyBody);
    }
    if bytes.len() < min_body_bytes {
        return Err(ImageRejection::TooSmallBody { len: bytes.len() });
    }

    let detected =
        image::guess_format(&bytes).map_err(|e| ImageRejection::Undecodable(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(&bytes, detected)
        .map_err(|e| ImageRejection::Undecodable(e.to_string()))?;

    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageRejection::Undecodable("zero-sized image".to_string()));
    }
    if width <= icon_max_dimension && height <= icon_max_dimension {
        return Err(ImageRejection::IconSized { width, height });
    }

    let (bytes, format) = match detected {
        ImageFormat::Jpeg => (bytes, ImageFormatKind::Jpeg),
        ImageFormat::Png => (bytes, ImageFormatKind::Png),
        other => {
            debug!("Re-encoding {:?} image as PNG: {}", other, source_url);
            (reencode_png(decoded)?, ImageFormatKind::Png)
        }
    };

    Ok(DecodedImage {
        bytes,
        format,
        width,
        height,
        source_url: source_url.to_string(),
    })
}

fn reencode_png(decoded: DynamicImage) -> Result<Vec<u8>, ImageRejection> {
    let flattened = if decoded.color().has_alpha() {
        DynamicImage::ImageRgba8(decoded.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(decoded.to_rgb8())
    };
    let mut out = Cursor::new(Vec::new());
    flattened
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ImageRejection::Reencode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Images accepted for one identifier plus the rejection count
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub images: Vec<DecodedImage>,
    pub rejected: usize,
}

/// Downloads and normalizes gallery images
pub struct ImageFetcher<S> {
    source: S,
    min_body_bytes: usize,
    icon_max_dimension: u32,
}

impl<S: ImageSource> ImageFetcher<S> {
    pub fn new(source: S, config: &ImageConfig) -> Self {
        Self {
            source,
            min_body_bytes: config.min_body_bytes,
            icon_max_dimension: config.icon_max_dimension,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch(&self, url: &str) -> Result<DecodedImage, ImageRejection> {
        let bytes = self
            .source
            .fetch_bytes(url)
            .await
            .map_err(|e| ImageRejection::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        normalize_image_bytes(bytes, self.min_body_bytes, self.icon_max_dimension, url)
    }

    /// Fetch every image in gallery order; rejections are logged and counted
    pub async fn fetch_all(&self, images: &[NormalizedImage]) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        for image in images {
            match self.fetch(&image.fetch_url).await {
                Ok(decoded) => outcome.images.push(decoded),
                Err(rejection) => {
                    warn!("   ⚠️ Image skipped ({}): {}", image.key, rejection);
                    outcome.rejected += 1;
                }
            }
        }
        outcome
    }
}
