//! CSS selectors for product detail pages.
//!
//! Compiled selectors are used against snapshot markup; the raw string lists
//! are also handed to the rendering session, which resolves them in the live
//! document. Update this file when the page structure changes.

use once_cell::sync::Lazy;
use scraper::Selector;

fn compile(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector '{css}': {e}"))
}

fn compile_all(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|css| compile(css)).collect()
}

/// Immersive-view gallery rows
pub mod gallery {
    use super::{Lazy, Selector, compile};

    pub static ROW: Lazy<Selector> = Lazy::new(|| compile("div.ivRow"));

    pub static THUMB: Lazy<Selector> = Lazy::new(|| compile("div.ivThumb"));

    /// Inner thumbnail whose inline style carries `background: url(...)`
    pub static THUMB_IMAGE: Lazy<Selector> = Lazy::new(|| compile("div.ivThumbImage[style]"));

    /// Present once the gallery has rendered
    pub const RENDERED_MARKER: &str = "div.ivRow div.ivThumbImage";

    /// Element scrolled into view before waiting for the gallery, first match wins
    pub const SCROLL_TARGETS: &[&str] = &[
        "#altImages",
        "#imageBlock",
        "#imageBlock_feature_div",
        "div.ivRow",
    ];

    /// Main image candidates clicked to open the immersive view, in order
    pub const MAIN_IMAGE: &[&str] = &[
        "#imageBlock_feature_div img#landingImage",
        "#imageBlock_feature_div #imgTagWrapperId img",
        "#imageBlock_feature_div img",
        "#imgTagWrapperId img",
        "#main-image-container img",
        "#imageBlock_feature_div",
    ];
}

/// Text fields of the detail page
pub mod detail {
    use super::{Lazy, Selector, compile, compile_all};

    /// Marker id that must appear in the markup of a real product page
    pub const PRODUCT_TITLE_MARKER: &str = "productTitle";

    pub static TITLE: Lazy<Vec<Selector>> = Lazy::new(|| {
        compile_all(&[
            "span#productTitle",
            "h1.a-size-large.product-title-word-break",
            "span.a-size-large.product-title-word-break",
        ])
    });

    /// Complete price strings including the fraction, most specific first
    pub static PRICE: Lazy<Vec<Selector>> = Lazy::new(|| {
        compile_all(&[
            "#corePrice_feature_div span.a-offscreen",
            ".reinventPricePriceToPayMargin span.a-offscreen",
            "span.a-price span.a-offscreen",
            "span.a-offscreen",
            "#priceblock_ourprice",
            "#priceblock_dealprice",
        ])
    });

    pub static PRICE_WHOLE: Lazy<Vec<Selector>> =
        Lazy::new(|| compile_all(&["span.a-price span.a-price-whole", "span.a-price-whole"]));

    pub static PRICE_FRACTION: Lazy<Vec<Selector>> = Lazy::new(|| {
        compile_all(&["span.a-price span.a-price-fraction", "span.a-price-fraction"])
    });

    pub static SELLER: Lazy<Vec<Selector>> = Lazy::new(|| {
        compile_all(&[
            "span.a-size-small.mbcMerchantName",
            "a#sellerProfileTriggerId",
            "div#merchant-info",
        ])
    });

    /// Present when the offer does not qualify for the buybox
    pub static UNQUALIFIED_BUYBOX: Lazy<Selector> = Lazy::new(|| compile("div#unqualifiedBuyBox"));
}
