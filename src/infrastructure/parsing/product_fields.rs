//! Product text fields: ordered strategies per field, first match wins

use scraper::{Html, Selector};
use tracing::debug;

use super::MarkupExtractor;
use super::selectors::detail;
use crate::domain::marketplace::decimal_separator_for;
use crate::domain::{BuyboxStatus, ProductFields};

pub const TITLE_PLACEHOLDER: &str = "Title not found";
pub const PRICE_PLACEHOLDER: &str = "Price unavailable";
pub const DEFAULT_SELLER: &str = "Amazon";

/// Text of an element with every whitespace run collapsed to one space
fn element_text(element: scraper::ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First selector whose first match has non-empty text
fn first_text(html: &Html, field_name: &str, selectors: &[Selector]) -> Option<String> {
    for (i, selector) in selectors.iter().enumerate() {
        if let Some(element) = html.select(selector).next() {
            let text = element_text(element);
            if !text.is_empty() {
                debug!("Extracted {} using selector {}", field_name, i);
                return Some(text);
            }
        }
    }
    None
}

/// Text of the first element matched by any selector, even when empty
fn first_element_text(html: &Html, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .find_map(|selector| html.select(selector).next())
        .map(element_text)
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// `whole` + separator + `fraction`, digits only.
///
/// The fraction defaults to `00`; the separator is `.` for the dot-decimal
/// storefronts and `,` elsewhere. `None` when `whole` has no digits.
pub fn compose_price(whole: &str, fraction: Option<&str>, domain: &str) -> Option<String> {
    let whole = digits(whole);
    if whole.is_empty() {
        return None;
    }
    let fraction = fraction.map(digits).filter(|f| !f.is_empty());
    let fraction = fraction.as_deref().unwrap_or("00");
    Some(format!("{whole}{}{fraction}", decimal_separator_for(domain)))
}

/// Extracts [`ProductFields`] for one storefront
#[derive(Debug, Clone)]
pub struct ProductFieldExtractor {
    domain: String,
}

impl ProductFieldExtractor {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    pub fn title(&self, html: &Html) -> String {
        first_text(html, "title", &detail::TITLE).unwrap_or_else(|| TITLE_PLACEHOLDER.to_string())
    }

    /// Structured price first, then whole/fraction composition, then placeholder
    pub fn price(&self, html: &Html) -> String {
        if let Some(price) = first_text(html, "price", &detail::PRICE) {
            return price;
        }

        first_element_text(html, &detail::PRICE_WHOLE)
            .and_then(|whole| {
                let fraction = first_element_text(html, &detail::PRICE_FRACTION);
                compose_price(&whole, fraction.as_deref(), &self.domain)
            })
            .unwrap_or_else(|| PRICE_PLACEHOLDER.to_string())
    }

    pub fn seller(&self, html: &Html) -> String {
        first_text(html, "seller", &detail::SELLER).unwrap_or_else(|| DEFAULT_SELLER.to_string())
    }

    pub fn buybox(&self, html: &Html) -> BuyboxStatus {
        if html.select(&detail::UNQUALIFIED_BUYBOX).next().is_some() {
            BuyboxStatus::NotQualified
        } else {
            BuyboxStatus::Qualified
        }
    }
}

impl MarkupExtractor for ProductFieldExtractor {
    type Output = ProductFields;

    fn extract(&self, html: &Html) -> Self::Output {
        ProductFields {
            title: self.title(html),
            price: self.price(html),
            seller: self.seller(html),
            buybox: self.buybox(html),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fields(body: &str, domain: &str) -> ProductFields {
        let html = Html::parse_document(&format!("<html><body>{body}</body></html>"));
        ProductFieldExtractor::new(domain).extract(&html)
    }

    #[test]
    fn test_all_placeholders_on_empty_page() {
        let f = fields("", "amazon.de");
        assert_eq!(f.title, TITLE_PLACEHOLDER);
        assert_eq!(f.price, PRICE_PLACEHOLDER);
        assert_eq!(f.seller, DEFAULT_SELLER);
        assert_eq!(f.buybox, BuyboxStatus::Qualified);
    }

    #[test]
    fn test_title_fallback_chain() {
        let f = fields(
            r#"<h1 class="a-size-large product-title-word-break">  Fallback
                 Title </h1>"#,
            "amazon.de",
        );
        assert_eq!(f.title, "Fallback Title");

        let f = fields(
            r#"<span id="productTitle"> Main </span><h1 class="a-size-large product-title-word-break">Other</h1>"#,
            "amazon.de",
        );
        assert_eq!(f.title, "Main");
    }

    #[test]
    fn test_wrapped_title_collapses_to_one_line() {
        let f = fields(
            "<span id=\"productTitle\">\n        LED Schreibtischlampe,\n\t  dimmbar\n    </span>",
            "amazon.de",
        );
        assert_eq!(f.title, "LED Schreibtischlampe, dimmbar");

        let f = fields(
            r#"<a id="sellerProfileTriggerId"> Licht <b>Werk</b>   GmbH </a>"#,
            "amazon.de",
        );
        assert_eq!(f.seller, "Licht Werk GmbH");
    }

    #[test]
    fn test_structured_price_wins_verbatim() {
        let f = fields(
            r#"<div id="corePrice_feature_div"><span class="a-offscreen"> 24,99 € </span></div>
               <span class="a-price"><span class="a-price-whole">19</span></span>"#,
            "amazon.de",
        );
        assert_eq!(f.price, "24,99 €");
    }

    #[rstest]
    #[case("amazon.de", "19,00")]
    #[case("amazon.com", "19.00")]
    #[case("amazon.co.uk", "19.00")]
    #[case("amazon.com.be", "19,00")]
    fn test_whole_only_price_by_domain(#[case] domain: &str, #[case] expected: &str) {
        let f = fields(
            r#"<span class="a-price"><span class="a-price-whole">19</span></span>"#,
            domain,
        );
        assert_eq!(f.price, expected);
    }

    #[test]
    fn test_whole_and_fraction_digits_only() {
        let f = fields(
            r#"<span class="a-price"><span class="a-price-whole">1.299,</span><span class="a-price-fraction">95</span></span>"#,
            "amazon.de",
        );
        assert_eq!(f.price, "1299,95");
    }

    #[test]
    fn test_compose_price_edge_cases() {
        assert_eq!(compose_price("12", Some(""), "amazon.fr").as_deref(), Some("12,00"));
        assert_eq!(compose_price("--", None, "amazon.fr"), None);
    }

    #[test]
    fn test_seller_and_buybox() {
        let f = fields(
            r#"<a id="sellerProfileTriggerId">Shop GmbH</a><div id="unqualifiedBuyBox"></div>"#,
            "amazon.de",
        );
        assert_eq!(f.seller, "Shop GmbH");
        assert_eq!(f.buybox, BuyboxStatus::NotQualified);
    }
}
