//! Marketplace catalogue (country storefronts) and per-domain formatting rules

use std::fmt;

/// A country storefront of the retail site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marketplace {
    /// Short country code used on the command line ("de", "uk", ...)
    pub code: &'static str,
    /// Storefront domain without the `www.` prefix
    pub domain: &'static str,
    /// Human readable label
    pub label: &'static str,
}

/// All supported storefronts
pub const MARKETPLACES: &[Marketplace] = &[
    Marketplace { code: "de", domain: "amazon.de", label: "Deutschland (DE)" },
    Marketplace { code: "fr", domain: "amazon.fr", label: "Frankreich (FR)" },
    Marketplace { code: "es", domain: "amazon.es", label: "Spanien (ES)" },
    Marketplace { code: "se", domain: "amazon.se", label: "Schweden (SE)" },
    Marketplace { code: "nl", domain: "amazon.nl", label: "Niederlande (NL)" },
    Marketplace { code: "pl", domain: "amazon.pl", label: "Polen (PL)" },
    Marketplace { code: "it", domain: "amazon.it", label: "Italien (IT)" },
    Marketplace { code: "uk", domain: "amazon.co.uk", label: "Großbritannien (UK)" },
    Marketplace { code: "us", domain: "amazon.com", label: "USA (US)" },
    Marketplace { code: "be", domain: "amazon.com.be", label: "Belgien (BE)" },
];

/// Domains whose prices use `.` as the decimal separator
const DOT_DECIMAL_DOMAINS: &[&str] = &["amazon.com", "amazon.co.uk"];

impl Marketplace {
    /// Resolve by country code or by domain (case-insensitive, optional `www.`)
    pub fn lookup(value: &str) -> Option<Self> {
        let needle = value.trim().to_lowercase();
        let needle = needle.strip_prefix("www.").unwrap_or(&needle);
        MARKETPLACES
            .iter()
            .find(|m| m.code == needle || m.domain == needle)
            .copied()
    }

    /// Product detail page for an identifier
    pub fn product_url(&self, identifier: &str) -> String {
        format!("https://www.{}/dp/{}/", self.domain, identifier)
    }

    /// Account landing page, only reachable when signed in
    pub fn account_url(&self) -> String {
        format!("https://www.{}/gp/css/homepage.html", self.domain)
    }

    pub fn decimal_separator(&self) -> char {
        decimal_separator_for(self.domain)
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        MARKETPLACES[0]
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.label, self.domain)
    }
}

/// `.` for the dot-decimal allow-list (suffix match), `,` everywhere else.
pub fn decimal_separator_for(domain: &str) -> char {
    let domain = domain.trim().to_lowercase();
    if DOT_DECIMAL_DOMAINS.iter().any(|d| domain.ends_with(d)) {
        '.'
    } else {
        ','
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("de", "amazon.de")]
    #[case("UK", "amazon.co.uk")]
    #[case("www.amazon.com", "amazon.com")]
    #[case("amazon.com.be", "amazon.com.be")]
    fn test_lookup(#[case] input: &str, #[case] domain: &str) {
        assert_eq!(Marketplace::lookup(input).unwrap().domain, domain);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(Marketplace::lookup("amazon.xyz").is_none());
    }

    #[rstest]
    #[case("amazon.com", '.')]
    #[case("amazon.co.uk", '.')]
    #[case("amazon.de", ',')]
    #[case("amazon.com.be", ',')]
    #[case("smile.amazon.com", '.')]
    fn test_decimal_separator(#[case] domain: &str, #[case] expected: char) {
        assert_eq!(decimal_separator_for(domain), expected);
    }

    #[test]
    fn test_product_url() {
        let m = Marketplace::lookup("fr").unwrap();
        assert_eq!(m.product_url("B000TEST01"), "https://www.amazon.fr/dp/B000TEST01/");
    }
}
