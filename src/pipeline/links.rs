use std::collections::BTreeMap;

use tracing::warn;
use url::Url;

use crate::pipeline::types::PriceRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retailer {
    Amazon,
    Nordstrom,
    Asos,
    Etsy,
}

pub const STYLE_RETAILERS: [Retailer; 3] = [Retailer::Amazon, Retailer::Nordstrom, Retailer::Asos];
pub const GIFT_RETAILERS: [Retailer; 2] = [Retailer::Amazon, Retailer::Etsy];

fn format_price(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn to_cents(value: f64) -> u64 {
    (value.max(0.0) * 100.0).round() as u64
}

impl Retailer {
    pub fn key(self) -> &'static str {
        match self {
            Retailer::Amazon => "amazon",
            Retailer::Nordstrom => "nordstrom",
            Retailer::Asos => "asos",
            Retailer::Etsy => "etsy",
        }
    }

    fn base_url(self) -> &'static str {
        match self {
            Retailer::Amazon => "https://www.amazon.com/s",
            Retailer::Nordstrom => "https://www.nordstrom.com/sr",
            Retailer::Asos => "https://www.asos.com/us/search/",
            Retailer::Etsy => "https://www.etsy.com/search",
        }
    }

    fn query_params(self, query: &str, range: Option<&PriceRange>) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        match self {
            Retailer::Amazon => {
                params.push(("k", query.to_string()));
                if let Some(range) = range {
                    params.push((
                        "rh",
                        format!("p_36:{}-{}", to_cents(range.min), to_cents(range.max)),
                    ));
                }
            }
            Retailer::Nordstrom | Retailer::Asos => {
                let key = if self == Retailer::Nordstrom { "keyword" } else { "q" };
                params.push((key, query.to_string()));
                if let Some(range) = range {
                    params.push((
                        "price",
                        format!("{}-{}", format_price(range.min), format_price(range.max)),
                    ));
                }
            }
            Retailer::Etsy => {
                params.push(("q", query.to_string()));
                if let Some(range) = range {
                    params.push(("min_price", format_price(range.min)));
                    params.push(("max_price", format_price(range.max)));
                }
            }
        }
        params
    }

    /// Search URL for `query`, optionally filtered to `range` (dollars).
    pub fn search_url(self, query: &str, range: Option<&PriceRange>) -> Result<Url, url::ParseError> {
        Url::parse_with_params(self.base_url(), self.query_params(query, range))
    }
}

/// Builds one search URL per retailer; retailers whose URL cannot be built are skipped.
pub fn build_shop_links(
    query: &str,
    retailers: &[Retailer],
    range: Option<&PriceRange>,
) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    for retailer in retailers {
        match retailer.search_url(query, range) {
            Ok(url) => {
                links.insert(retailer.key().to_string(), url.to_string());
            }
            Err(err) => warn!("Skipping {} link for {:?}: {}", retailer.key(), query, err),
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_links_carry_price_filters() {
        let range = PriceRange { min: 240.0, max: 360.0 };
        let links = build_shop_links("wool scarf", &STYLE_RETAILERS, Some(&range));

        assert_eq!(
            links["amazon"],
            "https://www.amazon.com/s?k=wool+scarf&rh=p_36%3A24000-36000"
        );
        assert_eq!(
            links["nordstrom"],
            "https://www.nordstrom.com/sr?keyword=wool+scarf&price=240-360"
        );
        assert_eq!(
            links["asos"],
            "https://www.asos.com/us/search/?q=wool+scarf&price=240-360"
        );
        assert!(!links.contains_key("etsy"));
    }

    #[test]
    fn gift_links_have_no_price_filter() {
        let links = build_shop_links("coffee gift", &GIFT_RETAILERS, None);
        assert_eq!(links.len(), 2);
        assert_eq!(links["amazon"], "https://www.amazon.com/s?k=coffee+gift");
        assert_eq!(links["etsy"], "https://www.etsy.com/search?q=coffee+gift");
    }

    #[test]
    fn reserved_characters_are_encoded() {
        let links = build_shop_links("Tom & Jerry #1 100%/blue?", &GIFT_RETAILERS, None);
        let amazon = Url::parse(&links["amazon"]).unwrap();
        let (key, value) = amazon.query_pairs().next().unwrap();
        assert_eq!(key, "k");
        assert_eq!(value, "Tom & Jerry #1 100%/blue?");
        assert!(!links["amazon"].contains('#'));
        assert!(!links["amazon"].contains(" "));
    }

    #[test]
    fn fractional_prices_keep_cents() {
        let range = PriceRange { min: 19.5, max: 40.0 };
        let url = Retailer::Etsy.search_url("mug", Some(&range)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.etsy.com/search?q=mug&min_price=19.50&max_price=40"
        );
        let url = Retailer::Amazon.search_url("mug", Some(&range)).unwrap();
        assert!(url.as_str().ends_with("rh=p_36%3A1950-4000"));
    }
}
