use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::pipeline::links::Retailer;
use crate::pipeline::types::ProductMatch;
use crate::retail::ProductLookup;
use crate::utils::http::get_http_client;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static RESULT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[data-component-type="s-search-result"][data-asin]"#)
        .expect("valid result selector")
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2 span").expect("valid title selector"));
static PRICE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.a-price > span.a-offscreen").expect("valid price selector"));

/// Scrapes the first organic Amazon search result for a query.
pub struct AmazonSearchScraper {
    client: Client,
    timeout: Duration,
}

impl AmazonSearchScraper {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: get_http_client().clone(),
            timeout,
        }
    }

    async fn fetch_page(&self, url: Url) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    cleaned.parse::<f64>().ok()
}

/// First search result with an ASIN and a title.
pub fn parse_search_results(html: &str) -> Option<ProductMatch> {
    let document = Html::parse_document(html);

    for result in document.select(&RESULT_SELECTOR) {
        let asin = result.value().attr("data-asin").unwrap_or("").trim();
        if asin.is_empty() {
            continue;
        }
        let Some(name) = result
            .select(&TITLE_SELECTOR)
            .map(element_text)
            .find(|text| !text.is_empty())
        else {
            continue;
        };
        let price = result
            .select(&PRICE_SELECTOR)
            .next()
            .and_then(|element| parse_price(&element_text(element)));

        return Some(ProductMatch {
            name,
            price,
            url: format!("https://www.amazon.com/dp/{asin}"),
        });
    }

    None
}

#[async_trait]
impl ProductLookup for AmazonSearchScraper {
    fn name(&self) -> &str {
        "amazon"
    }

    async fn best_match(&self, query: &str) -> Option<ProductMatch> {
        let url = match Retailer::Amazon.search_url(query, None) {
            Ok(url) => url,
            Err(err) => {
                warn!("Could not build Amazon search URL for {:?}: {}", query, err);
                return None;
            }
        };
        let html = match self.fetch_page(url).await {
            Ok(html) => html,
            Err(err) => {
                warn!("Amazon lookup for {:?} failed: {}", query, err);
                return None;
            }
        };

        let found = parse_search_results(&html);
        debug!(
            "Amazon lookup for {:?}: {}",
            query,
            found.as_ref().map(|m| m.name.as_str()).unwrap_or("no match")
        );
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <html><body>
          <div data-component-type="s-search-result" data-asin="">
            <h2><span>Sponsored placeholder</span></h2>
          </div>
          <div data-component-type="s-search-result" data-asin="B0TEST1234">
            <h2><a><span>Chunky   Knit Wool Scarf</span></a></h2>
            <span class="a-price"><span class="a-offscreen">$1,049.99</span></span>
          </div>
          <div data-component-type="s-search-result" data-asin="B0OTHER">
            <h2><span>Second result</span></h2>
          </div>
        </body></html>
    "#;

    #[test]
    fn picks_first_result_with_asin() {
        let found = parse_search_results(SAMPLE).unwrap();
        assert_eq!(found.name, "Chunky Knit Wool Scarf");
        assert_eq!(found.price, Some(1049.99));
        assert_eq!(found.url, "https://www.amazon.com/dp/B0TEST1234");
    }

    #[test]
    fn missing_price_is_none() {
        let html = r#"<div data-component-type="s-search-result" data-asin="B1"><h2><span>Mug</span></h2></div>"#;
        let found = parse_search_results(html).unwrap();
        assert_eq!(found.price, None);
    }

    #[test]
    fn unrelated_markup_yields_nothing() {
        assert!(parse_search_results("<html><p>Robot check</p></html>").is_none());
        assert!(parse_search_results("").is_none());
    }
}
