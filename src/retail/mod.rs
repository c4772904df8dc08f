pub mod amazon;

use async_trait::async_trait;

use crate::pipeline::types::ProductMatch;

pub use amazon::AmazonSearchScraper;

/// Looks up a concrete product for a search query.
///
/// Lookups are best effort: any network or markup problem yields `None`.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    fn name(&self) -> &str;

    async fn best_match(&self, query: &str) -> Option<ProductMatch>;
}
