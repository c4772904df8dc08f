use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use tracing::{info, warn};

mod config;
mod error;
mod llm;
mod pipeline;
mod retail;
mod server;
mod state;
mod utils;

use llm::OpenAiProvider;
use pipeline::Pipeline;
use retail::AmazonSearchScraper;
use state::AppState;
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = config::init()?;
    let _guards = init_logging(config);
    for message in &config.warnings {
        warn!("{}", message);
    }

    let settings = config.pipeline_settings();
    info!(
        "Starting grid recommender: vision_model={}, text_model={}, gift_model={}, price_mode={:?}, failure_policy={:?}",
        settings.style_profile.model,
        settings.price_profile.model,
        settings.gift_profile.model,
        settings.price_mode,
        settings.failure_policy
    );

    let provider = Arc::new(OpenAiProvider::new(config.provider_settings()));
    let mut pipeline = Pipeline::new(provider, settings);
    if config.enable_retailer_scrape {
        info!("Retailer product lookup enabled");
        pipeline = pipeline.with_lookup(Arc::new(AmazonSearchScraper::new(
            std::time::Duration::from_secs(config.retailer_scrape_timeout_seconds),
        )));
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
        request_deadline: config.request_deadline(),
    };
    let app = server::build_router(state, config.body_limit_bytes());
    server::run_server(&config.listen_addr, app).await
}
