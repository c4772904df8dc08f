use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("grid-recommender/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// Shared outbound client; callers set per-request timeouts.
pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
