pub mod error;
pub mod handlers;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/analyze-style", post(handlers::analyze_style))
        .route("/api/gifts", post(handlers::recommend_gifts))
        .route("/api/analyze", post(handlers::analyze_grid))
        .route("/api/fashion-preferences", post(handlers::fashion_preferences))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    info!("Shutdown signal received, draining connections");
}

pub async fn run_server(listen_addr: &str, app: Router) -> Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid LISTEN_ADDR {listen_addr:?}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Grid recommender listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::{json, Value};

    use super::*;
    use crate::error::PipelineError;
    use crate::llm::{CompletionProvider, CompletionRequest};
    use crate::pipeline::tests::{test_settings, ScriptedProvider, THREE_PIECES};
    use crate::pipeline::Pipeline;

    fn scripted() -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new(|request| match request.operation {
            "style_analysis" => Ok(THREE_PIECES.to_string()),
            "price_estimate" => Ok(
                "{\"estimated_price\": 95, \"price_range\": {\"min\": 80, \"max\": 110}}".to_string(),
            ),
            "gift_idea" => Ok("not json".to_string()),
            "fashion_preferences" => Ok(
                "```json\n{\"color_palette\": [\"sage\"], \"style_categories\": [\"minimalist\"]}\n```"
                    .to_string(),
            ),
            other => Ok(format!("unexpected {other}")),
        }))
    }

    struct SlowProvider;

    #[async_trait]
    impl CompletionProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, PipelineError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    async fn spawn_app(provider: Arc<dyn CompletionProvider>, deadline: Duration) -> String {
        let state = AppState {
            pipeline: Arc::new(Pipeline::new(provider, test_settings())),
            request_deadline: deadline,
        };
        let app = build_router(state, 1024 * 1024);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn data_url() -> String {
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(b"pretend screenshot")
        )
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let base = spawn_app(scripted(), Duration::from_secs(10)).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn analyze_style_returns_linked_recommendations() {
        let base = spawn_app(scripted(), Duration::from_secs(10)).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/analyze-style"))
            .json(&json!({ "image": data_url(), "budgetTier": "medium" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        let recommendations = body["recommendations"].as_array().unwrap();
        assert_eq!(recommendations.len(), 3);
        for recommendation in recommendations {
            assert!(!recommendation["name"].as_str().unwrap().is_empty());
            for link in recommendation["shopLinks"].as_object().unwrap().values() {
                assert!(url::Url::parse(link.as_str().unwrap()).is_ok());
            }
        }
        assert_eq!(recommendations[0]["name"], "Camel coat");
        assert_eq!(recommendations[0]["price"], 95.0);
        assert_eq!(
            recommendations[0]["shopLinks"]["amazon"],
            "https://www.amazon.com/s?k=Camel+coat&rh=p_36%3A8000-11000"
        );
        assert_eq!(body["aesthetic"], "Quiet luxury");
        assert_eq!(body["stylingTips"], json!(["Tonal layering"]));
    }

    #[tokio::test]
    async fn analyze_style_rejects_missing_or_bad_input() {
        let base = spawn_app(scripted(), Duration::from_secs(10)).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/analyze-style"))
            .json(&json!({ "budgetTier": "luxury" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "No image provided");

        let response = client
            .post(format!("{base}/api/analyze-style"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn gifts_accept_multipart_forms() {
        let base = spawn_app(scripted(), Duration::from_secs(10)).await;
        let form = reqwest::multipart::Form::new()
            .text("age", "30")
            .text("budget", "50")
            .text("interests", "tea, yoga");
        let response = reqwest::Client::new()
            .post(format!("{base}/api/gifts"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        let recommendations = body["recommendations"].as_array().unwrap();
        assert_eq!(recommendations.len(), 2);
        assert_eq!(recommendations[0]["name"], "Tea Gift Set");
        assert_eq!(
            recommendations[1]["shopLinks"]["etsy"],
            "https://www.etsy.com/search?q=yoga+gift"
        );
    }

    #[tokio::test]
    async fn gifts_require_age_and_budget() {
        let base = spawn_app(scripted(), Duration::from_secs(10)).await;
        let form = reqwest::multipart::Form::new()
            .text("budget", "50")
            .part(
                "instagram-grid",
                reqwest::multipart::Part::bytes(b"grid".to_vec()).file_name("grid.png"),
            );
        let response = reqwest::Client::new()
            .post(format!("{base}/api/analyze"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Age and budget are required");
    }

    #[tokio::test]
    async fn analyze_requires_the_grid_image() {
        let base = spawn_app(scripted(), Duration::from_secs(10)).await;
        let client = reqwest::Client::new();

        let form = reqwest::multipart::Form::new()
            .text("age", "30")
            .text("budget", "50");
        let response = client
            .post(format!("{base}/api/analyze"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Missing required fields");

        let form = reqwest::multipart::Form::new()
            .text("age", "30")
            .text("budget", "50")
            .text("interests", "tea")
            .part(
                "instagram-grid",
                reqwest::multipart::Part::bytes(b"grid".to_vec()).file_name("grid.png"),
            );
        let response = client
            .post(format!("{base}/api/analyze"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert!(!body["recommendations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fashion_preferences_wraps_analysis() {
        let base = spawn_app(scripted(), Duration::from_secs(10)).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/fashion-preferences"))
            .json(&json!({ "imageUrl": data_url() }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["analysis"]["color_palette"], json!(["sage"]));
    }

    #[tokio::test]
    async fn slow_requests_hit_the_deadline() {
        let base = spawn_app(Arc::new(SlowProvider), Duration::from_millis(100)).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/analyze-style"))
            .json(&json!({ "image": data_url() }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 504);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("too long"));
    }
}
