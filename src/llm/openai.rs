use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::ProviderSettings;
use crate::error::PipelineError;
use crate::llm::provider::{CompletionProvider, CompletionRequest};
use crate::utils::http::get_http_client;
use crate::utils::text::truncate_for_log;
use crate::utils::timing::log_llm_timing;

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiProvider {
    settings: ProviderSettings,
    client: Client,
    permits: Arc<Semaphore>,
}

impl OpenAiProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_calls.max(1)));
        Self {
            settings,
            client: get_http_client().clone(),
            permits,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn redact(&self, text: &str) -> String {
        let key = self.settings.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1) as u32;
        self.settings.retry_base_delay.saturating_mul(attempt)
    }

    async fn post_with_retry(&self, payload: &Value) -> Result<Value, PipelineError> {
        let url = self.endpoint();
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.settings.api_key)
                .timeout(self.settings.timeout)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact(&err.to_string());
                    let should_retry = should_retry_error(&err) && attempt < max_attempts;
                    warn!(
                        "Completion request failed to send: {} (timeout={}, connect={}, attempt={}/{}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        attempt,
                        max_attempts,
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(self.retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(PipelineError::Provider(err_text));
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let should_retry = should_retry_status(status) && attempt < max_attempts;
                warn!(
                    "Completion API error: status={}, body={}, retrying={}",
                    status,
                    self.redact(&body_summary),
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(self.retry_delay(attempt)).await;
                    continue;
                }
                let detail = self.redact(&message.unwrap_or(body_summary));
                return Err(PipelineError::Provider(format!(
                    "status {}: {}",
                    status, detail
                )));
            }

            return response
                .json::<Value>()
                .await
                .map_err(|err| PipelineError::Provider(format!("invalid response body: {err}")));
        }
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn build_user_content(request: &CompletionRequest) -> Value {
    if request.images.is_empty() {
        return Value::String(request.prompt.clone());
    }

    let mut parts = vec![json!({ "type": "text", "text": request.prompt })];
    for image in &request.images {
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": image.to_data_url() }
        }));
    }
    Value::Array(parts)
}

pub(crate) fn build_payload(request: &CompletionRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system_prompt) = &request.system_prompt {
        messages.push(json!({ "role": "system", "content": system_prompt }));
    }
    messages.push(json!({ "role": "user", "content": build_user_content(request) }));

    json!({
        "model": request.profile.model,
        "messages": messages,
        "temperature": request.profile.temperature,
        "max_tokens": request.profile.max_tokens,
    })
}

pub(crate) fn extract_completion_text(response: &Value) -> String {
    response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError> {
        let payload = build_payload(&request);
        let metadata = json!({ "images": request.images.len() });

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|err| PipelineError::Provider(format!("call limiter closed: {err}")))?;

        debug!(
            "Completion request: model={}, operation={}, images={}, prompt_chars={}",
            request.profile.model,
            request.operation,
            request.images.len(),
            request.prompt.chars().count()
        );

        log_llm_timing(
            self.name(),
            &request.profile.model,
            request.operation,
            Some(metadata),
            || async {
                let response = self.post_with_retry(&payload).await?;
                let text = extract_completion_text(&response);
                if text.is_empty() {
                    warn!(
                        "Completion for {} had empty content: {}",
                        request.operation,
                        truncate_for_log(&response.to_string(), 1000)
                    );
                }
                Ok::<String, PipelineError>(text)
            },
        )
        .await
    }
}
