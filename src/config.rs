use std::env;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::OnceCell;
use crate::llm::ModelProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceEstimationMode {
    /// One extra completion per key piece.
    PerItem,
    /// Prices requested inside the style-analysis completion.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFailurePolicy {
    /// Failed per-item calls fall back to heuristic values.
    Substitute,
    /// Failed per-item calls drop the item from the batch.
    Omit,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: usize,
    pub retry_base_delay: Duration,
    pub max_concurrent_calls: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub style_profile: ModelProfile,
    pub price_profile: ModelProfile,
    pub interest_profile: ModelProfile,
    pub gift_profile: ModelProfile,
    pub fashion_profile: ModelProfile,
    pub price_mode: PriceEstimationMode,
    pub failure_policy: ItemFailurePolicy,
    pub fanout_concurrency: usize,
    pub call_timeout: Duration,
    pub item_timeout: Duration,
    pub gift_interest_limit: usize,
    pub shuffle_interests: bool,
    pub max_image_dimension: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: String,
    pub listen_addr: String,
    pub body_limit_kb: usize,
    pub request_deadline_seconds: u64,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub gift_model: String,
    pub style_temperature: f32,
    pub style_max_tokens: u32,
    pub price_temperature: f32,
    pub price_max_tokens: u32,
    pub interest_max_tokens: u32,
    pub gift_temperature: f32,
    pub gift_max_tokens: u32,
    pub fashion_model: String,
    pub fashion_max_tokens: u32,
    pub model_timeout_seconds: u64,
    pub model_max_retry_attempts: usize,
    pub model_retry_base_delay_ms: u64,
    pub max_concurrent_model_calls: usize,
    pub fanout_concurrency: usize,
    pub item_timeout_seconds: u64,
    pub price_estimation_mode: PriceEstimationMode,
    pub item_failure_policy: ItemFailurePolicy,
    pub gift_interest_limit: usize,
    pub shuffle_interests: bool,
    pub max_image_dimension: u32,
    pub enable_retailer_scrape: bool,
    pub retailer_scrape_timeout_seconds: u64,
    /// Problems found while reading the environment, logged once logging is up.
    pub warnings: Vec<String>,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Loads the process-wide configuration on first use and returns it afterwards.
pub fn init() -> Result<&'static Config> {
    CONFIG.get_or_try_init(Config::load)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str, default: &str) -> String {
        (self.lookup)(name).unwrap_or_else(|| default.to_string())
    }

    fn bool(&self, name: &str, default: bool) -> bool {
        (self.lookup)(name)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    fn f32(&self, name: &str, default: f32) -> f32 {
        (self.lookup)(name)
            .and_then(|value| value.trim().parse::<f32>().ok())
            .unwrap_or(default)
    }

    fn u32(&self, name: &str, default: u32) -> u32 {
        (self.lookup)(name)
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(default)
    }

    fn u64(&self, name: &str, default: u64) -> u64 {
        (self.lookup)(name)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(default)
    }

    fn usize(&self, name: &str, default: usize) -> usize {
        (self.lookup)(name)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(default)
    }
}

fn parse_price_mode(value: &str, warnings: &mut Vec<String>) -> PriceEstimationMode {
    match value.trim().to_lowercase().as_str() {
        "per_item" | "per-item" | "separate" => PriceEstimationMode::PerItem,
        "inline" | "folded" => PriceEstimationMode::Inline,
        other => {
            warnings.push(format!(
                "Unknown PRICE_ESTIMATION_MODE value '{other}'; defaulting to per_item."
            ));
            PriceEstimationMode::PerItem
        }
    }
}

fn parse_failure_policy(value: &str, warnings: &mut Vec<String>) -> ItemFailurePolicy {
    match value.trim().to_lowercase().as_str() {
        "substitute" | "fallback" => ItemFailurePolicy::Substitute,
        "omit" | "drop" => ItemFailurePolicy::Omit,
        other => {
            warnings.push(format!(
                "Unknown ITEM_FAILURE_POLICY value '{other}'; defaulting to substitute."
            ));
            ItemFailurePolicy::Substitute
        }
    }
}

/// Longest a single provider call may take, retries and backoff included.
fn worst_case_call(timeout: Duration, attempts: usize, base_delay: Duration) -> Duration {
    let attempts = attempts.max(1) as u32;
    let backoff: u32 = (1..attempts).sum();
    timeout.saturating_mul(attempts) + base_delay.saturating_mul(backoff)
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = Self::from_lookup(|name| env::var(name).ok());
        if config.openai_api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("OPENAI_API_KEY is required"));
        }
        Ok(config)
    }

    /// Builds a configuration from an arbitrary key lookup; missing keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let mut warnings = Vec::new();
        let text_model = env.string("TEXT_MODEL", "gpt-4o");
        let vision_model = env.string("VISION_MODEL", "gpt-4o");

        let mut config = Config {
            log_level: env.string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: env.string("LOG_DIR", "logs"),
            listen_addr: env.string("LISTEN_ADDR", "0.0.0.0:3000"),
            body_limit_kb: env.usize("BODY_LIMIT_KB", 10 * 1024),
            request_deadline_seconds: env.u64("REQUEST_DEADLINE_SECONDS", 120),
            openai_api_key: env.string("OPENAI_API_KEY", ""),
            openai_base_url: env.string("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            fashion_model: env.string("FASHION_MODEL", &vision_model),
            vision_model,
            gift_model: env.string("GIFT_MODEL", "gpt-4"),
            text_model,
            style_temperature: env.f32("STYLE_TEMPERATURE", 0.7),
            style_max_tokens: env.u32("STYLE_MAX_TOKENS", 1000),
            price_temperature: env.f32("PRICE_TEMPERATURE", 0.7),
            price_max_tokens: env.u32("PRICE_MAX_TOKENS", 300),
            interest_max_tokens: env.u32("INTEREST_MAX_TOKENS", 300),
            gift_temperature: env.f32("GIFT_TEMPERATURE", 0.7),
            gift_max_tokens: env.u32("GIFT_MAX_TOKENS", 400),
            fashion_max_tokens: env.u32("FASHION_MAX_TOKENS", 1000),
            model_timeout_seconds: env.u64("MODEL_TIMEOUT_SECONDS", 20).max(1),
            model_max_retry_attempts: env.usize("MODEL_MAX_RETRY_ATTEMPTS", 2).max(1),
            model_retry_base_delay_ms: env.u64("MODEL_RETRY_BASE_DELAY_MS", 900),
            max_concurrent_model_calls: env.usize("MAX_CONCURRENT_MODEL_CALLS", 8).max(1),
            fanout_concurrency: env.usize("FANOUT_CONCURRENCY", 5).max(1),
            item_timeout_seconds: env.u64("ITEM_TIMEOUT_SECONDS", 60),
            price_estimation_mode: parse_price_mode(
                &env.string("PRICE_ESTIMATION_MODE", "per_item"),
                &mut warnings,
            ),
            item_failure_policy: parse_failure_policy(
                &env.string("ITEM_FAILURE_POLICY", "substitute"),
                &mut warnings,
            ),
            gift_interest_limit: env.usize("GIFT_INTEREST_LIMIT", 3).max(1),
            shuffle_interests: env.bool("SHUFFLE_INTERESTS", true),
            max_image_dimension: env.u32("MAX_IMAGE_DIMENSION", 1024).max(64),
            enable_retailer_scrape: env.bool("ENABLE_RETAILER_SCRAPE", false),
            retailer_scrape_timeout_seconds: env.u64("RETAILER_SCRAPE_TIMEOUT_SECONDS", 15),
            warnings,
        };
        config.enforce_timeout_order();
        config
    }

    /// Raises the item timeout and request deadline so that a call that
    /// exhausts its retries still finishes inside both.
    fn enforce_timeout_order(&mut self) {
        let call_secs = self.call_timeout().as_secs_f64().ceil() as u64;
        let lookup_secs = if self.enable_retailer_scrape {
            self.retailer_scrape_timeout_seconds
        } else {
            0
        };

        let min_item = call_secs + lookup_secs + 1;
        if self.item_timeout_seconds < min_item {
            self.warnings.push(format!(
                "ITEM_TIMEOUT_SECONDS={} is shorter than a retried model call; raising to {}.",
                self.item_timeout_seconds, min_item
            ));
            self.item_timeout_seconds = min_item;
        }

        let min_deadline = call_secs + self.item_timeout_seconds + 1;
        if self.request_deadline_seconds < min_deadline {
            self.warnings.push(format!(
                "REQUEST_DEADLINE_SECONDS={} leaves no room for fallbacks; raising to {}.",
                self.request_deadline_seconds, min_deadline
            ));
            self.request_deadline_seconds = min_deadline;
        }
    }

    /// Upper bound on one provider call including every retry.
    pub fn call_timeout(&self) -> Duration {
        worst_case_call(
            Duration::from_secs(self.model_timeout_seconds),
            self.model_max_retry_attempts,
            Duration::from_millis(self.model_retry_base_delay_ms),
        )
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            timeout: Duration::from_secs(self.model_timeout_seconds),
            max_attempts: self.model_max_retry_attempts,
            retry_base_delay: Duration::from_millis(self.model_retry_base_delay_ms),
            max_concurrent_calls: self.max_concurrent_model_calls,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            style_profile: ModelProfile::new(
                &self.vision_model,
                self.style_temperature,
                self.style_max_tokens,
            ),
            price_profile: ModelProfile::new(
                &self.text_model,
                self.price_temperature,
                self.price_max_tokens,
            ),
            interest_profile: ModelProfile::new(
                &self.vision_model,
                self.style_temperature,
                self.interest_max_tokens,
            ),
            gift_profile: ModelProfile::new(
                &self.gift_model,
                self.gift_temperature,
                self.gift_max_tokens,
            ),
            fashion_profile: ModelProfile::new(
                &self.fashion_model,
                self.style_temperature,
                self.fashion_max_tokens,
            ),
            price_mode: self.price_estimation_mode,
            failure_policy: self.item_failure_policy,
            fanout_concurrency: self.fanout_concurrency,
            call_timeout: self.call_timeout(),
            item_timeout: Duration::from_secs(self.item_timeout_seconds),
            gift_interest_limit: self.gift_interest_limit,
            shuffle_interests: self.shuffle_interests,
            max_image_dimension: self.max_image_dimension,
        }
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_seconds)
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_kb.saturating_mul(1024)
    }
}
