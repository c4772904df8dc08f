pub mod assemble;
pub mod fallback;
pub mod interests;
pub mod links;
pub mod normalize;
pub mod prompts;
pub mod types;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ItemFailurePolicy, PipelineSettings, PriceEstimationMode};
use crate::error::PipelineError;
use crate::llm::media::prepare_image;
use crate::llm::{CompletionProvider, CompletionRequest};
use crate::retail::ProductLookup;

use self::assemble::map_ordered;
use self::links::{build_shop_links, GIFT_RETAILERS, STYLE_RETAILERS};
use self::normalize::{normalize, parse_completion, report_fallback};
use self::types::{
    AnalysisRequest, BudgetTier, FashionPreferences, GiftIdea, GiftRequest, KeyPiece,
    PriceEstimate, ProductMatch, Recommendation, StyleResponse,
};

/// Screenshot in, recommendations out.
///
/// Provider failures and malformed completions never surface to callers;
/// they are replaced with fallback values or, under
/// [`ItemFailurePolicy::Omit`], drop the affected item.
pub struct Pipeline {
    provider: Arc<dyn CompletionProvider>,
    lookup: Option<Arc<dyn ProductLookup>>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: PipelineSettings) -> Self {
        Self {
            provider,
            lookup: None,
            settings,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn ProductLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Provider call bounded by the retry-inclusive call budget; expiry is a
    /// provider failure like any other.
    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError> {
        let operation = request.operation;
        let limit = self.settings.call_timeout;
        match tokio::time::timeout(limit, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Provider(format!(
                "{operation} timed out after {limit:?}"
            ))),
        }
    }

    /// Completion text, or an empty string when the provider failed.
    async fn complete_lossy(&self, request: CompletionRequest) -> String {
        let operation = request.operation;
        match self.complete(request).await {
            Ok(text) => text,
            Err(err) => {
                warn!("{} completion failed: {}", operation, err);
                String::new()
            }
        }
    }

    async fn lookup_product(&self, query: &str) -> Option<ProductMatch> {
        match &self.lookup {
            Some(lookup) => {
                debug!("Looking up {:?} via {}", query, lookup.name());
                lookup.best_match(query).await
            }
            None => None,
        }
    }

    pub async fn recommend_styles(
        &self,
        request: AnalysisRequest,
    ) -> Result<StyleResponse, PipelineError> {
        if request.image_data.is_empty() {
            return Err(PipelineError::MissingInput("image".to_string()));
        }

        let tier = request.budget_tier;
        let inline_prices = self.settings.price_mode == PriceEstimationMode::Inline;
        let image = prepare_image(request.image_data, self.settings.max_image_dimension);
        let prompt = prompts::style_analysis(tier, &request.interests, inline_prices);
        let completion = CompletionRequest::new("style_analysis", prompt, &self.settings.style_profile)
            .with_image(image);

        let raw = self.complete_lossy(completion).await;
        let analysis = normalize(&raw, || fallback::style_analysis(tier));
        info!(
            "Style analysis: tier={}, key_pieces={}, inline_prices={}",
            tier,
            analysis.key_pieces.len(),
            inline_prices
        );

        let recommendations = map_ordered(
            "style",
            analysis.key_pieces,
            self.settings.fanout_concurrency,
            self.settings.item_timeout,
            |_, piece| self.style_recommendation(piece, tier, inline_prices),
        )
        .await;

        let mut color_palette = analysis.color_palette.primary;
        color_palette.extend(analysis.color_palette.accent);

        Ok(StyleResponse {
            recommendations,
            aesthetic: analysis.overall_aesthetic,
            color_palette,
            styling_tips: analysis.styling_patterns,
        })
    }

    async fn estimate_price(
        &self,
        piece: &KeyPiece,
        tier: BudgetTier,
    ) -> Result<PriceEstimate, PipelineError> {
        let prompt = prompts::price_estimate(&piece.item, &piece.style_elements, tier);
        let request = CompletionRequest::new("price_estimate", prompt, &self.settings.price_profile);

        match self.complete(request).await {
            Ok(raw) => Ok(normalize(&raw, || fallback::price_estimate(tier))),
            Err(err) => match self.settings.failure_policy {
                ItemFailurePolicy::Substitute => {
                    warn!("Price estimate for {:?} failed, using heuristic: {}", piece.item, err);
                    Ok(fallback::price_estimate(tier))
                }
                ItemFailurePolicy::Omit => Err(err),
            },
        }
    }

    async fn style_recommendation(
        &self,
        piece: KeyPiece,
        tier: BudgetTier,
        inline_prices: bool,
    ) -> Result<Recommendation, PipelineError> {
        let estimate = if inline_prices {
            piece
                .price_estimate
                .clone()
                .unwrap_or_else(|| fallback::price_estimate(tier))
        } else {
            self.estimate_price(&piece, tier).await?
        };

        let shop_links = build_shop_links(&piece.item, &STYLE_RETAILERS, Some(&estimate.price_range));
        let product_match = self.lookup_product(&piece.item).await;

        let description = [piece.description.trim(), estimate.reasoning.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let match_reason = if piece.style_elements.trim().is_empty() {
            "Matches the style in your grid".to_string()
        } else {
            piece.style_elements.trim().to_string()
        };

        Ok(Recommendation {
            name: piece.item,
            price: Some(estimate.estimated_price),
            description,
            match_reason,
            shop_links,
            product_match,
        })
    }

    async fn extract_interests(&self, image_data: Vec<u8>) -> Vec<String> {
        let image = prepare_image(image_data, self.settings.max_image_dimension);
        let request = CompletionRequest::new(
            "interest_extraction",
            prompts::interest_extraction(),
            &self.settings.interest_profile,
        )
        .with_image(image);

        let raw = self.complete_lossy(request).await;
        interests::parse_interest_lines(&raw)
    }

    pub async fn recommend_gifts(
        &self,
        request: GiftRequest,
    ) -> Result<Vec<Recommendation>, PipelineError> {
        if request.age == 0 {
            return Err(PipelineError::MissingInput("age".to_string()));
        }
        if !request.budget.is_finite() || request.budget <= 0.0 {
            return Err(PipelineError::MissingInput("budget".to_string()));
        }

        let mut candidates: Vec<String> = request
            .interests
            .iter()
            .map(|interest| interest.trim().to_lowercase())
            .filter(|interest| !interest.is_empty())
            .collect();
        if let Some(image_data) = request.image_data.filter(|bytes| !bytes.is_empty()) {
            candidates.extend(self.extract_interests(image_data).await);
        }
        if candidates.is_empty() {
            candidates = interests::fallback_interests();
        }

        let adjusted = interests::adjust_interests_by_age(candidates, request.age);
        let selected = interests::select_interests(
            adjusted,
            self.settings.gift_interest_limit,
            self.settings.shuffle_interests,
        );
        info!(
            "Gift interests for age {}: {}",
            request.age,
            selected.join(", ")
        );

        let (age, budget) = (request.age, request.budget);
        Ok(map_ordered(
            "gift",
            selected,
            self.settings.fanout_concurrency,
            self.settings.item_timeout,
            |_, interest| self.gift_recommendation(interest, age, budget),
        )
        .await)
    }

    async fn gift_recommendation(
        &self,
        interest: String,
        age: u32,
        budget: f64,
    ) -> Result<Recommendation, PipelineError> {
        let request = CompletionRequest::new(
            "gift_idea",
            prompts::gift_user(age, budget, &interest),
            &self.settings.gift_profile,
        )
        .with_system_prompt(prompts::gift_system());

        let parsed = match self.complete(request).await {
            Ok(raw) => parse_completion::<GiftIdea>(&raw).map_err(|err| {
                report_fallback::<GiftIdea>(&raw, &err);
                err
            }),
            Err(err) => match self.settings.failure_policy {
                ItemFailurePolicy::Substitute => {
                    warn!("Gift idea for {:?} failed, using fallback: {}", interest, err);
                    Err(err)
                }
                ItemFailurePolicy::Omit => return Err(err),
            },
        };

        let (idea, query) = match parsed {
            Ok(idea) => {
                let query = idea.name.clone();
                (idea, query)
            }
            Err(_) => (
                fallback::gift_idea(&interest, budget),
                format!("{interest} gift"),
            ),
        };

        let shop_links = build_shop_links(&query, &GIFT_RETAILERS, None);
        let product_match = self.lookup_product(&query).await;

        Ok(Recommendation {
            name: idea.name,
            price: idea.price,
            description: idea.description,
            match_reason: idea.match_reason,
            shop_links,
            product_match,
        })
    }

    pub async fn fashion_preferences(
        &self,
        image_data: Vec<u8>,
    ) -> Result<FashionPreferences, PipelineError> {
        if image_data.is_empty() {
            return Err(PipelineError::MissingInput("image".to_string()));
        }

        let image = prepare_image(image_data, self.settings.max_image_dimension);
        let request = CompletionRequest::new(
            "fashion_preferences",
            prompts::fashion_preferences(),
            &self.settings.fashion_profile,
        )
        .with_image(image);

        let raw = self.complete_lossy(request).await;
        Ok(normalize(&raw, fallback::fashion_preferences))
    }
}
