use std::future::Future;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::media::decode_image_payload;
use crate::pipeline::types::{
    AnalysisRequest, BudgetTier, FashionPreferences, GiftRequest, Recommendation, StyleResponse,
};
use crate::server::error::ApiError;
use crate::state::AppState;
use crate::utils::timing::RequestTimer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleBody {
    image: Option<String>,
    #[serde(alias = "budget")]
    budget_tier: Option<String>,
    #[serde(default)]
    interests: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FashionBody {
    #[serde(alias = "image")]
    image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GiftsResponse {
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize)]
pub struct FashionResponse {
    pub analysis: FashionPreferences,
}

#[derive(Debug, Default)]
struct GiftForm {
    image: Option<Vec<u8>>,
    age: Option<String>,
    budget: Option<String>,
    interests: Vec<String>,
}

/// Runs `work` under the request deadline and records request timing.
async fn run_timed<T, Fut>(
    route: &str,
    state: &AppState,
    work: Fut,
) -> Result<Json<T>, ApiError>
where
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut timer = RequestTimer::start(route);
    let outcome = match tokio::time::timeout(state.request_deadline, work).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::DeadlineExceeded),
    };
    match &outcome {
        Ok(_) => timer.complete("success", None),
        Err(err) => timer.complete(err.label(), Some(err.to_string())),
    }
    outcome.map(Json)
}

fn bad_multipart(err: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart body: {err}"))
}

/// Accepts a JSON array or a comma/newline separated list.
fn split_interest_field(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return list;
        }
    }
    trimmed
        .split([',', '\n'])
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn parse_positive(value: Option<&str>) -> Option<f64> {
    let cleaned: String = value?
        .trim()
        .chars()
        .filter(|ch| *ch != '$' && *ch != ',')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite() && *number > 0.0)
}

async fn read_gift_form(mut multipart: Multipart) -> Result<GiftForm, ApiError> {
    let mut form = GiftForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "instagram-grid" | "image" => {
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                if !bytes.is_empty() {
                    form.image = Some(bytes.to_vec());
                }
            }
            "age" => form.age = Some(field.text().await.map_err(bad_multipart)?),
            "budget" => form.budget = Some(field.text().await.map_err(bad_multipart)?),
            "interests" => {
                let text = field.text().await.map_err(bad_multipart)?;
                form.interests.extend(split_interest_field(&text));
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(form)
}

fn gift_request_from(form: GiftForm) -> Result<GiftRequest, ApiError> {
    let age = parse_positive(form.age.as_deref());
    let budget = parse_positive(form.budget.as_deref());
    let (Some(age), Some(budget)) = (age, budget) else {
        return Err(ApiError::BadRequest("Age and budget are required".to_string()));
    };

    Ok(GiftRequest {
        image_data: form.image,
        age: age.round() as u32,
        budget,
        interests: form.interests,
    })
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn analyze_style(
    State(state): State<AppState>,
    payload: Result<Json<StyleBody>, JsonRejection>,
) -> Result<Json<StyleResponse>, ApiError> {
    let work = async {
        let Json(body) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let image = body
            .image
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))?;
        let image_data = decode_image_payload(image)?;
        let request = AnalysisRequest {
            image_data,
            budget_tier: BudgetTier::parse(body.budget_tier.as_deref().unwrap_or_default()),
            interests: body.interests,
        };
        let response = state.pipeline.recommend_styles(request).await?;
        Ok::<_, ApiError>(response)
    };
    run_timed("analyze_style", &state, work).await
}

pub async fn recommend_gifts(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GiftsResponse>, ApiError> {
    let work = async {
        let multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let form = read_gift_form(multipart).await?;
        let request = gift_request_from(form)?;
        let recommendations = state.pipeline.recommend_gifts(request).await?;
        Ok::<_, ApiError>(GiftsResponse { recommendations })
    };
    run_timed("gifts", &state, work).await
}

/// Grid upload form: like [`recommend_gifts`] but the screenshot is mandatory.
pub async fn analyze_grid(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GiftsResponse>, ApiError> {
    let work = async {
        let multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let form = read_gift_form(multipart).await?;
        if form.image.is_none() {
            return Err(ApiError::BadRequest("Missing required fields".to_string()));
        }
        let request = gift_request_from(form)?;
        let recommendations = state.pipeline.recommend_gifts(request).await?;
        Ok::<_, ApiError>(GiftsResponse { recommendations })
    };
    run_timed("analyze", &state, work).await
}

pub async fn fashion_preferences(
    State(state): State<AppState>,
    payload: Result<Json<FashionBody>, JsonRejection>,
) -> Result<Json<FashionResponse>, ApiError> {
    let work = async {
        let Json(body) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let image = body
            .image_url
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("No image URL provided".to_string()))?;
        let image_data = decode_image_payload(image)?;
        let analysis = state.pipeline.fashion_preferences(image_data).await?;
        Ok::<_, ApiError>(FashionResponse { analysis })
    };
    run_timed("fashion_preferences", &state, work).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_field_accepts_lists_and_json() {
        assert_eq!(split_interest_field("tea, yoga\nfilm"), ["tea", "yoga", "film"]);
        assert_eq!(split_interest_field(r#"["board games", "tea"]"#), ["board games", "tea"]);
        assert!(split_interest_field("  ").is_empty());
    }

    #[test]
    fn age_and_budget_must_be_positive() {
        let form = GiftForm {
            age: Some("0".to_string()),
            budget: Some("50".to_string()),
            ..GiftForm::default()
        };
        assert!(matches!(gift_request_from(form), Err(ApiError::BadRequest(_))));

        let form = GiftForm {
            age: Some("27".to_string()),
            budget: Some("$1,250".to_string()),
            ..GiftForm::default()
        };
        let request = gift_request_from(form).unwrap();
        assert_eq!(request.age, 27);
        assert_eq!(request.budget, 1250.0);

        assert!(gift_request_from(GiftForm::default()).is_err());
    }
}
