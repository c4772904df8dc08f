use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Spending category that biases prompts and fallback pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetTier {
    Budget,
    #[default]
    Medium,
    Luxury,
}

impl BudgetTier {
    /// Parses a tier name; anything unrecognised is `Medium`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "budget" | "low" | "affordable" => BudgetTier::Budget,
            "luxury" | "high" | "high-end" => BudgetTier::Luxury,
            _ => BudgetTier::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BudgetTier::Budget => "budget",
            BudgetTier::Medium => "medium",
            BudgetTier::Luxury => "luxury",
        }
    }

    pub fn base_price(self) -> f64 {
        match self {
            BudgetTier::Budget => 50.0,
            BudgetTier::Medium => 150.0,
            BudgetTier::Luxury => 300.0,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BudgetTier::Budget => "affordable",
            BudgetTier::Medium => "moderate",
            BudgetTier::Luxury => "high-end",
        }
    }
}

impl fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts numbers as well as strings like `"$1,299.00"`.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => {
            let cleaned: String = text
                .chars()
                .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == '-')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a number"))
}

/// Accepts either a string or a list of strings, joining lists with `", "`.
fn string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => text,
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    #[serde(deserialize_with = "lenient_f64")]
    pub min: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    #[serde(alias = "estimatedPrice", deserialize_with = "lenient_f64")]
    pub estimated_price: f64,
    #[serde(alias = "priceRange")]
    pub price_range: PriceRange,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPiece {
    pub item: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "styleElements", deserialize_with = "string_or_list")]
    pub style_elements: String,
    #[serde(default, alias = "qualityAssessment")]
    pub quality_assessment: String,
    /// Only requested when prices are folded into the style analysis.
    #[serde(default, alias = "priceEstimate", skip_serializing_if = "Option::is_none")]
    pub price_estimate: Option<PriceEstimate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorPalette {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub accent: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleAnalysis {
    #[serde(default, alias = "overallAesthetic")]
    pub overall_aesthetic: String,
    #[serde(alias = "keyPieces")]
    pub key_pieces: Vec<KeyPiece>,
    #[serde(default, alias = "colorPalette")]
    pub color_palette: ColorPalette,
    #[serde(default, alias = "stylingPatterns")]
    pub styling_patterns: Vec<String>,
    #[serde(default, alias = "recommendedSearches")]
    pub recommended_searches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftIdea {
    pub name: String,
    pub description: String,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(alias = "matchReason")]
    pub match_reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FashionPreferences {
    #[serde(default, alias = "colorPalette")]
    pub color_palette: Vec<String>,
    #[serde(default, alias = "styleCategories")]
    pub style_categories: Vec<String>,
    #[serde(default, alias = "clothingItems", alias = "preferred_clothing_items")]
    pub clothing_items: Vec<String>,
    #[serde(default, alias = "patternsTextures", alias = "patterns")]
    pub patterns_textures: Vec<String>,
    #[serde(default, alias = "outfitCombinations")]
    pub outfit_combinations: Vec<String>,
}

/// Best-match product returned by a retailer lookup adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMatch {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub url: String,
}

/// Externally visible unit: one per identified item or interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub description: String,
    pub match_reason: String,
    pub shop_links: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_match: Option<ProductMatch>,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image_data: Vec<u8>,
    pub budget_tier: BudgetTier,
    pub interests: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GiftRequest {
    pub image_data: Option<Vec<u8>>,
    pub age: u32,
    /// Budget in dollars.
    pub budget: f64,
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleResponse {
    pub recommendations: Vec<Recommendation>,
    pub aesthetic: String,
    pub color_palette: Vec<String>,
    pub styling_tips: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_tier_parsing_is_lenient() {
        assert_eq!(BudgetTier::parse("LUXURY"), BudgetTier::Luxury);
        assert_eq!(BudgetTier::parse(" budget "), BudgetTier::Budget);
        assert_eq!(BudgetTier::parse("whatever"), BudgetTier::Medium);
        assert_eq!(BudgetTier::parse(""), BudgetTier::Medium);
    }

    #[test]
    fn gift_price_accepts_currency_strings() {
        let idea: GiftIdea = serde_json::from_str(
            r#"{"name":"Lamp","description":"Warm","price":"$1,299.50","match_reason":"Cozy"}"#,
        )
        .unwrap();
        assert_eq!(idea.price, Some(1299.5));

        let idea: GiftIdea = serde_json::from_str(
            r#"{"name":"Lamp","description":"Warm","match_reason":"Cozy"}"#,
        )
        .unwrap();
        assert_eq!(idea.price, None);
    }

    #[test]
    fn key_piece_accepts_camel_case_and_list_style_elements() {
        let piece: KeyPiece = serde_json::from_str(
            r#"{"item":"Blazer","styleElements":["oversized","structured"]}"#,
        )
        .unwrap();
        assert_eq!(piece.style_elements, "oversized, structured");
        assert!(piece.price_estimate.is_none());
    }

    #[test]
    fn recommendation_serializes_camel_case() {
        let recommendation = Recommendation {
            name: "Scarf".to_string(),
            price: None,
            description: "Soft".to_string(),
            match_reason: "Warm tones".to_string(),
            shop_links: BTreeMap::new(),
            product_match: None,
        };
        let value = serde_json::to_value(&recommendation).unwrap();
        assert!(value.get("shopLinks").is_some());
        assert!(value.get("matchReason").is_some());
        assert!(value.get("price").is_none());
        assert!(value.get("productMatch").is_none());
    }
}
