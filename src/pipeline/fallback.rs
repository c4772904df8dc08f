//! Deterministic substitutes used when a completion cannot be normalized.
//!
//! Every value here passes its own schema validation and survives a
//! serialize/normalize round trip unchanged.

use crate::pipeline::types::{
    BudgetTier, ColorPalette, FashionPreferences, GiftIdea, KeyPiece, PriceEstimate, PriceRange,
    StyleAnalysis,
};
use crate::utils::text::capitalize_first;

/// Tier-derived price: base, with a range of floor(base * 0.8) to ceil(base * 1.2).
pub fn price_estimate(tier: BudgetTier) -> PriceEstimate {
    let base = tier.base_price();
    PriceEstimate {
        estimated_price: base,
        price_range: PriceRange {
            min: (base * 0.8).floor(),
            max: (base * 1.2).ceil(),
        },
        reasoning: format!("Estimated from typical {} pricing", tier.description()),
    }
}

pub fn style_analysis(tier: BudgetTier) -> StyleAnalysis {
    StyleAnalysis {
        overall_aesthetic: "Versatile everyday style".to_string(),
        key_pieces: vec![KeyPiece {
            item: "Classic white shirt".to_string(),
            description: "A versatile wardrobe staple that pairs with most looks".to_string(),
            style_elements: "Clean lines, neutral color".to_string(),
            quality_assessment: format!(
                "Look for {} options in natural fibers",
                tier.description()
            ),
            price_estimate: None,
        }],
        color_palette: ColorPalette {
            primary: vec!["white".to_string(), "navy".to_string()],
            accent: vec!["black".to_string()],
        },
        styling_patterns: vec!["Pair neutral basics with one statement piece".to_string()],
        recommended_searches: vec!["classic white shirt".to_string()],
    }
}

/// Generic gift for `interest`, priced at the full budget.
pub fn gift_idea(interest: &str, budget: f64) -> GiftIdea {
    let interest = interest.trim();
    GiftIdea {
        name: format!("{} Gift Set", capitalize_first(interest)),
        description: format!("A curated gift set for {interest} enthusiasts"),
        price: Some(budget),
        match_reason: format!("Perfect for someone who loves {interest}"),
    }
}

pub fn fashion_preferences() -> FashionPreferences {
    FashionPreferences {
        color_palette: vec!["neutral tones".to_string()],
        style_categories: vec!["casual".to_string()],
        clothing_items: vec!["basic tees".to_string(), "denim".to_string()],
        patterns_textures: vec!["solid colors".to_string()],
        outfit_combinations: vec!["Tee with jeans and sneakers".to_string()],
    }
}
