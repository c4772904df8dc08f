//! Prompt templates. Each function is pure: same inputs, same text.

use crate::pipeline::types::BudgetTier;

const STYLE_SCHEMA: &str = r#"{
  "overall_aesthetic": "Brief description of the overall style",
  "key_pieces": [
    {
      "item": "Specific item name",
      "description": "Detailed description including cut, material, fit",
      "style_elements": "Key style elements that make it stand out",
      "quality_assessment": "Assessment of apparent quality, materials, and craftsmanship"__PRICE__
    }
  ],
  "color_palette": {
    "primary": ["color1", "color2"],
    "accent": ["color3", "color4"]
  },
  "styling_patterns": [
    "Pattern 1: e.g., layering technique",
    "Pattern 2: e.g., color combination principle"
  ],
  "recommended_searches": [
    "Specific search term for similar items"
  ]
}"#;

const INLINE_PRICE_FIELD: &str = r#",
      "price_estimate": {
        "estimated_price": 0,
        "price_range": {"min": 0, "max": 0},
        "reasoning": "Brief note about quality/value"
      }"#;

pub fn style_analysis(tier: BudgetTier, interests: &[String], inline_prices: bool) -> String {
    let schema = STYLE_SCHEMA.replace(
        "__PRICE__",
        if inline_prices { INLINE_PRICE_FIELD } else { "" },
    );

    let mut prompt = String::from(
        "As a fashion expert, analyze this Instagram grid screenshot. Identify the \
         specific clothing items and accessories that define this style.\n\n",
    );
    prompt.push_str("Respond with JSON only, in this exact format:\n");
    prompt.push_str(&schema);
    prompt.push_str(
        "\n\nFocus on identifying specific, searchable items and their unique \
         characteristics, including quality indicators.",
    );
    if inline_prices {
        prompt.push_str(
            " For each item give a realistic price estimate in US dollars at this budget level.",
        );
    }
    prompt.push_str(&format!(
        " Consider the budget level: {} ({}).",
        tier.as_str(),
        tier.description()
    ));
    if !interests.is_empty() {
        prompt.push_str(&format!(
            " The shopper is also interested in: {}.",
            interests.join(", ")
        ));
    }
    prompt
}

pub fn price_estimate(item: &str, style_elements: &str, tier: BudgetTier) -> String {
    format!(
        "As a fashion expert, estimate a realistic price range for:\n\
         Item: {item}\n\
         Style: {style_elements}\n\
         Budget Level: {tier} (budget=affordable, medium=moderate, luxury=high-end)\n\n\
         Consider:\n\
         - Current market prices\n\
         - Quality level expected\n\
         - Brand tier for this style\n\
         - Seasonal factors\n\n\
         Respond with JSON only:\n\
         {{\n  \"estimated_price\": number (realistic average price),\n  \
         \"price_range\": {{\"min\": number, \"max\": number}},\n  \
         \"reasoning\": \"Brief note about quality/value\"\n}}"
    )
}

pub fn interest_extraction() -> String {
    "Analyze this Instagram grid and list the main interests and hobbies shown. \
     List only single words or short phrases, one per line. Focus on activities, \
     hobbies, and lifestyle preferences visible in the images."
        .to_string()
}

pub fn gift_system() -> String {
    "You are a gift recommendation expert. Respond with ONLY a JSON object in this exact format:\n\
     {\n  \"name\": \"Gift Name\",\n  \
     \"description\": \"Brief description without any apostrophes\",\n  \
     \"price\": 29.99,\n  \
     \"match_reason\": \"Why this matches, avoid using apostrophes\"\n}"
        .to_string()
}

pub fn gift_user(age: u32, budget: f64, interest: &str) -> String {
    format!(
        "Suggest ONE specific gift for a {age} year old who likes {interest}. \
         Budget: ${budget}. Avoid using apostrophes in descriptions."
    )
}

pub fn fashion_preferences() -> String {
    "Analyze this Instagram grid screenshot and identify the following fashion preferences:\n\
     1. Color palette\n\
     2. Style categories (e.g., minimalist, bohemian, streetwear)\n\
     3. Preferred clothing items\n\
     4. Common patterns or textures\n\
     5. Outfit combinations\n\n\
     Respond with JSON only, in this exact format:\n\
     {\n  \"color_palette\": [\"color\"],\n  \
     \"style_categories\": [\"category\"],\n  \
     \"clothing_items\": [\"item\"],\n  \
     \"patterns_textures\": [\"pattern\"],\n  \
     \"outfit_combinations\": [\"combination\"]\n}"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_prompt_mentions_tier_and_optional_price_fields() {
        let per_item = style_analysis(BudgetTier::Luxury, &[], false);
        assert!(per_item.contains("luxury (high-end)"));
        assert!(!per_item.contains("price_estimate"));
        assert!(!per_item.contains("__PRICE__"));

        let inline = style_analysis(BudgetTier::Budget, &["hiking".to_string()], true);
        assert!(inline.contains("\"price_estimate\""));
        assert!(inline.contains("interested in: hiking"));
    }

    #[test]
    fn gift_prompts_carry_request_details() {
        let prompt = gift_user(34, 75.0, "climbing");
        assert_eq!(
            prompt,
            "Suggest ONE specific gift for a 34 year old who likes climbing. Budget: $75. \
             Avoid using apostrophes in descriptions."
        );
        assert!(gift_system().contains("\"match_reason\""));
    }

    #[test]
    fn price_prompt_is_deterministic() {
        let a = price_estimate("Wool scarf", "chunky knit", BudgetTier::Medium);
        let b = price_estimate("Wool scarf", "chunky knit", BudgetTier::Medium);
        assert_eq!(a, b);
        assert!(a.contains("Item: Wool scarf"));
        assert!(a.contains("Budget Level: medium"));
    }
}
