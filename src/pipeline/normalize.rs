//! Turns free-form completion text into typed values.
//!
//! Models are asked for JSON but routinely wrap it in Markdown fences, add
//! prose around it, use smart or single quotes, leave trailing commas and
//! forget to quote keys. [`repair_json_text`] applies a fixed sequence of
//! lexical repairs; [`normalize`] parses and validates the result and
//! substitutes a caller-provided fallback on any failure, so it never fails.
//!
//! Repair order:
//! 1. strip code-fence markers
//! 2. straighten smart quotes that delimit strings
//! 3. cut out the first balanced `{...}` or `[...]`
//! 4. rewrite apostrophe contractions
//! 5. collapse newlines and runs of whitespace
//! 6. structural pass outside strings: single-quoted strings become
//!    double-quoted, bare keys are quoted, trailing commas are dropped and
//!    spacing around `:` and `,` is removed

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::pipeline::types::{FashionPreferences, GiftIdea, PriceEstimate, StyleAnalysis};
use crate::utils::text::truncate_for_log;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z]*").expect("valid fence regex"));
static IT_IS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([Ii])t's\b").expect("valid it-is regex"));
static POSSESSIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)'s\b").expect("valid possessive regex"));
static ARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)'re\b").expect("valid are regex"));
static NOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)'t\b").expect("valid not regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const LOG_PREVIEW_LIMIT: usize = 1500;

/// A JSON shape a completion is expected to match.
pub trait Schema: Serialize + DeserializeOwned {
    const NAME: &'static str;

    /// Post-parse cleanup of field contents.
    fn tidy(self) -> Self {
        self
    }

    /// Checks required-field invariants serde cannot express.
    fn validate(&self) -> Result<(), String>;
}

fn strip_code_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").trim().to_string()
}

fn is_smart_double(ch: char) -> bool {
    matches!(ch, '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}')
}

fn is_smart_single(ch: char) -> bool {
    matches!(ch, '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}')
}

/// Straightens smart quotes that delimit strings.
///
/// Smart double quotes inside a string opened with a straight `"` are
/// content and stay as they are.
fn straighten_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Some(true) when the open string started with a straight quote.
    let mut open_string: Option<bool> = None;
    let mut escaped = false;

    for ch in text.chars() {
        if is_smart_single(ch) {
            out.push('\'');
            continue;
        }
        match open_string {
            None => {
                if ch == '"' {
                    open_string = Some(true);
                    out.push('"');
                } else if is_smart_double(ch) {
                    open_string = Some(false);
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
            Some(straight) => {
                if escaped {
                    escaped = false;
                    out.push(ch);
                } else if ch == '\\' {
                    escaped = true;
                    out.push(ch);
                } else if ch == '"' {
                    open_string = None;
                    out.push('"');
                } else if is_smart_double(ch) && !straight {
                    open_string = None;
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
        }
    }
    out
}

/// Returns the first balanced JSON object or array in `text`.
///
/// Brackets inside double-quoted strings are ignored. An unterminated value
/// yields everything from the opening bracket to the end of the input.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
                if stack.is_empty() {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    Some(&text[start..])
}

fn rewrite_contractions(text: &str) -> String {
    let text = IT_IS_RE.replace_all(text, "${1}t is");
    let text = POSSESSIVE_RE.replace_all(&text, "${1}s");
    let text = ARE_RE.replace_all(&text, "${1} are");
    NOT_RE.replace_all(&text, "${1}t").into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

fn next_non_space(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|ch| !ch.is_whitespace())
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' || ch == '-'
}

/// Finds the index of the quote closing a single-quoted string opened at `open`.
///
/// A closing quote must be followed by a structural character or the end of
/// input, so apostrophes inside the text survive.
fn find_single_quote_close(chars: &[char], open: usize) -> Option<usize> {
    let mut index = open + 1;
    while index < chars.len() {
        match chars[index] {
            '\\' => index += 2,
            '\'' => match next_non_space(chars, index + 1) {
                None | Some(',') | Some('}') | Some(']') | Some(':') => return Some(index),
                _ => index += 1,
            },
            _ => index += 1,
        }
    }
    None
}

fn push_single_quoted_body(out: &mut String, body: &[char]) {
    let mut index = 0;
    while index < body.len() {
        let ch = body[index];
        if ch == '\\' && index + 1 < body.len() {
            if body[index + 1] == '\'' {
                out.push('\'');
            } else {
                out.push('\\');
                out.push(body[index + 1]);
            }
            index += 2;
            continue;
        }
        if ch == '"' {
            out.push('\\');
        }
        out.push(ch);
        index += 1;
    }
}

fn repair_structure(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut last_significant: Option<char> = None;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];

        if ch.is_whitespace() {
            index += 1;
            continue;
        }

        if ch == '"' {
            out.push('"');
            index += 1;
            let mut escaped = false;
            while index < chars.len() {
                let inner = chars[index];
                out.push(inner);
                index += 1;
                if escaped {
                    escaped = false;
                } else if inner == '\\' {
                    escaped = true;
                } else if inner == '"' {
                    break;
                }
            }
            last_significant = Some('"');
            continue;
        }

        if ch == '\''
            && matches!(last_significant, None | Some('{') | Some('[') | Some(':') | Some(','))
        {
            if let Some(close) = find_single_quote_close(&chars, index) {
                out.push('"');
                push_single_quoted_body(&mut out, &chars[index + 1..close]);
                out.push('"');
                last_significant = Some('"');
                index = close + 1;
                continue;
            }
        }

        if ch == ',' {
            match next_non_space(&chars, index + 1) {
                Some('}') | Some(']') | Some(',') => {
                    index += 1;
                    continue;
                }
                _ => {}
            }
        }

        if is_ident_start(ch) {
            let start = index;
            while index < chars.len() && is_ident_char(chars[index]) {
                index += 1;
            }
            let ident: String = chars[start..index].iter().collect();
            let is_key = matches!(last_significant, Some('{') | Some(','))
                && next_non_space(&chars, index) == Some(':');
            if is_key {
                out.push('"');
                out.push_str(&ident);
                out.push('"');
                last_significant = Some('"');
            } else {
                let literal = match ident.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                };
                out.push_str(literal);
                last_significant = literal.chars().last();
            }
            continue;
        }

        out.push(ch);
        last_significant = Some(ch);
        index += 1;
    }

    out
}

/// Applies the lexical repair sequence; `None` when no JSON value is present.
pub fn repair_json_text(raw: &str) -> Option<String> {
    let unfenced = strip_code_fences(raw);
    let straightened = straighten_quotes(&unfenced);
    let span = extract_json_span(&straightened)?;
    let without_contractions = rewrite_contractions(span);
    let collapsed = collapse_whitespace(&without_contractions);
    Some(repair_structure(&collapsed))
}

/// Parses a completion into `T`, reporting why it could not.
pub fn parse_completion<T: Schema>(raw: &str) -> Result<T, PipelineError> {
    if raw.trim().is_empty() {
        return Err(PipelineError::Parse("empty completion".to_string()));
    }

    let cleaned = repair_json_text(raw)
        .ok_or_else(|| PipelineError::Parse("no JSON object or array found".to_string()))?;
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|err| PipelineError::Parse(format!("{err} in {}", truncate_for_log(&cleaned, 200))))?;
    let parsed: T = serde_json::from_value(value)
        .map_err(|err| PipelineError::Validation(format!("{} shape mismatch: {err}", T::NAME)))?;
    let parsed = parsed.tidy();
    parsed
        .validate()
        .map_err(|reason| PipelineError::Validation(format!("{}: {reason}", T::NAME)))?;
    Ok(parsed)
}

/// Logs why a completion was replaced by a fallback, with raw and repaired text.
pub fn report_fallback<T: Schema>(raw: &str, err: &PipelineError) {
    let cleaned = repair_json_text(raw).unwrap_or_default();
    warn!(
        "Using fallback {} ({} error: {}); raw={:?} cleaned={:?}",
        T::NAME,
        err.kind(),
        err,
        truncate_for_log(raw, LOG_PREVIEW_LIMIT),
        truncate_for_log(&cleaned, LOG_PREVIEW_LIMIT)
    );
}

/// Parses a completion into `T`, substituting `fallback()` on any failure.
pub fn normalize<T, F>(raw: &str, fallback: F) -> T
where
    T: Schema,
    F: FnOnce() -> T,
{
    match parse_completion::<T>(raw) {
        Ok(value) => {
            debug!("Normalized {} completion", T::NAME);
            value
        }
        Err(err) => {
            report_fallback::<T>(raw, &err);
            fallback()
        }
    }
}

fn clean_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|ch| !matches!(ch, '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}'))
        .collect();
    collapse_whitespace(&stripped)
}

fn price_estimate_is_sane(estimate: &PriceEstimate) -> Result<(), String> {
    let values = [
        estimate.estimated_price,
        estimate.price_range.min,
        estimate.price_range.max,
    ];
    if values.iter().any(|value| !value.is_finite() || *value < 0.0) {
        return Err("prices must be finite and non-negative".to_string());
    }
    if estimate.price_range.min > estimate.price_range.max {
        return Err("price_range.min exceeds price_range.max".to_string());
    }
    Ok(())
}

impl Schema for PriceEstimate {
    const NAME: &'static str = "price_estimate";

    fn validate(&self) -> Result<(), String> {
        price_estimate_is_sane(self)
    }
}

impl Schema for StyleAnalysis {
    const NAME: &'static str = "style_analysis";

    fn tidy(mut self) -> Self {
        for piece in &mut self.key_pieces {
            piece.item = piece.item.trim().to_string();
            let invalid_price = piece
                .price_estimate
                .as_ref()
                .map(|estimate| price_estimate_is_sane(estimate).is_err())
                .unwrap_or(false);
            if invalid_price {
                piece.price_estimate = None;
            }
        }
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.key_pieces.is_empty() {
            return Err("key_pieces is empty".to_string());
        }
        if self.key_pieces.iter().any(|piece| piece.item.is_empty()) {
            return Err("key piece without an item name".to_string());
        }
        Ok(())
    }
}

impl Schema for GiftIdea {
    const NAME: &'static str = "gift_idea";

    fn tidy(self) -> Self {
        GiftIdea {
            name: clean_text(&self.name),
            description: clean_text(&self.description),
            price: self.price.filter(|price| price.is_finite() && *price >= 0.0),
            match_reason: clean_text(&self.match_reason),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.description.is_empty() || self.match_reason.is_empty() {
            return Err("name, description and match_reason are required".to_string());
        }
        Ok(())
    }
}

impl Schema for FashionPreferences {
    const NAME: &'static str = "fashion_preferences";

    fn validate(&self) -> Result<(), String> {
        let populated = [
            &self.color_palette,
            &self.style_categories,
            &self.clothing_items,
            &self.patterns_textures,
            &self.outfit_combinations,
        ]
        .iter()
        .any(|list| !list.is_empty());
        if populated {
            Ok(())
        } else {
            Err("every preference list is empty".to_string())
        }
    }
}
