pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// Upper-cases the first character, leaving the rest untouched.
pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_for_log("héllo", 10), "héllo");
        assert_eq!(truncate_for_log("héllo wörld", 4), "héll... (truncated)");
    }

    #[test]
    fn capitalizes_first_letter_only() {
        assert_eq!(capitalize_first("home decor"), "Home decor");
        assert_eq!(capitalize_first(""), "");
    }
}
