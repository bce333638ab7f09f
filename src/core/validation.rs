use crate::core::error::ValidationError;

pub const TITLE_MAX_WORDS: usize = 6;
pub const TITLE_MAX_CHARS: usize = 50;

/// Trim `text` and check it against the length bound (in code points).
/// Returns the trimmed text on success.
pub fn validate_message(text: &str, max_length: usize) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let length = trimmed.chars().count();
    if length > max_length {
        return Err(ValidationError::TooLong {
            length,
            max: max_length,
        });
    }

    Ok(trimmed.to_string())
}

/// Title from the leading words of a user message
pub fn derive_title(content: &str) -> Option<String> {
    let words: Vec<&str> = content.split_whitespace().take(TITLE_MAX_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    Some(truncate_chars(&words.join(" "), TITLE_MAX_CHARS))
}

/// Normalize a caller-supplied title. Empty input means "no explicit title".
pub fn normalize_title(title: &str) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(truncate_chars(trimmed, TITLE_MAX_CHARS))
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
