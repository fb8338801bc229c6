//! Truncation Utilities
//!
//! Character-counted truncation that respects UTF-8 boundaries, plus helpers
//! for pulling JSON fragments out of free-form generator output.

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Keeps the first `n` characters.
pub fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Cuts `text` so that the result, marker included, is at most `max_chars`
/// characters. Text already within budget is returned unchanged.
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let marker_len = char_len(marker);
    if marker_len >= max_chars {
        return take_chars(marker, max_chars).to_string();
    }
    let body = take_chars(text, max_chars - marker_len).trim_end();
    format!("{}{}", body, marker)
}

/// First balanced `{...}` object in `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    extract_balanced(text, '{', '}')
}

/// First balanced `[...]` array in `text`.
pub fn extract_json_array(text: &str) -> Option<&str> {
    extract_balanced(text, '[', ']')
}

fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}
