pub const DEFAULT_EXCERPT_MAX_CHARS: usize = 280;
pub const DEFAULT_PREVIEW_LINES: usize = 5;

/// Collapses whitespace and caps the text at `max_chars`, marking truncation
/// with `...`.
#[must_use]
pub fn derive_excerpt(text: &str, max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }

    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return None;
    }

    if normalized.chars().count() <= max_chars {
        return Some(normalized);
    }

    let mut excerpt: String = normalized.chars().take(max_chars).collect();
    excerpt.push_str("...");
    Some(excerpt)
}

/// First `max_lines` lines of `text`, line terminators stripped.
#[must_use]
pub fn preview_lines(text: &str, max_lines: usize) -> Vec<&str> {
    text.lines().take(max_lines).collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::{derive_excerpt, preview_lines};

    #[test]
    fn preview_keeps_leading_lines_only() {
        let text = "one\ntwo\r\nthree\nfour";
        assert_eq!(preview_lines(text, 3), vec!["one", "two", "three"]);
        assert_eq!(preview_lines(text, 10).len(), 4);
        assert!(preview_lines(text, 0).is_empty());
    }

    #[test]
    fn excerpt_collapses_whitespace_and_truncates() {
        assert_eq!(
            derive_excerpt("  hello \n  world ", 280).as_deref(),
            Some("hello world")
        );
        assert_eq!(derive_excerpt("abcdef", 3).as_deref(), Some("abc..."));
        assert_eq!(derive_excerpt("   ", 10), None);
    }
}
