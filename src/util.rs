//! Shared text helpers for the quill crate.
//!
//! All lengths are counted in characters, not bytes, so multi-byte prose is
//! never split inside a code point.

/// Take at most `max` characters from `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Shorten `text` to at most `max` characters, ending with `...` when cut.
pub fn clip(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return truncate_chars(text, max);
    }
    let mut out = truncate_chars(text, max - 3).trim_end().to_string();
    out.push_str("...");
    out
}

/// First line that carries prose: not blank, not a markdown heading, not a fence.
pub fn first_content_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("```"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_clip_short_text_unchanged() {
        assert_eq!(clip("  short  ", 10), "short");
    }

    #[test]
    fn test_clip_adds_marker_within_limit() {
        let clipped = clip(&"x".repeat(600), 500);
        assert_eq!(clipped.chars().count(), 500);
        assert!(clipped.ends_with("..."));
    }

    #[test]
    fn test_clip_tiny_limit() {
        assert_eq!(clip("abcdef", 2), "ab");
    }

    #[test]
    fn test_first_content_line_skips_headings() {
        let text = "# Chapter 3\n\n```\nThe rain had not stopped.\nMore.";
        assert_eq!(first_content_line(text), Some("The rain had not stopped."));
        assert_eq!(first_content_line("# only\n\n"), None);
    }
}
