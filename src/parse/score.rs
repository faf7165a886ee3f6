//! Numeric score extraction from free-text assessments.

use regex::Regex;
use std::sync::LazyLock;

/// Score used when an assessment carries no readable number.
pub const DEFAULT_SCORE: u8 = 75;

static LABELED_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)score"?\s*[:=]\s*"?(\d{1,3})"#).unwrap()
});

static OUT_OF_HUNDRED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})\s*/\s*100").unwrap());

static POINTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,3})\s*points?\b").unwrap());

/// Find a 0-100 score in `text`, trying `score: N`, then `N/100`, then `N points`.
pub fn extract_score(text: &str) -> Option<u8> {
    [&*LABELED_SCORE, &*OUT_OF_HUNDRED, &*POINTS]
        .into_iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|score| score.min(100) as u8)
}

/// Like [`extract_score`], falling back to [`DEFAULT_SCORE`].
pub fn score_or_default(text: &str) -> u8 {
    extract_score(text).unwrap_or(DEFAULT_SCORE)
}
