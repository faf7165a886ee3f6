//! Critic: accepts or rejects drafts, and scores review questions.
//!
//! When the service cannot be reached the critic falls back to a local
//! heuristic check so the revision loop still gets a verdict.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use super::writer::Draft;
use crate::parse::{DEFAULT_SCORE, score_or_default};
use crate::service::{Constraints, StageClient};
use crate::util::truncate_chars;

/// Drafts shorter than this are flagged.
const MIN_DRAFT_CHARS: usize = 800;
/// Drafts longer than this are expected to contain dialogue.
const DIALOGUE_EXPECTED_CHARS: usize = 1000;
/// A filler word used more often than this is flagged.
const OVERUSE_LIMIT: usize = 4;
const MAX_ISSUES: usize = 3;
/// Draft text sent to the critic.
const CRITIC_DRAFT_CHARS: usize = 12_000;

const OVERUSED_WORDS: &[&str] = &[
    "suddenly", "very", "really", "just", "somehow", "seemed", "literally", "actually",
];

static VERDICT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)verdict\W{0,3}(pass|accept|accepted|approve|approved|revise|reject|rejected)").unwrap()
});

static REJECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(reject|rejected|needs? revision|must be revised|not acceptable)\b").unwrap()
});

static ISSUE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub issues: Vec<String>,
    /// Produced by the local heuristic
    pub fallback: bool,
}

/// Read a verdict from free text.
///
/// An explicit `VERDICT: PASS|REVISE` line wins; otherwise rejection
/// keywords reject. Anything else is an acceptance.
pub fn parse_verdict(response: &str) -> Verdict {
    let accepted = match VERDICT_REGEX.captures(response) {
        Some(caps) => {
            let word = caps[1].to_lowercase();
            !(word.starts_with("revise") || word.starts_with("reject"))
        }
        None => !REJECT_REGEX.is_match(response),
    };

    let issues = if accepted {
        Vec::new()
    } else {
        response
            .lines()
            .filter_map(|line| ISSUE_REGEX.captures(line))
            .map(|caps| caps[1].trim().to_string())
            .take(MAX_ISSUES)
            .collect()
    };

    Verdict {
        accepted,
        issues,
        fallback: false,
    }
}

/// Local quality check used when the critic service is unavailable.
pub fn heuristic_verdict(text: &str, roster: &[String]) -> Verdict {
    let mut issues = Vec::new();
    let len = text.chars().count();

    if len < MIN_DRAFT_CHARS {
        issues.push(format!("Draft is short ({} characters)", len));
    }

    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    for filler in OVERUSED_WORDS {
        let n = words.iter().filter(|w| *w == filler).count();
        if n > OVERUSE_LIMIT {
            issues.push(format!("Overused word '{}' ({} times)", filler, n));
        }
    }

    let has_dialogue = ['"', '“', '”', '「'].iter().any(|q| text.contains(*q));
    if len > DIALOGUE_EXPECTED_CHARS && !has_dialogue {
        issues.push("No dialogue in a long draft".to_string());
    }

    if !roster.is_empty() && !roster.iter().any(|name| text.contains(name.as_str())) {
        issues.push("No known character appears".to_string());
    }

    issues.truncate(MAX_ISSUES);
    Verdict {
        accepted: issues.is_empty(),
        issues,
        fallback: true,
    }
}

pub struct Critic {
    client: StageClient,
}

impl Critic {
    pub fn new(client: StageClient) -> Self {
        Self { client }
    }

    /// Judge a draft against its outline.
    pub async fn review(&self, unit: u32, draft: &Draft, outline_text: &str, roster: &[String]) -> Verdict {
        let prompt = format!(
            "Review the draft of unit {}.\n\nOutline:\n{}\nDraft:\n{}\n",
            unit,
            outline_text,
            truncate_chars(&draft.text, CRITIC_DRAFT_CHARS)
        );
        let constraints = Constraints::default()
            .with_instruction("Start with 'VERDICT: PASS' or 'VERDICT: REVISE'")
            .with_instruction("If revising, list at most three issues as '- ' bullets");

        match self.client.generate(prompt, constraints).await {
            Ok(response) => parse_verdict(&response),
            Err(err) => {
                warn!(unit, error = %err, "critic unavailable, using local heuristic");
                heuristic_verdict(&draft.text, roster)
            }
        }
    }

    /// Score a review question 0-100. Unreadable or failed answers score 75.
    pub async fn assess(&self, question: &str, material: &str) -> u8 {
        let prompt = format!("{}\n\n{}\n", question, material);
        let constraints = Constraints::default()
            .with_max_chars(400)
            .with_instruction("Answer with 'score: N' (0-100) followed by one sentence of reasoning");

        match self.client.generate(prompt, constraints).await {
            Ok(response) => score_or_default(&response),
            Err(err) => {
                warn!(error = %err, "assessment unavailable, using default score");
                DEFAULT_SCORE
            }
        }
    }
}
