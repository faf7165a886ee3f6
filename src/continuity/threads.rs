//! Plot-thread lifecycle analysis and the resolution heuristic.

use serde::{Deserialize, Serialize};

use super::{PlotThread, UnitSummary};

/// Planner guidance shows at most this many due threads.
const MAX_REVEAL_GUIDANCE: usize = 3;
/// Planner guidance shows at most this many pending threads.
const MAX_PENDING_GUIDANCE: usize = 5;
/// Fewer pending threads than this prompts a suggestion to plant more.
const LOW_PENDING_THRESHOLD: usize = 3;
/// Keyword occurrences across a volume needed to call a thread resolved.
const RESOLUTION_MIN_HITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Pending,
    ShouldReveal,
    Resolved,
}

/// Lifecycle position of a thread at `current_unit`.
pub fn thread_status(thread: &PlotThread, current_unit: u32, reveal_threshold: u32) -> ThreadStatus {
    if thread.resolved {
        ThreadStatus::Resolved
    } else if current_unit.saturating_sub(thread.created_at) >= reveal_threshold {
        ThreadStatus::ShouldReveal
    } else {
        ThreadStatus::Pending
    }
}

/// Active threads split by lifecycle position, plus planning suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadAnalysis {
    pub pending: Vec<PlotThread>,
    pub should_reveal: Vec<PlotThread>,
    pub suggestions: Vec<String>,
}

impl ThreadAnalysis {
    pub fn analyze(threads: &[PlotThread], current_unit: u32, reveal_threshold: u32) -> Self {
        let mut analysis = Self::default();
        for thread in threads {
            match thread_status(thread, current_unit, reveal_threshold) {
                ThreadStatus::Pending => analysis.pending.push(thread.clone()),
                ThreadStatus::ShouldReveal => analysis.should_reveal.push(thread.clone()),
                ThreadStatus::Resolved => {}
            }
        }

        if !analysis.should_reveal.is_empty() {
            analysis.suggestions.push(format!(
                "{} thread(s) have been open long enough; consider revealing or advancing them",
                analysis.should_reveal.len()
            ));
        }
        if analysis.pending.len() < LOW_PENDING_THRESHOLD {
            analysis
                .suggestions
                .push("Few open threads; consider planting new foreshadowing".to_string());
        }
        analysis
    }

    /// Guidance block for the unit planner.
    pub fn guidance(&self) -> String {
        let mut out = String::new();
        if !self.should_reveal.is_empty() {
            out.push_str("Threads due for payoff:\n");
            for thread in self.should_reveal.iter().take(MAX_REVEAL_GUIDANCE) {
                out.push_str(&format!(
                    "- {} (planted in unit {}, importance {})\n",
                    thread.text, thread.created_at, thread.importance
                ));
            }
        }
        if !self.pending.is_empty() {
            out.push_str("Threads still developing:\n");
            for thread in self.pending.iter().take(MAX_PENDING_GUIDANCE) {
                out.push_str(&format!("- {} (planted in unit {})\n", thread.text, thread.created_at));
            }
        }
        for suggestion in &self.suggestions {
            out.push_str(&format!("Suggestion: {}\n", suggestion));
        }
        out
    }
}

/// Keywords used to look for a thread's payoff in later summaries.
///
/// Characters `5..15` once the text has at least 10 characters, and
/// `10..20` once it has at least 20. Short texts yield shorter keywords.
pub fn resolution_keywords(text: &str) -> Vec<String> {
    let len = text.chars().count();
    [(10, 5, 15), (20, 10, 20)]
        .into_iter()
        .filter(|(min_len, _, _)| len >= *min_len)
        .map(|(_, start, end)| text.chars().skip(start).take(end - start).collect())
        .collect()
}

/// Best-effort guess at which threads were paid off during a volume.
///
/// Occurrences of every keyword in every unit summary are added up; a total
/// of at least two marks the thread resolved. One summary that repeats a
/// keyword counts twice. This is a heuristic: threads whose payoff is phrased
/// differently are missed, and threads whose text merely repeats in passing
/// are closed early. Callers must treat the
/// result as advisory. Returns indices into `threads`.
pub fn detect_resolutions(threads: &[PlotThread], summaries: &[UnitSummary]) -> Vec<usize> {
    threads
        .iter()
        .enumerate()
        .filter(|(_, thread)| !thread.resolved)
        .filter(|(_, thread)| {
            let hits: usize = resolution_keywords(&thread.text)
                .iter()
                .map(|keyword| {
                    summaries
                        .iter()
                        .map(|s| s.summary.matches(keyword.as_str()).count())
                        .sum::<usize>()
                })
                .sum();
            hits >= RESOLUTION_MIN_HITS
        })
        .map(|(index, _)| index)
        .collect()
}
