//! Milestone review: whole-story health check every `milestone_interval` units.

use super::report::{DimensionScore, ReviewReport, ReviewScope, ReviewWarning};
use crate::continuity::{ContinuityStore, PlotThread};
use crate::story::StoryOutline;
use crate::util::truncate_chars;

pub const OUTLINE_ALIGNMENT: &str = "outline_alignment";
pub const PLOT_PROGRESS: &str = "plot_progress";
pub const THREAD_HEALTH: &str = "thread_health";

/// Alignment below this is a critical warning.
pub const ALIGNMENT_CRITICAL: u8 = 60;
/// Thread health below this is a critical warning.
pub const THREAD_HEALTH_CRITICAL: u8 = 50;

/// Threads open longer than this many units count as stale.
const STALE_THREAD_AGE: u32 = 30;
const MAX_STALE_THREADS: usize = 5;
const HEALTHY_THREAD_COUNT: usize = 20;
const HEALTHY_STALE_THREADS: usize = 3;
const MILESTONE_PREFIX_CHARS: usize = 15;
const STORY_SUMMARY_CHARS: usize = 1500;
const RECENT_UNITS: usize = 5;
const RECENT_UNIT_CHARS: usize = 50;

/// Outline alignment: the critic's score, 75 without an outline or when the assessment failed.
pub fn outline_alignment_score(outline: Option<&StoryOutline>, assessed: Option<u8>) -> u8 {
    match outline {
        Some(_) => assessed.unwrap_or(75),
        None => 75,
    }
}

/// Whether the latest due milestone shows up in the archived volume summaries.
pub fn plot_progress_score(outline: Option<&StoryOutline>, store: &ContinuityStore, committed: u32) -> u8 {
    let Some(outline) = outline.filter(|o| !o.key_milestones.is_empty()) else {
        return 80;
    };
    let Some(expected) = outline.due_milestones(committed).last().copied() else {
        return 85;
    };

    let history = store
        .cold
        .volume_summaries
        .iter()
        .map(|v| v.summary.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let prefix: String = expected.event.chars().take(MILESTONE_PREFIX_CHARS).collect();
    if history.contains(&prefix) { 90 } else { 65 }
}

/// Active-thread count and age distribution.
pub fn thread_health_score(threads: &[PlotThread], current_unit: u32, capacity: usize) -> u8 {
    if threads.is_empty() {
        return 70;
    }
    if threads.len() > capacity {
        return 55;
    }
    let stale = threads
        .iter()
        .filter(|t| current_unit.saturating_sub(t.created_at) > STALE_THREAD_AGE)
        .count();
    if stale > MAX_STALE_THREADS {
        60
    } else if threads.len() < HEALTHY_THREAD_COUNT && stale < HEALTHY_STALE_THREADS {
        85
    } else {
        70
    }
}

/// Archived volumes plus the latest units of the volume in progress.
pub fn story_so_far(store: &ContinuityStore) -> String {
    let mut lines: Vec<String> = store
        .cold
        .volume_summaries
        .iter()
        .map(|v| format!("Volume {}: {}", v.volume, v.summary))
        .collect();

    let units = &store.hot.unit_summaries;
    if !units.is_empty() {
        let start = units.len().saturating_sub(RECENT_UNITS);
        let recent = units[start..]
            .iter()
            .map(|u| truncate_chars(&u.summary, RECENT_UNIT_CHARS))
            .collect::<Vec<_>>()
            .join(" → ");
        lines.push(format!("Current volume (latest units): {}", recent));
    }
    truncate_chars(&lines.join("\n\n"), STORY_SUMMARY_CHARS)
}

/// Question and material for the critic's alignment assessment.
pub fn alignment_assessment_prompt(outline: &StoryOutline, store: &ContinuityStore, committed: u32) -> (String, String) {
    let question = format!(
        "Rate 0-100 how closely the story so far follows its outline.\nMain goal: {}\nMain conflict: {}\nProtagonist arc: {}\nUnits written: {}",
        outline.main_goal, outline.main_conflict, outline.protagonist_arc, committed
    );
    (question, story_so_far(store))
}

/// Build the milestone report after `committed` units.
pub fn milestone_review(
    store: &ContinuityStore,
    outline: Option<&StoryOutline>,
    assessed_alignment: Option<u8>,
    committed: u32,
) -> ReviewReport {
    let alignment = outline_alignment_score(outline, assessed_alignment);
    let health = thread_health_score(&store.hot.threads, committed + 1, store.limits.threads);

    let mut report = ReviewReport::new(
        ReviewScope::Milestone { unit: committed },
        vec![
            DimensionScore::new(OUTLINE_ALIGNMENT, alignment),
            DimensionScore::new(PLOT_PROGRESS, plot_progress_score(outline, store, committed)),
            DimensionScore::new(THREAD_HEALTH, health),
        ],
    );

    if alignment < ALIGNMENT_CRITICAL {
        report = report.with_warning(ReviewWarning::critical("story is drifting from the outline"));
    }
    if health < THREAD_HEALTH_CRITICAL {
        report = report.with_warning(ReviewWarning::critical("plot threads need triage"));
    }
    report
}
