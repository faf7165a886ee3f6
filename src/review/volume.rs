//! Volume review: four advisory scores for a just-compressed volume.

use super::report::{DimensionScore, ReviewReport, ReviewScope, ReviewWarning};
use crate::compaction::CompactionOutcome;
use crate::continuity::UnitSummary;
use crate::story::VolumeFramework;
use crate::util::truncate_chars;

pub const GOAL_COMPLETION: &str = "goal_completion";
pub const CHARACTER_CONSISTENCY: &str = "character_consistency";
pub const FORESHADOWING: &str = "foreshadowing";
pub const PACING: &str = "pacing";

/// Overall scores below this raise an advisory warning.
pub const VOLUME_WARNING_THRESHOLD: f64 = 70.0;

const FORESHADOW_PREFIX_CHARS: usize = 10;

/// Goal completion against the framework.
///
/// `assessed` is the critic's score, asked only when the framework lists key
/// events; `None` there means the assessment failed.
pub fn goal_completion_score(framework: Option<&VolumeFramework>, assessed: Option<u8>) -> u8 {
    match framework {
        None => 50,
        Some(f) if f.key_events.is_empty() => 75,
        Some(_) => assessed.unwrap_or(75),
    }
}

/// Whether goal completion needs a critic assessment at all.
pub fn needs_goal_assessment(framework: Option<&VolumeFramework>, units: &[UnitSummary]) -> bool {
    !units.is_empty() && framework.is_some_and(|f| !f.key_events.is_empty())
}

/// 70 plus 0.3 per percent of the roster that developed during the volume.
pub fn character_consistency_score(characters_with_notes: usize, total_characters: usize) -> u8 {
    if total_characters == 0 {
        return 75;
    }
    let coverage = characters_with_notes as f64 * 100.0 / total_characters as f64;
    (70.0 + coverage * 0.3).min(100.0) as u8
}

/// Share of the framework's foreshadowing found in the unit summaries.
///
/// An item counts as planted when its first ten characters occur verbatim.
pub fn foreshadowing_score(expected: &[String], units: &[UnitSummary]) -> u8 {
    if units.is_empty() {
        return 50;
    }
    if expected.is_empty() {
        return 80;
    }
    let content = units
        .iter()
        .map(|u| u.summary.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let found = expected
        .iter()
        .filter(|item| {
            let prefix: String = item.chars().take(FORESHADOW_PREFIX_CHARS).collect();
            content.contains(&prefix)
        })
        .count();
    (50.0 + found as f64 / expected.len() as f64 * 50.0) as u8
}

/// Unit-count sanity relative to the configured volume size.
pub fn pacing_score(unit_count: usize, volume_size: u32) -> u8 {
    if unit_count == 0 {
        return 50;
    }
    let ratio = unit_count as f64 / f64::from(volume_size.max(1));
    if ratio < 0.8 {
        60
    } else if ratio <= 1.2 {
        85
    } else {
        70
    }
}

/// Build the volume report from the compression outcome.
pub fn volume_review(
    outcome: &CompactionOutcome,
    framework: Option<&VolumeFramework>,
    assessed_goal: Option<u8>,
    volume_size: u32,
) -> ReviewReport {
    let units = &outcome.archived_units;
    let goal = if units.is_empty() {
        50
    } else {
        goal_completion_score(framework, assessed_goal)
    };
    let foreshadowing = match framework {
        Some(f) => foreshadowing_score(&f.foreshadowing, units),
        None => 50,
    };

    let report = ReviewReport::new(
        ReviewScope::Volume {
            volume: outcome.summary.volume,
        },
        vec![
            DimensionScore::new(GOAL_COMPLETION, goal),
            DimensionScore::new(
                CHARACTER_CONSISTENCY,
                character_consistency_score(outcome.characters_with_notes, outcome.total_characters),
            ),
            DimensionScore::new(FORESHADOWING, foreshadowing),
            DimensionScore::new(PACING, pacing_score(units.len(), volume_size)),
        ],
    );

    if report.overall < VOLUME_WARNING_THRESHOLD {
        let message = format!("volume quality {:.0}/100, manual review suggested", report.overall);
        report.with_warning(ReviewWarning::advisory(message))
    } else {
        report
    }
}

/// Material handed to the critic for the goal assessment.
pub fn goal_assessment_prompt(framework: &VolumeFramework, units: &[UnitSummary]) -> (String, String) {
    let question = format!(
        "Rate 0-100 how well this volume met its goals.\nCore goal: {}\nKey events: {}\nEnding state: {}",
        framework.core_goal,
        framework.key_events.join(", "),
        framework.ending_state
    );
    let material = units
        .iter()
        .map(|u| format!("Unit {}: {}", u.unit, truncate_chars(&u.summary, 100)))
        .collect::<Vec<_>>()
        .join("\n");
    (question, material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuity::VolumeSummary;
    use std::collections::BTreeMap;

    fn units(n: u32, text: &str) -> Vec<UnitSummary> {
        (1..=n)
            .map(|unit| UnitSummary {
                unit,
                summary: format!("{text} {unit}"),
                degraded: false,
            })
            .collect()
    }

    fn framework(key_events: &[&str], foreshadowing: &[&str]) -> VolumeFramework {
        VolumeFramework {
            volume: 1,
            title: "Salt".into(),
            units: None,
            core_goal: "Reach the coast".into(),
            key_events: key_events.iter().map(|s| s.to_string()).collect(),
            foreshadowing: foreshadowing.iter().map(|s| s.to_string()).collect(),
            ending_state: String::new(),
        }
    }

    fn outcome(units: Vec<UnitSummary>, with_notes: usize, total: usize) -> CompactionOutcome {
        CompactionOutcome {
            summary: VolumeSummary {
                volume: 1,
                first_unit: 1,
                last_unit: units.len() as u32,
                summary: "s".into(),
                character_arcs: BTreeMap::new(),
                threads_resolved: Vec::new(),
                degraded: false,
            },
            archived_units: units,
            characters_with_notes: with_notes,
            total_characters: total,
            detected_resolutions: 0,
        }
    }

    #[test]
    fn test_goal_completion_defaults() {
        assert_eq!(goal_completion_score(None, Some(95)), 50);
        assert_eq!(goal_completion_score(Some(&framework(&[], &[])), Some(95)), 75);
        assert_eq!(goal_completion_score(Some(&framework(&["storm"], &[])), Some(95)), 95);
        assert_eq!(goal_completion_score(Some(&framework(&["storm"], &[])), None), 75);
    }

    #[test]
    fn test_needs_goal_assessment() {
        let summaries = units(3, "x");
        assert!(!needs_goal_assessment(None, &summaries));
        assert!(!needs_goal_assessment(Some(&framework(&[], &[])), &summaries));
        assert!(needs_goal_assessment(Some(&framework(&["storm"], &[])), &summaries));
        assert!(!needs_goal_assessment(Some(&framework(&["storm"], &[])), &[]));
    }

    #[test]
    fn test_character_consistency() {
        assert_eq!(character_consistency_score(0, 0), 75);
        assert_eq!(character_consistency_score(0, 4), 70);
        assert_eq!(character_consistency_score(2, 4), 85);
        assert_eq!(character_consistency_score(4, 4), 100);
    }

    #[test]
    fn test_foreshadowing_prefix_match() {
        let summaries = vec![UnitSummary {
            unit: 1,
            summary: "The lighthouse keeper hides a key.".into(),
            degraded: false,
        }];
        let expected = vec![
            "The lighthouse burns later".to_string(),
            "A letter from the north".to_string(),
        ];
        assert_eq!(foreshadowing_score(&expected, &summaries), 75);
        assert_eq!(foreshadowing_score(&[], &summaries), 80);
        assert_eq!(foreshadowing_score(&expected, &[]), 50);
    }

    #[test]
    fn test_pacing_relative_to_volume_size() {
        assert_eq!(pacing_score(19, 25), 60);
        assert_eq!(pacing_score(20, 25), 85);
        assert_eq!(pacing_score(25, 25), 85);
        assert_eq!(pacing_score(31, 25), 70);
        assert_eq!(pacing_score(5, 5), 85);
        assert_eq!(pacing_score(0, 25), 50);
    }

    #[test]
    fn test_volume_review_without_framework_warns() {
        // 50 + 70 + 50 + 85 = 63.75
        let report = volume_review(&outcome(units(25, "x"), 0, 2), None, None, 25);
        assert_eq!(report.scope, ReviewScope::Volume { volume: 1 });
        assert_eq!(report.dimensions.len(), 4);
        assert!((report.overall - 63.75).abs() < 1e-9);
        assert!(report.has_warning());
        assert!(!report.is_critical());
    }

    #[test]
    fn test_volume_review_healthy_volume_has_no_warning() {
        let fw = framework(&["storm"], &[]);
        let report = volume_review(&outcome(units(25, "x"), 2, 2), Some(&fw), Some(90), 25);
        assert_eq!(report.score(GOAL_COMPLETION), Some(90));
        assert_eq!(report.score(CHARACTER_CONSISTENCY), Some(100));
        assert_eq!(report.score(FORESHADOWING), Some(80));
        assert_eq!(report.score(PACING), Some(85));
        assert!(!report.has_warning());
    }

    #[test]
    fn test_goal_assessment_prompt_lists_units() {
        let fw = framework(&["storm", "wreck"], &[]);
        let (question, material) = goal_assessment_prompt(&fw, &units(2, "sailing"));
        assert!(question.contains("storm, wreck"));
        assert_eq!(material, "Unit 1: sailing 1\nUnit 2: sailing 2");
    }
}
