//! Append-only record of committed units.
//!
//! Every `CommitUnit` appends one [`CommitEvent`]; degraded or forced
//! commits carry [`UnitWarning`]s so that dashboards can find them without
//! re-reading the text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Why a committed unit is not a clean, accepted draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitWarning {
    /// The revision budget ran out while the critic was still rejecting
    ForcedAccept,
    /// The planner failed and the generic outline was used
    PlannerFallback,
    /// The writer failed and a placeholder body was committed
    WriterFallback,
    /// The critic failed and the local heuristic judged the draft
    CriticFallback,
    /// The summarizer failed and a local summary was recorded
    SummaryFallback,
}

impl UnitWarning {
    /// True when the committed text itself is a placeholder.
    pub fn is_degraded_text(&self) -> bool {
        matches!(self, Self::WriterFallback)
    }
}

impl fmt::Display for UnitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ForcedAccept => "forced-accept",
            Self::PlannerFallback => "planner-fallback",
            Self::WriterFallback => "writer-fallback",
            Self::CriticFallback => "critic-fallback",
            Self::SummaryFallback => "summary-fallback",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub unit: u32,
    pub volume: u32,
    pub committed_at: DateTime<Utc>,
    /// Writer invocations for this unit, revisions included
    pub draft_attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<UnitWarning>,
    pub title: String,
    pub summary: String,
    /// Length of the committed text in characters
    pub chars: usize,
}

impl CommitEvent {
    pub fn new(unit: u32, volume: u32, title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            unit,
            volume,
            committed_at: Utc::now(),
            draft_attempts: 1,
            warnings: Vec::new(),
            title: title.into(),
            summary: summary.into(),
            chars: 0,
        }
    }

    pub fn with_attempts(mut self, draft_attempts: u32) -> Self {
        self.draft_attempts = draft_attempts;
        self
    }

    pub fn with_chars(mut self, chars: usize) -> Self {
        self.chars = chars;
        self
    }

    pub fn with_warning(mut self, warning: UnitWarning) -> Self {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
        self
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_warning(&self, warning: UnitWarning) -> bool {
        self.warnings.contains(&warning)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitLog {
    events: Vec<CommitEvent>,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: CommitEvent) {
        self.events.push(event);
    }

    pub fn all(&self) -> &[CommitEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&CommitEvent> {
        self.events.last()
    }

    pub fn get(&self, unit: u32) -> Option<&CommitEvent> {
        self.events.iter().find(|e| e.unit == unit)
    }

    pub fn in_range(&self, units: RangeInclusive<u32>) -> impl Iterator<Item = &CommitEvent> {
        self.events.iter().filter(move |e| units.contains(&e.unit))
    }

    pub fn for_volume(&self, volume: u32) -> impl Iterator<Item = &CommitEvent> {
        self.events.iter().filter(move |e| e.volume == volume)
    }

    pub fn with_warning(&self, warning: UnitWarning) -> impl Iterator<Item = &CommitEvent> {
        self.events.iter().filter(move |e| e.has_warning(warning))
    }

    pub fn degraded(&self) -> impl Iterator<Item = &CommitEvent> {
        self.events.iter().filter(|e| e.is_degraded())
    }

    pub fn total_draft_attempts(&self) -> u32 {
        self.events.iter().map(|e| e.draft_attempts).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> CommitLog {
        let mut log = CommitLog::new();
        for unit in 1..=30u32 {
            let volume = (unit - 1) / 25 + 1;
            let mut event = CommitEvent::new(unit, volume, format!("Unit {unit}"), "s").with_attempts(1);
            if unit == 4 {
                event = event
                    .with_attempts(3)
                    .with_warning(UnitWarning::ForcedAccept)
                    .with_warning(UnitWarning::ForcedAccept);
            }
            if unit == 9 {
                event = event.with_warning(UnitWarning::SummaryFallback);
            }
            log.append(event);
        }
        log
    }

    #[test]
    fn test_queries() {
        let log = log();
        assert_eq!(log.len(), 30);
        assert_eq!(log.in_range(5..=10).count(), 6);
        assert_eq!(log.for_volume(2).count(), 5);
        assert_eq!(log.degraded().count(), 2);
        assert_eq!(log.with_warning(UnitWarning::ForcedAccept).count(), 1);
        assert_eq!(log.get(4).unwrap().warnings, vec![UnitWarning::ForcedAccept]);
        assert_eq!(log.total_draft_attempts(), 32);
        assert_eq!(log.last().unwrap().unit, 30);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut log = CommitLog::new();
        log.append(CommitEvent::new(1, 1, "t", "s"));
        let json = serde_json::to_value(&log).unwrap();
        assert!(json.is_array());
        assert!(json[0].get("warnings").is_none());

        let back: CommitLog = serde_json::from_value(json).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(UnitWarning::CriticFallback.to_string(), "critic-fallback");
        assert!(UnitWarning::WriterFallback.is_degraded_text());
        assert!(!UnitWarning::ForcedAccept.is_degraded_text());
    }
}
