//! Review report types and the append-only review log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a review covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReviewScope {
    /// A compressed volume
    Volume { volume: u32 },
    /// The whole story up to a committed unit
    Milestone { unit: u32 },
}

impl fmt::Display for ReviewScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume { volume } => write!(f, "volume {}", volume),
            Self::Milestone { unit } => write!(f, "milestone @ unit {}", unit),
        }
    }
}

/// One scored dimension, 0-100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub name: String,
    pub score: u8,
}

impl DimensionScore {
    pub fn new(name: impl Into<String>, score: u8) -> Self {
        Self {
            name: name.into(),
            score: score.min(100),
        }
    }
}

/// Severity of a review warning. Neither level stops the session.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    #[default]
    Advisory,
    Critical,
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advisory => write!(f, "advisory"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewWarning {
    pub level: WarningLevel,
    pub message: String,
}

impl ReviewWarning {
    pub fn advisory(message: impl Into<String>) -> Self {
        Self {
            level: WarningLevel::Advisory,
            message: message.into(),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            level: WarningLevel::Critical,
            message: message.into(),
        }
    }
}

/// Result of one review gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub scope: ReviewScope,
    pub dimensions: Vec<DimensionScore>,
    /// Mean of the dimension scores
    pub overall: f64,
    /// Warnings raised, most severe first
    #[serde(default)]
    pub warnings: Vec<ReviewWarning>,
    pub created_at: DateTime<Utc>,
}

impl ReviewReport {
    pub fn new(scope: ReviewScope, dimensions: Vec<DimensionScore>) -> Self {
        let overall = if dimensions.is_empty() {
            0.0
        } else {
            dimensions.iter().map(|d| f64::from(d.score)).sum::<f64>() / dimensions.len() as f64
        };
        Self {
            scope,
            dimensions,
            overall,
            warnings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_warning(mut self, warning: ReviewWarning) -> Self {
        self.warnings.push(warning);
        self.warnings.sort_by(|a, b| b.level.cmp(&a.level));
        self
    }

    pub fn score(&self, name: &str) -> Option<u8> {
        self.dimensions.iter().find(|d| d.name == name).map(|d| d.score)
    }

    pub fn has_warning(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_critical(&self) -> bool {
        self.warnings.iter().any(|w| w.level == WarningLevel::Critical)
    }
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: overall {:.0}/100", self.scope, self.overall)?;
        for dimension in &self.dimensions {
            write!(f, ", {} {}", dimension.name, dimension.score)?;
        }
        for warning in &self.warnings {
            write!(f, " [{}: {}]", warning.level, warning.message)?;
        }
        Ok(())
    }
}

/// Append-only log of review reports for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewLog {
    reports: Vec<ReviewReport>,
}

impl ReviewLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, report: ReviewReport) {
        self.reports.push(report);
    }

    pub fn all(&self) -> &[ReviewReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn latest(&self) -> Option<&ReviewReport> {
        self.reports.last()
    }

    pub fn volume_reports(&self) -> impl Iterator<Item = &ReviewReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.scope, ReviewScope::Volume { .. }))
    }

    pub fn milestone_reports(&self) -> impl Iterator<Item = &ReviewReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.scope, ReviewScope::Milestone { .. }))
    }

    pub fn for_volume(&self, volume: u32) -> Option<&ReviewReport> {
        self.reports
            .iter()
            .find(|r| r.scope == ReviewScope::Volume { volume })
    }

    /// Reports that raised at least one warning.
    pub fn warnings(&self) -> impl Iterator<Item = &ReviewReport> {
        self.reports.iter().filter(|r| r.has_warning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(scope: ReviewScope, scores: &[u8]) -> ReviewReport {
        let dims = scores
            .iter()
            .enumerate()
            .map(|(i, s)| DimensionScore::new(format!("d{i}"), *s))
            .collect();
        ReviewReport::new(scope, dims)
    }

    #[test]
    fn test_overall_is_mean() {
        let r = report(ReviewScope::Volume { volume: 1 }, &[50, 75, 80, 85]);
        assert!((r.overall - 72.5).abs() < f64::EPSILON);
        assert_eq!(r.score("d2"), Some(80));
        assert_eq!(r.score("missing"), None);
    }

    #[test]
    fn test_dimension_score_clamped() {
        assert_eq!(DimensionScore::new("x", 250).score, 100);
    }

    #[test]
    fn test_warnings_sorted_by_severity() {
        let r = report(ReviewScope::Milestone { unit: 50 }, &[40])
            .with_warning(ReviewWarning::advisory("low"))
            .with_warning(ReviewWarning::critical("drifting"));
        assert!(r.is_critical());
        assert_eq!(r.warnings[0].level, WarningLevel::Critical);
    }

    #[test]
    fn test_log_queries() {
        let mut log = ReviewLog::new();
        log.append(report(ReviewScope::Volume { volume: 1 }, &[90]));
        log.append(report(ReviewScope::Volume { volume: 2 }, &[60]).with_warning(ReviewWarning::advisory("low")));
        log.append(report(ReviewScope::Milestone { unit: 50 }, &[80]));

        assert_eq!(log.len(), 3);
        assert_eq!(log.volume_reports().count(), 2);
        assert_eq!(log.milestone_reports().count(), 1);
        assert_eq!(log.for_volume(2).unwrap().score("d0"), Some(60));
        assert!(log.for_volume(3).is_none());
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.latest().unwrap().scope, ReviewScope::Milestone { unit: 50 });
    }

    #[test]
    fn test_scope_serializes_tagged() {
        let json = serde_json::to_string(&ReviewScope::Milestone { unit: 100 }).unwrap();
        assert_eq!(json, r#"{"kind":"milestone","unit":100}"#);
    }

    #[test]
    fn test_display() {
        let r = report(ReviewScope::Volume { volume: 3 }, &[70, 80]);
        assert_eq!(r.to_string(), "volume 3: overall 75/100, d0 70, d1 80");
    }
}
