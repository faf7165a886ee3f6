//! Session state and the stage transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{LONG_FORM_THRESHOLD, SessionConfig};
use crate::stages::VolumeOutline;
use crate::story::StorySeed;

/// Operating mode, fixed when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No volume stages exist
    ShortForm,
    /// Adds volume planning, volume review and compression
    LongForm,
}

impl Mode {
    pub fn for_target(target_units: u32) -> Self {
        if target_units >= LONG_FORM_THRESHOLD {
            Self::LongForm
        } else {
            Self::ShortForm
        }
    }

    pub fn is_long_form(self) -> bool {
        self == Self::LongForm
    }

    pub fn entry_stage(self) -> Stage {
        match self {
            Self::LongForm => Stage::VolumePlanning,
            Self::ShortForm => Stage::UnitPlanning,
        }
    }

    /// Every stage reachable in this mode.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::LongForm => &[
                Stage::VolumePlanning,
                Stage::UnitPlanning,
                Stage::Drafting,
                Stage::Reviewing,
                Stage::CommitUnit,
                Stage::VolumeReview,
                Stage::MilestoneReview,
                Stage::Terminal,
            ],
            Self::ShortForm => &[
                Stage::UnitPlanning,
                Stage::Drafting,
                Stage::Reviewing,
                Stage::CommitUnit,
                Stage::MilestoneReview,
                Stage::Terminal,
            ],
        }
    }

    /// The stage after `stage`, given what the finished stage established.
    pub fn successor(self, stage: Stage, facts: &Facts) -> Stage {
        let long_form = self.is_long_form();
        match stage {
            Stage::VolumePlanning => Stage::UnitPlanning,
            Stage::UnitPlanning => Stage::Drafting,
            Stage::Drafting => Stage::Reviewing,
            Stage::Reviewing => {
                if !facts.accepted && facts.revision_iteration < facts.max_revision_iterations {
                    Stage::Drafting
                } else {
                    Stage::CommitUnit
                }
            }
            Stage::CommitUnit => {
                if long_form && facts.volume_complete {
                    Stage::VolumeReview
                } else {
                    Self::after_unit(long_form, facts)
                }
            }
            Stage::VolumeReview => Self::after_unit(long_form, facts),
            Stage::MilestoneReview => Self::resume_generation(long_form, facts),
            Stage::Terminal => Stage::Terminal,
        }
    }

    fn after_unit(long_form: bool, facts: &Facts) -> Stage {
        if facts.milestone_due {
            Stage::MilestoneReview
        } else {
            Self::resume_generation(long_form, facts)
        }
    }

    fn resume_generation(long_form: bool, facts: &Facts) -> Stage {
        if facts.finished {
            Stage::Terminal
        } else if long_form && facts.at_volume_start {
            Stage::VolumePlanning
        } else {
            Stage::UnitPlanning
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortForm => write!(f, "short-form"),
            Self::LongForm => write!(f, "long-form"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    VolumePlanning,
    UnitPlanning,
    Drafting,
    Reviewing,
    CommitUnit,
    VolumeReview,
    MilestoneReview,
    Terminal,
}

impl Stage {
    /// Stages a checkpoint may name as the next one to run.
    ///
    /// Checkpoints are only written at unit and volume boundaries, so a
    /// resumed session never starts mid-draft.
    pub fn is_boundary(self) -> bool {
        matches!(
            self,
            Self::VolumePlanning
                | Self::UnitPlanning
                | Self::VolumeReview
                | Self::MilestoneReview
                | Self::Terminal
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::VolumePlanning => "volume-planning",
            Self::UnitPlanning => "unit-planning",
            Self::Drafting => "drafting",
            Self::Reviewing => "reviewing",
            Self::CommitUnit => "commit-unit",
            Self::VolumeReview => "volume-review",
            Self::MilestoneReview => "milestone-review",
            Self::Terminal => "terminal",
        };
        write!(f, "{}", s)
    }
}

/// What the transition table needs to know about the finished stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Facts {
    /// Critic verdict for the current draft
    pub accepted: bool,
    pub revision_iteration: u32,
    pub max_revision_iterations: u32,
    /// The volume in progress has reached `volume_size` units
    pub volume_complete: bool,
    /// Committed units are a positive multiple of `milestone_interval`
    pub milestone_due: bool,
    /// Every target unit is committed
    pub finished: bool,
    /// Hot memory holds no units yet (a volume was just compressed or the session is new)
    pub at_volume_start: bool,
}

/// One novel-generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub seed: StorySeed,
    pub config: SessionConfig,
    pub mode: Mode,
    /// Next unit to generate, 1-based
    pub current_unit: u32,
    /// Rejected drafts so far for the in-flight unit
    pub revision_iteration: u32,
    /// Plan for the volume in progress (long-form only)
    #[serde(default)]
    pub volume_outline: Option<VolumeOutline>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, seed: StorySeed, config: SessionConfig) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            mode: Mode::for_target(config.target_units),
            seed,
            config,
            current_unit: 1,
            revision_iteration: 0,
            volume_outline: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn committed_units(&self) -> u32 {
        self.current_unit - 1
    }

    pub fn is_finished(&self) -> bool {
        self.current_unit > self.config.target_units
    }

    pub fn is_long_form(&self) -> bool {
        self.mode.is_long_form()
    }

    pub fn milestone_due(&self) -> bool {
        let committed = self.committed_units();
        committed > 0 && committed % self.config.milestone_interval == 0
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Short random id for new sessions.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> Facts {
        Facts {
            max_revision_iterations: 2,
            ..Facts::default()
        }
    }

    #[test]
    fn test_mode_threshold() {
        assert_eq!(Mode::for_target(49), Mode::ShortForm);
        assert_eq!(Mode::for_target(50), Mode::LongForm);
        assert_eq!(Mode::ShortForm.entry_stage(), Stage::UnitPlanning);
        assert_eq!(Mode::LongForm.entry_stage(), Stage::VolumePlanning);
    }

    #[test]
    fn test_short_form_has_no_volume_stages() {
        let stages = Mode::ShortForm.stages();
        assert!(!stages.contains(&Stage::VolumePlanning));
        assert!(!stages.contains(&Stage::VolumeReview));
    }

    #[test]
    fn test_unconditional_transitions() {
        let f = facts();
        assert_eq!(Mode::LongForm.successor(Stage::VolumePlanning, &f), Stage::UnitPlanning);
        assert_eq!(Mode::LongForm.successor(Stage::UnitPlanning, &f), Stage::Drafting);
        assert_eq!(Mode::ShortForm.successor(Stage::Drafting, &f), Stage::Reviewing);
        assert_eq!(Mode::ShortForm.successor(Stage::Terminal, &f), Stage::Terminal);
    }

    #[test]
    fn test_revision_loop_is_bounded() {
        let mut f = facts();
        f.accepted = false;
        f.revision_iteration = 1;
        assert_eq!(Mode::ShortForm.successor(Stage::Reviewing, &f), Stage::Drafting);
        f.revision_iteration = 2;
        assert_eq!(Mode::ShortForm.successor(Stage::Reviewing, &f), Stage::CommitUnit);
        f.accepted = true;
        f.revision_iteration = 0;
        assert_eq!(Mode::ShortForm.successor(Stage::Reviewing, &f), Stage::CommitUnit);
    }

    #[test]
    fn test_zero_revisions_commits_immediately() {
        let f = Facts::default();
        assert_eq!(Mode::ShortForm.successor(Stage::Reviewing, &f), Stage::CommitUnit);
    }

    #[test]
    fn test_commit_routes_to_volume_review_only_in_long_form() {
        let f = Facts {
            volume_complete: true,
            ..facts()
        };
        assert_eq!(Mode::LongForm.successor(Stage::CommitUnit, &f), Stage::VolumeReview);
        assert_eq!(Mode::ShortForm.successor(Stage::CommitUnit, &f), Stage::UnitPlanning);
    }

    #[test]
    fn test_after_volume_review() {
        let f = Facts {
            at_volume_start: true,
            ..facts()
        };
        assert_eq!(Mode::LongForm.successor(Stage::VolumeReview, &f), Stage::VolumePlanning);

        let due = Facts { milestone_due: true, ..f };
        assert_eq!(Mode::LongForm.successor(Stage::VolumeReview, &due), Stage::MilestoneReview);
        assert_eq!(Mode::LongForm.successor(Stage::MilestoneReview, &due), Stage::VolumePlanning);

        let done = Facts { finished: true, ..f };
        assert_eq!(Mode::LongForm.successor(Stage::VolumeReview, &done), Stage::Terminal);
    }

    #[test]
    fn test_mid_volume_milestone_returns_to_unit_planning() {
        let f = Facts {
            milestone_due: true,
            ..facts()
        };
        assert_eq!(Mode::LongForm.successor(Stage::CommitUnit, &f), Stage::MilestoneReview);
        assert_eq!(Mode::LongForm.successor(Stage::MilestoneReview, &f), Stage::UnitPlanning);
    }

    #[test]
    fn test_commit_of_last_unit_terminates() {
        let f = Facts {
            finished: true,
            ..facts()
        };
        assert_eq!(Mode::ShortForm.successor(Stage::CommitUnit, &f), Stage::Terminal);
    }

    #[test]
    fn test_session_counters() {
        let mut session = Session::new("s1", StorySeed::new("t", "s", 120), SessionConfig::with_target(120));
        assert_eq!(session.mode, Mode::LongForm);
        assert_eq!(session.committed_units(), 0);
        assert!(!session.milestone_due());
        session.current_unit = 51;
        assert!(session.milestone_due());
        session.current_unit = 121;
        assert!(session.is_finished());
    }

    #[test]
    fn test_boundary_stages() {
        assert!(Stage::UnitPlanning.is_boundary());
        assert!(Stage::VolumeReview.is_boundary());
        assert!(!Stage::Drafting.is_boundary());
        assert!(!Stage::CommitUnit.is_boundary());
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = generate_session_id();
        assert_eq!(a.len(), 12);
        assert_ne!(a, generate_session_id());
    }
}
