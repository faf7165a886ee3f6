//! Review gates.
//!
//! Two periodic, advisory-only scoring passes:
//!
//! - [`volume`]: fires after each volume is compressed; scores goal
//!   completion, character consistency, foreshadowing and pacing
//! - [`milestone`]: fires every `milestone_interval` committed units; scores
//!   outline alignment, plot progress and thread health
//!
//! Gates read the continuity store and never mutate it. Their only output
//! is a [`ReviewReport`] appended to the session's [`ReviewLog`]. A low score
//! raises a warning on the report; the orchestrator never halts on one.
//!
//! Scores that need judgement (goal completion, outline alignment) are asked
//! of the critic stage by the orchestrator and passed in; everything else is
//! computed locally.
//!
//! ## Example
//!
//! ```
//! use quill::review::{ReviewLog, milestone};
//! use quill::continuity::ContinuityStore;
//! use quill::config::CapacityLimits;
//!
//! let store = ContinuityStore::new(CapacityLimits::default());
//! let mut log = ReviewLog::new();
//! log.append(milestone::milestone_review(&store, None, None, 50));
//! assert_eq!(log.milestone_reports().count(), 1);
//! ```

pub mod milestone;
pub mod report;
pub mod volume;

pub use milestone::milestone_review;
pub use report::{DimensionScore, ReviewLog, ReviewReport, ReviewScope, ReviewWarning, WarningLevel};
pub use volume::volume_review;
