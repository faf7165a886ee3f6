//! Session orchestration.
//!
//! A session moves through a fixed set of stages:
//!
//! ```text
//! VolumePlanning → UnitPlanning → Drafting → Reviewing ─┬→ Drafting (revise)
//!                                                       └→ CommitUnit
//! CommitUnit → UnitPlanning | VolumeReview | MilestoneReview | Terminal
//! VolumeReview → VolumePlanning | MilestoneReview | Terminal
//! ```
//!
//! Short-form sessions (target below 50 units) have no volume stages at all:
//! [`Mode::successor`] never routes to them. The transition table is a pure
//! function of the finished stage and a few [`Facts`]; the [`Orchestrator`]
//! runs each stage, computes the facts and checkpoints at every unit and
//! volume boundary.

pub mod runner;
pub mod state;

pub use runner::{CommittedUnit, Orchestrator, UnitSink};
pub use state::{Facts, Mode, Session, Stage, generate_session_id};
