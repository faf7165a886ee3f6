//! Generation stage adapters.
//!
//! Each stage wraps a [`StageClient`](crate::service::StageClient), builds its
//! request from a read-only [`PlanningContext`](crate::continuity::PlanningContext)
//! and never fails: when the service is exhausted it returns a local fallback
//! flagged as such.

pub mod critic;
pub mod planner;
pub mod summarizer;
pub mod volume_planner;
pub mod writer;

use std::sync::Arc;

use crate::config::RetrySection;
use crate::service::{GenerationService, Role, StageClient};

pub use critic::{Critic, Verdict};
pub use planner::{Planner, Scene, UnitOutline};
pub use summarizer::{MemoryUpdate, Summarizer};
pub use volume_planner::{VolumeOutline, VolumePlanner};
pub use writer::{Draft, Writer};

/// All stages of one session, sharing one service.
pub struct Stages {
    pub volume_planner: VolumePlanner,
    pub planner: Planner,
    pub writer: Writer,
    pub critic: Critic,
    pub summarizer: Summarizer,
}

impl Stages {
    pub fn new(service: Arc<dyn GenerationService>, retry: &RetrySection) -> Self {
        Self {
            volume_planner: VolumePlanner::new(StageClient::new(
                service.clone(),
                Role::Planner,
                retry.planner,
            )),
            planner: Planner::new(StageClient::new(service.clone(), Role::Planner, retry.planner)),
            writer: Writer::new(StageClient::new(service.clone(), Role::Writer, retry.writer)),
            critic: Critic::new(StageClient::new(service.clone(), Role::Critic, retry.critic)),
            summarizer: Summarizer::new(StageClient::new(service, Role::Summarizer, retry.summarizer)),
        }
    }
}
