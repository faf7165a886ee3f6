//! Volume Compression
//!
//! Collapses a finished volume's working set into one [`VolumeSummary`]
//! appended to cold memory, so that neither hot memory nor planning prompts
//! grow with session length.
//!
//! ## Lifecycle
//!
//! - Runs exactly once per volume, when the volume's last unit commits
//! - Summaries come from a [`VolumeCondenser`] (the summarizer stage); when it
//!   fails, a deterministic local summary is used and the volume is marked degraded
//! - Afterwards hot memory restarts at the next volume: characters keep their
//!   traits with notes cleared, unresolved threads carry over, world events and
//!   unit summaries are dropped
//!
//! ## Usage
//!
//! ```ignore
//! use quill::compaction::CompactionEngine;
//!
//! let outcome = CompactionEngine::new(&summarizer)
//!     .compact(&mut store, volume, seed.framework_for(volume))
//!     .await?;
//! assert_eq!(store.current_volume(), volume + 1);
//! ```
//!
//! [`VolumeSummary`]: crate::continuity::VolumeSummary

mod engine;
mod summary;

use async_trait::async_trait;

use crate::continuity::{Character, UnitSummary};
use crate::story::VolumeFramework;

pub use engine::{CompactionEngine, CompactionOutcome};
pub use summary::{NO_DEVELOPMENT, fallback_arc, fallback_volume_summary};

/// Maximum length of an archived volume summary, in characters.
pub const VOLUME_SUMMARY_CHARS: usize = 500;
/// Maximum length of an archived character arc, in characters.
pub const ARC_CHARS: usize = 100;

/// Source of compressed prose for a volume. `None` means "use the local fallback".
#[async_trait]
pub trait VolumeCondenser: Send + Sync {
    async fn condense_volume(
        &self,
        volume: u32,
        units: &[UnitSummary],
        framework: Option<&VolumeFramework>,
    ) -> Option<String>;

    async fn condense_arc(&self, character: &Character) -> Option<String>;
}
