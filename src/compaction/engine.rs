//! Compression of a finished volume into cold memory.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::VolumeCondenser;
use super::summary::{fallback_arc, fallback_volume_summary};
use crate::continuity::threads::detect_resolutions;
use crate::continuity::{ContinuityStore, HotMemory, UnitSummary, VolumeSummary};
use crate::errors::CompactionError;
use crate::story::VolumeFramework;

/// What a compression produced, kept for the volume review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub summary: VolumeSummary,
    /// The unit summaries that were dropped from hot memory
    pub archived_units: Vec<UnitSummary>,
    /// Roster characters with at least one note during the volume
    pub characters_with_notes: usize,
    pub total_characters: usize,
    /// Threads closed by the resolution heuristic rather than explicitly
    pub detected_resolutions: usize,
}

impl CompactionOutcome {
    /// Percentage of the roster that developed during the volume.
    pub fn character_coverage(&self) -> Option<f64> {
        (self.total_characters > 0)
            .then(|| self.characters_with_notes as f64 * 100.0 / self.total_characters as f64)
    }
}

pub struct CompactionEngine<'a> {
    condenser: &'a dyn VolumeCondenser,
}

impl<'a> CompactionEngine<'a> {
    pub fn new(condenser: &'a dyn VolumeCondenser) -> Self {
        Self { condenser }
    }

    /// Compress `volume`, which must be the volume in progress and not yet archived.
    ///
    /// All condenser calls happen before the store is touched; the store is
    /// then updated in one step, so a cancelled compression leaves it intact.
    pub async fn compact(
        &self,
        store: &mut ContinuityStore,
        volume: u32,
        framework: Option<&VolumeFramework>,
    ) -> Result<CompactionOutcome, CompactionError> {
        if let Some(last) = store.cold.last_volume()
            && volume <= last
        {
            return Err(CompactionError::AlreadyCompacted { volume, last });
        }
        if volume != store.hot.current_volume {
            return Err(CompactionError::NotCurrentVolume {
                requested: volume,
                current: store.hot.current_volume,
            });
        }

        let hot = &store.hot;
        let first_unit = store.cold.archived_units() + 1;
        let last_unit = first_unit + hot.units_in_volume.saturating_sub(1);

        let (summary_text, mut degraded) =
            match self.condenser.condense_volume(volume, &hot.unit_summaries, framework).await {
                Some(text) => (text, false),
                None => (fallback_volume_summary(volume, &hot.unit_summaries), true),
            };

        let mut character_arcs = BTreeMap::new();
        for character in &hot.characters {
            let arc = if character.recent_notes.is_empty() {
                fallback_arc(character)
            } else {
                match self.condenser.condense_arc(character).await {
                    Some(arc) => arc,
                    None => {
                        degraded = true;
                        fallback_arc(character)
                    }
                }
            };
            character_arcs.insert(character.name.clone(), arc);
        }

        let detected = detect_resolutions(&hot.threads, &hot.unit_summaries);
        let characters_with_notes = hot
            .characters
            .iter()
            .filter(|c| !c.recent_notes.is_empty())
            .count();
        let total_characters = hot.characters.len();

        // Everything below mutates; nothing below can fail or await.
        let old = std::mem::replace(&mut store.hot, HotMemory::new(volume + 1, Vec::new(), Vec::new()));
        let HotMemory {
            mut characters,
            threads,
            unit_summaries,
            mut resolved_threads,
            ..
        } = old;

        let mut carried = Vec::with_capacity(threads.len());
        for (index, mut thread) in threads.into_iter().enumerate() {
            if detected.contains(&index) {
                thread.resolve(last_unit);
                resolved_threads.push(thread);
            } else {
                carried.push(thread);
            }
        }
        for character in &mut characters {
            character.recent_notes.clear();
        }

        let summary = VolumeSummary {
            volume,
            first_unit,
            last_unit,
            summary: summary_text,
            character_arcs,
            threads_resolved: resolved_threads.iter().map(|t| t.text.clone()).collect(),
            degraded,
        };
        store.cold.volume_summaries.push(summary.clone());
        store.hot.characters = characters;
        store.hot.threads = carried;

        info!(
            volume,
            first_unit,
            last_unit,
            resolved = summary.threads_resolved.len(),
            degraded,
            "volume compressed"
        );
        debug!(carried_threads = store.hot.threads.len(), "hot memory reset");

        Ok(CompactionOutcome {
            summary,
            archived_units: unit_summaries,
            characters_with_notes,
            total_characters,
            detected_resolutions: detected.len(),
        })
    }
}
