//! Continuity store: what is true so far in the story.
//!
//! The store has two tiers:
//! - `HotMemory` is the working set for the volume in progress: characters,
//!   active plot threads, recent world events and the unit summaries written
//!   so far in this volume.
//! - `ColdMemory` is the append-only archive of compressed past volumes.
//!
//! Every bounded collection is trimmed by the [`capacity`] policy after each
//! mutation, so the working set never grows past the configured limits no
//! matter how long the session runs.

pub mod capacity;
pub mod threads;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

use crate::config::CapacityLimits;
use crate::errors::ContinuityError;
use crate::story::StorySeed;
use crate::util::clip;

pub use threads::{ThreadAnalysis, ThreadStatus};

/// Default importance for threads discovered during generation.
pub const DEFAULT_THREAD_IMPORTANCE: u8 = 5;
/// Number of archived volumes merged into the planning context.
const HISTORY_VOLUMES: usize = 3;
const HISTORY_SUMMARY_CHARS: usize = 150;
const CHARACTER_STATE_CHARS: usize = 100;
/// Shortest thread reference that may match by substring.
const THREAD_REFERENCE_MIN_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    /// Fixed at creation
    pub traits: Vec<String>,
    /// Most recent development notes, oldest first
    pub recent_notes: VecDeque<String>,
}

impl Character {
    pub fn new(name: &str, traits: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            traits,
            recent_notes: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotThread {
    pub text: String,
    /// Unit in which the thread was planted
    pub created_at: u32,
    /// 1 (minor) to 10 (central)
    pub importance: u8,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<u32>,
}

impl PlotThread {
    pub fn new(text: &str, created_at: u32, importance: u8) -> Self {
        Self {
            text: text.trim().to_string(),
            created_at,
            importance: importance.clamp(1, 10),
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn resolve(&mut self, unit: u32) {
        self.resolved = true;
        self.resolved_at = Some(unit);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub text: String,
    pub unit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit: u32,
    pub summary: String,
    /// Produced by the local fallback rather than the summarizer
    #[serde(default)]
    pub degraded: bool,
}

/// Working set for the volume in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotMemory {
    pub current_volume: u32,
    pub units_in_volume: u32,
    pub characters: Vec<Character>,
    /// Unresolved threads only
    pub threads: Vec<PlotThread>,
    pub world_events: VecDeque<WorldEvent>,
    pub unit_summaries: Vec<UnitSummary>,
    /// Threads closed during this volume, waiting to be archived
    pub resolved_threads: Vec<PlotThread>,
}

impl HotMemory {
    pub fn new(current_volume: u32, characters: Vec<Character>, threads: Vec<PlotThread>) -> Self {
        Self {
            current_volume,
            units_in_volume: 0,
            characters,
            threads,
            world_events: VecDeque::new(),
            unit_summaries: Vec::new(),
            resolved_threads: Vec::new(),
        }
    }

    pub fn character(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }

    fn character_mut(&mut self, name: &str) -> Option<&mut Character> {
        let name = name.trim();
        if let Some(index) = self.characters.iter().position(|c| c.name == name) {
            return self.characters.get_mut(index);
        }
        self.characters
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a thread reference to an index into `threads`.
    ///
    /// An exact (case-insensitive) match wins. Otherwise a reference of at
    /// least [`THREAD_REFERENCE_MIN_CHARS`] characters may match by substring
    /// in either direction, and only when exactly one thread matches.
    fn find_thread(&self, reference: &str) -> Option<usize> {
        let needle = reference.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if let Some(index) = self
            .threads
            .iter()
            .position(|t| t.text.trim().to_lowercase() == needle)
        {
            return Some(index);
        }
        if needle.chars().count() < THREAD_REFERENCE_MIN_CHARS {
            return None;
        }

        let mut matches = self.threads.iter().enumerate().filter(|(_, t)| {
            let text = t.text.trim().to_lowercase();
            text.contains(&needle)
                || (text.chars().count() >= THREAD_REFERENCE_MIN_CHARS && needle.contains(&text))
        });
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    }
}

/// Compressed record of a finished volume. Immutable once archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub volume: u32,
    pub first_unit: u32,
    pub last_unit: u32,
    pub summary: String,
    /// Compressed arc per character name
    pub character_arcs: BTreeMap<String, String>,
    pub threads_resolved: Vec<String>,
    /// Produced by the local fallback rather than the summarizer
    #[serde(default)]
    pub degraded: bool,
}

impl VolumeSummary {
    pub fn unit_count(&self) -> u32 {
        self.last_unit + 1 - self.first_unit
    }
}

/// Append-only archive of compressed volumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdMemory {
    pub volume_summaries: Vec<VolumeSummary>,
}

impl ColdMemory {
    pub fn archived_units(&self) -> u32 {
        self.volume_summaries.iter().map(VolumeSummary::unit_count).sum()
    }

    pub fn last_volume(&self) -> Option<u32> {
        self.volume_summaries.last().map(|v| v.volume)
    }

    pub fn recent(&self, count: usize) -> &[VolumeSummary] {
        let start = self.volume_summaries.len().saturating_sub(count);
        &self.volume_summaries[start..]
    }
}

/// A new thread reported by the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThread {
    pub text: String,
    pub importance: u8,
}

/// Everything a committed unit changes in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitDelta {
    pub unit: u32,
    pub summary: String,
    pub degraded: bool,
    /// Development note per character name
    pub character_notes: Vec<(String, String)>,
    pub new_threads: Vec<NewThread>,
    pub world_changes: Vec<String>,
    /// References to threads paid off in this unit
    pub resolved_threads: Vec<String>,
}

impl UnitDelta {
    pub fn new(unit: u32, summary: &str) -> Self {
        Self {
            unit,
            summary: summary.to_string(),
            ..Self::default()
        }
    }
}

/// What `record_unit` did beyond the obvious.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Character names in the delta that are not on the roster
    pub unknown_characters: Vec<String>,
    pub evicted_threads: Vec<PlotThread>,
    pub evicted_notes: usize,
    pub evicted_events: usize,
    pub resolved: Vec<String>,
}

/// A character as the planner sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterState {
    pub name: String,
    pub traits: Vec<String>,
    pub state: String,
}

/// Read-only projection handed to the generation stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanningContext {
    pub next_unit: u32,
    pub current_volume: u32,
    pub characters: Vec<CharacterState>,
    pub active_threads: Vec<PlotThread>,
    pub recent_world_events: Vec<String>,
    pub recent_units: Vec<UnitSummary>,
    pub historical_summary: Vec<String>,
}

impl PlanningContext {
    /// Plain-text rendering used in prompts.
    pub fn render(&self, max_events: usize, max_recent_units: usize) -> String {
        let mut out = String::new();
        if !self.historical_summary.is_empty() {
            out.push_str("Story so far:\n");
            for line in &self.historical_summary {
                out.push_str(&format!("- {}\n", line));
            }
        }
        if !self.recent_units.is_empty() {
            out.push_str("Recent units:\n");
            let start = self.recent_units.len().saturating_sub(max_recent_units);
            for unit in &self.recent_units[start..] {
                out.push_str(&format!("- Unit {}: {}\n", unit.unit, unit.summary));
            }
        }
        if !self.characters.is_empty() {
            out.push_str("Characters:\n");
            for c in &self.characters {
                out.push_str(&format!("- {} [{}]: {}\n", c.name, c.traits.join(", "), c.state));
            }
        }
        if !self.recent_world_events.is_empty() {
            out.push_str("World events:\n");
            let start = self.recent_world_events.len().saturating_sub(max_events);
            for event in &self.recent_world_events[start..] {
                out.push_str(&format!("- {}\n", event));
            }
        }
        out
    }
}

/// Hot and cold memory for one session.
///
/// Owned by the orchestrator; stages only ever see a [`PlanningContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityStore {
    pub hot: HotMemory,
    pub cold: ColdMemory,
    pub limits: CapacityLimits,
}

impl ContinuityStore {
    pub fn new(limits: CapacityLimits) -> Self {
        Self {
            hot: HotMemory::new(1, Vec::new(), Vec::new()),
            cold: ColdMemory::default(),
            limits,
        }
    }

    /// Seed the store from the roster, planting the synopsis as the first thread.
    pub fn from_seed(seed: &StorySeed, limits: CapacityLimits) -> Self {
        let characters = seed
            .characters
            .iter()
            .map(|c| Character::new(&c.name, c.traits.clone()))
            .collect();
        let mut threads = Vec::new();
        if !seed.synopsis.trim().is_empty() {
            threads.push(PlotThread::new(
                &seed.synopsis,
                1,
                seed.foreshadow_strategy.synopsis_importance(),
            ));
        }
        Self {
            hot: HotMemory::new(1, characters, threads),
            cold: ColdMemory::default(),
            limits,
        }
    }

    /// The unit the next `record_unit` call must carry.
    pub fn next_unit(&self) -> u32 {
        1 + self.cold.archived_units() + self.hot.units_in_volume
    }

    pub fn current_volume(&self) -> u32 {
        self.hot.current_volume
    }

    /// Merge hot memory with the most recent archived volumes.
    pub fn get_planning_context(&self) -> PlanningContext {
        let recent_cold = self.cold.recent(HISTORY_VOLUMES);

        let characters = self
            .hot
            .characters
            .iter()
            .map(|c| {
                let state = c
                    .recent_notes
                    .back()
                    .map(|note| clip(note, CHARACTER_STATE_CHARS))
                    .or_else(|| {
                        recent_cold
                            .iter()
                            .rev()
                            .find_map(|v| v.character_arcs.get(&c.name).cloned())
                    })
                    .unwrap_or_default();
                CharacterState {
                    name: c.name.clone(),
                    traits: c.traits.clone(),
                    state,
                }
            })
            .collect();

        let historical_summary = recent_cold
            .iter()
            .map(|v| format!("Volume {}: {}", v.volume, clip(&v.summary, HISTORY_SUMMARY_CHARS)))
            .collect();

        PlanningContext {
            next_unit: self.next_unit(),
            current_volume: self.hot.current_volume,
            characters,
            active_threads: self.hot.threads.clone(),
            recent_world_events: self.hot.world_events.iter().map(|e| e.text.clone()).collect(),
            recent_units: self.hot.unit_summaries.clone(),
            historical_summary,
        }
    }

    /// Apply a committed unit's delta, then enforce capacity limits.
    ///
    /// The delta is validated before anything is touched, so either all of it
    /// lands or none of it does. Notes for characters not on the roster are
    /// dropped; unknown thread references are ignored.
    pub fn record_unit(&mut self, delta: UnitDelta) -> Result<RecordOutcome, ContinuityError> {
        let expected = self.next_unit();
        if delta.unit != expected {
            return Err(ContinuityError::UnitOutOfOrder {
                expected,
                got: delta.unit,
            });
        }

        let mut outcome = RecordOutcome::default();
        let unit = delta.unit;
        let hot = &mut self.hot;

        hot.unit_summaries.push(UnitSummary {
            unit,
            summary: delta.summary,
            degraded: delta.degraded,
        });

        for (name, note) in delta.character_notes {
            let note = note.trim().to_string();
            if note.is_empty() {
                continue;
            }
            match hot.character_mut(&name) {
                Some(character) => character.recent_notes.push_back(note),
                None => {
                    debug!(unit, character = %name, "dropping note for unknown character");
                    outcome.unknown_characters.push(name);
                }
            }
        }

        for reference in delta.resolved_threads {
            match hot.find_thread(&reference) {
                Some(index) => {
                    let mut thread = hot.threads.remove(index);
                    thread.resolve(unit);
                    outcome.resolved.push(thread.text.clone());
                    hot.resolved_threads.push(thread);
                }
                None => debug!(unit, thread = %reference, "no active thread to resolve"),
            }
        }

        for new_thread in delta.new_threads {
            let text = new_thread.text.trim();
            if text.is_empty() || hot.threads.iter().any(|t| t.text == text) {
                continue;
            }
            hot.threads.push(PlotThread::new(text, unit, new_thread.importance));
        }

        for change in delta.world_changes {
            let text = change.trim();
            if !text.is_empty() {
                hot.world_events.push_back(WorldEvent {
                    text: text.to_string(),
                    unit,
                });
            }
        }

        hot.units_in_volume += 1;
        self.apply_capacity(&mut outcome);
        Ok(outcome)
    }

    /// Close an active thread explicitly.
    pub fn mark_thread_resolved(&mut self, reference: &str) -> Result<PlotThread, ContinuityError> {
        let index = self
            .hot
            .find_thread(reference)
            .ok_or_else(|| ContinuityError::UnknownThread(reference.to_string()))?;
        let unit = self.next_unit().saturating_sub(1).max(1);
        let mut thread = self.hot.threads.remove(index);
        thread.resolve(unit);
        self.hot.resolved_threads.push(thread.clone());
        Ok(thread)
    }

    fn apply_capacity(&mut self, outcome: &mut RecordOutcome) {
        let limits = self.limits;
        for character in &mut self.hot.characters {
            outcome.evicted_notes += capacity::trim_fifo(&mut character.recent_notes, limits.notes);
        }
        outcome.evicted_events = capacity::trim_fifo(&mut self.hot.world_events, limits.events);
        outcome.evicted_threads = capacity::retain_top_threads(&mut self.hot.threads, limits.threads);
        if !outcome.evicted_threads.is_empty() {
            debug!(
                evicted = outcome.evicted_threads.len(),
                "active threads over capacity, lowest-ranked dropped"
            );
        }
    }

    /// Check the size bounds. Used by tests and debug assertions.
    pub fn within_limits(&self) -> bool {
        self.hot
            .characters
            .iter()
            .all(|c| c.recent_notes.len() <= self.limits.notes)
            && self.hot.threads.len() <= self.limits.threads
            && self.hot.world_events.len() <= self.limits.events
    }
}
