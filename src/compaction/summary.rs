//! Deterministic summaries used when the condenser is unavailable.

use super::{ARC_CHARS, VOLUME_SUMMARY_CHARS};
use crate::continuity::{Character, UnitSummary};
use crate::util::{clip, truncate_chars};

/// Arc recorded for characters with no notes in the volume.
pub const NO_DEVELOPMENT: &str = "no notable development";

const FALLBACK_UNITS: usize = 3;
const FALLBACK_UNIT_CHARS: usize = 50;

/// `Volume N: ` followed by the opening of the first few unit summaries.
pub fn fallback_volume_summary(volume: u32, units: &[UnitSummary]) -> String {
    let pieces: Vec<String> = units
        .iter()
        .take(FALLBACK_UNITS)
        .map(|u| truncate_chars(u.summary.trim(), FALLBACK_UNIT_CHARS))
        .collect();
    let text = format!("Volume {}: {}...", volume, pieces.join(" → "));
    clip(&text, VOLUME_SUMMARY_CHARS)
}

/// The character's latest note, or a placeholder.
pub fn fallback_arc(character: &Character) -> String {
    character
        .recent_notes
        .back()
        .map(|note| clip(note, ARC_CHARS))
        .unwrap_or_else(|| NO_DEVELOPMENT.to_string())
}
