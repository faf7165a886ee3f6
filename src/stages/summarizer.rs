//! Summarizer: turns committed text into continuity deltas and volume summaries.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::compaction::{ARC_CHARS, VOLUME_SUMMARY_CHARS, VolumeCondenser};
use crate::continuity::{Character, DEFAULT_THREAD_IMPORTANCE, NewThread, UnitDelta, UnitSummary};
use crate::errors::MalformedResponse;
use crate::parse::parse_object;
use crate::service::{Constraints, StageClient};
use crate::story::VolumeFramework;
use crate::util::{clip, first_content_line, truncate_chars};

/// Generate-and-parse rounds before falling back to a local summary.
pub const MEMORY_UPDATE_ATTEMPTS: u32 = 3;
const FALLBACK_SUMMARY_CHARS: usize = 100;
const UNIT_SUMMARY_CHARS: usize = 300;
const SUMMARIZER_TEXT_CHARS: usize = 12_000;

/// Result of summarizing one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryUpdate {
    pub delta: UnitDelta,
    /// Generate-and-parse rounds used
    pub attempts: u32,
}

/// Read a memory-update response into a delta for `unit`.
pub fn parse_memory_update(unit: u32, response: &str) -> Result<UnitDelta, MalformedResponse> {
    let (map, repairs) = parse_object(response).map_err(|failure| MalformedResponse {
        stage: "summarizer",
        reason: failure.to_string(),
    })?;
    if !repairs.is_empty() {
        debug!(unit, ?repairs, "memory update repaired");
    }

    let summary = match map.get("chapter_summary").or_else(|| map.get("summary")) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Object(fields)) => fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        _ => String::new(),
    };
    if summary.is_empty() {
        return Err(MalformedResponse {
            stage: "summarizer",
            reason: "missing chapter_summary".to_string(),
        });
    }

    let mut delta = UnitDelta::new(unit, &clip(&summary, UNIT_SUMMARY_CHARS));
    delta.character_notes = character_updates(map.get("character_updates"));
    delta.new_threads = threads_from(&map, "new_threads")
        .into_iter()
        .chain(threads_from(&map, "plot_developments"))
        .collect();
    delta.world_changes = strings(map.get("world_changes"))
        .into_iter()
        .chain(strings(map.get("important_changes")))
        .collect();
    delta.resolved_threads = strings(map.get("resolved_threads"));
    Ok(delta)
}

/// Deterministic summary: the first line of prose, clipped.
pub fn fallback_summary(unit: u32, text: &str) -> UnitDelta {
    let line = first_content_line(text).unwrap_or("(no summary available)");
    let mut delta = UnitDelta::new(unit, &clip(line, FALLBACK_SUMMARY_CHARS));
    delta.degraded = true;
    delta
}

fn character_updates(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Object(fields)) => fields
            .iter()
            .filter_map(|(name, note)| note.as_str().map(|n| (name.clone(), n.to_string())))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                let note = item
                    .get("update")
                    .or_else(|| item.get("note"))
                    .and_then(Value::as_str)?;
                Some((name.to_string(), note.to_string()))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Threads arrive as bare strings or as `{text, importance}` objects; both become `NewThread`.
fn threads_from(map: &Map<String, Value>, key: &str) -> Vec<NewThread> {
    let Some(Value::Array(items)) = map.get(key) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(NewThread {
                text: text.clone(),
                importance: DEFAULT_THREAD_IMPORTANCE,
            }),
            Value::Object(fields) => {
                let text = fields
                    .get("text")
                    .or_else(|| fields.get("description"))
                    .and_then(Value::as_str)?;
                let importance = fields
                    .get("importance")
                    .and_then(Value::as_u64)
                    .map(|i| i.clamp(1, 10) as u8)
                    .unwrap_or(DEFAULT_THREAD_IMPORTANCE);
                Some(NewThread {
                    text: text.to_string(),
                    importance,
                })
            }
            _ => None,
        })
        .filter(|t| !t.text.trim().is_empty())
        .collect()
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(fields) => fields
                    .get("text")
                    .or_else(|| fields.get("description"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub struct Summarizer {
    client: StageClient,
}

impl Summarizer {
    pub fn new(client: StageClient) -> Self {
        Self { client }
    }

    /// Extract the continuity delta for a committed unit.
    ///
    /// Unparsable responses are regenerated up to [`MEMORY_UPDATE_ATTEMPTS`]
    /// times; after that the delta holds only a fallback summary.
    pub async fn summarize_unit(&self, unit: u32, text: &str, roster: &[String]) -> MemoryUpdate {
        let prompt = format!(
            "Extract the continuity update for unit {}.\nKnown characters: {}\n\nText:\n{}\n",
            unit,
            roster.join(", "),
            truncate_chars(text, SUMMARIZER_TEXT_CHARS)
        );
        let constraints = Constraints::json()
            .with_instruction(
                r#"Fields: chapter_summary {index, summary}, character_updates {name: note}, new_threads [{text, importance}], plot_developments [], world_changes [], resolved_threads []"#,
            )
            .with_instruction("Keep the summary under 300 characters");

        for attempt in 1..=MEMORY_UPDATE_ATTEMPTS {
            match self.client.generate(prompt.clone(), constraints.clone()).await {
                Ok(response) => match parse_memory_update(unit, &response) {
                    Ok(delta) => {
                        return MemoryUpdate { delta, attempts: attempt };
                    }
                    Err(err) => warn!(unit, attempt, error = %err, "regenerating memory update"),
                },
                Err(err) => {
                    warn!(unit, error = %err, "summarizer unavailable, using fallback summary");
                    return MemoryUpdate {
                        delta: fallback_summary(unit, text),
                        attempts: attempt,
                    };
                }
            }
        }

        MemoryUpdate {
            delta: fallback_summary(unit, text),
            attempts: MEMORY_UPDATE_ATTEMPTS,
        }
    }
}

#[async_trait]
impl VolumeCondenser for Summarizer {
    async fn condense_volume(
        &self,
        volume: u32,
        units: &[UnitSummary],
        framework: Option<&VolumeFramework>,
    ) -> Option<String> {
        let mut prompt = format!("Summarize volume {} from its unit summaries.\n", volume);
        if let Some(framework) = framework {
            prompt.push_str(&format!(
                "Volume title: {}\nIntended goal: {}\n",
                framework.title, framework.core_goal
            ));
        }
        prompt.push('\n');
        for unit in units {
            prompt.push_str(&format!("Unit {}: {}\n", unit.unit, unit.summary));
        }
        let constraints = Constraints::default().with_max_chars(VOLUME_SUMMARY_CHARS);

        match self.client.generate(prompt, constraints).await {
            Ok(text) if !text.trim().is_empty() => Some(clip(&text, VOLUME_SUMMARY_CHARS)),
            Ok(_) => None,
            Err(err) => {
                warn!(volume, error = %err, "volume summary unavailable");
                None
            }
        }
    }

    async fn condense_arc(&self, character: &Character) -> Option<String> {
        let mut prompt = format!(
            "Describe in one sentence how {} developed over this volume.\n",
            character.name
        );
        for note in &character.recent_notes {
            prompt.push_str(&format!("- {}\n", note));
        }
        let constraints = Constraints::default().with_max_chars(ARC_CHARS);

        match self.client.generate(prompt, constraints).await {
            Ok(text) if !text.trim().is_empty() => Some(clip(&text, ARC_CHARS)),
            Ok(_) | Err(_) => None,
        }
    }
}
