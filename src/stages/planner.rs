//! Unit planner: turns the planning context into a scene outline for one unit.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::volume_planner::VolumeOutline;
use crate::continuity::{PlanningContext, ThreadAnalysis};
use crate::parse::parse_object;
use crate::service::{Constraints, StageClient};

/// Outlines with fewer scenes are rejected.
pub const MIN_SCENES: usize = 2;
/// World events shown to the planner.
const PLANNER_EVENTS: usize = 3;
const PLANNER_RECENT_UNITS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutline {
    pub unit: u32,
    pub title: String,
    pub scenes: Vec<Scene>,
    /// Generated locally because the service could not produce a usable outline
    #[serde(default)]
    pub fallback: bool,
}

impl UnitOutline {
    /// Three generic scenes that keep the story moving.
    pub fn fallback(unit: u32) -> Self {
        let scenes = [
            ("Opening", "Pick up where the previous unit left off and re-establish the situation."),
            ("Complication", "Advance the most pressing open thread and raise the stakes."),
            ("Turn", "End on a change that sets up the next unit."),
        ]
        .into_iter()
        .map(|(title, summary)| Scene {
            title: title.to_string(),
            summary: summary.to_string(),
        })
        .collect();
        Self {
            unit,
            title: format!("Unit {}", unit),
            scenes,
            fallback: true,
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("Unit {}: {}\n", self.unit, self.title);
        for (i, scene) in self.scenes.iter().enumerate() {
            out.push_str(&format!("{}. {}: {}\n", i + 1, scene.title, scene.summary));
        }
        out
    }
}

/// Read an outline from a planner response. Scenes may be objects or bare strings.
pub fn parse_outline(unit: u32, response: &str) -> Option<UnitOutline> {
    let (map, repairs) = parse_object(response).ok()?;
    if !repairs.is_empty() {
        debug!(unit, ?repairs, "planner response repaired");
    }

    let title = map
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unit {}", unit));

    let scenes: Vec<Scene> = map
        .get("scenes")
        .and_then(Value::as_array)?
        .iter()
        .enumerate()
        .filter_map(|(i, scene)| match scene {
            Value::String(text) if !text.trim().is_empty() => Some(Scene {
                title: format!("Scene {}", i + 1),
                summary: text.trim().to_string(),
            }),
            Value::Object(fields) => {
                let summary = fields
                    .get("summary")
                    .or_else(|| fields.get("description"))
                    .and_then(Value::as_str)?
                    .trim()
                    .to_string();
                let title = fields
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Scene {}", i + 1));
                (!summary.is_empty()).then_some(Scene { title, summary })
            }
            _ => None,
        })
        .collect();

    (scenes.len() >= MIN_SCENES).then_some(UnitOutline {
        unit,
        title,
        scenes,
        fallback: false,
    })
}

pub struct Planner {
    client: StageClient,
}

impl Planner {
    pub fn new(client: StageClient) -> Self {
        Self { client }
    }

    /// Plan one unit. Never fails: unusable responses yield [`UnitOutline::fallback`].
    pub async fn plan_unit(
        &self,
        context: &PlanningContext,
        threads: &ThreadAnalysis,
        volume: Option<&VolumeOutline>,
        story_title: &str,
    ) -> UnitOutline {
        let unit = context.next_unit;
        let prompt = build_prompt(context, threads, volume, story_title);
        let constraints = Constraints::json()
            .with_instruction(format!("Plan at least {} scenes", MIN_SCENES))
            .with_instruction(r#"Use the shape {"title": "...", "scenes": [{"title": "...", "summary": "..."}]}"#);

        match self.client.generate(prompt, constraints).await {
            Ok(response) => parse_outline(unit, &response).unwrap_or_else(|| {
                warn!(unit, "planner response unusable, using fallback outline");
                UnitOutline::fallback(unit)
            }),
            Err(err) => {
                warn!(unit, error = %err, "planner unavailable, using fallback outline");
                UnitOutline::fallback(unit)
            }
        }
    }
}

fn build_prompt(
    context: &PlanningContext,
    threads: &ThreadAnalysis,
    volume: Option<&VolumeOutline>,
    story_title: &str,
) -> String {
    let mut prompt = format!(
        "Plan unit {} of \"{}\" (volume {}).\n\n",
        context.next_unit, story_title, context.current_volume
    );
    if let Some(volume) = volume.filter(|v| !v.is_empty()) {
        prompt.push_str(&volume.render());
        prompt.push('\n');
    }
    prompt.push_str(&context.render(PLANNER_EVENTS, PLANNER_RECENT_UNITS));
    let guidance = threads.guidance();
    if !guidance.is_empty() {
        prompt.push('\n');
        prompt.push_str(&guidance);
    }
    prompt
}
