//! Volume planner: expands a volume framework into guidance for unit planning.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::continuity::PlanningContext;
use crate::service::{Constraints, StageClient};
use crate::story::VolumeFramework;
use crate::util::clip;

const GUIDANCE_CHARS: usize = 1200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOutline {
    pub volume: u32,
    pub title: String,
    pub core_goal: String,
    pub key_events: Vec<String>,
    pub foreshadowing: Vec<String>,
    pub ending_state: String,
    /// Free-text plan for the volume
    pub guidance: String,
    #[serde(default)]
    pub fallback: bool,
}

impl VolumeOutline {
    /// Outline for a volume without a framework: planning is unguided.
    pub fn empty(volume: u32) -> Self {
        Self {
            volume,
            ..Self::default()
        }
    }

    fn from_framework(framework: &VolumeFramework, guidance: String, fallback: bool) -> Self {
        Self {
            volume: framework.volume,
            title: framework.title.clone(),
            core_goal: framework.core_goal.clone(),
            key_events: framework.key_events.clone(),
            foreshadowing: framework.foreshadowing.clone(),
            ending_state: framework.ending_state.clone(),
            guidance,
            fallback,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.core_goal.is_empty() && self.key_events.is_empty()
            && self.guidance.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = format!("Volume {}: {}\n", self.volume, self.title);
        if !self.core_goal.is_empty() {
            out.push_str(&format!("Goal: {}\n", self.core_goal));
        }
        if !self.key_events.is_empty() {
            out.push_str(&format!("Key events: {}\n", self.key_events.join("; ")));
        }
        if !self.foreshadowing.is_empty() {
            out.push_str(&format!("Foreshadowing to plant: {}\n", self.foreshadowing.join("; ")));
        }
        if !self.ending_state.is_empty() {
            out.push_str(&format!("Ends with: {}\n", self.ending_state));
        }
        if !self.guidance.is_empty() {
            out.push_str(&format!("Plan: {}\n", self.guidance));
        }
        out
    }
}

pub struct VolumePlanner {
    client: StageClient,
}

impl VolumePlanner {
    pub fn new(client: StageClient) -> Self {
        Self { client }
    }

    /// Plan a volume. A missing framework gives an empty outline without calling the service.
    pub async fn plan_volume(
        &self,
        volume: u32,
        framework: Option<&VolumeFramework>,
        context: &PlanningContext,
    ) -> VolumeOutline {
        let Some(framework) = framework else {
            return VolumeOutline::empty(volume);
        };

        let mut prompt = format!("Plan volume {} of the story.\n\n", volume);
        prompt.push_str(&VolumeOutline::from_framework(framework, String::new(), false).render());
        prompt.push('\n');
        prompt.push_str(&context.render(3, 3));

        let constraints = Constraints::default()
            .with_max_chars(GUIDANCE_CHARS)
            .with_instruction("Describe how the volume's units should progress toward its goal");

        match self.client.generate(prompt, constraints).await {
            Ok(text) if !text.trim().is_empty() => {
                VolumeOutline::from_framework(framework, clip(&text, GUIDANCE_CHARS), false)
            }
            Ok(_) | Err(_) => {
                warn!(volume, "volume planner unavailable, using framework title");
                let guidance = format!("Volume {}: {}", volume, framework.title);
                VolumeOutline::from_framework(framework, guidance, true)
            }
        }
    }
}
