//! Writer: drafts the unit text from its outline.

use tracing::warn;

use super::planner::UnitOutline;
use crate::continuity::PlanningContext;
use crate::service::{Constraints, StageClient};

const WRITER_EVENTS: usize = 5;
const WRITER_RECENT_UNITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    /// Placeholder written locally because the service was unavailable
    pub fallback: bool,
}

pub struct Writer {
    client: StageClient,
}

impl Writer {
    pub fn new(client: StageClient) -> Self {
        Self { client }
    }

    /// Draft a unit. `feedback` carries the critic's issues on a revision pass.
    pub async fn draft(
        &self,
        outline: &UnitOutline,
        context: &PlanningContext,
        style: &serde_json::Value,
        feedback: &[String],
    ) -> Draft {
        let mut prompt = format!("Write unit {}.\n\nOutline:\n{}\n", outline.unit, outline.render());
        prompt.push_str(&context.render(WRITER_EVENTS, WRITER_RECENT_UNITS));
        if !style.is_null() {
            prompt.push_str(&format!("\nStyle: {}\n", style));
        }
        if !feedback.is_empty() {
            prompt.push_str("\nThe previous draft was rejected. Address these issues:\n");
            for issue in feedback {
                prompt.push_str(&format!("- {}\n", issue));
            }
        }

        let constraints = Constraints::default()
            .with_instruction("Write prose only, starting with a markdown heading for the unit title");

        match self.client.generate(prompt, constraints).await {
            Ok(text) if !text.trim().is_empty() => Draft {
                text,
                fallback: false,
            },
            Ok(_) | Err(_) => {
                warn!(unit = outline.unit, "writer unavailable, committing placeholder draft");
                Draft {
                    text: placeholder(outline),
                    fallback: true,
                }
            }
        }
    }
}

/// Deterministic stand-in text built from the outline.
pub fn placeholder(outline: &UnitOutline) -> String {
    let mut text = format!("# {}\n\n", outline.title);
    for scene in &outline.scenes {
        text.push_str(&format!("{}\n\n", scene.summary));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_uses_outline() {
        let outline = UnitOutline::fallback(3);
        let text = placeholder(&outline);
        assert!(text.starts_with("# Unit 3"));
        assert_eq!(text.matches("\n\n").count(), 4);
    }
}
