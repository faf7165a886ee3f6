//! The external generation service and the retrying client stages call it through.
//!
//! The service is a black box: it receives a role, a context block and a set
//! of constraints, and returns text. Prompt wording lives in the stage
//! adapters; the service only frames the request.

pub mod client;
pub mod command;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ServiceError;

pub use client::StageClient;
pub use command::CommandService;

/// Which stage is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Writer,
    Critic,
    Summarizer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Planner => write!(f, "planner"),
            Role::Writer => write!(f, "writer"),
            Role::Critic => write!(f, "critic"),
            Role::Summarizer => write!(f, "summarizer"),
        }
    }
}

/// Expected shape of the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub format: ResponseFormat,
    /// Soft length limit for the response, in characters
    pub max_chars: Option<usize>,
    pub instructions: Vec<String>,
}

impl Constraints {
    pub fn json() -> Self {
        Self {
            format: ResponseFormat::Json,
            ..Self::default()
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub role: Role,
    pub context: String,
    pub constraints: Constraints,
}

impl GenerationRequest {
    pub fn new(role: Role, context: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            role,
            context: context.into(),
            constraints,
        }
    }

    /// Single prompt text for services that take one string.
    pub fn render_prompt(&self) -> String {
        let mut prompt = format!("ROLE: {}\n\n", self.role);
        prompt.push_str(&self.context);
        if !self.constraints.instructions.is_empty() {
            prompt.push_str("\n\nRequirements:\n");
            for instruction in &self.constraints.instructions {
                prompt.push_str(&format!("- {}\n", instruction));
            }
        }
        if let Some(max_chars) = self.constraints.max_chars {
            prompt.push_str(&format!("\nKeep the response under {} characters.\n", max_chars));
        }
        if self.constraints.format == ResponseFormat::Json {
            prompt.push_str("\nRespond with a single JSON object and nothing else.\n");
        }
        prompt
    }
}

/// A text generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError>;
}
