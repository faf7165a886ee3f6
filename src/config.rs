//! Session configuration and the `quill.toml` file format.
//!
//! Configuration is layered: file → environment → CLI flags. Every field has
//! a default, so an empty (or missing) file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [session]
//! volume_size = 25
//! milestone_interval = 50
//! max_revision_iterations = 2
//! reveal_threshold = 5
//!
//! [session.capacity]
//! notes = 10
//! threads = 30
//! events = 15
//!
//! [session.retry.writer]
//! max_attempts = 3
//! base_ms = 2
//! factor = 1000
//! max_delay_ms = 60000
//! timeout_secs = 300
//!
//! [service]
//! command = "claude"
//! args = ["--print"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;

/// Sessions with at least this many target units run in long-form mode.
pub const LONG_FORM_THRESHOLD: u32 = 50;

/// Upper bounds for the continuity working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimits {
    /// Recent development notes kept per character
    #[serde(default = "default_notes")]
    pub notes: usize,
    /// Active (unresolved) plot threads
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// World events in the working set
    #[serde(default = "default_events")]
    pub events: usize,
}

fn default_notes() -> usize {
    10
}

fn default_threads() -> usize {
    30
}

fn default_events() -> usize {
    15
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self {
            notes: default_notes(),
            threads: default_threads(),
            events: default_events(),
        }
    }
}

/// Retry and timeout policy for one generation stage.
///
/// Delays grow as `base_ms^n * factor` milliseconds, capped at `max_delay_ms`,
/// with jitter applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total calls, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_ms() -> u64 {
    2
}

fn default_factor() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_timeout_secs() -> u64 {
    300
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_ms: default_base_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// A policy with millisecond delays, for tests and local services.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_ms: 1,
            factor: 1,
            max_delay_ms: 1,
            timeout_secs: 5,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn planner() -> Self {
        Self::with_attempts(3)
    }

    fn writer() -> Self {
        Self::with_attempts(3)
    }

    fn critic() -> Self {
        Self::with_attempts(3)
    }

    fn summarizer() -> Self {
        Self::with_attempts(3)
    }
}

/// A `[session.retry.<stage>]` table as written. Missing fields fall back to
/// that stage's default policy.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct PartialRetryPolicy {
    max_attempts: Option<u32>,
    base_ms: Option<u64>,
    factor: Option<u64>,
    max_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

impl PartialRetryPolicy {
    fn over(self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_ms: self.base_ms.unwrap_or(base.base_ms),
            factor: self.factor.unwrap_or(base.factor),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct PartialRetrySection {
    #[serde(default)]
    planner: PartialRetryPolicy,
    #[serde(default)]
    writer: PartialRetryPolicy,
    #[serde(default)]
    critic: PartialRetryPolicy,
    #[serde(default)]
    summarizer: PartialRetryPolicy,
}

impl From<PartialRetrySection> for RetrySection {
    fn from(partial: PartialRetrySection) -> Self {
        Self {
            planner: partial.planner.over(RetryPolicy::planner()),
            writer: partial.writer.over(RetryPolicy::writer()),
            critic: partial.critic.over(RetryPolicy::critic()),
            summarizer: partial.summarizer.over(RetryPolicy::summarizer()),
        }
    }
}

/// Per-stage retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PartialRetrySection")]
pub struct RetrySection {
    pub planner: RetryPolicy,
    pub writer: RetryPolicy,
    pub critic: RetryPolicy,
    pub summarizer: RetryPolicy,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            planner: RetryPolicy::planner(),
            writer: RetryPolicy::writer(),
            critic: RetryPolicy::critic(),
            summarizer: RetryPolicy::summarizer(),
        }
    }
}

impl RetrySection {
    /// Same attempt counts as the defaults, without the waiting.
    pub fn immediate() -> Self {
        let defaults = Self::default();
        Self {
            planner: RetryPolicy::immediate(defaults.planner.max_attempts),
            writer: RetryPolicy::immediate(defaults.writer.max_attempts),
            critic: RetryPolicy::immediate(defaults.critic.max_attempts),
            summarizer: RetryPolicy::immediate(defaults.summarizer.max_attempts),
        }
    }
}

/// Parameters of one generation session. Validated once at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of units to generate. Usually taken from the story seed.
    #[serde(default)]
    pub target_units: u32,
    #[serde(default = "default_volume_size")]
    pub volume_size: u32,
    #[serde(default = "default_milestone_interval")]
    pub milestone_interval: u32,
    #[serde(default = "default_max_revision_iterations")]
    pub max_revision_iterations: u32,
    /// Units after which a pending thread should be revealed
    #[serde(default = "default_reveal_threshold")]
    pub reveal_threshold: u32,
    #[serde(default)]
    pub capacity: CapacityLimits,
    #[serde(default)]
    pub retry: RetrySection,
}

fn default_volume_size() -> u32 {
    25
}

fn default_milestone_interval() -> u32 {
    50
}

fn default_max_revision_iterations() -> u32 {
    2
}

fn default_reveal_threshold() -> u32 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_units: 0,
            volume_size: default_volume_size(),
            milestone_interval: default_milestone_interval(),
            max_revision_iterations: default_max_revision_iterations(),
            reveal_threshold: default_reveal_threshold(),
            capacity: CapacityLimits::default(),
            retry: RetrySection::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_target(target_units: u32) -> Self {
        Self {
            target_units,
            ..Self::default()
        }
    }

    pub fn is_long_form(&self) -> bool {
        self.target_units >= LONG_FORM_THRESHOLD
    }

    /// Reject configurations the orchestrator cannot honor.
    ///
    /// `max_revision_iterations` may be zero (drafts are accepted as-is);
    /// every other count must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 8] = [
            ("target_units", self.target_units as u64),
            ("volume_size", self.volume_size as u64),
            ("milestone_interval", self.milestone_interval as u64),
            ("reveal_threshold", self.reveal_threshold as u64),
            ("capacity.notes", self.capacity.notes as u64),
            ("capacity.threads", self.capacity.threads as u64),
            ("capacity.events", self.capacity.events as u64),
            ("retry.max_attempts", self.min_attempts() as u64),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::NotPositive { field: *field });
        }

        if self.volume_size > self.milestone_interval {
            return Err(ConfigError::VolumeExceedsMilestone {
                volume_size: self.volume_size,
                milestone_interval: self.milestone_interval,
            });
        }

        Ok(())
    }

    fn min_attempts(&self) -> u32 {
        [
            self.retry.planner.max_attempts,
            self.retry.writer.max_attempts,
            self.retry.critic.max_attempts,
            self.retry.summarizer.max_attempts,
        ]
        .into_iter()
        .min()
        .unwrap_or(0)
    }
}

/// How to reach the generation service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSection {
    /// Executable that reads a prompt on stdin and prints the response
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// The complete quill.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuillToml {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub service: ServiceSection,
}

impl QuillToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let content = toml::to_string_pretty(self).context("Failed to serialize quill.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Service command, with fallback to the `QUILL_SERVICE_CMD` environment variable.
    pub fn service_command(&self) -> String {
        self.service
            .command
            .clone()
            .or_else(|| std::env::var("QUILL_SERVICE_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Service arguments. The default `claude` command runs in print mode.
    pub fn service_args(&self) -> Vec<String> {
        if self.service.command.is_none() && self.service.args.is_empty() {
            if std::env::var("QUILL_SERVICE_CMD").is_ok() {
                return Vec::new();
            }
            return vec!["--print".to_string()];
        }
        self.service.args.clone()
    }
}

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("quill.toml")
}
