//! The story seed: everything a session is started from.
//!
//! A seed is read once from `story.toml` and is read-only to the
//! orchestrator afterwards. It carries the character roster, the optional
//! top-level outline and the per-volume frameworks used to guide planning.
//!
//! ```toml
//! title = "The Salt Road"
//! synopsis = "A cartographer inherits a map that redraws itself."
//! target_units = 120
//! foreshadow_strategy = "balanced"
//!
//! [[characters]]
//! name = "Ilse"
//! traits = ["stubborn", "precise"]
//!
//! [outline]
//! main_goal = "Ilse reaches the end of the salt road"
//! key_milestones = [{ unit = 50, event = "Ilse crosses the dry sea" }]
//!
//! [[volumes]]
//! volume = 1
//! title = "The Inheritance"
//! units = [1, 25]
//! core_goal = "Ilse accepts the map"
//! key_events = ["the funeral", "the first redraw"]
//! foreshadowing = ["the ferryman's debt"]
//! ending_state = "Ilse leaves the city"
//!
//! [style]
//! tone = "wry"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::ConfigError;

/// How eagerly the session plants new mysteries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForeshadowStrategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl ForeshadowStrategy {
    /// Importance given to the synopsis when it is planted as the first thread.
    pub fn synopsis_importance(self) -> u8 {
        match self {
            ForeshadowStrategy::Conservative => 5,
            ForeshadowStrategy::Balanced | ForeshadowStrategy::Aggressive => 10,
        }
    }
}

/// A roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSeed {
    pub name: String,
    #[serde(default)]
    pub traits: Vec<String>,
}

/// An event the story is expected to reach by a given unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub unit: u32,
    pub event: String,
}

/// Top-level goal of the whole story.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryOutline {
    #[serde(default)]
    pub main_goal: String,
    #[serde(default)]
    pub main_conflict: String,
    #[serde(default)]
    pub protagonist_arc: String,
    #[serde(default)]
    pub key_milestones: Vec<Milestone>,
}

impl StoryOutline {
    /// Milestones whose unit has been reached, latest last.
    pub fn due_milestones(&self, committed_units: u32) -> Vec<&Milestone> {
        let mut due: Vec<&Milestone> = self
            .key_milestones
            .iter()
            .filter(|m| m.unit <= committed_units)
            .collect();
        due.sort_by_key(|m| m.unit);
        due
    }
}

/// Per-volume target supplied with the seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeFramework {
    pub volume: u32,
    #[serde(default)]
    pub title: String,
    /// Inclusive unit range covered by this volume
    #[serde(default)]
    pub units: Option<(u32, u32)>,
    #[serde(default)]
    pub core_goal: String,
    #[serde(default)]
    pub key_events: Vec<String>,
    #[serde(default)]
    pub foreshadowing: Vec<String>,
    #[serde(default)]
    pub ending_state: String,
}

/// Everything a session is started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySeed {
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub target_units: u32,
    #[serde(default)]
    pub characters: Vec<CharacterSeed>,
    #[serde(default)]
    pub outline: Option<StoryOutline>,
    #[serde(default)]
    pub volumes: Vec<VolumeFramework>,
    /// Style parameters, passed through to the writer untouched
    #[serde(default)]
    pub style: serde_json::Value,
    #[serde(default)]
    pub foreshadow_strategy: ForeshadowStrategy,
}

impl StorySeed {
    pub fn new(title: &str, synopsis: &str, target_units: u32) -> Self {
        Self {
            title: title.to_string(),
            synopsis: synopsis.to_string(),
            target_units,
            characters: Vec::new(),
            outline: None,
            volumes: Vec::new(),
            style: serde_json::Value::Null,
            foreshadow_strategy: ForeshadowStrategy::default(),
        }
    }

    pub fn with_character(mut self, name: &str, traits: &[&str]) -> Self {
        self.characters.push(CharacterSeed {
            name: name.to_string(),
            traits: traits.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn with_outline(mut self, outline: StoryOutline) -> Self {
        self.outline = Some(outline);
        self
    }

    pub fn with_volume(mut self, framework: VolumeFramework) -> Self {
        self.volumes.push(framework);
        self
    }

    /// Load a seed from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Check the parts of the seed the orchestrator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.title.trim().is_empty() {
            return Err(ConfigError::MissingTitle);
        }
        let mut seen = HashSet::new();
        for character in &self.characters {
            if !seen.insert(character.name.as_str()) {
                return Err(ConfigError::DuplicateCharacter(character.name.clone()));
            }
        }
        Ok(())
    }

    /// The framework for a volume, if one was supplied.
    pub fn framework_for(&self, volume: u32) -> Option<&VolumeFramework> {
        self.volumes.iter().find(|v| v.volume == volume)
    }

    pub fn roster_names(&self) -> Vec<String> {
        self.characters.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
title = "The Salt Road"
synopsis = "A cartographer inherits a map that redraws itself."
target_units = 120
foreshadow_strategy = "conservative"

[[characters]]
name = "Ilse"
traits = ["stubborn", "precise"]

[[characters]]
name = "Brann"

[outline]
main_goal = "Ilse reaches the end of the salt road"
key_milestones = [{ unit = 50, event = "Ilse crosses the dry sea" }, { unit = 20, event = "The map burns" }]

[[volumes]]
volume = 2
title = "Dry Sea"
units = [26, 50]
key_events = ["the crossing"]

[style]
tone = "wry"
person = 3
"#;

    #[test]
    fn test_parse_full_seed() {
        let seed: StorySeed = toml::from_str(SEED).unwrap();
        assert_eq!(seed.target_units, 120);
        assert_eq!(seed.characters.len(), 2);
        assert!(seed.characters[1].traits.is_empty());
        assert_eq!(seed.foreshadow_strategy, ForeshadowStrategy::Conservative);
        assert_eq!(seed.style["tone"], "wry");
        let volume = seed.framework_for(2).unwrap();
        assert_eq!(volume.units, Some((26, 50)));
        assert!(seed.framework_for(1).is_none());
        assert!(seed.validate().is_ok());
    }

    #[test]
    fn test_due_milestones_sorted_by_unit() {
        let seed: StorySeed = toml::from_str(SEED).unwrap();
        let outline = seed.outline.unwrap();
        let due = outline.due_milestones(50);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].unit, 20);
        assert_eq!(due[1].unit, 50);
        assert_eq!(outline.due_milestones(19).len(), 0);
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let seed = StorySeed::new("t", "s", 10)
            .with_character("Ilse", &[])
            .with_character("Ilse", &["twin"]);
        assert!(matches!(
            seed.validate(),
            Err(ConfigError::DuplicateCharacter(name)) if name == "Ilse"
        ));
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        assert!(matches!(
            StorySeed::new("  ", "s", 10).validate(),
            Err(ConfigError::MissingTitle)
        ));
    }

    #[test]
    fn test_synopsis_importance_by_strategy() {
        assert_eq!(ForeshadowStrategy::Conservative.synopsis_importance(), 5);
        assert_eq!(ForeshadowStrategy::Balanced.synopsis_importance(), 10);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StorySeed::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
