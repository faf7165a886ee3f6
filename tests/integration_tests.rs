//! Integration tests for quill
//!
//! Sessions run end to end against a scripted in-process generation service;
//! the CLI tests drive the `quill` binary with `cat` standing in for the
//! service.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use quill::audit::UnitWarning;
use quill::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use quill::config::{CapacityLimits, RetrySection, SessionConfig};
use quill::continuity::{ContinuityStore, NewThread, UnitDelta};
use quill::errors::{ServiceError, SessionError};
use quill::orchestrator::{CommittedUnit, Mode, Orchestrator, Stage, UnitSink};
use quill::review::ReviewScope;
use quill::service::{GenerationRequest, GenerationService, Role};
use quill::story::StorySeed;

// =============================================================================
// Scripted service
// =============================================================================

/// Answers every role with well-formed output derived from the unit number,
/// so two sessions fed the same prompts evolve identically.
#[derive(Default)]
struct ScriptedService {
    reject_all: bool,
    fail_writer: bool,
    garbled_memory: bool,
    calls: Mutex<Vec<Role>>,
}

impl ScriptedService {
    fn rejecting() -> Self {
        Self {
            reject_all: true,
            ..Self::default()
        }
    }

    fn calls(&self, role: Role) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| **r == role).count()
    }
}

fn unit_from(context: &str, marker: &str) -> u32 {
    context
        .split(marker)
        .nth(1)
        .map(|rest| rest.chars().take_while(|c| c.is_ascii_digit()).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(request.role);
        let context = &request.context;
        match request.role {
            Role::Planner => {
                if context.starts_with("Plan volume") {
                    return Ok("Let the volume build slowly toward the crossing.".to_string());
                }
                Ok(r#"{"title": "On the Salt Road", "scenes": [
                    {"title": "Dawn", "summary": "Ilse packs the map."},
                    {"title": "Road", "summary": "The map redraws a river."},
                    {"title": "Dusk", "summary": "A stranger follows."}
                ]}"#
                .to_string())
            }
            Role::Writer => {
                if self.fail_writer {
                    return Err(ServiceError::Fatal("writer offline".into()));
                }
                let unit = unit_from(context, "Write unit ");
                let mut text = format!("# Unit {}\n\n", unit);
                for _ in 0..12 {
                    text.push_str("Ilse walked the salt flats while the map hummed. \"Left,\" she said. ");
                }
                Ok(text)
            }
            Role::Critic => {
                if context.starts_with("Review the draft") {
                    if self.reject_all {
                        Ok("VERDICT: REVISE\n- The ending is abrupt".to_string())
                    } else {
                        Ok("VERDICT: PASS\nSteady.".to_string())
                    }
                } else {
                    Ok("score: 82 - mostly on course".to_string())
                }
            }
            Role::Summarizer => {
                if context.starts_with("Summarize volume") {
                    return Ok("Ilse leaves the city and learns to trust the map.".to_string());
                }
                if context.starts_with("Describe in one sentence") {
                    return Ok("Grew from reluctant heir to navigator.".to_string());
                }
                if self.garbled_memory {
                    return Ok("Sorry, I lost track of the story.".to_string());
                }
                let unit = unit_from(context, "continuity update for unit ");
                let importance = (unit * 7) % 10 + 1;
                Ok(format!(
                    r#"{{"chapter_summary": {{"index": {unit}, "summary": "Ilse travels on, stage {unit}."}},
                        "character_updates": {{"Ilse": "steadier after stage {unit}"}},
                        "new_threads": [{{"text": "Omen {unit} seen near the marsh", "importance": {importance}}}],
                        "world_changes": ["Tide shift {unit}"]}}"#
                ))
            }
        }
    }
}

fn seed(target: u32) -> StorySeed {
    StorySeed::new("The Salt Road", "A map that redraws itself", target)
        .with_character("Ilse", &["stubborn", "precise"])
        .with_character("Brann", &["loyal"])
}

fn config(target: u32) -> SessionConfig {
    SessionConfig {
        retry: RetrySection::immediate(),
        ..SessionConfig::with_target(target)
    }
}

fn start(
    target: u32,
    service: Arc<ScriptedService>,
    checkpoints: Arc<InMemoryCheckpointStore>,
) -> Orchestrator {
    Orchestrator::start(seed(target), config(target), service, checkpoints, Some("saga".into()))
        .unwrap()
}

// =============================================================================
// Mode selection and stage graph
// =============================================================================

mod stage_graph {
    use super::*;

    #[tokio::test]
    async fn test_short_form_never_enters_volume_stages() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = start(20, service, Arc::new(InMemoryCheckpointStore::new()));
        assert_eq!(orchestrator.mode(), Mode::ShortForm);

        let mut visited = vec![orchestrator.stage()];
        while !orchestrator.is_finished() {
            visited.push(orchestrator.step().await.unwrap());
        }

        assert!(!visited.contains(&Stage::VolumePlanning));
        assert!(!visited.contains(&Stage::VolumeReview));
        assert_eq!(orchestrator.session().committed_units(), 20);
        assert_eq!(orchestrator.store().cold.volume_summaries.len(), 0);
        assert!(orchestrator.reviews().is_empty());
    }

    #[tokio::test]
    async fn test_long_form_starts_with_volume_planning() {
        let service = Arc::new(ScriptedService::default());
        let orchestrator = start(120, service, Arc::new(InMemoryCheckpointStore::new()));
        assert_eq!(orchestrator.mode(), Mode::LongForm);
        assert_eq!(orchestrator.stage(), Stage::VolumePlanning);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_start() {
        let mut bad = config(120);
        bad.volume_size = 60;
        let result = Orchestrator::start(
            seed(120),
            bad,
            Arc::new(ScriptedService::default()),
            Arc::new(InMemoryCheckpointStore::new()),
            None,
        );
        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }
}

// =============================================================================
// Volumes, compression and reviews
// =============================================================================

mod volumes {
    use super::*;

    #[tokio::test]
    async fn test_first_volume_compressed_after_unit_25() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = start(120, service, Arc::new(InMemoryCheckpointStore::new()));

        assert_eq!(orchestrator.run_units(25).await.unwrap(), 25);
        assert_eq!(orchestrator.stage(), Stage::VolumeReview);
        assert_eq!(orchestrator.store().hot.units_in_volume, 25);

        orchestrator.step().await.unwrap();
        let store = orchestrator.store();
        assert_eq!(store.cold.volume_summaries.len(), 1);
        assert_eq!(store.current_volume(), 2);
        assert_eq!(store.hot.units_in_volume, 0);
        assert_eq!(store.cold.volume_summaries[0].first_unit, 1);
        assert_eq!(store.cold.volume_summaries[0].last_unit, 25);
        assert_eq!(orchestrator.stage(), Stage::VolumePlanning);
    }

    #[tokio::test]
    async fn test_every_full_volume_compressed_exactly_once() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = start(120, service, Arc::new(InMemoryCheckpointStore::new()));

        let mut previous_volumes = 0;
        while !orchestrator.is_finished() {
            let before_stage = orchestrator.stage();
            let before_volume = orchestrator.store().current_volume();
            orchestrator.step().await.unwrap();

            let store = orchestrator.store();
            if before_stage == Stage::VolumeReview {
                assert_eq!(store.hot.units_in_volume, 0);
                assert_eq!(store.current_volume(), before_volume + 1);
                assert_eq!(store.cold.volume_summaries.len(), previous_volumes + 1);
            } else {
                assert_eq!(store.cold.volume_summaries.len(), previous_volumes);
            }
            previous_volumes = store.cold.volume_summaries.len();
        }

        // 120 units: volumes 1-4 are full, volume 5 stops at 20 units.
        assert_eq!(previous_volumes, 4);
        assert_eq!(orchestrator.store().hot.units_in_volume, 20);
        let volumes: Vec<u32> = orchestrator.store().cold.volume_summaries.iter().map(|v| v.volume).collect();
        assert_eq!(volumes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_reviews_logged_for_volumes_and_milestones() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = start(120, service, Arc::new(InMemoryCheckpointStore::new()));
        orchestrator.run().await.unwrap();

        let reviews = orchestrator.reviews();
        assert_eq!(reviews.volume_reports().count(), 4);
        let milestones: Vec<ReviewScope> = reviews.milestone_reports().map(|r| r.scope).collect();
        assert_eq!(
            milestones,
            vec![ReviewScope::Milestone { unit: 50 }, ReviewScope::Milestone { unit: 100 }]
        );
        assert!(reviews.for_volume(2).is_some());
        for report in reviews.all() {
            assert!(report.overall >= 0.0 && report.overall <= 100.0);
        }
    }

    #[tokio::test]
    async fn test_bounded_growth_over_long_session() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = start(120, service, Arc::new(InMemoryCheckpointStore::new()));

        let mut peak_threads = 0;
        while !orchestrator.is_finished() {
            orchestrator.step().await.unwrap();
            let store = orchestrator.store();
            assert!(store.within_limits());
            for character in &store.hot.characters {
                assert!(character.recent_notes.len() <= 10);
            }
            assert!(store.hot.threads.len() <= 30);
            assert!(store.hot.world_events.len() <= 15);
            peak_threads = peak_threads.max(store.hot.threads.len());
        }
        // One new thread per unit, so the cap must have been hit.
        assert_eq!(peak_threads, 30);
    }
}

// =============================================================================
// Revision loop
// =============================================================================

mod revisions {
    use super::*;

    #[tokio::test]
    async fn test_rejected_drafts_bounded_then_forced() {
        let service = Arc::new(ScriptedService::rejecting());
        let mut orchestrator = start(3, service.clone(), Arc::new(InMemoryCheckpointStore::new()));

        assert_eq!(orchestrator.run_units(1).await.unwrap(), 1);
        assert_eq!(service.calls(Role::Writer), 3);
        assert_eq!(orchestrator.session().revision_iteration, 0);

        let event = orchestrator.commits().get(1).unwrap();
        assert_eq!(event.draft_attempts, 3);
        assert!(event.has_warning(UnitWarning::ForcedAccept));
    }

    #[tokio::test]
    async fn test_zero_revisions_accepts_first_draft() {
        let service = Arc::new(ScriptedService::rejecting());
        let mut cfg = config(2);
        cfg.max_revision_iterations = 0;
        let mut orchestrator = Orchestrator::start(
            seed(2),
            cfg,
            service.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            None,
        )
        .unwrap();

        orchestrator.run().await.unwrap();
        assert_eq!(service.calls(Role::Writer), 2);
        assert_eq!(orchestrator.commits().with_warning(UnitWarning::ForcedAccept).count(), 2);
    }

    #[tokio::test]
    async fn test_writer_failure_commits_degraded_unit() {
        let service = Arc::new(ScriptedService {
            fail_writer: true,
            ..ScriptedService::default()
        });
        let mut orchestrator = start(2, service, Arc::new(InMemoryCheckpointStore::new()));

        orchestrator.run().await.unwrap();
        assert_eq!(orchestrator.session().committed_units(), 2);
        assert_eq!(orchestrator.commits().degraded().count(), 2);
        assert!(orchestrator.commits().get(1).unwrap().has_warning(UnitWarning::WriterFallback));
    }

    #[tokio::test]
    async fn test_unparsable_memory_update_falls_back_after_three_attempts() {
        let service = Arc::new(ScriptedService {
            garbled_memory: true,
            ..ScriptedService::default()
        });
        let mut orchestrator = start(3, service.clone(), Arc::new(InMemoryCheckpointStore::new()));

        assert_eq!(orchestrator.run_units(1).await.unwrap(), 1);
        assert_eq!(service.calls(Role::Summarizer), 3);

        let event = orchestrator.commits().get(1).unwrap();
        assert!(event.is_degraded());
        assert!(event.has_warning(UnitWarning::SummaryFallback));
        assert!(orchestrator.store().hot.unit_summaries[0].degraded);
        assert!(
            orchestrator.store().hot.unit_summaries[0]
                .summary
                .starts_with("Ilse walked the salt flats")
        );
    }
}

// =============================================================================
// Checkpoints and resume
// =============================================================================

mod resume {
    use super::*;

    #[tokio::test]
    async fn test_resume_after_unit_10() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let mut original = start(120, Arc::new(ScriptedService::default()), checkpoints.clone());
        original.run_units(10).await.unwrap();

        // A fresh process only has the checkpoint.
        let mut resumed =
            Orchestrator::resume("saga", Arc::new(ScriptedService::default()), checkpoints.clone())
                .unwrap();
        assert_eq!(resumed.session().current_unit, 11);
        assert_eq!(resumed.store().hot.units_in_volume, 10);
        assert_eq!(resumed.store(), original.store());
        assert_eq!(resumed.stage(), original.stage());
        assert_eq!(resumed.commits(), original.commits());

        // Both continue the same way.
        original.run_units(20).await.unwrap();
        resumed.run_units(20).await.unwrap();
        assert_eq!(resumed.session().current_unit, 31);
        assert_eq!(resumed.store().hot, original.store().hot);
        assert_eq!(
            resumed.store().cold.volume_summaries.len(),
            original.store().cold.volume_summaries.len()
        );
    }

    #[tokio::test]
    async fn test_resume_unknown_session() {
        let result = Orchestrator::resume(
            "missing",
            Arc::new(ScriptedService::default()),
            Arc::new(InMemoryCheckpointStore::new()),
        );
        assert!(matches!(result, Err(SessionError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_one_checkpoint_per_commit() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let mut orchestrator = start(5, Arc::new(ScriptedService::default()), checkpoints.clone());
        assert_eq!(checkpoints.save_count(), 1);

        orchestrator.run().await.unwrap();
        assert_eq!(checkpoints.save_count(), 6);
        let snapshot = checkpoints.load("saga").unwrap().unwrap();
        assert_eq!(snapshot.next_stage, Stage::Terminal);
        assert_eq!(snapshot.session.committed_units(), 5);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_halts_without_advancing() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let mut orchestrator = start(5, Arc::new(ScriptedService::default()), checkpoints.clone());
        orchestrator.run_units(2).await.unwrap();

        checkpoints.fail_saves(true);
        let err = orchestrator.run_units(1).await.unwrap_err();
        assert!(matches!(err, SessionError::CheckpointWrite { .. }));
        assert_eq!(orchestrator.session().committed_units(), 2);
        assert_eq!(orchestrator.store().hot.units_in_volume, 2);
        assert_eq!(orchestrator.stage(), Stage::CommitUnit);

        checkpoints.fail_saves(false);
        orchestrator.run().await.unwrap();
        assert_eq!(orchestrator.session().committed_units(), 5);
        let units: Vec<u32> = orchestrator.commits().all().iter().map(|e| e.unit).collect();
        assert_eq!(units, vec![1, 2, 3, 4, 5]);
    }

    struct FailingSink {
        fail_on: u32,
        written: AtomicU32,
    }

    impl UnitSink for FailingSink {
        fn write_unit(&self, unit: &CommittedUnit<'_>) -> anyhow::Result<()> {
            if unit.unit == self.fail_on {
                anyhow::bail!("disk full");
            }
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_last_checkpoint() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let sink = Arc::new(FailingSink {
            fail_on: 3,
            written: AtomicU32::new(0),
        });
        let mut orchestrator =
            start(5, Arc::new(ScriptedService::default()), checkpoints.clone()).with_sink(sink.clone());

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, SessionError::Sink { unit: 3, .. }));
        assert_eq!(sink.written.load(Ordering::SeqCst), 2);
        let snapshot = checkpoints.load("saga").unwrap().unwrap();
        assert_eq!(snapshot.session.committed_units(), 2);
    }
}

// =============================================================================
// Continuity store properties
// =============================================================================

mod continuity {
    use super::*;

    /// Small deterministic generator so the test needs no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    #[test]
    fn test_thread_eviction_keeps_highest_ranked() {
        let mut store = ContinuityStore::new(CapacityLimits::default());
        let mut rng = Lcg(0x5eed);
        let mut inserted = Vec::new();

        for unit in 1..=50u32 {
            let importance = (rng.next() % 10) as u8 + 1;
            let mut delta = UnitDelta::new(unit, "the road goes on");
            delta.new_threads.push(NewThread {
                text: format!("thread planted in unit {}", unit),
                importance,
            });
            store.record_unit(delta).unwrap();
            inserted.push((importance, unit));
        }

        inserted.sort_by(|a, b| b.cmp(a));
        let expected: HashSet<(u8, u32)> = inserted.into_iter().take(30).collect();
        let retained: HashSet<(u8, u32)> =
            store.hot.threads.iter().map(|t| (t.importance, t.created_at)).collect();

        assert_eq!(store.hot.threads.len(), 30);
        assert_eq!(retained, expected);
    }

    #[test]
    fn test_rejected_delta_changes_nothing() {
        let mut store = ContinuityStore::new(CapacityLimits::default());
        store.record_unit(UnitDelta::new(1, "first")).unwrap();
        let before = store.clone();

        let mut delta = UnitDelta::new(3, "skipped ahead");
        delta.world_changes.push("a flood".into());
        assert!(store.record_unit(delta).is_err());
        assert_eq!(store, before);
    }
}

// =============================================================================
// CLI
// =============================================================================

mod cli {
    use assert_cmd::Command;
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn quill() -> Command {
        cargo_bin_cmd!("quill")
    }

    const SEED: &str = r#"
title = "The Salt Road"
synopsis = "A cartographer inherits a map that redraws itself."
target_units = 3

[[characters]]
name = "Ilse"
traits = ["stubborn"]
"#;

    #[test]
    fn test_help_and_version() {
        quill().arg("--help").assert().success();
        quill().arg("--version").assert().success();
    }

    #[test]
    fn test_status_without_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        quill()
            .current_dir(dir.path())
            .args(["status", "--session", "nothing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No checkpoint found"));
    }

    #[test]
    fn test_list_with_no_sessions() {
        let dir = TempDir::new().unwrap();
        quill()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No sessions found"));
    }

    #[test]
    fn test_run_without_story_fails() {
        let dir = TempDir::new().unwrap();
        quill()
            .current_dir(dir.path())
            .args(["run", "--session", "fresh"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--story"));
    }

    #[test]
    fn test_run_rejects_invalid_story() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("story.toml"), "title = \"\"\ntarget_units = 3\n").unwrap();
        quill()
            .current_dir(dir.path())
            .args(["run", "--story", "story.toml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("title"));
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        quill()
            .current_dir(dir.path())
            .args(["reset", "--session", "saga"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--force"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_status_reset_with_echo_service() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("story.toml"), SEED).unwrap();
        fs::write(dir.path().join("quill.toml"), "[service]\ncommand = \"cat\"\n").unwrap();

        quill()
            .current_dir(dir.path())
            .args(["run", "--story", "story.toml", "--session", "saga", "--units", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1/3 units committed"));
        assert!(dir.path().join("output/saga/unit-0001.md").exists());
        assert!(dir.path().join(".quill/saga.json").exists());

        // Second run picks the checkpoint up without --story.
        quill()
            .current_dir(dir.path())
            .args(["run", "--session", "saga"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Resuming session"))
            .stdout(predicate::str::contains("3/3 units committed"));
        for unit in 1..=3 {
            assert!(dir.path().join(format!("output/saga/unit-{:04}.md", unit)).exists());
        }

        quill()
            .current_dir(dir.path())
            .args(["status", "--session", "saga"])
            .assert()
            .success()
            .stdout(predicate::str::contains("3/3 units"))
            .stdout(predicate::str::contains("short-form"));

        quill()
            .current_dir(dir.path())
            .args(["reports", "--session", "saga"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No reviews yet"));

        quill()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("saga"));

        quill()
            .current_dir(dir.path())
            .args(["reset", "--session", "saga", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Reset complete"));
        assert!(!dir.path().join(".quill/saga.json").exists());
    }
}
