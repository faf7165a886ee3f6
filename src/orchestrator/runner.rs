//! The session run loop.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::{Facts, Mode, Session, Stage, generate_session_id};
use crate::audit::{CommitEvent, CommitLog, UnitWarning};
use crate::checkpoint::{CheckpointStore, SessionSnapshot};
use crate::compaction::CompactionEngine;
use crate::config::SessionConfig;
use crate::continuity::{ContinuityStore, ThreadAnalysis};
use crate::errors::SessionError;
use crate::review::{self, ReviewLog, milestone, volume};
use crate::service::GenerationService;
use crate::stages::writer::placeholder;
use crate::stages::{Draft, Stages, UnitOutline, Verdict};
use crate::story::StorySeed;

/// A unit as handed to a [`UnitSink`].
#[derive(Debug, Clone, Copy)]
pub struct CommittedUnit<'a> {
    pub session_id: &'a str,
    pub unit: u32,
    pub volume: u32,
    pub title: &'a str,
    pub text: &'a str,
    pub summary: &'a str,
    /// The text or its summary came from a local fallback
    pub degraded: bool,
}

/// Receives every committed unit before its checkpoint is written.
///
/// A failing sink halts the session with the previous checkpoint intact,
/// so the unit is regenerated on resume.
pub trait UnitSink: Send + Sync {
    fn write_unit(&self, unit: &CommittedUnit<'_>) -> anyhow::Result<()>;
}

/// Work on the unit in flight. Never checkpointed.
#[derive(Debug, Default)]
struct Workbench {
    outline: Option<UnitOutline>,
    draft: Option<Draft>,
    verdict: Option<Verdict>,
    draft_attempts: u32,
    warnings: Vec<UnitWarning>,
}

impl Workbench {
    fn warn(&mut self, warning: UnitWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

/// Drives one session from its current stage to `Terminal`.
///
/// Owns the session, its continuity store and both logs. Stages only see
/// read-only projections; every mutation happens here. Commits are applied
/// to copies and swapped in once the checkpoint is durable, so an error
/// leaves the orchestrator exactly at its last checkpoint.
pub struct Orchestrator {
    session: Session,
    store: ContinuityStore,
    reviews: ReviewLog,
    commits: CommitLog,
    stage: Stage,
    stages: Stages,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Option<Arc<dyn UnitSink>>,
    bench: Workbench,
}

impl Orchestrator {
    /// Start a new session and write its initial checkpoint.
    ///
    /// `config.target_units` of zero means "use the seed's target".
    pub fn start(
        seed: StorySeed,
        mut config: SessionConfig,
        service: Arc<dyn GenerationService>,
        checkpoints: Arc<dyn CheckpointStore>,
        session_id: Option<String>,
    ) -> Result<Self, SessionError> {
        if config.target_units == 0 {
            config.target_units = seed.target_units;
        }
        seed.validate()?;
        config.validate()?;

        let id = session_id.unwrap_or_else(generate_session_id);
        let store = ContinuityStore::from_seed(&seed, config.capacity);
        let stages = Stages::new(service, &config.retry);
        let session = Session::new(id, seed, config);
        let stage = session.mode.entry_stage();

        info!(
            session = %session.id,
            mode = %session.mode,
            target = session.config.target_units,
            "session started"
        );

        let orchestrator = Self {
            session,
            store,
            reviews: ReviewLog::new(),
            commits: CommitLog::new(),
            stage,
            stages,
            checkpoints,
            sink: None,
            bench: Workbench::default(),
        };
        orchestrator.save_snapshot(
            &orchestrator.session,
            &orchestrator.store,
            &orchestrator.reviews,
            &orchestrator.commits,
            stage,
        )?;
        Ok(orchestrator)
    }

    /// Continue a session from its last checkpoint.
    pub fn resume(
        session_id: &str,
        service: Arc<dyn GenerationService>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, SessionError> {
        let snapshot = checkpoints
            .load(session_id)
            .map_err(|source| SessionError::CheckpointRead {
                session_id: session_id.to_string(),
                source,
            })?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let SessionSnapshot {
            mut session,
            store,
            reviews,
            commits,
            next_stage,
            ..
        } = snapshot;

        // Snapshots are taken between units; anything in flight was discarded.
        session.revision_iteration = 0;
        let stage = if next_stage.is_boundary() {
            next_stage
        } else {
            warn!(stage = %next_stage, "checkpoint names a mid-unit stage, replanning the unit");
            Stage::UnitPlanning
        };
        let stages = Stages::new(service, &session.config.retry);

        info!(
            session = %session.id,
            unit = session.current_unit,
            volume = store.current_volume(),
            stage = %stage,
            "session resumed"
        );

        Ok(Self {
            session,
            store,
            reviews,
            commits,
            stage,
            stages,
            checkpoints,
            sink: None,
            bench: Workbench::default(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn UnitSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    pub fn store(&self) -> &ContinuityStore {
        &self.store
    }

    pub fn reviews(&self) -> &ReviewLog {
        &self.reviews
    }

    pub fn commits(&self) -> &CommitLog {
        &self.commits
    }

    /// The stage the next [`step`](Self::step) will run.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Terminal
    }

    /// Run until the session reaches `Terminal`.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        while !self.is_finished() {
            self.step().await?;
        }
        info!(session = %self.session.id, units = self.session.committed_units(), "session complete");
        Ok(())
    }

    /// Run until `count` more units are committed or the session finishes.
    ///
    /// Boundary work that follows the last unit (volume or milestone review)
    /// is left for the next call. Returns the number of units committed.
    pub async fn run_units(&mut self, count: u32) -> Result<u32, SessionError> {
        let start = self.session.committed_units();
        while !self.is_finished() && self.session.committed_units() - start < count {
            self.step().await?;
        }
        Ok(self.session.committed_units() - start)
    }

    /// Run the current stage and move to its successor. Returns the new stage.
    pub async fn step(&mut self) -> Result<Stage, SessionError> {
        let stage = self.stage;
        debug!(unit = self.session.current_unit, stage = %stage, "running stage");
        let next = match stage {
            Stage::VolumePlanning => self.plan_volume().await,
            Stage::UnitPlanning => self.plan_unit().await,
            Stage::Drafting => self.draft().await,
            Stage::Reviewing => self.review_draft().await,
            Stage::CommitUnit => self.commit_unit().await?,
            Stage::VolumeReview => self.review_volume().await?,
            Stage::MilestoneReview => self.review_milestone().await?,
            Stage::Terminal => Stage::Terminal,
        };
        self.stage = next;
        Ok(next)
    }

    fn facts(session: &Session, store: &ContinuityStore, accepted: bool) -> Facts {
        Facts {
            accepted,
            revision_iteration: session.revision_iteration,
            max_revision_iterations: session.config.max_revision_iterations,
            volume_complete: store.hot.units_in_volume >= session.config.volume_size,
            milestone_due: session.milestone_due(),
            finished: session.is_finished(),
            at_volume_start: store.hot.units_in_volume == 0,
        }
    }

    fn successor(&self, stage: Stage, session: &Session, store: &ContinuityStore) -> Stage {
        let accepted = self.bench.verdict.as_ref().is_none_or(|v| v.accepted);
        session.mode.successor(stage, &Self::facts(session, store, accepted))
    }

    async fn plan_volume(&mut self) -> Stage {
        let volume = self.store.current_volume();
        let context = self.store.get_planning_context();
        let outline = self
            .stages
            .volume_planner
            .plan_volume(volume, self.session.seed.framework_for(volume), &context)
            .await;
        info!(volume, guided = !outline.is_empty(), "volume planned");
        self.session.volume_outline = Some(outline);
        self.successor(Stage::VolumePlanning, &self.session, &self.store)
    }

    async fn plan_unit(&mut self) -> Stage {
        self.bench = Workbench::default();
        self.session.revision_iteration = 0;

        let context = self.store.get_planning_context();
        let threads = ThreadAnalysis::analyze(
            &self.store.hot.threads,
            self.session.current_unit,
            self.session.config.reveal_threshold,
        );
        let volume = self.session.volume_outline.as_ref().filter(|o| !o.is_empty());
        let outline = self
            .stages
            .planner
            .plan_unit(&context, &threads, volume, &self.session.seed.title)
            .await;
        if outline.fallback {
            self.bench.warn(UnitWarning::PlannerFallback);
        }
        debug!(unit = outline.unit, scenes = outline.scenes.len(), "unit planned");
        self.bench.outline = Some(outline);
        self.successor(Stage::UnitPlanning, &self.session, &self.store)
    }

    async fn draft(&mut self) -> Stage {
        let outline = match self.bench.outline.take() {
            Some(outline) => outline,
            None => UnitOutline::fallback(self.session.current_unit),
        };
        let feedback = self
            .bench
            .verdict
            .take()
            .map(|v| v.issues)
            .unwrap_or_default();
        let context = self.store.get_planning_context();
        let draft = self
            .stages
            .writer
            .draft(&outline, &context, &self.session.seed.style, &feedback)
            .await;

        self.bench.draft_attempts += 1;
        if draft.fallback {
            self.bench.warn(UnitWarning::WriterFallback);
        }
        debug!(
            unit = outline.unit,
            attempt = self.bench.draft_attempts,
            chars = draft.text.chars().count(),
            "draft written"
        );
        self.bench.outline = Some(outline);
        self.bench.draft = Some(draft);
        self.successor(Stage::Drafting, &self.session, &self.store)
    }

    async fn review_draft(&mut self) -> Stage {
        let unit = self.session.current_unit;
        let roster = self.session.seed.roster_names();
        let outline_text = self
            .bench
            .outline
            .as_ref()
            .map(UnitOutline::render)
            .unwrap_or_default();
        let verdict = match &self.bench.draft {
            Some(draft) => self.stages.critic.review(unit, draft, &outline_text, &roster).await,
            None => Verdict {
                accepted: true,
                issues: Vec::new(),
                fallback: true,
            },
        };
        if verdict.fallback {
            self.bench.warn(UnitWarning::CriticFallback);
        }
        let accepted = verdict.accepted;
        self.bench.verdict = Some(verdict);

        let next = self.successor(Stage::Reviewing, &self.session, &self.store);
        match next {
            Stage::Drafting => {
                self.session.revision_iteration += 1;
                info!(unit, revision = self.session.revision_iteration, "draft rejected, revising");
            }
            _ if !accepted => {
                self.bench.warn(UnitWarning::ForcedAccept);
                warn!(
                    unit,
                    attempts = self.bench.draft_attempts,
                    "revision budget exhausted, committing rejected draft"
                );
            }
            _ => {}
        }
        next
    }

    async fn commit_unit(&mut self) -> Result<Stage, SessionError> {
        let unit = self.session.current_unit;
        let outline = self
            .bench
            .outline
            .clone()
            .unwrap_or_else(|| UnitOutline::fallback(unit));
        let draft = match self.bench.draft.clone() {
            Some(draft) => draft,
            None => Draft {
                text: placeholder(&outline),
                fallback: true,
            },
        };

        let roster = self.session.seed.roster_names();
        let update = self.stages.summarizer.summarize_unit(unit, &draft.text, &roster).await;
        let mut bench = std::mem::take(&mut self.bench);
        if update.delta.degraded {
            bench.warn(UnitWarning::SummaryFallback);
        }
        let summary = update.delta.summary.clone();
        let degraded = draft.fallback || update.delta.degraded;

        let mut session = self.session.clone();
        let mut store = self.store.clone();
        let mut commits = self.commits.clone();
        let volume = store.current_volume();

        let outcome = match store.record_unit(update.delta) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.bench = bench;
                return Err(err.into());
            }
        };
        if !outcome.unknown_characters.is_empty() {
            debug!(unit, unknown = ?outcome.unknown_characters, "notes for unknown characters dropped");
        }

        session.current_unit += 1;
        session.revision_iteration = 0;
        session.touch();

        let mut event = CommitEvent::new(unit, volume, outline.title.clone(), summary.clone())
            .with_attempts(bench.draft_attempts.max(1))
            .with_chars(draft.text.chars().count());
        for warning in &bench.warnings {
            event = event.with_warning(*warning);
        }
        commits.append(event);

        if let Some(sink) = &self.sink {
            let committed = CommittedUnit {
                session_id: &session.id,
                unit,
                volume,
                title: &outline.title,
                text: &draft.text,
                summary: &summary,
                degraded,
            };
            if let Err(source) = sink.write_unit(&committed) {
                self.bench = bench;
                return Err(SessionError::Sink { unit, source });
            }
        }

        self.bench = Workbench::default();
        let next = self.successor(Stage::CommitUnit, &session, &store);
        if let Err(err) = self.save_snapshot(&session, &store, &self.reviews, &commits, next) {
            self.bench = bench;
            return Err(err);
        }

        info!(
            unit,
            volume,
            attempts = bench.draft_attempts,
            warnings = bench.warnings.len(),
            next = %next,
            "unit committed"
        );
        self.session = session;
        self.store = store;
        self.commits = commits;
        Ok(next)
    }

    async fn review_volume(&mut self) -> Result<Stage, SessionError> {
        let volume = self.store.current_volume();
        let framework = self.session.seed.framework_for(volume).cloned();
        let mut store = self.store.clone();

        let outcome = CompactionEngine::new(&self.stages.summarizer)
            .compact(&mut store, volume, framework.as_ref())
            .await?;

        let assessed = match framework.as_ref() {
            Some(fw) if volume::needs_goal_assessment(Some(fw), &outcome.archived_units) => {
                let (question, material) = volume::goal_assessment_prompt(fw, &outcome.archived_units);
                Some(self.stages.critic.assess(&question, &material).await)
            }
            _ => None,
        };
        let report = review::volume_review(&outcome, framework.as_ref(), assessed, self.session.config.volume_size);
        if report.has_warning() {
            warn!(volume, overall = report.overall, "volume review below threshold");
        } else {
            info!(volume, overall = report.overall, "volume reviewed");
        }

        let mut session = self.session.clone();
        session.volume_outline = None;
        session.touch();
        let mut reviews = self.reviews.clone();
        reviews.append(report);

        let next = self.successor(Stage::VolumeReview, &session, &store);
        self.save_snapshot(&session, &store, &reviews, &self.commits, next)?;
        self.session = session;
        self.store = store;
        self.reviews = reviews;
        Ok(next)
    }

    async fn review_milestone(&mut self) -> Result<Stage, SessionError> {
        let committed = self.session.committed_units();
        let outline = self.session.seed.outline.as_ref();
        let assessed = match outline {
            Some(outline) => {
                let (question, material) = milestone::alignment_assessment_prompt(outline, &self.store, committed);
                Some(self.stages.critic.assess(&question, &material).await)
            }
            None => None,
        };

        let report = review::milestone_review(&self.store, outline, assessed, committed);
        if report.is_critical() {
            for warning in &report.warnings {
                warn!(unit = committed, message = %warning.message, "milestone review warning");
            }
        } else {
            info!(unit = committed, overall = report.overall, "milestone reviewed");
        }

        let mut reviews = self.reviews.clone();
        reviews.append(report);
        let next = self.successor(Stage::MilestoneReview, &self.session, &self.store);
        self.save_snapshot(&self.session, &self.store, &reviews, &self.commits, next)?;
        self.reviews = reviews;
        Ok(next)
    }

    fn save_snapshot(
        &self,
        session: &Session,
        store: &ContinuityStore,
        reviews: &ReviewLog,
        commits: &CommitLog,
        next_stage: Stage,
    ) -> Result<(), SessionError> {
        let snapshot = SessionSnapshot::new(
            session.clone(),
            store.clone(),
            reviews.clone(),
            commits.clone(),
            next_stage,
        );
        self.checkpoints
            .save(&snapshot)
            .map_err(|source| SessionError::CheckpointWrite {
                session_id: session.id.clone(),
                source,
            })?;
        debug!(session = %session.id, next = %next_stage, "checkpoint saved");
        Ok(())
    }
}
