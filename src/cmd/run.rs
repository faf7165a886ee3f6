//! Session execution: `quill run`.

use anyhow::{Context, Result};
use console::style;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quill::checkpoint::{CheckpointStore, FileCheckpointStore};
use quill::config::QuillToml;
use quill::orchestrator::{CommittedUnit, Orchestrator, Stage, UnitSink};
use quill::service::{CommandService, GenerationService};
use quill::story::StorySeed;
use quill::ui::SessionUI;
use quill::ui::icons::SPARKLE;

use super::super::Cli;

/// Writes each committed unit to `<dir>/<session>/unit-NNNN.md`.
///
/// The unit title becomes the heading unless the text opens with its own.
///
/// A rewrite after a resume replaces the file, so the directory always
/// matches the checkpoint.
pub struct MarkdownSink {
    dir: PathBuf,
}

impl MarkdownSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn unit_path(&self, session_id: &str, unit: u32) -> PathBuf {
        self.dir.join(session_id).join(format!("unit-{:04}.md", unit))
    }
}

impl UnitSink for MarkdownSink {
    fn write_unit(&self, unit: &CommittedUnit<'_>) -> Result<()> {
        let path = self.unit_path(unit.session_id, unit.unit);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let text = unit.text.trim();
        let mut body = String::new();
        if !text.starts_with('#') {
            body.push_str(&format!("# {}\n\n", unit.title.trim()));
        }
        body.push_str(text);
        body.push('\n');

        let tmp = path.with_extension("md.tmp");
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(body.as_bytes())
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

pub async fn cmd_run(
    cli: &Cli,
    story: Option<&Path>,
    session: Option<&str>,
    output: &Path,
    units: Option<u32>,
) -> Result<()> {
    let toml = QuillToml::load_or_default(&cli.config)?;
    let service: Arc<dyn GenerationService> = Arc::new(CommandService::new(
        toml.service_command(),
        toml.service_args(),
    ));
    let checkpoints = Arc::new(FileCheckpointStore::new(&cli.checkpoint_dir));
    let sink = Arc::new(MarkdownSink::new(output));

    let resumable = match session {
        Some(id) => checkpoints.list()?.iter().any(|existing| existing == id),
        None => false,
    };

    let orchestrator = if resumable {
        let id = session.unwrap_or_default();
        println!();
        println!("{}Resuming session {}", SPARKLE, style(id).cyan().bold());
        Orchestrator::resume(id, service, checkpoints.clone())?
    } else {
        let story = story.context(
            "No checkpoint to resume. Pass --story <seed.toml> to start a new session.",
        )?;
        let seed = StorySeed::load(story)?;
        let orchestrator = Orchestrator::start(
            seed,
            toml.session.clone(),
            service,
            checkpoints.clone(),
            session.map(str::to_string),
        )?;
        println!();
        println!(
            "{}Started session {} ({}, {} units)",
            SPARKLE,
            style(orchestrator.session_id()).cyan().bold(),
            orchestrator.mode(),
            orchestrator.session().config.target_units
        );
        orchestrator
    };
    let mut orchestrator = orchestrator.with_sink(sink);

    drive(cli, &mut orchestrator, units).await?;

    let session = orchestrator.session();
    println!();
    println!(
        "Session {}: {}/{} units committed",
        style(&session.id).cyan(),
        session.committed_units(),
        session.config.target_units
    );
    println!(
        "Output:     {}",
        output.join(&session.id).display()
    );
    println!(
        "Checkpoint: {}",
        checkpoints.snapshot_path(&session.id).display()
    );
    if !orchestrator.is_finished() {
        println!();
        println!(
            "Run 'quill run --session {}' to continue.",
            session.id
        );
    }
    println!();
    Ok(())
}

/// Step the orchestrator, mirroring commits and reviews onto the progress UI.
async fn drive(cli: &Cli, orchestrator: &mut Orchestrator, units: Option<u32>) -> Result<()> {
    let start = orchestrator.session().committed_units();
    let ui = SessionUI::new(
        orchestrator.session().config.target_units,
        start,
        cli.verbose,
    );
    let mut seen_commits = orchestrator.commits().len();
    let mut seen_reviews = orchestrator.reviews().len();

    while !orchestrator.is_finished() {
        if let Some(limit) = units
            && orchestrator.session().committed_units() - start >= limit
        {
            break;
        }

        let stage = orchestrator.stage();
        ui.stage(stage, orchestrator.session().current_unit);
        if stage == Stage::VolumePlanning {
            ui.volume_started(orchestrator.store().current_volume());
        }

        if let Err(e) = orchestrator.step().await {
            ui.failed(&e.to_string());
            return Err(e.into());
        }

        for event in &orchestrator.commits().all()[seen_commits..] {
            ui.unit_committed(event);
        }
        seen_commits = orchestrator.commits().len();
        for report in &orchestrator.reviews().all()[seen_reviews..] {
            ui.review(report);
        }
        seen_reviews = orchestrator.reviews().len();
    }

    ui.finish(orchestrator.session().committed_units(), orchestrator.is_finished());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_markdown_sink_writes_numbered_file() {
        let dir = tempdir().unwrap();
        let sink = MarkdownSink::new(dir.path());
        sink.write_unit(&CommittedUnit {
            session_id: "s1",
            unit: 7,
            volume: 1,
            title: "The Ferry",
            text: "Rain on the river.",
            summary: "They cross.",
            degraded: false,
        })
        .unwrap();

        let path = dir.path().join("s1/unit-0007.md");
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "# The Ferry\n\nRain on the river.\n");
        assert!(!dir.path().join("s1/unit-0007.md.tmp").exists());
    }

    #[test]
    fn test_markdown_sink_keeps_writer_heading() {
        let dir = tempdir().unwrap();
        let sink = MarkdownSink::new(dir.path());
        sink.write_unit(&CommittedUnit {
            session_id: "s1",
            unit: 2,
            volume: 1,
            title: "The Ferry",
            text: "# Chapter 2: The Ferry\n\nRain on the river.\n",
            summary: "They cross.",
            degraded: false,
        })
        .unwrap();

        let content = fs::read_to_string(dir.path().join("s1/unit-0002.md")).unwrap();
        assert_eq!(content, "# Chapter 2: The Ferry\n\nRain on the river.\n");
        assert_eq!(content.matches('#').count(), 1);
    }
}
