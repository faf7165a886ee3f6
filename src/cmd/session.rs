//! Session listing, status, reports and reset commands.

use anyhow::{Result, bail};
use console::style;

use quill::checkpoint::{CheckpointStore, FileCheckpointStore, SessionSnapshot};
use quill::review::ReviewScope;
use quill::ui::icons::WARN;

use super::super::Cli;

fn load_snapshot(cli: &Cli, session: &str) -> Result<SessionSnapshot> {
    let store = FileCheckpointStore::new(&cli.checkpoint_dir);
    match store.load(session)? {
        Some(snapshot) => Ok(snapshot),
        None => bail!(
            "No checkpoint found for session '{}' in {}",
            session,
            cli.checkpoint_dir.display()
        ),
    }
}

pub fn cmd_list(cli: &Cli) -> Result<()> {
    let store = FileCheckpointStore::new(&cli.checkpoint_dir);
    let ids = store.list()?;

    println!();
    if ids.is_empty() {
        println!("No sessions found. Run 'quill run --story <seed.toml>' to start one.");
        println!();
        return Ok(());
    }

    println!("{:<16} {:<12} {:<16} Title", "Session", "Progress", "Next stage");
    println!(
        "{:<16} {:<12} {:<16} -----",
        "----------------", "------------", "----------------"
    );
    for id in ids {
        match store.load(&id) {
            Ok(Some(snapshot)) => {
                let session = &snapshot.session;
                println!(
                    "{:<16} {:<12} {:<16} {}",
                    id,
                    format!("{}/{}", session.committed_units(), session.config.target_units),
                    snapshot.next_stage.to_string(),
                    session.seed.title
                );
            }
            Ok(None) => {}
            Err(e) => println!("{:<16} {}", id, style(format!("unreadable: {}", e)).red()),
        }
    }
    println!();
    Ok(())
}

pub fn cmd_status(cli: &Cli, session: &str) -> Result<()> {
    let snapshot = load_snapshot(cli, session)?;
    let SessionSnapshot {
        session,
        store,
        reviews,
        commits,
        next_stage,
        saved_at,
        ..
    } = &snapshot;

    println!();
    println!("Session {}", style(&session.id).cyan().bold());
    println!("====================");
    println!();
    println!("Title:      {}", session.seed.title);
    println!("Mode:       {}", session.mode);
    println!(
        "Progress:   {}/{} units",
        session.committed_units(),
        session.config.target_units
    );
    println!("Next stage: {}", next_stage);
    if session.is_long_form() {
        println!(
            "Volume:     {} ({} units in progress)",
            store.current_volume(),
            store.hot.units_in_volume
        );
    }
    println!("Saved at:   {}", saved_at.format("%Y-%m-%d %H:%M:%S"));

    let limits = &session.config.capacity;
    println!();
    println!("Continuity:");
    println!("  Characters:      {}", store.hot.characters.len());
    println!(
        "  Active threads:  {}/{}",
        store.hot.threads.len(),
        limits.threads
    );
    println!(
        "  World events:    {}/{}",
        store.hot.world_events.len(),
        limits.events
    );
    println!("  Volumes archived: {}", store.cold.volume_summaries.len());

    let degraded = commits.degraded().count();
    println!();
    println!("Commits:");
    println!("  Draft attempts:  {}", commits.total_draft_attempts());
    if degraded > 0 {
        println!(
            "  {}{} unit(s) committed with fallback output",
            WARN,
            style(degraded).yellow()
        );
    }
    if !commits.is_empty() {
        println!();
        println!("Recent units:");
        let skip = commits.len().saturating_sub(5);
        for event in commits.all().iter().skip(skip) {
            println!(
                "  Unit {}: {} ({})",
                event.unit,
                event.title,
                event.committed_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    if let Some(latest) = reviews.latest() {
        println!();
        println!("Latest review: {}", latest);
    }
    println!();
    Ok(())
}

pub fn cmd_reports(cli: &Cli, session: &str, volume: Option<u32>) -> Result<()> {
    let snapshot = load_snapshot(cli, session)?;
    let reviews = &snapshot.reviews;

    let selected: Vec<_> = match volume {
        Some(v) => reviews.for_volume(v).into_iter().collect(),
        None => reviews.all().iter().collect(),
    };

    println!();
    if selected.is_empty() {
        match volume {
            Some(v) => println!("No review for volume {} yet.", v),
            None => println!("No reviews yet."),
        }
        println!();
        return Ok(());
    }

    for report in selected {
        let heading = match report.scope {
            ReviewScope::Volume { volume } => format!("Volume {}", volume),
            ReviewScope::Milestone { unit } => format!("Milestone at unit {}", unit),
        };
        println!(
            "{} - overall {:.0}/100 ({})",
            style(heading).bold(),
            report.overall,
            report.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        for dimension in &report.dimensions {
            println!("  {:<24} {:>3}", dimension.name, dimension.score);
        }
        for warning in &report.warnings {
            let line = format!("  {}{}: {}", WARN, warning.level, warning.message);
            if report.is_critical() {
                println!("{}", style(line).red());
            } else {
                println!("{}", style(line).yellow());
            }
        }
        println!();
    }
    Ok(())
}

pub fn cmd_reset(cli: &Cli, session: &str, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let store = FileCheckpointStore::new(&cli.checkpoint_dir);

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!("Delete the checkpoint for session '{}'?", session))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            bail!("Reset cancelled (pass --force to skip confirmation)");
        }
    }

    if store.remove(session)? {
        println!("Reset complete: session {} removed", session);
    } else {
        bail!("No checkpoint found for session '{}'", session);
    }
    Ok(())
}
