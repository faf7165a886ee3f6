use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::audit::CommitEvent;
use crate::orchestrator::Stage;
use crate::review::ReviewReport;
use crate::ui::icons::{BOOK, CHECK, CROSS, MILESTONE, PAGE, REVIEW, WARN};

/// Terminal UI for a running session, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Unit bar: committed units against the session target
/// - Stage bar: spinner naming the stage in progress
///
/// When stderr is not a terminal `indicatif` hides both bars; the printed
/// lines still go out through [`Self::print_line`].
pub struct SessionUI {
    multi: MultiProgress,
    unit_bar: ProgressBar,
    stage_bar: ProgressBar,
    verbose: bool,
}

impl SessionUI {
    /// Create the UI positioned at `committed` of `target` units.
    pub fn new(target: u32, committed: u32, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let unit_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let unit_bar = multi.add(ProgressBar::new(u64::from(target)));
        unit_bar.set_style(unit_style);
        unit_bar.set_prefix(" Units");
        unit_bar.set_position(u64::from(committed));

        let stage_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let stage_bar = multi.add(ProgressBar::new_spinner());
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix(" Stage");
        stage_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            unit_bar,
            stage_bar,
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Show the stage about to run for `unit`.
    pub fn stage(&self, stage: Stage, unit: u32) {
        let label = match stage {
            Stage::VolumePlanning => "planning volume".to_string(),
            Stage::VolumeReview => "reviewing volume".to_string(),
            Stage::MilestoneReview => "milestone review".to_string(),
            Stage::Terminal => "done".to_string(),
            other => format!("{} unit {}", other, unit),
        };
        self.stage_bar.set_message(format!("{}", style(label).dim()));
    }

    pub fn volume_started(&self, volume: u32) {
        self.print_line(format!("{} Volume {}", BOOK, style(volume).cyan().bold()));
    }

    pub fn unit_committed(&self, event: &CommitEvent) {
        self.unit_bar.set_position(u64::from(event.unit));
        self.unit_bar.set_message(event.title.clone());

        let mut line = format!(
            "  {} Unit {}: {}",
            PAGE,
            style(event.unit).cyan(),
            event.title
        );
        if event.draft_attempts > 1 {
            line.push_str(&format!(" {}", style(format!("({} drafts)", event.draft_attempts)).dim()));
        }
        self.print_line(line);

        if !event.warnings.is_empty() && (self.verbose || event.is_degraded()) {
            let warnings: Vec<String> = event.warnings.iter().map(|w| w.to_string()).collect();
            self.print_line(format!(
                "    {} {}",
                WARN,
                style(warnings.join(", ")).yellow()
            ));
        }
    }

    pub fn review(&self, report: &ReviewReport) {
        let icon = match report.scope {
            crate::review::ReviewScope::Volume { .. } => REVIEW,
            crate::review::ReviewScope::Milestone { .. } => MILESTONE,
        };
        let line = format!("{} {}: overall {:.0}/100", icon, report.scope, report.overall);
        if report.is_critical() {
            self.print_line(style(line).red().to_string());
        } else if report.has_warning() {
            self.print_line(style(line).yellow().to_string());
        } else {
            self.print_line(line);
        }
        for warning in &report.warnings {
            self.print_line(format!("    {} {}", WARN, warning.message));
        }
    }

    /// Clear the bars and print the final line.
    pub fn finish(&self, committed: u32, finished: bool) {
        self.stage_bar.finish_and_clear();
        self.unit_bar.finish_and_clear();
        if finished {
            self.print_line(format!(
                "{} Session complete: {} units committed",
                CHECK,
                style(committed).green().bold()
            ));
        } else {
            self.print_line(format!(
                "{} Paused after {} committed units",
                CHECK,
                style(committed).green()
            ));
        }
    }

    pub fn failed(&self, message: &str) {
        self.stage_bar.finish_and_clear();
        self.unit_bar.abandon();
        self.print_line(format!("{} {}", CROSS, style(message).red()));
    }
}
