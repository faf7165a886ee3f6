use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

mod cmd;

#[derive(Parser)]
#[command(name = "quill")]
#[command(version, about = "Long-form serial fiction orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit console logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to quill.toml (defaults are used when the file does not exist)
    #[arg(long, default_value = "quill.toml", global = true)]
    pub config: PathBuf,

    /// Directory holding session checkpoints and run logs
    #[arg(long, default_value = ".quill", global = true)]
    pub checkpoint_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new session, or continue one that has a checkpoint
    Run {
        /// Story seed (TOML). Required unless the session already has a checkpoint
        #[arg(short, long)]
        story: Option<PathBuf>,

        /// Session id to start or resume (generated when omitted)
        #[arg(long)]
        session: Option<String>,

        /// Directory that receives committed units
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Stop after this many units have been committed
        #[arg(short, long)]
        units: Option<u32>,
    },
    /// List sessions with checkpoints
    List,
    /// Show progress and memory usage for a session
    Status {
        #[arg(long)]
        session: String,
    },
    /// Show volume and milestone review reports for a session
    Reports {
        #[arg(long)]
        session: String,

        /// Only show the report for this volume
        #[arg(long)]
        volume: Option<u32>,
    },
    /// Delete a session's checkpoint
    Reset {
        #[arg(long)]
        session: String,

        #[arg(long)]
        force: bool,
    },
}

/// Console logs go to stderr so command output stays clean; `run` also keeps
/// a daily JSON log next to the checkpoints.
fn init_tracing(cli: &Cli) -> Option<WorkerGuard> {
    let default_directive = if cli.verbose { "quill=debug" } else { "quill=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let console_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let console = if cli.log_json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_level)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_level)
            .boxed()
    };

    let (file, guard) = match cli.command {
        Commands::Run { .. } => {
            let appender = tracing_appender::rolling::daily(cli.checkpoint_dir.join("logs"), "quill.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(&cli);

    match &cli.command {
        Commands::Run {
            story,
            session,
            output,
            units,
        } => {
            cmd::cmd_run(&cli, story.as_deref(), session.as_deref(), output, *units).await?;
        }
        Commands::List => cmd::cmd_list(&cli)?,
        Commands::Status { session } => cmd::cmd_status(&cli, session)?,
        Commands::Reports { session, volume } => cmd::cmd_reports(&cli, session, *volume)?,
        Commands::Reset { session, force } => cmd::cmd_reset(&cli, session, *force)?,
    }

    Ok(())
}
