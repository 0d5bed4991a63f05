// MEMD API - command-line client for the MEMD partner membership API
//
// Resolves configuration, sets up logging and dispatches one `member`
// subcommand per invocation. Results go to stdout, logs to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

use memd_client::commands::{self, CommandContext, MemberCommand};
use memd_client::config::{ConfigPaths, LogLevel, Mode};
use memd_client::workspace::Workspace;

/// Command-line client for the MEMD partner membership API
#[derive(Parser)]
#[command(name = "memd-api")]
#[command(about = "Manage MEMD primary members and their policies")]
#[command(version)]
struct Args {
    /// Log verbosity
    #[arg(short, long, value_enum, default_value = "warning", global = true)]
    log_level: LogLevel,

    /// Run mode; `test` keeps local copies of payloads and responses
    #[arg(short, long, value_enum, default_value = "prod", global = true)]
    mode: Mode,

    /// API configuration file (TOML, or JSON by extension)
    #[arg(long, global = true)]
    api_config: Option<PathBuf>,

    /// Working directory for payload files [default: ~/.memd_api]
    #[arg(long, global = true)]
    output_directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Primary member operations
    #[command(subcommand)]
    Member(MemberCommand),
}

fn main() -> Result<()> {
    let args = Args::parse();

    let output_directory = match &args.output_directory {
        Some(dir) => dir.clone(),
        None => ConfigPaths::home_dir()?,
    };
    let workspace = Workspace::open(&output_directory)?;

    let _guard = init_logging(args.log_level, args.mode, workspace.root())?;
    tracing::debug!("Starting memd-api in {:?} mode", args.mode);

    let ctx = CommandContext::from_local_files(args.mode, args.api_config.as_deref(), workspace)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::Member(command) => commands::member::run(&ctx, command, &mut out)?,
    }

    Ok(())
}

/// Initialize logging for the chosen level; test mode also logs to a file
fn init_logging(level: LogLevel, mode: Mode, output_directory: &Path) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("memd_client={0},memd_api={0}", level.as_filter()).into());
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if mode == Mode::Test {
        let appender = tracing_appender::rolling::never(output_directory, "memd-api.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
