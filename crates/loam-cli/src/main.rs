#![forbid(unsafe_code)]

mod cmd;
mod output;
mod paths;

use clap::{Parser, Subcommand};
use output::OutputMode;
use paths::Paths;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "loam: field-to-market traceability ledger",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Override the data directory (default: $LOAM_DATA_DIR or the
    /// platform data dir).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Initialize the loam data directory",
        after_help = "EXAMPLES:\n    # Initialize with platform defaults\n    loam init\n\n    # Initialize somewhere specific\n    loam --data-dir ./data init"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Record a lifecycle event",
        long_about = "Record one lifecycle event against a field or VTI. A PLANTED event \
                      registers the field's VTI if it does not exist yet.",
        after_help = "EXAMPLES:\n    # Record a planting\n    loam record PLANTED field-1 --actor amina --payload '{\"cropType\": \"Maize\"}'\n\n    # Capture offline, sync later\n    loam record HARVESTED field-1 --payload '{\"yieldKg\": 1840}' --offline"
    )]
    Record(cmd::record::RecordArgs),

    #[command(
        about = "Show a VTI's full lineage",
        after_help = "EXAMPLES:\n    # By field id\n    loam history field-1\n\n    # By VTI id, machine-readable\n    loam history vti-1f0a9c2d44be --json"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        about = "List actions waiting in the offline outbox",
        after_help = "EXAMPLES:\n    loam queue\n    loam queue --json"
    )]
    Queue(cmd::queue::QueueArgs),

    #[command(
        about = "Flush the offline outbox into the ledger",
        after_help = "EXAMPLES:\n    loam sync\n    loam sync --json"
    )]
    Sync(cmd::sync::SyncArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOAM_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "loam=debug,info"
        } else {
            "loam=info,warn"
        })
    });

    let format = env::var("LOAM_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mode = cli.output_mode();
    let paths = Paths::resolve(cli.data_dir.clone())?;

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, &paths),
        Commands::Record(ref args) => cmd::record::run_record(args, mode, &paths),
        Commands::History(ref args) => cmd::history::run_history(args, mode, &paths),
        Commands::Queue(ref args) => cmd::queue::run_queue(args, mode, &paths),
        Commands::Sync(ref args) => cmd::sync::run_sync(args, mode, &paths),
    }
}
