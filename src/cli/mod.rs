//! `tn-node` CLI: run the supervisor loop, and inspect on-disk journal /
//! event log state without requiring the loop to be running.
//!
//! Grounded on the teacher's `cli_app.rs` (`clap::Parser` + `Subcommand`
//! dispatch, a `CliError` with an explicit exit-code contract), scoped down
//! to the handful of operational commands SPEC_FULL.md §9 names — this
//! binary has no counterpart in the original firmware, which has no CLI.

use std::fs;
use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::core::config::Config;
use crate::core::errors::TnError;
use crate::eventlog::EVENTLOG_CSV_HEADER;
use crate::link::LinkDriver;
use crate::storage::journal::{DrainOutcome, UploadResult};
use crate::storage::{Journal, Sample};
use crate::supervisor::Supervisor;
use crate::supervisor::signals::SignalHandler;
use crate::time::clock::TimeSource;
use crate::uploader::HttpUploadClient;

/// `tn-node` — durable-delivery telemetry node core.
#[derive(Debug, Parser)]
#[command(name = "tn-node", author, version, about = "Telemetry node durable-delivery core", arg_required_else_help = true)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output for inspection commands.
    #[arg(long, global = true)]
    json: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the cooperative supervisor loop until interrupted.
    Run(RunArgs),
    /// Inspect or replay the on-disk journal.
    Journal {
        #[command(subcommand)]
        command: JournalCommand,
    },
    /// Inspect the forensic event log.
    Eventlog {
        #[command(subcommand)]
        command: EventlogCommand,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Exit after this many loop iterations instead of running forever.
    #[arg(long, value_name = "N")]
    iterations: Option<u64>,
    /// Sleep between loop iterations, in milliseconds.
    #[arg(long, default_value_t = 200, value_name = "MS")]
    sleep_ms: u64,
}

#[derive(Debug, Subcommand)]
enum JournalCommand {
    /// List journal files with outstanding work, and their cursor offsets.
    Status,
    /// Run one bounded drain pass over every pending journal file.
    Drain {
        /// Maximum records to deliver per file this pass.
        #[arg(long, default_value_t = 6, value_name = "N")]
        max: usize,
    },
}

#[derive(Debug, Subcommand)]
enum EventlogCommand {
    /// Print the tail of the most recent event log file.
    Tail {
        /// Number of lines to print.
        #[arg(long, default_value_t = 20, value_name = "N")]
        lines: usize,
    },
}

/// CLI error type with an explicit exit-code contract, mirroring the
/// teacher's `CliError`.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    User(String),
    #[error("{0}")]
    Runtime(String),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
        }
    }
}

impl From<TnError> for CliError {
    fn from(value: TnError) -> Self {
        Self::Runtime(value.to_string())
    }
}

/// Dispatch a parsed CLI invocation.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Run(args) => run_supervisor(cli, args),
        Command::Journal { command } => match command {
            JournalCommand::Status => journal_status(cli),
            JournalCommand::Drain { max } => journal_drain(cli, *max),
        },
        Command::Eventlog { command } => match command {
            EventlogCommand::Tail { lines } => eventlog_tail(cli, *lines),
        },
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

/// A network link and NTP client are external collaborators this core does
/// not own (spec.md §1); the CLI's production `run` command substitutes the
/// simplest correct host-side stand-ins rather than leave the binary unable
/// to run at all: the host's own network stack (assumed reachable once the
/// process is up — there's no Wi-Fi association step to drive on a host)
/// and the host's own disciplined system clock in place of a bespoke NTP
/// round-trip. See DESIGN.md.
struct HostLinkDriver;

impl LinkDriver for HostLinkDriver {
    fn has_ip(&mut self) -> bool {
        true
    }

    fn begin_connect(&mut self) {}
}

struct HostTimeSource;

impl TimeSource for HostTimeSource {
    fn fetch_unix_seconds(&mut self) -> Option<u32> {
        u32::try_from(Utc::now().timestamp()).ok()
    }
}

fn run_supervisor(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let uploader = HttpUploadClient::new(
        config.endpoint.url.clone(),
        config.endpoint.api_key.clone(),
        &config.device.mac,
    )
    .map_err(|e| CliError::Runtime(format!("building HTTP client: {e}")))?;

    let mut supervisor = Supervisor::boot(config, HostLinkDriver, HostTimeSource, uploader)?;
    let signals = SignalHandler::new();

    let mut iteration = 0u64;
    loop {
        supervisor.run_once(Instant::now())?;
        iteration += 1;
        if signals.should_shutdown() || args.iterations.is_some_and(|max| iteration >= max) {
            break;
        }
        sleep(Duration::from_millis(args.sleep_ms));
    }
    Ok(())
}

fn journal_status(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let journal = Journal::open(&config.storage.root)?;
    let pending = journal.enumerate_pending()?;

    if cli.json {
        let rows: Vec<serde_json::Value> = pending
            .iter()
            .map(|path| {
                let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                serde_json::json!({ "path": path.display().to_string(), "size": size })
            })
            .collect();
        let out = serde_json::to_string_pretty(&rows)?;
        println!("{out}");
    } else if pending.is_empty() {
        println!("no journal files with outstanding work");
    } else {
        for path in &pending {
            let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            println!("{}  ({size} bytes)", path.display());
        }
    }
    Ok(())
}

fn journal_drain(cli: &Cli, max: usize) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let journal = Journal::open(&config.storage.root)?;
    let mut uploader = HttpUploadClient::new(
        config.endpoint.url.clone(),
        config.endpoint.api_key.clone(),
        &config.device.mac,
    )
    .map_err(|e| CliError::Runtime(format!("building HTTP client: {e}")))?;

    let pending = journal.enumerate_pending()?;
    for path in pending {
        let outcome = journal.drain_one(
            &path,
            max,
            true,
            |sample: &Sample| uploader.upload(sample),
            now_us,
        )?;
        match outcome {
            DrainOutcome::LinkNotReady => println!("{}: link not ready", path.display()),
            DrainOutcome::Drained(stats) => println!(
                "{}: sent={} skipped={} archived={}",
                path.display(),
                stats.sent,
                stats.skipped,
                stats.archived
            ),
        }
    }
    Ok(())
}

fn now_us() -> u64 {
    u64::try_from(Utc::now().timestamp_micros().max(0)).unwrap_or(0)
}

fn eventlog_tail(cli: &Cli, lines: usize) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let root = config.storage.root.join("eventlog");
    let mut entries: Vec<_> = fs::read_dir(&root)
        .map_err(|e| TnError::io(&root, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    entries.sort();

    let Some(latest) = entries.last() else {
        return Err(CliError::User("no event log files found".to_string()));
    };

    let file = fs::File::open(latest).map_err(|e| TnError::io(latest, e))?;
    let all_lines: Vec<String> = io::BufReader::new(file)
        .lines()
        .collect::<io::Result<_>>()
        .map_err(|e| TnError::io(latest, e))?;
    let body = all_lines.iter().filter(|l| l.as_str() != EVENTLOG_CSV_HEADER.trim_end());
    let tail: Vec<&String> = body.rev().take(lines).collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", EVENTLOG_CSV_HEADER.trim_end())?;
    for line in tail.into_iter().rev() {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
