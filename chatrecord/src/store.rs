//! chatrecord-store - maintenance commands for the persisted event log
//!
//! This tool provides commands for:
//! - Showing what the store holds
//! - Importing events captured elsewhere (one JSON event per line)
//! - Editing session flags (override, outcome, title)
//! - Clearing the whole log

use anyhow::{Context, Result};
use chatrecord_core::aggregate::aggregate_snapshot;
use chatrecord_core::{Config, EventLog, EventRecord, JsonFileStore, Outcome};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "chatrecord-store")]
#[command(about = "Inspect and maintain the chatrecord event store")]
#[command(version)]
struct Args {
    /// Store file (default: [store] path from config, else the XDG data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show event and session counts
    Status,

    /// Append events from a JSON Lines file
    Import {
        /// File with one event record per line
        path: PathBuf,
    },

    /// Edit the flags of one session
    Flag {
        /// Session id to annotate
        session_id: String,

        /// Mark the session as requiring a human override
        #[arg(long = "override", conflicts_with = "clear_override")]
        set_override: bool,

        /// Remove the human override mark
        #[arg(long)]
        clear_override: bool,

        /// Explicit outcome: success, abandoned, escalated_to_human or failed
        #[arg(long, conflicts_with = "clear_outcome")]
        outcome: Option<Outcome>,

        /// Go back to the computed outcome
        #[arg(long)]
        clear_outcome: bool,

        /// Title to show instead of the derived one
        #[arg(long, conflicts_with = "clear_title")]
        title: Option<String>,

        /// Go back to the derived title
        #[arg(long)]
        clear_title: bool,
    },

    /// Remove all events, flags and cached counts
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        chatrecord_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let store_path = args.store.clone().unwrap_or_else(|| config.store_path());
    let log = EventLog::new(JsonFileStore::new(&store_path));

    match args.command {
        Command::Status => cmd_status(&log, &config).await,
        Command::Import { path } => cmd_import(&log, &path).await,
        Command::Flag {
            session_id,
            set_override,
            clear_override,
            outcome,
            clear_outcome,
            title,
            clear_title,
        } => {
            let mut flags = log
                .get_session_flags()
                .await
                .remove(&session_id)
                .unwrap_or_default();

            if set_override {
                flags.human_override_required = true;
            }
            if clear_override {
                flags.human_override_required = false;
            }
            if outcome.is_some() {
                flags.outcome = outcome;
            }
            if clear_outcome {
                flags.outcome = None;
            }
            if let Some(title) = title {
                flags.title = Some(title);
            }
            if clear_title {
                flags.title = None;
            }

            log.set_session_flags(&session_id, flags.clone())
                .await
                .with_context(|| format!("failed to write flags to {}", store_path.display()))?;

            println!("{}: {}", session_id, serde_json::to_string(&flags)?);
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear {} without --yes", store_path.display());
            }
            log.clear()
                .await
                .with_context(|| format!("failed to clear {}", store_path.display()))?;
            println!("Cleared {}", store_path.display());
            Ok(())
        }
    }
}

async fn cmd_status(log: &EventLog<JsonFileStore>, config: &Config) -> Result<()> {
    let snapshot = log
        .try_snapshot()
        .await
        .with_context(|| format!("failed to read store {}", log.store().path().display()))?;

    let mut by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in &snapshot.events {
        *by_type.entry(event.event_type().as_str()).or_default() += 1;
    }

    let sessions = aggregate_snapshot(&snapshot, &config.heuristics, Utc::now());
    let trivial = sessions.iter().filter(|s| s.is_trivial()).count();

    println!("Store:     {}", log.store().path().display());
    println!("Logs:      {}", Config::state_dir().display());
    println!("Events:    {}", snapshot.events.len());
    for (event_type, count) in &by_type {
        println!("  {:<18} {}", event_type, count);
    }
    println!("Sessions:  {} ({} trivial)", sessions.len(), trivial);
    println!("Flagged:   {}", snapshot.flags.len());

    Ok(())
}

async fn cmd_import(log: &EventLog<JsonFileStore>, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "Skipping invalid event");
                skipped += 1;
                continue;
            }
        };
        log.try_append_event(record).await.with_context(|| {
            format!("failed to append to {}", log.store().path().display())
        })?;
        imported += 1;
    }

    tracing::info!(imported, skipped, path = %path.display(), "Import finished");
    println!("Imported {} event(s), skipped {}", imported, skipped);
    Ok(())
}
