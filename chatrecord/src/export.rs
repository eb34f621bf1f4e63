//! chatrecord-export - build a service record from the persisted event log
//!
//! Reads the store, aggregates sessions, drops trivial tab sessions (unless
//! asked not to) and writes the JSON document to stdout or a file.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Store: $XDG_DATA_HOME/chatrecord/store.json (~/.local/share/chatrecord/store.json)
//! - Config: $XDG_CONFIG_HOME/chatrecord/config.toml (~/.config/chatrecord/config.toml)

use anyhow::{Context, Result};
use chatrecord_core::{aggregate_snapshot, Config, EventLog, JsonFileStore, ServiceRecordBuilder};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatrecord-export")]
#[command(about = "Export recorded chat sessions as a service record")]
#[command(version)]
struct Args {
    /// Store file (default: [store] path from config, else the XDG data dir)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Keep tab-scoped sessions that saw no activity
    #[arg(long)]
    include_trivial: bool,

    /// Subject recorded in the document (default: from config)
    #[arg(long)]
    subject: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        chatrecord_core::logging::init(&config.logging).context("failed to initialize logging")?;

    if let Some(subject) = args.subject {
        config.record.subject = subject;
    }

    let store_path = args.store.unwrap_or_else(|| config.store_path());
    let log = EventLog::new(JsonFileStore::new(&store_path));
    let snapshot = log
        .try_snapshot()
        .await
        .with_context(|| format!("failed to read store {}", store_path.display()))?;

    let sessions = aggregate_snapshot(&snapshot, &config.heuristics, Utc::now());
    let record = ServiceRecordBuilder::new(&config.record)
        .include_trivial(args.include_trivial || config.record.include_trivial)
        .build(sessions);
    let body = record
        .to_json_pretty()
        .context("failed to serialize service record")?;

    match args.out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create directory {}", parent.display())
                    })?;
                }
            }
            std::fs::write(&out, body)
                .with_context(|| format!("failed to write {}", out.display()))?;
            eprintln!(
                "Exported {} session(s) to {}",
                record.sessions.len(),
                out.display()
            );
        }
        None => println!("{}", body),
    }

    Ok(())
}
