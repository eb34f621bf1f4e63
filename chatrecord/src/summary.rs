//! chatrecord-summary - print an exported service record for humans
//!
//! Two modes:
//! - `--list` / `-l`: one line per session
//! - default: a detailed report per session
//!
//! Reading is permissive about missing fields; a missing or unreadable file,
//! or one that is not JSON, exits non-zero with a diagnostic.

use anyhow::{Context, Result};
use chatrecord_core::format::{format_duration_ms, format_latency_ms, format_local, plural};
use chatrecord_core::{Config, ServiceRecord, SessionEntry};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatrecord-summary")]
#[command(about = "Summarize an exported chat service record")]
#[command(version)]
struct Args {
    /// Path to an exported service record (JSON)
    path: PathBuf,

    /// One line per session instead of the detailed report
    #[arg(short, long)]
    list: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        chatrecord_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let content = std::fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let record = ServiceRecord::from_json(&content)
        .with_context(|| format!("{} is not a valid service record", args.path.display()))?;

    tracing::info!(
        path = %args.path.display(),
        sessions = record.sessions.len(),
        "Loaded service record"
    );

    if record.sessions.is_empty() {
        println!("No sessions in {}.", args.path.display());
        return Ok(());
    }

    if args.list {
        for entry in &record.sessions {
            println!("{}", list_line(entry));
        }
    } else {
        print_report(&record);
    }

    Ok(())
}

fn display_time(ts: Option<&str>) -> String {
    match ts {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| format_local(t.with_timezone(&Utc)))
            .unwrap_or_else(|_| raw.to_string()),
        None => "-".to_string(),
    }
}

fn outcome_label(entry: &SessionEntry) -> &str {
    entry
        .metrics
        .outcome
        .as_ref()
        .map(|o| o.as_str())
        .unwrap_or("unknown")
}

fn title_of(entry: &SessionEntry) -> &str {
    if !entry.title.trim().is_empty() {
        entry.title.as_str()
    } else if !entry.metrics.title.trim().is_empty() {
        entry.metrics.title.as_str()
    } else {
        entry.session_id.as_str()
    }
}

fn list_line(entry: &SessionEntry) -> String {
    format!(
        "{:<16}  {:<36}  {:<16}  {:>3}/{:<3}  {:<18}  {}",
        display_time(entry.started_at.as_deref()),
        entry.session_id,
        entry.tool_label,
        entry.metrics.user_message_count,
        entry.metrics.llm_message_count,
        outcome_label(entry),
        title_of(entry),
    )
}

fn print_report(record: &ServiceRecord) {
    println!(
        "Service record: {} ({} v{})",
        if record.agent_label.is_empty() {
            "-"
        } else {
            record.agent_label.as_str()
        },
        record.record_type,
        record.version
    );
    println!("Subject:   {}", record.subject);
    println!("Observer:  {}", record.observer);
    println!("Generated: {}", display_time(Some(&record.generated_at)));
    println!("Sessions:  {}", record.sessions.len());

    for entry in &record.sessions {
        let m = &entry.metrics;
        println!();
        println!("== {} ==", title_of(entry));
        println!("  Session:   {}", entry.session_id);
        println!("  Tool:      {}", entry.tool_label);
        println!("  Started:   {}", display_time(entry.started_at.as_deref()));
        println!("  Ended:     {}", display_time(entry.ended_at.as_deref()));
        println!("  Duration:  {}", format_duration_ms(m.approx_duration_ms));
        println!(
            "  Messages:  {}, {}",
            plural(m.user_message_count, "prompt", "prompts"),
            plural(m.llm_message_count, "response", "responses")
        );

        match &m.response_metrics {
            Some(r) => println!(
                "  Latency:   avg {}, p95 {}, max {}",
                format_latency_ms(r.avg_response_time_ms),
                format_latency_ms(r.p95_response_time_ms),
                format_latency_ms(r.max_response_time_ms)
            ),
            None => println!("  Latency:   n/a"),
        }

        let mut copies = format!(
            "{} ({} chars)",
            plural(m.copy_events_total, "copy", "copies"),
            m.copy.copied_text_length
        );
        if m.copy.copied_code_block {
            copies.push_str(", includes code");
        }
        if let Some(secs) = m.copy.time_to_first_copy_sec {
            copies.push_str(&format!(", first after {}s", secs));
        }
        println!("  Copies:    {}", copies);
        println!(
            "  Feedback:  {} good, {} bad, {} partial",
            m.feedback_good_count, m.feedback_bad_count, m.feedback_partial_count
        );
        println!("  Edits:     {}", m.user_edit_count);

        let partial = if m.is_partial_history {
            " (partial history)"
        } else {
            ""
        };
        println!("  Outcome:   {}{}", outcome_label(entry), partial);
        println!("  Events:    {}", entry.events.len());
        if !entry.summary.is_empty() {
            println!("  Summary:   {}", entry.summary);
        }
    }
}
