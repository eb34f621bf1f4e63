//! Service record builder
//!
//! Assembles the exportable document: static metadata plus the ordered,
//! filtered list of sessions with their full event lists.
//!
//! ```json
//! {
//!   "recordType": "agent_service_record",
//!   "version": "1.0",
//!   "subject": "...", "observer": "...", "generatedAt": "...", "agentLabel": "...",
//!   "sessions": [
//!     { "sessionId": "...", "platform": "chatgpt", "startedAt": "...", "endedAt": "...",
//!       "toolLabel": "ChatGPT", "title": "...", "events": [...], "metrics": {...},
//!       "summary": "..." }
//!   ]
//! }
//! ```
//!
//! Reading a document back is permissive: missing fields default and
//! undecodable events are skipped.

use crate::config::RecordConfig;
use crate::error::Result;
use crate::format::{format_duration_ms, format_latency_ms, plural};
use crate::types::{format_timestamp, EventRecord, Platform, Session, SessionSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

pub const RECORD_TYPE: &str = "agent_service_record";
pub const RECORD_VERSION: &str = "1.0";

/// The exported document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRecord {
    pub record_type: String,
    pub version: String,
    pub subject: String,
    pub observer: String,
    pub generated_at: String,
    pub agent_label: String,
    pub sessions: Vec<SessionEntry>,
}

/// One session in an exported document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionEntry {
    pub session_id: String,
    pub platform: Platform,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub tool_label: String,
    pub title: String,
    #[serde(deserialize_with = "lenient_events")]
    pub events: Vec<EventRecord>,
    pub metrics: SessionSummary,
    /// One-line human description of the session
    pub summary: String,
}

impl ServiceRecord {
    /// Parse an exported document.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read an exported document from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds [`ServiceRecord`]s from aggregated sessions.
#[derive(Debug, Clone)]
pub struct ServiceRecordBuilder {
    subject: String,
    observer: String,
    agent_label: String,
    include_trivial: bool,
    generated_at: Option<DateTime<Utc>>,
}

impl ServiceRecordBuilder {
    pub fn new(config: &RecordConfig) -> Self {
        Self {
            subject: config.subject.clone(),
            observer: config.observer.clone(),
            agent_label: config.agent_label.clone(),
            include_trivial: config.include_trivial,
            generated_at: None,
        }
    }

    /// Keep tab-scoped sessions that saw no activity.
    pub fn include_trivial(mut self, include: bool) -> Self {
        self.include_trivial = include;
        self
    }

    /// Pin the generation timestamp (defaults to the time of `build`).
    pub fn generated_at(mut self, ts: DateTime<Utc>) -> Self {
        self.generated_at = Some(ts);
        self
    }

    /// Assemble the document, preserving session order.
    pub fn build(&self, sessions: Vec<Session>) -> ServiceRecord {
        let total = sessions.len();
        let entries: Vec<SessionEntry> = sessions
            .into_iter()
            .filter(|s| self.include_trivial || !s.is_trivial())
            .map(SessionEntry::from_session)
            .collect();

        tracing::info!(
            sessions = entries.len(),
            dropped = total - entries.len(),
            "Built service record"
        );

        ServiceRecord {
            record_type: RECORD_TYPE.to_string(),
            version: RECORD_VERSION.to_string(),
            subject: self.subject.clone(),
            observer: self.observer.clone(),
            generated_at: format_timestamp(self.generated_at.unwrap_or_else(Utc::now)),
            agent_label: self.agent_label.clone(),
            sessions: entries,
        }
    }
}

impl SessionEntry {
    pub fn from_session(session: Session) -> Self {
        let summary = describe(&session.summary);
        Self {
            started_at: session.started_at().map(format_timestamp),
            ended_at: session.ended_at().map(format_timestamp),
            tool_label: session.platform.display_name().to_string(),
            title: session.summary.title.clone(),
            session_id: session.session_id,
            platform: session.platform,
            events: session.events,
            metrics: session.summary,
            summary,
        }
    }
}

/// One-line description, e.g.
/// `"2 prompts, 2 responses, 1 copy, avg 1.2s; success; 3m 10s"`.
pub fn describe(summary: &SessionSummary) -> String {
    let mut parts = vec![
        plural(summary.user_message_count, "prompt", "prompts"),
        plural(summary.llm_message_count, "response", "responses"),
        plural(summary.copy_events_total, "copy", "copies"),
    ];
    let feedback = summary.feedback_good_count + summary.feedback_bad_count;
    if feedback > 0 {
        parts.push(format!(
            "feedback +{}/-{}",
            summary.feedback_good_count, summary.feedback_bad_count
        ));
    }
    if let Some(metrics) = &summary.response_metrics {
        parts.push(format!("avg {}", format_latency_ms(metrics.avg_response_time_ms)));
    }

    let mut line = parts.join(", ");
    if let Some(outcome) = summary.outcome {
        line.push_str("; ");
        line.push_str(outcome.as_str());
    }
    if summary.is_partial_history {
        line.push_str(" (partial history)");
    }
    line.push_str("; ");
    line.push_str(&format_duration_ms(summary.approx_duration_ms));
    line
}

fn lenient_events<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<EventRecord>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Array(entries) => entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
        _ => Vec::new(),
    })
}
