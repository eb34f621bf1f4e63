//! Summary metrics for sessions
//!
//! Pure, deterministic functions over a session's timestamp-sorted events:
//! - Message, copy and feedback tallies ([`EventCounts`])
//! - Response latency statistics ([`response_metrics`])
//! - Copy behaviour ([`copy_stats`])
//! - Outcome classification ([`classify_outcome`])
//! - Partial-history detection and title resolution
//!
//! [`summarize`] combines them into a [`SessionSummary`]. Nothing here is
//! cached; summaries are recomputed on every read.

pub mod metrics;
pub mod outcome;

pub use metrics::{
    approx_duration_ms, copy_stats, is_partial_history, resolve_title, response_metrics,
    EventCounts,
};
pub use outcome::classify_outcome;

use crate::config::HeuristicsConfig;
use crate::types::{EventRecord, Platform, SessionFlags, SessionSummary};
use chrono::{DateTime, Utc};

/// Compute the summary for one session.
///
/// `events` must be sorted ascending by timestamp.
pub fn summarize(
    session_id: &str,
    platform: &Platform,
    events: &[EventRecord],
    flags: Option<&SessionFlags>,
    heuristics: &HeuristicsConfig,
    now: DateTime<Utc>,
) -> SessionSummary {
    let counts = EventCounts::from_events(events);

    SessionSummary {
        user_message_count: counts.user_messages,
        llm_message_count: counts.llm_messages,
        copy_events_total: counts.copies,
        feedback_good_count: counts.feedback_good,
        feedback_bad_count: counts.feedback_bad,
        feedback_partial_count: counts.feedback_partial,
        user_edit_count: counts.user_edits,
        total_events: counts.total,
        approx_duration_ms: approx_duration_ms(events),
        response_metrics: response_metrics(events),
        copy: copy_stats(events),
        outcome: Some(classify_outcome(events, flags, heuristics, now)),
        is_partial_history: is_partial_history(&counts, heuristics),
        title: resolve_title(session_id, platform, events, flags),
    }
}
