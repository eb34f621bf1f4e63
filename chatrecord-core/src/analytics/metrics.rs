//! Per-session metric functions.
//!
//! Every function here expects events already sorted ascending by
//! timestamp and performs no I/O.

use crate::config::HeuristicsConfig;
use crate::types::{
    CopyStats, EventMetadata, EventRecord, EventType, Platform, ResponseMetrics, SessionFlags,
};

/// Type-match tallies over one session.
///
/// No deduplication happens here; suppressing rapid duplicates is the
/// capture side's job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub user_messages: u64,
    pub llm_messages: u64,
    pub copies: u64,
    pub feedback_good: u64,
    pub feedback_bad: u64,
    pub feedback_partial: u64,
    pub user_edits: u64,
    pub overrides: u64,
    pub total: u64,
}

impl EventCounts {
    pub fn from_events(events: &[EventRecord]) -> Self {
        let mut counts = EventCounts::default();
        for event in events {
            counts.total += 1;
            match event.event_type() {
                EventType::UserPrompt => counts.user_messages += 1,
                EventType::LlmResponse => counts.llm_messages += 1,
                EventType::CopyOutput => counts.copies += 1,
                EventType::FeedbackGood => counts.feedback_good += 1,
                EventType::FeedbackBad => counts.feedback_bad += 1,
                EventType::FeedbackPartial => counts.feedback_partial += 1,
                EventType::UserEdit => counts.user_edits += 1,
                EventType::UserOverride => counts.overrides += 1,
                EventType::PageVisit | EventType::SessionEnd => {}
            }
        }
        counts
    }
}

/// Latency statistics over `llm_response` events carrying a finite `latencyMs`.
///
/// `None` when there are no samples. The p95 is nearest-rank without
/// interpolation: the sorted sample at index `floor(0.95 * (n - 1))`.
pub fn response_metrics(events: &[EventRecord]) -> Option<ResponseMetrics> {
    let mut samples: Vec<f64> = events
        .iter()
        .filter_map(EventRecord::response_latency_ms)
        .collect();

    if samples.is_empty() {
        return None;
    }

    samples.sort_by(f64::total_cmp);
    let n = samples.len();
    let p95_index = (95 * (n - 1)) / 100;

    Some(ResponseMetrics {
        avg_response_time_ms: samples.iter().sum::<f64>() / n as f64,
        p95_response_time_ms: samples[p95_index],
        max_response_time_ms: samples[n - 1],
    })
}

/// Copy behaviour: totals, code detection and time to first copy.
///
/// The anchor for `time_to_first_copy_sec` is the first `user_prompt`, or
/// the first event when no prompt was observed. A copy that precedes the
/// anchor clamps to zero.
pub fn copy_stats(events: &[EventRecord]) -> CopyStats {
    let mut stats = CopyStats::default();
    let mut first_copy_at = None;

    for event in events {
        if let EventMetadata::CopyOutput(meta) = &event.metadata {
            stats.copied_output = true;
            stats.copied_text_length += meta.char_count;
            stats.copied_code_block |= meta.is_code_like;
            first_copy_at.get_or_insert(event.timestamp);
        }
    }

    let anchor = events
        .iter()
        .find(|e| e.event_type() == EventType::UserPrompt)
        .or_else(|| events.first())
        .map(|e| e.timestamp);

    stats.time_to_first_copy_sec = match (anchor, first_copy_at) {
        (Some(anchor), Some(copied)) => {
            Some(copied.signed_duration_since(anchor).num_seconds().max(0))
        }
        _ => None,
    };

    stats
}

/// `max(0, last - first)` in milliseconds.
pub fn approx_duration_ms(events: &[EventRecord]) -> i64 {
    match (events.first(), events.last()) {
        (Some(first), Some(last)) => last
            .timestamp
            .signed_duration_since(first.timestamp)
            .num_milliseconds()
            .max(0),
        _ => 0,
    }
}

/// The observer attached mid-conversation: plenty of assistant turns and
/// some engagement, but no prompts seen.
pub fn is_partial_history(counts: &EventCounts, heuristics: &HeuristicsConfig) -> bool {
    counts.user_messages == 0
        && counts.llm_messages >= heuristics.partial_history_min_llm_messages as u64
        && (counts.copies > 0 || counts.feedback_good + counts.feedback_bad > 0)
}

/// Display name for a session.
///
/// Priority: flag title, then the most recent page title, then the
/// platform label, then the raw session id.
pub fn resolve_title(
    session_id: &str,
    platform: &Platform,
    events: &[EventRecord],
    flags: Option<&SessionFlags>,
) -> String {
    let flag_title = flags
        .and_then(|f| f.title.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(title) = flag_title {
        return title.to_string();
    }

    let page_title = events
        .iter()
        .rev()
        .find_map(|e| match &e.metadata {
            EventMetadata::PageVisit(meta) => Some(meta.title.as_deref()),
            _ => None,
        })
        .flatten()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(title) = page_title {
        return title.to_string();
    }

    platform
        .default_title()
        .map(str::to_string)
        .unwrap_or_else(|| session_id.to_string())
}
