//! Outcome classification.
//!
//! This is a heuristic, not ground truth. Consumers displaying an outcome
//! should present it as a best-effort guess.
//!
//! Rules, first match wins:
//!
//! 1. An explicit `outcome` flag is used verbatim.
//! 2. `humanOverrideRequired`, or any `user_override` event → `escalated_to_human`.
//! 3. A `session_end` carrying the failure sentinel latency → `failed`.
//! 4. Stale, short and brief → `abandoned`.
//! 5. Otherwise → `success`.

use crate::config::HeuristicsConfig;
use crate::types::{
    EventMetadata, EventRecord, EventType, Outcome, SessionFlags, SESSION_END_FAILURE_LATENCY,
};
use chrono::{DateTime, TimeDelta, Utc};

/// Classify a session from its sorted events and optional flags.
///
/// `now` anchors the staleness check so classification stays deterministic.
pub fn classify_outcome(
    events: &[EventRecord],
    flags: Option<&SessionFlags>,
    heuristics: &HeuristicsConfig,
    now: DateTime<Utc>,
) -> Outcome {
    if let Some(outcome) = flags.and_then(|f| f.outcome) {
        return outcome;
    }

    let override_flagged = flags.is_some_and(|f| f.human_override_required);
    if override_flagged
        || events
            .iter()
            .any(|e| e.event_type() == EventType::UserOverride)
    {
        return Outcome::EscalatedToHuman;
    }

    if events.iter().any(is_failed_end) {
        return Outcome::Failed;
    }

    if is_abandoned(events, heuristics, now) {
        return Outcome::Abandoned;
    }

    Outcome::Success
}

fn is_failed_end(event: &EventRecord) -> bool {
    matches!(
        &event.metadata,
        EventMetadata::SessionEnd(meta) if meta.latency_ms == Some(SESSION_END_FAILURE_LATENCY)
    )
}

fn is_abandoned(events: &[EventRecord], heuristics: &HeuristicsConfig, now: DateTime<Utc>) -> bool {
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return false;
    };

    // A threshold too large for a TimeDelta can never be exceeded.
    let stale = TimeDelta::try_minutes(heuristics.stale_after_minutes)
        .is_some_and(|limit| now.signed_duration_since(last.timestamp) > limit);
    let short = events.len() <= heuristics.abandon_max_events;
    let brief = TimeDelta::try_seconds(heuristics.abandon_max_duration_secs)
        .map_or(true, |limit| last.timestamp.signed_duration_since(first.timestamp) <= limit);

    stale && short && brief
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OverrideMeta, Platform, PromptMeta, ResponseMeta, SessionEndMeta};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn make_event(secs: i64, metadata: EventMetadata) -> EventRecord {
        EventRecord::new(
            "moltbot-s-main",
            Platform::MoltbotWebchat,
            t0() + Duration::seconds(secs),
            metadata,
        )
    }

    fn prompt(secs: i64) -> EventRecord {
        make_event(secs, EventMetadata::UserPrompt(PromptMeta::default()))
    }

    fn response(secs: i64) -> EventRecord {
        make_event(secs, EventMetadata::LlmResponse(ResponseMeta::default()))
    }

    fn end(secs: i64, latency_ms: Option<f64>) -> EventRecord {
        make_event(
            secs,
            EventMetadata::SessionEnd(SessionEndMeta {
                latency_ms,
                reason: None,
            }),
        )
    }

    fn user_override(secs: i64) -> EventRecord {
        make_event(secs, EventMetadata::UserOverride(OverrideMeta::default()))
    }

    fn hour_later() -> DateTime<Utc> {
        t0() + Duration::hours(1)
    }

    #[test]
    fn explicit_flag_wins() {
        let flags = SessionFlags {
            human_override_required: true,
            outcome: Some(Outcome::Success),
            title: None,
        };
        let events = vec![prompt(0), user_override(2), end(3, Some(-1.0))];
        assert_eq!(
            classify_outcome(&events, Some(&flags), &HeuristicsConfig::default(), hour_later()),
            Outcome::Success
        );
    }

    #[test]
    fn override_event_forces_escalation() {
        let events = vec![prompt(0), response(4), user_override(6), end(9, Some(-1.0))];
        assert_eq!(
            classify_outcome(&events, None, &HeuristicsConfig::default(), hour_later()),
            Outcome::EscalatedToHuman
        );
    }

    #[test]
    fn override_flag_forces_escalation() {
        let flags = SessionFlags {
            human_override_required: true,
            ..Default::default()
        };
        let events = vec![prompt(0), response(4)];
        assert_eq!(
            classify_outcome(&events, Some(&flags), &HeuristicsConfig::default(), t0()),
            Outcome::EscalatedToHuman
        );
    }

    #[test]
    fn failure_sentinel_marks_failed() {
        let events = vec![prompt(0), response(3), end(5, Some(-1.0))];
        assert_eq!(
            classify_outcome(&events, None, &HeuristicsConfig::default(), t0()),
            Outcome::Failed
        );

        // any other latency on the end event is an ordinary close
        let events = vec![prompt(0), response(3), end(5, Some(1500.0))];
        assert_eq!(
            classify_outcome(&events, None, &HeuristicsConfig::default(), t0()),
            Outcome::Success
        );
    }

    #[test]
    fn stale_short_brief_session_is_abandoned() {
        let events = vec![prompt(0), response(20)];
        let heuristics = HeuristicsConfig::default();

        assert_eq!(
            classify_outcome(&events, None, &heuristics, hour_later()),
            Outcome::Abandoned
        );
        // still fresh
        assert_eq!(
            classify_outcome(&events, None, &heuristics, t0() + Duration::minutes(5)),
            Outcome::Success
        );

        // exactly two events spanning exactly 30s still count as short and brief
        let edge = vec![prompt(0), response(30)];
        let last = t0() + Duration::seconds(30);
        assert_eq!(
            classify_outcome(&edge, None, &heuristics, last + Duration::minutes(10)),
            Outcome::Success,
            "exactly 10 minutes idle is not yet stale"
        );
        assert_eq!(
            classify_outcome(
                &edge,
                None,
                &heuristics,
                last + Duration::minutes(10) + Duration::seconds(1)
            ),
            Outcome::Abandoned
        );

        let over = vec![prompt(0), response(31)];
        assert_eq!(
            classify_outcome(&over, None, &heuristics, hour_later()),
            Outcome::Success,
            "31s is longer than brief"
        );
    }

    #[test]
    fn out_of_range_thresholds_do_not_panic() {
        let events = vec![prompt(0), response(20)];

        let never_stale = HeuristicsConfig {
            stale_after_minutes: 9_000_000_000_000_000_000,
            ..Default::default()
        };
        assert_eq!(
            classify_outcome(&events, None, &never_stale, hour_later()),
            Outcome::Success
        );

        let always_brief = HeuristicsConfig {
            abandon_max_duration_secs: i64::MAX,
            ..Default::default()
        };
        let long = vec![prompt(0), response(3_000)];
        assert_eq!(
            classify_outcome(&long, None, &always_brief, t0() + Duration::hours(2)),
            Outcome::Abandoned
        );
    }

    #[test]
    fn long_or_busy_sessions_are_not_abandoned() {
        let heuristics = HeuristicsConfig::default();

        let long = vec![prompt(0), response(45)];
        assert_eq!(
            classify_outcome(&long, None, &heuristics, hour_later()),
            Outcome::Success
        );

        let busy = vec![prompt(0), response(5), prompt(10)];
        assert_eq!(
            classify_outcome(&busy, None, &heuristics, hour_later()),
            Outcome::Success
        );
    }

    #[test]
    fn thresholds_are_configurable() {
        let heuristics = HeuristicsConfig {
            abandon_max_events: 3,
            ..Default::default()
        };
        let busy = vec![prompt(0), response(5), prompt(10)];
        assert_eq!(
            classify_outcome(&busy, None, &heuristics, hour_later()),
            Outcome::Abandoned
        );
    }
}
