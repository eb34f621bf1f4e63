//! Session aggregation
//!
//! Folds the flat, unordered event log into per-session summaries:
//!
//! 1. Group events by session id.
//! 2. Sort each group ascending by timestamp. The sort is stable, so
//!    events with identical timestamps keep their storage order; ties are
//!    not otherwise disambiguated.
//! 3. The session platform is the first declared platform in the group,
//!    defaulting to ChatGPT for records that predate platform tracking.
//! 4. Summarize each group with its flags.
//!
//! Sessions come back most recently active first. Aggregation is pure and
//! cheap enough to rerun on every refresh.

use crate::analytics::summarize;
use crate::config::HeuristicsConfig;
use crate::session_id::is_tab_scoped;
use crate::store::StoreSnapshot;
use crate::types::{EventRecord, Platform, Session, SessionFlagsMap, SessionSummary};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Group, sort and summarize `events`.
pub fn aggregate_sessions(
    events: &[EventRecord],
    flags: &SessionFlagsMap,
    heuristics: &HeuristicsConfig,
    now: DateTime<Utc>,
) -> Vec<Session> {
    let mut groups: HashMap<&str, Vec<EventRecord>> = HashMap::new();
    for event in events {
        groups
            .entry(event.session_id.as_str())
            .or_default()
            .push(event.clone());
    }

    let mut sessions: Vec<Session> = groups
        .into_iter()
        .map(|(session_id, mut events)| {
            events.sort_by_key(|e| e.timestamp);

            let platform = session_platform(&events);
            let summary = summarize(
                session_id,
                &platform,
                &events,
                flags.get(session_id),
                heuristics,
                now,
            );

            Session {
                session_id: session_id.to_string(),
                platform,
                events,
                summary,
            }
        })
        .collect();

    sessions.sort_by(|a, b| {
        b.ended_at()
            .cmp(&a.ended_at())
            .then_with(|| a.session_id.cmp(&b.session_id))
    });

    tracing::debug!(
        events = events.len(),
        sessions = sessions.len(),
        "Aggregated sessions"
    );

    sessions
}

/// Aggregate everything in a store snapshot.
///
/// Counts always come from events. The `sessionMetrics` shadow is only
/// compared against them, and disagreements are logged.
pub fn aggregate_snapshot(
    snapshot: &StoreSnapshot,
    heuristics: &HeuristicsConfig,
    now: DateTime<Utc>,
) -> Vec<Session> {
    let sessions = aggregate_sessions(&snapshot.events, &snapshot.flags, heuristics, now);

    for session in &sessions {
        if let Some(cached) = snapshot.metrics.get(&session.session_id) {
            if cached.user_message_count != session.summary.user_message_count
                || cached.llm_message_count != session.summary.llm_message_count
            {
                tracing::debug!(
                    session_id = %session.session_id,
                    cached_user = cached.user_message_count,
                    cached_llm = cached.llm_message_count,
                    user = session.summary.user_message_count,
                    llm = session.summary.llm_message_count,
                    "Cached counts disagree with events, using events"
                );
            }
        }
    }

    sessions
}

/// A tab-scoped session with no messages, copies or feedback.
///
/// These are noise from pages that were opened and never used. Conversation
/// scoped sessions are never trivial, whatever their counts.
pub fn is_trivial_tab_session(session_id: &str, summary: &SessionSummary) -> bool {
    is_tab_scoped(session_id)
        && summary.user_message_count == 0
        && summary.llm_message_count == 0
        && summary.copy_events_total == 0
        && summary.feedback_good_count == 0
        && summary.feedback_bad_count == 0
}

impl Session {
    pub fn is_trivial(&self) -> bool {
        is_trivial_tab_session(&self.session_id, &self.summary)
    }
}

/// Platform a session would resolve to from its events alone.
pub fn session_platform(events: &[EventRecord]) -> Platform {
    events
        .iter()
        .find_map(|e| e.platform.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CachedCounts, CopyMeta, EventMetadata, FeedbackMeta, OverrideMeta, PageVisitMeta,
        PromptMeta, ResponseMeta, SessionFlags,
    };
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn event(session_id: &str, secs: i64, metadata: EventMetadata) -> EventRecord {
        EventRecord::new(
            session_id,
            Platform::ChatGpt,
            t0() + Duration::seconds(secs),
            metadata,
        )
    }

    fn prompt(session_id: &str, secs: i64) -> EventRecord {
        event(session_id, secs, EventMetadata::UserPrompt(PromptMeta::default()))
    }

    fn response(session_id: &str, secs: i64, latency_ms: Option<f64>) -> EventRecord {
        event(
            session_id,
            secs,
            EventMetadata::LlmResponse(ResponseMeta {
                char_count: 10,
                latency_ms,
                turn_index: None,
            }),
        )
    }

    fn visit(session_id: &str, secs: i64) -> EventRecord {
        event(session_id, secs, EventMetadata::PageVisit(PageVisitMeta::default()))
    }

    #[test]
    fn groups_and_sorts_by_timestamp() {
        let events = vec![
            response("chatgpt-c-a", 5, Some(100.0)),
            prompt("chatgpt-c-b", 1),
            prompt("chatgpt-c-a", 0),
        ];

        let sessions = aggregate_sessions(
            &events,
            &SessionFlagsMap::new(),
            &HeuristicsConfig::default(),
            t0(),
        );

        assert_eq!(sessions.len(), 2);
        // most recently active first
        assert_eq!(sessions[0].session_id, "chatgpt-c-a");
        assert_eq!(sessions[1].session_id, "chatgpt-c-b");

        let a = &sessions[0];
        assert_eq!(a.events.len(), 2);
        assert!(a.events[0].timestamp < a.events[1].timestamp);
        assert_eq!(a.started_at(), Some(t0()));
        assert_eq!(a.ended_at(), Some(t0() + Duration::seconds(5)));
        assert_eq!(a.summary.user_message_count, 1);
        assert_eq!(a.summary.llm_message_count, 1);
    }

    #[test]
    fn platform_is_first_declared_or_chatgpt() {
        let mut legacy = prompt("moltbot-s-x", 0);
        legacy.platform = None;
        let mut declared = response("moltbot-s-x", 3, None);
        declared.platform = Some(Platform::MoltbotWebchat);
        let mut bare = prompt("chatgpt-c-old", 0);
        bare.platform = None;

        let sessions = aggregate_sessions(
            &[legacy, declared, bare],
            &SessionFlagsMap::new(),
            &HeuristicsConfig::default(),
            t0(),
        );

        let moltbot = sessions.iter().find(|s| s.session_id == "moltbot-s-x").unwrap();
        assert_eq!(moltbot.platform, Platform::MoltbotWebchat);
        let old = sessions.iter().find(|s| s.session_id == "chatgpt-c-old").unwrap();
        assert_eq!(old.platform, Platform::ChatGpt);
    }

    #[test]
    fn flags_apply_per_session() {
        let events = vec![prompt("chatgpt-c-a", 0), prompt("chatgpt-c-b", 0)];
        let mut flags = SessionFlagsMap::new();
        flags.insert(
            "chatgpt-c-b".to_string(),
            SessionFlags {
                human_override_required: true,
                title: Some("Escalated refund".to_string()),
                ..Default::default()
            },
        );

        let sessions = aggregate_sessions(&events, &flags, &HeuristicsConfig::default(), t0());
        let a = sessions.iter().find(|s| s.session_id == "chatgpt-c-a").unwrap();
        let b = sessions.iter().find(|s| s.session_id == "chatgpt-c-b").unwrap();
        assert_eq!(a.summary.outcome, Some(crate::types::Outcome::Success));
        assert_eq!(
            b.summary.outcome,
            Some(crate::types::Outcome::EscalatedToHuman)
        );
        assert_eq!(b.summary.title, "Escalated refund");
    }

    #[test]
    fn aggregation_is_idempotent() {
        let events = vec![
            prompt("chatgpt-c-a", 0),
            response("chatgpt-c-a", 4, Some(900.0)),
            event("chatgpt-c-a", 6, EventMetadata::UserOverride(OverrideMeta::default())),
        ];
        let flags = SessionFlagsMap::new();
        let heuristics = HeuristicsConfig::default();

        let first = aggregate_sessions(&events, &flags, &heuristics, t0());
        let second = aggregate_sessions(&events, &flags, &heuristics, t0());
        assert_eq!(first, second);
    }

    #[test]
    fn cached_counts_are_never_trusted() {
        let mut metrics = HashMap::new();
        metrics.insert(
            "chatgpt-c-a".to_string(),
            CachedCounts {
                user_message_count: 40,
                llm_message_count: 40,
            },
        );
        let snapshot = StoreSnapshot {
            events: vec![prompt("chatgpt-c-a", 0)],
            flags: SessionFlagsMap::new(),
            metrics,
        };

        let sessions = aggregate_snapshot(&snapshot, &HeuristicsConfig::default(), t0());
        assert_eq!(sessions[0].summary.user_message_count, 1);
        assert_eq!(sessions[0].summary.llm_message_count, 0);
    }

    #[test]
    fn trivial_filter_is_prefix_based() {
        let events = vec![visit("chatgpt-tab-abc", 0), visit("chatgpt-c-abc", 0)];
        let sessions = aggregate_sessions(
            &events,
            &SessionFlagsMap::new(),
            &HeuristicsConfig::default(),
            t0(),
        );

        let tab = sessions.iter().find(|s| s.session_id == "chatgpt-tab-abc").unwrap();
        let conversation = sessions.iter().find(|s| s.session_id == "chatgpt-c-abc").unwrap();
        assert!(tab.is_trivial());
        assert!(!conversation.is_trivial());
    }

    #[test]
    fn idle_tab_on_other_platform_is_trivial() {
        let mut idle = visit("claude_web-tab-x1", 0);
        idle.platform = Some(Platform::Other("claude_web".to_string()));
        let mut used = prompt("claude_web-tab-x2", 0);
        used.platform = Some(Platform::Other("claude_web".to_string()));

        let sessions = aggregate_sessions(
            &[idle, used],
            &SessionFlagsMap::new(),
            &HeuristicsConfig::default(),
            t0(),
        );

        let idle = sessions.iter().find(|s| s.session_id == "claude_web-tab-x1").unwrap();
        let used = sessions.iter().find(|s| s.session_id == "claude_web-tab-x2").unwrap();
        assert_eq!(idle.platform, Platform::Other("claude_web".to_string()));
        assert!(idle.is_trivial());
        assert!(!used.is_trivial());
    }

    #[test]
    fn tab_session_with_activity_is_not_trivial() {
        let events = vec![
            visit("moltbot-tab-1", 0),
            event("moltbot-tab-1", 2, EventMetadata::FeedbackBad(FeedbackMeta::default())),
            visit("moltbot-tab-2", 0),
            event(
                "moltbot-tab-2",
                2,
                EventMetadata::CopyOutput(CopyMeta::default()),
            ),
        ];
        let sessions = aggregate_sessions(
            &events,
            &SessionFlagsMap::new(),
            &HeuristicsConfig::default(),
            t0(),
        );
        assert!(sessions.iter().all(|s| !s.is_trivial()));
    }

    fn build_events(specs: &[(usize, usize, Option<u32>)]) -> Vec<EventRecord> {
        const SESSIONS: [&str; 3] = ["chatgpt-c-a", "chatgpt-tab-b", "moltbot-s-c"];
        specs
            .iter()
            .enumerate()
            .map(|(i, &(session, kind, latency))| {
                let session_id = SESSIONS[session];
                let secs = i as i64 * 3;
                let metadata = match kind {
                    0 => EventMetadata::UserPrompt(PromptMeta::default()),
                    1 => EventMetadata::LlmResponse(ResponseMeta {
                        char_count: 50,
                        latency_ms: latency.map(f64::from),
                        turn_index: None,
                    }),
                    2 => EventMetadata::CopyOutput(CopyMeta {
                        char_count: 20,
                        is_code_like: latency.is_some(),
                        ..Default::default()
                    }),
                    3 => EventMetadata::FeedbackGood(FeedbackMeta::default()),
                    4 => EventMetadata::FeedbackBad(FeedbackMeta::default()),
                    5 => EventMetadata::UserOverride(OverrideMeta::default()),
                    _ => EventMetadata::PageVisit(PageVisitMeta {
                        url: None,
                        title: Some(format!("page {}", i)),
                    }),
                };
                event(session_id, secs, metadata)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn shuffled_input_gives_identical_sessions(
            (ordered, shuffled) in prop::collection::vec(
                (0usize..3, 0usize..8, proptest::option::of(0u32..10_000)),
                0..40,
            )
            .prop_flat_map(|specs| {
                let events = build_events(&specs);
                (Just(events.clone()), Just(events).prop_shuffle())
            })
        ) {
            let flags = SessionFlagsMap::new();
            let heuristics = HeuristicsConfig::default();
            let now = t0() + Duration::hours(2);

            let expected = aggregate_sessions(&ordered, &flags, &heuristics, now);
            let actual = aggregate_sessions(&shuffled, &flags, &heuristics, now);
            prop_assert_eq!(expected, actual);
        }
    }
}
