//! Integration tests for the capture → store → aggregate → record pipeline
//!
//! These tests drive a [`CaptureContext`] the way a page adapter would,
//! persist through the file-backed store and read the exported document back.

use chatrecord_core::config::{HeuristicsConfig, RecordConfig};
use chatrecord_core::{
    aggregate_snapshot, CaptureContext, EventLog, FeedbackKind, JsonFileStore, KeyValueStore,
    Outcome, Platform, ServiceRecord, ServiceRecordBuilder, SessionFlags, SessionIdResolver,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn at(ms: i64) -> DateTime<Utc> {
    t0() + Duration::milliseconds(ms)
}

fn chatgpt_context(suffix: &str) -> CaptureContext {
    CaptureContext::with_resolver(
        Platform::ChatGpt,
        HeuristicsConfig::default(),
        SessionIdResolver::with_tab_suffix(suffix),
    )
}

// ============================================
// End-to-end
// ============================================

#[tokio::test]
async fn test_capture_to_record() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::new(JsonFileStore::new(dir.path().join("store.json")));

    // Tab 1: a real conversation
    let mut tab = chatgpt_context("tab000000001");
    log.append_event(tab.page_visit("https://chatgpt.com/c/conv-1", Some("Borrowing"), at(0)))
        .await;
    let prompt = tab.prompt("what is a borrow?", at(1_000)).unwrap();
    log.append_event(prompt).await;
    assert!(tab.prompt("what is a borrow?", at(1_200)).is_none());

    tab.response_observed("A borrow is", at(2_000));
    tab.response_observed("A borrow is a reference.", at(2_500));
    assert!(tab.poll_settled(at(3_000)).is_none());
    log.append_event(tab.poll_settled(at(3_200)).unwrap()).await;

    log.append_event(tab.copy("```rust\nlet r = &x;\n```", Some("copy_button"), at(6_000)))
        .await;
    log.append_event(tab.feedback(FeedbackKind::Good, Some("msg-1"), at(8_000)))
        .await;

    // Tab 2: opened and left alone
    let mut idle = chatgpt_context("tab000000002");
    log.append_event(idle.page_visit("https://chatgpt.com/", None, at(500)))
        .await;

    let snapshot = log.try_snapshot().await.unwrap();
    assert_eq!(snapshot.events.len(), 6);
    assert_eq!(snapshot.metrics["chatgpt-c-conv-1"].user_message_count, 1);
    assert_eq!(snapshot.metrics["chatgpt-c-conv-1"].llm_message_count, 1);

    let sessions = aggregate_snapshot(&snapshot, &HeuristicsConfig::default(), at(60_000));
    assert_eq!(sessions.len(), 2);

    let record = ServiceRecordBuilder::new(&RecordConfig::default())
        .generated_at(at(60_000))
        .build(sessions);
    assert_eq!(record.sessions.len(), 1);

    let entry = &record.sessions[0];
    assert_eq!(entry.session_id, "chatgpt-c-conv-1");
    assert_eq!(entry.title, "Borrowing");
    assert_eq!(entry.metrics.user_message_count, 1);
    assert_eq!(entry.metrics.llm_message_count, 1);
    assert_eq!(entry.metrics.feedback_good_count, 1);
    assert_eq!(entry.metrics.copy.time_to_first_copy_sec, Some(5));
    assert!(entry.metrics.copy.copied_code_block);
    assert_eq!(
        entry.metrics.response_metrics.map(|m| m.avg_response_time_ms),
        Some(1_500.0)
    );
    assert_eq!(entry.metrics.outcome, Some(Outcome::Success));

    // The exported document reads back unchanged.
    let json = record.to_json_pretty().unwrap();
    let path = dir.path().join("record.json");
    std::fs::write(&path, json).unwrap();
    assert_eq!(ServiceRecord::read(&path).unwrap(), record);
}

#[tokio::test]
async fn test_flags_override_computed_values() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::new(JsonFileStore::new(dir.path().join("store.json")));

    let mut tab = CaptureContext::with_resolver(
        Platform::MoltbotWebchat,
        HeuristicsConfig::default(),
        SessionIdResolver::with_tab_suffix("unused"),
    );
    log.append_event(tab.page_visit("https://bot.example/chat?session=main", None, at(0)))
        .await;
    log.append_event(tab.prompt("hi", at(100)).unwrap()).await;
    log.append_event(tab.user_override(Some("took over"), at(5_000)))
        .await;

    let heuristics = HeuristicsConfig::default();
    let sessions = aggregate_snapshot(&log.snapshot().await, &heuristics, at(10_000));
    assert_eq!(sessions[0].session_id, "moltbot-s-main");
    assert_eq!(sessions[0].summary.outcome, Some(Outcome::EscalatedToHuman));
    assert_eq!(sessions[0].summary.title, "Moltbot WebChat session");

    log.set_session_flags(
        "moltbot-s-main",
        SessionFlags {
            outcome: Some(Outcome::Success),
            title: Some("Handled".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let sessions = aggregate_snapshot(&log.snapshot().await, &heuristics, at(10_000));
    assert_eq!(sessions[0].summary.outcome, Some(Outcome::Success));
    assert_eq!(sessions[0].summary.title, "Handled");
}

#[tokio::test]
async fn test_failed_end_and_corrupt_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let log = EventLog::new(JsonFileStore::new(&path));

    let mut tab = chatgpt_context("tab000000003");
    log.append_event(tab.page_visit("https://chatgpt.com/c/broken", None, at(0)))
        .await;
    log.append_event(tab.prompt("run it", at(100)).unwrap()).await;
    log.append_event(tab.session_end(true, at(2_000))).await;

    let snapshot = log.snapshot().await;
    let sessions = aggregate_snapshot(&snapshot, &HeuristicsConfig::default(), at(3_000));
    assert_eq!(sessions[0].summary.outcome, Some(Outcome::Failed));

    // A corrupt file fails strict reads and drops appends.
    std::fs::write(&path, "not json").unwrap();
    assert!(log.try_snapshot().await.is_err());
    assert!(log.store().get("events").await.is_err());
    log.append_event(tab.prompt("again", at(4_000)).unwrap()).await;
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
}
