//! Core domain types for chatrecord
//!
//! These types represent the data model shared by the capture adapters,
//! the persisted event log and the derived service record.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Event Record** | An immutable, timestamped fact about one observed interaction |
//! | **Platform** | The chat surface the event was observed on (ChatGPT, Moltbot WebChat) |
//! | **Session** | All events sharing a session id, rebuilt on every read |
//! | **Session Flags** | Operator-edited annotations keyed by session id |
//! | **Outcome** | Best-effort classification of how a session concluded |
//!
//! Only [`EventRecord`]s and [`SessionFlags`] are ever persisted. Everything
//! else in this module is derived and recomputed on demand.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

// ============================================
// Event types
// ============================================

/// Kind of interaction an [`EventRecord`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageVisit,
    UserPrompt,
    LlmResponse,
    CopyOutput,
    FeedbackGood,
    FeedbackBad,
    FeedbackPartial,
    UserEdit,
    UserOverride,
    SessionEnd,
}

impl EventType {
    /// Returns the identifier used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageVisit => "page_visit",
            EventType::UserPrompt => "user_prompt",
            EventType::LlmResponse => "llm_response",
            EventType::CopyOutput => "copy_output",
            EventType::FeedbackGood => "feedback_good",
            EventType::FeedbackBad => "feedback_bad",
            EventType::FeedbackPartial => "feedback_partial",
            EventType::UserEdit => "user_edit",
            EventType::UserOverride => "user_override",
            EventType::SessionEnd => "session_end",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_visit" => Ok(EventType::PageVisit),
            "user_prompt" => Ok(EventType::UserPrompt),
            "llm_response" => Ok(EventType::LlmResponse),
            "copy_output" => Ok(EventType::CopyOutput),
            "feedback_good" => Ok(EventType::FeedbackGood),
            "feedback_bad" => Ok(EventType::FeedbackBad),
            "feedback_partial" => Ok(EventType::FeedbackPartial),
            "user_edit" => Ok(EventType::UserEdit),
            "user_override" => Ok(EventType::UserOverride),
            "session_end" => Ok(EventType::SessionEnd),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

// ============================================
// Platforms
// ============================================

/// Chat surface an event was observed on.
///
/// The set is open: unknown platform strings are preserved as [`Platform::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    #[default]
    ChatGpt,
    MoltbotWebchat,
    Other(String),
}

impl Platform {
    /// Returns the identifier used in storage
    pub fn as_str(&self) -> &str {
        match self {
            Platform::ChatGpt => "chatgpt",
            Platform::MoltbotWebchat => "moltbot_webchat",
            Platform::Other(name) => name,
        }
    }

    /// Returns the display name for this platform
    pub fn display_name(&self) -> &str {
        match self {
            Platform::ChatGpt => "ChatGPT",
            Platform::MoltbotWebchat => "Moltbot WebChat",
            Platform::Other(name) => name,
        }
    }

    /// Prefix used when deriving session ids
    pub fn id_prefix(&self) -> &str {
        match self {
            Platform::ChatGpt => "chatgpt",
            Platform::MoltbotWebchat => "moltbot",
            Platform::Other(name) => name,
        }
    }

    /// Title used when neither a flag nor a page visit names the session
    pub fn default_title(&self) -> Option<&'static str> {
        match self {
            Platform::ChatGpt => Some("ChatGPT conversation"),
            Platform::MoltbotWebchat => Some("Moltbot WebChat session"),
            Platform::Other(_) => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        match s.as_str() {
            "chatgpt" => Platform::ChatGpt,
            "moltbot_webchat" | "moltbot" => Platform::MoltbotWebchat,
            _ => Platform::Other(s),
        }
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.as_str().to_string()
    }
}

// ============================================
// Event metadata
// ============================================

/// `page_visit` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageVisitMeta {
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Document title captured at visit time
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// `user_prompt` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptMeta {
    #[serde(deserialize_with = "lenient_u64")]
    pub char_count: u64,
    #[serde(deserialize_with = "lenient_opt_u64", skip_serializing_if = "Option::is_none")]
    pub turn_index: Option<u64>,
}

/// `llm_response` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseMeta {
    #[serde(deserialize_with = "lenient_u64")]
    pub char_count: u64,
    /// Time from the triggering prompt to the settled response
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_u64", skip_serializing_if = "Option::is_none")]
    pub turn_index: Option<u64>,
}

/// `copy_output` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CopyMeta {
    #[serde(deserialize_with = "lenient_u64")]
    pub char_count: u64,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_code_like: bool,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
    /// What initiated the copy (copy button, keyboard shortcut, context menu)
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

/// `feedback_*` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackMeta {
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// `user_edit` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditMeta {
    #[serde(deserialize_with = "lenient_u64")]
    pub char_count: u64,
}

/// `user_override` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverrideMeta {
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `session_end` payload
///
/// A `latency_ms` of exactly [`SESSION_END_FAILURE_LATENCY`] marks a failed session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionEndMeta {
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Sentinel `latencyMs` carried by a `session_end` event for a failed session
pub const SESSION_END_FAILURE_LATENCY: f64 = -1.0;

/// Type-specific payload of an event, indexed by [`EventType`]
#[derive(Debug, Clone, PartialEq)]
pub enum EventMetadata {
    PageVisit(PageVisitMeta),
    UserPrompt(PromptMeta),
    LlmResponse(ResponseMeta),
    CopyOutput(CopyMeta),
    FeedbackGood(FeedbackMeta),
    FeedbackBad(FeedbackMeta),
    FeedbackPartial(FeedbackMeta),
    UserEdit(EditMeta),
    UserOverride(OverrideMeta),
    SessionEnd(SessionEndMeta),
}

impl EventMetadata {
    pub fn event_type(&self) -> EventType {
        match self {
            EventMetadata::PageVisit(_) => EventType::PageVisit,
            EventMetadata::UserPrompt(_) => EventType::UserPrompt,
            EventMetadata::LlmResponse(_) => EventType::LlmResponse,
            EventMetadata::CopyOutput(_) => EventType::CopyOutput,
            EventMetadata::FeedbackGood(_) => EventType::FeedbackGood,
            EventMetadata::FeedbackBad(_) => EventType::FeedbackBad,
            EventMetadata::FeedbackPartial(_) => EventType::FeedbackPartial,
            EventMetadata::UserEdit(_) => EventType::UserEdit,
            EventMetadata::UserOverride(_) => EventType::UserOverride,
            EventMetadata::SessionEnd(_) => EventType::SessionEnd,
        }
    }

    /// Decode a stored payload for `event_type`.
    ///
    /// Payloads that are not objects, or whose fields have the wrong shape,
    /// fall back to the field defaults instead of failing.
    pub fn from_value(event_type: EventType, value: serde_json::Value) -> Self {
        fn decode<T: Default + for<'de> Deserialize<'de>>(value: serde_json::Value) -> T {
            serde_json::from_value(value).unwrap_or_default()
        }

        match event_type {
            EventType::PageVisit => EventMetadata::PageVisit(decode(value)),
            EventType::UserPrompt => EventMetadata::UserPrompt(decode(value)),
            EventType::LlmResponse => EventMetadata::LlmResponse(decode(value)),
            EventType::CopyOutput => EventMetadata::CopyOutput(decode(value)),
            EventType::FeedbackGood => EventMetadata::FeedbackGood(decode(value)),
            EventType::FeedbackBad => EventMetadata::FeedbackBad(decode(value)),
            EventType::FeedbackPartial => EventMetadata::FeedbackPartial(decode(value)),
            EventType::UserEdit => EventMetadata::UserEdit(decode(value)),
            EventType::UserOverride => EventMetadata::UserOverride(decode(value)),
            EventType::SessionEnd => EventMetadata::SessionEnd(decode(value)),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        let value = match self {
            EventMetadata::PageVisit(m) => serde_json::to_value(m),
            EventMetadata::UserPrompt(m) => serde_json::to_value(m),
            EventMetadata::LlmResponse(m) => serde_json::to_value(m),
            EventMetadata::CopyOutput(m) => serde_json::to_value(m),
            EventMetadata::FeedbackGood(m)
            | EventMetadata::FeedbackBad(m)
            | EventMetadata::FeedbackPartial(m) => serde_json::to_value(m),
            EventMetadata::UserEdit(m) => serde_json::to_value(m),
            EventMetadata::UserOverride(m) => serde_json::to_value(m),
            EventMetadata::SessionEnd(m) => serde_json::to_value(m),
        };
        // Plain structs of strings and numbers always serialize.
        value.unwrap_or_else(|_| serde_json::json!({}))
    }
}

// ============================================
// Event records
// ============================================

/// An immutable fact about one observed interaction.
///
/// Records are append-only: once written they are never edited, only
/// removed by clearing the whole log. `(session_id, timestamp)` is not
/// unique; duplicates are expected and tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEventRecord", into = "RawEventRecord")]
pub struct EventRecord {
    /// Assigned by the session identity resolver at creation time
    pub session_id: String,
    /// Missing on records written before platforms were tracked
    pub platform: Option<Platform>,
    pub timestamp: DateTime<Utc>,
    pub metadata: EventMetadata,
}

impl EventRecord {
    pub fn new(
        session_id: impl Into<String>,
        platform: Platform,
        timestamp: DateTime<Utc>,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            platform: Some(platform),
            timestamp,
            metadata,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.metadata.event_type()
    }

    /// Response latency, present only on `llm_response` events with a finite value
    pub fn response_latency_ms(&self) -> Option<f64> {
        match &self.metadata {
            EventMetadata::LlmResponse(m) => m.latency_ms.filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

/// Storage shape of an [`EventRecord`]: `{type, platform, timestamp, sessionId, metadata}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventRecord {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    platform: Option<String>,
    timestamp: String,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl TryFrom<RawEventRecord> for EventRecord {
    type Error = String;

    fn try_from(raw: RawEventRecord) -> Result<Self, Self::Error> {
        let event_type: EventType = raw.event_type.parse()?;
        let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
            .map_err(|e| format!("invalid timestamp {:?}: {}", raw.timestamp, e))?
            .with_timezone(&Utc);
        let platform = raw
            .platform
            .filter(|p| !p.trim().is_empty())
            .map(Platform::from);

        Ok(EventRecord {
            session_id: raw.session_id,
            platform,
            timestamp,
            metadata: EventMetadata::from_value(event_type, raw.metadata),
        })
    }
}

impl From<EventRecord> for RawEventRecord {
    fn from(record: EventRecord) -> Self {
        RawEventRecord {
            event_type: record.event_type().as_str().to_string(),
            platform: record.platform.map(String::from),
            timestamp: format_timestamp(record.timestamp),
            session_id: record.session_id,
            metadata: record.metadata.to_value(),
        }
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================
// Session flags and outcomes
// ============================================

/// Final heuristic classification of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Abandoned,
    EscalatedToHuman,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Abandoned => "abandoned",
            Outcome::EscalatedToHuman => "escalated_to_human",
            Outcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "abandoned" => Ok(Outcome::Abandoned),
            "escalated_to_human" => Ok(Outcome::EscalatedToHuman),
            "failed" => Ok(Outcome::Failed),
            _ => Err(format!("unknown outcome: {}", s)),
        }
    }
}

/// Operator-set annotations for one session.
///
/// Stored apart from events and freely editable. An explicit `outcome`
/// replaces the computed one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionFlags {
    #[serde(deserialize_with = "lenient_bool")]
    pub human_override_required: bool,
    #[serde(deserialize_with = "lenient_outcome")]
    pub outcome: Option<Outcome>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Session flags keyed by session id
pub type SessionFlagsMap = HashMap<String, SessionFlags>;

/// Legacy per-session count shadow kept under the `sessionMetrics` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachedCounts {
    #[serde(deserialize_with = "lenient_u64")]
    pub user_message_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub llm_message_count: u64,
}

// ============================================
// Derived summaries
// ============================================

/// Latency statistics over `llm_response` samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetrics {
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub max_response_time_ms: f64,
}

/// Copy behaviour within one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CopyStats {
    pub copied_output: bool,
    /// Sum of `charCount` over all copies
    pub copied_text_length: u64,
    /// At least one copy looked like code
    pub copied_code_block: bool,
    /// Whole seconds from the anchor (first prompt, else session start) to the first copy
    pub time_to_first_copy_sec: Option<i64>,
}

/// Pure function of a session's sorted events and its flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSummary {
    pub user_message_count: u64,
    pub llm_message_count: u64,
    pub copy_events_total: u64,
    pub feedback_good_count: u64,
    pub feedback_bad_count: u64,
    pub feedback_partial_count: u64,
    pub user_edit_count: u64,
    pub total_events: u64,
    pub approx_duration_ms: i64,
    /// `None` when no response carried a latency sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_metrics: Option<ResponseMetrics>,
    pub copy: CopyStats,
    #[serde(deserialize_with = "lenient_outcome")]
    pub outcome: Option<Outcome>,
    pub is_partial_history: bool,
    pub title: String,
}

/// All events sharing a session id, sorted ascending by timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub platform: Platform,
    pub events: Vec<EventRecord>,
    pub summary: SessionSummary,
}

impl Session {
    /// Timestamp of the earliest event
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(|e| e.timestamp)
    }

    /// Timestamp of the latest event; sessions end by convention, not by signal
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.events.last().map(|e| e.timestamp)
    }
}

// ============================================
// Lenient field decoding
// ============================================

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(lenient_opt_u64(d)?.unwrap_or(0))
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value.as_f64().filter(|f| f.is_finite()))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value.as_bool().unwrap_or(false))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_outcome<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Outcome>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value.as_str().and_then(|s| s.parse().ok()))
}
