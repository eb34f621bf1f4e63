//! Event log store (adapter boundary)
//!
//! The persisted state is a small key-value document with three keys:
//!
//! | Key | Contents |
//! |-----|----------|
//! | `events` | Growing list of [`EventRecord`]s |
//! | `sessionFlags` | Session id → [`SessionFlags`] |
//! | `sessionMetrics` | Session id → [`CachedCounts`] (advisory shadow of event counts) |
//!
//! ## Failure model
//!
//! Recording must never disrupt the observed page, so
//! [`EventLog::append_event`] swallows store failures: the event is dropped
//! and the failure is logged at `debug` level. There are no retries; the
//! next user action will produce a similar event.
//!
//! ## Concurrency
//!
//! Each append is a full read-modify-write of the `events` list with no
//! compare-and-swap. Two writers appending at the same moment can race and
//! one append can be lost. This is an accepted limitation of the shared
//! store, not something this layer coordinates. Readers must not trust
//! storage order; the aggregator re-sorts on every read.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{CachedCounts, EventRecord, EventType, SessionFlags, SessionFlagsMap};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub const EVENTS_KEY: &str = "events";
pub const SESSION_FLAGS_KEY: &str = "sessionFlags";
pub const SESSION_METRICS_KEY: &str = "sessionMetrics";

/// Asynchronous get/set key-value service backing the event log.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key; `Ok(None)` when it was never written.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Delete `key` if present.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Everything persisted, decoded in one pass.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub events: Vec<EventRecord>,
    pub flags: SessionFlagsMap,
    pub metrics: HashMap<String, CachedCounts>,
}

/// Typed view over a [`KeyValueStore`].
pub struct EventLog<S> {
    store: S,
}

impl<S: KeyValueStore> EventLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// All decodable events, in storage order.
    ///
    /// A failed read yields an empty list; undecodable entries are skipped.
    pub async fn get_all_events(&self) -> Vec<EventRecord> {
        match self.store.get(EVENTS_KEY).await {
            Ok(value) => decode_events(value),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read events, treating log as empty");
                Vec::new()
            }
        }
    }

    /// Append a record, dropping it silently if the store is unavailable.
    pub async fn append_event(&self, record: EventRecord) {
        let session_id = record.session_id.clone();
        let event_type = record.event_type();
        if let Err(e) = self.try_append_event(record).await {
            tracing::debug!(
                session_id = %session_id,
                event_type = %event_type,
                error = %e,
                "Event dropped"
            );
        }
    }

    /// Append a record, reporting store failures to the caller.
    ///
    /// Entries already in the list are carried over untouched, including
    /// ones this version cannot decode.
    pub async fn try_append_event(&self, record: EventRecord) -> Result<()> {
        let mut events = match self.store.get(EVENTS_KEY).await? {
            Some(Value::Array(events)) => events,
            Some(other) => {
                tracing::debug!(kind = value_kind(&other), "Replacing non-list events value");
                Vec::new()
            }
            None => Vec::new(),
        };

        let session_id = record.session_id.clone();
        let event_type = record.event_type();
        events.push(serde_json::to_value(&record)?);
        self.store.set(EVENTS_KEY, Value::Array(events)).await?;

        if matches!(event_type, EventType::UserPrompt | EventType::LlmResponse) {
            if let Err(e) = self.bump_cached_counts(&session_id, event_type).await {
                tracing::debug!(session_id = %session_id, error = %e, "Count shadow not updated");
            }
        }

        Ok(())
    }

    async fn bump_cached_counts(&self, session_id: &str, event_type: EventType) -> Result<()> {
        // A failed read must not overwrite the shadow with a single entry.
        let mut metrics: HashMap<String, CachedCounts> =
            decode_map(self.store.get(SESSION_METRICS_KEY).await?);
        let counts = metrics.entry(session_id.to_string()).or_default();
        match event_type {
            EventType::UserPrompt => counts.user_message_count += 1,
            EventType::LlmResponse => counts.llm_message_count += 1,
            _ => return Ok(()),
        }
        self.store
            .set(SESSION_METRICS_KEY, serde_json::to_value(&metrics)?)
            .await
    }

    /// Operator flags for every annotated session.
    pub async fn get_session_flags(&self) -> SessionFlagsMap {
        match self.store.get(SESSION_FLAGS_KEY).await {
            Ok(value) => decode_map(value),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read session flags");
                SessionFlagsMap::new()
            }
        }
    }

    /// Replace the flags for one session.
    pub async fn set_session_flags(&self, session_id: &str, flags: SessionFlags) -> Result<()> {
        let mut all = match self.store.get(SESSION_FLAGS_KEY).await? {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        all.insert(session_id.to_string(), serde_json::to_value(&flags)?);
        self.store.set(SESSION_FLAGS_KEY, Value::Object(all)).await?;

        tracing::info!(session_id, "Session flags updated");
        Ok(())
    }

    /// The advisory `sessionMetrics` shadow.
    pub async fn get_session_metrics(&self) -> HashMap<String, CachedCounts> {
        match self.store.get(SESSION_METRICS_KEY).await {
            Ok(value) => decode_map(value),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read session metrics");
                HashMap::new()
            }
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            events: self.get_all_events().await,
            flags: self.get_session_flags().await,
            metrics: self.get_session_metrics().await,
        }
    }

    /// Like [`snapshot`](Self::snapshot), but a failed read is an error.
    pub async fn try_snapshot(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            events: decode_events(self.store.get(EVENTS_KEY).await?),
            flags: decode_map(self.store.get(SESSION_FLAGS_KEY).await?),
            metrics: decode_map(self.store.get(SESSION_METRICS_KEY).await?),
        })
    }

    /// Full-log clear: the only way events are ever removed.
    pub async fn clear(&self) -> Result<()> {
        self.store.remove(EVENTS_KEY).await?;
        self.store.remove(SESSION_FLAGS_KEY).await?;
        self.store.remove(SESSION_METRICS_KEY).await?;
        tracing::info!("Event log cleared");
        Ok(())
    }
}

fn decode_events(value: Option<Value>) -> Vec<EventRecord> {
    let entries = match value {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            tracing::debug!(kind = value_kind(&other), "Stored events is not a list");
            return Vec::new();
        }
        None => return Vec::new(),
    };

    let total = entries.len();
    let events: Vec<EventRecord> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable event");
                None
            }
        })
        .collect();

    if events.len() < total {
        tracing::debug!(
            decoded = events.len(),
            skipped = total - events.len(),
            "Decoded stored events"
        );
    }
    events
}

/// Decode a `{ sessionId: T }` object, defaulting entries of the wrong shape
fn decode_map<T>(value: Option<Value>) -> HashMap<String, T>
where
    T: Default + for<'de> serde::Deserialize<'de>,
{
    match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(key, entry)| (key, serde_json::from_value(entry).unwrap_or_default()))
            .collect(),
        _ => HashMap::new(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
