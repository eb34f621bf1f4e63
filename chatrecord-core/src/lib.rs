//! # chatrecord-core
//!
//! Core library for chatrecord - a recorder for interactions with web chat
//! assistants.
//!
//! This library provides:
//! - Domain types for events, sessions and summaries
//! - Session identity resolution and per-page capture state
//! - The event log store behind an async key-value boundary
//! - Session aggregation, summary metrics and outcome classification
//! - The exportable service record
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Capture:** observations become immutable [`EventRecord`]s
//! - **Store:** records are appended to a shared event log
//! - **Derive:** sessions and summaries are recomputed from the log on every read
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatrecord_core::{
//!     aggregate_snapshot, Config, EventLog, JsonFileStore, ServiceRecordBuilder,
//! };
//!
//! # async fn run() -> chatrecord_core::Result<()> {
//! let config = Config::load()?;
//! let log = EventLog::new(JsonFileStore::new(config.store_path()));
//!
//! let snapshot = log.try_snapshot().await?;
//! let sessions = aggregate_snapshot(&snapshot, &config.heuristics, chrono::Utc::now());
//! let record = ServiceRecordBuilder::new(&config.record).build(sessions);
//! println!("{}", record.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use aggregate::{aggregate_sessions, aggregate_snapshot};
pub use analytics::summarize;
pub use capture::{CaptureContext, FeedbackKind};
pub use config::Config;
pub use error::{Error, Result};
pub use record::{ServiceRecord, ServiceRecordBuilder, SessionEntry};
pub use session_id::SessionIdResolver;
pub use store::{EventLog, JsonFileStore, KeyValueStore, MemoryStore, StoreSnapshot};
pub use types::*;

// Public modules
pub mod aggregate;
pub mod analytics;
pub mod capture;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod record;
pub mod session_id;
pub mod store;
pub mod types;
