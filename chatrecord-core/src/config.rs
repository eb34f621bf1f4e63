//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/chatrecord/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/chatrecord/` (~/.config/chatrecord/)
//! - Data: `$XDG_DATA_HOME/chatrecord/` (~/.local/share/chatrecord/)
//! - State/Logs: `$XDG_STATE_HOME/chatrecord/` (~/.local/state/chatrecord/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Tunable classification and capture heuristics
    #[serde(default)]
    pub heuristics: HeuristicsConfig,

    /// Persisted store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Service record metadata and export policy
    #[serde(default)]
    pub record: RecordConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Heuristic thresholds.
///
/// None of these are correctness guarantees; they tune best-effort
/// classification and are expected to be adjusted per deployment.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HeuristicsConfig {
    /// A session whose last event is older than this is considered stale
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: i64,

    /// Maximum total events for a stale session to count as abandoned
    #[serde(default = "default_abandon_max_events")]
    pub abandon_max_events: usize,

    /// Maximum duration (seconds) for a stale session to count as abandoned
    #[serde(default = "default_abandon_max_duration_secs")]
    pub abandon_max_duration_secs: i64,

    /// Minimum assistant messages (with no observed prompts) to flag partial history
    #[serde(default = "default_partial_history_min_llm_messages")]
    pub partial_history_min_llm_messages: usize,

    /// Identical prompts within this window are treated as one
    #[serde(default = "default_prompt_dedup_window_ms")]
    pub prompt_dedup_window_ms: i64,

    /// Assistant text must be unchanged this long before it is recorded
    #[serde(default = "default_assistant_settle_ms")]
    pub assistant_settle_ms: i64,

    /// Fraction of code-looking lines above which copied text is code-like
    #[serde(default = "default_code_likelihood_ratio")]
    pub code_likelihood_ratio: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_stale_after_minutes(),
            abandon_max_events: default_abandon_max_events(),
            abandon_max_duration_secs: default_abandon_max_duration_secs(),
            partial_history_min_llm_messages: default_partial_history_min_llm_messages(),
            prompt_dedup_window_ms: default_prompt_dedup_window_ms(),
            assistant_settle_ms: default_assistant_settle_ms(),
            code_likelihood_ratio: default_code_likelihood_ratio(),
        }
    }
}

fn default_stale_after_minutes() -> i64 {
    10
}

fn default_abandon_max_events() -> usize {
    2
}

fn default_abandon_max_duration_secs() -> i64 {
    30
}

fn default_partial_history_min_llm_messages() -> usize {
    5
}

fn default_prompt_dedup_window_ms() -> i64 {
    500
}

fn default_assistant_settle_ms() -> i64 {
    700
}

fn default_code_likelihood_ratio() -> f64 {
    0.3
}

/// Store location override
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StoreConfig {
    /// Path to the JSON store file (defaults to the XDG data dir)
    pub path: Option<PathBuf>,
}

/// Static descriptors written into every exported service record
#[derive(Debug, Deserialize, Clone)]
pub struct RecordConfig {
    /// Who is being observed
    #[serde(default = "default_subject")]
    pub subject: String,

    /// What did the observing
    #[serde(default = "default_observer")]
    pub observer: String,

    /// Label for the agent being recorded
    #[serde(default = "default_agent_label")]
    pub agent_label: String,

    /// Keep tab-scoped sessions with no activity in exports
    #[serde(default)]
    pub include_trivial: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            observer: default_observer(),
            agent_label: default_agent_label(),
            include_trivial: false,
        }
    }
}

fn default_subject() -> String {
    "chat-user".to_string()
}

fn default_observer() -> String {
    "chatrecord".to_string()
}

fn default_agent_label() -> String {
    "Chat web agent".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl HeuristicsConfig {
    /// Validate thresholds, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.stale_after_minutes < 0
            || self.abandon_max_duration_secs < 0
            || self.prompt_dedup_window_ms < 0
            || self.assistant_settle_ms < 0
        {
            return Err(Error::Config(
                "heuristics durations must not be negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.code_likelihood_ratio) {
            return Err(Error::Config(
                "heuristics.code_likelihood_ratio must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.heuristics.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/chatrecord/config.toml` (~/.config/chatrecord/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("chatrecord").join("config.toml")
    }

    /// Returns the data directory path (for the store file)
    ///
    /// `$XDG_DATA_HOME/chatrecord/` (~/.local/share/chatrecord/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("chatrecord")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/chatrecord/` (~/.local/state/chatrecord/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("chatrecord")
    }

    /// Returns the store file path, honouring `[store] path`
    ///
    /// `$XDG_DATA_HOME/chatrecord/store.json` (~/.local/share/chatrecord/store.json)
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("store.json"))
    }
}
