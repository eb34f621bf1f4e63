//! Per-page capture context
//!
//! A [`CaptureContext`] is created once per page load and fed typed
//! observations by whatever adapter watches the chat UI. It turns them into
//! [`EventRecord`]s, handling the bits of state that observation needs:
//!
//! - the current session id (re-resolved on every page visit)
//! - duplicate prompt suppression within the dedup window
//! - buffering streamed assistant text until it settles
//! - response latency and turn counters
//!
//! Time is always passed in, never read from the clock.

use crate::config::HeuristicsConfig;
use crate::session_id::SessionIdResolver;
use crate::types::{
    CopyMeta, EditMeta, EventMetadata, EventRecord, FeedbackMeta, OverrideMeta, PageVisitMeta,
    Platform, PromptMeta, ResponseMeta, SessionEndMeta, SESSION_END_FAILURE_LATENCY,
};
use chrono::{DateTime, TimeDelta, Utc};

/// Rating given through the chat UI's feedback controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Good,
    Bad,
    Partial,
}

#[derive(Debug, Clone)]
struct PendingResponse {
    text: String,
    changed_at: DateTime<Utc>,
}

/// Observation state for a single page load.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    platform: Platform,
    resolver: SessionIdResolver,
    heuristics: HeuristicsConfig,
    session_id: String,
    last_prompt: Option<(String, DateTime<Utc>)>,
    pending: Option<PendingResponse>,
    last_emitted_response: Option<String>,
    prompt_turns: u64,
    response_turns: u64,
}

impl CaptureContext {
    pub fn new(platform: Platform, heuristics: HeuristicsConfig) -> Self {
        Self::with_resolver(platform, heuristics, SessionIdResolver::new())
    }

    pub fn with_resolver(
        platform: Platform,
        heuristics: HeuristicsConfig,
        resolver: SessionIdResolver,
    ) -> Self {
        let session_id = resolver.tab_session_id(&platform);
        Self {
            platform,
            resolver,
            heuristics,
            session_id,
            last_prompt: None,
            pending: None,
            last_emitted_response: None,
            prompt_turns: 0,
            response_turns: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    fn record(&self, now: DateTime<Utc>, metadata: EventMetadata) -> EventRecord {
        EventRecord::new(self.session_id.clone(), self.platform.clone(), now, metadata)
    }

    /// The page navigated (or loaded). Re-resolves the session id.
    pub fn page_visit(
        &mut self,
        url: &str,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> EventRecord {
        let session_id = self.resolver.resolve(&self.platform, url);
        if session_id != self.session_id {
            tracing::debug!(from = %self.session_id, to = %session_id, "Session changed");
            self.session_id = session_id;
        }

        self.record(
            now,
            EventMetadata::PageVisit(PageVisitMeta {
                url: Some(url.to_string()),
                title: title
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            }),
        )
    }

    /// The user submitted a prompt.
    ///
    /// Returns `None` for blank text or a repeat of the previous prompt
    /// inside the dedup window.
    pub fn prompt(&mut self, text: &str, now: DateTime<Utc>) -> Option<EventRecord> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some((last_text, last_at)) = &self.last_prompt {
            // An unrepresentable window never expires.
            let within_window = TimeDelta::try_milliseconds(self.heuristics.prompt_dedup_window_ms)
                .map_or(true, |window| now.signed_duration_since(*last_at) < window);
            if last_text == text && within_window {
                tracing::trace!(session_id = %self.session_id, "Duplicate prompt suppressed");
                return None;
            }
        }

        self.last_prompt = Some((text.to_string(), now));
        self.prompt_turns += 1;

        Some(self.record(
            now,
            EventMetadata::UserPrompt(PromptMeta {
                char_count: text.chars().count() as u64,
                turn_index: Some(self.prompt_turns),
            }),
        ))
    }

    /// Latest text of the assistant message currently being streamed.
    pub fn response_observed(&mut self, text: &str, now: DateTime<Utc>) {
        let text = text.trim();
        if text.is_empty() || self.last_emitted_response.as_deref() == Some(text) {
            return;
        }

        match &mut self.pending {
            Some(pending) if pending.text == text => {}
            _ => {
                self.pending = Some(PendingResponse {
                    text: text.to_string(),
                    changed_at: now,
                });
            }
        }
    }

    /// Emit the buffered response once it has stopped changing.
    pub fn poll_settled(&mut self, now: DateTime<Utc>) -> Option<EventRecord> {
        // An unrepresentable settle delay never elapses.
        let settle = TimeDelta::try_milliseconds(self.heuristics.assistant_settle_ms)?;
        let settled = self
            .pending
            .as_ref()
            .is_some_and(|p| now.signed_duration_since(p.changed_at) >= settle);
        if !settled {
            return None;
        }
        let pending = self.pending.take()?;

        // Latency runs from the prompt to the last change of the response text.
        let latency_ms = self.last_prompt.as_ref().map(|(_, prompt_at)| {
            pending
                .changed_at
                .signed_duration_since(*prompt_at)
                .num_milliseconds()
                .max(0) as f64
        });
        self.response_turns += 1;

        let record = self.record(
            now,
            EventMetadata::LlmResponse(ResponseMeta {
                char_count: pending.text.chars().count() as u64,
                latency_ms,
                turn_index: Some(self.response_turns),
            }),
        );
        self.last_emitted_response = Some(pending.text);
        Some(record)
    }

    /// The user copied assistant output.
    pub fn copy(&self, text: &str, trigger: Option<&str>, now: DateTime<Utc>) -> EventRecord {
        let is_code_like = looks_like_code(text, self.heuristics.code_likelihood_ratio);
        self.record(
            now,
            EventMetadata::CopyOutput(CopyMeta {
                char_count: text.chars().count() as u64,
                is_code_like,
                language_hint: if is_code_like { language_hint(text) } else { None },
                trigger: trigger.map(str::to_string),
            }),
        )
    }

    pub fn feedback(
        &self,
        kind: FeedbackKind,
        message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> EventRecord {
        let meta = FeedbackMeta {
            message_id: message_id.map(str::to_string),
        };
        let metadata = match kind {
            FeedbackKind::Good => EventMetadata::FeedbackGood(meta),
            FeedbackKind::Bad => EventMetadata::FeedbackBad(meta),
            FeedbackKind::Partial => EventMetadata::FeedbackPartial(meta),
        };
        self.record(now, metadata)
    }

    /// The user edited a previously sent prompt.
    pub fn user_edit(&self, text: &str, now: DateTime<Utc>) -> EventRecord {
        self.record(
            now,
            EventMetadata::UserEdit(EditMeta {
                char_count: text.trim().chars().count() as u64,
            }),
        )
    }

    /// The user took over from the assistant.
    pub fn user_override(&self, reason: Option<&str>, now: DateTime<Utc>) -> EventRecord {
        self.record(
            now,
            EventMetadata::UserOverride(OverrideMeta {
                reason: reason.map(str::to_string),
            }),
        )
    }

    /// The conversation ended. Failed endings carry the failure sentinel.
    pub fn session_end(&mut self, failed: bool, now: DateTime<Utc>) -> EventRecord {
        self.pending = None;
        self.record(
            now,
            EventMetadata::SessionEnd(SessionEndMeta {
                latency_ms: failed.then_some(SESSION_END_FAILURE_LATENCY),
                reason: failed.then(|| "failed".to_string()),
            }),
        )
    }
}

const CODE_PREFIXES: &[&str] = &[
    "fn ", "pub ", "let ", "const ", "def ", "class ", "import ", "from ", "return ", "#include",
    "function ", "var ", "if (", "for (", "while (", "package ", "func ", "SELECT ", "$ ",
];

/// Whether copied text reads as source code.
///
/// Fenced blocks always count; otherwise the share of code-looking lines
/// must reach `ratio`.
pub fn looks_like_code(text: &str, ratio: f64) -> bool {
    if text.contains("```") {
        return true;
    }

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }

    let code_lines = lines.iter().filter(|l| is_code_line(l)).count();
    code_lines as f64 / lines.len() as f64 >= ratio
}

fn is_code_line(line: &str) -> bool {
    let trimmed = line.trim();
    line.starts_with("    ")
        || line.starts_with('\t')
        || trimmed.ends_with(';')
        || trimmed.ends_with('{')
        || trimmed.ends_with('}')
        || trimmed.contains("=>")
        || trimmed.contains("::")
        || CODE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Language of copied code: the fence tag if present, else a keyword guess.
pub fn language_hint(text: &str) -> Option<String> {
    if let Some(start) = text.find("```") {
        let tag: String = text[start + 3..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-'))
            .collect();
        if !tag.is_empty() {
            return Some(tag.to_ascii_lowercase());
        }
    }

    let has = |needle: &str| text.contains(needle);
    let guess = if has("fn ") && (has("let ") || has("->") || has("::")) {
        "rust"
    } else if has("def ") || (has("import ") && has(":\n")) {
        "python"
    } else if has("package main") || has("func ") {
        "go"
    } else if has("#include") {
        "c"
    } else if has("function ") || (has("const ") && has("=>")) {
        "javascript"
    } else if has("SELECT ") && has(" FROM ") {
        "sql"
    } else {
        return None;
    };
    Some(guess.to_string())
}
