//! Session identity resolution
//!
//! Maps a page context to a stable session id so that events from one
//! logical conversation merge across reloads while unrelated pages never
//! collide:
//!
//! | Platform | Conversation-scoped | Tab-scoped fallback |
//! |----------|---------------------|---------------------|
//! | ChatGPT | `chatgpt-c-<id>` from `/c/<id>` | `chatgpt-tab-<suffix>` |
//! | Moltbot WebChat | `moltbot-s-<value>` from `?session=` | `moltbot-tab-<suffix>` |
//! | Other | never | `<name>-tab-<suffix>` |
//!
//! The tab suffix is generated once per resolver, so one resolver must be
//! created per page load and reused for its lifetime.

use crate::types::Platform;
use url::Url;

const CHATGPT_CONVERSATION_PREFIX: &str = "chatgpt-c-";
const MOLTBOT_SESSION_PREFIX: &str = "moltbot-s-";
const TAB_MARKER: &str = "-tab-";

/// Resolves session ids for a single page-load context.
#[derive(Debug, Clone)]
pub struct SessionIdResolver {
    tab_suffix: String,
}

impl SessionIdResolver {
    /// Create a resolver with a fresh random tab suffix.
    pub fn new() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::with_tab_suffix(&suffix[..12])
    }

    /// Create a resolver with a fixed tab suffix.
    pub fn with_tab_suffix(suffix: &str) -> Self {
        Self {
            tab_suffix: suffix.to_string(),
        }
    }

    pub fn tab_suffix(&self) -> &str {
        &self.tab_suffix
    }

    /// Resolve the session id for `url` on `platform`.
    ///
    /// Never fails: a URL that does not parse resolves to the tab-scoped id.
    pub fn resolve(&self, platform: &Platform, url: &str) -> String {
        let parsed = match Url::parse(url) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(url, error = %e, "Unparseable page URL, using tab session");
                None
            }
        };

        let scoped = parsed.as_ref().and_then(|u| match platform {
            Platform::ChatGpt => {
                conversation_id(u).map(|id| format!("{CHATGPT_CONVERSATION_PREFIX}{id}"))
            }
            Platform::MoltbotWebchat => {
                session_param(u).map(|value| format!("{MOLTBOT_SESSION_PREFIX}{value}"))
            }
            Platform::Other(_) => None,
        });

        scoped.unwrap_or_else(|| self.tab_session_id(platform))
    }

    /// The tab-scoped id used when the page carries no conversation identity.
    pub fn tab_session_id(&self, platform: &Platform) -> String {
        format!("{}{}{}", platform.id_prefix(), TAB_MARKER, self.tab_suffix)
    }
}

impl Default for SessionIdResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// The `<id>` of a `/c/<id>` path segment pair
fn conversation_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "c" {
            return segments
                .next()
                .filter(|id| !id.is_empty() && id.chars().all(is_id_char))
                .map(str::to_string);
        }
    }
    None
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn session_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "session")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// True iff `session_id` was produced by the tab-scoped fallback, on any platform.
pub fn is_tab_scoped(session_id: &str) -> bool {
    if session_id.starts_with(CHATGPT_CONVERSATION_PREFIX)
        || session_id.starts_with(MOLTBOT_SESSION_PREFIX)
    {
        return false;
    }
    session_id
        .split_once(TAB_MARKER)
        .is_some_and(|(prefix, suffix)| !prefix.is_empty() && !suffix.is_empty())
}
