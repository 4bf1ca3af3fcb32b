//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;
use crate::session::SessionSnapshot;

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current session status
    GetStatus,

    /// Ask the session to start listening
    StartListening,

    /// Ask the session to stop listening
    StopListening,

    /// Flip the mute flag
    ToggleMute,

    /// Switch the recognition language
    SetLanguage { language: String },

    /// Finished transcripts so far
    GetHistory,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to session event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current session status
    Status(SessionStatus),

    /// Command was queued; its effect arrives as notifications
    Accepted,

    /// Finished transcripts, oldest first
    History { entries: Vec<String> },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push message from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Session event occurred
    SessionEvent { event: SessionEvent },
}

/// Full session status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Daemon version
    pub version: String,

    /// Reactive session fields
    #[serde(flatten)]
    pub session: SessionSnapshot,

    /// Placeholder text for an empty transcript
    pub prompt: Option<String>,

    /// Whether speech recognition is available at all
    pub recognition_supported: bool,

    /// Number of finished transcripts recorded
    pub history_len: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            session: SessionSnapshot::default(),
            prompt: None,
            recognition_supported: false,
            history_len: 0,
            uptime_secs: 0,
        }
    }
}
