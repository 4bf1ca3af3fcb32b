//! Events module for session notifications
//!
//! Structured events broadcast by the session to the presentation side:
//! transcript updates, finished segments, mute changes and failures.

use serde::{Deserialize, Serialize};

/// Events emitted by the session as requests materialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Capability confirmed it is listening
    ListeningStarted,

    /// Transcript changed (interim or final)
    Transcript {
        text: String,
        is_final: bool,
    },

    /// A listening segment ended
    Finished {
        /// Transcript at the time the segment ended, possibly empty
        text: String,
        /// Duration in milliseconds the session was listening
        duration_ms: u64,
    },

    /// Mute flag flipped
    MuteChanged {
        muted: bool,
    },

    /// A request or the capability failed; the session is idle again
    Error {
        message: String,
    },

    /// A start or stop was never confirmed
    TimedOut {
        phase: String,
    },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::ListeningStarted => write!(f, "LISTENING_STARTED"),
            SessionEvent::Transcript { text, is_final } => {
                let kind = if *is_final { "final" } else { "interim" };
                write!(f, "TRANSCRIPT ({}): {}", kind, text)
            }
            SessionEvent::Finished { text, duration_ms } => {
                write!(f, "FINISHED ({}ms): {}", duration_ms, text)
            }
            SessionEvent::MuteChanged { muted } => write!(f, "MUTE_CHANGED ({})", muted),
            SessionEvent::Error { message } => write!(f, "ERROR: {}", message),
            SessionEvent::TimedOut { phase } => write!(f, "TIMED_OUT ({})", phase),
        }
    }
}
