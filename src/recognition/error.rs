//! Recognition error taxonomy

use serde::{Deserialize, Serialize};

/// Error codes reported by the platform recognition capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// No speech was detected before the capability gave up
    NoSpeech,
    /// Recognition was aborted by the capability or the host
    Aborted,
    /// Audio could not be captured from the input device
    AudioCapture,
    /// The capability needed the network and it failed
    Network,
    /// Microphone access was denied
    NotAllowed,
    /// The recognition service is not allowed by the host
    ServiceNotAllowed,
    /// The configured language tag is not supported
    LanguageNotSupported,
    /// Any other platform-specific code
    Other(String),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NoSpeech => write!(f, "no-speech"),
            ErrorKind::Aborted => write!(f, "aborted"),
            ErrorKind::AudioCapture => write!(f, "audio-capture"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::NotAllowed => write!(f, "not-allowed"),
            ErrorKind::ServiceNotAllowed => write!(f, "service-not-allowed"),
            ErrorKind::LanguageNotSupported => write!(f, "language-not-supported"),
            ErrorKind::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Errors surfaced by the recognition adapter and the session around it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("speech recognition is not supported in this environment")]
    Unsupported,

    #[error("speech recognition is already active")]
    AlreadyActive,

    #[error("speech recognition error: {0}")]
    Runtime(ErrorKind),

    #[error("timed out waiting for recognition to {phase}")]
    Timeout { phase: &'static str },

    #[error("recognition signal channel closed")]
    ChannelClosed,
}
