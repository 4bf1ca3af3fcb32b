//! Raw capability signals and the normalized events the adapter emits

use serde::{Deserialize, Serialize};

use super::error::ErrorKind;

/// One candidate transcription of a result entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

/// A single entry of a result notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Committed entries are never revised within the same segment
    pub is_final: bool,
    /// Candidates, best first
    pub alternatives: Vec<Alternative>,
}

impl RecognitionResult {
    /// Interim entry with a single alternative
    pub fn interim(text: impl Into<String>) -> Self {
        Self::single(text, false)
    }

    /// Final entry with a single alternative
    pub fn final_text(text: impl Into<String>) -> Self {
        Self::single(text, true)
    }

    fn single(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            is_final,
            alternatives: vec![Alternative {
                transcript: text.into(),
                confidence: 1.0,
            }],
        }
    }

    /// Transcript of the best alternative, empty if there is none
    pub fn best_transcript(&self) -> &str {
        self.alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .unwrap_or("")
    }
}

/// Notifications as the platform capability delivers them
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformSignal {
    /// Capability confirmed it is listening
    Start,
    /// Result list; entries before `result_index` were already delivered
    Result {
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    /// Capability failed; an `End` normally follows
    Error(ErrorKind),
    /// Capability stopped
    End,
}

/// A platform signal tagged with the subscription it was delivered on
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub generation: u64,
    pub kind: PlatformSignal,
}

/// Why a listening segment ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Error(ErrorKind),
}

/// Uniform events produced by adapter normalization
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Started,
    Result { text: String, is_final: bool },
    Ended(EndReason),
}
