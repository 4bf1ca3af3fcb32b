//! In-memory history of finished transcripts

use serde::Serialize;

/// Append-only list of finished, non-empty transcripts
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    entries: Vec<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished segment; returns false when there was nothing to keep
    pub fn record(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        self.entries.push(text.to_string());
        true
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
