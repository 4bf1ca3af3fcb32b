//! Presentation-side view state kept by the daemon for UI clients

mod history;

pub use history::History;

use crate::session::SessionSnapshot;

/// Placeholder a UI shows when there is no transcript to render
pub fn prompt_text(snapshot: &SessionSnapshot) -> Option<&'static str> {
    if !snapshot.transcript.is_empty() {
        None
    } else if snapshot.is_listening {
        Some("Listening...")
    } else {
        Some("Press the microphone to start speaking...")
    }
}
