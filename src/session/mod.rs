//! Session module for the voice-interaction lifecycle
//!
//! Provides an explicit state machine with three states:
//! - Idle: not listening, ready to start
//! - Listening: the capability confirmed it is listening
//! - Muted: user suppressed listening; must be unmuted before starting

mod machine;

pub use machine::{Session, SessionCommand, SessionConfig, SessionSnapshot, Status};
