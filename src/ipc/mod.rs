//! IPC module for daemon-UI communication

mod protocol;
mod server;

pub use protocol::{Notification, Request, Response, SessionStatus};
pub use server::{Server, SessionLink};
