//! voice-session-daemon: Background daemon for a voice-interaction UI
//!
//! This daemon owns a single voice session and provides:
//! - A session state machine (Idle, Listening, Muted) over an injected
//!   speech-recognition capability
//! - Live transcript and finished-segment notifications
//! - IPC server for UI clients to start, stop and mute listening
//!
//! Scope:
//! - Recognition is delegated to the capability; no audio capture, no
//!   speech-to-text, no transcript persistence beyond the in-memory history

mod config;
mod events;
mod ipc;
mod lifecycle;
mod recognition;
mod session;
mod view;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Backend, Config};
use crate::events::SessionEvent;
use crate::ipc::{Server, SessionLink};
use crate::lifecycle::ShutdownSignal;
use crate::recognition::{ConsoleRecognizerFactory, RecognitionHandleFactory, UnavailableFactory};
use crate::session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voice-session-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        ?config.backend,
        language = %config.recognition.language,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new()?;

    // Create channels for inter-component communication
    // IPC server -> Session
    let (command_tx, command_rx) = mpsc::channel(32);
    // Session -> IPC server and subscribed clients
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);

    // Create the session; this creates the recognition handle once
    let mut session = Session::new(
        recognition_factory(config.backend),
        config.recognition.clone(),
        config.session.clone(),
        event_tx.clone(),
    );
    if !session.is_supported() {
        warn!("continuing without speech recognition - listening is disabled");
    }

    let link = SessionLink {
        commands: command_tx,
        state: session.subscribe_state(),
        events: event_tx.clone(),
        recognition_supported: session.is_supported(),
    };
    let server = Server::new(&config.socket_path, link)?;

    // Subscribe to session events for view updates
    let mut view_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the session (processes commands and recognition signals)
        _ = session.run(command_rx) => {
            info!("session exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Fold session events into the server's view state
        _ = async {
            loop {
                match view_event_rx.recv().await {
                    Ok(event) => {
                        debug!(%event, "session event received");
                        server_for_events.record_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("session event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    session.shutdown();
    server.shutdown().await;

    info!("voice-session-daemon stopped");

    Ok(())
}

/// Pick the recognition capability for the configured backend
fn recognition_factory(backend: Backend) -> Box<dyn RecognitionHandleFactory> {
    match backend {
        Backend::Console => Box::new(ConsoleRecognizerFactory::new()),
        Backend::Unavailable => Box::new(UnavailableFactory),
    }
}
