//! Core session state machine
//!
//! Requests (start, stop, mute) are forwarded to the recognition adapter
//! immediately, but the state they imply only materializes when the
//! capability confirms through a signal.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::SessionEvent;
use crate::recognition::{
    AdapterEvent, EndReason, RecognitionAdapter, RecognitionConfig, RecognitionError,
    RecognitionHandleFactory, Signal, SignalSink,
};

/// The three states of a session
///
/// Listening and muted are never both set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not listening, not muted
    #[default]
    Idle,
    /// Capability confirmed it is listening
    Listening,
    /// User suppressed listening
    Muted,
}

impl Status {
    pub fn is_listening(self) -> bool {
        self == Status::Listening
    }

    pub fn is_muted(self) -> bool {
        self == Status::Muted
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, "Idle"),
            Status::Listening => write!(f, "Listening"),
            Status::Muted => write!(f, "Muted"),
        }
    }
}

/// Reactive view of the session for the presentation side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub transcript: String,
    pub is_listening: bool,
    pub is_muted: bool,
}

/// Requests the presentation side can make
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    StartListening,
    StopListening,
    ToggleMute,
    SetLanguage(String),
}

/// Session tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for the capability to confirm a start or stop;
    /// `None` waits forever
    pub transition_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transition_timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Stopping,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Starting => "start",
            Phase::Stopping => "stop",
        }
    }
}

/// A request the capability has not confirmed yet
#[derive(Debug, Clone, Copy)]
struct Pending {
    phase: Phase,
    deadline: Option<Instant>,
}

/// A single voice session and the recognition handle it owns
pub struct Session {
    factory: Box<dyn RecognitionHandleFactory>,
    recognition: RecognitionConfig,
    config: SessionConfig,
    /// `None` when the capability is unavailable
    adapter: Option<RecognitionAdapter>,
    next_generation: u64,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    status: Status,
    transcript: String,
    pending: Option<Pending>,
    /// Set while a listening segment is open
    listening_since: Option<Instant>,
    event_tx: broadcast::Sender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl Session {
    /// Create a session and its recognition handle
    pub fn new(
        factory: Box<dyn RecognitionHandleFactory>,
        recognition: RecognitionConfig,
        config: SessionConfig,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        let mut session = Self {
            factory,
            recognition,
            config,
            adapter: None,
            next_generation: 0,
            signal_tx,
            signal_rx,
            status: Status::Idle,
            transcript: String::new(),
            pending: None,
            listening_since: None,
            event_tx,
            snapshot_tx,
        };
        session.adapter = session.create_adapter();
        session
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Whether a recognition handle could be created
    pub fn is_supported(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            transcript: self.transcript.clone(),
            is_listening: self.status.is_listening(),
            is_muted: self.status.is_muted(),
        }
    }

    /// Watch the session's reactive fields
    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run the session, processing commands and capability signals
    ///
    /// Returns once the command channel closes.
    pub async fn run(&mut self, mut command_rx: mpsc::Receiver<SessionCommand>) {
        info!(
            supported = self.is_supported(),
            language = %self.recognition.language,
            "session started in Idle state"
        );

        loop {
            let deadline = self.pending_deadline();

            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(signal) = self.signal_rx.recv() => {
                    self.handle_signal(signal);
                }
                _ = sleep_until(deadline) => {
                    self.expire_pending(Instant::now());
                }
            }
        }

        self.shutdown();
        info!("session stopped");
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        debug!(?command, "session command");
        match command {
            SessionCommand::StartListening => self.start_listening(),
            SessionCommand::StopListening => self.stop_listening(),
            SessionCommand::ToggleMute => self.toggle_mute(),
            SessionCommand::SetLanguage(language) => self.set_language(language),
        }
    }

    /// Ask the capability to start; takes effect on `Started`
    pub fn start_listening(&mut self) {
        if self.status != Status::Idle {
            debug!(status = %self.status, "start ignored");
            return;
        }
        if let Some(pending) = self.pending {
            debug!(phase = pending.phase.as_str(), "start ignored, transition pending");
            return;
        }
        let Some(adapter) = self.adapter.as_mut() else {
            debug!("start ignored, speech recognition unsupported");
            return;
        };

        match adapter.start() {
            Ok(()) => self.begin_pending(Phase::Starting),
            Err(e) => {
                warn!(%e, "error starting speech recognition");
                self.emit(SessionEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Ask the capability to stop and discard the transcript
    pub fn stop_listening(&mut self) {
        if self.status != Status::Listening {
            debug!(status = %self.status, "stop ignored");
            return;
        }
        if matches!(self.pending, Some(Pending { phase: Phase::Stopping, .. })) {
            debug!("stop ignored, already stopping");
            return;
        }

        if let Some(adapter) = self.adapter.as_mut() {
            adapter.stop();
        }
        self.transcript.clear();
        self.begin_pending(Phase::Stopping);
        self.publish();
    }

    /// Flip the mute flag, stopping recognition when muting
    pub fn toggle_mute(&mut self) {
        let old_status = self.status;

        let new_status = match old_status {
            Status::Listening => {
                if let Some(adapter) = self.adapter.as_mut() {
                    adapter.stop();
                }
                if !matches!(self.pending, Some(Pending { phase: Phase::Stopping, .. })) {
                    self.begin_pending(Phase::Stopping);
                }
                Status::Muted
            }
            Status::Idle => {
                if matches!(self.pending, Some(Pending { phase: Phase::Starting, .. })) {
                    // The start is cancelled; a late `Started` must not open a segment
                    if let Some(adapter) = self.adapter.as_mut() {
                        adapter.stop();
                    }
                    self.begin_pending(Phase::Stopping);
                }
                Status::Muted
            }
            Status::Muted => Status::Idle,
        };
        self.status = new_status;

        info!(from = %old_status, to = %self.status, "mute toggled");
        self.emit(SessionEvent::MuteChanged {
            muted: self.status.is_muted(),
        });
        self.publish();
    }

    /// Re-create the recognition handle with a new language tag
    pub fn set_language(&mut self, language: String) {
        if self.status.is_listening() || self.pending.is_some() {
            warn!(%language, "cannot change language while recognition is active");
            self.emit(SessionEvent::Error {
                message: RecognitionError::AlreadyActive.to_string(),
            });
            return;
        }
        if self.recognition.language == language {
            debug!(%language, "language unchanged");
            return;
        }

        info!(from = %self.recognition.language, to = %language, "changing recognition language");
        self.recognition.language = language;
        self.recreate_adapter();
    }

    /// Route a capability signal through the adapter
    pub fn handle_signal(&mut self, signal: Signal) {
        let Some(adapter) = self.adapter.as_mut() else {
            debug!("signal ignored, no recognition handle");
            return;
        };
        if signal.generation != adapter.generation() {
            debug!(
                generation = signal.generation,
                current = adapter.generation(),
                "dropping signal from stale subscription"
            );
            return;
        }

        for event in adapter.normalize(signal.kind) {
            self.handle_adapter_event(event);
        }
    }

    fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Started => self.on_started(),
            AdapterEvent::Result { text, is_final } => self.on_result(text, is_final),
            AdapterEvent::Ended(reason) => self.on_ended(reason),
        }
    }

    fn on_started(&mut self) {
        if !self.adapter_active() {
            debug!("ignoring start from inactive recognition");
            return;
        }
        let cancelled = matches!(self.pending, Some(Pending { phase: Phase::Stopping, .. }));
        if matches!(self.pending, Some(Pending { phase: Phase::Starting, .. })) {
            self.pending = None;
        }

        match self.status {
            Status::Idle if cancelled => {
                debug!("recognition started after the start was cancelled, stopping it");
                if let Some(adapter) = self.adapter.as_mut() {
                    adapter.stop();
                }
            }
            Status::Idle => {
                self.status = Status::Listening;
                self.listening_since = Some(Instant::now());
                info!(from = %Status::Idle, to = %Status::Listening, "state transition");
                self.emit(SessionEvent::ListeningStarted);
                self.publish();
            }
            Status::Muted => {
                debug!("recognition started while muted, stopping it");
                if let Some(adapter) = self.adapter.as_mut() {
                    adapter.stop();
                }
                if !cancelled {
                    self.begin_pending(Phase::Stopping);
                }
            }
            Status::Listening => debug!("duplicate start signal"),
        }
    }

    fn on_result(&mut self, text: String, is_final: bool) {
        if !self.adapter_active() {
            debug!("ignoring result from inactive recognition");
            return;
        }

        self.transcript = text.clone();
        self.emit(SessionEvent::Transcript { text, is_final });
        self.publish();
    }

    fn on_ended(&mut self, reason: EndReason) {
        self.pending = None;
        let old_status = self.status;
        if old_status == Status::Listening {
            self.status = Status::Idle;
        }

        if let EndReason::Error(kind) = reason {
            let error = RecognitionError::Runtime(kind);
            warn!(%error, status = %self.status, "speech recognition error");
            self.emit(SessionEvent::Error {
                message: error.to_string(),
            });
        }

        self.finish_segment();
        if old_status != self.status {
            info!(from = %old_status, to = %self.status, "state transition");
        }
        self.publish();
    }

    /// Give up on an unconfirmed start or stop once its deadline passes
    pub fn expire_pending(&mut self, now: Instant) {
        let Some(pending) = self.pending else {
            return;
        };
        if !pending.deadline.is_some_and(|deadline| now >= deadline) {
            return;
        }

        let error = RecognitionError::Timeout {
            phase: pending.phase.as_str(),
        };
        warn!(%error, status = %self.status, "recognition transition timed out");

        self.pending = None;
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.abort();
        }
        // A fresh subscription keeps late signals from the aborted handle
        // out of the next segment
        self.recreate_adapter();
        if self.status == Status::Listening {
            self.status = Status::Idle;
        }

        self.emit(SessionEvent::TimedOut {
            phase: pending.phase.as_str().to_string(),
        });
        self.finish_segment();
        self.publish();
    }

    /// Release the recognition handle
    pub fn shutdown(&mut self) {
        if self.adapter.take().is_some() {
            info!("recognition handle released");
        }
        self.pending = None;
        if self.status == Status::Listening {
            self.status = Status::Idle;
            self.finish_segment();
            self.publish();
        }
    }

    /// Close the open listening segment, if any
    fn finish_segment(&mut self) {
        let Some(since) = self.listening_since.take() else {
            return;
        };
        let duration_ms = duration_millis(since.elapsed());
        info!(duration_ms, chars = self.transcript.len(), "listening segment finished");
        self.emit(SessionEvent::Finished {
            text: self.transcript.clone(),
            duration_ms,
        });
    }

    fn begin_pending(&mut self, phase: Phase) {
        let deadline = self
            .config
            .transition_timeout
            .map(|timeout| Instant::now() + timeout);
        self.pending = Some(Pending { phase, deadline });
    }

    fn pending_deadline(&self) -> Option<Instant> {
        self.pending.and_then(|pending| pending.deadline)
    }

    fn adapter_active(&self) -> bool {
        self.adapter
            .as_ref()
            .is_some_and(|adapter| adapter.is_active())
    }

    fn create_adapter(&mut self) -> Option<RecognitionAdapter> {
        let generation = self.next_generation;
        self.next_generation += 1;
        let sink = SignalSink::new(generation, self.signal_tx.clone());

        match RecognitionAdapter::create(self.factory.as_ref(), &self.recognition, sink) {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                warn!(%e, "speech recognition unavailable, listening disabled");
                None
            }
        }
    }

    /// Tear down the current subscription before creating the next one
    fn recreate_adapter(&mut self) {
        self.adapter = None;
        self.adapter = self.create_adapter();
    }

    fn emit(&self, event: SessionEvent) {
        debug!(%event, "emitting session event");
        let _ = self.event_tx.send(event);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    #[cfg(test)]
    fn drain_signals(&mut self) {
        while let Ok(signal) = self.signal_rx.try_recv() {
            self.handle_signal(signal);
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
