//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;
use crate::session::{SessionCommand, SessionSnapshot};
use crate::view::{self, History};

use super::protocol::{Notification, Request, Response, SessionStatus};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Channels connecting the server to the running session
#[derive(Clone)]
pub struct SessionLink {
    pub commands: mpsc::Sender<SessionCommand>,
    pub state: watch::Receiver<SessionSnapshot>,
    pub events: broadcast::Sender<SessionEvent>,
    pub recognition_supported: bool,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    view: Arc<RwLock<ViewState>>,
    link: SessionLink,
    shutdown_tx: broadcast::Sender<()>,
}

/// Presentation state the server keeps on behalf of clients
struct ViewState {
    history: History,
    start_time: std::time::Instant,
}

/// Everything a client handler needs
#[derive(Clone)]
struct ClientContext {
    view: Arc<RwLock<ViewState>>,
    link: SessionLink,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, link: SessionLink) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let view = Arc::new(RwLock::new(ViewState {
            history: History::new(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            view,
            link,
            shutdown_tx,
        })
    }

    /// Fold a session event into the view state
    pub async fn record_event(&self, event: &SessionEvent) {
        if let SessionEvent::Finished { text, duration_ms } = event {
            let mut view = self.view.write().await;
            if view.history.record(text) {
                info!(
                    entries = view.history.len(),
                    duration_ms, "voice captured, your voice input has been processed"
                );
            }
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = ClientContext {
                        view: Arc::clone(&self.view),
                        link: self.link.clone(),
                    };
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, context: ClientContext) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Frames are read on their own task so a pushed notification never
        // interrupts a partially read request.
        let (request_tx, mut request_rx) = mpsc::channel(8);
        let reader_task = tokio::spawn(Self::read_requests(reader, request_tx));

        let mut events: Option<broadcast::Receiver<SessionEvent>> = None;

        let result = loop {
            tokio::select! {
                incoming = request_rx.recv() => {
                    let Some(incoming) = incoming else {
                        debug!("client disconnected");
                        break Ok(());
                    };

                    let response = match incoming {
                        Ok(request) => {
                            debug!(?request, "received request");
                            let response = Self::process_request(request, &context).await;
                            if matches!(response, Response::Subscribed) && events.is_none() {
                                events = Some(context.link.events.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                        Err(e) => {
                            warn!(%e, "failed to parse request");
                            Response::Error {
                                code: "invalid_request".to_string(),
                                message: e.to_string(),
                            }
                        }
                    };

                    if let Err(e) = send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => match event {
                    Ok(event) => {
                        let notification = Notification::SessionEvent { event };
                        if let Err(e) = send_message(&mut writer, &notification).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "client notification receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                },
            }
        };

        reader_task.abort();
        result
    }

    /// Read framed requests until the client disconnects
    async fn read_requests<R: AsyncRead + Unpin>(
        mut reader: R,
        request_tx: mpsc::Sender<Result<Request, serde_json::Error>>,
    ) {
        loop {
            match read_message::<_, Request>(&mut reader).await {
                Ok(Some(parsed)) => {
                    if request_tx.send(parsed).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(?e, "failed to read client frame, disconnecting");
                    return;
                }
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ClientContext) -> Response {
        let command = match request {
            Request::Ping => return Response::Pong,

            Request::GetStatus => {
                let session = context.link.state.borrow().clone();
                let prompt = view::prompt_text(&session).map(str::to_string);
                let view_state = context.view.read().await;
                return Response::Status(SessionStatus {
                    session,
                    prompt,
                    recognition_supported: context.link.recognition_supported,
                    history_len: view_state.history.len(),
                    uptime_secs: view_state.start_time.elapsed().as_secs(),
                    ..SessionStatus::default()
                });
            }

            Request::GetHistory => {
                let view_state = context.view.read().await;
                return Response::History {
                    entries: view_state.history.entries().to_vec(),
                };
            }

            Request::Subscribe => return Response::Subscribed,

            Request::StartListening => SessionCommand::StartListening,
            Request::StopListening => SessionCommand::StopListening,
            Request::ToggleMute => SessionCommand::ToggleMute,
            Request::SetLanguage { language } => SessionCommand::SetLanguage(language),
        };

        // Commands are fire-and-forget; their effect arrives as notifications
        match context.link.commands.send(command).await {
            Ok(()) => Response::Accepted,
            Err(_) => Response::Error {
                code: "session_unavailable".to_string(),
                message: "voice session is not running".to_string(),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> Result<SessionEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed JSON message; `Ok(None)` on clean disconnect
///
/// Framing failures are errors. A body that is not valid JSON for `T` is
/// returned as the inner `Err` so the caller can answer it.
async fn read_message<R, T>(reader: &mut R) -> Result<Option<Result<T, serde_json::Error>>>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        bail!("message too large: {} bytes", len);
    }

    // Read message body
    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("failed to read message body")?;

    Ok(Some(serde_json::from_slice(&msg_buf)))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    Ok(())
}

fn encode_frame<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let mut frame = (msg_bytes.len() as u32).to_le_bytes().to_vec();
    frame.extend_from_slice(&msg_bytes);
    Ok(frame)
}
