//! Terminal WebSocket gateway.
//!
//! The gateway is the per-connection adapter between the outer WebSocket
//! server and the session layer. It validates upgrade requests, creates a
//! session per accepted connection, runs one output pump task per connection,
//! and decodes inbound frames into session operations.
//!
//! Connections are keyed by an opaque token issued at upgrade time; the outer
//! server passes the token back on every subsequent call, so no per-socket
//! state is recovered from ambient context.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use protocol::{ClientMessage, InboundFrame, ServerMessage, UpgradeRequest};

use crate::config::TerminalConfig;
use crate::session::{ManagerStats, SessionError, SessionId, TerminalManager, TerminalSession};

/// Opaque token identifying one WebSocket connection.
pub type ConnectionId = String;

/// Geometry used for newly accepted connections; clients adjust it with a
/// resize frame once their terminal is measured.
pub const DEFAULT_ROWS: u16 = 24;
/// See [`DEFAULT_ROWS`].
pub const DEFAULT_COLS: u16 = 80;

/// Bytes read from the PTY per pump iteration.
const PUMP_READ_BUFFER: usize = 4096;

/// Capacity of the outbound frame channel towards the WebSocket writer.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Grace period on close letting the pump observe the disconnect signal.
const CLOSE_DRAIN_GRACE: Duration = Duration::from_millis(50);

/// Errors surfaced to the outer WebSocket server.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No connection is registered under the given token.
    #[error("unknown connection token: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection is closed and no longer accepts messages.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Session-layer failure.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Per-connection bridge state.
///
/// The underlying WebSocket is not owned; the outer server holds it and
/// drains the outbound channel into it. The session is shared with the
/// manager.
pub struct BridgeConnection {
    /// Connection token issued at upgrade.
    token: ConnectionId,

    /// The attached terminal session.
    session: Arc<TerminalSession>,

    /// Serialized outbound frames for the WebSocket writer. Sent with
    /// `try_send`: a full or closed channel drops the frame.
    outbound: mpsc::Sender<String>,

    /// Whether this connection still accepts traffic.
    active: AtomicBool,

    /// Terminal access is currently unauthenticated.
    authenticated: AtomicBool,

    /// Output pump handle, joined when the connection closes.
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeConnection {
    /// Returns the connection token.
    pub fn token(&self) -> &ConnectionId {
        &self.token
    }

    /// Returns the attached session.
    pub fn session(&self) -> &Arc<TerminalSession> {
        &self.session
    }

    /// Returns whether the connection still accepts traffic.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns whether the connection has authenticated. Always false.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Frames a chunk of PTY output and hands it to the WebSocket writer.
    ///
    /// Failures never propagate: a chunk that cannot be encoded or delivered
    /// is dropped and the pump keeps running.
    fn forward_output(&self, chunk: &[u8]) {
        let frame = match ServerMessage::output(chunk).and_then(|m| m.encode()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    session_id = %self.session.id(),
                    error = %e,
                    "Dropping output chunk that cannot be framed"
                );
                return;
            }
        };

        match self.outbound.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    session_id = %self.session.id(),
                    "Client not keeping up, dropping output frame"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    session_id = %self.session.id(),
                    "Output channel closed, dropping frame"
                );
            }
        }
    }
}

/// A connection accepted by the gateway, handed to the outer server.
pub struct AcceptedConnection {
    /// Token for all subsequent `on_message`/`on_close` calls.
    pub token: ConnectionId,

    /// ID of the session backing this connection.
    pub session_id: SessionId,

    /// Receiver of serialized outbound frames; the outer server drains it
    /// into the WebSocket.
    pub outbound: mpsc::Receiver<String>,
}

/// Bridge between the outer WebSocket server and the session layer.
pub struct TerminalGateway {
    /// Session registry.
    manager: Arc<TerminalManager>,

    /// URL prefix of the terminal endpoint.
    web_path: String,

    /// Shell command for new sessions.
    shell_command: String,

    /// Live connections keyed by token.
    connections: DashMap<ConnectionId, Arc<BridgeConnection>>,
}

impl TerminalGateway {
    /// Creates a gateway in front of the given manager.
    pub fn new(manager: Arc<TerminalManager>, config: &TerminalConfig) -> Self {
        Self {
            manager,
            web_path: config.web_path.clone(),
            shell_command: config.shell_command.clone(),
            connections: DashMap::new(),
        }
    }

    /// Validates an HTTP request as a terminal WebSocket upgrade.
    pub fn validate_upgrade(&self, method: &str, path: &str, headers: &[(&str, &str)]) -> bool {
        UpgradeRequest {
            method,
            path,
            headers,
        }
        .validate(&self.web_path)
    }

    /// Accepts a validated upgrade: creates a session, starts its output
    /// pump, and registers the connection.
    ///
    /// Rejects when the session limit is reached. Any failure after the
    /// session was created unwinds by removing it again.
    pub async fn accept_upgrade(&self) -> Result<AcceptedConnection, BridgeError> {
        if !self.manager.has_capacity() {
            let stats = self.manager.stats();
            warn!(
                active = stats.active,
                max = stats.max,
                "Rejecting upgrade: session limit reached"
            );
            return Err(SessionError::CapacityReached {
                active: stats.active,
                max: stats.max,
            }
            .into());
        }

        let session = self
            .manager
            .create_session(&self.shell_command, DEFAULT_ROWS, DEFAULT_COLS)
            .await?;

        let reader = match session.clone_reader().await {
            Ok(reader) => reader,
            Err(e) => {
                self.manager.remove_session(&session).await;
                return Err(e.into());
            }
        };

        session.set_connected(true);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let connection = Arc::new(BridgeConnection {
            token: Uuid::new_v4().to_string(),
            session: Arc::clone(&session),
            outbound: outbound_tx,
            active: AtomicBool::new(true),
            authenticated: AtomicBool::new(false),
            pump: Mutex::new(None),
        });

        let pump = spawn_output_pump(Arc::clone(&connection), reader);
        *connection.pump.lock().unwrap() = Some(pump);

        self.connections
            .insert(connection.token.clone(), Arc::clone(&connection));

        info!(
            token = %connection.token,
            session_id = %session.id(),
            "Accepted terminal WebSocket connection"
        );

        Ok(AcceptedConnection {
            token: connection.token.clone(),
            session_id: session.id().clone(),
            outbound: outbound_rx,
        })
    }

    /// Handles one inbound WebSocket payload for the given connection.
    ///
    /// JSON control frames are dispatched by type; anything that is not a
    /// JSON frame is forwarded verbatim to the shell.
    pub async fn on_message(&self, token: &str, payload: &[u8]) -> Result<(), BridgeError> {
        let connection = self
            .connections
            .get(token)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BridgeError::UnknownConnection(token.to_string()))?;

        if !connection.is_active() {
            return Err(BridgeError::ConnectionClosed);
        }

        match InboundFrame::decode(payload) {
            InboundFrame::Control(ClientMessage::Input { data }) => {
                if !data.is_empty() {
                    connection.session.write(data.as_bytes()).await?;
                }
                Ok(())
            }
            InboundFrame::Control(ClientMessage::Resize { rows, cols }) => {
                if rows > 0 && cols > 0 {
                    let rows = u16::try_from(rows).unwrap_or(u16::MAX);
                    let cols = u16::try_from(cols).unwrap_or(u16::MAX);
                    if let Err(e) = connection.session.resize(rows, cols).await {
                        warn!(
                            session_id = %connection.session.id(),
                            rows = rows,
                            cols = cols,
                            error = %e,
                            "Failed to resize terminal"
                        );
                    }
                }
                Ok(())
            }
            InboundFrame::Control(ClientMessage::Ping) => {
                connection.session.touch();
                Ok(())
            }
            InboundFrame::Ignored => Ok(()),
            InboundFrame::Raw(bytes) => {
                if !bytes.is_empty() {
                    connection.session.write(bytes).await?;
                }
                Ok(())
            }
        }
    }

    /// Closes a connection: signals the pump, removes the session, and joins
    /// the pump task.
    ///
    /// Safe to call for an unknown or already-closed token.
    pub async fn on_close(&self, token: &str) {
        let Some((_, connection)) = self.connections.remove(token) else {
            return;
        };

        info!(
            token = %token,
            session_id = %connection.session.id(),
            "Closing terminal WebSocket connection"
        );

        // Signal first, tear down after: the pump checks these flags between
        // reads.
        connection.active.store(false, Ordering::SeqCst);
        connection.session.set_connected(false);
        tokio::time::sleep(CLOSE_DRAIN_GRACE).await;

        self.manager.remove_session(&connection.session).await;

        let pump = connection.pump.lock().unwrap().take();
        if let Some(pump) = pump {
            let _ = pump.await;
        }
    }

    /// Returns session counts for observability endpoints.
    pub fn stats(&self) -> ManagerStats {
        self.manager.stats()
    }

    /// Returns the number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Spawns the output pump: the task that moves shell output to the client.
///
/// The pump runs until the connection or session is torn down. Reads are
/// blocking and run on the blocking pool; every teardown path terminates the
/// PTY, which unblocks the read with EOF or an I/O error.
fn spawn_output_pump(
    connection: Arc<BridgeConnection>,
    reader: Box<dyn Read + Send>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let session_id = connection.session.id().clone();
        debug!(session_id = %session_id, "Output pump started");

        let reader = Arc::new(Mutex::new(reader));

        loop {
            if !connection.is_active()
                || !connection.session.is_active()
                || !connection.session.is_connected()
                || connection.session.id().is_empty()
            {
                break;
            }

            let reader = Arc::clone(&reader);
            let result = tokio::task::spawn_blocking(move || {
                let mut buffer = vec![0u8; PUMP_READ_BUFFER];
                let mut reader = reader.lock().unwrap();
                match reader.read(&mut buffer) {
                    Ok(0) => Ok(None),
                    Ok(n) => {
                        buffer.truncate(n);
                        Ok(Some(buffer))
                    }
                    Err(e) => Err(e),
                }
            })
            .await;

            match result {
                Ok(Ok(Some(chunk))) => connection.forward_output(&chunk),
                Ok(Ok(None)) => {
                    debug!(session_id = %session_id, "PTY EOF, shell exited");
                    break;
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => {
                    if connection.session.is_active() {
                        error!(session_id = %session_id, error = %e, "Error reading from PTY");
                    }
                    break;
                }
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "PTY read task failed");
                    break;
                }
            }
        }

        debug!(session_id = %session_id, "Output pump stopped");
    })
}
