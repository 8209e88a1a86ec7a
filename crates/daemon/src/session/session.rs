//! Terminal session state.
//!
//! A `TerminalSession` is one interactive shell instance: it owns exactly one
//! [`PtyProcess`], tracks activity timestamps and terminal geometry, and
//! carries the `active`/`connected` flags that coordinate teardown between
//! the bridge layer and the session manager.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::pty::{PtyProcess, SessionError, SessionId};

/// Returns the current Unix timestamp in milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One interactive shell session.
///
/// Mutable PTY state is guarded by a per-session lock so unrelated sessions
/// never serialize behind each other; flags, geometry, and timestamps are
/// atomics readable from any task.
pub struct TerminalSession {
    /// Unique session identifier, immutable once created.
    id: SessionId,

    /// Creation timestamp (Unix epoch milliseconds).
    created_at: u64,

    /// Last activity timestamp (Unix epoch milliseconds).
    last_activity: AtomicU64,

    /// Current terminal rows.
    rows: AtomicU16,

    /// Current terminal columns.
    cols: AtomicU16,

    /// Whether the session is usable. Cleared exactly once during removal.
    active: AtomicBool,

    /// Whether a live WebSocket is attached. `false` is the exit signal for
    /// any output pump bound to this session.
    connected: AtomicBool,

    /// The owned PTY, taken out during termination.
    pty: Mutex<Option<PtyProcess>>,
}

impl TerminalSession {
    /// Wraps a freshly spawned PTY in a new active, disconnected session.
    pub fn new(pty: PtyProcess, rows: u16, cols: u16) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_activity: AtomicU64::new(now),
            rows: AtomicU16::new(rows),
            cols: AtomicU16::new(cols),
            active: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            pty: Mutex::new(Some(pty)),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the creation timestamp in Unix milliseconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Returns the current terminal size as (rows, cols).
    pub fn size(&self) -> (u16, u16) {
        (
            self.rows.load(Ordering::Relaxed),
            self.cols.load(Ordering::Relaxed),
        )
    }

    /// Returns whether the session is usable.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns whether a WebSocket connection is attached.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sets the connected flag.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Clears the active flag.
    ///
    /// Returns true for the caller that actually performed the transition, so
    /// concurrent removals (sweep vs. explicit close) cannot tear the session
    /// down twice.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    /// Refreshes the last-activity timestamp.
    pub fn touch(&self) {
        self.last_activity.store(now_millis(), Ordering::Relaxed);
    }

    /// Returns the last-activity timestamp in Unix milliseconds.
    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Returns how long the session has been idle.
    pub fn idle_for(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.last_activity()))
    }

    /// Rewinds the last-activity timestamp, as if the session had been idle
    /// for the given duration.
    #[cfg(test)]
    pub(crate) fn backdate_activity(&self, idle: Duration) {
        let backdated = now_millis().saturating_sub(idle.as_millis() as u64);
        self.last_activity.store(backdated, Ordering::Relaxed);
    }

    /// Writes input to the shell. Success refreshes the activity timestamp.
    pub async fn write(&self, data: &[u8]) -> Result<usize, SessionError> {
        if !self.is_active() {
            return Err(SessionError::AlreadyClosed(self.id.clone()));
        }

        let mut guard = self.pty.lock().await;
        let pty = guard
            .as_mut()
            .ok_or_else(|| SessionError::AlreadyClosed(self.id.clone()))?;
        if !pty.is_running() {
            return Err(SessionError::AlreadyClosed(self.id.clone()));
        }

        let written = pty.write(data)?;
        drop(guard);

        self.touch();
        Ok(written)
    }

    /// Resizes the terminal.
    ///
    /// The session geometry is recorded before the PTY is touched, so the
    /// stored size reflects the request even when the underlying resize
    /// fails.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        self.rows.store(rows, Ordering::Relaxed);
        self.cols.store(cols, Ordering::Relaxed);

        let mut guard = self.pty.lock().await;
        let pty = guard
            .as_mut()
            .ok_or_else(|| SessionError::AlreadyClosed(self.id.clone()))?;
        pty.resize(rows, cols)?;
        drop(guard);

        self.touch();
        tracing::debug!(session_id = %self.id, rows = rows, cols = cols, "Resized terminal");
        Ok(())
    }

    /// Clones a reader for the shell's output stream.
    pub async fn clone_reader(&self) -> Result<Box<dyn Read + Send>, SessionError> {
        let guard = self.pty.lock().await;
        guard
            .as_ref()
            .ok_or_else(|| SessionError::AlreadyClosed(self.id.clone()))?
            .try_clone_reader()
    }

    /// Returns whether the shell process is still running.
    pub async fn is_shell_running(&self) -> bool {
        let mut guard = self.pty.lock().await;
        match guard.as_mut() {
            Some(pty) => pty.is_running(),
            None => false,
        }
    }

    /// Terminates the owned PTY, if any.
    ///
    /// The graceful-then-kill escalation happens off the async runtime.
    /// Idempotent: later calls find no PTY and return immediately.
    pub async fn terminate(&self) {
        let pty = self.pty.lock().await.take();
        if let Some(pty) = pty {
            let _ = tokio::task::spawn_blocking(move || pty.terminate()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_session() -> TerminalSession {
        let pty = PtyProcess::spawn("/bin/sh", 24, 80).unwrap();
        TerminalSession::new(pty, 24, 80)
    }

    #[test]
    fn test_session_id_is_canonical_uuid() {
        let session = spawn_session();
        assert_eq!(session.id().len(), 36);
        assert!(session.is_active());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_write_refreshes_activity() {
        let session = spawn_session();
        session.backdate_activity(Duration::from_secs(60));
        assert!(session.idle_for() >= Duration::from_secs(60));

        session.write(b"echo hello\n").await.unwrap();
        assert!(session.idle_for() < Duration::from_secs(1));

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_resize_updates_geometry() {
        let session = spawn_session();
        assert_eq!(session.size(), (24, 80));

        session.resize(40, 120).await.unwrap();
        assert_eq!(session.size(), (40, 120));

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_resize_records_geometry_when_pty_is_gone() {
        let session = spawn_session();
        session.terminate().await;

        let result = session.resize(40, 120).await;
        assert!(matches!(result, Err(SessionError::AlreadyClosed(_))));
        assert_eq!(session.size(), (40, 120));
    }

    #[tokio::test]
    async fn test_write_after_terminate_fails() {
        let session = spawn_session();
        session.terminate().await;

        let result = session.write(b"hello\n").await;
        assert!(matches!(result, Err(SessionError::AlreadyClosed(_))));
    }

    #[tokio::test]
    async fn test_deactivate_is_first_caller_wins() {
        let session = spawn_session();
        assert!(session.deactivate());
        assert!(!session.deactivate());

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let session = spawn_session();
        session.terminate().await;
        session.terminate().await;
        assert!(!session.is_shell_running().await);
    }
}
