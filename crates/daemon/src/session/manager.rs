//! Session manager for terminal sessions.
//!
//! The manager is the process-wide registry of [`TerminalSession`]s. It
//! enforces the concurrent session limit, evicts idle sessions through a
//! background sweeper, and owns session lifecycle (create/lookup/remove)
//! under concurrency-safe access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pty::{PtyProcess, SessionError, SessionId};
use super::session::TerminalSession;

/// Point-in-time counts for observability endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStats {
    /// Sessions currently active.
    pub active: usize,
    /// Configured maximum.
    pub max: usize,
}

/// Thread-safe registry of terminal sessions.
///
/// Structural changes go through the sharded session map; per-session state
/// is guarded by each session's own lock. The capacity counter doubles as a
/// reservation so concurrent creates can never overshoot the limit.
pub struct TerminalManager {
    /// Map of session ID to session.
    sessions: DashMap<SessionId, Arc<TerminalSession>>,

    /// Maximum number of concurrent sessions.
    max_sessions: usize,

    /// Idle duration after which a session is reclaimed. Zero disables expiry.
    idle_timeout: Duration,

    /// Number of live sessions plus in-flight creations.
    count: AtomicUsize,

    /// Handle of the background sweeper, joined during shutdown.
    sweeper: Mutex<Option<JoinHandle<()>>>,

    /// Cancellation token stopping the sweeper.
    shutdown_token: CancellationToken,
}

impl TerminalManager {
    /// Creates a new manager with the given capacity and idle timeout.
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            idle_timeout,
            count: AtomicUsize::new(0),
            sweeper: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Returns whether a new session may be created.
    pub fn has_capacity(&self) -> bool {
        self.count.load(Ordering::SeqCst) < self.max_sessions
    }

    /// Returns current session counts.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            active: self.count.load(Ordering::SeqCst),
            max: self.max_sessions,
        }
    }

    /// Returns a snapshot of all active session IDs.
    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Creates a new session running the given shell.
    ///
    /// A capacity slot is reserved up front and released again if the spawn
    /// fails, so a failed create never blocks a later one.
    pub async fn create_session(
        &self,
        shell_command: &str,
        rows: u16,
        cols: u16,
    ) -> Result<Arc<TerminalSession>, SessionError> {
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_sessions).then_some(n + 1)
            })
            .map_err(|active| SessionError::CapacityReached {
                active,
                max: self.max_sessions,
            })?;

        let shell = shell_command.to_owned();
        let spawned =
            tokio::task::spawn_blocking(move || PtyProcess::spawn(&shell, rows, cols)).await;

        let pty = match spawned {
            Ok(Ok(pty)) => pty,
            Ok(Err(e)) => {
                self.count.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
            Err(e) => {
                self.count.fetch_sub(1, Ordering::SeqCst);
                return Err(SessionError::SpawnFailed(e.to_string()));
            }
        };

        let session = Arc::new(TerminalSession::new(pty, rows, cols));
        self.sessions
            .insert(session.id().clone(), Arc::clone(&session));

        tracing::info!(
            session_id = %session.id(),
            rows = rows,
            cols = cols,
            "Created terminal session"
        );

        Ok(session)
    }

    /// Looks up a session by ID.
    ///
    /// A successful lookup refreshes the session's activity timestamp.
    pub fn get_session(&self, session_id: &str) -> Option<Arc<TerminalSession>> {
        let session = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))?;
        session.touch();
        Some(session)
    }

    /// Removes a session: terminates its shell and unregisters it.
    ///
    /// Idempotent under concurrency: the first caller wins the session's
    /// active flag and performs the teardown, any later caller observes an
    /// already-inactive session and returns false.
    pub async fn remove_session(&self, session: &TerminalSession) -> bool {
        if !session.deactivate() {
            return false;
        }

        session.set_connected(false);
        session.terminate().await;

        if self.sessions.remove(session.id()).is_some() {
            self.count.fetch_sub(1, Ordering::SeqCst);
        }

        tracing::info!(session_id = %session.id(), "Removed terminal session");
        true
    }

    /// Removes every session that has been idle past the timeout.
    ///
    /// Returns the number of sessions removed. A zero idle timeout disables
    /// expiry entirely.
    pub async fn sweep_expired(&self) -> usize {
        if self.idle_timeout.is_zero() {
            return 0;
        }

        let expired: Vec<Arc<TerminalSession>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= self.idle_timeout)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut removed = 0;
        for session in expired {
            tracing::info!(session_id = %session.id(), "Session expired after idle timeout");
            if self.remove_session(&session).await {
                removed += 1;
            }
        }
        removed
    }

    /// Removes every session. Used at shutdown.
    pub async fn terminate_all(&self) -> usize {
        let sessions: Vec<Arc<TerminalSession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut removed = 0;
        for session in sessions {
            if self.remove_session(&session).await {
                removed += 1;
            }
        }
        removed
    }

    /// Starts the background sweeper task.
    ///
    /// The task sweeps expired sessions every `interval` until the manager
    /// shuts down; its handle is retained and joined in [`Self::shutdown`].
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let manager = Arc::clone(self);
        let token = self.shutdown_token.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!(interval_secs = interval.as_secs(), "Session sweeper started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = manager.sweep_expired().await;
                        if removed > 0 {
                            tracing::info!(removed = removed, "Swept expired sessions");
                        }
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        });

        if let Some(previous) = self.sweeper.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Shuts the manager down: stops the sweeper and removes every session.
    ///
    /// Returns the number of sessions removed.
    pub async fn shutdown(&self) -> usize {
        self.shutdown_token.cancel();

        let handle = self.sweeper.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let removed = self.terminate_all().await;
        tracing::info!(removed = removed, "Session manager shut down");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHELL: &str = "/bin/sh";

    fn manager(max_sessions: usize, idle_timeout: Duration) -> Arc<TerminalManager> {
        Arc::new(TerminalManager::new(max_sessions, idle_timeout))
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let manager = manager(4, Duration::ZERO);

        let session = manager.create_session(SHELL, 24, 80).await.unwrap();
        assert!(session.is_active());
        assert!(session.is_shell_running().await);

        let found = manager.get_session(session.id()).unwrap();
        assert_eq!(found.id(), session.id());

        manager.terminate_all().await;
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let manager = manager(4, Duration::ZERO);
        assert!(manager.get_session("nonexistent").is_none());
    }

    #[tokio::test]
    async fn test_get_session_refreshes_activity() {
        let manager = manager(4, Duration::ZERO);
        let session = manager.create_session(SHELL, 24, 80).await.unwrap();

        session.backdate_activity(Duration::from_secs(60));
        assert!(session.idle_for() >= Duration::from_secs(60));

        manager.get_session(session.id()).unwrap();
        assert!(session.idle_for() < Duration::from_secs(1));

        manager.terminate_all().await;
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let manager = manager(2, Duration::ZERO);

        let first = manager.create_session(SHELL, 24, 80).await.unwrap();
        let second = manager.create_session(SHELL, 24, 80).await.unwrap();
        assert!(!manager.has_capacity());

        let third = manager.create_session(SHELL, 24, 80).await;
        assert!(matches!(
            third,
            Err(SessionError::CapacityReached { active: 2, max: 2 })
        ));
        assert_eq!(manager.stats().active, 2);

        // Removing one frees a slot again.
        assert!(manager.remove_session(&first).await);
        assert!(manager.has_capacity());
        let replacement = manager.create_session(SHELL, 24, 80).await.unwrap();

        manager.remove_session(&second).await;
        manager.remove_session(&replacement).await;
    }

    #[tokio::test]
    async fn test_failed_spawn_releases_capacity() {
        let manager = manager(1, Duration::ZERO);

        let result = manager
            .create_session("/nonexistent/definitely-not-a-shell", 24, 80)
            .await;
        assert!(matches!(result, Err(SessionError::SpawnFailed(_))));

        // The reserved slot was released; a valid create succeeds.
        let session = manager.create_session(SHELL, 24, 80).await.unwrap();
        manager.remove_session(&session).await;
    }

    #[tokio::test]
    async fn test_remove_session_is_idempotent() {
        let manager = manager(4, Duration::ZERO);
        let session = manager.create_session(SHELL, 24, 80).await.unwrap();

        assert!(manager.remove_session(&session).await);
        assert!(!manager.remove_session(&session).await);
        assert_eq!(manager.stats().active, 0);
    }

    #[tokio::test]
    async fn test_removed_session_is_gone() {
        let manager = manager(4, Duration::ZERO);
        let session = manager.create_session(SHELL, 24, 80).await.unwrap();
        let id = session.id().clone();

        assert!(manager.remove_session(&session).await);
        assert!(manager.get_session(&id).is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_sessions() {
        let manager = manager(4, Duration::from_millis(100));

        let idle = manager.create_session(SHELL, 24, 80).await.unwrap();
        let busy = manager.create_session(SHELL, 24, 80).await.unwrap();

        idle.backdate_activity(Duration::from_millis(200));

        let removed = manager.sweep_expired().await;
        assert_eq!(removed, 1);
        assert!(manager.get_session(idle.id()).is_none());
        assert!(manager.get_session(busy.id()).is_some());
        assert_eq!(manager.stats().active, 1);

        manager.terminate_all().await;
    }

    #[tokio::test]
    async fn test_zero_idle_timeout_never_expires() {
        let manager = manager(4, Duration::ZERO);

        let session = manager.create_session(SHELL, 24, 80).await.unwrap();
        session.backdate_activity(Duration::from_secs(3600));

        assert_eq!(manager.sweep_expired().await, 0);
        assert!(manager.get_session(session.id()).is_some());

        manager.terminate_all().await;
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let manager = manager(4, Duration::ZERO);

        let first = manager.create_session(SHELL, 24, 80).await.unwrap();
        let second = manager.create_session(SHELL, 24, 80).await.unwrap();

        let ids = manager.list_sessions();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(first.id()));
        assert!(ids.contains(second.id()));

        manager.terminate_all().await;
    }

    #[tokio::test]
    async fn test_terminate_all() {
        let manager = manager(4, Duration::ZERO);

        manager.create_session(SHELL, 24, 80).await.unwrap();
        manager.create_session(SHELL, 24, 80).await.unwrap();
        manager.create_session(SHELL, 24, 80).await.unwrap();

        assert_eq!(manager.terminate_all().await, 3);
        assert_eq!(manager.stats().active, 0);
        assert!(manager.list_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_task_expires_sessions() {
        let manager = manager(4, Duration::from_millis(100));
        manager.start_sweeper(Duration::from_millis(50));

        let session = manager.create_session(SHELL, 24, 80).await.unwrap();
        session.backdate_activity(Duration::from_millis(200));

        let mut swept = false;
        for _ in 0..50 {
            if manager.get_session(session.id()).is_none() {
                swept = true;
                break;
            }
            // Lookups refresh activity, so backdate again between polls.
            session.backdate_activity(Duration::from_millis(200));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(swept, "sweeper did not remove the idle session");

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweeper_and_sessions() {
        let manager = manager(4, Duration::from_secs(300));
        manager.start_sweeper(Duration::from_secs(30));

        manager.create_session(SHELL, 24, 80).await.unwrap();
        assert_eq!(manager.shutdown().await, 1);
        assert_eq!(manager.stats().active, 0);
    }
}
