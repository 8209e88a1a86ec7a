//! PTY process management.
//!
//! This module owns the lifecycle of one shell process attached to a
//! pseudo-terminal pair. The handle is exclusive: dropping it closes the
//! descriptors and makes a best-effort attempt to kill the child, so no exit
//! path can leak a shell process.

use std::io::{Read, Write};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;

/// Unique identifier for a terminal session.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session was not found.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session has already been closed.
    #[error("session already closed: {0}")]
    AlreadyClosed(SessionId),

    /// The concurrent session limit has been reached.
    #[error("session limit reached ({active}/{max})")]
    CapacityReached {
        /// Sessions currently active.
        active: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Failed to spawn the shell.
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// Failed to read from the PTY.
    #[error("failed to read from PTY: {0}")]
    ReadFailed(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How long to wait after spawning before checking that the shell survived.
const SPAWN_GRACE: Duration = Duration::from_millis(10);

/// Polling step while waiting for a signalled shell to exit.
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of polls before escalating to a hard kill (~5 seconds total).
const TERMINATE_POLL_ATTEMPTS: u32 = 50;

/// A shell process attached to a pseudo-terminal.
///
/// All methods are blocking; async callers run them under
/// `tokio::task::spawn_blocking`.
pub struct PtyProcess {
    /// The PTY master handle.
    master: Box<dyn MasterPty + Send>,

    /// Writer for the master side (shell stdin).
    writer: Box<dyn Write + Send>,

    /// The child shell process.
    child: Box<dyn Child + Send + Sync>,

    /// Process ID of the shell.
    pid: Option<u32>,

    /// Cached liveness flag; once false it is never re-polled.
    running: bool,
}

impl PtyProcess {
    /// Spawns a shell on a fresh PTY pair with the given geometry.
    ///
    /// The shell gets a terminal-type environment (`TERM`, `COLORTERM`) and
    /// the slave side as its controlling terminal. A shell that exits within
    /// the spawn grace period is treated as a spawn failure.
    pub fn spawn(shell_command: &str, rows: u16, cols: u16) -> Result<Self, SessionError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell_command);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        // The slave side belongs to the child now.
        drop(pair.slave);

        let pid = child.process_id();

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        // Give the shell a moment to start, then make sure it is still there.
        std::thread::sleep(SPAWN_GRACE);
        if let Ok(Some(status)) = child.try_wait() {
            return Err(SessionError::SpawnFailed(format!(
                "shell exited immediately with code {}",
                status.exit_code()
            )));
        }

        tracing::debug!(pid = ?pid, shell = %shell_command, "Spawned PTY shell");

        Ok(PtyProcess {
            master: pair.master,
            writer,
            child,
            pid,
            running: true,
        })
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Writes data to the PTY master (shell stdin).
    pub fn write(&mut self, data: &[u8]) -> Result<usize, SessionError> {
        if !self.running {
            return Err(SessionError::WriteFailed("shell is not running".to_string()));
        }

        self.writer
            .write_all(data)
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;

        Ok(data.len())
    }

    /// Clones a reader for the master side (shell output).
    ///
    /// Reads on the clone are blocking; they return EOF or an error once the
    /// shell exits and the PTY is torn down.
    pub fn try_clone_reader(&self) -> Result<Box<dyn Read + Send>, SessionError> {
        self.master
            .try_clone_reader()
            .map_err(|e| SessionError::ReadFailed(e.to_string()))
    }

    /// Resizes the PTY to the given dimensions.
    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<(), SessionError> {
        if !self.running {
            return Err(SessionError::ResizeFailed(
                "shell is not running".to_string(),
            ));
        }

        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::ResizeFailed(e.to_string()))
    }

    /// Returns whether the shell is still running.
    ///
    /// Polls the child without blocking; on detecting exit the result is
    /// cached and the child is never polled again.
    pub fn is_running(&mut self) -> bool {
        if !self.running {
            return false;
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(
                    pid = ?self.pid,
                    code = status.exit_code(),
                    "Shell process exited"
                );
                self.running = false;
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::debug!(pid = ?self.pid, error = %e, "Failed to poll shell process");
                self.running = false;
                false
            }
        }
    }

    /// Terminates the shell and releases the PTY.
    ///
    /// Asks the shell to exit first, waits a bounded grace period, then hard
    /// kills and reaps it. Consumes the handle; descriptors close on return.
    pub fn terminate(mut self) {
        if !self.is_running() {
            return;
        }

        self.signal_terminate();

        for _ in 0..TERMINATE_POLL_ATTEMPTS {
            if !self.is_running() {
                tracing::debug!(pid = ?self.pid, "Shell terminated gracefully");
                return;
            }
            std::thread::sleep(TERMINATE_POLL_INTERVAL);
        }

        if let Err(e) = self.child.kill() {
            tracing::warn!(pid = ?self.pid, error = %e, "Failed to kill shell process");
        }
        let _ = self.child.wait();
        self.running = false;

        tracing::debug!(pid = ?self.pid, "Shell killed after grace period");
    }

    /// Delivers SIGTERM to the shell process.
    #[cfg(unix)]
    fn signal_terminate(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!(pid = pid, error = %e, "Failed to deliver SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&self) {}
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.child.kill() {
                tracing::debug!(pid = ?self.pid, error = %e, "Failed to kill shell on drop");
            }
            self.running = false;
        }
    }
}
