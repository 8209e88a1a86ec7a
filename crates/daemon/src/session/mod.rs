//! PTY session management.
//!
//! This module contains the terminal session layer: the PTY process handle,
//! the session object, and the session manager with its idle-expiry sweeper.

pub mod manager;
pub mod pty;
#[allow(clippy::module_inception)]
pub mod session;

pub use manager::{ManagerStats, TerminalManager};
pub use pty::{PtyProcess, SessionError, SessionId};
pub use session::TerminalSession;
