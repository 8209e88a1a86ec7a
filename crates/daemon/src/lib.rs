//! # WebTerm Daemon Library
//!
//! This crate provides the daemon (server) functionality for WebTerm: the
//! interactive terminal subsystem of an embedded device-management server.
//!
//! ## Overview
//!
//! The daemon multiplexes PTY shell sessions onto WebSocket connections:
//!
//! - **PTY Session Management**: spawn and manage pseudo-terminal shell
//!   sessions with capacity limits and idle expiry
//! - **WebSocket Bridge**: per-connection adapters moving bytes between PTY
//!   masters and framed JSON messages
//! - **Outer WebSocket Server**: thin glue accepting upgrades and
//!   demultiplexing frames per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    Terminal Subsystem                     │
//! ├───────────────────────────────────────────────────────────┤
//! │                                                           │
//! │  ┌───────────────────┐      ┌─────────────────────────┐  │
//! │  │  Terminal Manager │◄─────│    Terminal Gateway     │  │
//! │  │  (sessions, sweep)│      │ (tokens, pumps, frames) │  │
//! │  └─────────┬─────────┘      └────────────┬────────────┘  │
//! │            │                             │               │
//! │  ┌─────────▼─────────┐      ┌────────────▼────────────┐  │
//! │  │    PTY Processes  │      │   WebSocket Server      │  │
//! │  └───────────────────┘      └─────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::config::Config;
//! use daemon::terminal::TerminalSubsystem;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let subsystem = TerminalSubsystem::init(&config.terminal)?;
//!     let listener = TcpListener::bind(&config.network.listen_addr).await?;
//!     let shutdown = CancellationToken::new();
//!
//!     daemon::network::serve(listener, subsystem.gateway(), shutdown.clone()).await?;
//!
//!     subsystem.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: PTY processes, sessions, and the session manager
//! - [`bridge`]: WebSocket bridge gateway and output pumps
//! - [`network`]: Outer WebSocket server
//! - [`terminal`]: Subsystem init/shutdown wiring

pub mod bridge;
pub mod config;
pub mod network;
pub mod session;
pub mod terminal;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export session types for convenience
pub use session::{ManagerStats, PtyProcess, SessionError, SessionId, TerminalManager, TerminalSession};

// Re-export bridge types for convenience
pub use bridge::{AcceptedConnection, BridgeConnection, BridgeError, ConnectionId, TerminalGateway};

// Re-export subsystem wiring for convenience
pub use terminal::TerminalSubsystem;
