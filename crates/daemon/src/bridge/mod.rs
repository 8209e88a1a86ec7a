//! WebSocket bridge layer.
//!
//! Connects the session layer to the outer WebSocket server: upgrade
//! validation, connection registry, inbound frame dispatch, and the
//! per-connection output pump.

pub mod gateway;

pub use gateway::{
    AcceptedConnection, BridgeConnection, BridgeError, ConnectionId, TerminalGateway,
    DEFAULT_COLS, DEFAULT_ROWS,
};
