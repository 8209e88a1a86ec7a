//! Network handlers.
//!
//! Contains the outer WebSocket server that carries terminal connections.

pub mod server;

pub use server::serve;
