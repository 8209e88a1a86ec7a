//! # WebTerm Protocol Library
//!
//! This crate defines the wire protocol between terminal clients and the
//! WebTerm daemon.
//!
//! ## Overview
//!
//! The protocol crate is the foundation of WebTerm's communication layer,
//! providing:
//!
//! - **Message Definitions**: JSON control frames (`input`, `resize`, `ping`)
//!   and the single server-to-client `output` frame
//! - **Inbound Classification**: control frame vs. ignored JSON vs. raw
//!   shell input fallback for non-JSON clients
//! - **Upgrade Validation**: strict checking of HTTP-to-WebSocket upgrade
//!   requests against the configured terminal path
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ClientMessage, InboundFrame, ServerMessage};
//!
//! // Classify an inbound WebSocket payload
//! match InboundFrame::decode(br#"{"type":"input","data":"ls\n"}"#) {
//!     InboundFrame::Control(ClientMessage::Input { data }) => {
//!         assert_eq!(data, "ls\n");
//!     }
//!     _ => unreachable!(),
//! }
//!
//! // Frame a chunk of shell output for the client
//! let frame = ServerMessage::output(b"hello\r\n").unwrap();
//! let json = frame.encode().unwrap();
//! assert!(json.starts_with(r#"{"type":"output""#));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Protocol message definitions and inbound classification
//! - [`upgrade`]: WebSocket upgrade request validation
//! - [`error`]: Error types

pub mod error;
pub mod messages;
pub mod upgrade;

pub use error::ProtocolError;
pub use messages::{ClientMessage, InboundFrame, ServerMessage};
pub use upgrade::{UpgradeRequest, WS_PATH_SUFFIX};
