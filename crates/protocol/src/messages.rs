//! Protocol message definitions for WebTerm.
//!
//! This module defines the JSON message types exchanged between a terminal
//! client and the daemon over an established WebSocket connection. Client
//! frames are dispatched on their `"type"` field; payloads that are not JSON
//! are forwarded verbatim to the shell as a compatibility fallback for raw
//! clients.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Messages sent from the terminal client to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Keystrokes to feed to the shell.
    Input {
        /// Raw bytes for the shell, carried as a UTF-8 string.
        data: String,
    },
    /// New terminal geometry. Values are validated by the handler; only a
    /// request with both dimensions positive triggers a resize.
    Resize {
        /// Requested terminal rows.
        rows: i64,
        /// Requested terminal columns.
        cols: i64,
    },
    /// Keepalive. Refreshes the session's activity timestamp and nothing else.
    Ping,
}

/// Messages sent from the daemon to the terminal client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// A chunk of shell output.
    Output {
        /// UTF-8 shell output.
        data: String,
    },
}

impl ServerMessage {
    /// Wraps a chunk of PTY output as an `output` message.
    ///
    /// The wire format carries output as a JSON string, so the chunk must be
    /// valid UTF-8. A chunk that splits a multi-byte sequence is rejected and
    /// the caller is expected to drop it.
    pub fn output(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let data = std::str::from_utf8(bytes)
            .map_err(|e| ProtocolError::NonUtf8Output(e.to_string()))?
            .to_owned();
        Ok(ServerMessage::Output { data })
    }

    /// Serializes the message to its JSON wire form.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

/// Classification of an inbound WebSocket payload.
#[derive(Debug, PartialEq, Eq)]
pub enum InboundFrame<'a> {
    /// A well-formed control message.
    Control(ClientMessage),
    /// Valid JSON that is not a recognized control message. Ignored.
    Ignored,
    /// Not a JSON control frame; the payload is raw shell input.
    Raw(&'a [u8]),
}

impl<'a> InboundFrame<'a> {
    /// Decodes an inbound payload.
    ///
    /// Only a top-level JSON object can carry a control frame. An object
    /// with an unknown or missing `"type"` is ignored rather than treated as
    /// input, and so are arrays. Everything else, including bare JSON
    /// scalars, is raw shell input.
    pub fn decode(payload: &'a [u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(value @ serde_json::Value::Object(_)) => {
                match serde_json::from_value::<ClientMessage>(value) {
                    Ok(message) => InboundFrame::Control(message),
                    Err(_) => InboundFrame::Ignored,
                }
            }
            Ok(serde_json::Value::Array(_)) => InboundFrame::Ignored,
            _ => InboundFrame::Raw(payload),
        }
    }
}
