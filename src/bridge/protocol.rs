//! Bridge wire protocol
//!
//! JSON messages tagged with `type`, one logical channel per browser
//! client. Several sessions share a channel; every message names the
//! instance it belongs to. Terminal bytes travel base64-encoded so the
//! whole protocol stays text frames.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionEvent;

#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("unparseable message: {0}")]
    Malformed(String),

    #[error("invalid base64 payload: {0}")]
    BadPayload(String),
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// Messages the browser client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a session to an instance
    Connect {
        instance_id: String,
        key_pair_name: String,
        /// Explicit login user; the server derives one from the image OS
        /// family when absent
        #[serde(default)]
        username: Option<String>,
        #[serde(default = "default_cols")]
        cols: u16,
        #[serde(default = "default_rows")]
        rows: u16,
    },
    /// Keystrokes, base64-encoded
    Input { instance_id: String, data: String },
    /// New terminal dimensions
    Resize {
        instance_id: String,
        cols: u16,
        rows: u16,
    },
    /// Close the session for this instance
    Disconnect { instance_id: String },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn instance_id(&self) -> &str {
        match self {
            Self::Connect { instance_id, .. }
            | Self::Input { instance_id, .. }
            | Self::Resize { instance_id, .. }
            | Self::Disconnect { instance_id } => instance_id,
        }
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        instance_id: String,
        host: String,
        username: String,
    },
    /// Shell output, base64-encoded, stdout and stderr merged in order
    Data { instance_id: String, data: String },
    Error {
        instance_id: String,
        kind: String,
        message: String,
    },
    Disconnected { instance_id: String, reason: String },
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn instance_id(&self) -> &str {
        match self {
            Self::Connected { instance_id, .. }
            | Self::Data { instance_id, .. }
            | Self::Error { instance_id, .. }
            | Self::Disconnected { instance_id, .. } => instance_id,
        }
    }
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Connected {
                instance_id,
                host,
                username,
            } => Self::Connected {
                instance_id,
                host,
                username,
            },
            SessionEvent::Data { instance_id, bytes } => Self::Data {
                instance_id,
                data: encode_payload(&bytes),
            },
            SessionEvent::Error { instance_id, error } => Self::Error {
                instance_id,
                kind: error.kind().to_string(),
                message: error.to_string(),
            },
            SessionEvent::Disconnected {
                instance_id,
                reason,
            } => Self::Disconnected {
                instance_id,
                reason,
            },
        }
    }
}

pub fn encode_payload(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_payload(data: &str) -> Result<Vec<u8>, ProtocolError> {
    BASE64
        .decode(data)
        .map_err(|e| ProtocolError::BadPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_defaults_terminal_dimensions() {
        let msg = ClientMessage::from_json(
            r#"{"type":"connect","instance_id":"i-123","key_pair_name":"prod-key"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Connect {
                cols,
                rows,
                username,
                ..
            } => {
                assert_eq!((cols, rows), (80, 24));
                assert!(username.is_none());
            }
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[test]
    fn input_payload_round_trips_through_base64() {
        let encoded = encode_payload(b"ls -la\n");
        let msg = ClientMessage::Input {
            instance_id: "i-123".into(),
            data: encoded,
        };
        let parsed = ClientMessage::from_json(&msg.to_json()).unwrap();
        match parsed {
            ClientMessage::Input { data, .. } => {
                assert_eq!(decode_payload(&data).unwrap(), b"ls -la\n");
            }
            other => panic!("expected Input, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_and_payloads_are_rejected() {
        assert!(matches!(
            ClientMessage::from_json("{\"type\":\"launch\"}"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_payload("not!!base64"),
            Err(ProtocolError::BadPayload(_))
        ));
    }

    #[test]
    fn session_events_map_onto_wire_messages() {
        let event = SessionEvent::Data {
            instance_id: "i-9".into(),
            bytes: b"hi".to_vec(),
        };
        match ServerMessage::from(event) {
            ServerMessage::Data { instance_id, data } => {
                assert_eq!(instance_id, "i-9");
                assert_eq!(decode_payload(&data).unwrap(), b"hi");
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }
}
