//! Server configuration and demo seed data

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialRecord;
use crate::instances::InstanceRecord;

fn default_bridge_addr() -> String {
    "127.0.0.1:8022".to_string()
}

fn default_status_addr() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_max_sessions() -> usize {
    32
}

/// Server-side knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket bridge listen address
    #[serde(default = "default_bridge_addr")]
    pub bridge_addr: String,

    /// Status API listen address
    #[serde(default = "default_status_addr")]
    pub status_addr: String,

    /// Bound on transport connect plus protocol handshake, in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Maximum concurrent sessions across all clients
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bridge_addr: default_bridge_addr(),
            status_addr: default_status_addr(),
            handshake_timeout_secs: default_handshake_timeout(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Seed data for the in-memory collaborator stores. Production wires the
/// provider API client and the key-pair database instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub credentials: Vec<CredentialRecord>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

impl Seed {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
