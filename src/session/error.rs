//! Session failure taxonomy
//!
//! Every failure a session can hit is recovered at the lifecycle
//! controller boundary and surfaced to the browser as one `error` event
//! carrying a machine-usable kind and a human-actionable message. Nothing
//! here ever propagates as a panic or crashes the server.

use thiserror::Error;

use crate::credentials::ResolveError;
use crate::ssh::SshError;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("{0}")]
    CredentialNotFound(String),

    #[error("{0}")]
    CredentialMissingPrivateKey(String),

    #[error("{0}")]
    InvalidCredentialFormat(String),

    #[error("cannot reach {host}: {reason}")]
    TransportUnreachable { host: String, reason: String },

    #[error("handshake with {host} timed out after {secs}s")]
    HandshakeTimeout { host: String, secs: u64 },

    #[error("authentication failed for {username}@{host}: {reason}")]
    AuthenticationFailed {
        host: String,
        username: String,
        reason: String,
    },

    #[error("could not allocate a shell on {host}: {reason}")]
    RemoteShellAllocationFailed { host: String, reason: String },

    #[error("instance {id} is {state}, not running")]
    InstanceNotRunning { id: String, state: String },

    #[error("instance {0} is not known to the console")]
    InstanceNotFound(String),

    #[error("instance {0} has no reachable IP address")]
    InstanceHasNoAddress(String),

    #[error("session limit reached ({current}/{max}); close a terminal before opening another")]
    SessionLimitReached { current: usize, max: usize },
}

impl SessionError {
    /// Machine-usable classification carried on the `error` event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialNotFound(_) => "credential_not_found",
            Self::CredentialMissingPrivateKey(_) => "credential_missing_private_key",
            Self::InvalidCredentialFormat(_) => "invalid_credential_format",
            Self::TransportUnreachable { .. } => "transport_unreachable",
            Self::HandshakeTimeout { .. } => "handshake_timeout",
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::RemoteShellAllocationFailed { .. } => "remote_shell_allocation_failed",
            Self::InstanceNotRunning { .. } => "instance_not_running",
            Self::InstanceNotFound(_) => "instance_not_found",
            Self::InstanceHasNoAddress(_) => "instance_has_no_address",
            Self::SessionLimitReached { .. } => "session_limit_reached",
        }
    }

    /// Whether the client multiplexer may retry the same parameters.
    /// Retrying a rejected credential is pointless; retrying a flaky
    /// network path is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportUnreachable { .. } | Self::HandshakeTimeout { .. }
        )
    }

    /// Map a protocol-layer error into the taxonomy, attaching the target
    /// context the lower layer does not carry.
    pub fn from_ssh(err: SshError, host: &str, username: &str) -> Self {
        match err {
            SshError::Unreachable(reason) => Self::TransportUnreachable {
                host: host.to_string(),
                reason,
            },
            SshError::HandshakeTimeout(secs) => Self::HandshakeTimeout {
                host: host.to_string(),
                secs,
            },
            SshError::AuthenticationFailed(reason) | SshError::KeyError(reason) => {
                Self::AuthenticationFailed {
                    host: host.to_string(),
                    username: username.to_string(),
                    reason,
                }
            }
            SshError::ShellAllocation(reason)
            | SshError::ChannelError(reason)
            | SshError::Protocol(reason) => Self::RemoteShellAllocationFailed {
                host: host.to_string(),
                reason,
            },
            SshError::Disconnected => Self::TransportUnreachable {
                host: host.to_string(),
                reason: "connection closed during setup".to_string(),
            },
        }
    }
}

impl From<ResolveError> for SessionError {
    fn from(err: ResolveError) -> Self {
        match &err {
            ResolveError::NoSuchCredential { .. } => Self::CredentialNotFound(err.to_string()),
            ResolveError::MissingPrivateKey { .. } => {
                Self::CredentialMissingPrivateKey(err.to_string())
            }
            ResolveError::InvalidFormat { .. } => Self::InvalidCredentialFormat(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_drives_retry_policy() {
        let unreachable = SessionError::TransportUnreachable {
            host: "203.0.113.7".into(),
            reason: "connection refused".into(),
        };
        assert!(unreachable.is_transient());

        let auth = SessionError::AuthenticationFailed {
            host: "203.0.113.7".into(),
            username: "ubuntu".into(),
            reason: "rejected".into(),
        };
        assert!(!auth.is_transient());
        assert_eq!(auth.kind(), "authentication_failed");
    }

    #[test]
    fn ssh_errors_map_with_target_context() {
        let err = SessionError::from_ssh(
            SshError::HandshakeTimeout(30),
            "203.0.113.7",
            "ubuntu",
        );
        assert_eq!(err.kind(), "handshake_timeout");
        assert!(err.to_string().contains("203.0.113.7"));
    }
}
