//! Remote shell protocol error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SshError {
    /// Connection refused, host or network unreachable, DNS failure
    #[error("target unreachable: {0}")]
    Unreachable(String),

    #[error("handshake timed out after {0}s")]
    HandshakeTimeout(u64),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("key error: {0}")]
    KeyError(String),

    #[error("shell allocation failed: {0}")]
    ShellAllocation(String),

    #[error("channel error: {0}")]
    ChannelError(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("disconnected")]
    Disconnected,
}

impl From<std::io::Error> for SshError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => Self::Unreachable(format!("connection refused: {err}")),
            ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => {
                Self::Unreachable(format!("host unreachable: {err}"))
            }
            ErrorKind::TimedOut => Self::Unreachable(format!("connection timed out: {err}")),
            _ => Self::Protocol(err.to_string()),
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        match err {
            russh::Error::IO(io) => Self::from(io),
            russh::Error::Disconnect => Self::Disconnected,
            other => Self::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_refused_classifies_as_unreachable() {
        let err = SshError::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(matches!(err, SshError::Unreachable(_)));
    }

    #[test]
    fn unrelated_io_stays_protocol() {
        let err = SshError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, SshError::Protocol(_)));
    }
}
