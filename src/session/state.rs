//! Session lifecycle state machine

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

/// Lifecycle states of one bridged shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transport-level connection to the target host in progress
    Connecting,
    /// Transport up, credential exchange in progress
    Authenticating,
    /// Authenticated, shell channel not yet allocated
    ShellReady,
    /// Shell allocated and wired to the transport bridge
    Streaming,
    /// Teardown in progress
    Closing,
    /// Terminal: closed by the operator or the remote end
    Closed,
    /// Terminal: failed with a classified error
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::ShellReady => "shell_ready",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid session state transition: {from} -> {to}")]
pub struct StateError {
    pub from: SessionState,
    pub to: SessionState,
}

/// Tracks one session's state, the instant it was entered, and the failure
/// reason once terminal.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
    error: Option<String>,
    entered_at: Instant,
}

impl SessionStateMachine {
    /// Sessions start life connecting; the registry entry is created in
    /// the same breath.
    pub fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            error: None,
            entered_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn time_in_state(&self) -> std::time::Duration {
        self.entered_at.elapsed()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn enter(&mut self, state: SessionState) {
        self.state = state;
        self.entered_at = Instant::now();
    }

    fn expect(&mut self, from: SessionState, to: SessionState) -> Result<(), StateError> {
        if self.state != from {
            return Err(StateError {
                from: self.state,
                to,
            });
        }
        self.enter(to);
        Ok(())
    }

    /// Connecting -> Authenticating (transport connection succeeded)
    pub fn transport_connected(&mut self) -> Result<(), StateError> {
        self.expect(SessionState::Connecting, SessionState::Authenticating)
    }

    /// Authenticating -> ShellReady (credential accepted)
    pub fn authenticated(&mut self) -> Result<(), StateError> {
        self.expect(SessionState::Authenticating, SessionState::ShellReady)
    }

    /// ShellReady -> Streaming (PTY/shell allocated and wired)
    pub fn shell_started(&mut self) -> Result<(), StateError> {
        self.expect(SessionState::ShellReady, SessionState::Streaming)
    }

    /// Any live state -> Closing. Already-closing is accepted so racing
    /// close paths stay idempotent.
    pub fn begin_close(&mut self) -> Result<(), StateError> {
        if self.state == SessionState::Closing {
            return Ok(());
        }
        if self.state.is_terminal() {
            return Err(StateError {
                from: self.state,
                to: SessionState::Closing,
            });
        }
        self.enter(SessionState::Closing);
        Ok(())
    }

    /// Closing -> Closed
    pub fn closed(&mut self) -> Result<(), StateError> {
        self.expect(SessionState::Closing, SessionState::Closed)
    }

    /// Any live state -> Failed, recording the classified reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError {
                from: self.state,
                to: SessionState::Failed,
            });
        }
        self.error = Some(reason.into());
        self.enter(SessionState::Failed);
        Ok(())
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_streaming() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(sm.state(), SessionState::Connecting);
        sm.transport_connected().unwrap();
        sm.authenticated().unwrap();
        sm.shell_started().unwrap();
        assert_eq!(sm.state(), SessionState::Streaming);
        sm.begin_close().unwrap();
        sm.closed().unwrap();
        assert!(sm.is_terminal());
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let mut sm = SessionStateMachine::new();
        assert!(sm.authenticated().is_err());
        assert!(sm.shell_started().is_err());
        assert_eq!(sm.state(), SessionState::Connecting);
    }

    #[test]
    fn fail_from_any_live_state_records_reason() {
        let mut sm = SessionStateMachine::new();
        sm.transport_connected().unwrap();
        sm.fail("authentication failed").unwrap();
        assert_eq!(sm.state(), SessionState::Failed);
        assert_eq!(sm.error(), Some("authentication failed"));

        // Terminal states reject further transitions
        assert!(sm.fail("again").is_err());
        assert!(sm.begin_close().is_err());
    }

    #[test]
    fn begin_close_is_idempotent_while_closing() {
        let mut sm = SessionStateMachine::new();
        sm.begin_close().unwrap();
        sm.begin_close().unwrap();
        sm.closed().unwrap();
        assert_eq!(sm.state(), SessionState::Closed);
    }
}
