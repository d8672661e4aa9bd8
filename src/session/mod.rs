//! Server-side session management
//!
//! The registry is the single authority for session existence; the
//! lifecycle controller drives each session's state machine from connect
//! request to teardown and owns the conversion of every failure into a
//! classified, human-readable error event.

mod controller;
mod error;
mod registry;
mod state;
mod types;

pub use controller::{SessionController, SessionEvent};
pub use error::SessionError;
pub use registry::{RegistryError, SessionRegistry};
pub use state::{SessionState, SessionStateMachine, StateError};
pub use types::{SessionEntry, SessionInfo, SessionKey, SessionParams, SessionStats};
