//! Browser-side session handling
//!
//! The multiplexer owns the bridge connection and the table of logical
//! terminals; surfaces are thin I/O adapters. Reconnection after transport
//! loss preserves each session's logical identity.

mod multiplexer;
mod reconnect;
mod surface;

pub use multiplexer::{ClientSessionEntry, MuxError, SessionMultiplexer};
pub use reconnect::{
    AttemptError, ReconnectConfig, ReconnectError, ReconnectEvent, ReconnectState, Reconnector,
};
pub use surface::{BufferSurface, SurfaceStatus, TerminalSurface};
