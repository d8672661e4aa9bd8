//! Remote shell protocol glue over russh
//!
//! Connection, public key authentication and PTY/shell channel allocation
//! for target instances. The wire protocol itself is russh's concern; this
//! module owns the staged connector seam and the per-shell pump task.

mod client;
mod error;
mod shell;

pub use client::{ClientHandler, RusshConnector};
pub use error::SshError;
pub use shell::{ShellCommand, ShellConnector, ShellHandle, ShellLink};

#[cfg(test)]
pub use shell::loopback::LoopbackConnector;
