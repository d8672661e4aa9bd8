//! Shell channel ownership and the connector seam
//!
//! A live remote shell is represented by a [`ShellHandle`]: a command
//! sender feeding the channel pump task and an output receiver carrying
//! the merged stdout/stderr byte stream. Exactly one session owns a
//! handle; the pump task holds the underlying protocol objects and tears
//! them down when the handle side closes or the remote end exits.
//!
//! [`ShellConnector`] is the seam between the session lifecycle and the
//! wire protocol. Production uses the russh-backed implementation in
//! `client.rs`; tests inject a loopback connector.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::SshError;
use crate::credentials::ResolvedCredential;

/// Commands accepted by a shell's pump task.
#[derive(Debug)]
pub enum ShellCommand {
    /// Keystrokes for the remote stdin
    Data(Vec<u8>),
    /// New pseudo-terminal dimensions (cols, rows)
    Resize(u16, u16),
    /// Close the channel and end the pump task
    Close,
}

/// Handle to one live remote shell.
///
/// Output ends (recv returns `None`) when the remote shell exits or the
/// connection drops; sending [`ShellCommand::Close`] ends it from this
/// side.
pub struct ShellHandle {
    pub cmd_tx: mpsc::Sender<ShellCommand>,
    pub output_rx: mpsc::Receiver<Vec<u8>>,
}

impl ShellHandle {
    pub fn split(self) -> (mpsc::Sender<ShellCommand>, mpsc::Receiver<Vec<u8>>) {
        (self.cmd_tx, self.output_rx)
    }
}

/// An established but not yet authenticated connection to a target host.
///
/// The staged shape mirrors the session lifecycle: `connect` covers the
/// transport handshake, `authenticate` the credential exchange, and
/// `open_shell` the pseudo-terminal allocation. `open_shell` consumes the
/// link; the pump task keeps the connection alive from then on.
#[async_trait]
pub trait ShellLink: Send {
    async fn authenticate(
        &mut self,
        username: &str,
        credential: &ResolvedCredential,
    ) -> Result<(), SshError>;

    async fn open_shell(self: Box<Self>, cols: u16, rows: u16) -> Result<ShellHandle, SshError>;

    /// Tear down a link that never reached `open_shell`.
    async fn abort(self: Box<Self>);
}

/// Opens transport connections to target hosts.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ShellLink>, SshError>;
}

#[cfg(test)]
pub mod loopback {
    //! In-process shell fakes for lifecycle and bridge tests.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Test connector producing echo shells without any network.
    #[derive(Clone, Default)]
    pub struct LoopbackConnector {
        /// Refuse the transport connection outright
        pub refuse: bool,
        /// Fail the authentication stage
        pub reject_auth: bool,
        /// Resize requests observed by opened shells
        pub resizes: Arc<Mutex<Vec<(u16, u16)>>>,
    }

    #[async_trait]
    impl ShellConnector for LoopbackConnector {
        async fn connect(&self, host: &str, _port: u16) -> Result<Box<dyn ShellLink>, SshError> {
            if self.refuse {
                return Err(SshError::Unreachable(format!("connection refused: {host}")));
            }
            Ok(Box::new(LoopbackLink {
                reject_auth: self.reject_auth,
                resizes: self.resizes.clone(),
            }))
        }
    }

    struct LoopbackLink {
        reject_auth: bool,
        resizes: Arc<Mutex<Vec<(u16, u16)>>>,
    }

    #[async_trait]
    impl ShellLink for LoopbackLink {
        async fn authenticate(
            &mut self,
            username: &str,
            _credential: &ResolvedCredential,
        ) -> Result<(), SshError> {
            if self.reject_auth {
                return Err(SshError::AuthenticationFailed(format!(
                    "server rejected public key for {username}"
                )));
            }
            Ok(())
        }

        async fn open_shell(
            self: Box<Self>,
            _cols: u16,
            _rows: u16,
        ) -> Result<ShellHandle, SshError> {
            let (cmd_tx, mut cmd_rx) = mpsc::channel::<ShellCommand>(64);
            let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(64);
            let resizes = self.resizes;

            tokio::spawn(async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        ShellCommand::Data(data) => {
                            if output_tx.send(data).await.is_err() {
                                break;
                            }
                        }
                        ShellCommand::Resize(cols, rows) => {
                            resizes.lock().push((cols, rows));
                        }
                        ShellCommand::Close => break,
                    }
                }
            });

            Ok(ShellHandle { cmd_tx, output_rx })
        }

        async fn abort(self: Box<Self>) {}
    }
}
