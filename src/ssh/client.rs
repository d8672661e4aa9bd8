//! SSH connector implementation using russh

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use russh::ChannelMsg;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::error::SshError;
use super::shell::{ShellCommand, ShellConnector, ShellHandle, ShellLink};
use crate::credentials::ResolvedCredential;

/// Keepalive cadence on established connections. Liveness of idle-but-
/// healthy sessions is respected; only dead network paths trip this.
const KEEPALIVE_INTERVAL_SECS: u64 = 30;

/// Client handler for russh callbacks.
///
/// Target hosts are provider-assigned and short-lived; their keys are
/// recorded at debug level, not pinned.
pub struct ClientHandler {
    host: String,
}

impl ClientHandler {
    pub fn new(host: String) -> Self {
        Self { host }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "accepting host key for {}: {} {}",
            self.host,
            server_public_key.algorithm(),
            server_public_key.fingerprint(Default::default()),
        );
        Ok(true)
    }
}

/// Production connector backed by russh.
pub struct RusshConnector {
    handshake_timeout: Duration,
}

impl RusshConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl ShellConnector for RusshConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ShellLink>, SshError> {
        let addr = format!("{}:{}", host, port);

        info!("connecting to {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::Unreachable(format!("failed to resolve {addr}: {e}")))?
            .next()
            .ok_or_else(|| SshError::Unreachable(format!("no address found for {addr}")))?;

        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(KEEPALIVE_INTERVAL_SECS)),
            // Disconnect after 3 missed keepalives
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(host.to_string());

        let handle = tokio::time::timeout(
            self.handshake_timeout,
            client::connect(Arc::new(config), socket_addr, handler),
        )
        .await
        .map_err(|_| SshError::HandshakeTimeout(self.handshake_timeout.as_secs()))??;

        debug!("handshake completed with {}", addr);

        Ok(Box::new(RusshLink {
            handle,
            host: host.to_string(),
        }))
    }
}

struct RusshLink {
    handle: client::Handle<ClientHandler>,
    host: String,
}

#[async_trait]
impl ShellLink for RusshLink {
    async fn authenticate(
        &mut self,
        username: &str,
        credential: &ResolvedCredential,
    ) -> Result<(), SshError> {
        let key = russh::keys::decode_secret_key(&credential.private_key, None)
            .map_err(|e| SshError::KeyError(e.to_string()))?;

        let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

        let result = self
            .handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

        if !result.success() {
            return Err(SshError::AuthenticationFailed(format!(
                "server rejected key pair \"{}\" for {}@{}",
                credential.name, username, self.host
            )));
        }

        info!("authenticated as {}@{}", username, self.host);
        Ok(())
    }

    async fn open_shell(self: Box<Self>, cols: u16, rows: u16) -> Result<ShellHandle, SshError> {
        let handle = self.handle;

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ShellAllocation(format!("channel open failed: {e}")))?;

        channel
            .request_pty(false, "xterm-256color", cols as u32, rows as u32, 0, 0, &[])
            .await
            .map_err(|e| SshError::ShellAllocation(format!("PTY request failed: {e}")))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::ShellAllocation(format!("shell request failed: {e}")))?;

        debug!("interactive shell started on {}", self.host);

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ShellCommand>(256);
        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(256);

        let host = self.host;
        tokio::spawn(async move {
            // Sole owner of the handle; the connection lives as long as
            // this task does.
            let handle = handle;

            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(ShellCommand::Data(data)) => {
                                if let Err(e) = channel.data(&data[..]).await {
                                    error!("failed to write to shell on {}: {}", host, e);
                                    break;
                                }
                            }
                            Some(ShellCommand::Resize(cols, rows)) => {
                                if let Err(e) = channel
                                    .window_change(cols as u32, rows as u32, 0, 0)
                                    .await
                                {
                                    // Resize failure is not fatal to the stream
                                    warn!("window change failed on {}: {}", host, e);
                                } else {
                                    debug!("shell on {} resized to {}x{}", host, cols, rows);
                                }
                            }
                            Some(ShellCommand::Close) | None => {
                                let _ = channel.eof().await;
                                break;
                            }
                        }
                    }

                    msg = channel.wait() => {
                        match msg {
                            Some(ChannelMsg::Data { data }) => {
                                if output_tx.send(data.to_vec()).await.is_err() {
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExtendedData { data, ext }) => {
                                // stderr merges into the same ordered stream
                                if ext == 1 && output_tx.send(data.to_vec()).await.is_err() {
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExitStatus { exit_status }) => {
                                debug!("shell on {} exited with status {}", host, exit_status);
                            }
                            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                                info!("shell channel on {} closed", host);
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                }
            }

            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "session closed", "en")
                .await;
            debug!("shell pump for {} terminated", host);
        });

        Ok(ShellHandle { cmd_tx, output_rx })
    }

    async fn abort(self: Box<Self>) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "session cancelled", "en")
            .await;
    }
}
