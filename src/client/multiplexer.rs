//! Client session multiplexer
//!
//! Owns the single long-lived bridge connection and presents multiple
//! logical terminal sessions over it, keyed by instance id. Surfaces are
//! handed a multiplexer reference at construction; nothing here is
//! reachable through ambient global state.
//!
//! Minimizing a terminal toggles visibility only. The bridge connection
//! and the server-side session stay up; tearing them down on every
//! visibility change would kill long-running shells whenever an operator
//! switches screens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::reconnect::{AttemptError, ReconnectConfig, Reconnector};
use super::surface::{SurfaceStatus, TerminalSurface};
use crate::bridge::{decode_payload, encode_payload, ClientMessage, ServerMessage};

/// Outbound message channel capacity toward the writer task
const OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone, Error)]
pub enum MuxError {
    #[error("bridge connection failed: {0}")]
    Dial(String),

    /// Keystrokes and requests are rejected, not queued, while the
    /// transport is down
    #[error("bridge connection is down")]
    Disconnected,

    #[error("no terminal open for instance {0}")]
    UnknownSession(String),
}

/// Browser-side bookkeeping for one logical terminal.
///
/// Created on the first open request for an instance, destroyed only on
/// explicit close. Carries the original connect parameters so the session
/// can be re-established under the same logical identity after transport
/// loss.
#[derive(Debug, Clone)]
pub struct ClientSessionEntry {
    pub instance_id: String,
    pub instance_name: String,
    pub key_pair_name: String,
    pub host: String,
    pub minimized: bool,
    pub username: Option<String>,
    pub cols: u16,
    pub rows: u16,
    /// Last error was a rejected credential; re-issuing the same connect
    /// is pointless until the operator intervenes
    pub fatal_error: bool,
}

struct MuxInner {
    server_url: String,
    reconnect_config: ReconnectConfig,
    entries: DashMap<String, ClientSessionEntry>,
    surfaces: DashMap<String, Arc<dyn TerminalSurface>>,
    outbound: Mutex<Option<mpsc::Sender<ClientMessage>>>,
    connected: AtomicBool,
}

/// Handle to the multiplexer; cheap to clone and pass to every surface.
#[derive(Clone)]
pub struct SessionMultiplexer {
    inner: Arc<MuxInner>,
}

impl SessionMultiplexer {
    pub fn new(server_url: impl Into<String>, reconnect_config: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                server_url: server_url.into(),
                reconnect_config,
                entries: DashMap::new(),
                surfaces: DashMap::new(),
                outbound: Mutex::new(None),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Dial the bridge and start the reader and writer tasks.
    pub async fn connect(&self) -> Result<(), MuxError> {
        self.inner.clone().dial().await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn entry(&self, instance_id: &str) -> Option<ClientSessionEntry> {
        self.inner
            .entries
            .get(instance_id)
            .map(|entry| entry.clone())
    }

    pub fn entry_count(&self) -> usize {
        self.inner.entries.len()
    }

    /// Open a terminal for an instance. A repeat open for an instance that
    /// already has an entry un-minimizes it and issues no new connect
    /// request.
    pub async fn open(
        &self,
        instance_id: &str,
        instance_name: &str,
        key_pair_name: &str,
        host: &str,
        username: Option<String>,
        surface: Arc<dyn TerminalSurface>,
    ) -> Result<(), MuxError> {
        if let Some(mut entry) = self.inner.entries.get_mut(instance_id) {
            entry.minimized = false;
            debug!("terminal for {} restored by repeat open", instance_id);
            return Ok(());
        }

        let entry = ClientSessionEntry {
            instance_id: instance_id.to_string(),
            instance_name: instance_name.to_string(),
            key_pair_name: key_pair_name.to_string(),
            host: host.to_string(),
            minimized: false,
            username: username.clone(),
            cols: 80,
            rows: 24,
            fatal_error: false,
        };
        self.inner.entries.insert(instance_id.to_string(), entry);
        self.inner
            .surfaces
            .insert(instance_id.to_string(), surface);

        self.inner
            .send(ClientMessage::Connect {
                instance_id: instance_id.to_string(),
                key_pair_name: key_pair_name.to_string(),
                username,
                cols: 80,
                rows: 24,
            })
            .await
    }

    /// Hide the terminal. Nothing is torn down, client or server side.
    pub fn minimize(&self, instance_id: &str) -> Result<(), MuxError> {
        let mut entry = self
            .inner
            .entries
            .get_mut(instance_id)
            .ok_or_else(|| MuxError::UnknownSession(instance_id.to_string()))?;
        entry.minimized = true;
        Ok(())
    }

    /// Show the terminal again. Purely a visibility change.
    pub fn restore(&self, instance_id: &str) -> Result<(), MuxError> {
        let mut entry = self
            .inner
            .entries
            .get_mut(instance_id)
            .ok_or_else(|| MuxError::UnknownSession(instance_id.to_string()))?;
        entry.minimized = false;
        Ok(())
    }

    /// Destroy the entry and ask the server to close the session.
    pub async fn close(&self, instance_id: &str) {
        self.inner.entries.remove(instance_id);
        self.inner.surfaces.remove(instance_id);
        // Best effort; a downed transport already means the server will
        // clean the session up on its side
        let _ = self
            .inner
            .send(ClientMessage::Disconnect {
                instance_id: instance_id.to_string(),
            })
            .await;
    }

    /// Forward keystrokes. Rejected outright while disconnected.
    pub async fn input(&self, instance_id: &str, bytes: &[u8]) -> Result<(), MuxError> {
        if !self.is_connected() {
            return Err(MuxError::Disconnected);
        }
        if !self.inner.entries.contains_key(instance_id) {
            return Err(MuxError::UnknownSession(instance_id.to_string()));
        }
        self.inner
            .send(ClientMessage::Input {
                instance_id: instance_id.to_string(),
                data: encode_payload(bytes),
            })
            .await
    }

    /// Record new dimensions and forward them when connected.
    pub async fn resize(&self, instance_id: &str, cols: u16, rows: u16) -> Result<(), MuxError> {
        {
            let mut entry = self
                .inner
                .entries
                .get_mut(instance_id)
                .ok_or_else(|| MuxError::UnknownSession(instance_id.to_string()))?;
            entry.cols = cols;
            entry.rows = rows;
        }
        if !self.is_connected() {
            debug!("resize for {} while disconnected, not forwarded", instance_id);
            return Ok(());
        }
        self.inner
            .send(ClientMessage::Resize {
                instance_id: instance_id.to_string(),
                cols,
                rows,
            })
            .await
    }

    /// Explicit operator retry after the automatic bound was exhausted.
    pub async fn reconnect_now(&self) {
        self.inner.clone().run_reconnect().await;
    }

    /// Stop without triggering reconnection.
    pub fn shutdown(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        *self.inner.outbound.lock() = None;
    }
}

impl MuxInner {
    async fn send(&self, message: ClientMessage) -> Result<(), MuxError> {
        let tx = self
            .outbound
            .lock()
            .clone()
            .ok_or(MuxError::Disconnected)?;
        tx.send(message).await.map_err(|_| MuxError::Disconnected)
    }

    fn attach_transport(&self, tx: mpsc::Sender<ClientMessage>) {
        *self.outbound.lock() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
    }

    fn detach_transport(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            *self.outbound.lock() = None;
        }
        was_connected
    }

    async fn dial(self: Arc<Self>) -> Result<(), MuxError> {
        let (ws_stream, _) = connect_async(self.server_url.as_str())
            .await
            .map_err(|e| MuxError::Dial(e.to_string()))?;
        info!("bridge connection established to {}", self.server_url);

        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_CAPACITY);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if sink.send(Message::Text(message.to_json())).await.is_err() {
                    break;
                }
            }
            debug!("bridge writer stopped");
        });

        let inner = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerMessage::from_json(&text) {
                        Ok(message) => inner.handle_server_message(message),
                        Err(e) => warn!("bridge sent {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("bridge receive error: {}", e);
                        break;
                    }
                }
            }
            inner.transport_lost();
        });

        self.attach_transport(out_tx);
        Ok(())
    }

    fn handle_server_message(&self, message: ServerMessage) {
        let instance_id = message.instance_id().to_string();
        let surface = match self.surfaces.get(&instance_id) {
            Some(surface) => surface.clone(),
            None => {
                debug!("message for unknown instance {}, dropped", instance_id);
                return;
            }
        };

        match message {
            ServerMessage::Connected { host, .. } => {
                if let Some(mut entry) = self.entries.get_mut(&instance_id) {
                    entry.host = host;
                    entry.fatal_error = false;
                }
                surface.on_status(SurfaceStatus::Connected);
            }
            ServerMessage::Data { data, .. } => match decode_payload(&data) {
                Ok(bytes) => surface.on_data(&bytes),
                Err(e) => warn!("undecodable data for {}: {}", instance_id, e),
            },
            ServerMessage::Error { kind, message, .. } => {
                if matches!(
                    kind.as_str(),
                    "authentication_failed"
                        | "credential_not_found"
                        | "credential_missing_private_key"
                        | "invalid_credential_format"
                ) {
                    if let Some(mut entry) = self.entries.get_mut(&instance_id) {
                        entry.fatal_error = true;
                    }
                }
                surface.on_error(&kind, &message);
            }
            ServerMessage::Disconnected { reason, .. } => {
                debug!("session for {} disconnected: {}", instance_id, reason);
                surface.on_status(SurfaceStatus::Disconnected);
            }
        }
    }

    fn broadcast_status(&self, status: SurfaceStatus) {
        for surface in self.surfaces.iter() {
            surface.on_status(status);
        }
    }

    /// The reader task ended. A deliberate shutdown already flipped the
    /// flag and stays quiet; an unexpected loss starts the backoff loop.
    fn transport_lost(self: &Arc<Self>) {
        if !self.detach_transport() {
            return;
        }
        warn!("bridge connection lost");
        self.broadcast_status(SurfaceStatus::Reconnecting);

        let inner = self.clone();
        tokio::spawn(async move {
            inner.run_reconnect().await;
        });
    }

    async fn run_reconnect(self: Arc<Self>) {
        let reconnector = Reconnector::new(self.reconnect_config.clone());
        let dialer = self.clone();
        let result = reconnector
            .attempt(move || {
                let dialer = dialer.clone();
                async move {
                    dialer
                        .dial()
                        .await
                        .map_err(|e| AttemptError::transient(e.to_string()))
                }
            })
            .await;

        match result {
            Ok(()) => {
                self.resume_sessions().await;
                self.broadcast_status(SurfaceStatus::Connected);
            }
            Err(err) => {
                warn!("bridge reconnection gave up: {}", err);
                self.broadcast_status(SurfaceStatus::ConnectionLost);
            }
        }
    }

    /// Re-issue the original connect parameters for every entry so each
    /// session resumes under the same logical identity. Entries whose last
    /// failure was a rejected credential are skipped.
    async fn resume_sessions(&self) {
        let entries: Vec<ClientSessionEntry> = self
            .entries
            .iter()
            .filter(|entry| !entry.fatal_error)
            .map(|entry| entry.clone())
            .collect();

        for entry in entries {
            let message = ClientMessage::Connect {
                instance_id: entry.instance_id.clone(),
                key_pair_name: entry.key_pair_name.clone(),
                username: entry.username.clone(),
                cols: entry.cols,
                rows: entry.rows,
            };
            if self.send(message).await.is_err() {
                warn!("failed to resume session for {}", entry.instance_id);
            }
        }
    }
}
