//! Transport reconnection with bounded exponential backoff
//!
//! When the bridge connection drops, the multiplexer retries it here.
//! Backoff is bounded in both delay and attempt count; a non-retryable
//! attempt error (a credential the server already rejected) aborts the
//! loop instead of burning the remaining attempts.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,
    /// Delay before the second attempt (ms); the first fires immediately
    pub initial_delay_ms: u64,
    /// Delay ceiling (ms)
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,
    /// Whether automatic reconnection is enabled at all
    pub enabled: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReconnectState {
    Idle = 0,
    Waiting = 1,
    Attempting = 2,
    Reconnected = 3,
    Failed = 4,
    Cancelled = 5,
}

impl ReconnectState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Waiting,
            2 => Self::Attempting,
            3 => Self::Reconnected,
            4 => Self::Failed,
            5 => Self::Cancelled,
            _ => Self::Idle,
        }
    }
}

/// Progress events, for surfaces that show reconnection state.
#[derive(Debug, Clone)]
pub enum ReconnectEvent {
    Starting,
    Waiting { delay_ms: u64, attempt: u32 },
    Attempting { attempt: u32, max_attempts: u32 },
    Success { attempt: u32 },
    AttemptFailed { attempt: u32, error: String },
    Failed { total_attempts: u32 },
    Cancelled,
}

/// Outcome of one connection attempt.
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub message: String,
    /// Retrying with the same parameters can plausibly succeed
    pub retryable: bool,
}

impl AttemptError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconnectError {
    #[error("reconnection is disabled")]
    Disabled,

    #[error("reconnection was cancelled")]
    Cancelled,

    #[error("maximum reconnection attempts ({0}) reached")]
    MaxAttemptsReached(u32),

    #[error("reconnection aborted: {0}")]
    Aborted(String),
}

/// Drives one reconnection sequence.
pub struct Reconnector {
    config: ReconnectConfig,
    attempt_count: AtomicU32,
    state: AtomicU8,
    cancelled: AtomicBool,
    event_tx: Option<mpsc::Sender<ReconnectEvent>>,
}

impl Reconnector {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: AtomicU32::new(0),
            state: AtomicU8::new(ReconnectState::Idle as u8),
            cancelled: AtomicBool::new(false),
            event_tx: None,
        }
    }

    pub fn with_event_sender(mut self, tx: mpsc::Sender<ReconnectEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn state(&self) -> ReconnectState {
        ReconnectState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ReconnectState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Delay before `attempt` (1-based); the first attempt has none.
    fn delay_for(&self, attempt: u32) -> u64 {
        let base = self.config.initial_delay_ms as f64;
        let delay = base
            * self
                .config
                .backoff_multiplier
                .powi(attempt.saturating_sub(2) as i32);
        delay.min(self.config.max_delay_ms as f64) as u64
    }

    async fn emit(&self, event: ReconnectEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run attempts until one succeeds, the bound is hit, an attempt
    /// reports a non-retryable failure, or `cancel` is called.
    pub async fn attempt<F, Fut>(&self, mut connect_fn: F) -> Result<(), ReconnectError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), AttemptError>>,
    {
        if !self.config.enabled {
            return Err(ReconnectError::Disabled);
        }

        self.set_state(ReconnectState::Idle);
        self.attempt_count.store(0, Ordering::SeqCst);
        self.emit(ReconnectEvent::Starting).await;

        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            if self.is_cancelled() {
                self.set_state(ReconnectState::Cancelled);
                self.emit(ReconnectEvent::Cancelled).await;
                return Err(ReconnectError::Cancelled);
            }

            if attempt > 1 {
                let delay_ms = self.delay_for(attempt);
                self.set_state(ReconnectState::Waiting);
                self.emit(ReconnectEvent::Waiting { delay_ms, attempt }).await;
                info!(
                    "waiting {}ms before reconnect attempt {}/{}",
                    delay_ms, attempt, max_attempts
                );

                // Sleep in small increments so cancel takes effect promptly
                let delay = Duration::from_millis(delay_ms);
                let check_interval = Duration::from_millis(100);
                let mut elapsed = Duration::ZERO;
                while elapsed < delay {
                    if self.is_cancelled() {
                        self.set_state(ReconnectState::Cancelled);
                        return Err(ReconnectError::Cancelled);
                    }
                    sleep(check_interval.min(delay - elapsed)).await;
                    elapsed += check_interval;
                }
            }

            self.attempt_count.store(attempt, Ordering::SeqCst);
            self.set_state(ReconnectState::Attempting);
            self.emit(ReconnectEvent::Attempting {
                attempt,
                max_attempts,
            })
            .await;

            match connect_fn().await {
                Ok(()) => {
                    self.set_state(ReconnectState::Reconnected);
                    self.emit(ReconnectEvent::Success { attempt }).await;
                    info!("reconnected on attempt {}", attempt);
                    return Ok(());
                }
                Err(err) if !err.retryable => {
                    self.set_state(ReconnectState::Failed);
                    warn!("reconnect aborted, not retryable: {}", err.message);
                    return Err(ReconnectError::Aborted(err.message));
                }
                Err(err) => {
                    self.emit(ReconnectEvent::AttemptFailed {
                        attempt,
                        error: err.message.clone(),
                    })
                    .await;
                    warn!(
                        "reconnect attempt {}/{} failed: {}",
                        attempt, max_attempts, err.message
                    );
                }
            }
        }

        self.set_state(ReconnectState::Failed);
        self.emit(ReconnectEvent::Failed {
            total_attempts: max_attempts,
        })
        .await;
        error!("reconnection failed after {} attempts", max_attempts);
        Err(ReconnectError::MaxAttemptsReached(max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;

    fn fast_config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            backoff_multiplier: 1.5,
            enabled: true,
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let reconnector = Reconnector::new(ReconnectConfig::default());
        assert_eq!(reconnector.delay_for(2), 1000);
        assert_eq!(reconnector.delay_for(3), 1500);
        assert_eq!(reconnector.delay_for(4), 2250);

        let capped = Reconnector::new(ReconnectConfig {
            initial_delay_ms: 20000,
            max_delay_ms: 30000,
            ..ReconnectConfig::default()
        });
        assert_eq!(capped.delay_for(4), 30000);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let reconnector = Reconnector::new(fast_config(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();

        let result = reconnector
            .attempt(move || {
                let calls = calls_in.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AttemptError::transient("connection refused"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(reconnector.state(), ReconnectState::Reconnected);
    }

    #[tokio::test]
    async fn exhausting_the_bound_is_terminal() {
        let reconnector = Reconnector::new(fast_config(3));
        let result = reconnector
            .attempt(|| async { Err(AttemptError::transient("still down")) })
            .await;

        assert!(matches!(result, Err(ReconnectError::MaxAttemptsReached(3))));
        assert_eq!(reconnector.attempt_count(), 3);
        assert_eq!(reconnector.state(), ReconnectState::Failed);
    }

    #[tokio::test]
    async fn fatal_attempt_error_aborts_without_retrying() {
        let reconnector = Reconnector::new(fast_config(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();

        let result = reconnector
            .attempt(move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AttemptError::fatal("authentication failed"))
                }
            })
            .await;

        assert!(matches!(result, Err(ReconnectError::Aborted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_stops_the_loop() {
        let reconnector = Arc::new(Reconnector::new(ReconnectConfig {
            initial_delay_ms: 5000,
            ..fast_config(5)
        }));
        reconnector.cancel();

        let result = reconnector
            .attempt(|| async { Err(AttemptError::transient("down")) })
            .await;
        assert!(matches!(result, Err(ReconnectError::Cancelled)));
    }

    #[tokio::test]
    async fn disabled_config_never_attempts() {
        let reconnector = Reconnector::new(ReconnectConfig {
            enabled: false,
            ..fast_config(5)
        });
        let result = reconnector.attempt(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ReconnectError::Disabled)));
    }
}
