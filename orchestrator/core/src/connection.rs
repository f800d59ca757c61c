//! Connection Manager
//!
//! Owns the single live provider adapter and the lifecycle around it:
//! dialing, automatic reconnection with backoff, orderly teardown, and
//! provider switching. At most one adapter is connected at any moment; a
//! switch fully releases the old provider (including its audio lease) before
//! the new one dials.
//!
//! State transitions are broadcast as [`ConnectionEvent`]s so surfaces can
//! render connection status without polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::audio::{AudioDevices, AudioLease};
use crate::error::ConnectionError;
use crate::events::{ConnectionEvent, ConnectionEventKind, ProviderEvent};
use crate::provider::{ProviderAdapter, ProviderKind, SessionDirectives, UserInput};
use crate::tools::ToolResult;

/// Depth of the connection-event broadcast queue
const EVENT_QUEUE: usize = 64;

// ============================================================================
// Reconnect Policy
// ============================================================================

/// Backoff schedule for connection attempts
///
/// Attempt delays grow exponentially from `base_delay`, capped at
/// `max_delay`. After `max_attempts` consecutive failures the manager gives
/// up and reports [`ConnectionError::RetriesExhausted`]; recovery after that
/// requires an explicit new `connect` call.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    /// Total dial attempts per connect call (first try included)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Ceiling on the per-attempt delay
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before the given 1-based attempt
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(2).min(16);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of the managed connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No adapter held
    Disconnected,
    /// First dial in progress
    Connecting,
    /// Adapter connected and streaming
    Connected,
    /// Automatic re-dial in progress
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Terminal error state: retries exhausted, waiting for an explicit
    /// connect
    Error,
}

/// Point-in-time snapshot of the manager
#[derive(Clone, Debug)]
pub struct ConnectionStatus {
    /// Current lifecycle state
    pub state: ConnectionState,
    /// Family of the held adapter, if any
    pub provider: Option<ProviderKind>,
    /// Adapter name for display, if any
    pub provider_name: Option<String>,
}

// ============================================================================
// Manager
// ============================================================================

struct Held {
    adapter: Box<dyn ProviderAdapter>,
    /// Exclusive microphone/speaker claim, released with the connection
    _lease: Option<AudioLease>,
}

/// Owner of the single live provider connection
pub struct ConnectionManager {
    held: tokio::sync::Mutex<Option<Held>>,
    state: parking_lot::Mutex<ConnectionState>,
    provider: parking_lot::Mutex<Option<(ProviderKind, String)>>,
    events: broadcast::Sender<ConnectionEvent>,
    policy: ReconnectPolicy,
    devices: Arc<AudioDevices>,
}

impl ConnectionManager {
    /// Create a disconnected manager
    #[must_use]
    pub fn new(policy: ReconnectPolicy, devices: Arc<AudioDevices>) -> Self {
        let (events, _) = broadcast::channel(EVENT_QUEUE);
        Self {
            held: tokio::sync::Mutex::new(None),
            state: parking_lot::Mutex::new(ConnectionState::Disconnected),
            provider: parking_lot::Mutex::new(None),
            events,
            policy,
            devices,
        }
    }

    /// Subscribe to connection-state transitions
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Snapshot of state and held provider
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let provider = self.provider.lock().clone();
        ConnectionStatus {
            state: self.state(),
            provider: provider.as_ref().map(|(kind, _)| *kind),
            provider_name: provider.map(|(_, name)| name),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn emit(&self, kind: ConnectionEventKind, provider: ProviderKind, error: Option<String>) {
        // Send fails only when nobody subscribes, which is fine.
        self.events
            .send(ConnectionEvent::now(kind, provider, error))
            .ok();
    }

    /// Dial the adapter with the retry schedule, leaving it in `held` on
    /// success
    ///
    /// `reconnecting` selects which transition events the attempts emit.
    async fn dial(
        &self,
        mut adapter: Box<dyn ProviderAdapter>,
        directives: &SessionDirectives,
        reconnecting: bool,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError> {
        let kind = adapter.kind();
        let name = adapter.name().to_string();
        let mut last_error: Option<ConnectionError> = None;

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if reconnecting || attempt > 1 {
                self.set_state(ConnectionState::Reconnecting { attempt });
                self.emit(
                    ConnectionEventKind::Reconnecting { attempt },
                    kind,
                    last_error.as_ref().map(ToString::to_string),
                );
            } else {
                self.set_state(ConnectionState::Connecting);
                self.emit(ConnectionEventKind::Connecting, kind, None);
            }

            match adapter.connect(directives.clone()).await {
                Ok(rx) => {
                    let lease = match self.devices.acquire() {
                        Ok(lease) => Some(lease),
                        // Text-only operation still works without devices.
                        Err(e) => {
                            warn!(error = %e, "connected without audio devices");
                            None
                        }
                    };
                    *self.held.lock().await = Some(Held {
                        adapter,
                        _lease: lease,
                    });
                    *self.provider.lock() = Some((kind, name.clone()));
                    self.set_state(ConnectionState::Connected);
                    self.emit(ConnectionEventKind::Connected, kind, None);
                    info!(provider = %name, attempt, "provider connected");
                    return Ok(rx);
                }
                Err(e) => {
                    debug!(provider = %name, attempt, error = %e, "dial failed");
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        self.set_state(ConnectionState::Error);
        self.emit(ConnectionEventKind::Failed, kind, Some(last.clone()));
        warn!(provider = %name, attempts = self.policy.max_attempts, "retries exhausted");
        Err(ConnectionError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last_error: last,
        })
    }

    /// Connect the given adapter, retrying per the policy
    ///
    /// # Errors
    ///
    /// [`ConnectionError::AlreadyConnected`] when an adapter is already held;
    /// [`ConnectionError::RetriesExhausted`] when every attempt failed.
    pub async fn connect(
        &self,
        adapter: Box<dyn ProviderAdapter>,
        directives: &SessionDirectives,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError> {
        {
            let held = self.held.lock().await;
            if let Some(held) = held.as_ref() {
                return Err(ConnectionError::AlreadyConnected(
                    held.adapter.name().to_string(),
                ));
            }
        }
        self.dial(adapter, directives, false).await
    }

    /// Release the held adapter, if any
    ///
    /// Idempotent. The audio lease drops with the adapter, before this
    /// returns.
    pub async fn disconnect(&self) {
        let taken = self.held.lock().await.take();
        if let Some(mut held) = taken {
            let kind = held.adapter.kind();
            held.adapter.disconnect().await;
            self.set_state(ConnectionState::Disconnected);
            *self.provider.lock() = None;
            self.emit(ConnectionEventKind::Disconnected, kind, None);
            info!("provider disconnected");
        }
    }

    /// Re-dial the held adapter after an unexpected stream drop
    ///
    /// Counts every re-dial against the retry ceiling. On exhaustion the
    /// adapter is released and the manager lands in the error state.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`] when no adapter is held;
    /// [`ConnectionError::RetriesExhausted`] when every re-dial failed.
    pub async fn reconnect(
        &self,
        directives: &SessionDirectives,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError> {
        let taken = self.held.lock().await.take();
        let Some(mut held) = taken else {
            return Err(ConnectionError::NotConnected);
        };
        // The lease drops here so the new dial can re-acquire it.
        held.adapter.disconnect().await;
        self.dial(held.adapter, directives, true).await
    }

    /// Tear down the current provider and connect a different one
    ///
    /// The old adapter is fully disconnected before the new dial starts, so
    /// the two are never connected at once and the audio lease passes
    /// cleanly.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::RetriesExhausted`] when the new provider cannot be
    /// reached; the old provider stays released either way.
    pub async fn switch_provider(
        &self,
        adapter: Box<dyn ProviderAdapter>,
        directives: &SessionDirectives,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError> {
        self.disconnect().await;
        self.dial(adapter, directives, false).await
    }

    /// Forward one unit of user input to the held adapter
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`] when no adapter is held.
    pub async fn send_input(&self, input: UserInput) -> Result<(), ConnectionError> {
        let held = self.held.lock().await;
        match held.as_ref() {
            Some(held) => held.adapter.send_input(input).await,
            None => Err(ConnectionError::NotConnected),
        }
    }

    /// Forward a tool result to the held adapter
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`] when no adapter is held.
    pub async fn send_tool_result(&self, result: &ToolResult) -> Result<(), ConnectionError> {
        let held = self.held.lock().await;
        match held.as_ref() {
            Some(held) => held.adapter.send_tool_result(result).await,
            None => Err(ConnectionError::NotConnected),
        }
    }

    /// Ask the held adapter to abort its in-flight response
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`] when no adapter is held.
    pub async fn interrupt(&self) -> Result<(), ConnectionError> {
        let held = self.held.lock().await;
        match held.as_ref() {
            Some(held) => held.adapter.interrupt().await,
            None => Err(ConnectionError::NotConnected),
        }
    }

    /// Whether an adapter is held and reports itself connected
    pub async fn is_connected(&self) -> bool {
        self.held
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| h.adapter.is_connected())
    }
}

#[async_trait::async_trait]
impl crate::tools::ResultSink for ConnectionManager {
    async fn deliver(&self, result: &ToolResult) {
        if let Err(e) = self.send_tool_result(result).await {
            warn!(call_id = %result.id, error = %e, "could not deliver tool result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockAdapter;

    fn manager() -> ConnectionManager {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            ..ReconnectPolicy::default()
        };
        ConnectionManager::new(policy, Arc::new(AudioDevices::new()))
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before(3), Duration::from_secs(1));
        assert_eq!(policy.delay_before(12), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let manager = manager();
        let (adapter, _controller) = MockAdapter::new();

        manager
            .connect(Box::new(adapter), &SessionDirectives::default())
            .await
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.is_connected().await);

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_second_connect_rejected() {
        let manager = manager();
        let (first, _c1) = MockAdapter::new();
        let (second, _c2) = MockAdapter::new();

        manager
            .connect(Box::new(first), &SessionDirectives::default())
            .await
            .unwrap();
        let err = manager
            .connect(Box::new(second), &SessionDirectives::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::AlreadyConnected(_)));
    }

    #[tokio::test]
    async fn test_retries_exhausted_after_ceiling() {
        let manager = manager();
        let (adapter, controller) = MockAdapter::new();
        controller.fail_next_connects(10);

        let err = manager
            .connect(Box::new(adapter), &SessionDirectives::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(controller.connect_count(), 3);
        assert_eq!(manager.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_ceiling() {
        let manager = manager();
        let (adapter, controller) = MockAdapter::new();
        controller.fail_next_connects(2);

        manager
            .connect(Box::new(adapter), &SessionDirectives::default())
            .await
            .unwrap();
        assert_eq!(controller.connect_count(), 3);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_switch_releases_old_before_new() {
        let manager = manager();
        let (first, c1) = MockAdapter::new();
        let (second, _c2) = MockAdapter::new();

        manager
            .connect(Box::new(first), &SessionDirectives::default())
            .await
            .unwrap();
        manager
            .switch_provider(Box::new(second), &SessionDirectives::default())
            .await
            .unwrap();

        // The first adapter was disconnected; its controller can no longer
        // reach a receiver.
        assert!(!c1.emit(ProviderEvent::ResponseStarted));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_switch_emits_ordered_transitions() {
        let manager = manager();
        let mut events = manager.subscribe();
        let (first, _c1) = MockAdapter::new();
        let (second, _c2) = MockAdapter::new();

        manager
            .connect(Box::new(first), &SessionDirectives::default())
            .await
            .unwrap();
        manager
            .switch_provider(Box::new(second), &SessionDirectives::default())
            .await
            .unwrap();

        let kinds: Vec<ConnectionEventKind> = std::iter::from_fn(|| match events.try_recv() {
            Ok(e) => Some(e.kind),
            Err(_) => None,
        })
        .collect();
        assert_eq!(
            kinds,
            vec![
                ConnectionEventKind::Connecting,
                ConnectionEventKind::Connected,
                ConnectionEventKind::Disconnected,
                ConnectionEventKind::Connecting,
                ConnectionEventKind::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn test_reconnect_requires_held_adapter() {
        let manager = manager();
        let err = manager
            .reconnect(&SessionDirectives::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected));
    }
}
