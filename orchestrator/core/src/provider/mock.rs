//! Scripted Provider Adapter
//!
//! A deterministic in-process provider used by the orchestration tests. The
//! paired [`MockController`] drives it from the outside: emitting events as if
//! the vendor sent them, failing the next N connection attempts, and recording
//! everything the orchestrator sent.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::traits::{ProviderAdapter, ProviderKind, SessionDirectives, UserInput};
use crate::error::ConnectionError;
use crate::events::ProviderEvent;
use crate::tools::ToolResult;

/// Depth of the scripted event queue
const EVENT_QUEUE: usize = 256;

#[derive(Default)]
struct MockState {
    /// Live event sender; present only while connected
    events: Option<mpsc::Sender<ProviderEvent>>,
    /// Remaining connection attempts to reject
    fail_budget: u32,
    connect_count: u32,
    inputs: Vec<UserInput>,
    tool_results: Vec<ToolResult>,
    interrupts: u32,
    last_directives: Option<SessionDirectives>,
}

/// Test-side handle driving a [`MockAdapter`]
#[derive(Clone)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    /// Emit an event as if the provider sent it
    ///
    /// Returns `false` when no session is live (the event is dropped).
    pub fn emit(&self, event: ProviderEvent) -> bool {
        let sender = self.state.lock().events.clone();
        match sender {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Reject the next `n` connection attempts
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().fail_budget = n;
    }

    /// Number of connection attempts, including rejected ones
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connect_count
    }

    /// Inputs the orchestrator has sent, in order
    #[must_use]
    pub fn inputs(&self) -> Vec<UserInput> {
        self.state.lock().inputs.clone()
    }

    /// Tool results the orchestrator has sent, in order
    #[must_use]
    pub fn tool_results(&self) -> Vec<ToolResult> {
        self.state.lock().tool_results.clone()
    }

    /// Number of interrupt requests received
    #[must_use]
    pub fn interrupt_count(&self) -> u32 {
        self.state.lock().interrupts
    }

    /// Directives from the most recent connection attempt
    #[must_use]
    pub fn last_directives(&self) -> Option<SessionDirectives> {
        self.state.lock().last_directives.clone()
    }

    /// Drop the live event sender, ending the adapter's event stream
    pub fn sever(&self) {
        self.state.lock().events = None;
    }
}

/// Scripted adapter for orchestration tests
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
    ready_on_connect: bool,
}

impl MockAdapter {
    /// Create an adapter and its controller
    ///
    /// The adapter queues a [`ProviderEvent::Ready`] on every successful
    /// connect, matching the real families' handshakes.
    #[must_use]
    pub fn new() -> (Self, MockController) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let controller = MockController {
            state: Arc::clone(&state),
        };
        (
            Self {
                state,
                ready_on_connect: true,
            },
            controller,
        )
    }

    /// Create an adapter whose connects succeed without emitting `Ready`
    #[must_use]
    pub fn new_silent() -> (Self, MockController) {
        let (mut adapter, controller) = Self::new();
        adapter.ready_on_connect = false;
        (adapter, controller)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(
        &mut self,
        directives: SessionDirectives,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError> {
        let mut state = self.state.lock();
        state.connect_count += 1;
        state.last_directives = Some(directives);

        if state.fail_budget > 0 {
            state.fail_budget -= 1;
            return Err(ConnectionError::Rejected("scripted failure".into()));
        }
        if state.events.is_some() {
            return Err(ConnectionError::AlreadyConnected(self.name().to_string()));
        }

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        if self.ready_on_connect {
            tx.try_send(ProviderEvent::Ready {
                provider_session: Some("mock_session".into()),
            })
            .ok();
        }
        state.events = Some(tx);
        Ok(rx)
    }

    async fn send_input(&self, input: UserInput) -> Result<(), ConnectionError> {
        let mut state = self.state.lock();
        if state.events.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        state.inputs.push(input);
        Ok(())
    }

    async fn send_tool_result(&self, result: &ToolResult) -> Result<(), ConnectionError> {
        let mut state = self.state.lock();
        if state.events.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        state.tool_results.push(result.clone());
        Ok(())
    }

    async fn interrupt(&self) -> Result<(), ConnectionError> {
        let mut state = self.state.lock();
        if state.events.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        state.interrupts += 1;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.state.lock().events = None;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().events.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_emits_ready() {
        let (mut adapter, _controller) = MockAdapter::new();
        let mut rx = adapter.connect(SessionDirectives::default()).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ProviderEvent::Ready { .. })
        ));
        assert!(adapter.is_connected());
    }

    #[tokio::test]
    async fn test_fail_budget_rejects_then_recovers() {
        let (mut adapter, controller) = MockAdapter::new();
        controller.fail_next_connects(2);

        for _ in 0..2 {
            let err = adapter.connect(SessionDirectives::default()).await.unwrap_err();
            assert!(matches!(err, ConnectionError::Rejected(_)));
        }
        adapter.connect(SessionDirectives::default()).await.unwrap();
        assert_eq!(controller.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_controller_emit_reaches_receiver() {
        let (mut adapter, controller) = MockAdapter::new();
        let mut rx = adapter.connect(SessionDirectives::default()).await.unwrap();
        rx.recv().await; // discard Ready

        assert!(controller.emit(ProviderEvent::ResponseStarted));
        assert!(matches!(rx.recv().await, Some(ProviderEvent::ResponseStarted)));
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream_and_records_stop() {
        let (mut adapter, controller) = MockAdapter::new();
        let mut rx = adapter.connect(SessionDirectives::default()).await.unwrap();
        rx.recv().await;

        adapter.send_input(UserInput::Text("hello".into())).await.unwrap();
        adapter.disconnect().await;

        assert!(rx.recv().await.is_none());
        assert!(!adapter.is_connected());
        assert!(!controller.emit(ProviderEvent::ResponseStarted));
        assert_eq!(controller.inputs().len(), 1);
    }
}
