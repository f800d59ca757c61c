//! Tool Dispatcher
//!
//! Routes provider-emitted tool calls to their registered handlers and
//! matches results back by id. Multiple calls may be pending simultaneously;
//! each is tracked independently, so completion order never matters.
//!
//! A handler that fails or exceeds the timeout produces an error result,
//! never a silent drop, and every result, success or error, is appended to
//! the transcript so the conversation history stays complete.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::registry::ToolRegistry;
use super::{ToolCall, ToolCallId, ToolOutcome, ToolResult};
use crate::error::ToolError;
use crate::transcript::{ItemDraft, ItemKind, ItemMetadata, TranscriptStore};

/// Default per-call execution deadline
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers completed results back to the live provider
///
/// Implemented by the connection manager; kept as a trait so the dispatcher
/// never depends on connection internals.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Deliver a result to the provider (best effort; the dispatcher logs failures)
    async fn deliver(&self, result: &ToolResult);
}

/// A call currently awaiting its handler
#[derive(Clone, Debug)]
struct PendingCall {
    name: String,
    started: Instant,
}

/// Routes tool calls to handlers and produces id-matched results
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    transcript: Arc<TranscriptStore>,
    pending: DashMap<ToolCallId, PendingCall>,
    timeout: Duration,
}

impl ToolDispatcher {
    /// Create a dispatcher over a registry, recording into `transcript`
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, transcript: Arc<TranscriptStore>) -> Self {
        Self {
            registry,
            transcript,
            pending: DashMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Override the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of calls currently awaiting handlers
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Execute a tool call to completion and record the result
    ///
    /// Always returns a result carrying the call's id: handler success,
    /// handler error, unknown tool, or a synthetic timeout error. The result
    /// is appended to the transcript before being returned.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResult {
        self.pending.insert(
            call.id.clone(),
            PendingCall {
                name: call.name.clone(),
                started: Instant::now(),
            },
        );
        debug!(call_id = %call.id, tool = %call.name, "dispatching tool call");

        let started = Instant::now();
        let outcome = match self.registry.get(&call.name) {
            None => ToolOutcome::from_error(&ToolError::UnknownTool(call.name.clone())),
            Some(binding) => {
                let handler = Arc::clone(&binding.handler);
                let invocation = handler.invoke(call.arguments.clone());
                match tokio::time::timeout(self.timeout, invocation).await {
                    Ok(Ok(value)) => ToolOutcome::Success(value),
                    Ok(Err(err)) => {
                        warn!(call_id = %call.id, tool = %call.name, error = %err, "tool handler failed");
                        ToolOutcome::from_error(&err)
                    }
                    Err(_) => {
                        let err = ToolError::Timeout {
                            tool: call.name.clone(),
                            elapsed_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                        };
                        warn!(call_id = %call.id, tool = %call.name, "tool call timed out");
                        ToolOutcome::from_error(&err)
                    }
                }
            }
        };

        self.pending.remove(&call.id);

        let result = ToolResult {
            id: call.id.clone(),
            outcome,
            execution_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            timestamp: chrono::Utc::now(),
        };

        self.record(&call, &result);
        result
    }

    /// Append the result to the transcript as a `tool_result` item
    fn record(&self, call: &ToolCall, result: &ToolResult) {
        let (content, error_kind, payload) = match &result.outcome {
            ToolOutcome::Success(value) => {
                (format!("{} completed", call.name), None, Some(value.clone()))
            }
            ToolOutcome::Error { kind, message } => (
                message.clone(),
                Some(kind.clone()),
                None,
            ),
        };

        let metadata = ItemMetadata {
            tool_name: Some(call.name.clone()),
            tool_args: Some(call.arguments.clone()),
            tool_result: payload,
            error_kind,
            duration_ms: Some(result.execution_ms),
            ..ItemMetadata::default()
        };

        self.transcript
            .append(ItemDraft::new(ItemKind::ToolResult, content).with_metadata(metadata));
    }

    /// Execute a call and hand the result to the provider-facing sink
    ///
    /// Delivery is best effort: a sink failure is logged, never propagated,
    /// so a dead connection cannot wedge tool execution.
    pub async fn dispatch_and_deliver(&self, call: ToolCall, sink: &dyn ResultSink) -> ToolResult {
        let result = self.dispatch(call).await;
        sink.deliver(&result).await;
        result
    }

    /// How long the named pending call has been running, if it is pending
    #[must_use]
    pub fn pending_elapsed(&self, id: &ToolCallId) -> Option<Duration> {
        self.pending.get(id).map(|p| p.started.elapsed())
    }

    /// Names of all pending calls (aggregate state reporting)
    #[must_use]
    pub fn pending_names(&self) -> Vec<String> {
        self.pending.iter().map(|e| e.value().name.clone()).collect()
    }
}
