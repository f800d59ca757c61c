//! Integration tests for the conversation orchestration layer
//!
//! These tests run complete scenarios against the scripted provider adapter
//! and verify that the components hold together:
//! - Full turn cycles through the event pump and transcript
//! - Provider switching with exclusive connection ownership
//! - Reconnect retry ceiling and terminal failure
//! - Tool dispatch with timeouts and out-of-order completion
//! - Debug snapshots and session export

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use parley_core::tools::registry::FnHandler;
use parley_core::{
    AgentError, ConnectionError, ConnectionEventKind, ConnectionManager, ConnectionState,
    ExchangeOutcome, ExportFormat, ItemDraft, ItemKind, MemoryHistory, MockAdapter,
    MockController, PromptBundle, ProviderEvent, ReconnectPolicy, ResultSink, SessionExport,
    StaticContext, ToolCall, ToolCallId, ToolCapability, ToolDefinition, ToolDispatcher,
    ToolOutcome, ToolRegistry, TranscriptStore, TurnState, UserInput, VoiceAgent,
};

/// Agent with fast retry delays and the given registry
fn agent_with(registry: ToolRegistry) -> VoiceAgent {
    VoiceAgent::new(
        Arc::new(registry),
        Arc::new(MemoryHistory::new()),
        Arc::new(StaticContext::new(PromptBundle {
            system_prompt: "Portfolio guide.".into(),
            ..PromptBundle::default()
        })),
        ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            ..ReconnectPolicy::default()
        },
    )
}

fn agent() -> VoiceAgent {
    agent_with(ToolRegistry::new())
}

fn tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: format!("test tool {name}"),
        parameters: serde_json::json!({"type": "object", "properties": {}}),
        capability: ToolCapability::ClientUi,
        auto_approve: true,
    }
}

/// Give the event pump a moment to consume what the controller emitted
async fn drain(controller: &MockController) {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    let _ = controller;
}

// =============================================================================
// Turn cycle through the event pump
// =============================================================================

/// A spoken turn flows provider events -> pump -> session -> transcript, and
/// the turn state returns to idle once the reply completes.
#[tokio::test]
async fn test_full_turn_cycle_lands_in_transcript() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    agent.start_session(Box::new(adapter), None).await.unwrap();

    controller.emit(ProviderEvent::UserTranscriptDelta {
        text: "show me the robotics project".into(),
        is_final: true,
        confidence: Some(0.94),
    });
    controller.emit(ProviderEvent::ResponseStarted);
    controller.emit(ProviderEvent::ResponseDelta {
        text: "Here is the ".into(),
    });
    controller.emit(ProviderEvent::ResponseDelta {
        text: "robotics project.".into(),
    });
    controller.emit(ProviderEvent::ResponseCompleted { full_text: None });
    drain(&controller).await;

    let items = agent.transcript().read_all();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].kind, ItemKind::UserSpeech);
    assert_eq!(items[0].content, "show me the robotics project");
    assert_eq!(items[0].metadata.confidence, Some(0.94));
    assert_eq!(items[1].kind, ItemKind::AiResponse);
    assert_eq!(items[1].content, "Here is the robotics project.");
    assert!(items[0].seq < items[1].seq);

    assert_eq!(agent.state().await.turn, Some(TurnState::Idle));
}

/// Typed input reaches the adapter and is mirrored into the transcript even
/// though no speech recognition is involved.
#[tokio::test]
async fn test_typed_turn_reaches_adapter() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    agent.start_session(Box::new(adapter), None).await.unwrap();

    agent.submit("hello there").await.unwrap();

    let inputs = controller.inputs();
    assert_eq!(inputs.len(), 1);
    assert!(matches!(&inputs[0], UserInput::Text(t) if t == "hello there"));

    let items = agent.transcript().read_all();
    assert_eq!(items[0].kind, ItemKind::UserSpeech);
    assert_eq!(items[0].content, "hello there");
}

// =============================================================================
// Transcript ordering under concurrency
// =============================================================================

/// Appends from many tasks interleave without ever reusing or reordering a
/// sequence number.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_keep_global_order() {
    let store = Arc::new(TranscriptStore::new());
    let mut handles = Vec::new();

    for task in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                store.append(ItemDraft::new(
                    ItemKind::SystemMessage,
                    format!("task {task} item {i}"),
                ));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let items = store.read_all();
    assert_eq!(items.len(), 200);
    for (i, item) in items.iter().enumerate() {
        // Gap-free and strictly increasing from zero.
        assert_eq!(item.seq, i as u64);
    }
}

// =============================================================================
// Provider switching
// =============================================================================

/// Switching providers keeps the session id and transcript, and the old
/// adapter is fully released before the new one serves events.
#[tokio::test]
async fn test_switch_provider_releases_old_before_new() {
    let agent = agent();
    let (first, c1) = MockAdapter::new();
    let id = agent.start_session(Box::new(first), None).await.unwrap();

    c1.emit(ProviderEvent::ResponseStarted);
    c1.emit(ProviderEvent::ResponseCompleted {
        full_text: Some("from the first provider".into()),
    });
    drain(&c1).await;

    let mut transitions = agent.connection().subscribe();

    let (second, c2) = MockAdapter::new();
    agent.switch_provider(Box::new(second), None).await.unwrap();

    // Old adapter is dead: its events no longer reach anything.
    assert!(!c1.emit(ProviderEvent::ResponseStarted));

    // The release happened before the new dial.
    let mut kinds = Vec::new();
    while let Ok(event) = transitions.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            ConnectionEventKind::Disconnected,
            ConnectionEventKind::Connecting,
            ConnectionEventKind::Connected,
        ]
    );

    c2.emit(ProviderEvent::ResponseStarted);
    c2.emit(ProviderEvent::ResponseCompleted {
        full_text: Some("from the second provider".into()),
    });
    drain(&c2).await;

    let state = agent.state().await;
    assert_eq!(state.session_id, Some(id));
    let items = agent.transcript().read_all();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].content, "from the second provider");
}

// =============================================================================
// Retry ceiling
// =============================================================================

/// A provider that rejects every dial is attempted exactly as many times as
/// the policy allows, then the connection lands in the error state.
#[tokio::test]
async fn test_retry_ceiling_then_error_state() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    controller.fail_next_connects(10);

    let err = agent
        .start_session(Box::new(adapter), None)
        .await
        .unwrap_err();
    match err {
        AgentError::Connection(ConnectionError::RetriesExhausted { attempts, .. }) => {
            assert_eq!(attempts, 3);
        }
        other => panic!("expected retries exhausted, got {other}"),
    }

    assert_eq!(controller.connect_count(), 3);
    let state = agent.state().await;
    assert!(state.session_id.is_none());
    assert_eq!(state.connection, ConnectionState::Error);
}

/// Transient dial failures inside the retry budget still produce a session.
#[tokio::test]
async fn test_transient_dial_failure_recovers() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    controller.fail_next_connects(2);

    agent.start_session(Box::new(adapter), None).await.unwrap();
    assert_eq!(controller.connect_count(), 3);
    assert_eq!(agent.state().await.connection, ConnectionState::Connected);
}

/// After the provider drops the stream, reconnect re-dials the held adapter
/// and events flow again on the same session.
#[tokio::test]
async fn test_reconnect_resumes_event_flow() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    let id = agent.start_session(Box::new(adapter), None).await.unwrap();

    controller.sever();
    drain(&controller).await;

    agent.reconnect().await.unwrap();
    assert_eq!(agent.state().await.session_id, Some(id));

    controller.emit(ProviderEvent::ResponseStarted);
    controller.emit(ProviderEvent::ResponseCompleted {
        full_text: Some("back online".into()),
    });
    drain(&controller).await;

    let items = agent.transcript().read_all();
    assert_eq!(items.last().unwrap().content, "back online");
}

/// A stream that dies without a closing event is re-dialed automatically;
/// the session stays up and keeps flowing on the new stream.
#[tokio::test]
async fn test_stream_drop_triggers_automatic_reconnect() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    let id = agent.start_session(Box::new(adapter), None).await.unwrap();
    assert_eq!(controller.connect_count(), 1);

    // Drop the event sender with no Closed event.
    controller.sever();
    drain(&controller).await;

    assert_eq!(controller.connect_count(), 2);
    let state = agent.state().await;
    assert_eq!(state.connection, ConnectionState::Connected);
    assert_eq!(state.session_id, Some(id));

    controller.emit(ProviderEvent::ResponseStarted);
    controller.emit(ProviderEvent::ResponseCompleted {
        full_text: Some("still here".into()),
    });
    drain(&controller).await;
    let items = agent.transcript().read_all();
    assert_eq!(items.last().unwrap().content, "still here");
}

/// A drop mid-reply finalizes the partial text before re-dialing.
#[tokio::test]
async fn test_stream_drop_mid_reply_finalizes_partial_then_redials() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    agent.start_session(Box::new(adapter), None).await.unwrap();

    controller.emit(ProviderEvent::ResponseStarted);
    controller.emit(ProviderEvent::ResponseDelta {
        text: "half a thought".into(),
    });
    drain(&controller).await;
    controller.sever();
    drain(&controller).await;

    let items = agent.transcript().read_all();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content, "half a thought");
    assert!(items[0].metadata.interrupted);
    assert_eq!(controller.connect_count(), 2);
    assert_eq!(agent.state().await.turn, Some(TurnState::Idle));
}

/// When every re-dial after a drop is rejected, the retry ceiling applies
/// and the connection lands in the error state.
#[tokio::test]
async fn test_stream_drop_retries_then_error_state() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    agent.start_session(Box::new(adapter), None).await.unwrap();

    controller.fail_next_connects(10);
    controller.sever();
    // Re-dials back off between attempts; wait out the short test schedule.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The initial dial plus one full round of re-dials.
    assert_eq!(controller.connect_count(), 4);
    assert_eq!(agent.state().await.connection, ConnectionState::Error);
}

// =============================================================================
// Disconnect mid-reply
// =============================================================================

/// A stream that closes while a reply is streaming finalizes the partial text
/// with interrupted metadata, returns the turn to idle, and releases the
/// connection.
#[tokio::test]
async fn test_disconnect_mid_reply_keeps_partial() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    agent.start_session(Box::new(adapter), None).await.unwrap();

    controller.emit(ProviderEvent::ResponseStarted);
    controller.emit(ProviderEvent::ResponseDelta {
        text: "I was telling you about".into(),
    });
    controller.emit(ProviderEvent::Closed {
        reason: Some("connection dropped".into()),
    });
    drain(&controller).await;

    let items = agent.transcript().read_all();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ItemKind::AiResponse);
    assert_eq!(items[0].content, "I was telling you about");
    assert!(items[0].metadata.interrupted);
    let state = agent.state().await;
    assert_eq!(state.turn, Some(TurnState::Idle));
    // An orderly closure releases the connection rather than re-dialing.
    assert_eq!(state.connection, ConnectionState::Disconnected);
    assert_eq!(controller.connect_count(), 1);
}

// =============================================================================
// Tool dispatch
// =============================================================================

/// Tool calls requested by the provider are executed and the results land
/// both in the transcript and back at the adapter.
#[tokio::test]
async fn test_tool_call_round_trip_through_pump() {
    let mut registry = ToolRegistry::new();
    registry.register(
        tool("navigate_to_project"),
        Arc::new(FnHandler(|args| Ok(serde_json::json!({"opened": args})))),
    );
    let agent = agent_with(registry);
    let (adapter, controller) = MockAdapter::new();
    agent.start_session(Box::new(adapter), None).await.unwrap();

    let call_id = ToolCallId::new();
    controller.emit(ProviderEvent::ToolCallRequested {
        call: ToolCall::new(
            call_id.clone(),
            "navigate_to_project",
            serde_json::json!({"slug": "robotics"}),
        ),
    });
    drain(&controller).await;

    let delivered = controller.tool_results();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id, call_id);
    assert!(matches!(delivered[0].outcome, ToolOutcome::Success(_)));

    let recorded = agent.transcript().items_of_kind(ItemKind::ToolResult);
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0].metadata.tool_name.as_deref(),
        Some("navigate_to_project")
    );
    assert_eq!(agent.state().await.pending_tool_calls, 0);
}

/// A handler that exceeds the deadline yields exactly one synthetic error
/// result, delivered to the provider like any other.
#[tokio::test]
async fn test_tool_timeout_delivers_synthetic_error() {
    struct SlowHandler;

    #[async_trait::async_trait]
    impl parley_core::ToolHandler for SlowHandler {
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
        ) -> Result<serde_json::Value, parley_core::ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(serde_json::json!(null))
        }
    }

    let mut registry = ToolRegistry::new();
    registry.register(tool("slow"), Arc::new(SlowHandler));
    let transcript = Arc::new(TranscriptStore::new());
    let dispatcher = ToolDispatcher::new(Arc::new(registry), Arc::clone(&transcript))
        .with_timeout(Duration::from_millis(20));

    let manager = Arc::new(ConnectionManager::new(
        ReconnectPolicy::default(),
        Arc::new(parley_core::AudioDevices::new()),
    ));
    let (adapter, controller) = MockAdapter::new();
    let directives = parley_core::SessionDirectives::default();
    manager.connect(Box::new(adapter), &directives).await.unwrap();

    let call = ToolCall::new(ToolCallId::new(), "slow", serde_json::json!({}));
    let result = dispatcher
        .dispatch_and_deliver(call, manager.as_ref() as &dyn ResultSink)
        .await;

    assert!(matches!(
        &result.outcome,
        ToolOutcome::Error { kind, .. } if kind == "timeout"
    ));
    let delivered = controller.tool_results();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id, result.id);
    assert_eq!(transcript.items_of_kind(ItemKind::ToolResult).len(), 1);
    assert_eq!(dispatcher.pending_count(), 0);
}

/// Two calls completing in reverse order still deliver results under their
/// own ids.
#[tokio::test]
async fn test_out_of_order_tool_results_match_by_id() {
    struct DelayedHandler;

    #[async_trait::async_trait]
    impl parley_core::ToolHandler for DelayedHandler {
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
        ) -> Result<serde_json::Value, parley_core::ToolError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(serde_json::json!("delayed"))
        }
    }

    let mut registry = ToolRegistry::new();
    registry.register(
        tool("fast"),
        Arc::new(FnHandler(|_| Ok(serde_json::json!("fast")))),
    );
    registry.register(tool("delayed"), Arc::new(DelayedHandler));

    let agent = agent_with(registry);
    let (adapter, controller) = MockAdapter::new();
    agent.start_session(Box::new(adapter), None).await.unwrap();

    let delayed_id = ToolCallId::new();
    let fast_id = ToolCallId::new();
    controller.emit(ProviderEvent::ToolCallRequested {
        call: ToolCall::new(delayed_id.clone(), "delayed", serde_json::json!({})),
    });
    controller.emit(ProviderEvent::ToolCallRequested {
        call: ToolCall::new(fast_id.clone(), "fast", serde_json::json!({})),
    });
    tokio::time::sleep(Duration::from_millis(150)).await;

    let delivered = controller.tool_results();
    assert_eq!(delivered.len(), 2);
    // The fast call finished first even though it was requested second.
    assert_eq!(delivered[0].id, fast_id);
    assert_eq!(delivered[1].id, delayed_id);
    assert_eq!(agent.state().await.pending_tool_calls, 0);
}

// =============================================================================
// Debug snapshots and export
// =============================================================================

/// Each completed exchange produces a snapshot; a fatal provider error
/// produces an error snapshot and an error transcript item.
#[tokio::test]
async fn test_snapshots_for_response_and_error() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    let id = agent.start_session(Box::new(adapter), None).await.unwrap();

    controller.emit(ProviderEvent::UserTranscriptDelta {
        text: "tell me more".into(),
        is_final: true,
        confidence: None,
    });
    controller.emit(ProviderEvent::ResponseStarted);
    controller.emit(ProviderEvent::ResponseDelta {
        text: "Gladly.".into(),
    });
    controller.emit(ProviderEvent::ResponseCompleted { full_text: None });
    controller.emit(ProviderEvent::Error {
        message: "vendor overloaded".into(),
        fatal: true,
    });
    drain(&controller).await;

    let snapshots = agent.recorder().by_session(&id);
    assert_eq!(snapshots.len(), 2);
    assert!(matches!(
        &snapshots[0].outcome,
        ExchangeOutcome::Response(t) if t == "Gladly."
    ));
    assert!(matches!(
        &snapshots[1].outcome,
        ExchangeOutcome::Error(m) if m == "vendor overloaded"
    ));

    let errors = agent.transcript().items_of_kind(ItemKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(agent.state().await.error_count, 1);
}

/// The export surface reproduces a finished session: transcript items first,
/// then snapshots, parseable line by line.
#[tokio::test]
async fn test_export_renders_finished_session() {
    let agent = agent();
    let (adapter, controller) = MockAdapter::new();
    let id = agent.start_session(Box::new(adapter), None).await.unwrap();

    controller.emit(ProviderEvent::UserTranscriptDelta {
        text: "hello".into(),
        is_final: true,
        confidence: None,
    });
    controller.emit(ProviderEvent::ResponseStarted);
    controller.emit(ProviderEvent::ResponseCompleted {
        full_text: Some("hi there".into()),
    });
    drain(&controller).await;
    agent.end_session().await.unwrap();

    let export = SessionExport {
        session_id: id.clone(),
        items: agent.transcript().read_all(),
        snapshots: agent.recorder().by_session(&id),
    };

    let jsonl = export.render(ExportFormat::Jsonl).unwrap();
    let records: Vec<serde_json::Value> = jsonl
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["record"], "item");
    assert_eq!(records[0]["content"], "hello");
    assert_eq!(records[2]["record"], "snapshot");

    let csv = export.render(ExportFormat::Csv).unwrap();
    assert!(csv.starts_with("record,seq,timestamp,"));
    assert_eq!(csv.lines().count(), 4);
}
