//! Voice Agent
//!
//! The aggregate the daemon and tests talk to. Owns every orchestration
//! component and runs the event pump: a single consumer task that drains the
//! live adapter's event stream and routes each event to the turn machine,
//! the tool dispatcher, the debug recorder, and the transcript.
//!
//! ```text
//!                        +--------------- VoiceAgent ---------------+
//!  ProviderAdapter ----> | pump --> SessionOrchestrator --> Transcript |
//!   (event stream)       |      \-> ToolDispatcher  --------^  |       |
//!                        |      \-> DebugRecorder              |       |
//!                        +-----------------------------------  |  -----+
//!                                       session end --> ConversationHistory
//! ```
//!
//! One session is active at a time. Ending a session cancels the turn in
//! flight, tears down the connection, and hands the finalized transcript to
//! the history collaborator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{AudioDeviceState, AudioDevices};
use crate::connection::{ConnectionManager, ConnectionState, ReconnectPolicy};
use crate::debug_recorder::{ConversationDebugSnapshot, DebugRecorder, ExchangeOutcome};
use crate::error::AgentError;
use crate::events::{ProviderEvent, SessionId};
use crate::history::{Conversation, ContextSource, ConversationHistory, PromptPurpose};
use crate::provider::{ProviderAdapter, ProviderKind, SessionDirectives};
use crate::session::{SessionOrchestrator, TurnState};
use crate::tools::{ToolDispatcher, ToolRegistry};
use crate::transcript::TranscriptStore;

// ============================================================================
// State Snapshot
// ============================================================================

/// Point-in-time view of the whole agent, for status surfaces
#[derive(Clone, Debug)]
pub struct VoiceAgentState {
    /// Active session, if one is running
    pub session_id: Option<SessionId>,
    /// Provider family currently connected, if any
    pub provider: Option<ProviderKind>,
    /// Connection lifecycle state
    pub connection: ConnectionState,
    /// Turn state of the active session
    pub turn: Option<TurnState>,
    /// Whether the audio devices are leased
    pub audio: AudioDeviceState,
    /// Items appended so far
    pub transcript_len: usize,
    /// Tool calls dispatched but not yet resolved
    pub pending_tool_calls: usize,
    /// Provider errors observed since construction
    pub error_count: u32,
}

// ============================================================================
// Agent
// ============================================================================

struct ActiveSession {
    session: Arc<SessionOrchestrator>,
    pump: tokio::task::JoinHandle<()>,
    directives: SessionDirectives,
}

/// How one pass over an adapter's event stream ended
enum StreamEnd {
    /// The provider closed the session on purpose
    Orderly,
    /// Fatal error, or the stream ended without a closing event
    Dropped,
}

/// Owner of the orchestration components and the event pump
pub struct VoiceAgent {
    manager: Arc<ConnectionManager>,
    transcript: Arc<TranscriptStore>,
    dispatcher: Arc<ToolDispatcher>,
    recorder: Arc<DebugRecorder>,
    registry: Arc<ToolRegistry>,
    devices: Arc<AudioDevices>,
    history: Arc<dyn ConversationHistory>,
    context: Arc<dyn ContextSource>,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
    error_count: Arc<AtomicU32>,
}

impl VoiceAgent {
    /// Assemble an agent around the given collaborators
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        history: Arc<dyn ConversationHistory>,
        context: Arc<dyn ContextSource>,
        policy: ReconnectPolicy,
    ) -> Self {
        let transcript = Arc::new(TranscriptStore::new());
        let devices = Arc::new(AudioDevices::new());
        Self {
            manager: Arc::new(ConnectionManager::new(policy, Arc::clone(&devices))),
            dispatcher: Arc::new(ToolDispatcher::new(
                Arc::clone(&registry),
                Arc::clone(&transcript),
            )),
            recorder: Arc::new(DebugRecorder::new()),
            registry,
            devices,
            history,
            context,
            transcript,
            active: tokio::sync::Mutex::new(None),
            error_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The shared transcript store
    #[must_use]
    pub fn transcript(&self) -> &Arc<TranscriptStore> {
        &self.transcript
    }

    /// The debug snapshot ring
    #[must_use]
    pub fn recorder(&self) -> &Arc<DebugRecorder> {
        &self.recorder
    }

    /// The connection manager
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// The tool dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Snapshot the agent for a status surface
    pub async fn state(&self) -> VoiceAgentState {
        let active = self.active.lock().await;
        VoiceAgentState {
            session_id: active.as_ref().map(|a| a.session.id().clone()),
            provider: self.manager.status().provider,
            connection: self.manager.state(),
            turn: active.as_ref().map(|a| a.session.state()),
            audio: self.devices.state(),
            transcript_len: self.transcript.len(),
            pending_tool_calls: self.dispatcher.pending_count(),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }

    /// Build session directives from the context collaborator
    async fn directives_for(
        &self,
        session: &SessionId,
        reflink: Option<&str>,
        purpose: PromptPurpose,
    ) -> Result<SessionDirectives, AgentError> {
        let bundle = self.context.build_prompt(session, reflink, purpose).await?;
        Ok(SessionDirectives {
            system_prompt: bundle.system_prompt,
            first_message: bundle.first_message,
            language: bundle.language,
            context: bundle.context_string,
            tools: self.registry.definitions(),
            ..SessionDirectives::default()
        })
    }

    /// Start a session on the given provider
    ///
    /// Builds the prompt, dials with the retry policy, and spawns the event
    /// pump. Returns the new session id.
    ///
    /// # Errors
    ///
    /// [`AgentError::Session`] when a session is already active; connection
    /// errors when the dial fails.
    pub async fn start_session(
        &self,
        adapter: Box<dyn ProviderAdapter>,
        reflink: Option<&str>,
    ) -> Result<SessionId, AgentError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(AgentError::Session("a session is already active".into()));
        }

        let id = SessionId::new();
        let directives = self
            .directives_for(&id, reflink, PromptPurpose::SessionStart)
            .await?;
        let provider = adapter.kind();

        let events = self.manager.connect(adapter, &directives).await?;

        let session = Arc::new(SessionOrchestrator::new(
            id.clone(),
            provider,
            Arc::clone(&self.transcript),
            Arc::clone(&self.manager),
        ));
        let pump = self.spawn_pump(Arc::clone(&session), &directives, events);

        *active = Some(ActiveSession {
            session,
            pump,
            directives,
        });
        info!(session = %id, provider = %provider, "session started");
        Ok(id)
    }

    /// End the active session
    ///
    /// Cancels the turn in flight (a partial response is finalized with
    /// interrupted metadata), releases the connection and audio, and hands
    /// the transcript to the history collaborator. No-op without a session.
    ///
    /// # Errors
    ///
    /// [`AgentError::History`] when the history store rejects the write; the
    /// session is torn down regardless.
    pub async fn end_session(&self) -> Result<(), AgentError> {
        let taken = self.active.lock().await.take();
        let Some(active) = taken else {
            return Ok(());
        };

        active.session.cancel_current_turn().await;
        active.pump.abort();
        self.manager.disconnect().await;

        let id = active.session.id().clone();
        info!(session = %id, "session ended");
        self.history
            .create_conversation(Conversation {
                session_id: id,
                stored_at: Utc::now(),
                items: self.transcript.read_all(),
            })
            .await
    }

    /// Move the active session to a different provider
    ///
    /// The prompt is rebuilt, the old provider fully released before the new
    /// dial, and the event pump restarted on the new stream. The transcript
    /// and session id carry over.
    ///
    /// # Errors
    ///
    /// [`AgentError::Session`] without an active session; connection errors
    /// when the new dial fails (the old provider stays released).
    pub async fn switch_provider(
        &self,
        adapter: Box<dyn ProviderAdapter>,
        reflink: Option<&str>,
    ) -> Result<(), AgentError> {
        let mut active = self.active.lock().await;
        let Some(current) = active.as_mut() else {
            return Err(AgentError::Session("no active session".into()));
        };

        current.session.cancel_current_turn().await;
        current.pump.abort();

        let id = current.session.id().clone();
        let provider = adapter.kind();
        let directives = self
            .directives_for(&id, reflink, PromptPurpose::Reconfigure)
            .await?;
        let events = self.manager.switch_provider(adapter, &directives).await?;

        let session = Arc::new(SessionOrchestrator::new(
            id.clone(),
            provider,
            Arc::clone(&self.transcript),
            Arc::clone(&self.manager),
        ));
        current.pump = self.spawn_pump(Arc::clone(&session), &directives, events);
        current.session = session;
        current.directives = directives;
        info!(session = %id, provider = %provider, "provider switched");
        Ok(())
    }

    /// Explicitly re-dial the active session's provider
    ///
    /// The event pump re-dials on its own when a stream drops; this is the
    /// surface-driven lever for forcing a fresh connection. Re-uses the
    /// directives the session was configured with and restarts the pump on
    /// the new stream. Counts against the retry ceiling.
    ///
    /// # Errors
    ///
    /// [`AgentError::Session`] without an active session; connection errors
    /// when every re-dial fails.
    pub async fn reconnect(&self) -> Result<(), AgentError> {
        let mut active = self.active.lock().await;
        let Some(current) = active.as_mut() else {
            return Err(AgentError::Session("no active session".into()));
        };

        current.pump.abort();
        let events = self.manager.reconnect(&current.directives).await?;
        current.pump = self.spawn_pump(Arc::clone(&current.session), &current.directives, events);
        info!(session = %current.session.id(), "session reconnected");
        Ok(())
    }

    /// Submit a typed user turn to the active session
    ///
    /// # Errors
    ///
    /// [`AgentError::Session`] without an active session; connection errors
    /// when the provider cannot be reached.
    pub async fn submit(&self, text: impl Into<String> + Send) -> Result<(), AgentError> {
        let active = self.active.lock().await;
        let Some(active) = active.as_ref() else {
            return Err(AgentError::Session("no active session".into()));
        };
        active.session.submit(text).await?;
        Ok(())
    }

    /// Abort the turn in flight, if any
    pub async fn cancel_current_turn(&self) {
        let session = {
            let active = self.active.lock().await;
            active.as_ref().map(|a| Arc::clone(&a.session))
        };
        if let Some(session) = session {
            session.cancel_current_turn().await;
        }
    }

    /// Single consumer of the adapter's event stream
    ///
    /// Runs until the provider closes the session on purpose or re-dials are
    /// exhausted. An unexpected end of the stream (fatal error, or the
    /// channel dropping with no closing event) re-dials the held adapter
    /// under the retry policy and resumes on the new stream; an orderly
    /// closure releases the connection.
    fn spawn_pump(
        &self,
        session: Arc<SessionOrchestrator>,
        directives: &SessionDirectives,
        events: mpsc::Receiver<ProviderEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let manager = Arc::clone(&self.manager);
        let recorder = Arc::clone(&self.recorder);
        let error_count = Arc::clone(&self.error_count);
        let directives = directives.clone();

        tokio::spawn(async move {
            let mut events = events;
            // Exchange context for debug snapshots.
            let mut last_input = String::new();
            let mut response_text = String::new();

            loop {
                let end = loop {
                    let Some(event) = events.recv().await else {
                        break StreamEnd::Dropped;
                    };

                    match &event {
                        ProviderEvent::UserTranscriptDelta {
                            text,
                            is_final: true,
                            ..
                        } => {
                            last_input = text.clone();
                            response_text.clear();
                        }
                        ProviderEvent::ResponseDelta { text } => {
                            response_text.push_str(text);
                        }
                        ProviderEvent::ResponseCompleted { full_text } => {
                            let text = full_text
                                .clone()
                                .unwrap_or_else(|| std::mem::take(&mut response_text));
                            let mut snapshot = ConversationDebugSnapshot::now(
                                session.id().clone(),
                                last_input.clone(),
                                directives.system_prompt.clone(),
                                ExchangeOutcome::Response(text),
                            );
                            snapshot.context_string = directives.context.clone();
                            recorder.record(snapshot);
                        }
                        ProviderEvent::ToolCallRequested { call } => {
                            // Handlers may be slow; dispatch off the pump so
                            // later events keep flowing and results match by id.
                            let dispatcher = Arc::clone(&dispatcher);
                            let manager = Arc::clone(&manager);
                            let call = call.clone();
                            tokio::spawn(async move {
                                dispatcher.dispatch_and_deliver(call, manager.as_ref()).await;
                            });
                        }
                        ProviderEvent::Error { message, .. } => {
                            error_count.fetch_add(1, Ordering::Relaxed);
                            let mut snapshot = ConversationDebugSnapshot::now(
                                session.id().clone(),
                                last_input.clone(),
                                directives.system_prompt.clone(),
                                ExchangeOutcome::Error(message.clone()),
                            );
                            snapshot.context_string = directives.context.clone();
                            recorder.record(snapshot);
                        }
                        _ => {}
                    }

                    let terminal = event.is_terminal();
                    session.on_event(&event);
                    if terminal {
                        break match event {
                            ProviderEvent::Closed { .. } => StreamEnd::Orderly,
                            _ => StreamEnd::Dropped,
                        };
                    }
                };

                match end {
                    StreamEnd::Orderly => {
                        debug!(session = %session.id(), "provider closed the session");
                        manager.disconnect().await;
                        break;
                    }
                    StreamEnd::Dropped => {
                        warn!(session = %session.id(), "event stream dropped, re-dialing");
                        // A reply cut off by the drop is finalized before the
                        // new stream starts.
                        session.cancel_current_turn().await;
                        response_text.clear();
                        match manager.reconnect(&directives).await {
                            Ok(rx) => events = rx,
                            Err(e) => {
                                warn!(
                                    session = %session.id(),
                                    error = %e,
                                    "automatic reconnect gave up"
                                );
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}
