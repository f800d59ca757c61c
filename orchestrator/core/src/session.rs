//! Session Orchestrator
//!
//! Tracks one conversation session: the turn state machine and the buffers
//! that accumulate streaming deltas until an item can be appended to the
//! transcript fully formed. The transcript never sees partial text; a
//! response cut off by barge-in or teardown is finalized once, tagged
//! interrupted, and never touched again.
//!
//! # Turn States
//!
//! ```text
//!        submit / speech        response        response
//!  Idle ----------------> Processing ----> Speaking ----> Idle
//!   ^  \                      ^               |
//!   |   '--> Listening -------'               | barge-in
//!   |                                         v
//!   '------------------ Listening <---- Interrupted
//! ```
//!
//! `Interrupted` is reachable only from `Speaking` and resolves immediately:
//! barge-in lands in `Listening` (the user is talking), teardown in `Idle`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::connection::ConnectionManager;
use crate::error::ConnectionError;
use crate::events::{ProviderEvent, SessionId};
use crate::provider::{ProviderKind, UserInput};
use crate::transcript::{ItemDraft, ItemKind, ItemMetadata, TranscriptStore};

// ============================================================================
// Turn State
// ============================================================================

/// Phase of the current conversation turn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    /// Nothing in flight
    Idle,
    /// User audio is being transcribed
    Listening,
    /// Utterance committed; waiting for the response to start
    Processing,
    /// Assistant response streaming out
    Speaking,
    /// Response aborted mid-stream; transient, resolves on the next event
    Interrupted,
}

/// Accumulates streaming deltas for the turn in flight
#[derive(Debug, Default)]
struct TurnBuffer {
    user_text: String,
    assistant_text: String,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TurnBuffer {
    fn start_response(&mut self) {
        self.assistant_text.clear();
        self.started_at = Some(chrono::Utc::now());
    }

    fn response_ms(&self) -> Option<u64> {
        self.started_at.map(|t| {
            u64::try_from((chrono::Utc::now() - t).num_milliseconds().max(0)).unwrap_or(0)
        })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

struct SessionInner {
    state: TurnState,
    buffer: TurnBuffer,
}

/// Turn-level coordinator for one conversation session
pub struct SessionOrchestrator {
    id: SessionId,
    provider: ProviderKind,
    transcript: Arc<TranscriptStore>,
    manager: Arc<ConnectionManager>,
    inner: Mutex<SessionInner>,
}

impl SessionOrchestrator {
    /// Create an idle session
    #[must_use]
    pub fn new(
        id: SessionId,
        provider: ProviderKind,
        transcript: Arc<TranscriptStore>,
        manager: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            id,
            provider,
            transcript,
            manager,
            inner: Mutex::new(SessionInner {
                state: TurnState::Idle,
                buffer: TurnBuffer::default(),
            }),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current turn state
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.inner.lock().state
    }

    /// Submit a typed user turn
    ///
    /// Appends the user item and forwards the text to the provider. Resolves
    /// when the provider has acknowledged receipt; the response arrives later
    /// through the event stream.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`] when no provider is connected. The
    /// transcript item is still appended so the user sees what they sent.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        let text = text.into();
        self.transcript.append(
            ItemDraft::new(ItemKind::UserSpeech, text.clone()).from_provider(self.provider),
        );
        self.inner.lock().state = TurnState::Processing;

        self.manager.send_input(UserInput::Text(text)).await
    }

    /// Abort the turn in flight
    ///
    /// Safe in any state; outside `Processing`/`Speaking` it does nothing.
    /// A partially streamed response is finalized with interrupted metadata.
    pub async fn cancel_current_turn(&self) {
        let cancel = {
            let mut inner = self.inner.lock();
            match inner.state {
                TurnState::Processing | TurnState::Speaking => {
                    self.finalize_partial(&mut inner, TurnState::Idle);
                    true
                }
                _ => false,
            }
        };
        if cancel {
            debug!(session = %self.id, "turn cancelled");
            self.manager.interrupt().await.ok();
        }
    }

    /// Finalize whatever the turn buffered and land in `next`
    ///
    /// Caller holds the lock. Empty buffers append nothing.
    fn finalize_partial(&self, inner: &mut SessionInner, next: TurnState) {
        if !inner.buffer.assistant_text.is_empty() {
            let metadata = ItemMetadata {
                interrupted: true,
                duration_ms: inner.buffer.response_ms(),
                ..ItemMetadata::default()
            };
            self.transcript.append(
                ItemDraft::new(
                    ItemKind::AiResponse,
                    std::mem::take(&mut inner.buffer.assistant_text),
                )
                .from_provider(self.provider)
                .with_metadata(metadata),
            );
        }
        inner.buffer = TurnBuffer::default();
        inner.state = next;
    }

    /// Fold one provider event into the session
    ///
    /// The reducer for the turn state machine. Unknown or out-of-phase events
    /// are ignored rather than treated as errors; providers differ in which
    /// events they send.
    pub fn on_event(&self, event: &ProviderEvent) {
        let mut inner = self.inner.lock();
        trace!(session = %self.id, state = ?inner.state, event = ?event, "session event");

        match event {
            ProviderEvent::Ready { .. } => {}

            ProviderEvent::UserTranscriptDelta {
                text,
                is_final,
                confidence,
            } => {
                if *is_final {
                    // Final transcripts carry the complete utterance, which
                    // supersedes any buffered fragments.
                    inner.buffer.user_text.clear();
                    self.transcript.append(
                        ItemDraft::new(ItemKind::UserSpeech, text.clone())
                            .from_provider(self.provider)
                            .with_metadata(ItemMetadata {
                                confidence: *confidence,
                                ..ItemMetadata::default()
                            }),
                    );
                    inner.state = TurnState::Processing;
                } else {
                    inner.buffer.user_text.push_str(text);
                    inner.state = TurnState::Listening;
                }
            }

            ProviderEvent::ResponseStarted => {
                inner.buffer.start_response();
                inner.state = TurnState::Speaking;
            }

            ProviderEvent::ResponseDelta { text } => {
                inner.buffer.assistant_text.push_str(text);
                if inner.state != TurnState::Speaking {
                    inner.buffer.started_at.get_or_insert_with(chrono::Utc::now);
                    inner.state = TurnState::Speaking;
                }
            }

            ProviderEvent::ResponseCompleted { full_text } => {
                let content = full_text
                    .clone()
                    .unwrap_or_else(|| std::mem::take(&mut inner.buffer.assistant_text));
                if !content.is_empty() {
                    let metadata = ItemMetadata {
                        duration_ms: inner.buffer.response_ms(),
                        ..ItemMetadata::default()
                    };
                    self.transcript.append(
                        ItemDraft::new(ItemKind::AiResponse, content)
                            .from_provider(self.provider)
                            .with_metadata(metadata),
                    );
                }
                inner.buffer = TurnBuffer::default();
                inner.state = TurnState::Idle;
            }

            ProviderEvent::Interrupted => {
                if inner.state == TurnState::Speaking {
                    inner.state = TurnState::Interrupted;
                    // Barge-in: the user is speaking again.
                    self.finalize_partial(&mut inner, TurnState::Listening);
                }
            }

            ProviderEvent::Closed { .. } => {
                self.finalize_partial(&mut inner, TurnState::Idle);
            }

            ProviderEvent::Error { message, fatal } => {
                self.transcript.append(
                    ItemDraft::new(ItemKind::Error, message.clone())
                        .from_provider(self.provider),
                );
                if *fatal {
                    self.finalize_partial(&mut inner, TurnState::Idle);
                }
            }

            // Audio routing and tool dispatch live outside the turn machine.
            ProviderEvent::AudioChunk { .. } | ProviderEvent::ToolCallRequested { .. } => {}
        }
    }
}
