//! Transcript Store
//!
//! Append-only, strictly ordered log of conversation items, safely written
//! by concurrent producers (network events, tool completions, user input).
//!
//! # Ordering
//!
//! The ordering key is a sequence number assigned by the store itself at
//! append time, under the store's single lock. Producer wall-clock
//! timestamps race across event sources and are recorded for display only.
//! Once appended, an item's position never changes: no reordering, no
//! in-place edits. Items arrive fully formed: an interrupted response is
//! appended once, already carrying its `interrupted` metadata.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::provider::ProviderKind;

/// Capacity of the live-subscriber broadcast queue
const SUBSCRIBE_CAPACITY: usize = 256;

/// What kind of conversation item this is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Transcribed user speech or typed user input
    UserSpeech,
    /// Assistant response (full or partial-interrupted)
    AiResponse,
    /// A tool invocation requested by the provider
    ToolCall,
    /// The matched result of a tool invocation
    ToolResult,
    /// Orchestration-layer notice (session start, provider switch)
    SystemMessage,
    /// Non-fatal error surfaced into the conversation
    Error,
}

impl ItemKind {
    /// Stable string tag used by the export surface
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserSpeech => "user_speech",
            Self::AiResponse => "ai_response",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::SystemMessage => "system_message",
            Self::Error => "error",
        }
    }
}

/// Optional metadata attached to a transcript item
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemMetadata {
    /// Transcription confidence (user speech)
    pub confidence: Option<f32>,
    /// Response duration in milliseconds (assistant items)
    pub duration_ms: Option<u64>,
    /// True when a response was cut off by barge-in or teardown
    pub interrupted: bool,
    /// Tool name (tool_call / tool_result items)
    pub tool_name: Option<String>,
    /// Tool arguments as sent by the provider
    pub tool_args: Option<serde_json::Value>,
    /// Tool result payload or error description
    pub tool_result: Option<serde_json::Value>,
    /// Error kind tag for tool_result and error items
    pub error_kind: Option<String>,
    /// Reference to captured response audio, if any
    pub audio_ref: Option<String>,
}

/// An immutable conversation record
///
/// Created when an adapter emits an event or a tool completes; never mutated
/// after append.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptItem {
    /// Store-assigned ordering key (strictly increasing, gap-free)
    pub seq: u64,
    /// Unique item id
    pub id: Uuid,
    /// Item kind
    pub kind: ItemKind,
    /// Text content (or a short description for tool/system items)
    pub content: String,
    /// Wall-clock creation time (display only; not the ordering key)
    pub timestamp: DateTime<Utc>,
    /// Provider that produced the item, when one did
    pub provider: Option<ProviderKind>,
    /// Optional metadata
    pub metadata: ItemMetadata,
}

/// A fully formed item awaiting its sequence number
#[derive(Clone, Debug)]
pub struct ItemDraft {
    /// Item kind
    pub kind: ItemKind,
    /// Text content
    pub content: String,
    /// Producing provider, if any
    pub provider: Option<ProviderKind>,
    /// Optional metadata
    pub metadata: ItemMetadata,
}

impl ItemDraft {
    /// Create a draft with empty metadata
    #[must_use]
    pub fn new(kind: ItemKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            provider: None,
            metadata: ItemMetadata::default(),
        }
    }

    /// Attach the producing provider
    #[must_use]
    pub fn from_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

struct Inner {
    items: Vec<TranscriptItem>,
    next_seq: u64,
}

/// Append-only ordered log of conversation items
///
/// Safe under concurrent producers: sequence assignment and insertion happen
/// atomically under one lock, and `append` never blocks on anything but that
/// lock. Live consumers subscribe to a broadcast of newly appended items.
pub struct TranscriptStore {
    inner: Mutex<Inner>,
    live: broadcast::Sender<TranscriptItem>,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(SUBSCRIBE_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                next_seq: 0,
            }),
            live,
        }
    }

    /// Append an item, assigning the next sequence number
    ///
    /// Returns the assigned sequence number.
    pub fn append(&self, draft: ItemDraft) -> u64 {
        let item = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let item = TranscriptItem {
                seq,
                id: Uuid::new_v4(),
                kind: draft.kind,
                content: draft.content,
                timestamp: Utc::now(),
                provider: draft.provider,
                metadata: draft.metadata,
            };
            inner.items.push(item.clone());
            item
        };

        // Lagging or absent subscribers are not the producer's problem.
        let seq = item.seq;
        let _ = self.live.send(item);
        seq
    }

    /// All items in sequence order
    #[must_use]
    pub fn read_all(&self) -> Vec<TranscriptItem> {
        self.inner.lock().items.clone()
    }

    /// Number of items appended so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to newly appended items (live UI consumption)
    ///
    /// Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptItem> {
        self.live.subscribe()
    }

    /// Items of a given kind, in sequence order
    #[must_use]
    pub fn items_of_kind(&self, kind: ItemKind) -> Vec<TranscriptItem> {
        self.inner
            .lock()
            .items
            .iter()
            .filter(|i| i.kind == kind)
            .cloned()
            .collect()
    }
}
