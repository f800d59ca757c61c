//! Conversation Debug Recorder
//!
//! A bounded in-memory ring of per-exchange snapshots for the admin debug
//! surface. Recording sits on the conversation path, so it is O(1), never
//! blocks, and never fails; when the ring is full the oldest snapshot is
//! evicted.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::SessionId;

/// Hard ceiling on retained snapshots
pub const MAX_SNAPSHOTS: usize = 50;

/// What the provider produced for one exchange
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// Response text as assembled from the event stream
    Response(String),
    /// Error description when the exchange failed
    Error(String),
}

/// One recorded exchange: what went in, what came out
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationDebugSnapshot {
    /// Session the exchange belongs to
    pub session_id: SessionId,
    /// When the snapshot was recorded
    pub timestamp: DateTime<Utc>,
    /// User input that started the exchange
    pub input: String,
    /// System prompt in effect
    pub system_prompt: String,
    /// Context string injected into the prompt, if any
    pub context_string: Option<String>,
    /// Vendor-shaped request summary, when the adapter exposes one
    pub provider_request: Option<serde_json::Value>,
    /// How the exchange ended
    pub outcome: ExchangeOutcome,
}

impl ConversationDebugSnapshot {
    /// Create a snapshot stamped now
    #[must_use]
    pub fn now(
        session_id: SessionId,
        input: impl Into<String>,
        system_prompt: impl Into<String>,
        outcome: ExchangeOutcome,
    ) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            input: input.into(),
            system_prompt: system_prompt.into(),
            context_string: None,
            provider_request: None,
            outcome,
        }
    }
}

/// Bounded FIFO ring of debug snapshots
pub struct DebugRecorder {
    ring: Mutex<VecDeque<ConversationDebugSnapshot>>,
    capacity: usize,
}

impl Default for DebugRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugRecorder {
    /// Create a recorder at the maximum capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_SNAPSHOTS)
    }

    /// Create a recorder with a smaller ring
    ///
    /// Capacities above [`MAX_SNAPSHOTS`] are clamped down.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_SNAPSHOTS);
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a snapshot, evicting the oldest when full
    pub fn record(&self, snapshot: ConversationDebugSnapshot) {
        let mut ring = self.ring.lock();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(snapshot);
    }

    /// The most recent snapshot, if any
    #[must_use]
    pub fn last(&self) -> Option<ConversationDebugSnapshot> {
        self.ring.lock().back().cloned()
    }

    /// All retained snapshots for a session, oldest first
    #[must_use]
    pub fn by_session(&self, id: &SessionId) -> Vec<ConversationDebugSnapshot> {
        self.ring
            .lock()
            .iter()
            .filter(|s| s.session_id == *id)
            .cloned()
            .collect()
    }

    /// Distinct session ids with retained snapshots, most recent first
    #[must_use]
    pub fn recent_sessions(&self, limit: usize) -> Vec<SessionId> {
        let ring = self.ring.lock();
        let mut seen: Vec<SessionId> = Vec::new();
        for snapshot in ring.iter().rev() {
            if !seen.contains(&snapshot.session_id) {
                seen.push(snapshot.session_id.clone());
                if seen.len() == limit {
                    break;
                }
            }
        }
        seen
    }

    /// Number of retained snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    /// Whether the ring is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Drop every retained snapshot
    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}
