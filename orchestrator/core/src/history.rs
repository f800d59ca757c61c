//! External Collaborators
//!
//! Seams to the systems around the orchestration layer. Conversation storage
//! and prompt construction are someone else's job; the agent consumes them
//! at fixed points only (history at session start/end, prompt building once
//! per (re)configuration), so both sit behind traits and the daemon decides
//! what stands behind them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::events::SessionId;
use crate::transcript::TranscriptItem;

// ============================================================================
// Conversation History
// ============================================================================

/// A stored conversation: the finalized transcript of one session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    /// Session the transcript came from
    pub session_id: SessionId,
    /// When the conversation was stored
    pub stored_at: DateTime<Utc>,
    /// The finalized transcript, in sequence order
    pub items: Vec<TranscriptItem>,
}

/// Durable storage for finished conversations
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    /// Store a finished conversation
    ///
    /// # Errors
    ///
    /// [`AgentError::History`] when the store rejects the write.
    async fn create_conversation(&self, conversation: Conversation) -> Result<(), AgentError>;

    /// Fetch the stored conversation for a session, if one exists
    ///
    /// # Errors
    ///
    /// [`AgentError::History`] when the store cannot be read.
    async fn get_by_session(&self, id: &SessionId) -> Result<Option<Conversation>, AgentError>;

    /// Delete a stored conversation; absent ids are not errors
    ///
    /// # Errors
    ///
    /// [`AgentError::History`] when the store rejects the delete.
    async fn delete_conversation(&self, id: &SessionId) -> Result<(), AgentError>;
}

/// In-memory history used by the daemon and tests
#[derive(Default)]
pub struct MemoryHistory {
    conversations: RwLock<HashMap<SessionId, Conversation>>,
}

impl MemoryHistory {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.read().is_empty()
    }
}

#[async_trait]
impl ConversationHistory for MemoryHistory {
    async fn create_conversation(&self, conversation: Conversation) -> Result<(), AgentError> {
        self.conversations
            .write()
            .insert(conversation.session_id.clone(), conversation);
        Ok(())
    }

    async fn get_by_session(&self, id: &SessionId) -> Result<Option<Conversation>, AgentError> {
        Ok(self.conversations.read().get(id).cloned())
    }

    async fn delete_conversation(&self, id: &SessionId) -> Result<(), AgentError> {
        self.conversations.write().remove(id);
        Ok(())
    }
}

// ============================================================================
// Prompt Construction
// ============================================================================

/// Why a prompt is being built
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptPurpose {
    /// First configuration of a new session
    SessionStart,
    /// Re-configuration after a provider switch or reconnect
    Reconfigure,
}

/// Everything a provider needs to open a session on-message
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PromptBundle {
    /// System prompt for the provider
    pub system_prompt: String,
    /// Greeting the assistant opens with, if any
    pub first_message: Option<String>,
    /// BCP 47 language tag, if pinned
    pub language: Option<String>,
    /// Visitor/site context injected into the prompt
    pub context_string: Option<String>,
}

/// Builder of per-session prompts
///
/// `reflink` is the referral token from the visitor's URL, when present; it
/// selects visitor-specific context.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Build the prompt bundle for a session
    ///
    /// # Errors
    ///
    /// [`AgentError::Session`] when the source cannot produce a prompt.
    async fn build_prompt(
        &self,
        session: &SessionId,
        reflink: Option<&str>,
        purpose: PromptPurpose,
    ) -> Result<PromptBundle, AgentError>;
}

/// Fixed-prompt source for tests and minimal deployments
pub struct StaticContext {
    bundle: PromptBundle,
}

impl StaticContext {
    /// Create a source that always returns the given bundle
    #[must_use]
    pub fn new(bundle: PromptBundle) -> Self {
        Self { bundle }
    }
}

#[async_trait]
impl ContextSource for StaticContext {
    async fn build_prompt(
        &self,
        _session: &SessionId,
        _reflink: Option<&str>,
        _purpose: PromptPurpose,
    ) -> Result<PromptBundle, AgentError> {
        Ok(self.bundle.clone())
    }
}
