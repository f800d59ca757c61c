//! Provider Adapter Traits
//!
//! Trait definitions for conversational-AI providers. Each vendor's
//! protocol (token and signed-URL issuance, agent configuration, audio
//! codec negotiation) is mapped onto one uniform capability interface, so
//! the orchestration layer never branches on provider identity except to
//! select the adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ConnectionError;
use crate::events::{AudioFormat, ProviderEvent};
use crate::tools::{ToolDefinition, ToolResult};

/// Provider family identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Realtime speech-to-speech provider (duplex socket protocol)
    RealtimeVoice,
    /// Conversational-agent platform (signed URL + media channel)
    AgentPlatform,
    /// Scripted in-process provider for tests and embedded demos
    Mock,
}

impl ProviderKind {
    /// Stable string tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RealtimeVoice => "realtime_voice",
            Self::AgentPlatform => "agent_platform",
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a provider needs to configure one session
///
/// Built once per connection or agent (re)configuration from the context
/// collaborator and the tool registry, not per turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionDirectives {
    /// System prompt for the assistant persona
    pub system_prompt: String,
    /// Opening line the assistant speaks on connect, if any
    pub first_message: Option<String>,
    /// BCP-47 language tag, when pinned
    pub language: Option<String>,
    /// Weighted content-context string injected alongside the prompt
    pub context: Option<String>,
    /// Full tool definition list (client and server tools)
    pub tools: Vec<ToolDefinition>,
    /// Voice identifier, for voice-capable providers
    pub voice: Option<String>,
    /// Negotiated audio encoding
    pub audio_format: AudioFormat,
}

/// One unit of user input submitted to the provider
#[derive(Clone, Debug)]
pub enum UserInput {
    /// Typed text
    Text(String),
    /// A chunk of captured microphone audio
    AudioChunk(Vec<u8>),
    /// Commit the buffered audio as a complete utterance
    AudioCommit,
}

/// Uniform capability interface over one vendor's connection protocol
///
/// `connect` hands back the adapter's event stream; dropping that receiver
/// (or calling `disconnect`) ends translation. `send_input` resolves once
/// the provider has acknowledged receipt, not when the response completes;
/// responses stream asynchronously as [`ProviderEvent`]s.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider family this adapter speaks for
    fn kind(&self) -> ProviderKind;

    /// Human-readable adapter name for logs
    fn name(&self) -> &str;

    /// Establish the session and start translating vendor events
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the control-plane handshake, channel
    /// open, or session configuration fails.
    async fn connect(
        &mut self,
        directives: SessionDirectives,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError>;

    /// Send user input (acknowledged send)
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] without a live session, or a
    /// transport error if delivery fails.
    async fn send_input(&self, input: UserInput) -> Result<(), ConnectionError>;

    /// Return a completed tool result to the provider
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::send_input`].
    async fn send_tool_result(&self, result: &ToolResult) -> Result<(), ConnectionError>;

    /// Ask the provider to stop the in-flight response (barge-in / cancel)
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::send_input`].
    async fn interrupt(&self) -> Result<(), ConnectionError>;

    /// Tear the session down and release the channel (idempotent, never fails)
    async fn disconnect(&mut self);

    /// Whether a live session exists
    fn is_connected(&self) -> bool;
}
