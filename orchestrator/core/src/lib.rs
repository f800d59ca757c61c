//! Parley Core - Headless Conversation Orchestration for the Portfolio Assistant
//!
//! This crate provides the orchestration layer between conversational-AI
//! providers and the surfaces that present them, completely independent of
//! any UI. It can drive a web voice widget, a CLI, or run headless for
//! testing and automation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Surfaces                                 │
//! │   ┌────────────┐   ┌──────────────┐   ┌────────────────────────┐ │
//! │   │ Voice UI   │   │  Admin HTTP  │   │     Headless tests     │ │
//! │   └─────┬──────┘   └──────┬───────┘   └───────────┬────────────┘ │
//! └─────────┼─────────────────┼───────────────────────┼──────────────┘
//!           │                 │                       │
//! ┌─────────┼─────────────────┼───────────────────────┼──────────────┐
//! │         │           PARLEY CORE                   │              │
//! │  ┌──────┴──────────────────────────────────────────────────────┐ │
//! │  │                        VoiceAgent                            │ │
//! │  │  ┌────────────┐ ┌─────────────┐ ┌──────────┐ ┌───────────┐  │ │
//! │  │  │ Connection │ │   Session   │ │   Tool   │ │   Debug   │  │ │
//! │  │  │  Manager   │ │Orchestrator │ │Dispatcher│ │ Recorder  │  │ │
//! │  │  └─────┬──────┘ └──────┬──────┘ └────┬─────┘ └───────────┘  │ │
//! │  │        │               └──────┬──────┘                      │ │
//! │  │        │                TranscriptStore                     │ │
//! │  └────────┼─────────────────────────────────────────────────────┘ │
//! │  ┌────────┴───────────────┐                                      │
//! │  │    ProviderAdapter     │   realtime voice │ agent platform    │
//! │  └────────┬───────────────┘                  │ mock              │
//! │  ┌────────┴───────────────┐                                      │
//! │  │    TransportChannel    │   http │ duplex │ media │ loopback   │
//! │  └────────────────────────┘                                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`VoiceAgent`]: The aggregate that owns everything and runs the event pump
//! - [`ProviderAdapter`]: Uniform capability interface over one vendor's protocol
//! - [`TranscriptStore`]: Append-only, strictly ordered conversation record
//! - [`ToolDispatcher`]: Tool-call execution with timeouts and id matching
//! - [`ConnectionManager`]: Single live connection, reconnect with backoff
//! - [`DebugRecorder`]: Bounded ring of per-exchange snapshots
//!
//! # Module Overview
//!
//! - [`transport`]: Delivery channels (HTTP, duplex socket, media, loopback)
//! - [`provider`]: Vendor adapters and the adapter trait
//! - [`events`]: Provider and connection event vocabularies
//! - [`connection`]: Connection lifecycle and reconnect policy
//! - [`session`]: Turn state machine and delta buffering
//! - [`transcript`]: The append-only transcript store
//! - [`tools`]: Tool registry and dispatcher
//! - [`audio`]: Exclusive audio device leasing
//! - [`debug_recorder`]: Debug snapshot ring
//! - [`agent`]: The VoiceAgent aggregate
//! - [`history`]: External collaborator seams (storage, prompt building)
//! - [`export`]: Session export (JSON Lines, CSV)
//! - [`config`]: TOML + environment configuration
//! - [`error`]: Error taxonomy
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any UI framework or on the admin
//! HTTP stack. It's pure orchestration logic that can be embedded anywhere.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod audio;
pub mod config;
pub mod connection;
pub mod debug_recorder;
pub mod error;
pub mod events;
pub mod export;
pub mod history;
pub mod provider;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod transport;

// Re-exports for convenience
pub use agent::{VoiceAgent, VoiceAgentState};
pub use audio::{AudioDeviceState, AudioDevices, AudioLease};
pub use config::{load_config, ConfigError, ConfigSource, ParleyConfig};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus, ReconnectPolicy};
pub use debug_recorder::{ConversationDebugSnapshot, DebugRecorder, ExchangeOutcome};
pub use error::{AgentError, AudioError, ConnectionError, ToolError};
pub use events::{
    AudioFormat, ConnectionEvent, ConnectionEventKind, ProviderEvent, SessionId,
};
pub use export::{ExportFormat, SessionExport};
pub use history::{
    ContextSource, Conversation, ConversationHistory, MemoryHistory, PromptBundle, PromptPurpose,
    StaticContext,
};
pub use provider::{
    AgentPlatformAdapter, AgentPlatformConfig, MockAdapter, MockController, ProviderAdapter,
    ProviderKind, RealtimeConfig, RealtimeVoiceAdapter, SessionDirectives, UserInput,
};
pub use session::{SessionOrchestrator, TurnState};
pub use tools::{
    ResultSink, ToolCall, ToolCallId, ToolCapability, ToolDefinition, ToolDispatcher,
    ToolHandler, ToolOutcome, ToolRegistry, ToolResult,
};
pub use transcript::{ItemDraft, ItemKind, ItemMetadata, TranscriptItem, TranscriptStore};
pub use transport::{
    ChannelId, DuplexSocket, HttpChannel, LoopbackChannel, MediaChannel, TransportChannel,
    TransportError, TransportFrame, TransportKind,
};
