//! Event Streams
//!
//! The two event vocabularies flowing through the orchestration layer:
//!
//! - [`ProviderEvent`]: emitted by a provider adapter translating its vendor
//!   protocol. The agent's event pump is the single consumer.
//! - [`ConnectionEvent`]: emitted by the connection manager on every
//!   connection-state transition, broadcast to any number of subscribers.
//!
//! # Design Philosophy
//!
//! The original callback-registration style is preserved as explicit
//! stream/subscription abstractions: adapters hand back an mpsc receiver on
//! connect, connection transitions go through a broadcast channel, and
//! unsubscription is dropping the receiver, so teardown is tied to session
//! teardown, not to ad hoc callback bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;
use crate::tools::ToolCall;

/// Unique identifier for a client session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(format!("sess_{}", hex::encode(bytes)))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Negotiated audio encoding for a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// 16-bit linear PCM at the given sample rate
    Pcm16 {
        /// Samples per second
        sample_rate: u32,
    },
    /// 8kHz mu-law (telephony fallback)
    Ulaw8k,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Pcm16 { sample_rate: 24_000 }
    }
}

/// Events emitted by a provider adapter
///
/// Adapters translate their vendor protocol into this vocabulary; the
/// orchestration layer never sees vendor wire formats.
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    /// Session is configured and the provider is ready for input
    Ready {
        /// Provider-side session label, if the vendor exposes one
        provider_session: Option<String>,
    },

    /// Incremental transcription of the user's speech
    UserTranscriptDelta {
        /// Transcribed text fragment (or full utterance when `is_final`)
        text: String,
        /// Whether this completes the utterance
        is_final: bool,
        /// Transcription confidence, when reported
        confidence: Option<f32>,
    },

    /// The provider started producing a response
    ResponseStarted,

    /// Incremental response text
    ResponseDelta {
        /// The text fragment
        text: String,
    },

    /// The response completed normally
    ResponseCompleted {
        /// Full response text when the vendor sends a final form
        /// (may differ from concatenated deltas)
        full_text: Option<String>,
    },

    /// A chunk of response audio
    AudioChunk {
        /// Raw audio bytes in the negotiated format
        data: Vec<u8>,
        /// Encoding of `data`
        format: AudioFormat,
    },

    /// The provider requests a tool invocation
    ToolCallRequested {
        /// The requested call
        call: ToolCall,
    },

    /// Barge-in: the user started speaking over the response
    Interrupted,

    /// Orderly end of the provider session
    Closed {
        /// Vendor-reported reason, if any
        reason: Option<String>,
    },

    /// Provider-side error
    Error {
        /// Human-readable description
        message: String,
        /// Whether the session is unusable after this error
        fatal: bool,
    },
}

impl ProviderEvent {
    /// Whether this event ends the provider session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed { .. } | Self::Error { fatal: true, .. }
        )
    }
}

/// Kind of connection-state transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEventKind {
    /// Dial started
    Connecting,
    /// Connection established
    Connected,
    /// Connection released (orderly)
    Disconnected,
    /// Automatic reconnect attempt in progress
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Reconnect ceiling exceeded; manual retry required
    Failed,
}

/// A connection-state transition, observable by subscribers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// What happened
    pub kind: ConnectionEventKind,
    /// Provider the transition concerns
    pub provider: ProviderKind,
    /// Error description for `Failed` and failed attempts
    pub error: Option<String>,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

impl ConnectionEvent {
    /// Create an event stamped now
    #[must_use]
    pub fn now(kind: ConnectionEventKind, provider: ProviderKind, error: Option<String>) -> Self {
        Self {
            kind,
            provider,
            error,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_terminal_events() {
        assert!(ProviderEvent::Closed { reason: None }.is_terminal());
        assert!(ProviderEvent::Error {
            message: "boom".into(),
            fatal: true
        }
        .is_terminal());
        assert!(!ProviderEvent::Error {
            message: "transient".into(),
            fatal: false
        }
        .is_terminal());
        assert!(!ProviderEvent::ResponseStarted.is_terminal());
    }

    #[test]
    fn test_default_audio_format() {
        assert_eq!(
            AudioFormat::default(),
            AudioFormat::Pcm16 { sample_rate: 24_000 }
        );
    }
}
