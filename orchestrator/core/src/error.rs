//! Error Taxonomy
//!
//! Errors are tagged by kind, not by implementation type; each kind carries
//! its own propagation policy:
//! - [`ConnectionError`]: transport/handshake failure. Retried with backoff
//!   by the connection manager below its ceiling; surfaced once exceeded.
//! - [`AudioError`]: device acquisition/playback failure. Surfaced
//!   immediately; these usually need user permission or device changes.
//! - [`ToolError`]: handler failure or timeout. Recorded as a transcript
//!   item and returned to the provider; never session-fatal.

use thiserror::Error;

use crate::transport::TransportError;

/// Transport or handshake failure while dialing or holding a connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The underlying delivery channel failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Provider rejected the session configuration
    #[error("Provider rejected session: {0}")]
    Rejected(String),

    /// Reconnect ceiling exceeded; connection is in the error state
    #[error("Gave up after {attempts} reconnect attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made before giving up
        attempts: u32,
        /// The final underlying failure
        last_error: String,
    },

    /// Operation requires a live connection
    #[error("Not connected")]
    NotConnected,

    /// A connection already exists; use `switch_provider`
    #[error("Already connected to {0}")]
    AlreadyConnected(String),
}

/// Audio device acquisition or playback failure
#[derive(Debug, Error)]
pub enum AudioError {
    /// Microphone could not be acquired
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    /// Speaker could not be acquired
    #[error("Speaker unavailable: {0}")]
    SpeakerUnavailable(String),

    /// Devices are exclusively held by another live connection
    #[error("Audio devices already in use")]
    DeviceBusy,

    /// Playback failed mid-stream
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
}

/// Tool handler failure, optionally tagged with the failing tool's name
#[derive(Debug, Error)]
pub enum ToolError {
    /// No handler registered under this name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's parameter schema
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments {
        /// Tool that rejected the arguments
        tool: String,
        /// What was wrong with them
        message: String,
    },

    /// The handler returned an error
    #[error("Tool {tool} failed: {message}")]
    HandlerFailed {
        /// Tool whose handler failed
        tool: String,
        /// Handler's error description
        message: String,
    },

    /// The handler did not complete within the dispatch timeout
    #[error("Tool {tool} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Tool that timed out
        tool: String,
        /// Elapsed time when the timeout fired
        elapsed_ms: u64,
    },
}

impl ToolError {
    /// Stable kind tag for wire payloads and transcript metadata
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Top-level error for orchestration operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// Connection-kind failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Audio-kind failure
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Tool-kind failure
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Session lifecycle misuse (no active session, double start)
    #[error("Session error: {0}")]
    Session(String),

    /// History collaborator failure at session start/end
    #[error("History store error: {0}")]
    History(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_kinds_are_stable() {
        assert_eq!(ToolError::UnknownTool("x".into()).kind(), "unknown_tool");
        assert_eq!(
            ToolError::Timeout {
                tool: "load_context".into(),
                elapsed_ms: 5000
            }
            .kind(),
            "timeout"
        );
    }

    #[test]
    fn test_connection_error_from_transport() {
        let err: ConnectionError = TransportError::Closed.into();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_agent_error_is_transparent_for_kinds() {
        let err: AgentError = AudioError::DeviceBusy.into();
        assert_eq!(err.to_string(), "Audio devices already in use");
    }
}
