//! Transport Traits
//!
//! Core trait definitions for provider delivery channels.
//!
//! A [`TransportChannel`] is the raw delivery mechanism a provider adapter
//! runs over. Three variants exist:
//! - `Http`: strict request/response (control-plane calls, token issuance)
//! - `Duplex`: persistent bidirectional socket (realtime voice protocols)
//! - `Media`: peer-to-peer media channel (signaling handshake + media stream)
//!
//! Adapters own the protocol; channels only move frames.

use std::fmt;

use async_trait::async_trait;

/// Unique identifier for an established channel
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Generate a new unique channel ID using a cryptographically random 128-bit value
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(format!("chan_{}", hex::encode(bytes)))
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The delivery mechanism variant a channel implements
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Strict request/response over HTTP
    Http,
    /// Persistent duplex socket
    Duplex,
    /// Peer-to-peer media channel (signaling + media stream)
    Media,
    /// In-process loopback pair (embedded mode and tests)
    Loopback,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Duplex => write!(f, "duplex"),
            Self::Media => write!(f, "media"),
            Self::Loopback => write!(f, "loopback"),
        }
    }
}

/// A single unit of transport traffic
///
/// Text frames carry protocol JSON; binary frames carry audio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportFrame {
    /// UTF-8 text payload (protocol messages)
    Text(String),
    /// Raw binary payload (audio chunks)
    Binary(Vec<u8>),
}

impl TransportFrame {
    /// Serialize a value into a text frame
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Serialization` if the value cannot be encoded.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, TransportError> {
        let text = serde_json::to_string(value)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        Ok(Self::Text(text))
    }

    /// Borrow the text payload, if this is a text frame
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

/// Errors that can occur during transport operations
#[derive(Debug)]
pub enum TransportError {
    /// Connection to peer failed
    ConnectFailed(String),
    /// Channel was closed
    Closed,
    /// Failed to send a frame
    SendFailed(String),
    /// Failed to receive a frame
    ReceiveFailed(String),
    /// Frame serialization/deserialization error
    Serialization(String),
    /// Signaling or authentication handshake failed
    Handshake(String),
    /// Channel not in expected state
    InvalidState(String),
    /// Operation exceeded its deadline
    Timeout(String),
    /// IO error from underlying transport
    Io(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(msg) => write!(f, "Connect failed: {msg}"),
            Self::Closed => write!(f, "Channel closed"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::ReceiveFailed(msg) => write!(f, "Receive failed: {msg}"),
            Self::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            Self::Handshake(msg) => write!(f, "Handshake failed: {msg}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::Timeout(msg) => write!(f, "Timed out: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// A raw delivery channel between an adapter and a provider endpoint
///
/// Implementations handle the specific delivery mechanism. `close` must be
/// idempotent and release every underlying resource (socket, background read
/// task, held device handles) so that a new channel can be opened immediately
/// afterwards without leaks.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Which delivery variant this channel implements
    fn kind(&self) -> TransportKind;

    /// Establish the channel
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Send a frame to the peer
    async fn send(&self, frame: TransportFrame) -> Result<(), TransportError>;

    /// Receive the next frame (suspends until one is available)
    async fn recv(&mut self) -> Result<TransportFrame, TransportError>;

    /// Close the channel and release all resources (idempotent)
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the channel is currently open
    fn is_open(&self) -> bool;
}
