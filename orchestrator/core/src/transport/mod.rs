//! Transport Layer for Provider Delivery
//!
//! Provides abstraction over the three delivery mechanisms providers run
//! over, plus an in-process loopback for tests:
//! - `HttpChannel`: strict request/response (control plane)
//! - `DuplexSocket`: persistent bidirectional socket (realtime protocols)
//! - `MediaChannel`: signaling handshake + peer media stream
//! - `LoopbackChannel`: cross-wired in-process pair
//!
//! # Design Philosophy
//!
//! The transport layer separates the delivery mechanism from adapter and
//! orchestration logic. Adapters speak their vendor protocol in frames; the
//! connection manager opens and closes channels without knowing the protocol.

pub mod duplex;
pub mod http;
pub mod loopback;
pub mod media;
pub mod traits;

// Re-exports for convenience
pub use duplex::DuplexSocket;
pub use http::HttpChannel;
pub use loopback::LoopbackChannel;
pub use media::MediaChannel;
pub use traits::{ChannelId, TransportChannel, TransportError, TransportFrame, TransportKind};
