//! Provider Adapters
//!
//! Each supported vendor family gets one adapter implementing
//! [`ProviderAdapter`]. Adapters own their vendor protocol end to end:
//! authentication, transport choice, wire format, and translation into the
//! shared [`ProviderEvent`](crate::events::ProviderEvent) vocabulary. Nothing
//! vendor-specific leaks past this module.

pub mod agent_platform;
pub mod mock;
pub mod realtime;
pub mod traits;

pub use agent_platform::{AgentPlatformAdapter, AgentPlatformConfig};
pub use mock::{MockAdapter, MockController};
pub use realtime::{RealtimeConfig, RealtimeVoiceAdapter};
pub use traits::{ProviderAdapter, ProviderKind, SessionDirectives, UserInput};
