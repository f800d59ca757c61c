//! Tool Calling
//!
//! Providers emit tool-call requests mid-conversation; the dispatcher routes
//! each to its registered handler (client-side UI actions or server-side API
//! actions) and matches results back to calls solely by id.
//!
//! - [`registry`]: tool definitions and handler bindings
//! - [`dispatcher`]: concurrent dispatch, timeouts, transcript recording

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{ResultSink, ToolDispatcher};
pub use registry::{ToolCapability, ToolDefinition, ToolHandler, ToolRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Identifier matching a tool call to its result
///
/// Providers assign call ids; results echo them verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallId(pub String);

impl ToolCallId {
    /// Generate a locally unique call id (mock/test use; vendors mint their own)
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 8] = rand::thread_rng().gen();
        Self(format!("call_{}", hex::encode(bytes)))
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ToolCallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tool invocation requested by a provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id
    pub id: ToolCallId,
    /// Registered tool name
    pub name: String,
    /// Arguments per the tool's parameter schema
    pub arguments: serde_json::Value,
    /// When the request was received
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    /// Create a call stamped now
    #[must_use]
    pub fn new(id: ToolCallId, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id,
            name: name.into(),
            arguments,
            timestamp: Utc::now(),
        }
    }
}

/// Success or error payload of a completed call
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Handler returned a structured result
    Success(serde_json::Value),
    /// Handler failed, timed out, or the tool was unknown
    Error {
        /// Stable error kind tag (see [`ToolError::kind`])
        kind: String,
        /// Human-readable description
        message: String,
    },
}

impl ToolOutcome {
    /// Build the error outcome for a [`ToolError`]
    #[must_use]
    pub fn from_error(err: &ToolError) -> Self {
        Self::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this outcome is a success
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// The matched result of a tool call
///
/// Every result's id matches exactly one outstanding call; a call unmatched
/// within the dispatch timeout yields exactly one synthetic error result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Echoed call id
    pub id: ToolCallId,
    /// Success payload or error
    pub outcome: ToolOutcome,
    /// Handler execution time in milliseconds
    pub execution_ms: u64,
    /// When the result was produced
    pub timestamp: DateTime<Utc>,
}
