//! Tool Registry
//!
//! The single source of truth for the tools a provider may call. The
//! connection manager reads the full definition list when configuring an
//! adapter, so client and server tool sets stay in sync with no duplication.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Where a tool executes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    /// Executes directly against the UI (navigation, highlighting, scrolling).
    ///
    /// Client-side handlers must be idempotent: providers may retry a call
    /// when no timely acknowledgement is seen.
    ClientUi,
    /// Invokes a server-side collaborator (content lookup, form submission)
    ServerApi,
}

/// A registered tool's public definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
    /// Where the tool executes
    pub capability: ToolCapability,
    /// Whether calls run without explicit user approval
    pub auto_approve: bool,
}

/// Executes one registered tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the given arguments
    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// A definition bound to its handler
#[derive(Clone)]
pub struct ToolBinding {
    /// Public definition
    pub definition: ToolDefinition,
    /// The executing handler
    pub handler: Arc<dyn ToolHandler>,
}

/// Registry of all callable tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolBinding>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous binding under the same name
    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(
            definition.name.clone(),
            ToolBinding {
                definition,
                handler,
            },
        );
    }

    /// Look up a binding by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolBinding> {
        self.tools.get(name)
    }

    /// The full definition list, sorted by name, for provider configuration
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|b| b.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Handler wrapping a plain async-compatible closure
///
/// Convenience for UI-side tools and tests; server-api tools usually get
/// their own handler struct holding collaborator references.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Result<serde_json::Value, ToolError> + Send + Sync,
{
    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        (self.0)(arguments)
    }
}
