//! Tools exposed through `tools/list` and `tools/call`
//!
//! This module contains the tool handler trait, the tool registry, and the
//! built-in tool implementations.

pub mod azure_devops;
pub mod echo;
pub mod open_browser;

use crate::config::ToolsConfig;
use crate::error::Result;
use crate::mcp::types::{CallToolResponse, McpTool};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Tool handler trait for implementing tool execution logic
///
/// Each tool provides its own definition and executes calls with the raw
/// JSON arguments sent by the client.
///
/// # Examples
///
/// ```no_run
/// use mcp_relay::tools::McpToolHandler;
/// use mcp_relay::mcp::types::{CallToolResponse, McpTool};
/// use mcp_relay::error::Result;
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl McpToolHandler for MyTool {
///     fn definition(&self) -> McpTool {
///         McpTool {
///             name: "my_tool".to_string(),
///             description: Some("Does something useful".to_string()),
///             input_schema: serde_json::json!({"type": "object", "properties": {}}),
///         }
///     }
///
///     async fn call(&self, _arguments: Value) -> Result<CallToolResponse> {
///         Ok(CallToolResponse::text("done"))
///     }
/// }
/// ```
#[async_trait]
pub trait McpToolHandler: Send + Sync {
    /// Returns the tool definition advertised by `tools/list`
    fn definition(&self) -> McpTool;

    /// Executes the tool with the given arguments
    ///
    /// # Errors
    ///
    /// Returns error if execution fails. The dispatcher reports the error
    /// to the client as a tool result with `isError: true`.
    async fn call(&self, arguments: serde_json::Value) -> Result<CallToolResponse>;
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn McpToolHandler>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in tools enabled by `config`
    ///
    /// `echo` is always registered; `posts-open-browser` only when a
    /// browser URL is configured, and `azure-devops-tool` only when an
    /// Azure DevOps organization is configured.
    pub fn with_builtin_tools(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(echo::EchoTool));
        if let Some(url) = config.browser_url.as_deref() {
            registry.register(Arc::new(open_browser::OpenBrowserTool::new(url)));
        }
        if let Some(azure) = config.azure_devops.as_ref() {
            match azure_devops::AzureDevOpsTool::from_config(azure) {
                Ok(tool) => registry.register(Arc::new(tool)),
                Err(e) => tracing::error!(error = %e, "azure-devops-tool disabled"),
            }
        }
        registry
    }

    /// Register a tool under the name from its definition
    ///
    /// A tool registered under an existing name replaces the previous one.
    pub fn register(&mut self, handler: Arc<dyn McpToolHandler>) {
        let name = handler.definition().name;
        self.tools.insert(name, handler);
    }

    /// Get a tool handler by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn McpToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// All tool definitions, sorted by name
    pub fn definitions(&self) -> Vec<McpTool> {
        let mut definitions: Vec<McpTool> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
