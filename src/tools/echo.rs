//! `echo` tool: returns its `message` argument unchanged.

use crate::error::{RelayError, Result};
use crate::mcp::types::{CallToolResponse, McpTool};
use crate::tools::McpToolHandler;
use async_trait::async_trait;
use serde_json::Value;

pub const ECHO_TOOL_NAME: &str = "echo";

/// Echoes the `message` string argument back as a text item.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTool;

#[async_trait]
impl McpToolHandler for EchoTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: ECHO_TOOL_NAME.to_string(),
            description: Some("Echoes the given message back to the caller".to_string()),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Text to echo back"
                    }
                },
                "required": ["message"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<CallToolResponse> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Tool("missing string argument 'message'".to_string()))?;
        Ok(CallToolResponse::text(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_message() {
        let response = EchoTool
            .call(serde_json::json!({"message": "hello"}))
            .await
            .unwrap();
        assert_eq!(response, CallToolResponse::text("hello"));
    }

    #[tokio::test]
    async fn test_echo_rejects_missing_message() {
        let err = EchoTool.call(serde_json::json!({})).await.unwrap_err();
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn test_echo_definition_requires_message() {
        let definition = EchoTool.definition();
        assert_eq!(definition.name, ECHO_TOOL_NAME);
        assert_eq!(definition.input_schema["required"][0], "message");
    }
}
