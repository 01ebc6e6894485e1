//! Protocol dispatch: one serialized MCP message in, one response value out
//!
//! The HTTP layer never looks inside a message. It hands the raw payload to
//! a [`Dispatcher`] and relays whatever comes back, errors included. A
//! dispatcher returns `None` when the message requires no response
//! (notifications, or a batch made only of notifications).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::RelayError;
use crate::mcp::types::{
    CallToolParams, CallToolResponse, Implementation, InitializeParams, InitializeResponse,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResponse, ServerCapabilities,
    LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_PING, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::tools::ToolRegistry;

/// Decodes and executes one protocol message.
///
/// Implementations must be cheap to share: the router holds one instance
/// behind an `Arc` and calls it concurrently from every request task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Handle one serialized message.
    ///
    /// Failures are expressed inside the returned payload (JSON-RPC error
    /// objects); the caller relays them unchanged.
    async fn dispatch(&self, message: &str) -> Option<Value>;
}

/// Default dispatcher implementing the MCP server lifecycle and tools.
pub struct McpDispatcher {
    server_info: Implementation,
    instructions: Option<String>,
    tools: Arc<ToolRegistry>,
}

impl McpDispatcher {
    pub fn new(server_info: Implementation, tools: Arc<ToolRegistry>) -> Self {
        Self {
            server_info,
            instructions: None,
            tools,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Build the dispatcher and its built-in tools from configuration.
    pub fn from_config(config: &Config) -> Self {
        let server_info = Implementation {
            name: config.mcp.name.clone(),
            version: config.mcp.version.clone(),
        };
        let tools = Arc::new(ToolRegistry::with_builtin_tools(&config.tools));
        Self::new(server_info, tools).with_instructions(config.mcp.instructions.clone())
    }

    async fn dispatch_batch(&self, items: Vec<Value>) -> Option<Value> {
        if items.is_empty() {
            return Some(
                JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::invalid_request("Empty batch"),
                )
                .into_value(),
            );
        }

        let mut responses = Vec::with_capacity(items.len());
        for item in items {
            if let Some(response) = self.dispatch_value(item).await {
                responses.push(response.into_value());
            }
        }

        if responses.is_empty() {
            None
        } else {
            Some(Value::Array(responses))
        }
    }

    async fn dispatch_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);

        // Responses from the client (e.g. to a server-initiated ping) need no reply.
        if value.get("method").is_none()
            && (value.get("result").is_some() || value.get("error").is_some())
        {
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::invalid_request(format!("Invalid Request: {}", e)),
                ))
            }
        };

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }

        let id = request.response_id();
        let outcome = match request.method.as_str() {
            METHOD_INITIALIZE => self.initialize(request.params),
            METHOD_PING => Ok(serde_json::json!({})),
            METHOD_TOOLS_LIST => self.list_tools(),
            METHOD_TOOLS_CALL => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                tracing::debug!(method = %request.method, %error, "request failed");
                JsonRpcResponse::failure(id, error)
            }
        })
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = match params {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))?,
            None => InitializeParams::default(),
        };

        let protocol_version = params
            .protocol_version
            .filter(|requested| SUPPORTED_PROTOCOL_VERSIONS.contains(&requested.as_str()))
            .unwrap_or_else(|| LATEST_PROTOCOL_VERSION.to_string());

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = %client.version,
                %protocol_version,
                "client initialized"
            );
        }

        let response = InitializeResponse {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(serde_json::json!({ "listChanged": false })),
            },
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        };
        to_result(&response)
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        to_result(&ListToolsResponse {
            tools: self.tools.definitions(),
            next_cursor: None,
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))?;

        let tool = self
            .tools
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let arguments = params
            .arguments
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let response = match tool.call(arguments).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "tool call failed");
                CallToolResponse::error_text(e.to_string())
            }
        };
        to_result(&response)
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::internal_error(RelayError::Dispatch(e.to_string()).to_string()))
}

#[async_trait]
impl Dispatcher for McpDispatcher {
    async fn dispatch(&self, message: &str) -> Option<Value> {
        let value: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable message");
                return Some(
                    JsonRpcResponse::failure(Value::Null, JsonRpcError::parse_error(e.to_string()))
                        .into_value(),
                );
            }
        };

        match value {
            Value::Array(items) => self.dispatch_batch(items).await,
            Value::Object(_) => self
                .dispatch_value(value)
                .await
                .map(JsonRpcResponse::into_value),
            _ => Some(
                JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::invalid_request("Invalid Request: expected an object"),
                )
                .into_value(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::types::{
        INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
        PROTOCOL_VERSION_2024_11_05,
    };
    use serde_json::json;

    fn dispatcher() -> McpDispatcher {
        McpDispatcher::from_config(&Config::default())
    }

    #[tokio::test]
    async fn test_ping_returns_empty_result() {
        let reply = dispatcher()
            .dispatch(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 7, "result": {}}));
    }

    #[tokio::test]
    async fn test_request_without_id_is_answered_with_null_id() {
        let reply = dispatcher().dispatch(r#"{"method":"ping"}"#).await.unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let reply = dispatcher()
            .dispatch(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_client_response_is_ignored() {
        let reply = dispatcher()
            .dispatch(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let reply = dispatcher().dispatch("{not json").await.unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_non_object_is_invalid_request() {
        let reply = dispatcher().dispatch("42").await.unwrap();
        assert_eq!(reply["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_method_is_invalid_request() {
        let reply = dispatcher().dispatch(r#"{"id":5}"#).await.unwrap();
        assert_eq!(reply["id"], 5);
        assert_eq!(reply["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let reply = dispatcher()
            .dispatch(r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(reply["error"]["message"], "Method not found: resources/list");
    }

    #[tokio::test]
    async fn test_initialize_negotiates_supported_version() {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION_2024_11_05,
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            }
        })
        .to_string();
        let reply = dispatcher().dispatch(&message).await.unwrap();
        assert_eq!(reply["result"]["protocolVersion"], PROTOCOL_VERSION_2024_11_05);
        assert_eq!(reply["result"]["serverInfo"]["name"], "mcp_relay");
        assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_latest_version() {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "1999-01-01"}
        })
        .to_string();
        let reply = dispatcher().dispatch(&message).await.unwrap();
        assert_eq!(reply["result"]["protocolVersion"], LATEST_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_initialize_includes_instructions() {
        let mut config = Config::default();
        config.mcp.instructions = Some("Use echo to test".to_string());
        let reply = McpDispatcher::from_config(&config)
            .dispatch(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .await
            .unwrap();
        assert_eq!(reply["result"]["instructions"], "Use echo to test");
    }

    #[tokio::test]
    async fn test_tools_list() {
        let reply = dispatcher()
            .dispatch(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = reply["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call_echo() {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"message": "hi"}}
        })
        .to_string();
        let reply = dispatcher().dispatch(&message).await.unwrap();
        assert_eq!(reply["result"]["content"][0]["text"], "hi");
        assert_eq!(reply["result"]["isError"], false);
    }

    #[tokio::test]
    async fn test_tools_call_failure_is_tool_error() {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {}}
        })
        .to_string();
        let reply = dispatcher().dispatch(&message).await.unwrap();
        assert_eq!(reply["result"]["isError"], true);
        assert!(reply.get("error").is_none());
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool() {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": {"name": "nope"}
        })
        .to_string();
        let reply = dispatcher().dispatch(&message).await.unwrap();
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);
        assert_eq!(reply["error"]["message"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_tools_call_missing_params() {
        let reply = dispatcher()
            .dispatch(r#"{"jsonrpc":"2.0","id":6,"method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_batch_skips_notifications() {
        let message = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": 2, "method": "ping"}
        ])
        .to_string();
        let reply = dispatcher().dispatch(&message).await.unwrap();
        let items = reply.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], 1);
        assert_eq!(items[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_batch_of_notifications_has_no_response() {
        let message = json!([{"jsonrpc": "2.0", "method": "notifications/initialized"}]).to_string();
        assert!(dispatcher().dispatch(&message).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_batch_is_invalid() {
        let reply = dispatcher().dispatch("[]").await.unwrap();
        assert_eq!(reply["error"]["code"], INVALID_REQUEST);
    }
}
