//! `posts-open-browser` tool: opens a configured page in the host's web browser.
//!
//! Each platform opener is tried in order until one exits successfully.
//! When none succeeds the tool still answers normally, with a hint asking
//! the user to open the URL by hand.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::error::Result;
use crate::mcp::types::{CallToolResponse, McpTool};
use crate::tools::McpToolHandler;

pub const OPEN_BROWSER_TOOL_NAME: &str = "posts-open-browser";

/// A program plus leading arguments; the URL is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opener {
    pub program: String,
    pub args: Vec<String>,
}

impl Opener {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Linux, macOS, then Windows.
pub fn default_openers() -> Vec<Opener> {
    vec![
        Opener::new("xdg-open", &[]),
        Opener::new("open", &[]),
        Opener::new("cmd", &["/C", "start", ""]),
    ]
}

/// Opens `url` in a browser on the machine running the relay.
#[derive(Debug, Clone)]
pub struct OpenBrowserTool {
    url: String,
    openers: Vec<Opener>,
}

impl OpenBrowserTool {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            openers: default_openers(),
        }
    }

    /// Replace the opener candidates.
    pub fn with_openers(mut self, openers: Vec<Opener>) -> Self {
        self.openers = openers;
        self
    }

    async fn launch(&self) -> Option<&Opener> {
        for opener in &self.openers {
            let status = Command::new(&opener.program)
                .args(&opener.args)
                .arg(&self.url)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            match status {
                Ok(status) if status.success() => return Some(opener),
                Ok(status) => {
                    tracing::debug!(program = %opener.program, %status, "browser opener failed")
                }
                Err(e) => {
                    tracing::debug!(program = %opener.program, error = %e, "browser opener unavailable")
                }
            }
        }
        None
    }
}

#[async_trait]
impl McpToolHandler for OpenBrowserTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: OPEN_BROWSER_TOOL_NAME.to_string(),
            description: Some(format!(
                "Open {} in the web browser of the machine running the server",
                self.url
            )),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<CallToolResponse> {
        match self.launch().await {
            Some(opener) => {
                tracing::info!(url = %self.url, program = %opener.program, "opened browser");
                Ok(CallToolResponse::text(format!(
                    "Opened {} in the browser.",
                    self.url
                )))
            }
            None => {
                tracing::warn!(url = %self.url, "no browser opener succeeded");
                Ok(CallToolResponse::text(format!(
                    "Could not open a browser automatically. Please open this URL manually: {}",
                    self.url
                )))
            }
        }
    }
}
