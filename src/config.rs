//! Configuration management for the MCP relay
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::cli::{Cli, Commands};
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Main configuration structure for the relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener and streaming settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Authentication gate settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Identity advertised in `initialize` responses
    #[serde(default)]
    pub mcp: McpServerConfig,
    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Externally reachable base URL advertised in the `endpoint` event
    ///
    /// When unset, the base URL is derived from each streaming request's
    /// `Host` / `X-Forwarded-*` headers.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Seconds between keep-alive markers on an idle stream
    #[serde(default = "default_keep_alive_seconds")]
    pub keep_alive_seconds: u64,

    /// Upper bound on a POSTed message body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_keep_alive_seconds() -> u64 {
    5
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            keep_alive_seconds: default_keep_alive_seconds(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in the `Authorization` header of `/mcp` requests
    ///
    /// Unset or empty disables the check.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl AuthConfig {
    /// The configured key, ignoring blank values
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Server identity reported by `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,

    #[serde(default = "default_server_version")]
    pub version: String,

    /// Optional instructions returned to clients during `initialize`
    #[serde(default)]
    pub instructions: Option<String>,
}

fn default_server_name() -> String {
    "mcp_relay".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
            instructions: None,
        }
    }
}

/// Built-in tool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Page opened by the `posts-open-browser` tool; the tool is disabled when unset
    #[serde(default)]
    pub browser_url: Option<String>,

    /// Azure DevOps access for `azure-devops-tool`; the tool is disabled when unset
    #[serde(default)]
    pub azure_devops: Option<AzureDevOpsConfig>,
}

/// Azure DevOps organization and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureDevOpsConfig {
    /// Organization name, the first path segment of every API URL
    pub organization: String,

    /// Personal access token sent as the password of HTTP basic auth
    #[serde(default)]
    pub pat: Option<String>,

    /// Root of the REST API
    #[serde(default = "default_azure_devops_api_url")]
    pub api_url: String,

    #[serde(default = "default_azure_devops_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_azure_devops_api_url() -> String {
    "https://dev.azure.com".to_string()
}

fn default_azure_devops_timeout_seconds() -> u64 {
    30
}

impl AzureDevOpsConfig {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            pat: None,
            api_url: default_azure_devops_api_url(),
            timeout_seconds: default_azure_devops_timeout_seconds(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_key) = std::env::var("MCP_API_KEY") {
            self.auth.api_key = Some(api_key);
        }

        if let Ok(bind) = std::env::var("MCP_RELAY_BIND") {
            self.server.bind = bind;
        }

        if let Ok(public_url) = std::env::var("MCP_RELAY_PUBLIC_URL") {
            self.server.public_url = Some(public_url);
        }

        if let Ok(keep_alive) = std::env::var("MCP_RELAY_KEEP_ALIVE_SECONDS") {
            match keep_alive.parse() {
                Ok(secs) => self.server.keep_alive_seconds = secs,
                Err(_) => tracing::warn!(
                    "Ignoring invalid MCP_RELAY_KEEP_ALIVE_SECONDS value: {}",
                    keep_alive
                ),
            }
        }

        if let Ok(browser_url) = std::env::var("MCP_RELAY_BROWSER_URL") {
            self.tools.browser_url = Some(browser_url);
        }

        if let Ok(organization) = std::env::var("AZURE_DEVOPS_ORGANIZATION") {
            match self.tools.azure_devops.as_mut() {
                Some(azure) => azure.organization = organization,
                None => self.tools.azure_devops = Some(AzureDevOpsConfig::new(organization)),
            }
        }

        if let Ok(pat) = std::env::var("AZURE_DEVOPS_PAT") {
            match self.tools.azure_devops.as_mut() {
                Some(azure) => azure.pat = Some(pat),
                None => tracing::warn!(
                    "AZURE_DEVOPS_PAT is set but no Azure DevOps organization is configured"
                ),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Commands::Serve {
            bind,
            public_url,
            keep_alive,
        } = &cli.command
        {
            if let Some(bind) = bind {
                self.server.bind = bind.clone();
            }
            if let Some(public_url) = public_url {
                self.server.public_url = Some(public_url.clone());
            }
            if let Some(keep_alive) = keep_alive {
                self.server.keep_alive_seconds = *keep_alive;
            }
        }
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind.parse().map_err(|e| {
            RelayError::Config(format!("Invalid bind address '{}': {}", self.server.bind, e))
                .into()
        })
    }

    /// Parsed public base URL, if configured
    pub fn public_url(&self) -> Result<Option<url::Url>> {
        let Some(raw) = self.server.public_url.as_deref() else {
            return Ok(None);
        };
        let url = url::Url::parse(raw)
            .map_err(|e| RelayError::Config(format!("Invalid public_url '{}': {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RelayError::Config(format!(
                "public_url must use http or https, got '{}'",
                url.scheme()
            ))
            .into());
        }
        Ok(Some(url))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        self.public_url()?;

        if self.server.keep_alive_seconds == 0 {
            return Err(RelayError::Config(
                "server.keep_alive_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.max_body_bytes == 0 {
            return Err(RelayError::Config(
                "server.max_body_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.mcp.name.trim().is_empty() {
            return Err(RelayError::Config("mcp.name cannot be empty".to_string()).into());
        }

        if let Some(browser_url) = self.tools.browser_url.as_deref() {
            url::Url::parse(browser_url).map_err(|e| {
                RelayError::Config(format!("Invalid tools.browser_url '{}': {}", browser_url, e))
            })?;
        }

        if let Some(azure) = self.tools.azure_devops.as_ref() {
            if azure.organization.trim().is_empty() {
                return Err(RelayError::Config(
                    "tools.azure_devops.organization cannot be empty".to_string(),
                )
                .into());
            }
            let api_url = url::Url::parse(&azure.api_url).map_err(|e| {
                RelayError::Config(format!(
                    "Invalid tools.azure_devops.api_url '{}': {}",
                    azure.api_url, e
                ))
            })?;
            if !matches!(api_url.scheme(), "http" | "https") {
                return Err(RelayError::Config(format!(
                    "tools.azure_devops.api_url must use http or https, got '{}'",
                    api_url.scheme()
                ))
                .into());
            }
            if azure.timeout_seconds == 0 {
                return Err(RelayError::Config(
                    "tools.azure_devops.timeout_seconds must be greater than 0".to_string(),
                )
                .into());
            }
        }

        Ok(())
    }
}
