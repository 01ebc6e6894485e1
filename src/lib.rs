//! mcp-relay - session-based MCP server over HTTP
//!
//! Serves MCP JSON-RPC messages in two transport shapes on one route:
//! synchronous request/response over `POST /mcp`, and session-bound
//! streaming, where `GET /mcp` opens a `text/event-stream` and later POSTs
//! carrying its `sessionId` have their results pushed onto that stream.
//!
//! # Architecture
//!
//! - `server`: router, session registry, stream and ingress handlers, auth gate
//! - `mcp`: protocol types and the `Dispatcher` seam
//! - `tools`: tool handler trait, registry and built-in tools
//! - `config`: configuration loading and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line entry points
//!
//! # Example
//!
//! ```no_run
//! use mcp_relay::{server, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!     server::serve(&config).await
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;
pub mod server;
pub mod tools;

// Re-export commonly used types
pub use config::Config;
pub use error::{RelayError, Result};
pub use mcp::{Dispatcher, McpDispatcher};
pub use server::{build_router, AppState, RelaySettings, SessionRegistry};
