//! MCP protocol layer
//!
//! Wire types and the [`dispatcher::Dispatcher`] seam the HTTP transport
//! relays through.

pub mod dispatcher;
pub mod types;

pub use dispatcher::{Dispatcher, McpDispatcher};
