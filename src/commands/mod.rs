//! Command handlers for the CLI
//!
//! - `serve`: run the HTTP relay
//! - `tools`: print the tool catalogue the server would expose

pub mod serve;
pub mod tools;
