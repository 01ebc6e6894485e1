//! Command-line interface definition for the MCP relay
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

/// MCP relay - session-based MCP server over HTTP
///
/// Serves MCP requests synchronously over POST, or relays results to a
/// long-lived event stream opened with GET.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "MCP_RELAY_CONFIG", default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,

        /// Base URL advertised to streaming clients (overrides server.public_url)
        #[arg(long)]
        public_url: Option<String>,

        /// Seconds between keep-alive markers on idle streams
        #[arg(long)]
        keep_alive: Option<u64>,
    },

    /// List the tools the server exposes
    Tools {
        /// Print the tool definitions as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["mcp-relay", "serve"]).unwrap();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Serve {
                bind: None,
                public_url: None,
                keep_alive: None
            }
        ));
    }

    #[test]
    fn test_cli_parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "mcp-relay",
            "--verbose",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--public-url",
            "https://relay.example.com",
            "--keep-alive",
            "10",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Serve {
                bind,
                public_url,
                keep_alive,
            } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
                assert_eq!(public_url.as_deref(), Some("https://relay.example.com"));
                assert_eq!(keep_alive, Some(10));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_tools_json() {
        let cli = Cli::try_parse_from(["mcp-relay", "--json-logs", "tools", "--json"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Tools { json: true }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["mcp-relay"]).is_err());
    }
}
