use crate::config::Config;
use crate::error::Result;
use crate::server;

/// Run the relay until interrupted
pub async fn run_serve(config: Config) -> Result<()> {
    tracing::info!(
        name = %config.mcp.name,
        version = %config.mcp.version,
        bind = %config.server.bind,
        "Starting MCP relay"
    );
    if let Some(public_url) = &config.server.public_url {
        tracing::info!("Advertising session endpoints under {}", public_url);
    }

    server::serve(&config).await?;

    tracing::info!("MCP relay stopped");
    Ok(())
}
