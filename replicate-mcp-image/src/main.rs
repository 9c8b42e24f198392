//! Replicate MCP Image Server
//!
//! MCP server for image generation with Stable Diffusion XL on Replicate.

use anyhow::{Context, Result};
use clap::Parser;
use replicate_mcp_common::tracing::{DEFAULT_LOG_LEVEL, init_tracing};
use replicate_mcp_common::{Config, McpServerBuilder, TransportArgs};
use replicate_mcp_image::ImageServer;

/// Command-line arguments for the image server.
#[derive(Parser, Debug)]
#[command(name = "replicate-mcp-image")]
#[command(about = "MCP server for image generation with Stable Diffusion XL on Replicate")]
#[command(version)]
struct Args {
    /// Transport configuration
    #[command(flatten)]
    transport: TransportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_LOG_LEVEL);

    let args = Args::parse();

    // A missing API token is fatal here, before any transport is opened.
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        api_base = %config.api_base_url,
        model_version = %config.model_version,
        images_dir = %config.images_dir.display(),
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.images_dir)
        .await
        .with_context(|| format!("Failed to create images directory {}", config.images_dir.display()))?;

    let server = ImageServer::new(config);

    let transport = args.transport.into_transport();
    tracing::info!(transport = %transport, "Starting MCP server");

    McpServerBuilder::new(server)
        .with_transport(transport)
        .run()
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
