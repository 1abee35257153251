//! Intake Server - HTTP REST API for civic issue report intake
//!
//! This binary exposes the ingestion & detection pipeline over REST:
//! report submission, standalone photo detection, and issue listing.

use server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables win either way
    dotenvy::dotenv().ok();

    // Load configuration
    let config = ServerConfig::load()?;

    // Start server
    server::start_server(config).await?;

    Ok(())
}
