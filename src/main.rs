use hemmer_provider_xyz::{init_logging, provider, serve, PROVIDER_NAME, PROVIDER_VERSION};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    info!(
        provider = PROVIDER_NAME,
        version = PROVIDER_VERSION,
        "Starting provider"
    );

    serve(provider()).await?;
    Ok(())
}
