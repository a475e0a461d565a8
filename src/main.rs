use tracing_subscriber::EnvFilter;

mod analytics;
mod api;
mod config;
mod storage;

use analytics::{OnnxPoseDetector, ProcessingPool};
use api::AppState;
use config::Config;
use storage::BlobStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gaitpose=debug".parse()?))
        .init();

    let config = Config::load()?;
    tracing::info!(
        threads = config.workers.threads,
        model = %config.model.path,
        s3_endpoint = %config.s3.endpoint,
        "loaded configuration"
    );

    // the model is loaded once and shared by every request
    let model_config = config.model.clone();
    let detector =
        tokio::task::spawn_blocking(move || OnnxPoseDetector::new(&model_config)).await??;

    let state = AppState::new(
        analytics::shared(detector),
        ProcessingPool::new(config.workers.threads),
        BlobStore::new(config.s3.clone(), &config.transfer),
        config.tracking.clone(),
        config.transfer.temp_dir(),
    );

    tokio::select! {
        result = api::start_server(state, config.http.port) => {
            if let Err(e) = result {
                tracing::error!("HTTP server failed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
