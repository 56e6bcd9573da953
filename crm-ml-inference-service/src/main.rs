mod artifact;
mod churn;
mod config;
mod features;
#[cfg(test)]
mod fixtures;
mod recommend;
mod registry;
mod routes;
mod segment;

use config::ServiceConfig;
use registry::ModelRegistry;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let registry = match ModelRegistry::load(&config).await {
        Ok(registry) => registry,
        Err(err) => {
            error!(status = err.status.code(), "Unable to load models: {}", err.msg);
            return Err(err.into());
        }
    };
    let app = routes::router(
        Arc::new(registry),
        &config.cors_origin,
        config.max_body_bytes,
    )?;

    let listener = TcpListener::bind(config.addr).await?;
    info!(
        addr = %config.addr,
        cors_origin = %config.cors_origin,
        max_body_bytes = config.max_body_bytes,
        "Listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(?err, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
