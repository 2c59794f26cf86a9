mod chat;
mod config;
mod error;
mod generator;
mod lifecycle;
mod models;
mod presenter;
mod routes;
mod studio;
mod upload;

use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::Config,
    generator::{DemoGenerator, LayoutGenerator, RemoteGenerator},
    routes::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    let generator: Arc<dyn LayoutGenerator> = match &config.generation_endpoint {
        Some(endpoint) => Arc::new(RemoteGenerator::new(endpoint.clone())),
        None => {
            tracing::warn!("GENERATION_ENDPOINT not set, serving placeholder layouts");
            Arc::new(DemoGenerator)
        }
    };
    tracing::info!(generator = %generator.describe(), "Layout generator ready");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config, generator));

    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
