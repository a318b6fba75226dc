use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod app;
mod http;
mod pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxrelay_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("VOXRELAY_CONFIG").ok();
    let config = voxrelay_core::VoxRelayConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        voxrelay_core::VoxRelayConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("voxrelay gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
