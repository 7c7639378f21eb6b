use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use crate::config::AppConfig;
use crate::page::PageController;
use crate::types::PageRoute;
use crate::view::DashboardView;
use crate::web::StatusState;

mod api;
mod clock;
mod config;
mod mjpeg;
mod page;
mod poller;
mod stream;
mod telemetry;
mod types;
mod view;
mod watchdog;
mod web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load(&config_path)?;
    info!("⚙️ Configuration loaded: {:?}", config);

    let page_url = config.page_url()?;
    let route = PageRoute::parse(&page_url)?;
    info!("🅿️ Opening {} as {:?}", page_url, route);

    let view = view::shared(DashboardView::default());
    let page = PageController::open(route, &config, view.clone()).await?;

    let shutdown = CancellationToken::new();
    let status_state = StatusState {
        view,
        watchdog: page.watchdog().cloned(),
    };
    let status_port = config.status_port;
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = web::start_status_server(status_port, status_state, server_shutdown).await {
            error!("Status server failed: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown requested");

    shutdown.cancel();
    page.shutdown().await;
    if let Err(e) = server.await {
        error!("Status server task failed: {}", e);
    }

    info!("🛑 Dashboard agent stopped");
    Ok(())
}
