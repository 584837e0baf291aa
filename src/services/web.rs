use crate::services::Service;
use crate::state::{AppState, ServiceStatus};
use crate::web::create_router;
use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Serves the HTTP API until shutdown.
pub struct WebService {
    port: u16,
    app_state: AppState,
}

impl WebService {
    pub fn new(port: u16, app_state: AppState) -> Self {
        Self { port, app_state }
    }
}

#[async_trait::async_trait]
impl Service for WebService {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let statuses = self.app_state.service_statuses.clone();
        statuses.set(self.name(), ServiceStatus::Starting);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                statuses.set(self.name(), ServiceStatus::Error);
                return Err(e).with_context(|| format!("Failed to bind {addr}"));
            }
        };
        info!(address = %addr, "Web server listening");
        statuses.set(self.name(), ServiceStatus::Active);

        let app = create_router(self.app_state.clone());
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Web server received shutdown signal");
            })
            .await
            .context("Web server failed");

        statuses.set(
            self.name(),
            if result.is_ok() {
                ServiceStatus::Disabled
            } else {
                ServiceStatus::Error
            },
        );
        result
    }
}
