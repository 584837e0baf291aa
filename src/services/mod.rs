//! Long-running services and their lifecycle.

use tokio::sync::broadcast;

pub mod manager;
pub mod scheduler;
pub mod signals;
pub mod web;

/// A task that runs until it fails or the shutdown channel fires.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returning `Ok(())` before shutdown was requested is treated as an unexpected exit.
    async fn run(&mut self, shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()>;
}
