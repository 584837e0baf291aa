use crate::services::manager::{ServiceExit, ServiceManager};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs until SIGINT/SIGTERM or until any service stops on its own, then
/// shuts everything down within `shutdown_timeout`.
///
/// A service exiting by itself counts as a failure, as does a shutdown that
/// had to abort stuck services.
pub async fn handle_shutdown_signals(
    mut manager: ServiceManager,
    shutdown_timeout: Duration,
) -> ExitCode {
    let mut exit_code = ExitCode::SUCCESS;

    tokio::select! {
        signal = shutdown_signal() => {
            info!(signal, "Shutdown signal received");
        }
        exited = manager.next_exit() => {
            match exited {
                Some((name, ServiceExit::Completed)) => {
                    warn!(service = name, "Service exited unexpectedly");
                }
                Some((name, ServiceExit::Failed(e))) => {
                    error!(service = name, error = ?e, "Service failed");
                }
                Some((name, ServiceExit::Panicked)) => {
                    error!(service = name, "Service panicked");
                }
                None => warn!("No services running"),
            }
            exit_code = ExitCode::FAILURE;
        }
    }

    let stuck = manager.shutdown(shutdown_timeout).await;
    if !stuck.is_empty() {
        exit_code = ExitCode::FAILURE;
    }
    info!("Shutdown complete");
    exit_code
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
