//! HTTP surfaces of the two services

pub mod classifier;
pub mod postprocessing;

pub use classifier::ClassifierState;
pub use postprocessing::PostprocessingState;

use tracing::{info, warn};

/// Resolves on Ctrl-C, used for graceful shutdown of the HTTP servers
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
    }
}
