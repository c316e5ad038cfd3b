//! Gateway startup helper for embedding in the controller binary.
//!
//! Provides [`spawn_gateway`] which binds the listener eagerly, so address
//! and port errors surface at startup, then serves on a background tokio
//! task.
//!
//! # Usage
//!
//! ```rust,ignore
//! use velocity_gateway::{spawn_gateway, ServerConfig};
//!
//! let handle = spawn_gateway(&ServerConfig::default(), state, token.clone()).await?;
//! // ... later
//! token.cancel();
//! handle.await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Bind the gateway and serve it on a background task.
///
/// The task runs until `shutdown` is cancelled. Serve errors after a
/// successful bind are logged, not returned.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot be bound.
pub async fn spawn_gateway(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, ServerError> {
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Gateway exited with error");
        }
    });

    tracing::info!(port = config.port, "Gateway spawned on background task");

    Ok(handle)
}
