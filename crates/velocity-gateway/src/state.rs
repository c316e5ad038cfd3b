//! Shared application state for the gateway.
//!
//! [`AppState`] holds the junction registry that every command is sent to
//! and the broadcast channel the junction workers publish events onto.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use velocity_core::JunctionRegistry;
use velocity_types::JunctionEvent;

/// Capacity of the broadcast channel for junction events.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
pub const BROADCAST_CAPACITY: usize = 256;

/// Create the event channel shared by the junction workers and the
/// `WebSocket` clients.
pub fn event_channel() -> broadcast::Sender<JunctionEvent> {
    let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
    tx
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Every configured junction.
    pub registry: Arc<JunctionRegistry>,
    /// Sender side of the junction event channel.
    pub tx: broadcast::Sender<JunctionEvent>,
    /// Directory served for paths no route matches, if any.
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    /// Create application state around a running registry.
    pub const fn new(registry: Arc<JunctionRegistry>, tx: broadcast::Sender<JunctionEvent>) -> Self {
        Self {
            registry,
            tx,
            static_dir: None,
        }
    }

    /// Serve static files from `dir` for unmatched paths.
    #[must_use]
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    /// Subscribe to junction events.
    pub fn subscribe(&self) -> broadcast::Receiver<JunctionEvent> {
        self.tx.subscribe()
    }
}
