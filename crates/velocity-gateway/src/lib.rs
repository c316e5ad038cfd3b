//! HTTP and `WebSocket` gateway for the Velocity junction controller.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **REST endpoints** for junction status, emergency triggers, manual
//!   overrides and location updates
//! - **`WebSocket` endpoint** (`/ws`) that pushes every junction event to
//!   all connected clients via [`tokio::sync::broadcast`] and accepts the
//!   same commands as the REST endpoints
//! - **Minimal HTML status page** (`GET /`) and a static-file fallback for
//!   the browser clients
//!
//! # Architecture
//!
//! The gateway holds no junction state of its own. Every request is
//! validated in [`protocol`], turned into a [`ControlCommand`], and
//! executed against the shared [`JunctionRegistry`]. Junction workers
//! publish the resulting events onto the broadcast channel that the
//! `WebSocket` handler forwards.
//!
//! [`ControlCommand`]: commands::ControlCommand
//! [`JunctionRegistry`]: velocity_core::JunctionRegistry

pub mod commands;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::spawn_gateway;
pub use state::AppState;
