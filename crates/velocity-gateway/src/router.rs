//! Axum router construction for the gateway.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for the browser clients.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- the static `index.html` landing page when `static_dir`
///   holds one, otherwise the built-in HTML status page
/// - `GET /status` -- state of every junction
/// - `GET /api/junctions/{id}` -- state of one junction
/// - `POST /trigger` -- emergency trigger
/// - `POST /api/override` -- manual override
/// - `POST /api/location` -- junction location update
/// - `GET /ws` -- `WebSocket` event stream and command channel
///
/// Unmatched paths are served from `state.static_dir` when it is set.
/// CORS allows any origin; the clients are served from other hosts
/// during field use.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_dir = state.static_dir.clone();
    let has_landing_page = static_dir
        .as_ref()
        .is_some_and(|dir| dir.join("index.html").is_file());

    let router = if has_landing_page {
        Router::new()
    } else {
        Router::new().route("/", get(handlers::index))
    };

    let router = router
        // Status
        .route("/status", get(handlers::status))
        .route("/api/junctions/{id}", get(handlers::get_junction))
        // Commands
        .route("/trigger", post(handlers::trigger))
        .route("/api/override", post(handlers::override_junction))
        .route("/api/location", post(handlers::update_location))
        // WebSocket
        .route("/ws", get(ws::ws_handler));

    let router = match static_dir {
        Some(dir) => {
            router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true))
        }
        None => router,
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
