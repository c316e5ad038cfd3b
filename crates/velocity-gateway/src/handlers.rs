//! REST API endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page, unless a static landing page exists |
//! | `GET` | `/status` | Timestamped state of every junction |
//! | `GET` | `/api/junctions/{id}` | State of one junction |
//! | `POST` | `/trigger` | Emergency trigger (HTTP fallback for vehicles) |
//! | `POST` | `/api/override` | Manual override |
//! | `POST` | `/api/location` | Junction location update |

use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Html;
use serde::Serialize;
use velocity_types::{
    Direction, JunctionId, JunctionMode, JunctionState, SignalColor, StatusSnapshot, now_millis,
};

use crate::commands::{self, CommandOutcome};
use crate::error::GatewayError;
use crate::protocol::{LocationRequest, OverrideRequest, ProtocolError, TriggerRequest};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Response body for `POST /trigger` and `POST /api/override`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Junction that was changed.
    pub junction_id: JunctionId,
    /// Mode after the change.
    pub mode: JunctionMode,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Response body for `POST /api/location`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Junction that moved.
    pub junction_id: JunctionId,
    /// New latitude.
    pub lat: f64,
    /// New longitude.
    pub lng: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Body of a successful command response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandResponse {
    /// Trigger or override.
    Mode(ModeResponse),
    /// Location update.
    Location(LocationResponse),
}

impl From<CommandOutcome> for CommandResponse {
    fn from(outcome: CommandOutcome) -> Self {
        let timestamp = now_millis();
        match outcome {
            CommandOutcome::Triggered { junction_id, .. } => Self::Mode(ModeResponse {
                success: true,
                junction_id,
                mode: JunctionMode::Emergency,
                timestamp,
            }),
            CommandOutcome::Overridden { junction_id, mode } => Self::Mode(ModeResponse {
                success: true,
                junction_id,
                mode,
                timestamp,
            }),
            CommandOutcome::Relocated {
                junction_id,
                lat,
                lng,
            } => Self::Location(LocationResponse {
                success: true,
                junction_id,
                lat,
                lng,
                timestamp,
            }),
        }
    }
}

/// Unwrap a JSON body, mapping any extractor rejection (missing body, bad
/// content type, invalid JSON) to [`ProtocolError::NoBody`].
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| {
            tracing::debug!(error = %rejection, "Rejected request body");
            GatewayError::Protocol(ProtocolError::NoBody)
        })
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page listing every junction.
///
/// Only routed when the static directory has no `index.html` of its own.
///
/// # Errors
///
/// Returns [`GatewayError::Controller`] if a junction worker has stopped.
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, GatewayError> {
    let snapshot = state.registry.snapshot().await?;

    let junction_count = snapshot.junctions.len();
    let emergency_count = snapshot
        .junctions
        .values()
        .filter(|j| j.mode == JunctionMode::Emergency)
        .count();

    let mut rows = String::new();
    for (id, junction) in &snapshot.junctions {
        let _ = writeln!(
            rows,
            "        <tr><td>{id}</td><td>{name}</td><td class=\"{mode}\">{mode}</td><td>{signals}</td></tr>",
            name = junction.name,
            mode = junction.mode,
            signals = signal_summary(junction),
        );
    }

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Velocity Junction Controller</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        table {{ border-collapse: collapse; width: 100%; }}
        td, th {{ border-bottom: 1px solid #30363d; padding: 0.4rem; text-align: left; }}
        .emergency {{ color: #f85149; font-weight: bold; }}
        .auto_cycle {{ color: #3fb950; }}
        a {{ color: #58a6ff; text-decoration: none; }}
    </style>
</head>
<body>
    <h1>Velocity Junction Controller</h1>
    <p class="subtitle">{junction_count} junction(s), {emergency_count} in emergency mode</p>
    <table>
        <tr><th>Junction</th><th>Name</th><th>Mode</th><th>Signals (N S E W)</th></tr>
{rows}    </table>
    <h2>API</h2>
    <ul>
        <li><a href="/status">GET /status</a></li>
        <li>POST /trigger</li>
        <li>POST /api/override</li>
        <li>POST /api/location</li>
        <li>GET /ws (WebSocket)</li>
    </ul>
</body>
</html>"#
    )))
}

fn signal_summary(junction: &JunctionState) -> String {
    Direction::ALL
        .iter()
        .map(|&dir| match junction.signals.color(dir) {
            SignalColor::Red => "R",
            SignalColor::Yellow => "Y",
            SignalColor::Green => "G",
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

/// Return the state of every junction.
///
/// # Errors
///
/// Returns [`GatewayError::Controller`] if a junction worker has stopped.
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, GatewayError> {
    Ok(Json(state.registry.snapshot().await?))
}

// ---------------------------------------------------------------------------
// GET /api/junctions/{id}
// ---------------------------------------------------------------------------

/// Return the state of one junction.
///
/// # Errors
///
/// Returns [`GatewayError::UnknownJunction`] if `id` is not configured.
pub async fn get_junction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JunctionState>, GatewayError> {
    state
        .registry
        .junction(&id)
        .await?
        .map(Json)
        .ok_or(GatewayError::UnknownJunction(id))
}

// ---------------------------------------------------------------------------
// POST /trigger
// ---------------------------------------------------------------------------

/// Preempt a junction. `vehicleId` is optional here.
///
/// # Errors
///
/// 400 without a JSON body or `junctionId`, 404 for an unknown junction.
pub async fn trigger(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, GatewayError> {
    let command = body(payload)?.into_http_command()?;
    let outcome = commands::execute(&state.registry, command).await?;
    Ok(Json(CommandResponse::from(outcome)))
}

// ---------------------------------------------------------------------------
// POST /api/override
// ---------------------------------------------------------------------------

/// Force the emergency pattern or return a junction to cycling.
///
/// # Errors
///
/// 400 for a missing field or unknown action, 404 for an unknown junction.
pub async fn override_junction(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OverrideRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, GatewayError> {
    let command = body(payload)?.into_command()?;
    let outcome = commands::execute(&state.registry, command).await?;
    Ok(Json(CommandResponse::from(outcome)))
}

// ---------------------------------------------------------------------------
// POST /api/location
// ---------------------------------------------------------------------------

/// Move a junction.
///
/// # Errors
///
/// 400 for a missing field, 404 for an unknown junction.
pub async fn update_location(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LocationRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, GatewayError> {
    let command = body(payload)?.into_command()?;
    let outcome = commands::execute(&state.registry, command).await?;
    Ok(Json(CommandResponse::from(outcome)))
}
