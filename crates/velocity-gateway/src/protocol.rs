//! Request payloads and `WebSocket` message framing.
//!
//! Every `WebSocket` message, in either direction, uses the envelope
//! `{"event": "<name>", "data": {...}}`. Request payloads deserialize with
//! every field optional so that a missing field produces a descriptive
//! [`ProtocolError`] rather than a generic parse failure.
//!
//! | Client event | Payload | Reply |
//! |--------------|---------|-------|
//! | `geofence_trigger` | [`TriggerRequest`] | `trigger_ack` |
//! | `manual_override` | [`OverrideRequest`] | none (the broadcast) |
//! | `update_junction_location` | [`LocationRequest`] | none (the broadcast) |
//! | `request_state` | none | `state_snapshot` |
//! | `ping` | none | `pong` |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use velocity_types::{JunctionId, JunctionMode, StatusSnapshot, VehicleId};

use crate::commands::{ControlCommand, HTTP_DEFAULT_VEHICLE, OverrideAction};

/// A request that could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// HTTP request without a usable JSON body.
    #[error("No JSON body provided")]
    NoBody,

    /// HTTP trigger without a junction id.
    #[error("junctionId required")]
    MissingJunctionId,

    /// `WebSocket` trigger without both ids.
    #[error("junctionId and vehicleId required")]
    MissingTriggerFields,

    /// Override without a junction id or action.
    #[error("junctionId and action required")]
    MissingOverrideFields,

    /// Override with an action other than `emergency` or `auto_cycle`.
    #[error("action must be 'emergency' or 'auto_cycle'")]
    InvalidAction,

    /// Location update without a junction id or coordinates.
    #[error("junctionId, lat, and lng required")]
    MissingLocationFields,

    /// `WebSocket` event name not understood.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Payload was not valid JSON of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Treat empty strings the same as absent fields.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Client requests
// ---------------------------------------------------------------------------

/// Emergency trigger, sent by a vehicle entering a junction's geofence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    /// Target junction.
    pub junction_id: Option<String>,
    /// Approaching vehicle.
    pub vehicle_id: Option<String>,
    /// Client-side epoch milliseconds. Logged only.
    pub timestamp: Option<i64>,
}

impl TriggerRequest {
    /// Validate a trigger received over `WebSocket` or NATS, where both ids
    /// are mandatory.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingTriggerFields`] if either id is
    /// missing or empty.
    pub fn into_command(self) -> Result<ControlCommand, ProtocolError> {
        match (present(self.junction_id), present(self.vehicle_id)) {
            (Some(junction_id), Some(vehicle_id)) => Ok(ControlCommand::Trigger {
                junction_id,
                vehicle_id: VehicleId::new(vehicle_id),
            }),
            _ => Err(ProtocolError::MissingTriggerFields),
        }
    }

    /// Validate a trigger received over HTTP, where the vehicle id falls
    /// back to [`HTTP_DEFAULT_VEHICLE`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NoBody`] for an empty object and
    /// [`ProtocolError::MissingJunctionId`] if the junction id is missing
    /// or empty.
    pub fn into_http_command(self) -> Result<ControlCommand, ProtocolError> {
        if self.junction_id.is_none() && self.vehicle_id.is_none() && self.timestamp.is_none() {
            return Err(ProtocolError::NoBody);
        }
        let junction_id = present(self.junction_id).ok_or(ProtocolError::MissingJunctionId)?;
        let vehicle_id = self
            .vehicle_id
            .unwrap_or_else(|| HTTP_DEFAULT_VEHICLE.to_owned());
        Ok(ControlCommand::Trigger {
            junction_id,
            vehicle_id: VehicleId::new(vehicle_id),
        })
    }
}

/// Manual override from an operator UI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    /// Target junction.
    pub junction_id: Option<String>,
    /// `emergency` or `auto_cycle`.
    pub action: Option<String>,
}

impl OverrideRequest {
    /// Validate the override.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingOverrideFields`] if a field is
    /// missing, or [`ProtocolError::InvalidAction`] for an unknown action.
    pub fn into_command(self) -> Result<ControlCommand, ProtocolError> {
        let (Some(junction_id), Some(action)) = (present(self.junction_id), present(self.action))
        else {
            return Err(ProtocolError::MissingOverrideFields);
        };
        let action: OverrideAction = action.parse()?;
        Ok(ControlCommand::Override {
            junction_id,
            action,
        })
    }
}

/// Position report from the device acting as the junction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    /// Target junction.
    pub junction_id: Option<String>,
    /// New latitude.
    pub lat: Option<f64>,
    /// New longitude.
    pub lng: Option<f64>,
    /// Reporting device kind (`signal`, ...). Logged only.
    pub device_type: Option<String>,
}

impl LocationRequest {
    /// Validate the location update.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingLocationFields`] if a field is
    /// missing.
    pub fn into_command(self) -> Result<ControlCommand, ProtocolError> {
        match (present(self.junction_id), self.lat, self.lng) {
            (Some(junction_id), Some(lat), Some(lng)) => Ok(ControlCommand::Relocate {
                junction_id,
                lat,
                lng,
                device_type: self.device_type,
            }),
            _ => Err(ProtocolError::MissingLocationFields),
        }
    }
}

/// Raw `WebSocket` frame before the payload is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    /// Event name.
    pub event: String,
    /// Event payload; absent and `null` are equivalent.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A decoded client `WebSocket` message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// A command to apply to a junction.
    Command(ControlCommand),
    /// Ask for a fresh `state_snapshot`.
    RequestState,
    /// Keep-alive; answered with `pong`.
    Ping,
}

impl ClientMessage {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] describing why the frame was rejected.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: ClientEnvelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match envelope.event.as_str() {
            "geofence_trigger" => {
                payload::<TriggerRequest>(envelope.data)?.into_command().map(Self::Command)
            }
            "manual_override" => {
                payload::<OverrideRequest>(envelope.data)?.into_command().map(Self::Command)
            }
            "update_junction_location" => {
                payload::<LocationRequest>(envelope.data)?.into_command().map(Self::Command)
            }
            "request_state" => Ok(Self::RequestState),
            "ping" => Ok(Self::Ping),
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }
}

fn payload<T: DeserializeOwned + Default>(data: serde_json::Value) -> Result<T, ProtocolError> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Server replies
// ---------------------------------------------------------------------------

/// Message sent to a single `WebSocket` client.
///
/// Junction events broadcast to every client are serialized straight from
/// [`velocity_types::JunctionEvent`], which uses the same envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state, sent on connect and on `request_state`.
    StateSnapshot(StateSnapshotPayload),
    /// Acknowledges a `geofence_trigger`.
    TriggerAck(TriggerAck),
    /// Answers a `ping`.
    Pong(Pong),
    /// The client's last message was rejected.
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Build an `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

/// Payload of `state_snapshot`.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshotPayload {
    /// Timestamp and junction table.
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    /// Always `true`.
    pub success: bool,
}

/// Payload of `trigger_ack`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAck {
    /// Junction that was preempted.
    pub junction_id: JunctionId,
    /// Vehicle that triggered it.
    pub vehicle_id: VehicleId,
    /// Always `emergency`.
    pub mode: JunctionMode,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Payload of `pong`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pong {
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Payload of `error`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    /// Human-readable reason.
    pub message: String,
}
