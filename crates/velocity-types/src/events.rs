//! Outbound state-change events pushed to the broadcast sink.
//!
//! Every event is self-contained: a [`JunctionUpdate`] carries the full
//! signal set of its junction, so subscribers can treat each one as the
//! authoritative picture rather than a delta.
//!
//! On the wire events use the envelope `{"event": "<name>", "data": {...}}`,
//! which is the same framing the WebSocket channel uses for every message.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Direction, JunctionMode};
use crate::ids::{JunctionId, VehicleId};
use crate::structs::Signals;

/// Signal or mode change at one junction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct JunctionUpdate {
    /// Junction the update belongs to.
    #[serde(rename = "junctionId")]
    pub junction_id: JunctionId,
    /// Complete signal set as committed.
    pub signals: Signals,
    /// Mode as committed.
    pub mode: JunctionMode,
    /// Epoch milliseconds at commit.
    pub timestamp: i64,
    /// Newly GREEN direction, set when a rotation step hands over
    /// right-of-way or cycling restarts.
    pub current_signal: Option<Direction>,
    /// Triggering vehicle, set on emergency preemption.
    #[serde(rename = "triggeredBy")]
    pub triggered_by: Option<VehicleId>,
}

/// Position change of one junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LocationUpdate {
    /// Junction that moved.
    #[serde(rename = "junctionId")]
    pub junction_id: JunctionId,
    /// New latitude.
    pub lat: f64,
    /// New longitude.
    pub lng: f64,
    /// Epoch milliseconds at commit.
    pub timestamp: i64,
}

/// Any event emitted by a junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum JunctionEvent {
    /// Signals or mode changed.
    JunctionUpdate(JunctionUpdate),
    /// Location changed.
    JunctionLocationUpdated(LocationUpdate),
}

impl JunctionEvent {
    /// Junction the event belongs to.
    pub const fn junction_id(&self) -> &JunctionId {
        match self {
            Self::JunctionUpdate(update) => &update.junction_id,
            Self::JunctionLocationUpdated(update) => &update.junction_id,
        }
    }

    /// Wire name of the event (`junction_update`, ...).
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JunctionUpdate(_) => "junction_update",
            Self::JunctionLocationUpdated(_) => "junction_location_updated",
        }
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::enums::SignalColor;

    #[test]
    fn update_uses_client_field_names() {
        let mut signals = Signals::all_red();
        signals.set(Direction::North, SignalColor::Green);
        let event = JunctionEvent::JunctionUpdate(JunctionUpdate {
            junction_id: JunctionId::from("junction1"),
            signals,
            mode: JunctionMode::Emergency,
            timestamp: 1_690_000_000_000,
            current_signal: None,
            triggered_by: Some(VehicleId::from("amb-1")),
        });

        let value = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(value["event"], "junction_update");
        assert_eq!(value["data"]["junctionId"], "junction1");
        assert_eq!(value["data"]["mode"], "emergency");
        assert_eq!(value["data"]["triggeredBy"], "amb-1");
        assert_eq!(value["data"]["signals"]["north"]["state"], "GREEN");
        assert!(value["data"]["current_signal"].is_null());
    }

    #[test]
    fn location_event_name() {
        let event = JunctionEvent::JunctionLocationUpdated(LocationUpdate {
            junction_id: JunctionId::from("j"),
            lat: 1.5,
            lng: -2.5,
            timestamp: 0,
        });
        assert_eq!(event.name(), "junction_location_updated");
        assert_eq!(event.junction_id().as_str(), "j");
        let value = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(value["event"], "junction_location_updated");
    }
}
