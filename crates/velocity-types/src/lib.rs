//! Shared type definitions for the Velocity junction controller.
//!
//! This crate is the single source of truth for the data exchanged between
//! the controller core, the HTTP/WebSocket gateway, the NATS bridge, and
//! the browser visualization clients. Types flow downstream to
//! `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- String-backed junction and vehicle identifiers
//! - [`enums`] -- Directions, signal colors, junction modes
//! - [`structs`] -- Signals, junction state, status snapshots
//! - [`events`] -- Outbound state-change events

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

/// Current wall-clock time as epoch milliseconds.
///
/// All timestamps on the wire use this representation.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// Re-export all public types at crate root for convenience.
pub use enums::{Direction, JunctionMode, SignalColor};
pub use events::{JunctionEvent, JunctionUpdate, LocationUpdate};
pub use ids::{JunctionId, VehicleId};
pub use structs::{JunctionState, Signal, Signals, StatusSnapshot};
