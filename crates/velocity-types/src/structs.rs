//! Core entity structs: signals, junction state, and status snapshots.
//!
//! These are plain data records. All mutation rules (what may change when)
//! live in `velocity-core`; this crate only guarantees shape and wire
//! format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Direction, JunctionMode, SignalColor};
use crate::ids::{JunctionId, VehicleId};

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A single signal head facing one approach of a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Signal {
    /// The approach this signal controls. Never changes.
    pub direction: Direction,
    /// Current color. Serialized as `state` for client compatibility.
    #[serde(rename = "state")]
    pub color: SignalColor,
    /// True only for the North signal.
    pub is_main: bool,
}

impl Signal {
    /// Create a RED signal for the given direction.
    pub const fn red(direction: Direction) -> Self {
        Self {
            direction,
            color: SignalColor::Red,
            is_main: direction.is_main(),
        }
    }
}

/// The four signals of a junction, one per [`Direction`].
///
/// Modeled as four named fields so a junction can never hold more or
/// fewer than four signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Signals {
    /// North (main) signal.
    pub north: Signal,
    /// South signal.
    pub south: Signal,
    /// East signal.
    pub east: Signal,
    /// West signal.
    pub west: Signal,
}

impl Signals {
    /// Four RED signals.
    pub const fn all_red() -> Self {
        Self {
            north: Signal::red(Direction::North),
            south: Signal::red(Direction::South),
            east: Signal::red(Direction::East),
            west: Signal::red(Direction::West),
        }
    }

    /// Borrow the signal for a direction.
    pub const fn get(&self, direction: Direction) -> &Signal {
        match direction {
            Direction::North => &self.north,
            Direction::South => &self.south,
            Direction::East => &self.east,
            Direction::West => &self.west,
        }
    }

    /// Current color of the signal for a direction.
    pub const fn color(&self, direction: Direction) -> SignalColor {
        self.get(direction).color
    }

    /// Set the color of one signal, leaving the others untouched.
    pub const fn set(&mut self, direction: Direction, color: SignalColor) {
        let signal = match direction {
            Direction::North => &mut self.north,
            Direction::South => &mut self.south,
            Direction::East => &mut self.east,
            Direction::West => &mut self.west,
        };
        signal.color = color;
    }

    /// Give `direction` GREEN and force every other signal to RED.
    pub fn set_exclusive_green(&mut self, direction: Direction) {
        for dir in Direction::ALL {
            let color = if dir == direction {
                SignalColor::Green
            } else {
                SignalColor::Red
            };
            self.set(dir, color);
        }
    }

    /// Iterate over the signals in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        [&self.north, &self.south, &self.east, &self.west].into_iter()
    }

    /// Number of signals currently showing `color`.
    pub fn count(&self, color: SignalColor) -> usize {
        self.iter().filter(|s| s.color == color).count()
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::all_red()
    }
}

// ---------------------------------------------------------------------------
// Junction state
// ---------------------------------------------------------------------------

/// Full observable state of one junction.
///
/// This is what `/status` and `state_snapshot` expose. It deliberately
/// carries no timer or scheduling information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct JunctionState {
    /// Human-readable junction name.
    pub name: String,
    /// Last known latitude.
    pub lat: f64,
    /// Last known longitude.
    pub lng: f64,
    /// Geofence radius consumed by clients that compute proximity.
    pub geofence_radius_m: f64,
    /// Current operating mode.
    pub mode: JunctionMode,
    /// Direction holding right-of-way in the rotation. Only meaningful
    /// in [`JunctionMode::AutoCycle`].
    pub current_cycle_signal: Direction,
    /// Whether an emergency preemption is in force.
    pub emergency_active: bool,
    /// Vehicle that issued the most recent emergency trigger.
    pub triggered_by: Option<VehicleId>,
    /// Epoch milliseconds of the last location update, if any.
    pub last_updated: Option<i64>,
    /// The four signal heads.
    pub signals: Signals,
}

impl JunctionState {
    /// Create a freshly configured junction with every signal RED.
    ///
    /// The mode is `AutoCycle` but nothing is GREEN until cycling is
    /// started.
    pub fn new(name: impl Into<String>, lat: f64, lng: f64, geofence_radius_m: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            geofence_radius_m,
            mode: JunctionMode::AutoCycle,
            current_cycle_signal: Direction::North,
            emergency_active: false,
            triggered_by: None,
            last_updated: None,
            signals: Signals::all_red(),
        }
    }
}

/// Point-in-time copy of every junction, as served by `/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StatusSnapshot {
    /// Epoch milliseconds at which the snapshot was assembled.
    pub timestamp: i64,
    /// Junction state keyed by junction id.
    pub junctions: BTreeMap<JunctionId, JunctionState>,
}
