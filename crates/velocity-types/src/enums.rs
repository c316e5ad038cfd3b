//! Enumeration types for the Velocity junction controller.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// One of the four approaches of a junction, each with its own signal.
///
/// The auto-cycle rotation visits directions in declaration order:
/// North, South, East, West, then back to North.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Direction {
    /// The main approach. Receives GREEN during emergencies.
    North,
    /// Southern approach.
    South,
    /// Eastern approach.
    East,
    /// Western approach.
    West,
}

impl Direction {
    /// All directions in rotation order.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// The direction that follows this one in the fixed rotation.
    pub const fn next(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::East,
            Self::East => Self::West,
            Self::West => Self::North,
        }
    }

    /// Whether this is the main (bigger) signal. Display only.
    pub const fn is_main(self) -> bool {
        matches!(self, Self::North)
    }

    /// Lowercase name as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Signal colors
// ---------------------------------------------------------------------------

/// Color currently shown by a single signal head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export, export_to = "bindings/")]
pub enum SignalColor {
    /// Stop.
    Red,
    /// Clearing interval between GREEN and RED.
    Yellow,
    /// Go.
    Green,
}

// ---------------------------------------------------------------------------
// Junction mode
// ---------------------------------------------------------------------------

/// Operating mode of a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum JunctionMode {
    /// Fixed round-robin rotation with YELLOW clearing intervals.
    AutoCycle,
    /// Preempted: North GREEN, every other direction RED.
    Emergency,
}

impl JunctionMode {
    /// Snake-case name as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoCycle => "auto_cycle",
            Self::Emergency => "emergency",
        }
    }
}

impl core::fmt::Display for JunctionMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_visits_every_direction_once() {
        let mut dir = Direction::North;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(dir);
            dir = dir.next();
        }
        assert_eq!(seen, Direction::ALL.to_vec());
        assert_eq!(dir, Direction::North);
    }

    #[test]
    fn only_north_is_main() {
        let mains: Vec<_> = Direction::ALL.into_iter().filter(|d| d.is_main()).collect();
        assert_eq!(mains, vec![Direction::North]);
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&SignalColor::Yellow).ok().as_deref(),
            Some("\"YELLOW\"")
        );
        assert_eq!(
            serde_json::to_string(&JunctionMode::AutoCycle).ok().as_deref(),
            Some("\"auto_cycle\"")
        );
        assert_eq!(
            serde_json::to_string(&Direction::East).ok().as_deref(),
            Some("\"east\"")
        );
    }
}
