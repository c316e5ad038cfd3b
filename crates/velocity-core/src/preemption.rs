//! Emergency preemption.
//!
//! A trigger cancels the rotation, forces North GREEN with every other
//! signal RED regardless of the phase the rotation was in, and arms an
//! emergency reversion. When the reversion fires the rotation restarts at
//! North, not at the direction that was active before the preemption.
//!
//! Re-triggering while already preempted re-arms the reversion for a full
//! window from the new trigger. There is no queue or priority: the most
//! recent trigger wins and its vehicle becomes `triggered_by`.

use tokio::time::Instant;
use tracing::{info, warn};
use velocity_types::{Direction, JunctionEvent, JunctionMode, VehicleId};

use crate::junction::Junction;
use crate::timer::{TransitionAction, TransitionPurpose};

impl Junction {
    /// Preempt the junction for `vehicle`.
    pub fn trigger_emergency(&mut self, vehicle: VehicleId, now: Instant) -> JunctionEvent {
        self.timer.cancel_purpose(TransitionPurpose::CycleAdvance);

        let extending = self.state.mode == JunctionMode::Emergency;
        self.state.mode = JunctionMode::Emergency;
        self.state.emergency_active = true;
        self.state.triggered_by = Some(vehicle.clone());
        self.state.signals.set_exclusive_green(Direction::North);

        self.timer.arm(
            TransitionAction::RevertToCycle,
            now,
            self.timing.emergency_duration(),
        );

        if extending {
            warn!(
                junction_id = %self.id,
                vehicle_id = %vehicle,
                "Emergency re-triggered, window restarted"
            );
        } else {
            info!(junction_id = %self.id, vehicle_id = %vehicle, "EMERGENCY MODE");
        }

        self.update_event(None, Some(vehicle))
    }

    /// End the preemption and restart the rotation at North.
    pub(crate) fn revert_emergency(&mut self, now: Instant) -> JunctionEvent {
        info!(
            junction_id = %self.id,
            "Ending emergency mode, returning to auto cycle"
        );
        self.start_auto_cycle(now)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::arithmetic_side_effects)]
mod tests {
    use std::time::Duration;

    use velocity_types::{JunctionId, SignalColor};

    use super::*;
    use crate::config::{JunctionConfig, TimingConfig};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn junction() -> Junction {
        let config = JunctionConfig {
            name: "Test".to_owned(),
            lat: 0.0,
            lng: 0.0,
            geofence_radius_m: 1.0,
        };
        Junction::new(JunctionId::from("j1"), &config, TimingConfig::default())
    }

    fn assert_emergency_pattern(j: &Junction) {
        assert_eq!(j.state().mode, JunctionMode::Emergency);
        assert!(j.state().emergency_active);
        assert_eq!(j.state().signals.color(Direction::North), SignalColor::Green);
        for dir in [Direction::South, Direction::East, Direction::West] {
            assert_eq!(j.state().signals.color(dir), SignalColor::Red);
        }
    }

    #[test]
    fn trigger_overrides_yellow_phase() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);
        // South GREEN at 5000, South YELLOW at 9000.
        j.fire_due(t0 + ms(9000));
        assert_eq!(j.state().signals.color(Direction::South), SignalColor::Yellow);

        let event = j.trigger_emergency(VehicleId::from("amb-1"), t0 + ms(9200));

        assert_emergency_pattern(&j);
        assert_eq!(j.timer().pending(TransitionPurpose::CycleAdvance), None);
        assert_eq!(
            j.timer().pending(TransitionPurpose::EmergencyReversion),
            Some(TransitionAction::RevertToCycle)
        );
        assert_eq!(j.invariant_violation(), None);
        match event {
            JunctionEvent::JunctionUpdate(update) => {
                assert_eq!(update.triggered_by, Some(VehicleId::from("amb-1")));
                assert_eq!(update.mode, JunctionMode::Emergency);
            }
            JunctionEvent::JunctionLocationUpdated(_) => panic!("expected junction update"),
        }
    }

    #[test]
    fn trigger_on_unstarted_junction() {
        let mut j = junction();
        j.trigger_emergency(VehicleId::from("amb-1"), Instant::now());
        assert_emergency_pattern(&j);
        assert_eq!(j.invariant_violation(), None);
    }

    #[test]
    fn reversion_resets_rotation_to_north() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);
        // Rotation at East when the emergency arrives.
        j.fire_due(t0 + ms(10_000));
        assert_eq!(j.state().current_cycle_signal, Direction::East);

        j.trigger_emergency(VehicleId::from("amb-1"), t0 + ms(11_000));
        let events = j.fire_due(t0 + ms(16_000));

        assert_eq!(events.len(), 1);
        assert_eq!(j.state().mode, JunctionMode::AutoCycle);
        assert!(!j.state().emergency_active);
        assert_eq!(j.state().current_cycle_signal, Direction::North);
        assert_eq!(j.state().signals.color(Direction::North), SignalColor::Green);
        assert_eq!(j.state().signals.count(SignalColor::Green), 1);
        assert_eq!(j.invariant_violation(), None);
        // Rotation resumes one GREEN period after the reversion.
        assert_eq!(j.next_deadline(), Some(t0 + ms(20_000)));
    }

    #[test]
    fn retrigger_restarts_window() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);

        j.trigger_emergency(VehicleId::from("amb-1"), t0);
        j.trigger_emergency(VehicleId::from("amb-2"), t0 + ms(2500));

        assert_eq!(j.timer().pending_count(), 1);
        assert_eq!(j.state().triggered_by, Some(VehicleId::from("amb-2")));

        // Original deadline passes without reverting.
        assert!(j.fire_due(t0 + ms(5000)).is_empty());
        assert_emergency_pattern(&j);

        // Reversion lands a full window after the second trigger.
        assert!(j.fire_due(t0 + ms(7499)).is_empty());
        assert_eq!(j.fire_due(t0 + ms(7500)).len(), 1);
        assert_eq!(j.state().mode, JunctionMode::AutoCycle);
    }

    #[test]
    fn manual_auto_cycle_cancels_reversion() {
        let mut j = junction();
        let t0 = Instant::now();
        j.trigger_emergency(VehicleId::from("amb-1"), t0);
        j.start_auto_cycle(t0 + ms(1000));

        assert_eq!(j.timer().pending(TransitionPurpose::EmergencyReversion), None);
        assert_eq!(j.invariant_violation(), None);

        // The old reversion deadline coincides with the rotation's own
        // advance; only the advance fires.
        let events = j.fire_due(t0 + ms(5000));
        assert_eq!(events.len(), 1);
        assert_eq!(j.state().signals.color(Direction::North), SignalColor::Yellow);
    }

    #[test]
    fn triggered_by_survives_reversion() {
        let mut j = junction();
        let t0 = Instant::now();
        j.trigger_emergency(VehicleId::from("amb-9"), t0);
        j.fire_due(t0 + ms(5000));
        assert_eq!(j.state().mode, JunctionMode::AutoCycle);
        assert_eq!(j.state().triggered_by, Some(VehicleId::from("amb-9")));
    }
}
