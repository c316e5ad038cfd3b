//! Auto-cycle rotation.
//!
//! The rotation gives each direction GREEN for `signal_green_duration_ms`,
//! then YELLOW for `signal_yellow_duration_ms`, then hands GREEN to the next
//! direction (North, South, East, West, North, ...). Each phase boundary is
//! a cycle-advance transition armed on the junction's timer.
//!
//! ```text
//! start_auto_cycle ──► North GREEN ──(green)──► advance ──► North YELLOW
//!                                                              │
//!        ┌──────────────────────(yellow)───────────────────────┘
//!        ▼
//! complete_yellow ──► North RED, South GREEN ──(green)──► advance ...
//! ```
//!
//! Both fire handlers re-check the mode before touching anything: a
//! transition armed before an emergency began must not resume the rotation.

use tokio::time::Instant;
use tracing::{debug, info};
use velocity_types::{Direction, JunctionEvent, JunctionMode, SignalColor};

use crate::junction::Junction;
use crate::timer::{TransitionAction, TransitionPurpose};

impl Junction {
    /// Enter (or restart) the rotation at North.
    ///
    /// Sets North GREEN and every other signal RED, clears the emergency
    /// flag, cancels any pending emergency reversion, and arms the first
    /// cycle advance for one GREEN period.
    pub fn start_auto_cycle(&mut self, now: Instant) -> JunctionEvent {
        self.timer.cancel_purpose(TransitionPurpose::EmergencyReversion);

        self.state.mode = JunctionMode::AutoCycle;
        self.state.emergency_active = false;
        self.state.current_cycle_signal = Direction::North;
        self.state.signals.set_exclusive_green(Direction::North);
        self.cycling_started = true;

        self.timer.arm(
            TransitionAction::BeginYellow,
            now,
            self.timing.green_duration(),
        );

        info!(junction_id = %self.id, "Starting auto cycle mode");
        self.update_event(Some(Direction::North), None)
    }

    /// End the GREEN phase of the current direction.
    ///
    /// Turns the current signal YELLOW and arms the end of the YELLOW phase.
    /// Returns `None` without touching state if the junction is no longer
    /// cycling.
    pub fn advance(&mut self, now: Instant) -> Option<JunctionEvent> {
        if self.state.mode != JunctionMode::AutoCycle {
            debug!(junction_id = %self.id, "Ignoring stale cycle advance");
            return None;
        }

        let current = self.state.current_cycle_signal;
        self.state.signals.set(current, SignalColor::Yellow);

        self.timer.arm(
            TransitionAction::CompleteYellow,
            now,
            self.timing.yellow_duration(),
        );

        debug!(junction_id = %self.id, direction = %current, "Signal is now YELLOW");
        Some(self.update_event(None, None))
    }

    /// End the YELLOW phase and give GREEN to the next direction.
    ///
    /// Returns `None` without touching state if the junction is no longer
    /// cycling.
    pub fn complete_yellow(&mut self, now: Instant) -> Option<JunctionEvent> {
        if self.state.mode != JunctionMode::AutoCycle {
            debug!(junction_id = %self.id, "Ignoring stale yellow completion");
            return None;
        }

        let current = self.state.current_cycle_signal;
        let next = current.next();
        self.state.signals.set(current, SignalColor::Red);
        self.state.signals.set(next, SignalColor::Green);
        self.state.current_cycle_signal = next;

        self.timer.arm(
            TransitionAction::BeginYellow,
            now,
            self.timing.green_duration(),
        );

        info!(junction_id = %self.id, direction = %next, "Signal is now GREEN");
        Some(self.update_event(Some(next), None))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use std::time::Duration;

    use velocity_types::{JunctionId, JunctionUpdate};

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

    fn as_update(event: &JunctionEvent) -> &JunctionUpdate {
        match event {
            JunctionEvent::JunctionUpdate(update) => update,
            JunctionEvent::JunctionLocationUpdated(_) => panic!("expected junction update"),
        }
    }

    #[test]
    fn start_puts_north_green_and_arms_advance() {
        let mut j = junction();
        let t0 = Instant::now();
        let event = j.start_auto_cycle(t0);

        let update = as_update(&event);
        assert_eq!(update.current_signal, Some(Direction::North));
        assert_eq!(update.mode, JunctionMode::AutoCycle);
        assert_eq!(j.state().signals.color(Direction::North), SignalColor::Green);
        assert_eq!(
            j.timer().pending(TransitionPurpose::CycleAdvance),
            Some(TransitionAction::BeginYellow)
        );
        assert_eq!(j.next_deadline(), Some(t0 + ms(4000)));
        assert_eq!(j.invariant_violation(), None);
    }

    #[test]
    fn scenario_green_4000_yellow_1000() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);

        assert!(j.fire_due(t0 + ms(3999)).is_empty());

        let events = j.fire_due(t0 + ms(4000));
        assert_eq!(events.len(), 1);
        assert_eq!(j.state().signals.color(Direction::North), SignalColor::Yellow);
        assert_eq!(j.state().signals.count(SignalColor::Green), 0);
        assert_eq!(j.invariant_violation(), None);

        let events = j.fire_due(t0 + ms(5000));
        assert_eq!(events.len(), 1);
        assert_eq!(as_update(&events[0]).current_signal, Some(Direction::South));
        assert_eq!(j.state().signals.color(Direction::North), SignalColor::Red);
        assert_eq!(j.state().signals.color(Direction::South), SignalColor::Green);
        assert_eq!(j.invariant_violation(), None);

        // Next yellow is one direction period after the last one.
        assert_eq!(j.next_deadline(), Some(t0 + ms(9000)));
    }

    #[test]
    fn full_rotation_takes_twenty_seconds() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);

        let expected = [Direction::South, Direction::East, Direction::West, Direction::North];
        for (step, direction) in (1_u64..).zip(expected) {
            j.fire_due(t0 + ms(step * 5000));
            assert_eq!(j.state().current_cycle_signal, direction);
            assert_eq!(j.state().signals.color(direction), SignalColor::Green);
            assert_eq!(j.state().signals.count(SignalColor::Green), 1);
            assert_eq!(j.invariant_violation(), None);
        }
    }

    #[test]
    fn catching_up_fires_every_missed_phase() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);

        // Two full direction periods elapse at once: four transitions.
        let events = j.fire_due(t0 + ms(10_000));
        assert_eq!(events.len(), 4);
        assert_eq!(j.state().current_cycle_signal, Direction::East);
    }

    #[test]
    fn advance_is_noop_in_emergency() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);
        j.trigger_emergency("amb-1".into(), t0);
        let before = j.snapshot();

        assert!(j.advance(t0).is_none());
        assert!(j.complete_yellow(t0).is_none());
        assert_eq!(j.snapshot(), before);
        assert_eq!(j.invariant_violation(), None);
    }

    #[test]
    fn restart_resets_to_north_mid_rotation() {
        let mut j = junction();
        let t0 = Instant::now();
        j.start_auto_cycle(t0);
        j.fire_due(t0 + ms(5000));
        j.fire_due(t0 + ms(9000));
        assert_eq!(j.state().signals.color(Direction::South), SignalColor::Yellow);

        j.start_auto_cycle(t0 + ms(9500));
        assert_eq!(j.state().current_cycle_signal, Direction::North);
        assert_eq!(j.state().signals.color(Direction::North), SignalColor::Green);
        assert_eq!(j.state().signals.count(SignalColor::Red), 3);
        assert_eq!(j.timer().pending_count(), 1);
        assert_eq!(j.next_deadline(), Some(t0 + ms(13_500)));
        assert_eq!(j.invariant_violation(), None);
    }
}
