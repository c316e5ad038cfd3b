//! The junction state machine.
//!
//! [`Junction`] owns one junction's observable state together with its
//! [`TransitionTimer`]. Every method takes `&mut self`, so whoever holds the
//! junction holds its lock: in the running controller that is the
//! junction's worker task, which serializes commands and timer fires.
//!
//! The cycling behavior lives in [`scheduler`](crate::scheduler) and the
//! preemption behavior in [`preemption`](crate::preemption); both extend
//! `Junction` with further `impl` blocks.
//!
//! # Mode / transition agreement
//!
//! | Mode | Cycle advance pending | Emergency reversion pending |
//! |------|-----------------------|-----------------------------|
//! | `AutoCycle` (started) | yes | no |
//! | `AutoCycle` (not started) | no | no |
//! | `Emergency` | no | yes |

use tokio::time::Instant;
use tracing::debug;
use velocity_types::{
    Direction, JunctionEvent, JunctionId, JunctionMode, JunctionState, JunctionUpdate,
    LocationUpdate, SignalColor, VehicleId, now_millis,
};

use crate::config::{JunctionConfig, TimingConfig};
use crate::timer::{FiredTransition, TransitionAction, TransitionPurpose, TransitionTimer};

/// One junction: state, timing, and pending transitions.
#[derive(Debug)]
pub struct Junction {
    pub(crate) id: JunctionId,
    pub(crate) state: JunctionState,
    pub(crate) timing: TimingConfig,
    pub(crate) timer: TransitionTimer,
    pub(crate) cycling_started: bool,
}

impl Junction {
    /// Create a junction from its static configuration.
    ///
    /// All signals start RED and nothing is scheduled until
    /// [`start_auto_cycle`](Self::start_auto_cycle) is called.
    pub fn new(id: JunctionId, config: &JunctionConfig, timing: TimingConfig) -> Self {
        Self {
            id,
            state: JunctionState::new(
                config.name.clone(),
                config.lat,
                config.lng,
                config.geofence_radius_m,
            ),
            timing,
            timer: TransitionTimer::new(),
            cycling_started: false,
        }
    }

    /// The junction's id.
    pub const fn id(&self) -> &JunctionId {
        &self.id
    }

    /// Borrow the current state.
    pub const fn state(&self) -> &JunctionState {
        &self.state
    }

    /// Owned copy of the current state, free of any timer information.
    pub fn snapshot(&self) -> JunctionState {
        self.state.clone()
    }

    /// Borrow the pending-transition table.
    pub const fn timer(&self) -> &TransitionTimer {
        &self.timer
    }

    /// Earliest instant at which a transition is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.next_deadline()
    }

    /// Fire every transition due at or before `now`, in deadline order.
    ///
    /// Returns the events produced, in commit order.
    pub fn fire_due(&mut self, now: Instant) -> Vec<JunctionEvent> {
        let mut events = Vec::new();
        while let Some(fired) = self.timer.take_due(now) {
            if let Some(event) = self.fire(fired) {
                events.push(event);
            }
        }
        events
    }

    /// Perform a transition that has just been removed from the timer.
    ///
    /// Stale fires (the mode changed after the transition was armed) are
    /// dropped and return `None`.
    pub fn fire(&mut self, fired: FiredTransition) -> Option<JunctionEvent> {
        let at = fired.deadline;
        match fired.action {
            TransitionAction::BeginYellow => self.advance(at),
            TransitionAction::CompleteYellow => self.complete_yellow(at),
            TransitionAction::RevertToCycle => Some(self.revert_emergency(at)),
        }
    }

    /// Move the junction to a new position. Mode and timers are untouched.
    pub fn update_location(&mut self, lat: f64, lng: f64) -> JunctionEvent {
        let timestamp = now_millis();
        self.state.lat = lat;
        self.state.lng = lng;
        self.state.last_updated = Some(timestamp);

        debug!(junction_id = %self.id, lat, lng, "Junction location updated");

        JunctionEvent::JunctionLocationUpdated(LocationUpdate {
            junction_id: self.id.clone(),
            lat,
            lng,
            timestamp,
        })
    }

    /// Build an update event from the state as currently committed.
    pub(crate) fn update_event(
        &self,
        current_signal: Option<Direction>,
        triggered_by: Option<VehicleId>,
    ) -> JunctionEvent {
        JunctionEvent::JunctionUpdate(JunctionUpdate {
            junction_id: self.id.clone(),
            signals: self.state.signals,
            mode: self.state.mode,
            timestamp: now_millis(),
            current_signal,
            triggered_by,
        })
    }

    /// Describe the first broken invariant, if any.
    ///
    /// Used by tests and debug assertions to check that signal colors,
    /// mode, and pending transitions agree.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        let cycle = self.timer.pending(TransitionPurpose::CycleAdvance);
        let reversion = self.timer.pending(TransitionPurpose::EmergencyReversion);
        let signals = &self.state.signals;

        match self.state.mode {
            JunctionMode::Emergency => {
                if !self.state.emergency_active {
                    return Some("emergency mode without emergency_active");
                }
                if signals.color(Direction::North) != SignalColor::Green
                    || signals.count(SignalColor::Red) != 3
                {
                    return Some("emergency pattern is not north GREEN, others RED");
                }
                if cycle.is_some() {
                    return Some("cycle advance pending during emergency");
                }
                if reversion.is_none() {
                    return Some("emergency without pending reversion");
                }
            }
            JunctionMode::AutoCycle => {
                if self.state.emergency_active {
                    return Some("auto cycle with emergency_active set");
                }
                if reversion.is_some() {
                    return Some("emergency reversion pending during auto cycle");
                }
                if !self.cycling_started {
                    return (cycle.is_some() || signals.count(SignalColor::Red) != 4)
                        .then_some("unstarted junction is not idle and all RED");
                }
                if cycle.is_none() {
                    return Some("auto cycle without pending cycle advance");
                }
                let current = self.state.current_cycle_signal;
                match signals.color(current) {
                    SignalColor::Green => {
                        if signals.count(SignalColor::Green) != 1
                            || signals.count(SignalColor::Red) != 3
                        {
                            return Some("more than one signal is not RED during GREEN phase");
                        }
                    }
                    SignalColor::Yellow => {
                        if signals.count(SignalColor::Green) != 0
                            || signals.count(SignalColor::Red) != 3
                        {
                            return Some("unexpected colors during YELLOW phase");
                        }
                    }
                    SignalColor::Red => return Some("current cycle signal is RED"),
                }
            }
        }
        None
    }
}
