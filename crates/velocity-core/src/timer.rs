//! Scheduled transitions for a single junction.
//!
//! [`TransitionTimer`] is the junction's table of pending transitions. It
//! holds at most one armed transition per [`TransitionPurpose`]; arming a
//! purpose that is already armed replaces (cancels) the previous entry in
//! the same call, so two transitions for one purpose can never both fire.
//!
//! The table does not sleep by itself. The owning worker asks for
//! [`next_deadline`](TransitionTimer::next_deadline), waits until then,
//! and drains due entries with [`take_due`](TransitionTimer::take_due).
//! Entries removed by cancellation are gone from the table and can never
//! be returned by `take_due`.
//!
//! # Handles
//!
//! Every arm returns a fresh [`TimerHandle`] drawn from a monotonically
//! increasing epoch counter. A handle stays live until its entry fires or
//! is cancelled or replaced; cancelling a dead handle is a no-op.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Why a transition is scheduled. At most one per purpose may be pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransitionPurpose {
    /// Moves the rotation to its next phase (YELLOW or next GREEN).
    CycleAdvance,
    /// Ends an emergency preemption and resumes cycling.
    EmergencyReversion,
}

/// What to do when a transition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionAction {
    /// The GREEN phase ended: switch the current signal to YELLOW.
    BeginYellow,
    /// The YELLOW phase ended: hand GREEN to the next direction.
    CompleteYellow,
    /// The emergency window ended: restart the rotation.
    RevertToCycle,
}

impl TransitionAction {
    /// The purpose slot this action occupies.
    pub const fn purpose(self) -> TransitionPurpose {
        match self {
            Self::BeginYellow | Self::CompleteYellow => TransitionPurpose::CycleAdvance,
            Self::RevertToCycle => TransitionPurpose::EmergencyReversion,
        }
    }
}

/// Identity of one armed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// The epoch number backing this handle.
    pub const fn epoch(self) -> u64 {
        self.0
    }
}

/// A transition whose deadline has passed, removed from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTransition {
    /// Handle the transition was armed with.
    pub handle: TimerHandle,
    /// Action to perform.
    pub action: TransitionAction,
    /// The instant the transition was due. Follow-up transitions are
    /// measured from here so the rotation does not drift.
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    handle: TimerHandle,
    action: TransitionAction,
    deadline: Instant,
}

/// Per-junction table of pending transitions.
#[derive(Debug, Default)]
pub struct TransitionTimer {
    epoch: u64,
    slots: BTreeMap<TransitionPurpose, Armed>,
}

impl TransitionTimer {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to fire `delay` after `now`.
    ///
    /// Any transition already pending for the same purpose is cancelled
    /// first.
    pub fn arm(&mut self, action: TransitionAction, now: Instant, delay: Duration) -> TimerHandle {
        self.epoch = self.epoch.wrapping_add(1);
        let handle = TimerHandle(self.epoch);
        let deadline = now.checked_add(delay).unwrap_or(now);

        let replaced = self.slots.insert(
            action.purpose(),
            Armed {
                handle,
                action,
                deadline,
            },
        );
        if let Some(old) = replaced {
            trace!(
                purpose = ?action.purpose(),
                old_epoch = old.handle.epoch(),
                new_epoch = handle.epoch(),
                "Replaced pending transition"
            );
        }
        handle
    }

    /// Cancel the transition armed with `handle`.
    ///
    /// Returns `true` if it was still pending. Cancelling an already fired,
    /// cancelled or replaced handle does nothing and returns `false`.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let purpose = self
            .slots
            .iter()
            .find(|(_, armed)| armed.handle == handle)
            .map(|(purpose, _)| *purpose);
        purpose.is_some_and(|p| self.slots.remove(&p).is_some())
    }

    /// Cancel whatever is pending for `purpose`, returning its handle.
    pub fn cancel_purpose(&mut self, purpose: TransitionPurpose) -> Option<TimerHandle> {
        self.slots.remove(&purpose).map(|armed| armed.handle)
    }

    /// The action pending for `purpose`, if any.
    pub fn pending(&self, purpose: TransitionPurpose) -> Option<TransitionAction> {
        self.slots.get(&purpose).map(|armed| armed.action)
    }

    /// Number of pending transitions across all purposes.
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().map(|armed| armed.deadline).min()
    }

    /// Remove and return the earliest transition due at or before `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<FiredTransition> {
        let (purpose, armed) = self
            .slots
            .iter()
            .filter(|(_, armed)| armed.deadline <= now)
            .min_by_key(|(_, armed)| armed.deadline)
            .map(|(purpose, armed)| (*purpose, *armed))?;
        self.slots.remove(&purpose);
        Some(FiredTransition {
            handle: armed.handle,
            action: armed.action,
            deadline: armed.deadline,
        })
    }
}
