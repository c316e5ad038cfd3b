//! Per-junction worker task.
//!
//! Each junction is owned by exactly one [`JunctionWorker`] running on its
//! own tokio task. The worker is the junction's lock: commands from the
//! transports and transition deadlines from the timer are handled one at a
//! time inside its loop, so every read-decide-write sequence is a single
//! critical section and events are published in commit order.
//!
//! Callers talk to the worker through a cloneable [`JunctionHandle`].
//! Every request carries a oneshot reply with the state as committed.

use std::future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use velocity_types::{JunctionEvent, JunctionId, JunctionState, VehicleId};

use crate::junction::Junction;
use crate::sink::EventSink;

/// Capacity of each junction's command queue.
pub const COMMAND_CAPACITY: usize = 64;

/// Errors returned when talking to a junction worker.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The worker has stopped and no longer accepts commands.
    #[error("junction worker for {junction_id} is not running")]
    WorkerGone {
        /// Junction whose worker is gone.
        junction_id: JunctionId,
    },

    /// The worker accepted the command but stopped before replying.
    #[error("junction worker for {junction_id} dropped the reply")]
    NoReply {
        /// Junction whose worker dropped the reply.
        junction_id: JunctionId,
    },
}

/// A request to a junction worker.
#[derive(Debug)]
pub(crate) enum Command {
    StartAutoCycle {
        reply: oneshot::Sender<JunctionState>,
    },
    TriggerEmergency {
        vehicle: VehicleId,
        reply: oneshot::Sender<JunctionState>,
    },
    UpdateLocation {
        lat: f64,
        lng: f64,
        reply: oneshot::Sender<JunctionState>,
    },
    Snapshot {
        reply: oneshot::Sender<JunctionState>,
    },
}

/// Cloneable handle to one junction's worker.
#[derive(Debug, Clone)]
pub struct JunctionHandle {
    id: JunctionId,
    tx: mpsc::Sender<Command>,
}

impl JunctionHandle {
    /// Junction this handle talks to.
    pub const fn id(&self) -> &JunctionId {
        &self.id
    }

    /// Enter or restart the rotation at North.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the worker has stopped.
    pub async fn start_auto_cycle(&self) -> Result<JunctionState, ControllerError> {
        self.request(|reply| Command::StartAutoCycle { reply }).await
    }

    /// Preempt the junction for `vehicle`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the worker has stopped.
    pub async fn trigger_emergency(
        &self,
        vehicle: VehicleId,
    ) -> Result<JunctionState, ControllerError> {
        self.request(|reply| Command::TriggerEmergency { vehicle, reply })
            .await
    }

    /// Move the junction.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the worker has stopped.
    pub async fn update_location(
        &self,
        lat: f64,
        lng: f64,
    ) -> Result<JunctionState, ControllerError> {
        self.request(|reply| Command::UpdateLocation { lat, lng, reply })
            .await
    }

    /// Current committed state.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the worker has stopped.
    pub async fn snapshot(&self) -> Result<JunctionState, ControllerError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<F>(&self, build: F) -> Result<JunctionState, ControllerError>
    where
        F: FnOnce(oneshot::Sender<JunctionState>) -> Command,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ControllerError::WorkerGone {
                junction_id: self.id.clone(),
            })?;
        rx.await.map_err(|_| ControllerError::NoReply {
            junction_id: self.id.clone(),
        })
    }
}

/// The task that owns one [`Junction`].
pub struct JunctionWorker {
    junction: Junction,
    rx: mpsc::Receiver<Command>,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for JunctionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JunctionWorker")
            .field("junction", &self.junction)
            .finish_non_exhaustive()
    }
}

impl JunctionWorker {
    /// Wrap `junction` in a worker and return it with its handle.
    ///
    /// The worker does nothing until [`run`](Self::run) is awaited.
    pub fn new(
        junction: Junction,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> (Self, JunctionHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = JunctionHandle {
            id: junction.id().clone(),
            tx,
        };
        let worker = Self {
            junction,
            rx,
            sink,
            shutdown,
        };
        (worker, handle)
    }

    /// Serve commands and fire transitions until shutdown.
    ///
    /// Stops when the shutdown token is cancelled or every handle has been
    /// dropped. Pending transitions are discarded on exit.
    pub async fn run(mut self) {
        debug!(junction_id = %self.junction.id(), "Junction worker started");

        loop {
            let deadline = self.junction.next_deadline();
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                () = sleep_until_deadline(deadline) => {
                    self.fire_due();
                }

                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        info!(
            junction_id = %self.junction.id(),
            discarded = self.junction.timer().pending_count(),
            "Junction worker stopped"
        );
    }

    fn fire_due(&mut self) {
        let events = self.junction.fire_due(Instant::now());
        self.commit(&events);
    }

    fn handle(&mut self, command: Command) {
        // Transitions due before the command arrived are applied first so
        // the command sees the state the clock says is current.
        self.fire_due();

        let now = Instant::now();
        let reply = match command {
            Command::StartAutoCycle { reply } => {
                let event = self.junction.start_auto_cycle(now);
                self.commit(&[event]);
                reply
            }
            Command::TriggerEmergency { vehicle, reply } => {
                let event = self.junction.trigger_emergency(vehicle, now);
                self.commit(&[event]);
                reply
            }
            Command::UpdateLocation { lat, lng, reply } => {
                let event = self.junction.update_location(lat, lng);
                self.commit(&[event]);
                reply
            }
            Command::Snapshot { reply } => reply,
        };

        // The caller may have given up waiting; the command still stands.
        let _ = reply.send(self.junction.snapshot());
    }

    fn commit(&self, events: &[JunctionEvent]) {
        if let Some(violation) = self.junction.invariant_violation() {
            error!(junction_id = %self.junction.id(), violation, "Junction invariant broken");
        }
        for event in events {
            self.sink.publish(event);
        }
    }
}

/// Sleep until `deadline`, or forever if nothing is scheduled.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
