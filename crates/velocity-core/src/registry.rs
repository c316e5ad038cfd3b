//! The set of junctions known to the controller.
//!
//! [`JunctionRegistry`] is built once at startup from the configured
//! junction table and never gains or loses entries afterwards. Lookups go
//! straight to the immutable handle map; every mutation is forwarded to
//! the owning junction's worker, which is the only place junction state is
//! ever written.
//!
//! Operations addressed to an id the registry does not know are inert:
//! they return `Ok(false)` (or `Ok(None)`) without mutating anything and
//! without emitting an event. Mapping that to a 404 or an error frame is
//! the transport's job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use velocity_types::{JunctionId, JunctionState, StatusSnapshot, VehicleId, now_millis};

use crate::config::VelocityConfig;
use crate::junction::Junction;
use crate::sink::EventSink;
use crate::worker::{ControllerError, JunctionHandle, JunctionWorker};

/// All junctions and their workers.
#[derive(Debug)]
pub struct JunctionRegistry {
    handles: BTreeMap<JunctionId, JunctionHandle>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl JunctionRegistry {
    /// Spawn one worker per configured junction.
    ///
    /// Must be called from inside a tokio runtime. Junctions start with
    /// every signal RED; call [`start_all`](Self::start_all) to begin
    /// cycling.
    pub fn spawn(config: &VelocityConfig, sink: Arc<dyn EventSink>) -> Self {
        let shutdown = CancellationToken::new();
        let mut handles = BTreeMap::new();
        let mut tasks = Vec::with_capacity(config.junctions.len());

        for (id, junction_config) in &config.junctions {
            let junction = Junction::new(id.clone(), junction_config, config.timing);
            let (worker, handle) =
                JunctionWorker::new(junction, Arc::clone(&sink), shutdown.child_token());
            tasks.push(tokio::spawn(worker.run()));
            handles.insert(id.clone(), handle);
        }

        info!(junction_count = handles.len(), "Junction workers spawned");

        Self {
            handles,
            shutdown,
            tasks: Mutex::new(tasks),
            started: AtomicBool::new(false),
        }
    }

    /// Handle for the junction `id`, if configured.
    pub fn get(&self, id: &str) -> Option<&JunctionHandle> {
        self.handles.get(id)
    }

    /// Whether `id` names a configured junction.
    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    /// Configured junction ids, in order.
    pub fn ids(&self) -> impl Iterator<Item = &JunctionId> {
        self.handles.keys()
    }

    /// Number of configured junctions.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no junctions are configured.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Start auto-cycling on every junction.
    ///
    /// Only the first call has any effect; later calls return `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if a worker has stopped.
    pub async fn start_all(&self) -> Result<bool, ControllerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Auto cycle already started, ignoring");
            return Ok(false);
        }
        for handle in self.handles.values() {
            handle.start_auto_cycle().await?;
        }
        info!(junction_count = self.handles.len(), "Auto cycle started on all junctions");
        Ok(true)
    }

    /// Preempt junction `id` for `vehicle`.
    ///
    /// Returns `Ok(false)` if `id` is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the junction's worker has stopped.
    pub async fn trigger_emergency(
        &self,
        id: &str,
        vehicle: VehicleId,
    ) -> Result<bool, ControllerError> {
        let Some(handle) = self.get(id) else {
            warn!(junction_id = id, vehicle_id = %vehicle, "Trigger for unknown junction");
            return Ok(false);
        };
        handle.trigger_emergency(vehicle).await?;
        Ok(true)
    }

    /// Put junction `id` back into the rotation, starting at North.
    ///
    /// Returns `Ok(false)` if `id` is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the junction's worker has stopped.
    pub async fn request_auto_cycle(&self, id: &str) -> Result<bool, ControllerError> {
        let Some(handle) = self.get(id) else {
            warn!(junction_id = id, "Auto cycle request for unknown junction");
            return Ok(false);
        };
        handle.start_auto_cycle().await?;
        Ok(true)
    }

    /// Move junction `id`.
    ///
    /// Returns `Ok(false)` if `id` is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the junction's worker has stopped.
    pub async fn update_location(
        &self,
        id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<bool, ControllerError> {
        let Some(handle) = self.get(id) else {
            warn!(junction_id = id, "Location update for unknown junction");
            return Ok(false);
        };
        handle.update_location(lat, lng).await?;
        Ok(true)
    }

    /// State of junction `id`, or `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the junction's worker has stopped.
    pub async fn junction(&self, id: &str) -> Result<Option<JunctionState>, ControllerError> {
        match self.get(id) {
            Some(handle) => handle.snapshot().await.map(Some),
            None => Ok(None),
        }
    }

    /// State of every junction.
    ///
    /// Each entry is consistent on its own; entries for different
    /// junctions may be taken at slightly different instants.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if a worker has stopped.
    pub async fn all(&self) -> Result<BTreeMap<JunctionId, JunctionState>, ControllerError> {
        let mut junctions = BTreeMap::new();
        for (id, handle) in &self.handles {
            junctions.insert(id.clone(), handle.snapshot().await?);
        }
        Ok(junctions)
    }

    /// Timestamped state of every junction, as served by `/status`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if a worker has stopped.
    pub async fn snapshot(&self) -> Result<StatusSnapshot, ControllerError> {
        let junctions = self.all().await?;
        Ok(StatusSnapshot {
            timestamp: now_millis(),
            junctions,
        })
    }

    /// Stop every worker and wait for them to exit.
    ///
    /// Pending transitions are discarded. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Junction worker task failed");
            }
        }
        info!("All junction workers stopped");
    }
}
