//! NATS integration for the controller.
//!
//! Two directions share one client:
//!
//! - [`NatsEventPublisher`] is an [`EventSink`] that republishes every
//!   junction event on `{prefix}.junction.{junction_id}.{event}`.
//! - [`NatsBridge`] accepts vehicle triggers on `{prefix}.geofence_trigger`
//!   and operator overrides on `{prefix}.manual_override`, with the same
//!   payloads the `WebSocket` channel uses. Requests that carry a reply
//!   subject get a JSON acknowledgement.
//!
//! NATS is optional. When it is not configured or unreachable the
//! controller runs with HTTP and `WebSocket` only.

use std::sync::Arc;

use futures::StreamExt as _;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use velocity_core::{EventSink, JunctionRegistry};
use velocity_gateway::commands::{self, CommandOutcome, ControlCommand};
use velocity_gateway::protocol::{OverrideRequest, ProtocolError, TriggerRequest};
use velocity_types::{JunctionEvent, now_millis};

use crate::error::EngineError;

/// Events buffered between the junction workers and the NATS client.
pub const PUBLISH_BUFFER: usize = 256;

/// Subject carrying vehicle emergency triggers.
pub fn trigger_subject(prefix: &str) -> String {
    format!("{prefix}.geofence_trigger")
}

/// Subject carrying operator overrides.
pub fn override_subject(prefix: &str) -> String {
    format!("{prefix}.manual_override")
}

/// Subject an event is republished on.
pub fn event_subject(prefix: &str, event: &JunctionEvent) -> String {
    format!(
        "{prefix}.junction.{}.{}",
        event.junction_id(),
        event.name()
    )
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Event sink that forwards junction events to NATS.
///
/// Workers call [`EventSink::publish`] synchronously, so events are queued
/// on a bounded channel and a single task publishes them in order. When
/// the queue is full the event is dropped with a warning; NATS subscribers
/// recover on the next event, which carries the full signal set.
#[derive(Debug, Clone)]
pub struct NatsEventPublisher {
    tx: mpsc::Sender<JunctionEvent>,
}

impl NatsEventPublisher {
    /// Create the publisher and spawn its forwarding task.
    ///
    /// The task ends once every clone of the publisher has been dropped,
    /// which happens when the junction workers stop.
    pub fn spawn(client: async_nats::Client, prefix: String) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<JunctionEvent>(PUBLISH_BUFFER);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let subject = event_subject(&prefix, &event);
                let payload = match serde_json::to_vec(&event) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize junction event");
                        continue;
                    }
                };
                if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                    warn!(subject = %subject, error = %e, "failed to publish junction event");
                }
            }
            if let Err(e) = client.flush().await {
                debug!(error = %e, "NATS flush on shutdown failed");
            }
            debug!("NATS event publisher stopped");
        });
        (Self { tx }, handle)
    }
}

impl EventSink for NatsEventPublisher {
    fn publish(&self, event: &JunctionEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            warn!(
                junction_id = %event.junction_id(),
                event = event.name(),
                error = %e,
                "NATS publish queue rejected event"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Which inbound subject a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// `{prefix}.geofence_trigger`
    Trigger,
    /// `{prefix}.manual_override`
    Override,
}

/// Decode an inbound payload into a command.
///
/// Triggers over NATS require both `junctionId` and `vehicleId`, as over
/// `WebSocket`.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] for a payload that is not a JSON
/// object of the expected shape, or the validation error of the request.
pub fn decode_command(kind: InboundKind, payload: &[u8]) -> Result<ControlCommand, ProtocolError> {
    match kind {
        InboundKind::Trigger => serde_json::from_slice::<TriggerRequest>(payload)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?
            .into_command(),
        InboundKind::Override => serde_json::from_slice::<OverrideRequest>(payload)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?
            .into_command(),
    }
}

/// Subscribes to the inbound command subjects and executes them against
/// the junction registry.
pub struct NatsBridge {
    client: async_nats::Client,
    prefix: String,
}

impl NatsBridge {
    /// Create a bridge over an already connected client.
    pub const fn new(client: async_nats::Client, prefix: String) -> Self {
        Self { client, prefix }
    }

    /// Run until `shutdown` is cancelled or both subscriptions end.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if a subscription cannot be created.
    pub async fn run(
        self,
        registry: Arc<JunctionRegistry>,
        shutdown: CancellationToken,
    ) -> Result<(), EngineError> {
        let mut triggers = self.subscribe(trigger_subject(&self.prefix)).await?;
        let mut overrides = self.subscribe(override_subject(&self.prefix)).await?;
        info!(prefix = %self.prefix, "NATS command bridge started");

        loop {
            let (kind, message) = tokio::select! {
                () = shutdown.cancelled() => break,
                msg = triggers.next() => match msg {
                    Some(m) => (InboundKind::Trigger, m),
                    None => break,
                },
                msg = overrides.next() => match msg {
                    Some(m) => (InboundKind::Override, m),
                    None => break,
                },
            };
            self.handle(&registry, kind, message).await;
        }

        info!("NATS command bridge stopped");
        Ok(())
    }

    async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber, EngineError> {
        debug!(subject = %subject, "subscribing");
        self.client
            .subscribe(subject.clone())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })
    }

    async fn handle(
        &self,
        registry: &JunctionRegistry,
        kind: InboundKind,
        message: async_nats::Message,
    ) {
        let result = match decode_command(kind, &message.payload) {
            Ok(command) => commands::execute(registry, command)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let ack = match &result {
            Ok(outcome) => {
                debug!(?kind, junction_id = %outcome.junction_id(), "NATS command applied");
                ack_body(outcome)
            }
            Err(error) => {
                warn!(?kind, subject = %message.subject, error = %error, "NATS command rejected");
                json!({ "success": false, "error": error })
            }
        };

        if let Some(reply) = message.reply {
            if let Err(e) = self.client.publish(reply, ack.to_string().into()).await {
                warn!(error = %e, "failed to send NATS reply");
            }
        }
    }
}

fn ack_body(outcome: &CommandOutcome) -> serde_json::Value {
    match outcome {
        CommandOutcome::Triggered {
            junction_id,
            vehicle_id,
        } => json!({
            "success": true,
            "junctionId": junction_id,
            "vehicleId": vehicle_id,
            "mode": "emergency",
            "timestamp": now_millis(),
        }),
        CommandOutcome::Overridden { junction_id, mode } => json!({
            "success": true,
            "junctionId": junction_id,
            "mode": mode,
            "timestamp": now_millis(),
        }),
        CommandOutcome::Relocated {
            junction_id,
            lat,
            lng,
        } => json!({
            "success": true,
            "junctionId": junction_id,
            "lat": lat,
            "lng": lng,
            "timestamp": now_millis(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use velocity_gateway::commands::OverrideAction;
    use velocity_types::{
        JunctionId, JunctionMode, JunctionUpdate, LocationUpdate, Signals, VehicleId,
    };

    use super::*;

    #[test]
    fn subjects_use_prefix() {
        assert_eq!(trigger_subject("velocity"), "velocity.geofence_trigger");
        assert_eq!(override_subject("city"), "city.manual_override");
    }

    #[test]
    fn event_subject_names_junction_and_event() {
        let event = JunctionEvent::JunctionLocationUpdated(LocationUpdate {
            junction_id: JunctionId::from("junction1"),
            lat: 1.0,
            lng: 2.0,
            timestamp: 0,
        });
        assert_eq!(
            event_subject("velocity", &event),
            "velocity.junction.junction1.junction_location_updated"
        );
    }

    #[test]
    fn decode_trigger_requires_vehicle() {
        let command = decode_command(
            InboundKind::Trigger,
            br#"{"junctionId":"junction1","vehicleId":"amb-7"}"#,
        )
        .unwrap();
        match command {
            ControlCommand::Trigger {
                junction_id,
                vehicle_id,
            } => {
                assert_eq!(junction_id, "junction1");
                assert_eq!(vehicle_id, VehicleId::from("amb-7"));
            }
            other => panic!("expected trigger, got {other:?}"),
        }

        let err = decode_command(InboundKind::Trigger, br#"{"junctionId":"junction1"}"#)
            .unwrap_err();
        assert_eq!(err, ProtocolError::MissingTriggerFields);
    }

    #[test]
    fn decode_override() {
        let command = decode_command(
            InboundKind::Override,
            br#"{"junctionId":"junction2","action":"auto_cycle"}"#,
        )
        .unwrap();
        assert!(matches!(
            command,
            ControlCommand::Override {
                action: OverrideAction::AutoCycle,
                ..
            }
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_command(InboundKind::Override, b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn trigger_ack_shape() {
        let ack = ack_body(&CommandOutcome::Triggered {
            junction_id: JunctionId::from("junction1"),
            vehicle_id: VehicleId::from("amb-1"),
        });
        assert_eq!(ack["success"], true);
        assert_eq!(ack["junctionId"], "junction1");
        assert_eq!(ack["vehicleId"], "amb-1");
        assert_eq!(ack["mode"], "emergency");
    }

    #[test]
    fn override_ack_carries_mode() {
        let ack = ack_body(&CommandOutcome::Overridden {
            junction_id: JunctionId::from("junction2"),
            mode: JunctionMode::AutoCycle,
        });
        assert_eq!(ack["mode"], "auto_cycle");
    }

    #[tokio::test]
    async fn publisher_queue_drops_when_full() {
        let (tx, mut rx) = mpsc::channel::<JunctionEvent>(1);
        let publisher = NatsEventPublisher { tx };
        let event = JunctionEvent::JunctionUpdate(JunctionUpdate {
            junction_id: JunctionId::from("junction1"),
            signals: Signals::all_red(),
            mode: JunctionMode::AutoCycle,
            timestamp: 0,
            current_signal: None,
            triggered_by: None,
        });
        publisher.publish(&event);
        publisher.publish(&event);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
