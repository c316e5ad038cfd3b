//! Outbound event delivery.
//!
//! Workers hand every committed [`JunctionEvent`] to an [`EventSink`].
//! Delivery is best-effort and infallible from the junction's point of
//! view: a sink that cannot deliver logs and drops the event, it never
//! reports back into the state machine.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;
use velocity_types::JunctionEvent;

/// Receiver of committed junction events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn publish(&self, event: &JunctionEvent);
}

impl EventSink for broadcast::Sender<JunctionEvent> {
    fn publish(&self, event: &JunctionEvent) {
        // send only fails when nobody is subscribed.
        let receivers = self.send(event.clone()).unwrap_or(0);
        trace!(
            event = event.name(),
            junction_id = %event.junction_id(),
            receivers,
            "Event broadcast"
        );
    }
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &JunctionEvent) {}
}

/// Forwards each event to every inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of inner sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no inner sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanoutSink {
    fn publish(&self, event: &JunctionEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use velocity_types::{JunctionId, LocationUpdate};

    use super::*;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl EventSink for Recording {
        fn publish(&self, event: &JunctionEvent) {
            self.0.lock().unwrap().push(event.name().to_owned());
        }
    }

    fn location_event() -> JunctionEvent {
        JunctionEvent::JunctionLocationUpdated(LocationUpdate {
            junction_id: JunctionId::from("j1"),
            lat: 1.0,
            lng: 2.0,
            timestamp: 0,
        })
    }

    #[test]
    fn broadcast_without_receivers_is_silent() {
        let (tx, _) = broadcast::channel::<JunctionEvent>(4);
        tx.publish(&location_event());
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel::<JunctionEvent>(4);
        tx.publish(&location_event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.junction_id().as_str(), "j1");
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(Recording::default());
        let b = Arc::new(Recording::default());
        let fanout = FanoutSink::new()
            .with(Arc::clone(&a) as Arc<dyn EventSink>)
            .with(Arc::new(NoopSink))
            .with(Arc::clone(&b) as Arc<dyn EventSink>);

        fanout.publish(&location_event());

        assert_eq!(fanout.len(), 3);
        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert_eq!(b.0.lock().unwrap().as_slice(), ["junction_location_updated"]);
    }
}
