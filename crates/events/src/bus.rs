//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` across the application.
//! Publishing never blocks and never fails: booking transitions must not
//! depend on whether anyone is listening.

use chrono::{DateTime, Utc};
use fieldbook_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event type names published by the booking engine.
pub mod event_types {
    pub const BOOKING_CREATED: &str = "booking.created";
    pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
    pub const BOOKING_FAILED: &str = "booking.failed";
    pub const BOOKING_EXPIRED: &str = "booking.expired";
    pub const BOOKING_CANCELLED: &str = "booking.cancelled";
}

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A booking lifecycle event.
///
/// Constructed via [`PlatformEvent::new`] and enriched with
/// [`for_booking`](PlatformEvent::for_booking),
/// [`notify`](PlatformEvent::notify) and
/// [`with_payload`](PlatformEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"booking.confirmed"`.
    pub event_type: String,

    /// The booking the event is about.
    pub booking_id: Option<DbId>,

    /// The user who should be notified, if anyone.
    pub target_user_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            booking_id: None,
            target_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn for_booking(mut self, booking_id: DbId) -> Self {
        self.booking_id = Some(booking_id);
        self
    }

    /// Address the event to a user.
    pub fn notify(mut self, user_id: DbId) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: PlatformEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_booking_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            PlatformEvent::new(event_types::BOOKING_CONFIRMED)
                .for_booking(42)
                .notify(7)
                .with_payload(serde_json::json!({"order_id": "ORD-1"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "booking.confirmed");
        assert_eq!(received.booking_id, Some(42));
        assert_eq!(received.target_user_id, Some(7));
        assert_eq!(received.payload["order_id"], "ORD-1");
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::new(event_types::BOOKING_EXPIRED));

        assert_eq!(rx1.recv().await.unwrap().event_type, "booking.expired");
        assert_eq!(rx2.recv().await.unwrap().event_type, "booking.expired");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(PlatformEvent::new(event_types::BOOKING_FAILED));
    }

    #[test]
    fn bare_event_is_unaddressed() {
        let event = PlatformEvent::new(event_types::BOOKING_CREATED);
        assert!(event.booking_id.is_none());
        assert!(event.target_user_id.is_none());
        assert!(event.payload.is_object());
    }
}
