//! Best-effort notification sink.
//!
//! [`NotificationWriter`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes every user-targeted [`PlatformEvent`] to the `notifications`
//! table. Write failures are logged and dropped; they never reach the code
//! that published the event.

use fieldbook_core::types::DbId;
use fieldbook_db::repositories::NotificationRepo;
use fieldbook_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::PlatformEvent;

/// Background service that persists notifications.
pub struct NotificationWriter;

impl NotificationWriter {
    /// Run the writer loop until the bus is dropped.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            booking_id = ?event.booking_id,
                            "Failed to write notification"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification writer lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification writer shutting down");
                    break;
                }
            }
        }
    }

    /// Write one event. Events without a target user are skipped.
    pub async fn persist(
        pool: &DbPool,
        event: &PlatformEvent,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let Some(user_id) = event.target_user_id else {
            return Ok(None);
        };
        let id = NotificationRepo::create(
            pool,
            user_id,
            &event.event_type,
            event.booking_id,
            &event.payload,
        )
        .await?;
        Ok(Some(id))
    }
}
