//! Booking event bus and notification sink.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the booking lifecycle event envelope.
//! - [`NotificationWriter`]: background service that turns user-targeted
//!   events into rows in the `notifications` table.

pub mod bus;
pub mod notifier;

pub use bus::{EventBus, PlatformEvent};
pub use notifier::NotificationWriter;
