use std::sync::Arc;

use crate::config::ServerConfig;
use crate::gateway::PaymentGateway;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: fieldbook_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Centralized event bus for booking lifecycle events.
    pub event_bus: Arc<fieldbook_events::EventBus>,
    /// Payment provider (live or mock).
    pub gateway: Arc<dyn PaymentGateway>,
}
