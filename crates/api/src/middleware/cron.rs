//! Shared-secret authentication for scheduled sweep triggers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use fieldbook_core::error::CoreError;
use fieldbook_core::payment_signature::secrets_match;

use super::auth::bearer_token;
use crate::error::AppError;
use crate::state::AppState;

/// Marker extractor: the request carried `Authorization: Bearer <CRON_SECRET>`.
pub struct CronAuth;

impl FromRequestParts<AppState> for CronAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = bearer_token(parts)?;
        if !secrets_match(presented, &state.config.cron_secret) {
            tracing::warn!("Rejected scheduled trigger with a bad secret");
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid cron secret".into(),
            )));
        }
        Ok(CronAuth)
    }
}
