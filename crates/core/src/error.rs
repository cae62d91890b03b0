use crate::status::BookingStatus;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a [`ReservationError`] should be surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Another claimant holds the resource. User-actionable, never retried.
    Conflict,
    /// Operation attempted in the wrong lifecycle state; caller should re-fetch.
    StateViolation,
    NotFound,
    /// A lock or booking timed out; caller restarts from slot selection.
    Expired,
    Validation,
    /// The payment provider failed or could not be authenticated.
    ExternalDependency,
}

/// Typed failures of the reservation lifecycle.
///
/// Every variant carries a stable [`code`](ReservationError::code) that
/// clients can match on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    #[error("Field {0} not found")]
    FieldNotFound(DbId),

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot has already started")]
    SlotAlreadyStarted,

    #[error("Slot is already booked")]
    SlotAlreadyBooked,

    #[error("Slot is unavailable")]
    SlotUnavailable,

    #[error("Slot is locked by another player")]
    SlotLockedByOther,

    #[error("Slot lock has expired, select the slot again")]
    SlotLockExpired,

    #[error("Booking {0} not found")]
    BookingNotFound(DbId),

    #[error("Booking belongs to another user")]
    BookingNotOwned,

    #[error("Booking is {actual}, expected {expected}")]
    BookingInvalidState {
        expected: BookingStatus,
        actual: BookingStatus,
    },

    #[error("Booking has expired")]
    BookingExpired,

    #[error("A request with this key is still being processed")]
    BookingInProgress,

    #[error("Booking limit exceeded: {0}")]
    BookingLimitExceeded(String),

    #[error("Payment not found for order {0}")]
    PaymentNotFound(String),

    #[error("Payment has already been processed")]
    PaymentAlreadyProcessed,

    #[error("Payment identifiers are already bound to another booking")]
    DuplicatePayment,

    #[error("Payment amount mismatch: expected {expected}, got {actual}")]
    PaymentAmountMismatch { expected: i64, actual: i64 },

    #[error("Idempotency key was reused with a different request")]
    DuplicateRequestConflict,

    #[error("Idempotency key belongs to another user or operation")]
    IdempotencyKeyMisuse,

    #[error("Payment callback signature is invalid")]
    InvalidSignature,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

impl ReservationError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FieldNotFound(_) => "FIELD_NOT_FOUND",
            Self::SlotNotFound => "SLOT_NOT_FOUND",
            Self::SlotAlreadyStarted => "SLOT_ALREADY_STARTED",
            Self::SlotAlreadyBooked => "SLOT_ALREADY_BOOKED",
            Self::SlotUnavailable => "SLOT_UNAVAILABLE",
            Self::SlotLockedByOther => "SLOT_LOCKED_BY_OTHER",
            Self::SlotLockExpired => "SLOT_LOCK_EXPIRED",
            Self::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            Self::BookingNotOwned => "BOOKING_NOT_OWNED",
            Self::BookingInvalidState { .. } => "BOOKING_INVALID_STATE",
            Self::BookingExpired => "BOOKING_EXPIRED",
            Self::BookingInProgress => "BOOKING_IN_PROGRESS",
            Self::BookingLimitExceeded(_) => "BOOKING_LIMIT_EXCEEDED",
            Self::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            Self::PaymentAlreadyProcessed => "PAYMENT_ALREADY_PROCESSED",
            Self::DuplicatePayment => "DUPLICATE_PAYMENT",
            Self::PaymentAmountMismatch { .. } => "PAYMENT_AMOUNT_MISMATCH",
            Self::DuplicateRequestConflict => "DUPLICATE_REQUEST_CONFLICT",
            Self::IdempotencyKeyMisuse => "IDEMPOTENCY_KEY_MISUSE",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SlotAlreadyBooked
            | Self::SlotLockedByOther
            | Self::BookingInProgress
            | Self::PaymentAlreadyProcessed
            | Self::DuplicatePayment
            | Self::DuplicateRequestConflict => ErrorCategory::Conflict,
            Self::SlotUnavailable
            | Self::SlotAlreadyStarted
            | Self::BookingNotOwned
            | Self::BookingInvalidState { .. } => ErrorCategory::StateViolation,
            Self::FieldNotFound(_)
            | Self::SlotNotFound
            | Self::BookingNotFound(_)
            | Self::PaymentNotFound(_) => ErrorCategory::NotFound,
            Self::SlotLockExpired | Self::BookingExpired => ErrorCategory::Expired,
            Self::BookingLimitExceeded(_)
            | Self::PaymentAmountMismatch { .. }
            | Self::IdempotencyKeyMisuse => ErrorCategory::Validation,
            Self::InvalidSignature | Self::GatewayUnavailable(_) => {
                ErrorCategory::ExternalDependency
            }
        }
    }

    /// Whether the caller may retry the identical request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_) | Self::BookingInProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_conflicts_are_conflicts() {
        assert_eq!(
            ReservationError::SlotLockedByOther.category(),
            ErrorCategory::Conflict
        );
        assert_eq!(ReservationError::SlotLockedByOther.code(), "SLOT_LOCKED_BY_OTHER");
    }

    #[test]
    fn invalid_state_message_names_both_states() {
        let err = ReservationError::BookingInvalidState {
            expected: BookingStatus::Draft,
            actual: BookingStatus::Confirmed,
        };
        assert_eq!(err.to_string(), "Booking is confirmed, expected draft");
        assert_eq!(err.category(), ErrorCategory::StateViolation);
    }

    #[test]
    fn only_gateway_and_in_flight_are_retryable() {
        assert!(ReservationError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(ReservationError::BookingInProgress.is_retryable());
        assert!(!ReservationError::InvalidSignature.is_retryable());
        assert!(!ReservationError::SlotLockExpired.is_retryable());
    }
}
