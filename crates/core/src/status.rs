//! Status enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. They live in `core` so
//! the state machine and joint-validity rules can be expressed without a
//! database dependency; the `db` crate binds them via [`StatusId`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID, `None` for unknown ids.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Stable snake_case name, matching the lookup table `name` column.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                match name.as_str() {
                    $( $label => Ok(Self::$variant), )+
                    other => Err(serde::de::Error::custom(format!(
                        "unknown {} '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

define_status_enum! {
    /// Operational status of a field.
    FieldStatus {
        Open = 1 => "open",
        Closed = 2 => "closed",
        Maintenance = 3 => "maintenance",
    }
}

define_status_enum! {
    /// Slot availability status.
    SlotStatus {
        Available = 1 => "available",
        TemporarilyLocked = 2 => "temporarily_locked",
        Booked = 3 => "booked",
        Unavailable = 4 => "unavailable",
    }
}

define_status_enum! {
    /// Booking lifecycle status.
    BookingStatus {
        Draft = 1 => "draft",
        PendingPayment = 2 => "pending_payment",
        Confirmed = 3 => "confirmed",
        Failed = 4 => "failed",
        Expired = 5 => "expired",
        Cancelled = 6 => "cancelled",
    }
}

define_status_enum! {
    /// Payment status, tracked both on the payment row and on its booking.
    PaymentStatus {
        Pending = 1 => "pending",
        Processing = 2 => "processing",
        Paid = 3 => "paid",
        Failed = 4 => "failed",
        Refunded = 5 => "refunded",
    }
}

impl BookingStatus {
    /// Statuses that still hold a claim on the slot.
    pub const LIVE: [BookingStatus; 3] = [
        BookingStatus::Draft,
        BookingStatus::PendingPayment,
        BookingStatus::Confirmed,
    ];

    /// Statuses counted against a player's daily/weekly allowance.
    pub const COUNTED_FOR_LIMITS: [BookingStatus; 2] =
        [BookingStatus::Confirmed, BookingStatus::PendingPayment];

    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed
                | BookingStatus::Failed
                | BookingStatus::Expired
                | BookingStatus::Cancelled
        )
    }
}

impl PaymentStatus {
    /// A payment in one of these statuses accepts no further callbacks.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_status_ids_match_seed_data() {
        assert_eq!(SlotStatus::Available.id(), 1);
        assert_eq!(SlotStatus::TemporarilyLocked.id(), 2);
        assert_eq!(SlotStatus::Booked.id(), 3);
        assert_eq!(SlotStatus::Unavailable.id(), 4);
    }

    #[test]
    fn booking_status_ids_match_seed_data() {
        assert_eq!(BookingStatus::Draft.id(), 1);
        assert_eq!(BookingStatus::PendingPayment.id(), 2);
        assert_eq!(BookingStatus::Confirmed.id(), 3);
        assert_eq!(BookingStatus::Failed.id(), 4);
        assert_eq!(BookingStatus::Expired.id(), 5);
        assert_eq!(BookingStatus::Cancelled.id(), 6);
    }

    #[test]
    fn from_id_round_trips_and_rejects_unknown() {
        assert_eq!(PaymentStatus::from_id(3), Some(PaymentStatus::Paid));
        assert_eq!(FieldStatus::from_id(3), Some(FieldStatus::Maintenance));
        assert_eq!(SlotStatus::from_id(0), None);
        assert_eq!(BookingStatus::from_id(42), None);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = BookingStatus::PendingPayment.into();
        assert_eq!(id, 2);
    }

    #[test]
    fn serializes_as_snake_case_name() {
        let json = serde_json::to_string(&SlotStatus::TemporarilyLocked).unwrap();
        assert_eq!(json, "\"temporarily_locked\"");
    }

    #[test]
    fn deserializes_from_name_and_rejects_unknown() {
        let status: BookingStatus = serde_json::from_str("\"pending_payment\"").unwrap();
        assert_eq!(status, BookingStatus::PendingPayment);
        assert!(serde_json::from_str::<BookingStatus>("\"paid\"").is_err());
    }

    #[test]
    fn draft_and_pending_are_not_terminal() {
        assert!(!BookingStatus::Draft.is_terminal());
        assert!(!BookingStatus::PendingPayment.is_terminal());
        assert!(BookingStatus::Expired.is_terminal());
    }
}
