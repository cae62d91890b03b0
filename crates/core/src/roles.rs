//! Role names carried in caller identity claims.

/// Venue administrators: may release slots and inspect consistency reports.
pub const ROLE_ADMIN: &str = "admin";

/// Regular players making bookings.
pub const ROLE_PLAYER: &str = "player";
