//! Booking domain and wire types.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Completed,
}

impl BookingStatus {
    /// Terminal statuses accept no further transitions; countdown
    /// updates are ignored for them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Expired | BookingStatus::Completed
        )
    }
}

/// Locally tracked state for one booking.
///
/// `version` is the server-assigned monotonic sequence for this
/// booking; local state never regresses below it.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: String,
    pub status: BookingStatus,
    pub version: u64,
    /// Countdown deadline (Unix timestamp) for pending bookings.
    pub deadline: Option<i64>,
}

/// Payload carried by `booking:*` and `payment:update` events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEventPayload {
    pub id: String,
    /// Absent on `booking:timer`, which is a side-channel countdown
    /// rather than a status transition.
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub status: Option<BookingStatus>,
    #[serde(default)]
    pub deadline: Option<i64>,
}
