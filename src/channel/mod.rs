//! Authenticated, reconnecting event channel.
//!
//! [`ConnectionManager`] owns one logical channel per actor role and
//! couples every (re)connect attempt to token freshness via the session
//! manager. Parsed events fan out through the typed [`EventBus`].

pub mod bus;
pub mod manager;

pub use bus::{ChannelEvent, EventBus, SubscriptionId};
pub use manager::{ConnectionManager, ConnectionState, LostReason};

/// Event names pushed over the channel.
pub mod events {
    pub const BOOKING_NEW: &str = "booking:new";
    pub const BOOKING_ACCEPTED: &str = "booking:accepted";
    pub const BOOKING_REJECTED: &str = "booking:rejected";
    pub const BOOKING_EXPIRED: &str = "booking:expired";
    pub const BOOKING_COMPLETED: &str = "booking:completed";
    pub const BOOKING_TIMER: &str = "booking:timer";
    pub const PAYMENT_UPDATE: &str = "payment:update";
    pub const SUPPORT_MESSAGE: &str = "support:message";
    /// Emitted locally, exactly once, when reconnection gives up.
    pub const CONNECTION_LOST: &str = "connection:lost";

    /// Booking-lifecycle events the dispatcher consumes.
    pub const BOOKING_EVENTS: &[&str] = &[
        BOOKING_NEW,
        BOOKING_ACCEPTED,
        BOOKING_REJECTED,
        BOOKING_EXPIRED,
        BOOKING_COMPLETED,
        BOOKING_TIMER,
        PAYMENT_UPDATE,
    ];
}
