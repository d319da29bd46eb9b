//! Bookwire sync core - session and real-time synchronization for the
//! Bookwire booking marketplace client.
//!
//! This library keeps an authenticated session valid across token expiry,
//! maintains a reconnecting event channel per actor role, applies
//! booking-lifecycle events with version-ordering guarantees, and
//! reconciles pushed notification invalidations with paginated pulls.
//! The UI layer consuming this core lives elsewhere.

pub mod adapters;
pub mod api;
pub mod bookings;
pub mod channel;
pub mod config;
pub mod notifications;
pub mod session;
pub mod traits;
