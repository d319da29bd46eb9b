//! Booking state and the version-guarded event dispatcher.

pub mod dispatcher;
pub mod types;

pub use dispatcher::{BookingEventDispatcher, BookingKey};
pub use types::{Booking, BookingStatus};
