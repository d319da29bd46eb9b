//! Notification list reconciliation.

pub mod engine;

pub use crate::api::{NotificationItem, NotificationsPage};
pub use engine::{NotificationError, NotificationSyncEngine};
