//! REST collaborator for the Bookwire backend.

pub mod client;

pub use client::{
    ApiClient, ApiError, NotificationItem, NotificationsPage, TokenResponse, DEFAULT_API_URL,
};
