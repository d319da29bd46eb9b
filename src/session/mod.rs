//! Authenticated session state and lifecycle.
//!
//! [`Session`] holds the token pair for one actor role; [`SessionManager`]
//! is its sole owner and mutator (sign-in, single-flight refresh,
//! sign-out).

pub mod credentials;
pub mod manager;

pub use credentials::{Role, Session};
pub use manager::{AuthError, SessionManager};
