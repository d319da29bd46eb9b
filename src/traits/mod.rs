//! Trait abstractions for dependency injection and testability.
//!
//! - [`CredentialStore`] - durable, role-keyed session storage
//! - [`ChannelTransport`] - authenticated event-channel handshake

pub mod credentials;
pub mod transport;

pub use credentials::{CredentialStore, CredentialsError};
pub use transport::{ChannelError, ChannelTransport, FrameStream};
