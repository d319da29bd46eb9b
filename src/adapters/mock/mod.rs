//! Test doubles for the injectable seams.

pub mod credentials;
pub mod transport;

pub use credentials::InMemoryCredentialStore;
pub use transport::{ConnectOutcome, MockTransport};
