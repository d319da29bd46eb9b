//! Concrete implementations of trait abstractions.
//!
//! Production adapters wrap the real storage medium and WebSocket
//! stack; the [`mock`] submodule provides test doubles for both.
//!
//! - [`FileCredentialStore`] - JSON file-based session storage
//! - [`WsTransport`] - event channel over tokio-tungstenite
//! - [`mock::InMemoryCredentialStore`] - in-memory session storage
//! - [`mock::MockTransport`] - scripted channel transport

pub mod file_credentials;
pub mod mock;
pub mod tungstenite_ws;

pub use file_credentials::FileCredentialStore;
pub use mock::{InMemoryCredentialStore, MockTransport};
pub use tungstenite_ws::WsTransport;
