//! Event-channel transport trait abstraction.
//!
//! The connection manager owns reconnection policy; the transport only
//! performs one authenticated handshake and yields raw text frames
//! until the connection drops. Production uses tokio-tungstenite, tests
//! inject a scripted transport.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::session::Role;

/// Raw text frames from one channel connection. The stream ends when
/// the transport drops; a terminal `Err` item explains why.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ChannelError>> + Send>>;

/// Event channel errors.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// Transport-level failure establishing or holding the connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// The server rejected the handshake credential.
    #[error("Channel authentication rejected")]
    AuthRejected,
    /// The server closed the channel.
    #[error("Channel closed by server")]
    Closed,
    /// A frame could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Trait for establishing one authenticated channel connection.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Perform the handshake for `role` using `token` as the bearer
    /// credential and return the frame stream for the connection.
    async fn connect(&self, role: Role, token: &str) -> Result<FrameStream, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_display() {
        assert_eq!(
            ChannelError::ConnectionFailed("timeout".to_string()).to_string(),
            "Connection failed: timeout"
        );
        assert_eq!(
            ChannelError::AuthRejected.to_string(),
            "Channel authentication rejected"
        );
        assert_eq!(ChannelError::Closed.to_string(), "Channel closed by server");
        assert_eq!(
            ChannelError::Parse("bad json".to_string()).to_string(),
            "Parse error: bad json"
        );
    }
}
