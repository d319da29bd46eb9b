//! Event channel transport over tokio-tungstenite.
//!
//! Performs one authenticated WebSocket handshake per call; the
//! connection manager owns all reconnection policy. The server signals
//! a rejected credential either with an HTTP 401/403 during the
//! upgrade or with close code 4401 on an open connection.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use crate::session::Role;
use crate::traits::{ChannelError, ChannelTransport, FrameStream};

/// Close code the server uses for a rejected handshake credential.
const CLOSE_AUTH_REJECTED: u16 = 4401;

/// Production channel transport speaking WebSocket.
#[derive(Debug, Clone)]
pub struct WsTransport {
    /// Base URL, e.g. `wss://api.bookwire.app`.
    base_url: String,
}

impl WsTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn channel_url(&self, role: Role) -> String {
        format!("{}/events?role={}", self.base_url, role)
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(&self, role: Role, token: &str) -> Result<FrameStream, ChannelError> {
        let url = self.channel_url(role);
        debug!("Opening event channel to {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        let header = format!("Bearer {}", token)
            .parse()
            .map_err(|_| ChannelError::ConnectionFailed("invalid token header".to_string()))?;
        request.headers_mut().insert("Authorization", header);

        let (ws, _) = connect_async(request).await.map_err(|e| match e {
            WsError::Http(response)
                if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
            {
                ChannelError::AuthRejected
            }
            other => ChannelError::ConnectionFailed(other.to_string()),
        })?;

        let stream = ws.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => Some(Err(close_error(frame))),
                // Pings and binary frames are not channel events
                Ok(_) => None,
                Err(e) => Some(Err(ChannelError::ConnectionFailed(e.to_string()))),
            }
        });
        Ok(Box::pin(stream))
    }
}

fn close_error(frame: Option<CloseFrame<'_>>) -> ChannelError {
    match frame {
        Some(f) if f.code == CloseCode::Library(CLOSE_AUTH_REJECTED) => ChannelError::AuthRejected,
        _ => ChannelError::Closed,
    }
}
