//! Scripted channel transport for testing.
//!
//! Each `connect` call consumes the next scripted outcome: an outright
//! failure, a fixed list of frames (the stream then ends, simulating a
//! transport drop), or a live stream fed from a test-held sender.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::session::Role;
use crate::traits::{ChannelError, ChannelTransport, FrameStream};

/// What one `connect` call should yield.
pub enum ConnectOutcome {
    /// Handshake fails.
    Fail(ChannelError),
    /// Handshake succeeds; the stream yields these items then ends.
    Frames(Vec<Result<String, ChannelError>>),
    /// Handshake succeeds; frames arrive through a test-held sender.
    Live(mpsc::UnboundedReceiver<Result<String, ChannelError>>),
}

/// Scripted transport recording every connect attempt.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<ConnectOutcome>>>,
    connects: Arc<Mutex<Vec<(Role, String)>>>,
    connect_delay: Arc<Mutex<Option<std::time::Duration>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next unscripted connect.
    pub fn push(&self, outcome: ConnectOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Create a live outcome and the sender that feeds it.
    pub fn live() -> (
        mpsc::UnboundedSender<Result<String, ChannelError>>,
        ConnectOutcome,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ConnectOutcome::Live(rx))
    }

    /// Make every handshake take `delay` before resolving, so tests can
    /// interleave calls with an in-flight connect.
    pub fn set_connect_delay(&self, delay: std::time::Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    /// Number of connect attempts made so far.
    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    /// Role and token of every connect attempt, in order.
    pub fn connect_log(&self) -> Vec<(Role, String)> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn connect(&self, role: Role, token: &str) -> Result<FrameStream, ChannelError> {
        self.connects
            .lock()
            .unwrap()
            .push((role, token.to_string()));

        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            None => Err(ChannelError::ConnectionFailed(
                "no scripted outcome".to_string(),
            )),
            Some(ConnectOutcome::Fail(e)) => Err(e),
            Some(ConnectOutcome::Frames(frames)) => Ok(Box::pin(futures::stream::iter(frames))),
            Some(ConnectOutcome::Live(rx)) => Ok(Box::pin(futures::stream::unfold(
                rx,
                |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
            ))),
        }
    }
}
