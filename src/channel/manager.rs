//! Connection manager: one reconnecting event channel per role.
//!
//! Every (re)connect attempt first obtains a valid token from the
//! session manager, so a channel never authenticates with a stale
//! token. Transport drops reconnect with bounded exponential backoff; a
//! handshake auth rejection gets one refresh-and-retry before the
//! failure is treated as terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::bus::{ChannelEvent, EventBus, SubscriptionId};
use crate::channel::events;
use crate::config::SyncConfig;
use crate::session::{Role, SessionManager};
use crate::traits::{ChannelError, ChannelTransport, FrameStream};

/// Event channel connection state.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u8 },
}

/// Why the channel gave up, carried in the `connection:lost` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostReason {
    /// The credential was rejected even after a refresh. The scope
    /// owner must treat this as a forced sign-out.
    AuthRejected,
    /// Reconnect attempts were exhausted. A manual retry may succeed.
    RetriesExhausted,
}

impl LostReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LostReason::AuthRejected => "authRejected",
            LostReason::RetriesExhausted => "retriesExhausted",
        }
    }
}

struct ConnInner {
    role: Option<Role>,
    shutdown: Option<Arc<AtomicBool>>,
    abort_tx: Option<watch::Sender<bool>>,
}

/// Owns the channel lifecycle for one session scope.
pub struct ConnectionManager {
    session: SessionManager,
    transport: Arc<dyn ChannelTransport>,
    config: SyncConfig,
    bus: EventBus,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<ConnInner>,
}

impl ConnectionManager {
    pub fn new(
        session: SessionManager,
        transport: Arc<dyn ChannelTransport>,
        config: SyncConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            session,
            transport,
            config,
            bus: EventBus::new(),
            state_tx,
            inner: Mutex::new(ConnInner {
                role: None,
                shutdown: None,
                abort_tx: None,
            }),
        }
    }

    /// Open the channel for `role`. Idempotent while a channel is
    /// already open or connecting for the same role; a channel for the
    /// other role is torn down first.
    pub fn connect(&self, role: Role) {
        let mut inner = self.inner.lock().unwrap();
        let state = self.state_tx.borrow().clone();
        if inner.role == Some(role) && state != ConnectionState::Disconnected {
            debug!("connect() ignored, channel already active for {}", role);
            return;
        }
        self.teardown_locked(&mut inner);

        let shutdown = Arc::new(AtomicBool::new(false));
        let (abort_tx, abort_rx) = watch::channel(false);
        inner.role = Some(role);
        inner.shutdown = Some(shutdown.clone());
        inner.abort_tx = Some(abort_tx);

        tokio::spawn(run_channel_loop(
            self.session.clone(),
            Arc::clone(&self.transport),
            self.config.clone(),
            self.bus.clone(),
            role,
            self.state_tx.clone(),
            shutdown,
            abort_rx,
        ));
    }

    /// Close the channel and abort any pending backoff timer. No
    /// further reconnect attempt occurs until the next `connect()`.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.teardown_locked(&mut inner);
        inner.role = None;
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    fn teardown_locked(&self, inner: &mut ConnInner) {
        if let Some(shutdown) = inner.shutdown.take() {
            shutdown.store(true, Ordering::SeqCst);
        }
        if let Some(abort_tx) = inner.abort_tx.take() {
            let _ = abort_tx.send(true);
        }
    }

    /// Register a handler for a named channel event.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.bus.on(event, handler)
    }

    /// Remove a handler by subscription id.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.bus.off(id)
    }

    /// The bus that channel events fan out through.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        self.teardown_locked(&mut inner);
    }
}

enum ReadOutcome {
    Shutdown,
    AuthRejected,
    Dropped,
}

/// Run the channel lifecycle until shutdown or a terminal failure.
#[allow(clippy::too_many_arguments)]
async fn run_channel_loop(
    session: SessionManager,
    transport: Arc<dyn ChannelTransport>,
    config: SyncConfig,
    bus: EventBus,
    role: Role,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: Arc<AtomicBool>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let mut attempt: u8 = 0;
    let mut auth_retry_used = false;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("Channel loop exiting on shutdown");
            return;
        }

        // send_replace updates the value even while nobody holds a
        // receiver; state() reads through the sender.
        state_tx.send_replace(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        });

        // Token freshness is checked on every attempt so the handshake
        // never carries a stale credential.
        let token = match session.get_valid_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Cannot authenticate channel: {}", e);
                emit_connectivity_lost(&state_tx, &bus, LostReason::AuthRejected);
                return;
            }
        };

        match transport.connect(role, &token).await {
            Ok(stream) => {
                // A disconnect() that landed mid-handshake must not be
                // overwritten by a stale Connected.
                if shutdown.load(Ordering::SeqCst) {
                    debug!("Channel loop exiting on shutdown after handshake");
                    return;
                }
                info!("Event channel connected ({})", role);
                state_tx.send_replace(ConnectionState::Connected);
                attempt = 0;
                auth_retry_used = false;

                match read_frames(stream, &bus, &shutdown, &mut abort_rx).await {
                    ReadOutcome::Shutdown => return,
                    ReadOutcome::AuthRejected => {
                        if !refresh_after_rejection(&session, &mut auth_retry_used).await {
                            emit_connectivity_lost(&state_tx, &bus, LostReason::AuthRejected);
                            return;
                        }
                        continue;
                    }
                    ReadOutcome::Dropped => {}
                }
            }
            Err(ChannelError::AuthRejected) => {
                if !refresh_after_rejection(&session, &mut auth_retry_used).await {
                    emit_connectivity_lost(&state_tx, &bus, LostReason::AuthRejected);
                    return;
                }
                continue;
            }
            Err(e) => {
                warn!("Channel connect failed: {}", e);
            }
        }

        attempt = attempt.saturating_add(1);
        if attempt > config.reconnect_max_attempts {
            warn!(
                "Giving up after {} reconnect attempts",
                config.reconnect_max_attempts
            );
            emit_connectivity_lost(&state_tx, &bus, LostReason::RetriesExhausted);
            return;
        }

        let delay = config.reconnect_delay(attempt);
        debug!(
            "Reconnect attempt {} of {} in {:?}",
            attempt, config.reconnect_max_attempts, delay
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = abort_rx.changed() => {
                debug!("Backoff aborted by disconnect");
                return;
            }
        }
    }
}

/// Forward frames to the bus until the stream ends or is aborted.
async fn read_frames(
    mut stream: FrameStream,
    bus: &EventBus,
    shutdown: &Arc<AtomicBool>,
    abort_rx: &mut watch::Receiver<bool>,
) -> ReadOutcome {
    loop {
        let item = tokio::select! {
            item = stream.next() => item,
            _ = abort_rx.changed() => return ReadOutcome::Shutdown,
        };
        if shutdown.load(Ordering::SeqCst) {
            return ReadOutcome::Shutdown;
        }

        match item {
            Some(Ok(text)) => match ChannelEvent::from_frame(&text) {
                Ok(event) => {
                    debug!("Channel event: {}", event.name);
                    bus.emit(&event);
                }
                Err(e) => {
                    // Malformed frames are dropped, never fatal.
                    warn!("Dropping malformed channel frame: {}", e);
                }
            },
            Some(Err(ChannelError::AuthRejected)) => return ReadOutcome::AuthRejected,
            Some(Err(e)) => {
                warn!("Event channel dropped: {}", e);
                return ReadOutcome::Dropped;
            }
            None => {
                info!("Event channel stream ended");
                return ReadOutcome::Dropped;
            }
        }
    }
}

/// One refresh-and-retry is allowed per rejection episode; a second
/// rejection is terminal.
async fn refresh_after_rejection(session: &SessionManager, auth_retry_used: &mut bool) -> bool {
    if *auth_retry_used {
        warn!("Refreshed token still rejected by channel handshake");
        return false;
    }
    *auth_retry_used = true;
    match session.refresh().await {
        Ok(_) => {
            debug!("Retrying handshake with refreshed token");
            true
        }
        Err(e) => {
            warn!("Refresh after channel rejection failed: {}", e);
            false
        }
    }
}

fn emit_connectivity_lost(
    state_tx: &watch::Sender<ConnectionState>,
    bus: &EventBus,
    reason: LostReason,
) {
    state_tx.send_replace(ConnectionState::Disconnected);
    bus.emit(&ChannelEvent::new(
        events::CONNECTION_LOST,
        serde_json::json!({ "reason": reason.as_str() }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 1 }
        );
        assert_ne!(
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 2 }
        );
        assert_ne!(ConnectionState::Connected, ConnectionState::Disconnected);
    }

    #[test]
    fn test_lost_reason_wire_names() {
        assert_eq!(LostReason::AuthRejected.as_str(), "authRejected");
        assert_eq!(LostReason::RetriesExhausted.as_str(), "retriesExhausted");
    }
}
