//! Session lifecycle and single-flight token refresh.
//!
//! [`SessionManager`] is the only component that mutates [`Session`]
//! state. Concurrent callers that hit an expired token all await one
//! shared in-flight refresh; a refresh failure is terminal and degrades
//! to sign-out. There is no background retry loop: the policy is
//! retry-on-next-use.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::future::{FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::SyncConfig;
use crate::session::{Role, Session};
use crate::traits::CredentialStore;

/// Authentication errors surfaced by the session manager.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// No session exists (user is signed out).
    NotAuthenticated,
    /// Refresh exhausted; the session has been cleared and the caller
    /// must treat this as a forced sign-out.
    AuthExpired,
    /// The server rejected a sign-in attempt.
    SignInFailed { status: u16, message: String },
    /// Transient network failure outside the refresh path.
    Network(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
            AuthError::AuthExpired => write!(f, "Session expired"),
            AuthError::SignInFailed { status, message } => {
                write!(f, "Sign-in failed ({}): {}", status, message)
            }
            AuthError::Network(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

type RefreshFuture = Shared<Pin<Box<dyn Future<Output = Result<Session, AuthError>> + Send>>>;

struct SessionState {
    session: Option<Session>,
    /// Shared in-flight refresh; concurrent callers clone and await it
    /// instead of issuing parallel network refreshes.
    in_flight: Option<RefreshFuture>,
    /// Bumped on sign-out to cancel a refresh that is still in flight.
    epoch: u64,
}

struct SessionShared {
    store: Arc<dyn CredentialStore>,
    api: ApiClient,
    refresh_margin_secs: i64,
    state: Mutex<SessionState>,
    epoch_tx: watch::Sender<u64>,
}

/// Validates token freshness, performs single-flight refresh and owns
/// the sign-in/sign-out lifecycle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<SessionShared>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, api: ApiClient, config: &SyncConfig) -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self {
            shared: Arc::new(SessionShared {
                store,
                api,
                refresh_margin_secs: config.refresh_margin_secs,
                state: Mutex::new(SessionState {
                    session: None,
                    in_flight: None,
                    epoch: 0,
                }),
                epoch_tx,
            }),
        }
    }

    /// Load a persisted session for `role` into memory.
    ///
    /// An expired session is still installed; the next token use will
    /// refresh it. Storage failures degrade to logged-out.
    pub async fn restore(&self, role: Role) -> Option<Session> {
        match self.shared.store.load(role).await {
            Ok(Some(session)) => {
                let mut st = self.shared.state.lock().unwrap();
                st.session = Some(session.clone());
                Some(session)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load stored credentials: {}", e);
                None
            }
        }
    }

    /// Authenticate with the server and install the resulting session.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        role: Role,
        remember: bool,
    ) -> Result<Session, AuthError> {
        let tokens = self
            .shared
            .api
            .sign_in(email, password, role, remember)
            .await
            .map_err(|e| match e {
                ApiError::ServerError { status, message } => {
                    AuthError::SignInFailed { status, message }
                }
                other => AuthError::Network(other.to_string()),
            })?;

        let session = Session {
            expires_at: tokens.resolved_expires_at(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user_id: tokens.user_id,
            remember,
            role,
        };

        {
            let mut st = self.shared.state.lock().unwrap();
            st.in_flight = None;
            st.session = Some(session.clone());
        }
        if let Err(e) = self.shared.store.save(&session).await {
            warn!("Failed to persist session after sign-in: {}", e);
        }
        info!("Signed in as {} ({})", session.role, email);
        Ok(session)
    }

    /// Snapshot of the current session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.shared.state.lock().unwrap().session.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.state.lock().unwrap().session.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.shared
            .state
            .lock()
            .unwrap()
            .session
            .as_ref()
            .map(|s| s.role)
    }

    /// Return a token guaranteed fresh for at least the configured
    /// margin, refreshing first if needed.
    ///
    /// All concurrent callers of an expired session await the same
    /// refresh and receive the same token or the same failure.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        let fut = {
            let mut st = self.shared.state.lock().unwrap();
            match &st.session {
                None => return Err(AuthError::NotAuthenticated),
                Some(s) if !s.needs_refresh(self.shared.refresh_margin_secs) => {
                    return Ok(s.access_token.clone());
                }
                Some(s) => {
                    let session = s.clone();
                    self.shared.refresh_future_locked(&mut st, session)
                }
            }
        };
        fut.await.map(|s| s.access_token)
    }

    /// Force a refresh regardless of the token's remaining lifetime.
    ///
    /// Used when the server rejects a token the client still believed
    /// fresh. Single-flight with [`get_valid_token`](Self::get_valid_token).
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let fut = {
            let mut st = self.shared.state.lock().unwrap();
            let Some(session) = st.session.clone() else {
                return Err(AuthError::NotAuthenticated);
            };
            self.shared.refresh_future_locked(&mut st, session)
        };
        fut.await.map(|s| s.access_token)
    }

    /// Sign out: cancel any in-flight refresh, notify the server best
    /// effort and clear local state unconditionally.
    pub async fn sign_out(&self) {
        let prior = {
            let mut st = self.shared.state.lock().unwrap();
            st.epoch += 1;
            st.in_flight = None;
            let _ = self.shared.epoch_tx.send(st.epoch);
            st.session.take()
        };

        let Some(session) = prior else { return };
        info!("Signing out ({})", session.role);

        if let Err(e) = self.shared.api.sign_out(&session.access_token).await {
            debug!("Sign-out notification failed: {}", e);
        }
        if let Err(e) = self.shared.store.clear(session.role).await {
            warn!("Failed to clear stored credentials: {}", e);
        }
    }
}

impl SessionShared {
    /// Return the in-flight refresh, creating it if none exists.
    /// Caller holds the state lock.
    fn refresh_future_locked(
        self: &Arc<Self>,
        st: &mut SessionState,
        session: Session,
    ) -> RefreshFuture {
        if let Some(fut) = &st.in_flight {
            return fut.clone();
        }

        let shared = Arc::clone(self);
        let epoch = st.epoch;
        let mut epoch_rx = self.epoch_tx.subscribe();

        let fut = async move {
            debug!("Refreshing access token for {}", session.role);

            // Racing the network call against the epoch lets sign-out
            // cancel waiters without waiting for the server.
            let result = tokio::select! {
                r = shared.api.refresh(&session.refresh_token) => Some(r),
                _ = epoch_rx.wait_for(|e| *e != epoch) => None,
            };

            let outcome = match result {
                None => {
                    debug!("Refresh cancelled by sign-out");
                    Err(AuthError::AuthExpired)
                }
                Some(Ok(tokens)) => Ok(Session {
                    expires_at: tokens.resolved_expires_at(),
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    user_id: tokens.user_id.or_else(|| session.user_id.clone()),
                    remember: session.remember,
                    role: session.role,
                }),
                Some(Err(e)) => {
                    warn!("Token refresh failed, forcing sign-out: {}", e);
                    Err(AuthError::AuthExpired)
                }
            };

            // Publish the outcome before storage I/O so waiters are not
            // blocked on the filesystem.
            {
                let mut st = shared.state.lock().unwrap();
                if st.epoch != epoch {
                    return Err(AuthError::AuthExpired);
                }
                st.in_flight = None;
                match &outcome {
                    Ok(s) => st.session = Some(s.clone()),
                    Err(_) => st.session = None,
                }
            }

            match &outcome {
                Ok(s) => {
                    if let Err(e) = shared.store.save(s).await {
                        warn!("Failed to persist refreshed session: {}", e);
                    }
                }
                Err(_) => {
                    if let Err(e) = shared.store.clear(session.role).await {
                        warn!("Failed to clear credentials after refresh failure: {}", e);
                    }
                }
            }

            outcome
        };

        let fut: RefreshFuture = fut.boxed().shared();
        st.in_flight = Some(fut.clone());
        fut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::InMemoryCredentialStore;

    fn manager_with(store: Arc<InMemoryCredentialStore>, base_url: &str) -> SessionManager {
        SessionManager::new(
            store,
            ApiClient::with_base_url(base_url.to_string()),
            &SyncConfig::default(),
        )
    }

    fn fresh_session(role: Role) -> Session {
        Session {
            access_token: "fresh-access".to_string(),
            refresh_token: "fresh-refresh".to_string(),
            expires_at: chrono::Utc::now().timestamp() + 3600,
            user_id: Some("user-1".to_string()),
            remember: true,
            role,
        }
    }

    #[tokio::test]
    async fn test_get_valid_token_without_session() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = manager_with(store, "http://127.0.0.1:59999");
        assert_eq!(
            manager.get_valid_token().await,
            Err(AuthError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_network() {
        // The API URL is unreachable, so returning Ok proves no
        // network refresh was attempted for a fresh token.
        let store = Arc::new(InMemoryCredentialStore::with_session(fresh_session(
            Role::Customer,
        )));
        let manager = manager_with(store, "http://127.0.0.1:59999");
        manager.restore(Role::Customer).await;

        let token = manager.get_valid_token().await.unwrap();
        assert_eq!(token, "fresh-access");
    }

    #[tokio::test]
    async fn test_restore_missing_role() {
        let store = Arc::new(InMemoryCredentialStore::with_session(fresh_session(
            Role::Customer,
        )));
        let manager = manager_with(store, "http://127.0.0.1:59999");
        assert!(manager.restore(Role::Vendor).await.is_none());
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_restore_survives_store_failure() {
        let store = Arc::new(InMemoryCredentialStore::new());
        store.set_load_should_fail(true);
        let manager = manager_with(store, "http://127.0.0.1:59999");
        assert!(manager.restore(Role::Customer).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_refresh_against_dead_server_degrades_to_sign_out() {
        let mut session = fresh_session(Role::Customer);
        session.expires_at = 0;
        let store = Arc::new(InMemoryCredentialStore::with_session(session));
        let manager = manager_with(store.clone(), "http://127.0.0.1:59999");
        manager.restore(Role::Customer).await;

        assert_eq!(manager.get_valid_token().await, Err(AuthError::AuthExpired));
        assert!(!manager.is_authenticated());
        assert!(store.load(Role::Customer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_everything() {
        let store = Arc::new(InMemoryCredentialStore::with_session(fresh_session(
            Role::Vendor,
        )));
        let manager = manager_with(store.clone(), "http://127.0.0.1:59999");
        manager.restore(Role::Vendor).await;
        assert!(manager.is_authenticated());

        manager.sign_out().await;
        assert!(!manager.is_authenticated());
        assert!(manager.role().is_none());
        assert!(store.load(Role::Vendor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_noop() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = manager_with(store, "http://127.0.0.1:59999");
        manager.sign_out().await;
        assert!(!manager.is_authenticated());
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::AuthExpired.to_string(), "Session expired");
        assert_eq!(
            AuthError::NotAuthenticated.to_string(),
            "Not authenticated"
        );
        assert_eq!(
            AuthError::SignInFailed {
                status: 403,
                message: "bad password".to_string()
            }
            .to_string(),
            "Sign-in failed (403): bad password"
        );
    }
}
