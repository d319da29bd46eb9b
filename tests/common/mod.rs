//! Common fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bookwire::adapters::InMemoryCredentialStore;
use bookwire::api::ApiClient;
use bookwire::config::SyncConfig;
use bookwire::session::{Role, Session, SessionManager};

/// Install a tracing subscriber honoring RUST_LOG; safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session whose access token stays valid for the whole test.
pub fn fresh_session(role: Role) -> Session {
    Session {
        access_token: "fresh-access".to_string(),
        refresh_token: "fresh-refresh".to_string(),
        expires_at: chrono::Utc::now().timestamp() + 3600,
        user_id: Some("user-1".to_string()),
        remember: true,
        role,
    }
}

/// Session whose access token is already expired.
pub fn expired_session(role: Role) -> Session {
    Session {
        expires_at: chrono::Utc::now().timestamp() - 100,
        ..fresh_session(role)
    }
}

/// Short backoff knobs so reconnect tests finish quickly.
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        reconnect_base_delay: Duration::from_millis(10),
        reconnect_multiplier: 2,
        reconnect_max_delay: Duration::from_millis(40),
        reconnect_max_attempts: 3,
        notification_poll_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Session manager with `session` installed, talking to `base_url`.
pub async fn restored_manager(
    session: Session,
    base_url: &str,
) -> (SessionManager, Arc<InMemoryCredentialStore>) {
    let role = session.role;
    let store = Arc::new(InMemoryCredentialStore::with_session(session));
    let manager = SessionManager::new(
        store.clone(),
        ApiClient::with_base_url(base_url.to_string()),
        &fast_config(),
    );
    manager.restore(role).await;
    (manager, store)
}
