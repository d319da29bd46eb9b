//! In-memory credential store for testing.
//!
//! Stores sessions per role without touching the file system, with
//! configurable failure injection for each operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::session::{Role, Session};
use crate::traits::{CredentialStore, CredentialsError};

/// Role-keyed in-memory credential store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    sessions: Arc<Mutex<HashMap<Role, Session>>>,
    load_should_fail: Arc<Mutex<bool>>,
    save_should_fail: Arc<Mutex<bool>>,
    clear_should_fail: Arc<Mutex<bool>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with one session (keyed by its role).
    pub fn with_session(session: Session) -> Self {
        let store = Self::new();
        store
            .sessions
            .lock()
            .unwrap()
            .insert(session.role, session);
        store
    }

    pub fn set_load_should_fail(&self, should_fail: bool) {
        *self.load_should_fail.lock().unwrap() = should_fail;
    }

    pub fn set_save_should_fail(&self, should_fail: bool) {
        *self.save_should_fail.lock().unwrap() = should_fail;
    }

    pub fn set_clear_should_fail(&self, should_fail: bool) {
        *self.clear_should_fail.lock().unwrap() = should_fail;
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self, role: Role) -> Result<Option<Session>, CredentialsError> {
        if *self.load_should_fail.lock().unwrap() {
            return Err(CredentialsError::LoadFailed("mock failure".to_string()));
        }
        Ok(self.sessions.lock().unwrap().get(&role).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), CredentialsError> {
        if *self.save_should_fail.lock().unwrap() {
            return Err(CredentialsError::SaveFailed("mock failure".to_string()));
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.role, session.clone());
        Ok(())
    }

    async fn clear(&self, role: Role) -> Result<(), CredentialsError> {
        if *self.clear_should_fail.lock().unwrap() {
            return Err(CredentialsError::ClearFailed("mock failure".to_string()));
        }
        self.sessions.lock().unwrap().remove(&role);
        Ok(())
    }
}
