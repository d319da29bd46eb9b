//! File-based credential store.
//!
//! Persists both role slots to `~/.bookwire/.credentials.json`. A
//! missing or malformed file reads as logged-out for both roles; the
//! two slots are written independently so customer and vendor sessions
//! never cross-contaminate.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::{Role, Session};
use crate::traits::{CredentialStore, CredentialsError};

/// The credentials directory name.
const CREDENTIALS_DIR: &str = ".bookwire";

/// The credentials file name.
const CREDENTIALS_FILE: &str = ".credentials.json";

/// On-disk layout: one optional session per role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct StoredCredentials {
    #[serde(default)]
    customer: Option<Session>,
    #[serde(default)]
    vendor: Option<Session>,
}

impl StoredCredentials {
    fn slot(&self, role: Role) -> &Option<Session> {
        match role {
            Role::Customer => &self.customer,
            Role::Vendor => &self.vendor,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Session> {
        match role {
            Role::Customer => &mut self.customer,
            Role::Vendor => &mut self.vendor,
        }
    }
}

/// Credential store backed by a JSON file in the user's home directory.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store at the default location.
    ///
    /// Returns `None` if the home directory cannot be determined.
    pub fn new() -> Option<Self> {
        let home = dirs::home_dir()?;
        Some(Self {
            path: home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE),
        })
    }

    /// Create a store at a custom path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path to the credentials file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read the whole file; missing or malformed content reads as
    /// empty (fail-safe to logged-out).
    fn read_file(&self) -> StoredCredentials {
        if !self.path.exists() {
            return StoredCredentials::default();
        }
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return StoredCredentials::default(),
        };
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Malformed credentials file, treating as empty: {}", e);
                StoredCredentials::default()
            }
        }
    }

    fn write_file(&self, stored: &StoredCredentials) -> Result<(), CredentialsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
            }
        }
        let file =
            File::create(&self.path).map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, stored)
            .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| CredentialsError::SaveFailed(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, role: Role) -> Result<Option<Session>, CredentialsError> {
        Ok(self.read_file().slot(role).clone())
    }

    async fn save(&self, session: &Session) -> Result<(), CredentialsError> {
        let mut stored = self.read_file();
        *stored.slot_mut(session.role) = Some(session.clone());
        self.write_file(&stored)
    }

    async fn clear(&self, role: Role) -> Result<(), CredentialsError> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut stored = self.read_file();
        *stored.slot_mut(role) = None;
        self.write_file(&stored)
            .map_err(|e| CredentialsError::ClearFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(temp_dir: &TempDir) -> FileCredentialStore {
        FileCredentialStore::with_path(
            temp_dir.path().join(CREDENTIALS_DIR).join(CREDENTIALS_FILE),
        )
    }

    fn session(role: Role, token: &str) -> Session {
        Session {
            access_token: token.to_string(),
            refresh_token: format!("{}-refresh", token),
            expires_at: 1999999999,
            user_id: Some("user-1".to_string()),
            remember: true,
            role,
        }
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        assert_eq!(store.load(Role::Customer).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let customer = session(Role::Customer, "customer-token");
        store.save(&customer).await.unwrap();

        let loaded = store.load(Role::Customer).await.unwrap().unwrap();
        assert_eq!(loaded, customer);
    }

    #[tokio::test]
    async fn test_roles_do_not_cross_contaminate() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let customer = session(Role::Customer, "customer-token");
        let vendor = session(Role::Vendor, "vendor-token");
        store.save(&customer).await.unwrap();
        store.save(&vendor).await.unwrap();

        assert_eq!(
            store
                .load(Role::Customer)
                .await
                .unwrap()
                .unwrap()
                .access_token,
            "customer-token"
        );
        assert_eq!(
            store.load(Role::Vendor).await.unwrap().unwrap().access_token,
            "vendor-token"
        );

        // Clearing one role leaves the other intact
        store.clear(Role::Customer).await.unwrap();
        assert_eq!(store.load(Role::Customer).await.unwrap(), None);
        assert!(store.load(Role::Vendor).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_file_reads_as_logged_out() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not valid json").unwrap();

        assert_eq!(store.load(Role::Customer).await.unwrap(), None);
        assert_eq!(store.load(Role::Vendor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_creates_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        assert!(!store.path().parent().unwrap().exists());

        store.save(&session(Role::Vendor, "t")).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_clear_missing_file_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        assert!(store.clear(Role::Customer).await.is_ok());
    }
}
