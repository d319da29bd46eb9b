//! Credential store trait abstraction.
//!
//! Abstracts the persistence medium for session token pairs, enabling
//! the in-memory implementation used in tests. Stores are keyed by
//! [`Role`]: the customer and vendor token pairs live in separate slots
//! and must never leak into each other.

use async_trait::async_trait;

use crate::session::{Role, Session};

/// Credential storage errors.
#[derive(Debug, Clone)]
pub enum CredentialsError {
    /// Failed to load credentials
    LoadFailed(String),
    /// Failed to save credentials
    SaveFailed(String),
    /// Failed to clear credentials
    ClearFailed(String),
    /// Other error
    Other(String),
}

impl std::fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsError::LoadFailed(msg) => write!(f, "Failed to load credentials: {}", msg),
            CredentialsError::SaveFailed(msg) => write!(f, "Failed to save credentials: {}", msg),
            CredentialsError::ClearFailed(msg) => {
                write!(f, "Failed to clear credentials: {}", msg)
            }
            CredentialsError::Other(msg) => write!(f, "Credentials error: {}", msg),
        }
    }
}

impl std::error::Error for CredentialsError {}

/// Trait for durable session storage.
///
/// A store has no network access and must fail safe: a read that
/// returns malformed data is reported as absent (logged-out), never as
/// an error that blocks start-up.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored session for `role`, if any.
    async fn load(&self, role: Role) -> Result<Option<Session>, CredentialsError>;

    /// Persist `session` in the slot for its role, leaving the other
    /// role's slot untouched.
    async fn save(&self, session: &Session) -> Result<(), CredentialsError>;

    /// Remove the stored session for `role`.
    async fn clear(&self, role: Role) -> Result<(), CredentialsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_error_display() {
        assert_eq!(
            CredentialsError::LoadFailed("read error".to_string()).to_string(),
            "Failed to load credentials: read error"
        );
        assert_eq!(
            CredentialsError::SaveFailed("write error".to_string()).to_string(),
            "Failed to save credentials: write error"
        );
        assert_eq!(
            CredentialsError::ClearFailed("delete error".to_string()).to_string(),
            "Failed to clear credentials: delete error"
        );
        assert_eq!(
            CredentialsError::Other("boom".to_string()).to_string(),
            "Credentials error: boom"
        );
    }
}
