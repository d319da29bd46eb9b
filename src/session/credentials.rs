//! Session and role types.
//!
//! A [`Session`] is the durable credential record for one actor role:
//! access/refresh token pair, expiry, user id and the remember flag.
//! Customer and vendor sessions are stored side by side and must never
//! cross-contaminate.

use serde::{Deserialize, Serialize};

/// Actor role a session is bound to.
///
/// The marketplace keeps separate token pairs for the customer and
/// vendor sides of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Vendor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated session for one role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Bearer token presented on REST calls and the channel handshake.
    pub access_token: String,
    /// Token exchanged for a fresh pair when the access token expires.
    pub refresh_token: String,
    /// Access token expiry as Unix timestamp (seconds since epoch).
    pub expires_at: i64,
    /// The authenticated user's ID, when the server reports one.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Whether the user asked to stay signed in across restarts.
    #[serde(default)]
    pub remember: bool,
    /// Role this token pair belongs to.
    pub role: Role,
}

impl Session {
    /// Check if the access token is past its expiry.
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at
    }

    /// Check if the access token expires within `margin_secs`.
    ///
    /// A token inside the margin is treated as stale so callers never
    /// hand a token to the server that dies mid-request.
    pub fn needs_refresh(&self, margin_secs: i64) -> bool {
        chrono::Utc::now().timestamp() + margin_secs >= self.expires_at
    }
}
