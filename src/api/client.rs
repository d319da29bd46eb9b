//! HTTP client for the Bookwire REST API.
//!
//! Consumed contract only: sign-in/refresh/sign-out and the
//! notifications collection. The session manager owns when these are
//! called; this client never retries or stores tokens itself.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::session::Role;

/// Default URL for the Bookwire API.
pub const DEFAULT_API_URL: &str = "https://api.bookwire.app";

/// Error type for API client operations.
#[derive(Debug)]
pub enum ApiError {
    /// HTTP request failed
    Http(reqwest::Error),
    /// JSON deserialization failed
    Json(serde_json::Error),
    /// Server returned an error status
    ServerError { status: u16, message: String },
}

impl ApiError {
    /// Check if the server rejected the request's credential.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            ApiError::ServerError { status: 401, .. } | ApiError::ServerError { status: 403, .. }
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "HTTP error: {}", e),
            ApiError::Json(e) => write!(f, "JSON error: {}", e),
            ApiError::ServerError { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Http(e) => Some(e),
            ApiError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Http(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Json(e)
    }
}

/// Response from token endpoints (POST /auth/signin and POST /auth/refresh).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry; the API may omit this and send `expiresIn` or
    /// rely on the JWT payload instead.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<u32>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl TokenResponse {
    /// Resolve the access token expiry as a Unix timestamp.
    ///
    /// Falls back from `expiresAt` to `expiresIn` to the JWT `exp`
    /// claim; a token with no discoverable expiry is given a short
    /// lifetime so it gets refreshed rather than trusted indefinitely.
    pub fn resolved_expires_at(&self) -> i64 {
        let now = chrono::Utc::now().timestamp();
        if let Some(at) = self.expires_at {
            return at;
        }
        if let Some(secs) = self.expires_in {
            return now + secs as i64;
        }
        jwt_expires_at(&self.access_token).unwrap_or(now + 60)
    }
}

/// JWT claims for extracting expiration time.
#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Extract the `exp` claim from a JWT access token, if it parses.
pub fn jwt_expires_at(access_token: &str) -> Option<i64> {
    let parts: Vec<&str> = access_token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.decode(parts.get(1)?).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;
    Some(claims.exp)
}

/// A single notification as served by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    pub id: String,
    pub read: bool,
    /// Creation time as Unix timestamp; the list is ordered by this,
    /// newest first.
    pub created_at: i64,
}

/// One page of the notifications collection (GET /notifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsPage {
    pub items: Vec<NotificationItem>,
    /// Server-declared unread count across the whole collection, not
    /// just this page.
    pub unread: u32,
}

/// Client for the Bookwire REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Base URL for the API
    pub base_url: String,
    /// Reusable HTTP client
    client: Client,
}

impl ApiClient {
    /// Create a new ApiClient with the default base URL.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_URL.to_string())
    }

    /// Create a new ApiClient with a custom base URL.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }

    fn bearer(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", token))
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ApiError::ServerError { status, message })
    }

    /// Sign in with email and password for one role.
    ///
    /// POST /auth/signin
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        role: Role,
        remember: bool,
    ) -> Result<TokenResponse, ApiError> {
        let url = format!("{}/auth/signin", self.base_url);
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "role": role.as_str(),
            "remember": remember,
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;

        let data: TokenResponse = response.json().await?;
        Ok(data)
    }

    /// Exchange a refresh token for a fresh token pair.
    ///
    /// POST /auth/refresh
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        let url = format!("{}/auth/refresh", self.base_url);
        let body = serde_json::json!({ "refreshToken": refresh_token });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;

        let data: TokenResponse = response.json().await?;
        Ok(data)
    }

    /// Notify the server of a sign-out. Best effort; callers ignore the
    /// result and clear local state regardless.
    ///
    /// POST /auth/signout
    pub async fn sign_out(&self, token: &str) -> Result<(), ApiError> {
        let url = format!("{}/auth/signout", self.base_url);
        let builder = self.client.post(&url);
        let response = self.bearer(builder, token).send().await?;
        Self::error_for_status(response).await?;
        Ok(())
    }

    /// Fetch one page of notifications.
    ///
    /// GET /notifications?skip&take
    pub async fn notifications(
        &self,
        token: &str,
        skip: usize,
        take: usize,
    ) -> Result<NotificationsPage, ApiError> {
        let url = format!(
            "{}/notifications?skip={}&take={}",
            self.base_url, skip, take
        );
        let builder = self.client.get(&url);
        let response = self.bearer(builder, token).send().await?;
        let response = Self::error_for_status(response).await?;

        let page: NotificationsPage = response.json().await?;
        Ok(page)
    }

    /// Mark a single notification as read.
    ///
    /// PATCH /notifications/:id/read
    pub async fn mark_read(&self, token: &str, id: &str) -> Result<(), ApiError> {
        let url = format!("{}/notifications/{}/read", self.base_url, id);
        let builder = self.client.patch(&url);
        let response = self.bearer(builder, token).send().await?;
        Self::error_for_status(response).await?;
        Ok(())
    }

    /// Mark every notification as read.
    ///
    /// PATCH /notifications/read-all
    pub async fn mark_all_read(&self, token: &str) -> Result<(), ApiError> {
        let url = format!("{}/notifications/read-all", self.base_url);
        let builder = self.client.patch(&url);
        let response = self.bearer(builder, token).send().await?;
        Self::error_for_status(response).await?;
        Ok(())
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}
