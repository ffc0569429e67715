//! Identity verification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceResult;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

/// Identity provider (`"auth"`).
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies a user id and returns its profile.
    async fn verify_user(&self, uid: &str) -> ServiceResult<UserProfile>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh_token(&self, refresh_token: &str) -> ServiceResult<String>;

    /// Mints a token for `uid` carrying extra claims.
    async fn create_custom_token(&self, uid: &str, claims: Option<Value>) -> ServiceResult<String>;

    /// Validates a token and returns its subject.
    async fn verify_token(&self, token: &str) -> ServiceResult<UserProfile>;
}
