//! Credentials
//!
//! Per-integration secrets (API keys, OAuth access tokens). Values are seeded
//! from configuration, persisted by the summary store and refreshed by the
//! [`CredentialProvider`] shortly before they expire.

mod provider;

pub use provider::CredentialProvider;

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::storage::StorageError;

/// Tokens expiring within this window are refreshed before use
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Secret material for one integration
#[derive(Clone, PartialEq)]
pub struct Credential {
    pub integration: String,
    /// API key or bearer token
    pub secret: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// A non-expiring secret such as an API key
    pub fn api_key(integration: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            integration: integration.into(),
            secret: secret.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |t| t <= now)
    }

    /// True when the token expires within the refresh margin
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map_or(false, |t| t <= now + Duration::minutes(REFRESH_MARGIN_MINUTES))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("integration", &self.integration)
            .field("secret", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Errors resolving a credential
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No credential configured for {0}")]
    Missing(String),

    #[error("Credential for {0} has expired and cannot be refreshed")]
    Expired(String),

    #[error("Token refresh for {integration} failed: {message}")]
    RefreshFailed { integration: String, message: String },

    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
}
