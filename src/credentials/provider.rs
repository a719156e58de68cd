//! Credential Provider
//!
//! Resolves a usable credential for an integration, refreshing OAuth access
//! tokens through the integration's token endpoint when they are close to
//! expiry.

use super::{Credential, CredentialError};
use crate::config::CredentialConfig;
use crate::storage::SummaryStore;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// OAuth client settings needed for refresh
#[derive(Debug, Clone)]
struct OAuthClient {
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Hands out non-expired credentials to source adapters
pub struct CredentialProvider {
    store: Arc<SummaryStore>,
    client: Client,
    oauth: HashMap<String, OAuthClient>,
    seeds: BTreeMap<String, CredentialConfig>,
    /// Serializes refreshes so concurrent sources don't race on one token
    refresh_lock: Mutex<()>,
}

impl CredentialProvider {
    pub fn new(store: Arc<SummaryStore>, seeds: &BTreeMap<String, CredentialConfig>) -> Self {
        let oauth = seeds
            .iter()
            .filter_map(|(name, seed)| {
                seed.token_url.as_ref().map(|url| {
                    (
                        name.clone(),
                        OAuthClient {
                            token_url: url.clone(),
                            client_id: seed.client_id.clone(),
                            client_secret: seed.client_secret.clone(),
                        },
                    )
                })
            })
            .collect();

        Self {
            store,
            client: Client::new(),
            oauth,
            seeds: seeds.clone(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Write configured credentials into the store.
    ///
    /// A stored row is kept while the configured secret is the one it was
    /// seeded from, since it may hold a refreshed token. A configured secret
    /// that differs from the last seeded one replaces the row. Returns the
    /// number of credentials written.
    pub fn seed(&self) -> Result<usize, CredentialError> {
        let mut written = 0;
        for (name, seed) in &self.seeds {
            if seed.secret.is_empty() {
                continue;
            }
            let stored = self.store.load_credential(name)?;
            let seeded = self.store.seeded_secret(name)?;
            if stored.is_some() && seeded.as_deref() == Some(seed.secret.as_str()) {
                continue;
            }

            self.store.seed_credential(&Credential {
                integration: name.clone(),
                secret: seed.secret.clone(),
                refresh_token: seed.refresh_token.clone(),
                expires_at: seed.expires_at,
            })?;
            if stored.is_some() {
                tracing::info!(integration = %name, "Configured credential changed, replacing stored one");
            } else {
                tracing::info!(integration = %name, "Seeded credential from config");
            }
            written += 1;
        }
        Ok(written)
    }

    /// Integrations with a stored credential
    pub fn configured(&self) -> Result<Vec<String>, CredentialError> {
        Ok(self.store.list_credentials()?)
    }

    /// A credential valid for at least the refresh margin
    pub async fn resolve(&self, integration: &str) -> Result<Credential, CredentialError> {
        self.resolve_at(integration, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        integration: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, CredentialError> {
        let current = self.load(integration)?;
        if !current.needs_refresh(now) {
            return Ok(current);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited
        let current = self.load(integration)?;
        if !current.needs_refresh(now) {
            return Ok(current);
        }

        match self.refresh(&current, now).await {
            Ok(fresh) => Ok(fresh),
            Err(e) if !current.is_expired(now) => {
                tracing::warn!(
                    integration = %integration,
                    error = %e,
                    "Token refresh failed, using current token until it expires"
                );
                Ok(current)
            }
            Err(CredentialError::Missing(_)) => {
                Err(CredentialError::Expired(integration.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn load(&self, integration: &str) -> Result<Credential, CredentialError> {
        self.store
            .load_credential(integration)?
            .ok_or_else(|| CredentialError::Missing(integration.to_string()))
    }

    async fn refresh(
        &self,
        current: &Credential,
        now: DateTime<Utc>,
    ) -> Result<Credential, CredentialError> {
        let integration = &current.integration;
        let (Some(refresh_token), Some(oauth)) =
            (current.refresh_token.as_ref(), self.oauth.get(integration))
        else {
            return Err(CredentialError::Missing(integration.clone()));
        };

        let failed = |message: String| CredentialError::RefreshFailed {
            integration: integration.clone(),
            message,
        };

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        if let Some(id) = &oauth.client_id {
            form.push(("client_id", id.as_str()));
        }
        if let Some(secret) = &oauth.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        tracing::info!(integration = %integration, "Refreshing OAuth token");

        let response = self
            .client
            .post(&oauth.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("status {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await.map_err(|e| failed(e.to_string()))?;

        let fresh = Credential {
            integration: integration.clone(),
            secret: token.access_token,
            // Keep the existing refresh token if the provider did not rotate it
            refresh_token: token.refresh_token.or_else(|| current.refresh_token.clone()),
            expires_at: token.expires_in.map(|secs| now + Duration::seconds(secs)),
        };
        self.store.save_credential(&fresh)?;

        tracing::info!(
            integration = %integration,
            expires_at = ?fresh.expires_at,
            "OAuth token refreshed"
        );
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn store() -> Arc<SummaryStore> {
        Arc::new(SummaryStore::open_in_memory().unwrap())
    }

    fn oauth_seed(token_url: &str, expires_at: DateTime<Utc>) -> CredentialConfig {
        CredentialConfig {
            secret: "old-token".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(expires_at),
            token_url: Some(token_url.to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some("shh".to_string()),
        }
    }

    fn api_key_seeds(entries: &[(&str, &str)]) -> BTreeMap<String, CredentialConfig> {
        entries
            .iter()
            .map(|(name, secret)| {
                (
                    name.to_string(),
                    CredentialConfig {
                        secret: secret.to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_seed_keeps_refreshed_token() {
        let store = store();
        let mut seeds = api_key_seeds(&[("clickup", "pk_1")]);
        seeds.insert("youtube".to_string(), CredentialConfig::default());

        let provider = CredentialProvider::new(store.clone(), &seeds);
        assert_eq!(provider.seed().unwrap(), 1);
        assert_eq!(provider.resolve("clickup").await.unwrap().secret, "pk_1");
        assert!(matches!(
            provider.resolve("youtube").await,
            Err(CredentialError::Missing(_))
        ));

        // A token written after seeding survives a restart with unchanged config
        store
            .save_credential(&Credential::api_key("clickup", "refreshed"))
            .unwrap();
        let provider = CredentialProvider::new(store.clone(), &seeds);
        assert_eq!(provider.seed().unwrap(), 0);
        assert_eq!(provider.resolve("clickup").await.unwrap().secret, "refreshed");
    }

    #[tokio::test]
    async fn test_rotated_config_key_replaces_stored() {
        let store = store();
        let provider =
            CredentialProvider::new(store.clone(), &api_key_seeds(&[("mailchimp", "revoked-key")]));
        assert_eq!(provider.seed().unwrap(), 1);

        let provider =
            CredentialProvider::new(store.clone(), &api_key_seeds(&[("mailchimp", "new-key")]));
        assert_eq!(provider.seed().unwrap(), 1);
        assert_eq!(provider.resolve("mailchimp").await.unwrap().secret, "new-key");
        assert_eq!(store.seeded_secret("mailchimp").unwrap().as_deref(), Some("new-key"));
    }

    #[tokio::test]
    async fn test_config_replaces_row_without_seed_record() {
        let store = store();
        store
            .save_credential(&Credential::api_key("mailchimp", "from-db"))
            .unwrap();

        let provider =
            CredentialProvider::new(store.clone(), &api_key_seeds(&[("mailchimp", "from-config")]));
        assert_eq!(provider.seed().unwrap(), 1);
        assert_eq!(provider.resolve("mailchimp").await.unwrap().secret, "from-config");
    }

    #[tokio::test]
    async fn test_refreshes_near_expiry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
                Matcher::UrlEncoded("client_id".into(), "client".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-token","expires_in":7200}"#)
            .create_async()
            .await;

        let now = Utc::now();
        let mut seeds = BTreeMap::new();
        seeds.insert(
            "planning_center".to_string(),
            oauth_seed(&format!("{}/oauth/token", server.url()), now + Duration::minutes(2)),
        );

        let store = store();
        let provider = CredentialProvider::new(store.clone(), &seeds);
        provider.seed().unwrap();

        let cred = provider.resolve_at("planning_center", now).await.unwrap();
        assert_eq!(cred.secret, "new-token");
        assert_eq!(cred.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(cred.expires_at, Some(now + Duration::seconds(7200)));

        let stored = store.load_credential("planning_center").unwrap().unwrap();
        assert_eq!(stored.secret, "new-token");

        // Fresh token is not refreshed again
        let again = provider.resolve_at("planning_center", now).await.unwrap();
        assert_eq!(again.secret, "new-token");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_unexpired_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let now = Utc::now();
        let mut seeds = BTreeMap::new();
        seeds.insert(
            "youtube".to_string(),
            oauth_seed(&format!("{}/oauth/token", server.url()), now + Duration::minutes(2)),
        );
        let provider = CredentialProvider::new(store(), &seeds);
        provider.seed().unwrap();

        let cred = provider.resolve_at("youtube", now).await.unwrap();
        assert_eq!(cred.secret, "old-token");
    }

    #[tokio::test]
    async fn test_failed_refresh_of_expired_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .create_async()
            .await;

        let now = Utc::now();
        let mut seeds = BTreeMap::new();
        seeds.insert(
            "youtube".to_string(),
            oauth_seed(&format!("{}/oauth/token", server.url()), now - Duration::minutes(1)),
        );
        let provider = CredentialProvider::new(store(), &seeds);
        provider.seed().unwrap();

        let err = provider.resolve_at("youtube", now).await.unwrap_err();
        assert!(matches!(err, CredentialError::RefreshFailed { .. }));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_config() {
        let now = Utc::now();
        let mut seeds = BTreeMap::new();
        seeds.insert(
            "google_sheets".to_string(),
            CredentialConfig {
                secret: "stale".to_string(),
                expires_at: Some(now - Duration::hours(1)),
                ..Default::default()
            },
        );
        let provider = CredentialProvider::new(store(), &seeds);
        provider.seed().unwrap();

        let err = provider.resolve_at("google_sheets", now).await.unwrap_err();
        assert!(matches!(err, CredentialError::Expired(_)));
    }
}
