//! Bearer tokens for the twin store.
//!
//! Tokens come either from configuration (`ADT_ACCESS_TOKEN`) or from the
//! managed identity of the host. On App Service / Functions the identity
//! endpoint is advertised through `IDENTITY_ENDPOINT` and `IDENTITY_HEADER`;
//! everywhere else the instance metadata service is used.

use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Tokens are refreshed once they are this close to expiring.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

pub type CredentialBox = Box<dyn CredentialProvider>;

/// A fixed bearer token.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenCredential {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityEndpoint {
    /// App Service / Functions identity endpoint.
    AppService { endpoint: String, header: String },
    /// Azure instance metadata service.
    Imds { endpoint: String },
}

impl IdentityEndpoint {
    /// Picks the endpoint advertised by the hosting environment.
    pub fn from_env() -> Self {
        match (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            (Ok(endpoint), Ok(header)) => Self::AppService { endpoint, header },
            _ => Self::Imds {
                endpoint: IMDS_TOKEN_URL.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    /// `expires_on` is epoch seconds, sent as a string by IMDS and as a number
    /// by some App Service versions. Falls back to `expires_in`.
    fn expires_at(&self, now: SystemTime) -> SystemTime {
        if let Some(secs) = self.expires_on.as_ref().and_then(as_seconds) {
            return UNIX_EPOCH + Duration::from_secs(secs);
        }
        let ttl = self.expires_in.as_ref().and_then(as_seconds).unwrap_or(0);
        now + Duration::from_secs(ttl)
    }
}

fn as_seconds(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fetches tokens from the host's managed identity and caches them.
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    endpoint: IdentityEndpoint,
    resource: String,
    client_id: Option<String>,
    cache: Mutex<Option<CachedToken>>,
}

impl ManagedIdentityCredential {
    pub fn new(
        http: reqwest::Client,
        endpoint: IdentityEndpoint,
        resource: impl Into<String>,
        client_id: Option<String>,
    ) -> Self {
        Self {
            http,
            endpoint,
            resource: resource.into(),
            client_id,
            cache: Mutex::new(None),
        }
    }

    /// Uses the identity endpoint and user-assigned client id (`AZURE_CLIENT_ID`)
    /// from the environment.
    pub fn from_env(http: reqwest::Client, resource: impl Into<String>) -> Self {
        Self::new(
            http,
            IdentityEndpoint::from_env(),
            resource,
            std::env::var("AZURE_CLIENT_ID").ok(),
        )
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let mut query = vec![("resource", self.resource.clone())];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.clone()));
        }

        let request = match &self.endpoint {
            IdentityEndpoint::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION.to_string()));
                self.http
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
            }
            IdentityEndpoint::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION.to_string()));
                self.http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        let response = request.send().await.map_err(|e| {
            SettlementError::CredentialError(format!("identity endpoint unreachable: {}", e))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::CredentialError(format!(
                "identity endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            SettlementError::CredentialError(format!("malformed token response: {}", e))
        })?;
        let expires_at = token.expires_at(SystemTime::now());
        debug!(resource = %self.resource, "acquired managed identity token");

        Ok(CachedToken {
            token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl CredentialProvider for ManagedIdentityCredential {
    async fn token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.expires_at > SystemTime::now() + REFRESH_MARGIN
        {
            return Ok(cached.token.clone());
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let credential = StaticTokenCredential::new("abc");
        assert_eq!(credential.token().await.unwrap(), "abc");
    }

    #[test]
    fn test_expiry_parsing() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);

        let imds: TokenResponse = serde_json::from_str(
            r#"{"access_token": "t", "expires_on": "1700000000", "expires_in": "3599"}"#,
        )
        .unwrap();
        assert_eq!(imds.expires_at(now), UNIX_EPOCH + Duration::from_secs(1_700_000_000));

        let numeric: TokenResponse =
            serde_json::from_str(r#"{"access_token": "t", "expires_on": 1700000000}"#).unwrap();
        assert_eq!(numeric.expires_at(now), UNIX_EPOCH + Duration::from_secs(1_700_000_000));

        let relative: TokenResponse =
            serde_json::from_str(r#"{"access_token": "t", "expires_in": 60}"#).unwrap();
        assert_eq!(relative.expires_at(now), now + Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_unreachable_identity_endpoint() {
        let credential = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            IdentityEndpoint::Imds {
                endpoint: "http://127.0.0.1:9/token".to_string(),
            },
            "https://digitaltwins.azure.net",
            None,
        );
        assert!(matches!(
            credential.token().await,
            Err(SettlementError::CredentialError(_))
        ));
    }
}
