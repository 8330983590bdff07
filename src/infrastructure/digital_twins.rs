use super::credential::CredentialBox;
use crate::domain::ports::TwinStore;
use crate::domain::twin::{Balance, TwinId, TwinRecord, balance_patch};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, IF_MATCH};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_VERSION: &str = "2023-10-31";
const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// REST client for an Azure Digital Twins instance.
///
/// Only the two calls the settler needs are exposed: read a twin and replace
/// its `liquidityBalance`.
pub struct DigitalTwinsClient {
    http: reqwest::Client,
    endpoint: Url,
    api_version: String,
    credential: CredentialBox,
}

impl DigitalTwinsClient {
    /// Creates a client for the instance at `endpoint`.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Instance URL; `https://` is assumed when no scheme is given.
    /// * `api_version` - Value of the `api-version` query parameter.
    /// * `credential` - Source of bearer tokens.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        endpoint: &str,
        api_version: impl Into<String>,
        credential: CredentialBox,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: normalize_endpoint(endpoint)?,
            api_version: api_version.into(),
            credential,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL of a single twin, with the id percent-encoded as one path segment.
    pub fn twin_url(&self, id: &TwinId) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SettlementError::ValidationError(format!(
                    "endpoint {} cannot be a base URL",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .push("digitaltwins")
            .push(id.as_str());
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }
}

/// Parses the configured endpoint, prefixing `https://` when no scheme is given.
pub fn normalize_endpoint(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SettlementError::ValidationError(
            "twin store endpoint is empty".to_string(),
        ));
    }
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    Url::parse(&with_scheme).map_err(|e| {
        SettlementError::ValidationError(format!("invalid twin store endpoint {}: {}", raw, e))
    })
}

async fn status_error(id: &TwinId, response: reqwest::Response) -> SettlementError {
    match response.status() {
        StatusCode::NOT_FOUND => SettlementError::TwinNotFound(id.to_string()),
        StatusCode::PRECONDITION_FAILED => SettlementError::PreconditionFailed(id.to_string()),
        status => SettlementError::RemoteStatus {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        },
    }
}

#[async_trait]
impl TwinStore for DigitalTwinsClient {
    async fn get_twin(&self, id: &TwinId) -> Result<TwinRecord> {
        let url = self.twin_url(id)?;
        let token = self.credential.token().await?;

        let response = self.http.get(url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(status_error(id, response).await);
        }

        let twin: TwinRecord = response.json().await?;
        debug!(twin_id = %id, etag = ?twin.etag, "fetched twin");
        Ok(twin)
    }

    async fn update_liquidity_balance(
        &self,
        id: &TwinId,
        balance: Balance,
        etag: Option<&str>,
    ) -> Result<()> {
        let url = self.twin_url(id)?;
        let token = self.credential.token().await?;
        let body = serde_json::to_vec(&balance_patch(balance))?;

        let mut request = self
            .http
            .patch(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
            .body(body);
        if let Some(etag) = etag {
            request = request.header(IF_MATCH, etag);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(id, response).await);
        }

        debug!(twin_id = %id, %balance, "patched liquidityBalance");
        Ok(())
    }
}
