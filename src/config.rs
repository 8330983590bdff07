use crate::error::{Result, SettlementError};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Environment variable naming the twin store instance.
pub const ADT_INSTANCE_URL_ENV: &str = "ADT_INSTANCE_URL";
/// Environment variable holding a pre-issued bearer token.
pub const ADT_ACCESS_TOKEN_ENV: &str = "ADT_ACCESS_TOKEN";
/// Environment variable holding the Event Hubs connection string.
pub const EVENT_HUB_CONNECTION_ENV: &str = "EventHubConnectionString";

const KAFKA_PORT: u16 = 9093;

/// Runtime settings.
///
/// Layered from built-in defaults, an optional TOML file, `SETTLER_*`
/// environment variables and finally the well-known variables above.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub adt_instance_url: Option<String>,
    pub adt_api_version: String,
    /// Resource the managed identity token is requested for.
    pub adt_resource: String,
    #[serde(default)]
    pub adt_access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub event_hub_name: String,
    #[serde(default)]
    pub event_hub_connection_string: Option<String>,
    pub event_hub_consumer_group: String,
    #[serde(default)]
    pub ledger_path: Option<String>,
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(config_file, env)
    }

    /// Loads settings from an explicit set of environment variables.
    pub fn load_from(config_file: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("adt_api_version", crate::infrastructure::digital_twins::DEFAULT_API_VERSION)?
            .set_default("adt_resource", "https://digitaltwins.azure.net")?
            .set_default("request_timeout_secs", 30)?
            .set_default("event_hub_name", "rtgs-transactions")?
            .set_default("event_hub_consumer_group", "$Default")?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let well_known = |key: &str| env.get(key).filter(|v| !v.is_empty()).cloned();
        let instance_url = well_known(ADT_INSTANCE_URL_ENV);
        let access_token = well_known(ADT_ACCESS_TOKEN_ENV);
        let connection_string = well_known(EVENT_HUB_CONNECTION_ENV);

        let settings = builder
            .add_source(
                Environment::with_prefix("SETTLER")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .set_override_option("adt_instance_url", instance_url)?
            .set_override_option("adt_access_token", access_token)?
            .set_override_option("event_hub_connection_string", connection_string)?
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// The twin store endpoint, which must be configured to run.
    pub fn require_adt_instance_url(&self) -> Result<&str> {
        self.adt_instance_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                SettlementError::ValidationError(format!(
                    "{} is not set; it must point at the digital twins instance",
                    ADT_INSTANCE_URL_ENV
                ))
            })
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

/// Derives the Kafka bootstrap server from an Event Hubs connection string.
///
/// `Endpoint=sb://<namespace>.servicebus.windows.net/;...` becomes
/// `<namespace>.servicebus.windows.net:9093`.
pub fn kafka_bootstrap_from_connection_string(connection_string: &str) -> Result<String> {
    let endpoint = connection_string
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("Endpoint"))
        .map(|(_, value)| value.trim())
        .ok_or_else(|| {
            SettlementError::ValidationError(
                "Event Hubs connection string has no Endpoint".to_string(),
            )
        })?;

    let host = endpoint
        .strip_prefix("sb://")
        .unwrap_or(endpoint)
        .trim_end_matches('/');
    if host.is_empty() {
        return Err(SettlementError::ValidationError(
            "Event Hubs endpoint is empty".to_string(),
        ));
    }

    Ok(format!("{}:{}", host, KAFKA_PORT))
}
