// Daemon configuration, read from environment variables only.
//
// ### Servers
// - `WEBHOOK_PORT`: external-dns webhook port (default 8888)
// - `HEALTH_PORT`: health/readiness/stats port (default 8080)
// - `REQUEST_TIMEOUT_SECS`: upper bound on one webhook request (default 30)
//
// ### Records
// - `DOMAIN_FILTER`: comma-separated domains advertised and reported
// - `DOMAIN_EXCLUDE`: comma-separated domains never reported
// - `RESOURCE_GROUPS`: comma-separated resource groups scanned by `GET /records`
//
// ### Azure
// - `AZURE_SUBSCRIPTION_ID` (required)
// - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`: service principal
// - `AZURE_ACCESS_TOKEN`: pre-issued bearer token, replaces the service principal
//
// ### CNAME publication
// - `DNSENDPOINT_ENABLED`: publish vanity CNAMEs as DNSEndpoint resources (default true)
// - `DNSENDPOINT_NAMESPACE`: namespace of those resources (default "default")
//
// ### Engine
// - `CACHE_TTL_SECS`: mirror TTL (default 300)
// - `ADJUST_COPY_ANNOTATIONS`: copy Traffic Manager properties into labels (default false)
// - `LOG_LEVEL`: trace, debug, info, warn, error (default info)

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;
use tmhook_core::{ClientConfig, DomainFilter, EngineConfig, PublisherConfig, WebhookConfig};
use tracing::Level;

pub const DEFAULT_WEBHOOK_PORT: u16 = 8888;
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Daemon configuration
pub struct Config {
    pub webhook_port: u16,
    pub health_port: u16,
    pub request_timeout_secs: u64,
    pub domain_filter: DomainFilter,
    pub resource_groups: Vec<String>,
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub dnsendpoint_enabled: bool,
    pub dnsendpoint_namespace: String,
    pub cache_ttl_secs: u64,
    pub copy_annotations: bool,
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("Config")
            .field("webhook_port", &self.webhook_port)
            .field("health_port", &self.health_port)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("domain_filter", &self.domain_filter)
            .field("resource_groups", &self.resource_groups)
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("access_token", &redact(&self.access_token))
            .field("dnsendpoint_enabled", &self.dnsendpoint_enabled)
            .field("dnsendpoint_namespace", &self.dnsendpoint_namespace)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("copy_annotations", &self.copy_annotations)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut domain_filter = DomainFilter::from_csv(&var("DOMAIN_FILTER").unwrap_or_default());
        domain_filter.exclude = split_csv(&var("DOMAIN_EXCLUDE").unwrap_or_default());

        Ok(Self {
            webhook_port: parse_or(var("WEBHOOK_PORT"), "WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT)?,
            health_port: parse_or(var("HEALTH_PORT"), "HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            request_timeout_secs: parse_or(
                var("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            domain_filter,
            resource_groups: split_csv(&var("RESOURCE_GROUPS").unwrap_or_default()),
            subscription_id: var("AZURE_SUBSCRIPTION_ID").unwrap_or_default(),
            tenant_id: var("AZURE_TENANT_ID"),
            client_id: var("AZURE_CLIENT_ID"),
            client_secret: var("AZURE_CLIENT_SECRET"),
            access_token: var("AZURE_ACCESS_TOKEN"),
            dnsendpoint_enabled: parse_bool(var("DNSENDPOINT_ENABLED"), "DNSENDPOINT_ENABLED", true)?,
            dnsendpoint_namespace: var("DNSENDPOINT_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            cache_ttl_secs: parse_or(
                var("CACHE_TTL_SECS"),
                "CACHE_TTL_SECS",
                EngineConfig::default().cache_ttl_secs,
            )?,
            copy_annotations: parse_bool(
                var("ADJUST_COPY_ANNOTATIONS"),
                "ADJUST_COPY_ANNOTATIONS",
                false,
            )?,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.subscription_id.is_empty() {
            anyhow::bail!(
                "AZURE_SUBSCRIPTION_ID is required. \
                Set it via: export AZURE_SUBSCRIPTION_ID=<subscription-guid>"
            );
        }

        if self.webhook_port == 0 || self.health_port == 0 {
            anyhow::bail!("WEBHOOK_PORT and HEALTH_PORT must be non-zero");
        }

        if self.webhook_port == self.health_port {
            anyhow::bail!(
                "WEBHOOK_PORT and HEALTH_PORT must differ. Both are {}",
                self.webhook_port
            );
        }

        if !(1..=300).contains(&self.request_timeout_secs) {
            anyhow::bail!(
                "REQUEST_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.request_timeout_secs
            );
        }

        if self.cache_ttl_secs == 0 {
            anyhow::bail!("CACHE_TTL_SECS must be greater than 0");
        }

        self.log_level()?;

        // Credential completeness and the rest are checked by the core config
        self.webhook_config()
            .validate()
            .context("Invalid webhook configuration")?;

        Ok(())
    }

    /// Parsed `LOG_LEVEL`
    pub fn log_level(&self) -> Result<Level> {
        Level::from_str(&self.log_level).map_err(|_| {
            anyhow::anyhow!(
                "LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Core configuration handed to the engine
    pub fn webhook_config(&self) -> WebhookConfig {
        let mut config = WebhookConfig::new(ClientConfig::Azure {
            subscription_id: self.subscription_id.clone(),
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            access_token: self.access_token.clone(),
        });

        config.publisher = if self.dnsendpoint_enabled {
            PublisherConfig::DnsEndpoint {
                namespace: self.dnsendpoint_namespace.clone(),
            }
        } else {
            PublisherConfig::Disabled
        };
        config.resource_groups = self.resource_groups.clone();
        config.domain_filter = self.domain_filter.clone();
        config.engine.cache_ttl_secs = self.cache_ttl_secs;
        config.engine.copy_annotations_to_labels = self.copy_annotations;
        config
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
    }
}

fn parse_bool(value: Option<String>, key: &str, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => anyhow::bail!("{} must be true or false. Got: {}", key, other),
    }
}
