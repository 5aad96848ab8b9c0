//! Configuration types for the webhook
//!
//! These describe how the daemon wires the engine together. Per-endpoint
//! Traffic Manager settings live in [`crate::annotations`] instead.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::filter::DomainFilter;

/// Main webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Remote control-plane client configuration
    pub client: ClientConfig,

    /// CNAME publisher configuration
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Resource groups scanned when listing current records
    #[serde(default)]
    pub resource_groups: Vec<String>,

    /// Hostnames reported to external-dns
    #[serde(default)]
    pub domain_filter: DomainFilter,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl WebhookConfig {
    /// Create a configuration with default publisher and engine settings
    pub fn new(client: ClientConfig) -> Self {
        Self {
            client,
            publisher: PublisherConfig::default(),
            resource_groups: Vec::new(),
            domain_filter: DomainFilter::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.client.validate()?;
        self.publisher.validate()?;

        if self.resource_groups.iter().any(|rg| rg.trim().is_empty()) {
            return Err(crate::Error::config("Resource group names cannot be empty"));
        }

        self.engine.validate()
    }
}

/// Remote control-plane client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientConfig {
    /// Azure Traffic Manager over the ARM REST API
    Azure {
        subscription_id: String,
        /// Service principal credentials, used when no static token is set
        #[serde(default)]
        tenant_id: Option<String>,
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        client_secret: Option<String>,
        /// Pre-issued bearer token (skips the client-credentials flow)
        #[serde(default)]
        access_token: Option<String>,
    },

    /// Custom client
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ClientConfig {
    /// Validate the client configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ClientConfig::Azure {
                subscription_id,
                tenant_id,
                client_id,
                client_secret,
                access_token,
            } => {
                if subscription_id.is_empty() {
                    return Err(crate::Error::config("Azure subscription ID cannot be empty"));
                }
                if access_token.as_deref().is_some_and(|t| !t.is_empty()) {
                    return Ok(());
                }
                let missing: Vec<&str> = [
                    ("tenant ID", tenant_id),
                    ("client ID", client_id),
                    ("client secret", client_secret),
                ]
                .into_iter()
                .filter(|(_, v)| v.as_deref().unwrap_or_default().is_empty())
                .map(|(name, _)| name)
                .collect();

                if !missing.is_empty() {
                    return Err(crate::Error::config(format!(
                        "Azure credentials incomplete, missing {} (or set an access token)",
                        missing.join(", ")
                    )));
                }
                Ok(())
            }
            ClientConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom client factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom client config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the client type name
    pub fn type_name(&self) -> &str {
        match self {
            ClientConfig::Azure { .. } => "azure",
            ClientConfig::Custom { factory, .. } => factory,
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientConfig::Azure {
                subscription_id,
                tenant_id,
                client_id,
                client_secret,
                access_token,
            } => f
                .debug_struct("Azure")
                .field("subscription_id", subscription_id)
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &client_secret.as_ref().map(|_| "<redacted>"))
                .field("access_token", &access_token.as_ref().map(|_| "<redacted>"))
                .finish(),
            ClientConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// CNAME publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublisherConfig {
    /// `DNSEndpoint` custom resources in one namespace
    DnsEndpoint {
        #[serde(default = "default_namespace")]
        namespace: String,
    },

    /// Log only
    Disabled,

    /// Custom publisher
    Custom {
        factory: String,
        config: serde_json::Value,
    },
}

impl PublisherConfig {
    /// Validate the publisher configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            PublisherConfig::DnsEndpoint { namespace } if namespace.is_empty() => Err(
                crate::Error::config("DNSEndpoint namespace cannot be empty"),
            ),
            PublisherConfig::Custom { factory, .. } if factory.is_empty() => Err(
                crate::Error::config("Custom publisher factory cannot be empty"),
            ),
            _ => Ok(()),
        }
    }

    /// Get the publisher type name
    pub fn type_name(&self) -> &str {
        match self {
            PublisherConfig::DnsEndpoint { .. } => "dns_endpoint",
            PublisherConfig::Disabled => "disabled",
            PublisherConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig::DnsEndpoint {
            namespace: default_namespace(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a mirrored profile is trusted (in seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Copy Traffic Manager provider-specific properties into labels
    /// during endpoint adjustment
    #[serde(default)]
    pub copy_annotations_to_labels: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.cache_ttl_secs == 0 {
            return Err(crate::Error::config("Cache TTL must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            copy_annotations_to_labels: false,
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    1000
}
