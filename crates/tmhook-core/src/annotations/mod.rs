//! Annotation-driven Traffic Manager configuration
//!
//! external-dns forwards `external-dns.alpha.kubernetes.io/webhook-*`
//! annotations as `providerSpecific` properties named `webhook/*`, so every
//! key here carries the [`PREFIX`] `webhook/traffic-manager-`.
//!
//! Parsing is split in two passes:
//!
//! 1. [`parse_config`] applies defaults and overrides them from the
//!    annotation map. It only fails on structural problems (missing resource
//!    group, non-numeric numbers, non-boolean flags).
//! 2. [`TrafficManagerConfig::validate`] checks ranges, enums and
//!    conditional requirements, reporting every violation at once.
//!
//! A config whose `enabled` annotation is absent or not `true` short-circuits
//! both passes.

mod validate;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::state::{HOSTNAME_TAG, MANAGED_BY_TAG, MANAGED_BY_VALUE};
use crate::traits::{EndpointSpec, ProfileSpec};

/// Common prefix of every annotation key
pub const PREFIX: &str = "webhook/traffic-manager-";

pub const ENABLED: &str = "webhook/traffic-manager-enabled";
pub const PROFILE_NAME: &str = "webhook/traffic-manager-profile-name";
pub const RESOURCE_GROUP: &str = "webhook/traffic-manager-resource-group";
pub const HOSTNAME: &str = "webhook/traffic-manager-hostname";
pub const ROUTING_METHOD: &str = "webhook/traffic-manager-routing-method";
pub const WEIGHT: &str = "webhook/traffic-manager-weight";
pub const PRIORITY: &str = "webhook/traffic-manager-priority";
pub const ENDPOINT_NAME: &str = "webhook/traffic-manager-endpoint-name";
pub const ENDPOINT_LOCATION: &str = "webhook/traffic-manager-endpoint-location";
pub const ENDPOINT_STATUS: &str = "webhook/traffic-manager-endpoint-status";
pub const ENDPOINT_TYPE: &str = "webhook/traffic-manager-endpoint-type";
pub const DNS_TTL: &str = "webhook/traffic-manager-dns-ttl";
pub const MONITOR_PROTOCOL: &str = "webhook/traffic-manager-monitor-protocol";
pub const MONITOR_PORT: &str = "webhook/traffic-manager-monitor-port";
pub const MONITOR_PATH: &str = "webhook/traffic-manager-monitor-path";
pub const HEALTH_CHECKS_ENABLED: &str = "webhook/traffic-manager-health-checks-enabled";

/// Prefix of per-key profile tags (`webhook/traffic-manager-tag-env: prod`)
pub const TAG_PREFIX: &str = "webhook/traffic-manager-tag-";

pub const DEFAULT_ROUTING_METHOD: &str = "Weighted";
pub const DEFAULT_WEIGHT: i64 = 100;
pub const DEFAULT_PRIORITY: i64 = 1;
pub const DEFAULT_DNS_TTL: i64 = 30;
pub const DEFAULT_MONITOR_PROTOCOL: &str = "HTTPS";
pub const DEFAULT_MONITOR_PORT: i64 = 443;
pub const DEFAULT_MONITOR_PATH: &str = "/";
pub const DEFAULT_ENDPOINT_STATUS: &str = "Enabled";
pub const DEFAULT_ENDPOINT_TYPE: &str = "ExternalEndpoints";
pub const DEFAULT_HEALTH_CHECKS_ENABLED: bool = true;

/// Traffic Manager settings of one external-dns endpoint
///
/// Enumerated fields are kept as the raw annotation strings so that
/// [`validate`](Self::validate) can name every bad value; the typed forms are
/// produced by [`profile_spec`](Self::profile_spec) and
/// [`endpoint_spec`](Self::endpoint_spec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficManagerConfig {
    pub enabled: bool,
    pub profile_name: Option<String>,
    pub resource_group: String,
    /// Vanity hostname the profile is published under
    pub hostname: Option<String>,
    pub routing_method: String,
    pub weight: i64,
    pub priority: i64,
    pub endpoint_name: Option<String>,
    pub endpoint_location: Option<String>,
    pub endpoint_status: String,
    pub endpoint_type: String,
    pub dns_ttl: i64,
    pub monitor_protocol: String,
    pub monitor_port: i64,
    pub monitor_path: String,
    pub health_checks_enabled: bool,
    pub tags: HashMap<String, String>,
}

impl Default for TrafficManagerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            profile_name: None,
            resource_group: String::new(),
            hostname: None,
            routing_method: DEFAULT_ROUTING_METHOD.to_string(),
            weight: DEFAULT_WEIGHT,
            priority: DEFAULT_PRIORITY,
            endpoint_name: None,
            endpoint_location: None,
            endpoint_status: DEFAULT_ENDPOINT_STATUS.to_string(),
            endpoint_type: DEFAULT_ENDPOINT_TYPE.to_string(),
            dns_ttl: DEFAULT_DNS_TTL,
            monitor_protocol: DEFAULT_MONITOR_PROTOCOL.to_string(),
            monitor_port: DEFAULT_MONITOR_PORT,
            monitor_path: DEFAULT_MONITOR_PATH.to_string(),
            health_checks_enabled: DEFAULT_HEALTH_CHECKS_ENABLED,
            tags: HashMap::new(),
        }
    }
}

/// Parse a configuration from an annotation map
///
/// Returns a disabled default config, never an error, unless `enabled` is
/// case-insensitively `true`.
///
/// # Errors
///
/// - `Error::Config` when the resource group is missing
/// - `Error::Config` naming the field when a number or flag does not parse
pub fn parse_config(annotations: &HashMap<String, String>) -> Result<TrafficManagerConfig> {
    let mut config = TrafficManagerConfig {
        enabled: annotations
            .get(ENABLED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        ..TrafficManagerConfig::default()
    };

    if !config.enabled {
        return Ok(config);
    }

    config.resource_group = match non_empty(annotations, RESOURCE_GROUP) {
        Some(rg) => rg.to_string(),
        None => {
            return Err(Error::config(format!(
                "annotation {} is required when Traffic Manager is enabled",
                RESOURCE_GROUP
            )));
        }
    };

    config.profile_name = non_empty(annotations, PROFILE_NAME).map(str::to_string);
    config.hostname = non_empty(annotations, HOSTNAME).map(str::to_string);
    config.endpoint_name = non_empty(annotations, ENDPOINT_NAME).map(str::to_string);
    config.endpoint_location = non_empty(annotations, ENDPOINT_LOCATION).map(str::to_string);

    if let Some(v) = non_empty(annotations, ROUTING_METHOD) {
        config.routing_method = v.to_string();
    }
    if let Some(v) = non_empty(annotations, ENDPOINT_STATUS) {
        config.endpoint_status = v.to_string();
    }
    if let Some(v) = non_empty(annotations, ENDPOINT_TYPE) {
        config.endpoint_type = v.to_string();
    }
    if let Some(v) = non_empty(annotations, MONITOR_PROTOCOL) {
        config.monitor_protocol = v.to_string();
    }
    if let Some(v) = non_empty(annotations, MONITOR_PATH) {
        config.monitor_path = v.to_string();
    }

    if let Some(v) = non_empty(annotations, WEIGHT) {
        config.weight = parse_int(v, "weight")?;
    }
    if let Some(v) = non_empty(annotations, PRIORITY) {
        config.priority = parse_int(v, "priority")?;
    }
    if let Some(v) = non_empty(annotations, DNS_TTL) {
        config.dns_ttl = parse_int(v, "DNS TTL")?;
    }
    if let Some(v) = non_empty(annotations, MONITOR_PORT) {
        config.monitor_port = parse_int(v, "monitor port")?;
    }
    if let Some(v) = non_empty(annotations, HEALTH_CHECKS_ENABLED) {
        config.health_checks_enabled = parse_bool(v).ok_or_else(|| {
            Error::config(format!("invalid health checks enabled value {:?}", v))
        })?;
    }

    config.tags = annotations
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(TAG_PREFIX)
                .filter(|tag| !tag.is_empty())
                .map(|tag| (tag.to_string(), value.clone()))
        })
        .collect();

    Ok(config)
}

fn non_empty<'a>(annotations: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    annotations
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn parse_int(value: &str, field: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|e| Error::config(format!("invalid {} value {:?}: {}", field, value, e)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

impl TrafficManagerConfig {
    /// Vanity hostname, falling back to the endpoint's own DNS name
    pub fn vanity_hostname<'a>(&'a self, dns_name: &'a str) -> &'a str {
        self.hostname.as_deref().unwrap_or(dns_name)
    }

    /// Configured profile name, or one generated from the vanity hostname
    pub fn resolved_profile_name(&self, dns_name: &str) -> String {
        match &self.profile_name {
            Some(name) => name.clone(),
            None => crate::naming::generate_profile_name(self.vanity_hostname(dns_name)),
        }
    }

    /// Build the desired profile for a validated config
    ///
    /// The managed-by and hostname tags are always set and override any
    /// user tag with the same key.
    pub fn profile_spec(&self, dns_name: &str) -> Result<ProfileSpec> {
        let mut tags = self.tags.clone();
        tags.insert(MANAGED_BY_TAG.to_string(), MANAGED_BY_VALUE.to_string());
        tags.insert(
            HOSTNAME_TAG.to_string(),
            self.vanity_hostname(dns_name).to_string(),
        );

        Ok(ProfileSpec {
            profile_name: self.resolved_profile_name(dns_name),
            resource_group: self.resource_group.clone(),
            routing_method: self.routing_method.parse()?,
            dns_ttl: self.dns_ttl,
            monitor_protocol: self.monitor_protocol.parse()?,
            monitor_port: self.monitor_port,
            monitor_path: self.monitor_path.clone(),
            health_checks_enabled: self.health_checks_enabled,
            tags,
        })
    }

    /// Build the desired endpoint for one target of a validated config
    pub fn endpoint_spec(&self, endpoint_name: &str, target: &str) -> Result<EndpointSpec> {
        Ok(EndpointSpec {
            endpoint_name: endpoint_name.to_string(),
            endpoint_type: self.endpoint_type.parse()?,
            target: target.to_string(),
            weight: self.weight,
            priority: self.priority,
            status: self.endpoint_status.parse()?,
            location: self.endpoint_location.clone().unwrap_or_default(),
        })
    }

    /// Whether profile-level settings differ enough to need a remote update
    pub fn profile_differs(&self, other: &Self) -> bool {
        self.routing_method != other.routing_method
            || self.dns_ttl != other.dns_ttl
            || self.monitor_protocol != other.monitor_protocol
            || self.monitor_port != other.monitor_port
            || self.monitor_path != other.monitor_path
            || self.health_checks_enabled != other.health_checks_enabled
    }

    /// Whether endpoint-level settings differ enough to need a remote update
    pub fn endpoint_differs(&self, other: &Self) -> bool {
        self.weight != other.weight
            || self.priority != other.priority
            || self.endpoint_status != other.endpoint_status
    }
}
