// ARM wire types for `Microsoft.Network/trafficmanagerprofiles` and the
// conversions to and from the core specs and states.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tmhook_core::state::{EndpointState, ProfileState};
use tmhook_core::traits::{EndpointSpec, EndpointType, MonitorProtocol, ProfileSpec};

/// Profiles are global resources
pub(crate) const PROFILE_LOCATION: &str = "global";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArmProfile {
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub properties: ProfileProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_routing_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_config: Option<DnsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_config: Option<MonitorConfig>,
    #[serde(default, skip_serializing)]
    pub endpoints: Vec<ArmEndpoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DnsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MonitorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArmEndpoint {
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
    /// e.g. `Microsoft.Network/trafficManagerProfiles/externalEndpoints`
    #[serde(default, rename = "type", skip_serializing)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub properties: EndpointProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EndpointProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_location: Option<String>,
}

/// One page of `GET .../trafficmanagerprofiles`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileList {
    #[serde(default)]
    pub value: Vec<ArmProfile>,
    #[serde(default)]
    pub next_link: Option<String>,
}

impl ArmProfile {
    pub fn from_spec(spec: &ProfileSpec) -> Self {
        // TCP probes have no path
        let path = match spec.monitor_protocol {
            MonitorProtocol::Tcp => None,
            _ => Some(spec.monitor_path.clone()),
        };

        Self {
            name: spec.profile_name.clone(),
            location: Some(PROFILE_LOCATION.to_string()),
            tags: spec.tags.clone(),
            properties: ProfileProperties {
                profile_status: Some(status_str(spec.health_checks_enabled).to_string()),
                traffic_routing_method: Some(spec.routing_method.to_string()),
                dns_config: Some(DnsConfig {
                    relative_name: Some(spec.profile_name.clone()),
                    fqdn: None,
                    ttl: Some(spec.dns_ttl),
                }),
                monitor_config: Some(MonitorConfig {
                    protocol: Some(spec.monitor_protocol.to_string()),
                    port: Some(spec.monitor_port),
                    path,
                }),
                endpoints: Vec::new(),
            },
        }
    }

    pub fn into_state(self, resource_group: &str) -> ProfileState {
        let mut state = ProfileState::new(self.name, resource_group);
        let properties = self.properties;

        if let Some(dns) = properties.dns_config {
            state.fqdn = dns.fqdn.unwrap_or_default();
            state.dns_ttl = dns.ttl.unwrap_or_default();
        }
        state.routing_method = properties.traffic_routing_method.unwrap_or_default();
        state.endpoints = properties
            .endpoints
            .into_iter()
            .filter_map(|e| e.into_state())
            .map(|e| (e.endpoint_name.clone(), e))
            .collect();
        state.tags = self.tags;
        state.with_hostname_from_tags()
    }
}

impl ArmEndpoint {
    pub fn from_spec(spec: &EndpointSpec) -> Self {
        let location = (spec.endpoint_type == EndpointType::External && !spec.location.is_empty())
            .then(|| spec.location.clone());

        Self {
            name: Some(spec.endpoint_name.clone()),
            resource_type: None,
            properties: EndpointProperties {
                target: Some(spec.target.clone()),
                endpoint_status: Some(spec.status.to_string()),
                weight: Some(spec.weight),
                priority: Some(spec.priority),
                endpoint_location: location,
            },
        }
    }

    /// Endpoints without a name are dropped
    pub fn into_state(self) -> Option<EndpointState> {
        let name = self.name?;
        let now = Utc::now();
        let properties = self.properties;

        Some(EndpointState {
            endpoint_name: name,
            endpoint_type: self
                .resource_type
                .as_deref()
                .map(endpoint_type_from_resource_type)
                .unwrap_or_default(),
            target: properties.target.unwrap_or_default(),
            weight: properties.weight.unwrap_or_default(),
            priority: properties.priority.unwrap_or_default(),
            status: properties.endpoint_status.unwrap_or_default(),
            location: properties.endpoint_location.unwrap_or_default(),
            created_at: Some(now),
            updated_at: Some(now),
        })
    }
}

fn status_str(enabled: bool) -> &'static str {
    if enabled { "Enabled" } else { "Disabled" }
}

/// `Microsoft.Network/trafficManagerProfiles/externalEndpoints` → `ExternalEndpoints`
///
/// Unknown kinds are passed through as their last path segment.
pub(crate) fn endpoint_type_from_resource_type(resource_type: &str) -> String {
    let kind = resource_type.rsplit('/').next().unwrap_or(resource_type);
    EndpointType::ALLOWED
        .iter()
        .find(|allowed| allowed.eq_ignore_ascii_case(kind))
        .map(|allowed| allowed.to_string())
        .unwrap_or_else(|| kind.to_string())
}
