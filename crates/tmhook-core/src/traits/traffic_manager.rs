// # Traffic Manager Client Trait
//
// Defines the interface to the remote traffic-routing control plane.
//
// ## Implementations
//
// - Azure Traffic Manager (ARM REST API): `tmhook-provider-azure` crate
// - Test doubles: `tests/common/mod.rs`
//
// ## Usage
//
// ```rust,ignore
// use tmhook_core::TrafficManagerClient;
//
// let profile = client.get_profile("rg-dns", "demo-example-com-tm").await?;
// println!("{} -> {}", profile.profile_name, profile.fqdn);
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::state::{EndpointState, ProfileState};

/// Traffic routing method of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingMethod {
    Weighted,
    Priority,
    Performance,
    Geographic,
}

impl RoutingMethod {
    /// Accepted annotation values
    pub const ALLOWED: &'static [&'static str] =
        &["Weighted", "Priority", "Performance", "Geographic"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weighted => "Weighted",
            Self::Priority => "Priority",
            Self::Performance => "Performance",
            Self::Geographic => "Geographic",
        }
    }
}

impl FromStr for RoutingMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Weighted" => Ok(Self::Weighted),
            "Priority" => Ok(Self::Priority),
            "Performance" => Ok(Self::Performance),
            "Geographic" => Ok(Self::Geographic),
            other => Err(crate::Error::config(format!(
                "invalid routing method {:?}, must be one of: {}",
                other,
                Self::ALLOWED.join(", ")
            ))),
        }
    }
}

impl fmt::Display for RoutingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health probe protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorProtocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS")]
    Https,
    #[serde(rename = "TCP")]
    Tcp,
}

impl MonitorProtocol {
    pub const ALLOWED: &'static [&'static str] = &["HTTP", "HTTPS", "TCP"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
        }
    }
}

impl FromStr for MonitorProtocol {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP" => Ok(Self::Http),
            "HTTPS" => Ok(Self::Https),
            "TCP" => Ok(Self::Tcp),
            other => Err(crate::Error::config(format!(
                "invalid monitor protocol {:?}, must be one of: {}",
                other,
                Self::ALLOWED.join(", ")
            ))),
        }
    }
}

impl fmt::Display for MonitorProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointStatus {
    Enabled,
    Disabled,
}

impl EndpointStatus {
    pub const ALLOWED: &'static [&'static str] = &["Enabled", "Disabled"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "Enabled",
            Self::Disabled => "Disabled",
        }
    }
}

impl FromStr for EndpointStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enabled" => Ok(Self::Enabled),
            "Disabled" => Ok(Self::Disabled),
            other => Err(crate::Error::config(format!(
                "invalid endpoint status {:?}, must be one of: {}",
                other,
                Self::ALLOWED.join(", ")
            ))),
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of endpoint inside a profile
///
/// `External` endpoints are addressed by FQDN or IP and need a location,
/// `Azure` endpoints reference a resource inside the same cloud, `Nested`
/// endpoints point at another profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointType {
    #[serde(rename = "ExternalEndpoints")]
    External,
    #[serde(rename = "AzureEndpoints")]
    Azure,
    #[serde(rename = "NestedEndpoints")]
    Nested,
}

impl EndpointType {
    pub const ALLOWED: &'static [&'static str] =
        &["ExternalEndpoints", "AzureEndpoints", "NestedEndpoints"];

    /// Path segment used by the control plane for this endpoint kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "ExternalEndpoints",
            Self::Azure => "AzureEndpoints",
            Self::Nested => "NestedEndpoints",
        }
    }
}

impl FromStr for EndpointType {
    type Err = crate::Error;

    /// Accepts both the control-plane spelling and the short form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ExternalEndpoints" | "External" => Ok(Self::External),
            "AzureEndpoints" | "Azure" | "Internal" => Ok(Self::Azure),
            "NestedEndpoints" | "Nested" => Ok(Self::Nested),
            other => Err(crate::Error::config(format!(
                "invalid endpoint type {:?}, must be one of: {}",
                other,
                Self::ALLOWED.join(", ")
            ))),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired shape of a remote profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSpec {
    pub profile_name: String,
    pub resource_group: String,
    pub routing_method: RoutingMethod,
    /// DNS TTL in seconds
    pub dns_ttl: i64,
    pub monitor_protocol: MonitorProtocol,
    pub monitor_port: i64,
    pub monitor_path: String,
    pub health_checks_enabled: bool,
    pub tags: HashMap<String, String>,
}

/// Desired shape of a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub endpoint_name: String,
    pub endpoint_type: EndpointType,
    /// IP address or FQDN
    pub target: String,
    pub weight: i64,
    pub priority: i64,
    pub status: EndpointStatus,
    /// Region, only sent for external endpoints
    pub location: String,
}

/// Trait for remote control-plane clients
///
/// Every method is a single request/response against the control plane and
/// is the engine's only suspension point. Create-or-update calls must be
/// idempotent: issuing the same spec twice converges to the same resource.
///
/// # Error Classification
///
/// Implementations must map transport failures onto [`crate::Error`] so the
/// engine can react:
///
/// - missing resource → `Error::NotFound`
/// - concurrent create / precondition failure → `Error::Conflict`
/// - 401/403 → `Error::Authentication`
/// - 429 → `Error::RateLimited`
/// - anything else → `Error::Provider`
///
/// # Forbidden Capabilities
/// - Retry or backoff (the record pipeline re-sends batches)
/// - Caching remote state (owned by `StateMirror`)
/// - Deciding whether a write is needed (owned by `TrafficManagerEngine`)
#[async_trait]
pub trait TrafficManagerClient: Send + Sync {
    /// Fetch a profile including all of its endpoints and tags
    async fn get_profile(
        &self,
        resource_group: &str,
        profile_name: &str,
    ) -> Result<ProfileState, crate::Error>;

    /// Create the profile, or update it in place when it already exists
    ///
    /// Returns `Error::Conflict` when a concurrent writer won the race.
    async fn create_or_update_profile(
        &self,
        spec: &ProfileSpec,
    ) -> Result<ProfileState, crate::Error>;

    /// Delete a profile and every endpoint it owns
    async fn delete_profile(
        &self,
        resource_group: &str,
        profile_name: &str,
    ) -> Result<(), crate::Error>;

    /// List every profile in a resource group, managed or not
    async fn list_profiles(&self, resource_group: &str) -> Result<Vec<ProfileState>, crate::Error>;

    /// Fetch a single endpoint
    async fn get_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: EndpointType,
        endpoint_name: &str,
    ) -> Result<EndpointState, crate::Error>;

    /// Create the endpoint, or update it in place when it already exists
    async fn create_or_update_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        spec: &EndpointSpec,
    ) -> Result<EndpointState, crate::Error>;

    /// Delete a single endpoint
    async fn delete_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: EndpointType,
        endpoint_name: &str,
    ) -> Result<(), crate::Error>;

    /// Client name for logging (e.g. "azure")
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing clients from configuration
pub trait TrafficManagerClientFactory: Send + Sync {
    fn create(
        &self,
        config: &crate::config::ClientConfig,
    ) -> Result<Box<dyn TrafficManagerClient>, crate::Error>;
}
