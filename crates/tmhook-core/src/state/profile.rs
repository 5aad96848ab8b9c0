// # Profile State
//
// Last-known shape of a remote profile and its endpoints. Values are plain
// owned data: `Clone` is a deep copy, which is what the mirror relies on to
// keep cached state and caller copies independent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tag used to scope list operations to profiles this webhook owns
pub const MANAGED_BY_TAG: &str = "managedBy";

/// Value of [`MANAGED_BY_TAG`] on owned profiles
pub const MANAGED_BY_VALUE: &str = "external-dns-traffic-manager-webhook";

/// Tag carrying the vanity hostname a profile serves
pub const HOSTNAME_TAG: &str = "hostname";

/// State of a remote profile
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileState {
    pub profile_name: String,
    pub resource_group: String,
    /// Vanity hostname this profile is published under
    pub hostname: String,
    /// Control-plane FQDN (e.g. `demo-tm.trafficmanager.net`)
    pub fqdn: String,
    pub routing_method: String,
    pub dns_ttl: i64,
    /// Endpoint name → endpoint state
    pub endpoints: HashMap<String, EndpointState>,
    pub tags: HashMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// When the mirror stored this value; `None` means never cached
    pub cached_at: Option<DateTime<Utc>>,
}

impl ProfileState {
    /// Create an empty profile state stamped with the current time
    pub fn new(profile_name: impl Into<String>, resource_group: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            profile_name: profile_name.into(),
            resource_group: resource_group.into(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Check if the cached value is older than `ttl`
    ///
    /// A value that was never cached is always expired.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        match self.cached_at {
            Some(cached_at) => Utc::now().signed_duration_since(cached_at) > ttl,
            None => true,
        }
    }

    /// Whether the profile carries this webhook's managed-by tag
    pub fn is_managed(&self) -> bool {
        self.tags.get(MANAGED_BY_TAG).map(String::as_str) == Some(MANAGED_BY_VALUE)
    }

    /// Fill `hostname` from the hostname tag when the remote did not set it
    pub fn with_hostname_from_tags(mut self) -> Self {
        if self.hostname.is_empty() {
            if let Some(hostname) = self.tags.get(HOSTNAME_TAG) {
                self.hostname = hostname.clone();
            }
        }
        self
    }
}

/// State of a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointState {
    pub endpoint_name: String,
    pub endpoint_type: String,
    /// IP address or FQDN
    pub target: String,
    pub weight: i64,
    pub priority: i64,
    pub status: String,
    pub location: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
