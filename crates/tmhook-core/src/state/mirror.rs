// # State Mirror
//
// Time-bounded, in-process reflection of remote profile state keyed by
// vanity hostname.
//
// ## Purpose
//
// Avoids redundant remote reads between closely spaced reconcile calls and
// answers "current records" queries cheaply. It is not a source of truth:
// on a miss or expiry the engine goes back to the control plane.
//
// ## Expiry
//
// - Only `get` (and the endpoint getter built on it) checks expiry
// - Expired entries are reported absent but not removed; the next `set`
//   overwrites them
// - A value without `cached_at` is always expired
//
// ## Aliasing
//
// `set` stores a clone and every getter returns a clone, so neither side can
// mutate the other's copy.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::profile::{EndpointState, ProfileState};

/// Snapshot of mirror statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    pub total_profiles: usize,
    pub total_endpoints: usize,
    pub expired_profiles: usize,
    /// Cache TTL in seconds
    pub ttl_secs: u64,
}

/// In-memory profile mirror
///
/// Cloning the mirror yields another handle onto the same map; construct one
/// per engine with [`StateMirror::new`] and pass it in explicitly.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tmhook_core::state::{ProfileState, StateMirror};
///
/// #[tokio::main]
/// async fn main() {
///     let mirror = StateMirror::new(Duration::from_secs(300));
///
///     mirror.set("demo.example.com", &ProfileState::new("demo-tm", "rg")).await;
///
///     let cached = mirror.get("demo.example.com").await;
///     assert_eq!(cached.map(|p| p.profile_name), Some("demo-tm".to_string()));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StateMirror {
    inner: Arc<RwLock<HashMap<String, ProfileState>>>,
    ttl: Duration,
}

impl StateMirror {
    /// Create an empty mirror whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Configured cache TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn chrono_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// Get a non-expired profile by vanity hostname
    pub async fn get(&self, hostname: &str) -> Option<ProfileState> {
        let guard = self.inner.read().await;
        let profile = guard.get(hostname)?;

        if profile.is_expired(self.chrono_ttl()) {
            debug!(hostname, cached_at = ?profile.cached_at, "Profile cache expired");
            return None;
        }

        Some(profile.clone())
    }

    /// Store a profile under a vanity hostname, stamping `cached_at`
    pub async fn set(&self, hostname: &str, profile: &ProfileState) {
        let mut stored = profile.clone();
        stored.cached_at = Some(Utc::now());

        debug!(
            hostname,
            profile_name = %stored.profile_name,
            endpoint_count = stored.endpoints.len(),
            "Profile state updated"
        );

        let mut guard = self.inner.write().await;
        guard.insert(hostname.to_string(), stored);
    }

    /// Remove a profile
    pub async fn delete(&self, hostname: &str) {
        let mut guard = self.inner.write().await;
        guard.remove(hostname);
        debug!(hostname, "Profile state deleted");
    }

    /// Drop every profile of `resource_group` not stored under one of `keep`
    ///
    /// Returns the number of entries removed.
    pub async fn retain_group(&self, resource_group: &str, keep: &HashSet<String>) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|hostname, profile| {
            profile.resource_group != resource_group || keep.contains(hostname)
        });
        let removed = before - guard.len();
        if removed > 0 {
            debug!(resource_group, removed, "Dropped profiles no longer on the remote");
        }
        removed
    }

    /// All stored profiles, expired or not
    pub async fn list(&self) -> Vec<ProfileState> {
        let guard = self.inner.read().await;
        guard.values().cloned().collect()
    }

    /// Stored profiles that have not expired
    pub async fn list_fresh(&self) -> Vec<ProfileState> {
        let ttl = self.chrono_ttl();
        let guard = self.inner.read().await;
        guard
            .values()
            .filter(|profile| !profile.is_expired(ttl))
            .cloned()
            .collect()
    }

    /// Find a profile by its control-plane name (linear scan)
    pub async fn get_by_profile_name(&self, profile_name: &str) -> Option<ProfileState> {
        let guard = self.inner.read().await;
        guard
            .values()
            .find(|profile| profile.profile_name == profile_name)
            .cloned()
    }

    /// Get one endpoint of a non-expired profile
    pub async fn get_endpoint(&self, hostname: &str, endpoint_name: &str) -> Option<EndpointState> {
        self.get(hostname)
            .await
            .and_then(|mut profile| profile.endpoints.remove(endpoint_name))
    }

    /// Insert or replace an endpoint of an existing profile
    ///
    /// Does nothing (with a warning) when the profile is not mirrored.
    pub async fn set_endpoint(&self, hostname: &str, endpoint_name: &str, endpoint: &EndpointState) {
        let mut guard = self.inner.write().await;

        let Some(profile) = guard.get_mut(hostname) else {
            warn!(
                hostname,
                endpoint_name, "Attempted to set endpoint for non-existent profile"
            );
            return;
        };

        let now = Utc::now();
        profile
            .endpoints
            .insert(endpoint_name.to_string(), endpoint.clone());
        profile.updated_at = Some(now);
        profile.cached_at = Some(now);

        debug!(hostname, endpoint_name, "Endpoint state updated");
    }

    /// Remove an endpoint from a mirrored profile
    pub async fn delete_endpoint(&self, hostname: &str, endpoint_name: &str) {
        let mut guard = self.inner.write().await;

        if let Some(profile) = guard.get_mut(hostname) {
            let now = Utc::now();
            profile.endpoints.remove(endpoint_name);
            profile.updated_at = Some(now);
            profile.cached_at = Some(now);
            debug!(hostname, endpoint_name, "Endpoint state deleted");
        }
    }

    /// Mirror statistics
    pub async fn stats(&self) -> MirrorStats {
        let ttl = self.chrono_ttl();
        let guard = self.inner.read().await;

        MirrorStats {
            total_profiles: guard.len(),
            total_endpoints: guard.values().map(|p| p.endpoints.len()).sum(),
            expired_profiles: guard.values().filter(|p| p.is_expired(ttl)).count(),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Number of stored profiles, expired or not
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the mirror is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove every profile
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.clear();
        debug!("State cleared");
    }

    /// Store a value verbatim, keeping its `cached_at`
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, hostname: &str, profile: ProfileState) {
        self.inner.write().await.insert(hostname.to_string(), profile);
    }
}
