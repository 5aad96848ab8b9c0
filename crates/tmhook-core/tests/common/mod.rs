//! Test doubles and common utilities for engine contract tests
//!
//! `FakeTrafficManager` is an in-memory control plane. Clones share the
//! remote state and call counters, so several engines (writers) can operate
//! on one "remote" while the test inspects it.

#![allow(dead_code)]

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tmhook_core::config::{ClientConfig, PublisherConfig, WebhookConfig};
use tmhook_core::endpoint::Endpoint;
use tmhook_core::engine::{EngineEvent, TrafficManagerEngine};
use tmhook_core::error::{Error, Result};
use tmhook_core::state::{EndpointState, ProfileState, StateMirror};
use tmhook_core::traits::{
    CnamePublisher, EndpointSpec, EndpointType, ProfileSpec, TrafficManagerClient,
};
use tokio::sync::mpsc;

pub const RG: &str = "rg-dns";

/// Remote operations that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetProfile,
    UpsertProfile,
    DeleteProfile,
    ListProfiles,
    GetEndpoint,
    UpsertEndpoint,
    DeleteEndpoint,
}

type Profiles = HashMap<(String, String), ProfileState>;

/// In-memory Traffic Manager
#[derive(Clone, Default)]
pub struct FakeTrafficManager {
    profiles: Arc<Mutex<Profiles>>,
    calls: Arc<Mutex<HashMap<Op, usize>>>,
    failures: Arc<Mutex<HashMap<Op, fn() -> Error>>>,
    failing_groups: Arc<Mutex<Vec<String>>>,
    /// Report `Conflict` when creating a profile that already exists
    conflict_on_existing: bool,
}

impl FakeTrafficManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A control plane that rejects concurrent profile creation
    pub fn with_conflicts() -> Self {
        Self {
            conflict_on_existing: true,
            ..Self::default()
        }
    }

    /// Another writer's handle onto the same remote state and counters
    pub fn sharing_state_with(other: &Self) -> Self {
        other.clone()
    }

    /// Number of calls made for an operation
    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Number of mutating calls (profile/endpoint upserts and deletes)
    pub fn write_calls(&self) -> usize {
        [
            Op::UpsertProfile,
            Op::DeleteProfile,
            Op::UpsertEndpoint,
            Op::DeleteEndpoint,
        ]
        .into_iter()
        .map(|op| self.calls(op))
        .sum()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every following call of `op` fail
    pub fn fail(&self, op: Op, error: fn() -> Error) {
        self.failures.lock().unwrap().insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Make `list_profiles` fail for one resource group
    pub fn fail_listing(&self, resource_group: &str) {
        self.failing_groups
            .lock()
            .unwrap()
            .push(resource_group.to_string());
    }

    /// Number of profiles on the remote
    pub fn profile_count(&self) -> usize {
        self.profiles.lock().unwrap().len()
    }

    /// Snapshot of one remote profile
    pub fn profile(&self, resource_group: &str, name: &str) -> Option<ProfileState> {
        self.profiles
            .lock()
            .unwrap()
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned()
    }

    /// Seed a profile created by someone else
    pub fn insert_profile(&self, profile: ProfileState) {
        self.profiles.lock().unwrap().insert(
            (profile.resource_group.clone(), profile.profile_name.clone()),
            profile,
        );
    }

    /// Delete a profile behind the engine's back
    pub fn remove_profile(&self, resource_group: &str, name: &str) {
        self.profiles
            .lock()
            .unwrap()
            .remove(&Self::key(resource_group, name));
    }

    /// Delete one endpoint behind the engine's back
    pub fn remove_endpoint(&self, resource_group: &str, profile: &str, endpoint: &str) {
        if let Some(profile) = self
            .profiles
            .lock()
            .unwrap()
            .get_mut(&Self::key(resource_group, profile))
        {
            profile.endpoints.remove(endpoint);
        }
    }

    fn enter(&self, op: Op) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        match self.failures.lock().unwrap().get(&op) {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    fn key(resource_group: &str, name: &str) -> (String, String) {
        (resource_group.to_string(), name.to_string())
    }
}

fn fqdn(profile_name: &str) -> String {
    format!("{}.trafficmanager.net", profile_name)
}

#[async_trait::async_trait]
impl TrafficManagerClient for FakeTrafficManager {
    async fn get_profile(&self, resource_group: &str, profile_name: &str) -> Result<ProfileState> {
        tokio::task::yield_now().await;
        self.enter(Op::GetProfile)?;

        self.profiles
            .lock()
            .unwrap()
            .get(&Self::key(resource_group, profile_name))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("profile {}", profile_name)))
    }

    async fn create_or_update_profile(&self, spec: &ProfileSpec) -> Result<ProfileState> {
        tokio::task::yield_now().await;
        self.enter(Op::UpsertProfile)?;

        let mut profiles = self.profiles.lock().unwrap();
        let key = Self::key(&spec.resource_group, &spec.profile_name);

        if let Some(existing) = profiles.get_mut(&key) {
            if self.conflict_on_existing {
                return Err(Error::conflict(format!(
                    "profile {} already exists",
                    spec.profile_name
                )));
            }
            existing.routing_method = spec.routing_method.to_string();
            existing.dns_ttl = spec.dns_ttl;
            existing.tags = spec.tags.clone();
            existing.updated_at = Some(Utc::now());
            return Ok(existing.clone());
        }

        let mut profile = ProfileState::new(&spec.profile_name, &spec.resource_group);
        profile.fqdn = fqdn(&spec.profile_name);
        profile.routing_method = spec.routing_method.to_string();
        profile.dns_ttl = spec.dns_ttl;
        profile.tags = spec.tags.clone();
        profiles.insert(key, profile.clone());
        Ok(profile)
    }

    async fn delete_profile(&self, resource_group: &str, profile_name: &str) -> Result<()> {
        tokio::task::yield_now().await;
        self.enter(Op::DeleteProfile)?;

        self.profiles
            .lock()
            .unwrap()
            .remove(&Self::key(resource_group, profile_name))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("profile {}", profile_name)))
    }

    async fn list_profiles(&self, resource_group: &str) -> Result<Vec<ProfileState>> {
        tokio::task::yield_now().await;
        self.enter(Op::ListProfiles)?;

        if self
            .failing_groups
            .lock()
            .unwrap()
            .iter()
            .any(|rg| rg == resource_group)
        {
            return Err(Error::auth(format!("no access to {}", resource_group)));
        }

        let mut profiles: Vec<_> = self
            .profiles
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.resource_group == resource_group)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.profile_name.cmp(&b.profile_name));
        Ok(profiles)
    }

    async fn get_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        _endpoint_type: EndpointType,
        endpoint_name: &str,
    ) -> Result<EndpointState> {
        tokio::task::yield_now().await;
        self.enter(Op::GetEndpoint)?;

        self.profiles
            .lock()
            .unwrap()
            .get(&Self::key(resource_group, profile_name))
            .and_then(|p| p.endpoints.get(endpoint_name).cloned())
            .ok_or_else(|| Error::not_found(format!("endpoint {}", endpoint_name)))
    }

    async fn create_or_update_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        spec: &EndpointSpec,
    ) -> Result<EndpointState> {
        tokio::task::yield_now().await;
        self.enter(Op::UpsertEndpoint)?;

        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(&Self::key(resource_group, profile_name))
            .ok_or_else(|| Error::not_found(format!("profile {}", profile_name)))?;

        let now = Utc::now();
        let endpoint = EndpointState {
            endpoint_name: spec.endpoint_name.clone(),
            endpoint_type: spec.endpoint_type.to_string(),
            target: spec.target.clone(),
            weight: spec.weight,
            priority: spec.priority,
            status: spec.status.to_string(),
            location: spec.location.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        profile
            .endpoints
            .insert(spec.endpoint_name.clone(), endpoint.clone());
        Ok(endpoint)
    }

    async fn delete_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        _endpoint_type: EndpointType,
        endpoint_name: &str,
    ) -> Result<()> {
        tokio::task::yield_now().await;
        self.enter(Op::DeleteEndpoint)?;

        self.profiles
            .lock()
            .unwrap()
            .get_mut(&Self::key(resource_group, profile_name))
            .and_then(|p| p.endpoints.remove(endpoint_name))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("endpoint {}", endpoint_name)))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// A publisher that records what it was asked to do
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, String, String, i64)>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every call fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// (name, hostname, target, ttl) of every successful publish
    pub fn published(&self) -> Vec<(String, String, String, i64)> {
        self.published.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CnamePublisher for RecordingPublisher {
    async fn publish(&self, name: &str, hostname: &str, target: &str, ttl: i64) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::http("connection refused"));
        }
        self.published.lock().unwrap().push((
            name.to_string(),
            hostname.to_string(),
            target.to_string(),
            ttl,
        ));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::http("connection refused"));
        }
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "recording"
    }
}

/// Helper to create a minimal WebhookConfig for testing
pub fn minimal_config() -> WebhookConfig {
    let mut config = WebhookConfig::new(ClientConfig::Custom {
        factory: "fake".to_string(),
        config: serde_json::json!({}),
    });
    config.publisher = PublisherConfig::Disabled;
    config.resource_groups = vec![RG.to_string()];
    config.engine.event_channel_capacity = 100;
    config
}

/// Build an engine over a fake remote and publisher
pub fn engine(
    remote: &FakeTrafficManager,
    publisher: &RecordingPublisher,
) -> (TrafficManagerEngine, mpsc::Receiver<EngineEvent>) {
    engine_with_config(remote, publisher, minimal_config())
}

pub fn engine_with_config(
    remote: &FakeTrafficManager,
    publisher: &RecordingPublisher,
    config: WebhookConfig,
) -> (TrafficManagerEngine, mpsc::Receiver<EngineEvent>) {
    TrafficManagerEngine::new(
        Box::new(FakeTrafficManager::sharing_state_with(remote)),
        Box::new(publisher.clone()),
        StateMirror::new(Duration::from_secs(300)),
        config,
    )
    .expect("engine construction succeeds")
}

/// An enabled Traffic Manager endpoint with a location in `rg-dns`
pub fn tm_endpoint(dns_name: &str, record_type: &str, extra: &[(&str, &str)]) -> Endpoint {
    let mut endpoint = Endpoint::new(dns_name, record_type)
        .with_property("webhook/traffic-manager-enabled", "true")
        .with_property("webhook/traffic-manager-resource-group", RG)
        .with_property("webhook/traffic-manager-endpoint-location", "eastus");
    for (key, value) in extra {
        endpoint = endpoint.with_property(format!("webhook/traffic-manager-{}", key), *value);
    }
    endpoint
}

/// Drain every event currently buffered
pub fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
