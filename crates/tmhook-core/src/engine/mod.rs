//! Reconciliation engine
//!
//! The TrafficManagerEngine turns external-dns endpoint changes into Traffic
//! Manager profile and endpoint writes:
//! - Parsing and validating per-endpoint annotations
//! - Converging the shared profile (create, or adopt on conflict)
//! - Upserting and deleting member endpoints
//! - Mirroring the authoritative profile after every write
//! - Publishing the vanity CNAME (best effort)
//!
//! ## Architecture
//!
//! ```text
//!  external-dns batch
//!         │
//!         ▼
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │ TrafficManagerEngine │─────▶│ TrafficManagerClient │
//! └──────────────────────┘      └──────────────────────┘
//!         │        │
//!         │        └──────────────┐
//!         ▼                       ▼
//! ┌─────────────┐         ┌───────────────┐
//! │ StateMirror │         │ CnamePublisher│
//! └─────────────┘         └───────────────┘
//! ```
//!
//! ## Multiple Writers
//!
//! Several webhook instances (one per cluster) may converge on one profile
//! without coordination. Profile creation is a create-or-update; when the
//! control plane reports a conflict the engine reads the existing profile
//! and carries on adding its own endpoints.
//!
//! ## Failure Semantics
//!
//! - Configuration errors fail only their own item
//! - `NotFound` on endpoint delete is logged and skipped
//! - Any other remote error aborts the operation and, inside
//!   [`apply_changes`](TrafficManagerEngine::apply_changes), the batch
//! - Publisher errors are logged and never propagated
//! - No rollback: a cancelled operation leaves whatever was already written

mod plan;

pub use plan::EndpointKey;

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::annotations::{self, parse_config};
use crate::config::WebhookConfig;
use crate::endpoint::{Changes, Endpoint, RECORD_TYPE_CNAME};
use crate::error::{Error, Result};
use crate::filter::DomainFilter;
use crate::naming;
use crate::state::{ProfileState, StateMirror};
use crate::traits::{CnamePublisher, ProfileSpec, TrafficManagerClient};
use plan::Plan;

/// TTL of published and reported vanity CNAME records
pub const CNAME_TTL: i64 = 300;

pub const LABEL_PROFILE: &str = "traffic-manager-profile";
pub const LABEL_RESOURCE_GROUP: &str = "traffic-manager-resource-group";
pub const LABEL_ROUTING_METHOD: &str = "traffic-manager-routing-method";

/// Events emitted by the TrafficManagerEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Profile created or converged by this writer
    ProfileConverged {
        resource_group: String,
        profile_name: String,
    },

    /// Profile already existed (another writer won the race) and was adopted
    ProfileAdopted {
        resource_group: String,
        profile_name: String,
    },

    /// Empty profile removed
    ProfileDeleted {
        resource_group: String,
        profile_name: String,
    },

    /// Endpoint created or updated
    EndpointUpserted {
        profile_name: String,
        endpoint_name: String,
    },

    /// Endpoint removed
    EndpointDeleted {
        profile_name: String,
        endpoint_name: String,
    },

    /// Item rejected because of its annotations
    ConfigRejected { dns_name: String, reason: String },

    /// Vanity CNAME publication failed
    PublishFailed { hostname: String, error: String },

    /// Change batch finished
    BatchApplied {
        created: usize,
        updated: usize,
        deleted: usize,
        failed: usize,
    },

    /// Change batch aborted by a remote error
    BatchFailed { error: String },
}

/// Remote profile as seen just before an update
enum Observed {
    /// Read failed; trust the old annotations
    Unknown,
    Missing,
    Present(ProfileState),
}

impl Observed {
    fn has_endpoint(&self, endpoint_name: &str) -> bool {
        match self {
            Observed::Unknown => true,
            Observed::Missing => false,
            Observed::Present(profile) => profile.endpoints.contains_key(endpoint_name),
        }
    }
}

/// Result of one create/update/delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Ownership record, disabled config, or nothing left to do
    Skipped,
    /// Remote writes were issued for these endpoints
    Applied(Vec<EndpointKey>),
}

/// Kind of change an item belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// An item rejected because of its annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: ChangeKind,
    pub dns_name: String,
    pub reason: String,
}

/// Summary of an applied change batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Traffic Manager reconciliation engine
///
/// Every operation runs to completion on the caller's task; the only
/// suspension points are remote client and publisher calls. Dropping the
/// future cancels the operation where it stands.
pub struct TrafficManagerEngine {
    client: Box<dyn TrafficManagerClient>,
    publisher: Box<dyn CnamePublisher>,
    mirror: StateMirror,
    resource_groups: Vec<String>,
    domain_filter: DomainFilter,
    copy_annotations_to_labels: bool,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl TrafficManagerEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine
    /// events. Events are dropped with a warning when the receiver lags.
    pub fn new(
        client: Box<dyn TrafficManagerClient>,
        publisher: Box<dyn CnamePublisher>,
        mirror: StateMirror,
        config: WebhookConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            client,
            publisher,
            mirror,
            resource_groups: config.resource_groups,
            domain_filter: config.domain_filter,
            copy_annotations_to_labels: config.engine.copy_annotations_to_labels,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The state mirror this engine writes to
    pub fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    /// Domain filter advertised during negotiation
    pub fn domain_filter(&self) -> &DomainFilter {
        &self.domain_filter
    }

    /// Converge the profile and endpoints described by a new endpoint
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the annotations do not parse or validate; no
    ///   remote call has been made in that case
    /// - any remote error other than a profile-create conflict
    pub async fn create(&self, endpoint: &Endpoint) -> Result<ChangeOutcome> {
        let Some(plan) = self.prepare(endpoint)? else {
            return Ok(ChangeOutcome::Skipped);
        };

        info!(
            dns_name = %plan.dns_name,
            vanity_hostname = %plan.vanity_hostname,
            profile_name = %plan.profile_name,
            resource_group = %plan.resource_group(),
            "Creating Traffic Manager endpoint"
        );

        let spec = plan.config.profile_spec(&plan.dns_name)?;
        self.converge_profile(&spec).await?;

        for endpoint_spec in &plan.endpoints {
            self.client
                .create_or_update_endpoint(plan.resource_group(), &plan.profile_name, endpoint_spec)
                .await?;

            info!(
                profile_name = %plan.profile_name,
                endpoint_name = %endpoint_spec.endpoint_name,
                target = %endpoint_spec.target,
                weight = endpoint_spec.weight,
                "Traffic Manager endpoint upserted"
            );
            self.emit_event(EngineEvent::EndpointUpserted {
                profile_name: plan.profile_name.clone(),
                endpoint_name: endpoint_spec.endpoint_name.clone(),
            });
        }

        let refreshed = self.refresh(&plan).await;
        if let Some(profile) = refreshed.filter(|_| plan.has_distinct_vanity()) {
            self.publish_cname(&plan.vanity_hostname, &profile.fqdn).await;
        }

        Ok(ChangeOutcome::Applied(plan.keys()))
    }

    /// Apply the difference between two versions of an endpoint
    ///
    /// The profile is rewritten only when routing method, TTL or monitor
    /// settings changed; endpoints only when weight, priority or status
    /// changed (or the endpoint is new). An old config that no longer parses,
    /// validates or was disabled counts as "everything changed".
    ///
    /// Anything skipped is first checked against the remote profile, so a
    /// profile or endpoint removed out of band is recreated.
    ///
    /// When the profile identity (resource group, profile name or vanity
    /// hostname) changed, the new profile is converged in full and the old
    /// endpoints are retired the way `delete` would.
    pub async fn update(&self, old: &Endpoint, new: &Endpoint) -> Result<ChangeOutcome> {
        let Some(plan) = self.prepare(new)? else {
            return Ok(ChangeOutcome::Skipped);
        };

        let old_plan = parse_config(&old.annotations())
            .ok()
            .filter(|config| config.enabled && config.validate().is_ok())
            .and_then(|config| Plan::build(old, config).ok());

        let moved = old_plan.as_ref().filter(|old| !old.same_profile(&plan));
        let comparable = old_plan.as_ref().filter(|old| old.same_profile(&plan));

        let mut profile_changed =
            comparable.is_none_or(|old| plan.config.profile_differs(&old.config));
        let endpoint_changed =
            comparable.is_none_or(|old| plan.config.endpoint_differs(&old.config));
        let known: HashSet<&str> = comparable
            .iter()
            .flat_map(|old| old.endpoints.iter().map(|e| e.endpoint_name.as_str()))
            .collect();

        let observed = if profile_changed && endpoint_changed {
            Observed::Unknown
        } else {
            self.observe(&plan).await
        };
        let recreated = matches!(observed, Observed::Missing);
        profile_changed |= recreated;

        info!(
            dns_name = %plan.dns_name,
            profile_name = %plan.profile_name,
            profile_changed,
            endpoint_changed,
            moved = moved.is_some(),
            recreated,
            "Updating Traffic Manager endpoint"
        );

        if profile_changed {
            let spec = plan.config.profile_spec(&plan.dns_name)?;
            self.converge_profile(&spec).await?;
        }

        let mut written = Vec::new();
        for endpoint_spec in &plan.endpoints {
            let name = endpoint_spec.endpoint_name.as_str();
            if !endpoint_changed && known.contains(name) && observed.has_endpoint(name) {
                debug!(endpoint_name = %name, "Endpoint settings unchanged, skipping");
                continue;
            }

            self.client
                .create_or_update_endpoint(plan.resource_group(), &plan.profile_name, endpoint_spec)
                .await?;

            info!(
                profile_name = %plan.profile_name,
                endpoint_name = %endpoint_spec.endpoint_name,
                weight = endpoint_spec.weight,
                status = %endpoint_spec.status,
                "Traffic Manager endpoint updated"
            );
            self.emit_event(EngineEvent::EndpointUpserted {
                profile_name: plan.profile_name.clone(),
                endpoint_name: endpoint_spec.endpoint_name.clone(),
            });
            written.push(plan.key(&endpoint_spec.endpoint_name));
        }

        let refreshed = match observed {
            Observed::Present(profile) if !profile_changed && written.is_empty() => {
                Some(self.cache(&plan.vanity_hostname, profile).await)
            }
            _ => self.refresh(&plan).await,
        };

        if (moved.is_some() || recreated) && plan.has_distinct_vanity() {
            if let Some(profile) = refreshed {
                self.publish_cname(&plan.vanity_hostname, &profile.fqdn).await;
            }
        }

        if let Some(old_plan) = moved {
            self.retire(old, old_plan, &plan).await?;
        }

        Ok(ChangeOutcome::Applied(written))
    }

    /// What the remote holds for a plan's profile right now
    ///
    /// Read errors other than `NotFound` yield `Unknown`; the caller then
    /// falls back to trusting the old annotations.
    async fn observe(&self, plan: &Plan) -> Observed {
        match self
            .client
            .get_profile(plan.resource_group(), &plan.profile_name)
            .await
        {
            Ok(profile) => Observed::Present(profile),
            Err(e) if e.is_not_found() => {
                warn!(profile_name = %plan.profile_name, "Profile missing on the remote, recreating");
                Observed::Missing
            }
            Err(e) => {
                warn!(profile_name = %plan.profile_name, "Failed to read profile before update: {}", e);
                Observed::Unknown
            }
        }
    }

    /// Remove what an endpoint owned under its previous profile identity
    async fn retire(&self, old: &Endpoint, old_plan: &Plan, plan: &Plan) -> Result<()> {
        info!(
            old_profile = %old_plan.profile_name,
            old_hostname = %old_plan.vanity_hostname,
            profile_name = %plan.profile_name,
            "Profile identity changed, retiring previous endpoints"
        );

        if old_plan.resource_group() != plan.resource_group()
            || old_plan.profile_name != plan.profile_name
        {
            let protected: HashSet<EndpointKey> = plan.keys().into_iter().collect();
            self.delete_protecting(old, &protected).await?;
            return Ok(());
        }

        // Same profile under a new hostname: only the old hostname goes away
        self.mirror.delete(&old_plan.vanity_hostname).await;
        if old_plan.has_distinct_vanity() {
            self.remove_cname(&old_plan.vanity_hostname).await;
        }
        Ok(())
    }

    /// Remove the endpoints of a deleted external-dns endpoint
    ///
    /// The profile itself is removed once no endpoint (from any writer)
    /// remains in it.
    pub async fn delete(&self, endpoint: &Endpoint) -> Result<ChangeOutcome> {
        self.delete_protecting(endpoint, &HashSet::new()).await
    }

    async fn delete_protecting(
        &self,
        endpoint: &Endpoint,
        protected: &HashSet<EndpointKey>,
    ) -> Result<ChangeOutcome> {
        let Some(plan) = self.prepare(endpoint)? else {
            return Ok(ChangeOutcome::Skipped);
        };

        let targets: Vec<_> = plan
            .endpoints
            .iter()
            .filter(|spec| !protected.contains(&plan.key(&spec.endpoint_name)))
            .collect();

        if targets.is_empty() {
            info!(
                dns_name = %plan.dns_name,
                profile_name = %plan.profile_name,
                "Endpoints were upserted in the same batch, skipping delete"
            );
            return Ok(ChangeOutcome::Skipped);
        }

        info!(
            dns_name = %plan.dns_name,
            profile_name = %plan.profile_name,
            "Deleting Traffic Manager endpoint"
        );

        let mut removed = Vec::new();
        for spec in targets {
            let result = self
                .client
                .delete_endpoint(
                    plan.resource_group(),
                    &plan.profile_name,
                    spec.endpoint_type,
                    &spec.endpoint_name,
                )
                .await;

            match result {
                Ok(()) => {
                    self.mirror
                        .delete_endpoint(&plan.vanity_hostname, &spec.endpoint_name)
                        .await;
                    self.emit_event(EngineEvent::EndpointDeleted {
                        profile_name: plan.profile_name.clone(),
                        endpoint_name: spec.endpoint_name.clone(),
                    });
                    removed.push(plan.key(&spec.endpoint_name));
                }
                Err(e) if e.is_not_found() => {
                    warn!(
                        endpoint_name = %spec.endpoint_name,
                        profile_name = %plan.profile_name,
                        "Endpoint already gone: {}", e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        match self
            .client
            .get_profile(plan.resource_group(), &plan.profile_name)
            .await
        {
            Ok(profile) if profile.endpoints.is_empty() => {
                self.delete_empty_profile(&plan).await?;
            }
            Ok(profile) => {
                debug!(
                    profile_name = %plan.profile_name,
                    remaining = profile.endpoints.len(),
                    "Profile still has endpoints, keeping it"
                );
                self.cache(&plan.vanity_hostname, profile).await;
            }
            Err(e) if e.is_not_found() => {
                debug!(profile_name = %plan.profile_name, "Profile already gone");
                self.mirror.delete(&plan.vanity_hostname).await;
            }
            Err(e) => return Err(e),
        }

        Ok(ChangeOutcome::Applied(removed))
    }

    async fn delete_empty_profile(&self, plan: &Plan) -> Result<()> {
        info!(profile_name = %plan.profile_name, "Deleting empty Traffic Manager profile");

        match self
            .client
            .delete_profile(plan.resource_group(), &plan.profile_name)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(profile_name = %plan.profile_name, "Profile already gone: {}", e);
            }
            Err(e) => return Err(e),
        }

        self.mirror.delete(&plan.vanity_hostname).await;
        self.emit_event(EngineEvent::ProfileDeleted {
            resource_group: plan.resource_group().to_string(),
            profile_name: plan.profile_name.clone(),
        });

        if plan.has_distinct_vanity() {
            self.remove_cname(&plan.vanity_hostname).await;
        }

        Ok(())
    }

    async fn remove_cname(&self, vanity_hostname: &str) {
        let name = naming::cname_resource_name(vanity_hostname);
        match self.publisher.delete(&name).await {
            Ok(()) => info!(vanity_hostname, name = %name, "Vanity CNAME removed"),
            Err(e) => warn!(
                vanity_hostname,
                name = %name,
                "Failed to remove vanity CNAME: {}", e
            ),
        }
    }

    /// Apply a change batch from external-dns
    ///
    /// Creates run first, then updates, then deletes. A delete never removes
    /// an endpoint that a create or update of the same batch just wrote.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` when `updateOld` and `updateNew` differ in
    ///   length (nothing is applied)
    /// - the first remote error; earlier items stay applied
    pub async fn apply_changes(&self, changes: &Changes) -> Result<BatchReport> {
        if changes.update_old.len() != changes.update_new.len() {
            return Err(Error::invalid_input(format!(
                "updateOld has {} endpoints but updateNew has {}",
                changes.update_old.len(),
                changes.update_new.len()
            )));
        }

        info!(
            create = changes.create.len(),
            update = changes.update_new.len(),
            delete = changes.delete.len(),
            "Applying changes to Traffic Manager"
        );

        let mut report = BatchReport::default();
        let mut upserted: HashSet<EndpointKey> = HashSet::new();

        for endpoint in &changes.create {
            let outcome = self.create(endpoint).await;
            self.record(&mut report, ChangeKind::Create, endpoint, outcome, &mut upserted)?;
        }

        for (old, new) in changes.update_old.iter().zip(&changes.update_new) {
            let outcome = self.update(old, new).await;
            self.record(&mut report, ChangeKind::Update, new, outcome, &mut upserted)?;
        }

        for endpoint in &changes.delete {
            let outcome = self.delete_protecting(endpoint, &upserted).await;
            let mut ignored = HashSet::new();
            self.record(&mut report, ChangeKind::Delete, endpoint, outcome, &mut ignored)?;
        }

        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Changes applied"
        );
        self.emit_event(EngineEvent::BatchApplied {
            created: report.created,
            updated: report.updated,
            deleted: report.deleted,
            failed: report.failures.len(),
        });

        Ok(report)
    }

    fn record(
        &self,
        report: &mut BatchReport,
        kind: ChangeKind,
        endpoint: &Endpoint,
        outcome: Result<ChangeOutcome>,
        upserted: &mut HashSet<EndpointKey>,
    ) -> Result<()> {
        match outcome {
            Ok(ChangeOutcome::Skipped) => report.skipped += 1,
            Ok(ChangeOutcome::Applied(keys)) => {
                match kind {
                    ChangeKind::Create => report.created += 1,
                    ChangeKind::Update => report.updated += 1,
                    ChangeKind::Delete => report.deleted += 1,
                }
                upserted.extend(keys);
            }
            Err(e) if e.is_config() => {
                warn!(dns_name = %endpoint.dns_name, kind = ?kind, "Rejected endpoint: {}", e);
                report.failures.push(ItemFailure {
                    kind,
                    dns_name: endpoint.dns_name.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                error!(dns_name = %endpoint.dns_name, kind = ?kind, "Failed to apply change: {}", e);
                self.emit_event(EngineEvent::BatchFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        }
        Ok(())
    }

    /// Current vanity CNAME records
    ///
    /// Lists managed profiles in every configured resource group, mirrors
    /// them by their hostname tag, then reports every fresh mirror entry that
    /// passes the domain filter. Mirror entries of a listed group that the
    /// listing no longer contains are dropped; a group whose listing failed
    /// keeps its entries.
    ///
    /// # Errors
    ///
    /// Fails only when every resource group listing failed.
    pub async fn records(&self) -> Result<Vec<Endpoint>> {
        let mut last_error = None;
        let mut failed_groups = 0usize;
        let mut synced = 0usize;

        for resource_group in &self.resource_groups {
            match self.client.list_profiles(resource_group).await {
                Ok(profiles) => {
                    let mut listed = HashSet::new();
                    for profile in profiles.into_iter().filter(ProfileState::is_managed) {
                        let profile = profile.with_hostname_from_tags();
                        if profile.hostname.is_empty() {
                            debug!(profile_name = %profile.profile_name, "Managed profile without hostname tag");
                            continue;
                        }
                        self.mirror.set(&profile.hostname, &profile).await;
                        listed.insert(profile.hostname);
                        synced += 1;
                    }

                    // A successful listing is authoritative for its group
                    let dropped = self.mirror.retain_group(resource_group, &listed).await;
                    if dropped > 0 {
                        info!(resource_group = %resource_group, dropped, "Forgot profiles removed by other writers");
                    }
                }
                Err(e) => {
                    warn!(resource_group = %resource_group, "Failed to list profiles: {}", e);
                    failed_groups += 1;
                    last_error = Some(e);
                }
            }
        }

        if failed_groups == self.resource_groups.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let mut profiles = self.mirror.list_fresh().await;
        profiles.sort_by(|a, b| a.hostname.cmp(&b.hostname));

        let endpoints: Vec<Endpoint> = profiles
            .into_iter()
            .filter(|p| !p.hostname.is_empty() && !p.fqdn.is_empty())
            .filter(|p| {
                let keep = self.domain_filter.matches(&p.hostname);
                if !keep {
                    debug!(hostname = %p.hostname, "Profile hostname does not match domain filter");
                }
                keep
            })
            .map(|p| {
                let mut endpoint = Endpoint::new(p.hostname, RECORD_TYPE_CNAME).with_targets([p.fqdn]);
                endpoint.record_ttl = CNAME_TTL;
                endpoint.labels = HashMap::from([
                    (LABEL_PROFILE.to_string(), p.profile_name),
                    (LABEL_RESOURCE_GROUP.to_string(), p.resource_group),
                    (LABEL_ROUTING_METHOD.to_string(), p.routing_method),
                ]);
                endpoint
            })
            .collect();

        info!(synced, records = endpoints.len(), "Retrieved Traffic Manager records");
        Ok(endpoints)
    }

    /// Pass endpoints through, optionally copying Traffic Manager
    /// properties into labels
    pub fn adjust_endpoints(&self, mut endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        if self.copy_annotations_to_labels {
            for endpoint in &mut endpoints {
                let copied: Vec<_> = endpoint
                    .provider_specific
                    .iter()
                    .filter(|p| p.name.starts_with(annotations::PREFIX))
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect();
                endpoint.labels.extend(copied);
            }
        }

        debug!(count = endpoints.len(), "Adjusted endpoints");
        endpoints
    }

    /// Parse, validate and plan; `None` means the item is not ours
    fn prepare(&self, endpoint: &Endpoint) -> Result<Option<Plan>> {
        if endpoint.is_ownership_record() {
            debug!(dns_name = %endpoint.dns_name, "Skipping ownership record");
            return Ok(None);
        }

        let config = parse_config(&endpoint.annotations()).map_err(|e| self.reject(endpoint, e))?;
        if !config.enabled {
            debug!(dns_name = %endpoint.dns_name, "Traffic Manager not enabled for this endpoint");
            return Ok(None);
        }

        config.validate().map_err(|e| self.reject(endpoint, e))?;
        Plan::build(endpoint, config).map(Some)
    }

    fn reject(&self, endpoint: &Endpoint, err: Error) -> Error {
        self.emit_event(EngineEvent::ConfigRejected {
            dns_name: endpoint.dns_name.clone(),
            reason: err.to_string(),
        });
        err
    }

    /// Create-or-update the profile, adopting it when another writer won
    async fn converge_profile(&self, spec: &ProfileSpec) -> Result<ProfileState> {
        match self.client.create_or_update_profile(spec).await {
            Ok(profile) => {
                info!(
                    profile_name = %spec.profile_name,
                    fqdn = %profile.fqdn,
                    "Traffic Manager profile converged"
                );
                self.emit_event(EngineEvent::ProfileConverged {
                    resource_group: spec.resource_group.clone(),
                    profile_name: spec.profile_name.clone(),
                });
                Ok(profile)
            }
            Err(e) if e.is_conflict() => {
                let existing = self
                    .client
                    .get_profile(&spec.resource_group, &spec.profile_name)
                    .await?;
                info!(
                    profile_name = %existing.profile_name,
                    fqdn = %existing.fqdn,
                    "Profile already exists, using existing profile"
                );
                self.emit_event(EngineEvent::ProfileAdopted {
                    resource_group: spec.resource_group.clone(),
                    profile_name: spec.profile_name.clone(),
                });
                Ok(existing)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-read the profile and mirror it under the vanity hostname
    ///
    /// A failed read only costs a cache miss later, so it is logged.
    async fn refresh(&self, plan: &Plan) -> Option<ProfileState> {
        match self
            .client
            .get_profile(plan.resource_group(), &plan.profile_name)
            .await
        {
            Ok(profile) => Some(self.cache(&plan.vanity_hostname, profile).await),
            Err(e) => {
                warn!(profile_name = %plan.profile_name, "Failed to refresh profile state: {}", e);
                None
            }
        }
    }

    async fn cache(&self, vanity_hostname: &str, mut profile: ProfileState) -> ProfileState {
        profile.hostname = vanity_hostname.to_string();
        self.mirror.set(vanity_hostname, &profile).await;
        profile
    }

    async fn publish_cname(&self, vanity_hostname: &str, fqdn: &str) {
        if fqdn.is_empty() {
            debug!(vanity_hostname, "Profile FQDN unknown, not publishing CNAME");
            return;
        }

        let name = naming::cname_resource_name(vanity_hostname);
        match self
            .publisher
            .publish(&name, vanity_hostname, fqdn, CNAME_TTL)
            .await
        {
            Ok(()) => info!(
                vanity_hostname,
                target = fqdn,
                name = %name,
                publisher = self.publisher.publisher_name(),
                "Vanity CNAME published"
            ),
            Err(e) => {
                error!(
                    vanity_hostname,
                    target = fqdn,
                    "Failed to publish vanity CNAME: {}", e
                );
                self.emit_event(EngineEvent::PublishFailed {
                    hostname: vanity_hostname.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
