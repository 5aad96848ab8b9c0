// # Azure Traffic Manager Client
//
// `TrafficManagerClient` implementation over the Azure Resource Manager REST
// API (`Microsoft.Network/trafficmanagerprofiles`, api-version 2022-04-01).
//
// ## Behavior
//
// - One HTTP request per trait call (plus paging for list, plus a token
//   request when the cached token is about to expire)
// - Status codes are classified onto `tmhook_core::Error` so the engine can
//   tell conflicts and missing resources from real failures
// - HTTP timeout of 30 seconds on every request
// - No retry or backoff: external-dns re-sends the batch on failure
//
// ## Security
//
// - Tokens and client secrets never appear in logs or `Debug` output
//
// ## API Reference
//
// - Profiles: `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Network/trafficmanagerprofiles/{name}`
// - Endpoints: `.../trafficmanagerprofiles/{name}/{ExternalEndpoints|AzureEndpoints|NestedEndpoints}/{endpoint}`

mod auth;
mod model;

pub use auth::Credential;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tmhook_core::config::ClientConfig;
use tmhook_core::state::{EndpointState, ProfileState};
use tmhook_core::traits::{
    EndpointSpec, EndpointType, ProfileSpec, TrafficManagerClient, TrafficManagerClientFactory,
};
use tmhook_core::{Error, Result};

use auth::TokenSource;
use model::{ArmEndpoint, ArmProfile, ProfileList};

/// Azure Resource Manager endpoint
pub const ARM_BASE_URL: &str = "https://management.azure.com";

/// Traffic Manager API version
pub const API_VERSION: &str = "2022-04-01";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "azure";

/// Azure Traffic Manager client
pub struct AzureTrafficManager {
    subscription_id: String,
    base_url: String,
    tokens: TokenSource,
    http: reqwest::Client,
}

// Credentials live in `TokenSource`, which is not printed
impl std::fmt::Debug for AzureTrafficManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureTrafficManager")
            .field("subscription_id", &self.subscription_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AzureTrafficManager {
    /// Create a client against the public Azure cloud
    ///
    /// # Errors
    ///
    /// `Error::Config` when the subscription is empty, `Error::Http` when the
    /// HTTP client cannot be built.
    pub fn new(subscription_id: impl Into<String>, credential: Credential) -> Result<Self> {
        Self::with_endpoints(
            subscription_id,
            credential,
            ARM_BASE_URL,
            auth::DEFAULT_AUTHORITY,
        )
    }

    /// Create a client against custom ARM and login endpoints
    /// (sovereign clouds, local test servers)
    pub fn with_endpoints(
        subscription_id: impl Into<String>,
        credential: Credential,
        base_url: impl Into<String>,
        authority: impl Into<String>,
    ) -> Result<Self> {
        let subscription_id = subscription_id.into();
        if subscription_id.is_empty() {
            return Err(Error::config("Azure subscription ID cannot be empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            subscription_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: TokenSource::new(credential, authority, http.clone()),
            http,
        })
    }

    fn profiles_url(&self, resource_group: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/trafficmanagerprofiles",
            self.base_url, self.subscription_id, resource_group
        )
    }

    fn profile_url(&self, resource_group: &str, profile_name: &str) -> String {
        format!("{}/{}", self.profiles_url(resource_group), profile_name)
    }

    fn endpoint_url(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: EndpointType,
        endpoint_name: &str,
    ) -> String {
        format!(
            "{}/{}/{}",
            self.profile_url(resource_group, profile_name),
            endpoint_type.as_str(),
            endpoint_name
        )
    }

    /// Send one request; `url` without query gets the api-version appended
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        what: &str,
    ) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;

        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        if !url.contains('?') {
            request = request.query(&[("api-version", API_VERSION)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(method = %method, what, "ARM request");

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(map_status(status, what, &body))
    }

    async fn send_json<B, T>(&self, method: Method, url: &str, body: Option<&B>, what: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(method, url, body, what)
            .await?
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("failed to parse {} response: {}", what, e)))
    }
}

/// Classify a non-success ARM response
pub fn map_status(status: StatusCode, what: &str, body: &str) -> Error {
    let detail = arm_error_message(body);
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: authentication failed or insufficient permissions ({}): {}",
            what, status, detail
        )),
        404 => Error::not_found(format!("{}: {}", what, detail)),
        409 | 412 => Error::conflict(format!("{}: {}", what, detail)),
        429 => Error::rate_limited(format!("{}: throttled by ARM ({})", what, status)),
        500..=599 => Error::provider(
            PROVIDER,
            format!("{}: server error (transient): {} - {}", what, status, detail),
        ),
        _ => Error::provider(PROVIDER, format!("{} failed: {} - {}", what, status, detail)),
    }
}

/// `error.code: error.message` of an ARM error body, or the raw body
fn arm_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            let message = error.get("message")?.as_str()?;
            Some(match error.get("code").and_then(|c| c.as_str()) {
                Some(code) => format!("{}: {}", code, message),
                None => message.to_string(),
            })
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl TrafficManagerClient for AzureTrafficManager {
    async fn get_profile(&self, resource_group: &str, profile_name: &str) -> Result<ProfileState> {
        tracing::debug!(profile_name, resource_group, "Getting Traffic Manager profile");

        let profile: ArmProfile = self
            .send_json::<(), _>(
                Method::GET,
                &self.profile_url(resource_group, profile_name),
                None,
                "get profile",
            )
            .await?;
        Ok(profile.into_state(resource_group))
    }

    async fn create_or_update_profile(&self, spec: &ProfileSpec) -> Result<ProfileState> {
        tracing::info!(
            profile_name = %spec.profile_name,
            resource_group = %spec.resource_group,
            routing_method = %spec.routing_method,
            dns_ttl = spec.dns_ttl,
            "Creating or updating Traffic Manager profile"
        );

        let body = ArmProfile::from_spec(spec);
        let profile: ArmProfile = self
            .send_json(
                Method::PUT,
                &self.profile_url(&spec.resource_group, &spec.profile_name),
                Some(&body),
                "create profile",
            )
            .await?;
        Ok(profile.into_state(&spec.resource_group))
    }

    async fn delete_profile(&self, resource_group: &str, profile_name: &str) -> Result<()> {
        tracing::info!(profile_name, resource_group, "Deleting Traffic Manager profile");

        self.send::<()>(
            Method::DELETE,
            &self.profile_url(resource_group, profile_name),
            None,
            "delete profile",
        )
        .await?;
        Ok(())
    }

    async fn list_profiles(&self, resource_group: &str) -> Result<Vec<ProfileState>> {
        let mut profiles = Vec::new();
        let mut next = Some(self.profiles_url(resource_group));

        while let Some(url) = next {
            let page: ProfileList = self
                .send_json::<(), _>(Method::GET, &url, None, "list profiles")
                .await?;
            profiles.extend(page.value.into_iter().map(|p| p.into_state(resource_group)));
            next = page.next_link.filter(|link| !link.is_empty());
        }

        tracing::debug!(resource_group, count = profiles.len(), "Listed Traffic Manager profiles");
        Ok(profiles)
    }

    async fn get_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: EndpointType,
        endpoint_name: &str,
    ) -> Result<EndpointState> {
        let endpoint: ArmEndpoint = self
            .send_json::<(), _>(
                Method::GET,
                &self.endpoint_url(resource_group, profile_name, endpoint_type, endpoint_name),
                None,
                "get endpoint",
            )
            .await?;
        endpoint
            .into_state()
            .ok_or_else(|| Error::provider(PROVIDER, "endpoint response has no name"))
    }

    async fn create_or_update_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        spec: &EndpointSpec,
    ) -> Result<EndpointState> {
        tracing::info!(
            profile_name,
            endpoint_name = %spec.endpoint_name,
            target = %spec.target,
            weight = spec.weight,
            "Creating or updating Traffic Manager endpoint"
        );

        let body = ArmEndpoint::from_spec(spec);
        let endpoint: ArmEndpoint = self
            .send_json(
                Method::PUT,
                &self.endpoint_url(resource_group, profile_name, spec.endpoint_type, &spec.endpoint_name),
                Some(&body),
                "create endpoint",
            )
            .await?;
        endpoint
            .into_state()
            .ok_or_else(|| Error::provider(PROVIDER, "endpoint response has no name"))
    }

    async fn delete_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: EndpointType,
        endpoint_name: &str,
    ) -> Result<()> {
        tracing::info!(profile_name, endpoint_name, "Deleting Traffic Manager endpoint");

        self.send::<()>(
            Method::DELETE,
            &self.endpoint_url(resource_group, profile_name, endpoint_type, endpoint_name),
            None,
            "delete endpoint",
        )
        .await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for Azure Traffic Manager clients
pub struct AzureClientFactory;

impl TrafficManagerClientFactory for AzureClientFactory {
    fn create(&self, config: &ClientConfig) -> Result<Box<dyn TrafficManagerClient>> {
        config.validate()?;

        match config {
            ClientConfig::Azure {
                subscription_id,
                tenant_id,
                client_id,
                client_secret,
                access_token,
            } => {
                let credential = match access_token.as_deref().filter(|t| !t.is_empty()) {
                    Some(token) => {
                        tracing::info!("Using pre-issued Azure access token");
                        Credential::Static(token.to_string())
                    }
                    None => Credential::ClientSecret {
                        tenant_id: tenant_id.clone().unwrap_or_default(),
                        client_id: client_id.clone().unwrap_or_default(),
                        client_secret: client_secret.clone().unwrap_or_default(),
                    },
                };

                Ok(Box::new(AzureTrafficManager::new(subscription_id.clone(), credential)?))
            }
            _ => Err(Error::config("Invalid config for Azure Traffic Manager client")),
        }
    }
}

/// Register the Azure client with a registry under `"azure"`
///
/// # Example
///
/// ```rust
/// use tmhook_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// tmhook_provider_azure::register(&registry);
/// assert!(registry.has_client("azure"));
/// ```
pub fn register(registry: &tmhook_core::ProviderRegistry) {
    registry.register_client(PROVIDER, Box::new(AzureClientFactory));
}
