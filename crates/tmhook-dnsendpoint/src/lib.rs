// # DNSEndpoint CNAME Publisher
//
// Publishes vanity CNAMEs as external-dns `DNSEndpoint` custom resources
// (`externaldns.k8s.io/v1alpha1`), which the in-cluster external-dns then
// writes to the real DNS zone.
//
// ## Behavior
//
// - Talks to the API server directly over REST with the pod's service
//   account (token and CA under `/var/run/secrets/kubernetes.io/serviceaccount`)
// - Publish is get-then-replace: an existing resource is replaced with its
//   `resourceVersion`, a missing one is created
// - Delete of a missing resource succeeds
// - Every resource carries `app.kubernetes.io/managed-by`
//
// The engine treats every error from here as best effort.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tmhook_core::config::PublisherConfig;
use tmhook_core::traits::{CnamePublisher, CnamePublisherFactory};
use tmhook_core::{Error, ProviderRegistry, Result};

pub const API_GROUP: &str = "externaldns.k8s.io";
pub const API_VERSION: &str = "v1alpha1";
pub const KIND: &str = "DNSEndpoint";
pub const RESOURCE: &str = "dnsendpoints";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "external-dns-traffic-manager-webhook";

/// Mounted service account directory
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const PUBLISHER: &str = "dns_endpoint";

/// Bearer token for the API server
#[derive(Clone)]
pub enum ServiceAccountToken {
    /// Re-read on every request; the kubelet rotates projected tokens
    File(PathBuf),
    Static(String),
}

impl std::fmt::Debug for ServiceAccountToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceAccountToken::File(path) => f.debug_tuple("File").field(path).finish(),
            ServiceAccountToken::Static(_) => f.debug_tuple("Static").field(&"<REDACTED>").finish(),
        }
    }
}

impl ServiceAccountToken {
    async fn read(&self) -> Result<String> {
        match self {
            ServiceAccountToken::Static(token) => Ok(token.clone()),
            ServiceAccountToken::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|t| t.trim().to_string())
                .map_err(|e| {
                    Error::auth(format!(
                        "failed to read service account token {}: {}",
                        path.display(),
                        e
                    ))
                }),
        }
    }
}

/// Publisher writing `DNSEndpoint` resources into one namespace
#[derive(Debug)]
pub struct DnsEndpointPublisher {
    api_server: String,
    namespace: String,
    token: ServiceAccountToken,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ExistingResource {
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default)]
    resource_version: Option<String>,
}

impl DnsEndpointPublisher {
    /// Publisher for the API server this pod runs under
    ///
    /// # Errors
    ///
    /// `Error::Config` outside a cluster (no `KUBERNETES_SERVICE_HOST`) or
    /// when the service account CA cannot be read.
    pub fn in_cluster(namespace: impl Into<String>) -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            Error::config("KUBERNETES_SERVICE_HOST is not set; not running in a cluster")
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        let dir = PathBuf::from(SERVICE_ACCOUNT_DIR);
        let ca = std::fs::read(dir.join("ca.crt"))
            .map_err(|e| Error::config(format!("failed to read service account CA: {}", e)))?;
        let ca = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| Error::config(format!("invalid service account CA: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .add_root_certificate(ca)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_api_server(
            format!("https://{}", host_port(&host, &port)),
            namespace,
            ServiceAccountToken::File(dir.join("token")),
            http,
        ))
    }

    /// Publisher for an explicit API server
    pub fn with_api_server(
        api_server: impl Into<String>,
        namespace: impl Into<String>,
        token: ServiceAccountToken,
        http: reqwest::Client,
    ) -> Self {
        Self {
            api_server: api_server.into().trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            token,
            http,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/apis/{}/{}/namespaces/{}/{}",
            self.api_server, API_GROUP, API_VERSION, self.namespace, RESOURCE
        )
    }

    fn resource_url(&self, name: &str) -> String {
        format!("{}/{}", self.collection_url(), name)
    }

    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<reqwest::Response> {
        let token = self.token.read().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| Error::http(format!("API server request failed: {}", e)))
    }
}

/// IPv6 hosts need brackets in a URL authority
fn host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// The `DNSEndpoint` manifest for one CNAME
pub fn manifest(
    name: &str,
    namespace: &str,
    hostname: &str,
    target: &str,
    ttl: i64,
    resource_version: Option<&str>,
) -> Value {
    let mut metadata = json!({
        "name": name,
        "namespace": namespace,
        "labels": { MANAGED_BY_LABEL: MANAGED_BY_VALUE },
    });
    if let Some(version) = resource_version {
        metadata["resourceVersion"] = json!(version);
    }

    json!({
        "apiVersion": format!("{}/{}", API_GROUP, API_VERSION),
        "kind": KIND,
        "metadata": metadata,
        "spec": {
            "endpoints": [{
                "dnsName": hostname,
                "recordTTL": ttl,
                "recordType": "CNAME",
                "targets": [target],
            }]
        }
    })
}

/// Classify a non-success API server response
fn map_status(status: StatusCode, what: &str, body: &str) -> Error {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        401 | 403 => Error::auth(format!("{}: {} ({})", what, detail, status)),
        404 => Error::not_found(format!("{}: {}", what, detail)),
        409 => Error::conflict(format!("{}: {}", what, detail)),
        429 => Error::rate_limited(format!("{}: throttled ({})", what, status)),
        _ => Error::provider(PUBLISHER, format!("{} failed: {} - {}", what, status, detail)),
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}

#[async_trait]
impl CnamePublisher for DnsEndpointPublisher {
    async fn publish(&self, name: &str, hostname: &str, target: &str, ttl: i64) -> Result<()> {
        tracing::info!(name, hostname, target, namespace = %self.namespace, "Publishing DNSEndpoint CNAME");

        let url = self.resource_url(name);
        let existing = self.send(Method::GET, &url, None).await?;

        let response = match existing.status() {
            status if status.is_success() => {
                let current: ExistingResource = existing.json().await.map_err(|e| {
                    Error::provider(PUBLISHER, format!("failed to parse DNSEndpoint: {}", e))
                })?;
                let version = current.metadata.resource_version;
                tracing::debug!(name, resource_version = ?version, "Replacing existing DNSEndpoint");

                let body = manifest(name, &self.namespace, hostname, target, ttl, version.as_deref());
                self.send(Method::PUT, &url, Some(&body)).await?
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!(name, "Creating new DNSEndpoint");
                let body = manifest(name, &self.namespace, hostname, target, ttl, None);
                self.send(Method::POST, &self.collection_url(), Some(&body))
                    .await?
            }
            status => {
                return Err(map_status(status, "get DNSEndpoint", &error_body(existing).await));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "write DNSEndpoint", &error_body(response).await));
        }

        tracing::info!(name, hostname, "DNSEndpoint published");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        tracing::info!(name, namespace = %self.namespace, "Deleting DNSEndpoint");

        let response = self.send(Method::DELETE, &self.resource_url(name), None).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(name, "DNSEndpoint already gone");
                Ok(())
            }
            status => Err(map_status(status, "delete DNSEndpoint", &error_body(response).await)),
        }
    }

    fn publisher_name(&self) -> &'static str {
        PUBLISHER
    }
}

/// Factory for DNSEndpoint publishers
pub struct DnsEndpointFactory;

impl CnamePublisherFactory for DnsEndpointFactory {
    fn create(&self, config: &PublisherConfig) -> Result<Box<dyn CnamePublisher>> {
        match config {
            PublisherConfig::DnsEndpoint { namespace } => {
                config.validate()?;
                Ok(Box::new(DnsEndpointPublisher::in_cluster(namespace.clone())?))
            }
            _ => Err(Error::config("Invalid config for DNSEndpoint publisher")),
        }
    }
}

/// Register the DNSEndpoint publisher with a registry under `"dns_endpoint"`
pub fn register(registry: &ProviderRegistry) {
    registry.register_publisher(PUBLISHER, Box::new(DnsEndpointFactory));
}
