// # CNAME Publisher Trait
//
// When a profile is reached through a vanity hostname, something has to
// publish `vanity → profile FQDN`. The engine hands that to a publisher and
// never lets its outcome affect reconciliation.
//
// ## Implementations
//
// - DNSEndpoint custom resources: `tmhook-dnsendpoint` crate
// - [`NoopPublisher`]: out-of-cluster runs

use async_trait::async_trait;

/// Trait for best-effort CNAME publication
///
/// Errors returned here are logged by the engine and otherwise ignored.
#[async_trait]
pub trait CnamePublisher: Send + Sync {
    /// Create or replace the CNAME `hostname → target` under `name`
    async fn publish(
        &self,
        name: &str,
        hostname: &str,
        target: &str,
        ttl: i64,
    ) -> Result<(), crate::Error>;

    /// Remove the CNAME stored under `name`
    async fn delete(&self, name: &str) -> Result<(), crate::Error>;

    /// Publisher name for logging
    fn publisher_name(&self) -> &'static str;
}

/// Publisher that only logs what it would have done
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl CnamePublisher for NoopPublisher {
    async fn publish(
        &self,
        name: &str,
        hostname: &str,
        target: &str,
        ttl: i64,
    ) -> Result<(), crate::Error> {
        tracing::debug!(name, hostname, target, ttl, "CNAME publishing disabled, skipping");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), crate::Error> {
        tracing::debug!(name, "CNAME publishing disabled, skipping delete");
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "noop"
    }
}

/// Helper trait for constructing publishers from configuration
pub trait CnamePublisherFactory: Send + Sync {
    fn create(
        &self,
        config: &crate::config::PublisherConfig,
    ) -> Result<Box<dyn CnamePublisher>, crate::Error>;
}
