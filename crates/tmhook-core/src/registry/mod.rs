//! Plugin-based client and publisher registry
//!
//! Remote clients and CNAME publishers are registered by name at startup so
//! the daemon never hard-codes which implementations exist.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tmhook_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! tmhook_provider_azure::register(&registry);
//! tmhook_dnsendpoint::register(&registry);
//!
//! let client = registry.create_client(&config.client)?;
//! let publisher = registry.create_publisher(&config.publisher)?;
//! ```

use crate::config::{ClientConfig, PublisherConfig};
use crate::error::{Error, Result};
use crate::traits::{
    CnamePublisher, CnamePublisherFactory, NoopPublisher, TrafficManagerClient,
    TrafficManagerClientFactory,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry of client and publisher factories
///
/// Interior mutability with `RwLock` allows concurrent lookups and exclusive
/// registration through a shared reference.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: RwLock<HashMap<String, Box<dyn TrafficManagerClientFactory>>>,
    publishers: RwLock<HashMap<String, Box<dyn CnamePublisherFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a remote client factory under a type name (e.g. "azure")
    pub fn register_client(
        &self,
        name: impl Into<String>,
        factory: Box<dyn TrafficManagerClientFactory>,
    ) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        clients.insert(name.into(), factory);
    }

    /// Register a CNAME publisher factory under a type name
    pub fn register_publisher(
        &self,
        name: impl Into<String>,
        factory: Box<dyn CnamePublisherFactory>,
    ) {
        let mut publishers = self.publishers.write().unwrap_or_else(|e| e.into_inner());
        publishers.insert(name.into(), factory);
    }

    /// Create a remote client from configuration
    ///
    /// # Errors
    ///
    /// `Error::Config` if the client type is not registered, or whatever the
    /// factory returns.
    pub fn create_client(&self, config: &ClientConfig) -> Result<Box<dyn TrafficManagerClient>> {
        let client_type = config.type_name();
        let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());

        let factory = clients
            .get(client_type)
            .ok_or_else(|| Error::config(format!("Unknown client type: {}", client_type)))?;

        factory.create(config)
    }

    /// Create a CNAME publisher from configuration
    ///
    /// `PublisherConfig::Disabled` always yields a [`NoopPublisher`].
    pub fn create_publisher(&self, config: &PublisherConfig) -> Result<Box<dyn CnamePublisher>> {
        if matches!(config, PublisherConfig::Disabled) {
            return Ok(Box::new(NoopPublisher));
        }

        let publisher_type = config.type_name();
        let publishers = self.publishers.read().unwrap_or_else(|e| e.into_inner());

        let factory = publishers.get(publisher_type).ok_or_else(|| {
            Error::config(format!("Unknown publisher type: {}", publisher_type))
        })?;

        factory.create(config)
    }

    /// List all registered client types
    pub fn list_clients(&self) -> Vec<String> {
        let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
        clients.keys().cloned().collect()
    }

    /// List all registered publisher types
    pub fn list_publishers(&self) -> Vec<String> {
        let publishers = self.publishers.read().unwrap_or_else(|e| e.into_inner());
        publishers.keys().cloned().collect()
    }

    /// Check if a client type is registered
    pub fn has_client(&self, name: &str) -> bool {
        let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
        clients.contains_key(name)
    }

    /// Check if a publisher type is registered
    pub fn has_publisher(&self, name: &str) -> bool {
        let publishers = self.publishers.read().unwrap_or_else(|e| e.into_inner());
        publishers.contains_key(name)
    }
}
