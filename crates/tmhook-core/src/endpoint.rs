//! external-dns webhook wire types
//!
//! Field names follow the webhook protocol (camelCase JSON). Only the
//! fields this webhook reads or writes are modelled; unknown fields are
//! ignored on input.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::filter::DomainFilter;

/// Media type of every webhook request and response body
pub const MEDIA_TYPE: &str = "application/external.dns.webhook+json;version=1";

/// Ownership-tracking record type, never routed
pub const RECORD_TYPE_TXT: &str = "TXT";
pub const RECORD_TYPE_A: &str = "A";
pub const RECORD_TYPE_AAAA: &str = "AAAA";
pub const RECORD_TYPE_CNAME: &str = "CNAME";

/// A provider-specific property attached to an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpecific {
    pub name: String,
    pub value: String,
}

/// One DNS endpoint as external-dns understands it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    #[serde(default)]
    pub targets: Vec<String>,
    pub record_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub set_identifier: String,
    #[serde(default, rename = "recordTTL", skip_serializing_if = "is_zero")]
    pub record_ttl: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_specific: Vec<ProviderSpecific>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl Endpoint {
    pub fn new(dns_name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            dns_name: dns_name.into(),
            record_type: record_type.into(),
            ..Self::default()
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_specific.push(ProviderSpecific {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Annotation view of the endpoint
    ///
    /// Labels first, then provider-specific properties, which win on
    /// duplicate keys (external-dns passes service annotations there).
    pub fn annotations(&self) -> HashMap<String, String> {
        let mut merged = self.labels.clone();
        for prop in &self.provider_specific {
            merged.insert(prop.name.clone(), prop.value.clone());
        }
        merged
    }

    /// Ownership-tracking records carry no routing information
    pub fn is_ownership_record(&self) -> bool {
        self.record_type == RECORD_TYPE_TXT
    }

    /// Address records point Traffic Manager at the endpoint's own name
    pub fn is_address_record(&self) -> bool {
        self.record_type == RECORD_TYPE_A || self.record_type == RECORD_TYPE_AAAA
    }
}

/// Payload of `POST /records`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub create: Vec<Endpoint>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub update_old: Vec<Endpoint>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub update_new: Vec<Endpoint>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub delete: Vec<Endpoint>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update_old.is_empty()
            && self.update_new.is_empty()
            && self.delete.is_empty()
    }
}

// external-dns serializes empty Go slices as `null`
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Endpoint>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Endpoint>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response of `GET /`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    pub version: String,
    pub domain_filter: DomainFilter,
}

impl NegotiationResponse {
    pub fn new(domain_filter: DomainFilter) -> Self {
        Self {
            version: "1".to_string(),
            domain_filter,
        }
    }
}
