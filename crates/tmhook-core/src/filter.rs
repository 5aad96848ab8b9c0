//! Domain filter
//!
//! Decides which vanity hostnames this webhook reports to external-dns.
//! The same filter is advertised during negotiation.

use serde::{Deserialize, Serialize};

/// Include/exclude domain lists
///
/// An empty include list matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl DomainFilter {
    pub fn new(include: Vec<String>) -> Self {
        Self {
            include,
            exclude: Vec::new(),
        }
    }

    /// Parse a comma-separated list (`example.com, *.example.org`)
    pub fn from_csv(value: &str) -> Self {
        Self::new(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Check a hostname against the filter
    pub fn matches(&self, hostname: &str) -> bool {
        if self.exclude.iter().any(|f| matches_domain(hostname, f)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|f| matches_domain(hostname, f))
    }
}

/// Exact match, subdomain match, or `*.` wildcard match
///
/// `example.com` matches `app.example.com` but never `notexample.com`;
/// `*.example.com` matches the bare domain as well. Comparison ignores case
/// and a trailing root dot on either side.
pub fn matches_domain(hostname: &str, filter: &str) -> bool {
    let hostname = normalize(hostname);
    let filter = normalize(filter);
    let filter = filter.strip_prefix("*.").unwrap_or(&filter);
    if filter.is_empty() {
        return false;
    }

    hostname == filter
        || hostname
            .strip_suffix(filter)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn normalize(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase()
}
