// Resolution of one external-dns endpoint into the remote resources it maps
// to. Create, update and delete all go through `Plan::build`, so they agree
// on the vanity hostname, the profile name and every endpoint name.

use crate::annotations::TrafficManagerConfig;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::naming;
use crate::traits::EndpointSpec;

/// Identity of a remote endpoint: (resource group, profile, endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub resource_group: String,
    pub profile_name: String,
    pub endpoint_name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub config: TrafficManagerConfig,
    pub dns_name: String,
    pub vanity_hostname: String,
    pub profile_name: String,
    pub endpoints: Vec<EndpointSpec>,
}

impl Plan {
    /// Resolve names and endpoint specs for a validated, enabled config
    pub fn build(endpoint: &Endpoint, config: TrafficManagerConfig) -> Result<Self> {
        let dns_name = endpoint.dns_name.clone();
        let vanity_hostname = config.vanity_hostname(&dns_name).to_string();
        let profile_name = config.resolved_profile_name(&dns_name);

        let targets = plan_targets(endpoint);
        let base = match &config.endpoint_name {
            Some(name) => name.clone(),
            None => naming::generate_endpoint_name(&dns_name, &targets),
        };

        let endpoints = naming::disambiguate(&base, targets.len())
            .into_iter()
            .zip(&targets)
            .map(|(name, target)| config.endpoint_spec(&name, target))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            dns_name,
            vanity_hostname,
            profile_name,
            endpoints,
        })
    }

    pub fn resource_group(&self) -> &str {
        &self.config.resource_group
    }

    /// Same remote profile under the same vanity hostname
    pub fn same_profile(&self, other: &Plan) -> bool {
        self.config.resource_group == other.config.resource_group
            && self.profile_name == other.profile_name
            && self.vanity_hostname == other.vanity_hostname
    }

    /// Whether a CNAME must be published for the vanity hostname
    pub fn has_distinct_vanity(&self) -> bool {
        self.vanity_hostname != self.dns_name
    }

    pub fn key(&self, endpoint_name: &str) -> EndpointKey {
        EndpointKey {
            resource_group: self.config.resource_group.clone(),
            profile_name: self.profile_name.clone(),
            endpoint_name: endpoint_name.to_string(),
        }
    }

    pub fn keys(&self) -> Vec<EndpointKey> {
        self.endpoints
            .iter()
            .map(|spec| self.key(&spec.endpoint_name))
            .collect()
    }
}

/// Concrete targets Traffic Manager should route to
///
/// Address records are resolved by Traffic Manager through the endpoint's
/// own DNS name; other record types use their targets.
fn plan_targets(endpoint: &Endpoint) -> Vec<String> {
    if endpoint.is_address_record() || endpoint.targets.is_empty() {
        vec![endpoint.dns_name.clone()]
    } else {
        endpoint.targets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::parse_config;

    fn enabled(endpoint: Endpoint) -> Endpoint {
        endpoint
            .with_property("webhook/traffic-manager-enabled", "true")
            .with_property("webhook/traffic-manager-resource-group", "rg")
            .with_property("webhook/traffic-manager-endpoint-location", "eastus")
    }

    fn plan(endpoint: &Endpoint) -> Plan {
        let config = parse_config(&endpoint.annotations()).unwrap();
        Plan::build(endpoint, config).unwrap()
    }

    #[test]
    fn test_address_record_targets_own_name() {
        let endpoint = enabled(
            Endpoint::new("demo-east.example.com", "A").with_targets(["20.1.2.3", "20.1.2.4"]),
        );
        let plan = plan(&endpoint);

        assert_eq!(plan.endpoints.len(), 1);
        assert_eq!(plan.endpoints[0].target, "demo-east.example.com");
        assert_eq!(plan.endpoints[0].endpoint_name, "demo-east-example-com");
        assert_eq!(plan.profile_name, "demo-east-example-com-tm");
        assert!(!plan.has_distinct_vanity());
    }

    #[test]
    fn test_multiple_targets_are_disambiguated() {
        let endpoint = enabled(
            Endpoint::new("app.example.com", "CNAME")
                .with_targets(["east.example.net", "west.example.net"]),
        )
        .with_property("webhook/traffic-manager-endpoint-name", "app");
        let plan = plan(&endpoint);

        let names: Vec<_> = plan.endpoints.iter().map(|e| e.endpoint_name.as_str()).collect();
        assert_eq!(names, vec!["app-0", "app-1"]);
        assert_eq!(plan.endpoints[1].target, "west.example.net");
    }

    #[test]
    fn test_vanity_hostname_drives_profile_name() {
        let endpoint = enabled(Endpoint::new("demo-east.example.com", "A"))
            .with_property("webhook/traffic-manager-hostname", "demo.example.com");
        let plan = plan(&endpoint);

        assert_eq!(plan.vanity_hostname, "demo.example.com");
        assert_eq!(plan.profile_name, "demo-example-com-tm");
        assert!(plan.has_distinct_vanity());
        assert_eq!(
            plan.keys(),
            vec![EndpointKey {
                resource_group: "rg".to_string(),
                profile_name: "demo-example-com-tm".to_string(),
                endpoint_name: "demo-east-example-com".to_string(),
            }]
        );
    }

    #[test]
    fn test_same_profile_compares_identity_only() {
        let base = enabled(Endpoint::new("demo.example.com", "A"));
        let reweighted = base.clone().with_property("webhook/traffic-manager-weight", "5");
        let renamed = base
            .clone()
            .with_property("webhook/traffic-manager-profile-name", "other-tm");
        let rehosted = base
            .clone()
            .with_property("webhook/traffic-manager-hostname", "www.example.com");

        assert!(plan(&base).same_profile(&plan(&reweighted)));
        assert!(!plan(&base).same_profile(&plan(&renamed)));
        assert!(!plan(&base).same_profile(&plan(&rehosted)));
    }
}
