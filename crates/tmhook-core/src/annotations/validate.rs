// Second-pass validation of a parsed `TrafficManagerConfig`.
//
// Every violation is collected and reported in one `Error::Config`, joined
// with "; ", so a user fixing annotations sees all problems at once.

use super::TrafficManagerConfig;
use crate::error::{Error, Result};
use crate::traits::{EndpointStatus, EndpointType, MonitorProtocol, RoutingMethod};

const MIN_WEIGHT: i64 = 1;
const MAX_WEIGHT: i64 = 1000;
const MIN_DNS_TTL: i64 = 30;
const MAX_PORT: i64 = 65535;

impl TrafficManagerConfig {
    /// Check ranges, enums and conditional requirements
    ///
    /// Disabled configs are always valid.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut violations = Vec::new();

        if self.resource_group.is_empty() {
            violations.push("resource group is required".to_string());
        }

        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&self.weight) {
            violations.push(format!(
                "weight must be between {} and {}, got {}",
                MIN_WEIGHT, MAX_WEIGHT, self.weight
            ));
        }

        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&self.priority) {
            violations.push(format!(
                "priority must be between {} and {}, got {}",
                MIN_WEIGHT, MAX_WEIGHT, self.priority
            ));
        }

        let enum_checks = [
            self.routing_method.parse::<RoutingMethod>().err(),
            self.monitor_protocol.parse::<MonitorProtocol>().err(),
            self.endpoint_status.parse::<EndpointStatus>().err(),
            self.endpoint_type.parse::<EndpointType>().err(),
        ];
        violations.extend(enum_checks.into_iter().flatten().map(config_message));

        if self.dns_ttl < MIN_DNS_TTL {
            violations.push(format!(
                "DNS TTL must be at least {} seconds, got {}",
                MIN_DNS_TTL, self.dns_ttl
            ));
        }

        if !(1..=MAX_PORT).contains(&self.monitor_port) {
            violations.push(format!(
                "monitor port must be between 1 and {}, got {}",
                MAX_PORT, self.monitor_port
            ));
        }

        let external = self.endpoint_type.parse::<EndpointType>().ok() == Some(EndpointType::External);
        if external && self.endpoint_location.as_deref().unwrap_or_default().is_empty() {
            violations.push("endpoint location is required for ExternalEndpoints".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::config(violations.join("; ")))
        }
    }
}

/// Strip the variant prefix so aggregated messages read as one sentence
fn config_message(err: Error) -> String {
    match err {
        Error::Config(msg) => msg,
        other => other.to_string(),
    }
}
