//! Core traits for the Traffic Manager webhook
//!
//! - [`TrafficManagerClient`]: CRUD against the remote control plane
//! - [`CnamePublisher`]: best-effort vanity CNAME publication

pub mod traffic_manager;
pub mod cname_publisher;

pub use traffic_manager::{
    EndpointSpec, EndpointStatus, EndpointType, MonitorProtocol, ProfileSpec, RoutingMethod,
    TrafficManagerClient, TrafficManagerClientFactory,
};
pub use cname_publisher::{CnamePublisher, CnamePublisherFactory, NoopPublisher};
