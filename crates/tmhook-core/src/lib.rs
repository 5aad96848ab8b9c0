// # tmhook-core
//
// Core library for the Traffic Manager webhook of external-dns.
//
// ## Architecture Overview
//
// - **annotations**: parses and validates per-endpoint Traffic Manager settings
// - **naming**: deterministic profile/endpoint/CNAME resource names
// - **StateMirror**: TTL-bounded cache of remote profiles keyed by vanity hostname
// - **TrafficManagerEngine**: converges profiles and endpoints from change batches
// - **TrafficManagerClient**: trait for the remote control plane
// - **CnamePublisher**: trait for best-effort vanity CNAME publication
// - **ProviderRegistry**: plugin-based registry for clients and publishers
//
// ## Design Principles
//
// 1. **Library-First**: the daemon only wires transport and configuration
// 2. **Plugin-Based**: clients and publishers are registered by name
// 3. **Explicit State**: the mirror is an owned instance passed to the engine
// 4. **Idempotency**: every remote write is a create-or-update keyed by name

pub mod annotations;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod filter;
pub mod naming;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use annotations::{TrafficManagerConfig, parse_config};
pub use config::{ClientConfig, EngineConfig, PublisherConfig, WebhookConfig};
pub use endpoint::{Changes, Endpoint, NegotiationResponse, ProviderSpecific};
pub use engine::{BatchReport, ChangeOutcome, EngineEvent, TrafficManagerEngine};
pub use error::{Error, Result};
pub use filter::DomainFilter;
pub use registry::ProviderRegistry;
pub use state::{EndpointState, MirrorStats, ProfileState, StateMirror};
pub use traits::{CnamePublisher, TrafficManagerClient};
