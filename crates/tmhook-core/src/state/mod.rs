// # State
//
// Profile/endpoint state types and the TTL-bounded mirror that caches them.

pub mod mirror;
pub mod profile;

pub use mirror::{MirrorStats, StateMirror};
pub use profile::{EndpointState, ProfileState, HOSTNAME_TAG, MANAGED_BY_TAG, MANAGED_BY_VALUE};
