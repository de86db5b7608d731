//! Common types for entrywatch: routing policy, record kinds, errors, and the
//! retry and convergence-polling primitives shared by the other crates.

#![deny(missing_docs)]

pub mod error;
pub mod kind;
pub mod namespace;
pub mod poll;
pub mod retry;
pub mod telemetry;

pub use error::Error;
pub use kind::RecordKind;
pub use namespace::{resolve, BackingNamespace, RoutingPolicy, Tenant};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Source namespace used by the reference scenarios
pub const DEFAULT_TENANT: &str = "ns1";

/// Consul namespace every tenant collapses into under the reference
/// fixed-destination scenarios
pub const DEFAULT_FIXED_DESTINATION: &str = "from-k8s";

/// Consul namespace holding global singletons such as proxy-defaults,
/// independent of the routing policy
pub const GLOBAL_NAMESPACE: &str = "default";

/// API group of the source custom resources
pub const SOURCE_API_GROUP: &str = "consul.hashicorp.com";

/// API version of the source custom resources
pub const SOURCE_API_VERSION: &str = "v1alpha1";

/// Field manager used for server-side apply of source objects
pub const FIELD_MANAGER: &str = "entrywatch";
