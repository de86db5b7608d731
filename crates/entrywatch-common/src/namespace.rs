//! Tenant to backing-namespace routing
//!
//! A tenant is a Kubernetes namespace holding source custom resources. The
//! reconciler writes the derived config entries into a Consul namespace chosen
//! by the active [`RoutingPolicy`]. Scenarios resolve the policy once at setup
//! and carry the resulting [`BackingNamespace`] for their whole run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source-side namespace whose resources are reconciled into the store
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenant(String);

impl Tenant {
    /// Create a tenant identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tenant name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tenant {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Target-side namespace in the config-entry store
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackingNamespace(String);

impl BackingNamespace {
    /// Create a backing namespace identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The namespace name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackingNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackingNamespace {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Rule mapping tenants to backing namespaces
///
/// Deserializes from `{ mode: mirror }` or
/// `{ mode: fixed, destination: from-k8s }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// One backing namespace per tenant, with the tenant's name
    #[default]
    Mirror,
    /// Every tenant collapses into one configured backing namespace
    #[serde(rename = "fixed")]
    FixedDestination {
        /// The single destination namespace
        destination: BackingNamespace,
    },
}

impl RoutingPolicy {
    /// Fixed-destination policy targeting `destination`
    pub fn fixed(destination: impl Into<String>) -> Self {
        Self::FixedDestination {
            destination: BackingNamespace::new(destination),
        }
    }

    /// Backing namespace holding records derived from `tenant`
    pub fn resolve(&self, tenant: &Tenant) -> BackingNamespace {
        match self {
            Self::Mirror => BackingNamespace::new(tenant.as_str()),
            Self::FixedDestination { destination } => destination.clone(),
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mirror => f.write_str("mirror"),
            Self::FixedDestination { destination } => write!(f, "fixed({destination})"),
        }
    }
}

/// Resolve the backing namespace for `tenant` under `policy`
pub fn resolve(tenant: &Tenant, policy: &RoutingPolicy) -> BackingNamespace {
    policy.resolve(tenant)
}
