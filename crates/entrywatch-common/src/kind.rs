//! Record kinds written into the config-entry store by the reconciler
//!
//! Every kind exists twice: as a Consul config entry (`service-defaults`) and
//! as the Kubernetes custom resource that produces it (`ServiceDefaults`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Category of derived record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    /// Protocol and upstream defaults for one service
    ServiceDefaults,
    /// Subset, redirect and failover rules for one service
    ServiceResolver,
    /// Global proxy configuration (singleton named `global`)
    ProxyDefaults,
    /// L7 routing rules for one service
    ServiceRouter,
    /// Weighted traffic split for one service
    ServiceSplitter,
    /// Allow/deny rules towards one destination service
    ServiceIntentions,
}

impl RecordKind {
    /// All kinds, in the order the scenarios create them
    pub const ALL: [RecordKind; 6] = [
        RecordKind::ServiceDefaults,
        RecordKind::ServiceResolver,
        RecordKind::ProxyDefaults,
        RecordKind::ServiceRouter,
        RecordKind::ServiceSplitter,
        RecordKind::ServiceIntentions,
    ];

    /// Kind string used by the config-entry API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceDefaults => "service-defaults",
            Self::ServiceResolver => "service-resolver",
            Self::ProxyDefaults => "proxy-defaults",
            Self::ServiceRouter => "service-router",
            Self::ServiceSplitter => "service-splitter",
            Self::ServiceIntentions => "service-intentions",
        }
    }

    /// Kind of the custom resource that produces this record
    pub fn source_kind(&self) -> &'static str {
        match self {
            Self::ServiceDefaults => "ServiceDefaults",
            Self::ServiceResolver => "ServiceResolver",
            Self::ProxyDefaults => "ProxyDefaults",
            Self::ServiceRouter => "ServiceRouter",
            Self::ServiceSplitter => "ServiceSplitter",
            Self::ServiceIntentions => "ServiceIntentions",
        }
    }

    /// Lowercase plural of the custom resource, as used in API paths
    pub fn source_plural(&self) -> &'static str {
        match self {
            Self::ServiceDefaults => "servicedefaults",
            Self::ServiceResolver => "serviceresolvers",
            Self::ProxyDefaults => "proxydefaults",
            Self::ServiceRouter => "servicerouters",
            Self::ServiceSplitter => "servicesplitters",
            Self::ServiceIntentions => "serviceintentions",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    /// Accepts either the config-entry kind (`service-router`) or the
    /// custom resource kind in any case (`ServiceRouter`, `servicerouter`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.source_kind().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::validation(format!("unknown record kind: {s}")))
    }
}
