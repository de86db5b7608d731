//! Source custom resources driven through the reconciler
//!
//! One object per record kind, plus the merge patch applied to each during
//! the update phase. The values here are mirrored by the expectation tables
//! in [`crate::expectation`].

use entrywatch_common::{RecordKind, Tenant, SOURCE_API_GROUP, SOURCE_API_VERSION};
use serde_json::{json, Value};

/// Destination service of the intentions fixture. Consul names the
/// service-intentions entry after it, not after the custom resource.
pub const INTENTION_DESTINATION: &str = "svc1";

/// A custom resource the scenario creates in the tenant namespace
#[derive(Clone, Debug, PartialEq)]
pub struct SourceObject {
    /// Kind of record this object produces
    pub kind: RecordKind,
    /// Custom resource name
    pub name: &'static str,
    /// `spec` of the custom resource
    pub spec: Value,
}

impl SourceObject {
    /// Full manifest of this object in `tenant`
    pub fn manifest(&self, tenant: &Tenant) -> Value {
        json!({
            "apiVersion": format!("{}/{}", SOURCE_API_GROUP, SOURCE_API_VERSION),
            "kind": self.kind.source_kind(),
            "metadata": {
                "name": self.name,
                "namespace": tenant.as_str(),
            },
            "spec": self.spec,
        })
    }
}

/// Merge patch for one custom resource
#[derive(Clone, Debug, PartialEq)]
pub struct SourcePatch {
    /// Kind of record the patched object produces
    pub kind: RecordKind,
    /// Custom resource name
    pub name: &'static str,
    /// JSON merge patch document
    pub patch: Value,
}

/// Custom resource name of the fixture for `kind`
pub fn object_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::ServiceDefaults => "defaults",
        RecordKind::ServiceResolver => "resolver",
        RecordKind::ProxyDefaults => "global",
        RecordKind::ServiceRouter => "router",
        RecordKind::ServiceSplitter => "splitter",
        RecordKind::ServiceIntentions => "intentions",
    }
}

/// Config entry name produced by the fixture for `kind`
pub fn record_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::ServiceIntentions => INTENTION_DESTINATION,
        other => object_name(other),
    }
}

/// The six objects created at the start of every scenario
pub fn source_objects() -> Vec<SourceObject> {
    RecordKind::ALL
        .into_iter()
        .map(|kind| SourceObject {
            kind,
            name: object_name(kind),
            spec: creation_spec(kind),
        })
        .collect()
}

/// The six merge patches applied during the update phase
pub fn source_patches() -> Vec<SourcePatch> {
    RecordKind::ALL
        .into_iter()
        .map(|kind| SourcePatch {
            kind,
            name: object_name(kind),
            patch: json!({ "spec": update_spec(kind) }),
        })
        .collect()
}

fn creation_spec(kind: RecordKind) -> Value {
    match kind {
        RecordKind::ServiceDefaults => json!({ "protocol": "http" }),
        RecordKind::ServiceResolver => json!({ "redirect": { "service": "bar" } }),
        RecordKind::ProxyDefaults => json!({ "meshGateway": { "mode": "local" } }),
        RecordKind::ServiceRouter => json!({
            "routes": [{ "match": { "http": { "pathPrefix": "/foo" } } }]
        }),
        RecordKind::ServiceSplitter => json!({ "splits": [{ "weight": 100 }] }),
        RecordKind::ServiceIntentions => json!({
            "destination": { "name": INTENTION_DESTINATION },
            "sources": [{ "name": "svc2", "action": "allow" }]
        }),
    }
}

fn update_spec(kind: RecordKind) -> Value {
    match kind {
        RecordKind::ServiceDefaults => json!({ "protocol": "tcp" }),
        RecordKind::ServiceResolver => json!({ "redirect": { "service": "baz" } }),
        RecordKind::ProxyDefaults => json!({ "meshGateway": { "mode": "remote" } }),
        RecordKind::ServiceRouter => json!({
            "routes": [{ "match": { "http": { "pathPrefix": "/baz" } } }]
        }),
        RecordKind::ServiceSplitter => json!({
            "splits": [{ "weight": 50 }, { "weight": 50, "service": "other-splitter" }]
        }),
        RecordKind::ServiceIntentions => json!({
            "sources": [{ "name": "svc2", "action": "deny" }]
        }),
    }
}
