//! Typed config entries as returned by `GET /v1/config/{kind}/{name}`
//!
//! Only the fields the scenarios compare are modeled; everything else in the
//! response (indexes, meta, unrelated settings) is ignored on decode.

use entrywatch_common::RecordKind;
use serde::{Deserialize, Serialize};

/// A config entry, tagged by its `Kind` field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Kind")]
pub enum ConfigEntry {
    /// `service-defaults`
    #[serde(rename = "service-defaults")]
    ServiceDefaults(ServiceDefaultsEntry),
    /// `service-resolver`
    #[serde(rename = "service-resolver")]
    ServiceResolver(ServiceResolverEntry),
    /// `proxy-defaults`
    #[serde(rename = "proxy-defaults")]
    ProxyDefaults(ProxyDefaultsEntry),
    /// `service-router`
    #[serde(rename = "service-router")]
    ServiceRouter(ServiceRouterEntry),
    /// `service-splitter`
    #[serde(rename = "service-splitter")]
    ServiceSplitter(ServiceSplitterEntry),
    /// `service-intentions`
    #[serde(rename = "service-intentions")]
    ServiceIntentions(ServiceIntentionsEntry),
}

/// Protocol defaults for one service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDefaultsEntry {
    /// Service name
    pub name: String,
    /// Consul namespace holding the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// L7 protocol (`tcp`, `http`, `http2`, `grpc`)
    #[serde(default)]
    pub protocol: String,
}

/// Resolver for one service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceResolverEntry {
    /// Service name
    pub name: String,
    /// Consul namespace holding the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Redirect all traffic to another service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<ServiceResolverRedirect>,
}

/// Redirect target of a resolver
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceResolverRedirect {
    /// Target service
    #[serde(default)]
    pub service: String,
}

/// Global proxy defaults (always named `global`)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyDefaultsEntry {
    /// Entry name
    pub name: String,
    /// Consul namespace holding the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Mesh gateway settings
    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,
}

/// Mesh gateway settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeshGatewayConfig {
    /// How upstreams are reached through mesh gateways
    #[serde(default)]
    pub mode: MeshGatewayMode,
}

/// Mesh gateway mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshGatewayMode {
    /// Unset; inherit from the next level up
    #[default]
    #[serde(rename = "")]
    Default,
    /// Don't use mesh gateways
    None,
    /// Use the local datacenter's gateway
    Local,
    /// Use the remote datacenter's gateway
    Remote,
}

/// L7 routes for one service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRouterEntry {
    /// Service name
    pub name: String,
    /// Consul namespace holding the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Routes, evaluated in order
    #[serde(default)]
    pub routes: Vec<ServiceRoute>,
}

/// One router route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRoute {
    /// Match criteria
    #[serde(default, rename = "Match", skip_serializing_if = "Option::is_none")]
    pub route_match: Option<ServiceRouteMatch>,
}

/// Route match criteria
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRouteMatch {
    /// HTTP match criteria
    #[serde(default, rename = "HTTP", skip_serializing_if = "Option::is_none")]
    pub http: Option<ServiceRouteHttpMatch>,
}

/// HTTP route match
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRouteHttpMatch {
    /// Path prefix to match
    #[serde(default)]
    pub path_prefix: String,
}

impl ServiceRoute {
    /// Path prefix of the HTTP match, if the route has one
    pub fn path_prefix(&self) -> Option<&str> {
        self.route_match
            .as_ref()
            .and_then(|m| m.http.as_ref())
            .map(|h| h.path_prefix.as_str())
    }
}

/// Weighted split for one service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSplitterEntry {
    /// Service name
    pub name: String,
    /// Consul namespace holding the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Splits; weights add up to 100
    #[serde(default)]
    pub splits: Vec<ServiceSplit>,
}

/// One leg of a split
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSplit {
    /// Share of traffic, 0-100
    pub weight: f32,
    /// Target service; empty means the splitter's own service
    #[serde(default)]
    pub service: String,
}

/// Intentions towards one destination service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceIntentionsEntry {
    /// Destination service name
    pub name: String,
    /// Consul namespace holding the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Source rules
    #[serde(default)]
    pub sources: Vec<SourceIntention>,
}

/// One source rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceIntention {
    /// Source service name
    pub name: String,
    /// L4 action; absent for L7 intentions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<IntentionAction>,
}

/// Intention action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentionAction {
    /// Allow traffic
    Allow,
    /// Deny traffic
    Deny,
}

impl ConfigEntry {
    /// Kind of this entry
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::ServiceDefaults(_) => RecordKind::ServiceDefaults,
            Self::ServiceResolver(_) => RecordKind::ServiceResolver,
            Self::ProxyDefaults(_) => RecordKind::ProxyDefaults,
            Self::ServiceRouter(_) => RecordKind::ServiceRouter,
            Self::ServiceSplitter(_) => RecordKind::ServiceSplitter,
            Self::ServiceIntentions(_) => RecordKind::ServiceIntentions,
        }
    }

    /// Entry name
    pub fn name(&self) -> &str {
        match self {
            Self::ServiceDefaults(e) => &e.name,
            Self::ServiceResolver(e) => &e.name,
            Self::ProxyDefaults(e) => &e.name,
            Self::ServiceRouter(e) => &e.name,
            Self::ServiceSplitter(e) => &e.name,
            Self::ServiceIntentions(e) => &e.name,
        }
    }

    /// Namespace reported by Consul, if any
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::ServiceDefaults(e) => e.namespace.as_deref(),
            Self::ServiceResolver(e) => e.namespace.as_deref(),
            Self::ProxyDefaults(e) => e.namespace.as_deref(),
            Self::ServiceRouter(e) => e.namespace.as_deref(),
            Self::ServiceSplitter(e) => e.namespace.as_deref(),
            Self::ServiceIntentions(e) => e.namespace.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_service_router_response() {
        let body = r#"{
            "Kind": "service-router",
            "Name": "router",
            "Namespace": "from-k8s",
            "Routes": [
                {"Match": {"HTTP": {"PathPrefix": "/foo"}}, "Destination": {"Service": "bar"}}
            ],
            "CreateIndex": 42,
            "ModifyIndex": 42
        }"#;
        let entry: ConfigEntry = serde_json::from_str(body).unwrap();
        assert_eq!(entry.kind(), RecordKind::ServiceRouter);
        assert_eq!(entry.name(), "router");
        assert_eq!(entry.namespace(), Some("from-k8s"));
        let ConfigEntry::ServiceRouter(router) = entry else {
            panic!("expected service-router");
        };
        assert_eq!(router.routes[0].path_prefix(), Some("/foo"));
    }

    #[test]
    fn decodes_mesh_gateway_modes() {
        let local: ConfigEntry = serde_json::from_str(
            r#"{"Kind":"proxy-defaults","Name":"global","MeshGateway":{"Mode":"local"}}"#,
        )
        .unwrap();
        let unset: ConfigEntry =
            serde_json::from_str(r#"{"Kind":"proxy-defaults","Name":"global","MeshGateway":{}}"#)
                .unwrap();
        match (local, unset) {
            (ConfigEntry::ProxyDefaults(l), ConfigEntry::ProxyDefaults(u)) => {
                assert_eq!(l.mesh_gateway.mode, MeshGatewayMode::Local);
                assert_eq!(u.mesh_gateway.mode, MeshGatewayMode::Default);
            }
            other => panic!("unexpected entries: {other:?}"),
        }
    }

    #[test]
    fn decodes_splits_and_intentions() {
        let splitter: ConfigEntry = serde_json::from_str(
            r#"{"Kind":"service-splitter","Name":"splitter",
                "Splits":[{"Weight":50},{"Weight":50,"Service":"other-splitter"}]}"#,
        )
        .unwrap();
        let ConfigEntry::ServiceSplitter(s) = splitter else {
            panic!("expected service-splitter");
        };
        assert_eq!(s.splits[0].weight, 50.0);
        assert_eq!(s.splits[0].service, "");
        assert_eq!(s.splits[1].service, "other-splitter");

        let intentions: ConfigEntry = serde_json::from_str(
            r#"{"Kind":"service-intentions","Name":"svc1",
                "Sources":[{"Name":"svc2","Action":"deny","Precedence":9}]}"#,
        )
        .unwrap();
        let ConfigEntry::ServiceIntentions(i) = intentions else {
            panic!("expected service-intentions");
        };
        assert_eq!(i.sources[0].action, Some(IntentionAction::Deny));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let entry = ConfigEntry::ServiceDefaults(ServiceDefaultsEntry {
            name: "defaults".into(),
            namespace: Some("ns1".into()),
            protocol: "http".into(),
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["Kind"], "service-defaults");
        assert_eq!(json["Protocol"], "http");
        assert_eq!(json["Namespace"], "ns1");
    }

    #[test]
    fn rejects_unknown_kind() {
        let res: Result<ConfigEntry, _> =
            serde_json::from_str(r#"{"Kind":"mesh","Name":"mesh"}"#);
        assert!(res.is_err());
    }
}
