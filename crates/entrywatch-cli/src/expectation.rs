//! Expected config-entry state and the "all satisfied" combinator
//!
//! An [`ExpectationSet`] is checked as a whole: one observation queries every
//! expectation and only passes when all of them hold at the same time. A
//! partial match is reported as a failure naming each unsatisfied entry.
//!
//! The tables at the bottom describe the state after each scenario phase.
//! proxy-defaults is a global singleton and is always looked up in
//! [`GLOBAL_NAMESPACE`], whatever the routing policy.

use std::fmt::Debug;

use entrywatch_common::poll::Observation;
use entrywatch_common::{BackingNamespace, RecordKind, GLOBAL_NAMESPACE};
use entrywatch_consul::entry::{IntentionAction, MeshGatewayMode};
use entrywatch_consul::{ConfigEntry, ConfigEntryReader};

use crate::fixtures::record_name;

/// Comparison applied to an entry that was found
pub type EntryCheck = Box<dyn Fn(&ConfigEntry) -> Result<(), String> + Send + Sync>;

/// What an expectation wants to see
pub enum Outcome {
    /// The entry exists and passes the check
    Present(EntryCheck),
    /// The entry doesn't exist
    Absent,
}

/// Expected state of one entry
pub struct Expectation {
    /// Kind of the entry
    pub kind: RecordKind,
    /// Entry name
    pub name: String,
    /// Namespace the entry is looked up in
    pub namespace: BackingNamespace,
    outcome: Outcome,
}

enum Verdict {
    Satisfied,
    Mismatch(String),
    Unavailable(String),
}

impl Expectation {
    /// Expect the entry to exist and pass `check`
    pub fn present<F>(
        kind: RecordKind,
        name: impl Into<String>,
        namespace: BackingNamespace,
        check: F,
    ) -> Self
    where
        F: Fn(&ConfigEntry) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            kind,
            name: name.into(),
            namespace,
            outcome: Outcome::Present(Box::new(check)),
        }
    }

    /// Expect the entry to be gone
    pub fn absent(kind: RecordKind, name: impl Into<String>, namespace: BackingNamespace) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace,
            outcome: Outcome::Absent,
        }
    }

    async fn check(&self, reader: &dyn ConfigEntryReader) -> Verdict {
        let result = reader.get(&self.namespace, self.kind, &self.name).await;
        match (&self.outcome, result) {
            (Outcome::Present(check), Ok(entry)) => match check(&entry) {
                Ok(()) => Verdict::Satisfied,
                Err(reason) => Verdict::Mismatch(reason),
            },
            (Outcome::Present(_), Err(e)) if e.is_not_found() => {
                Verdict::Mismatch("not found".to_string())
            }
            (Outcome::Absent, Err(e)) if e.is_not_found() => Verdict::Satisfied,
            (Outcome::Absent, Ok(_)) => Verdict::Mismatch("still present".to_string()),
            (_, Err(e)) if e.is_retryable() => Verdict::Unavailable(e.to_string()),
            (_, Err(e)) => Verdict::Mismatch(e.to_string()),
        }
    }

    fn label(&self) -> String {
        format!("{} {:?} in {}", self.kind, self.name, self.namespace)
    }
}

/// Expectations that must all hold in the same observation
#[derive(Default)]
pub struct ExpectationSet {
    expectations: Vec<Expectation>,
}

impl ExpectationSet {
    /// Build a set from its members
    pub fn new(expectations: Vec<Expectation>) -> Self {
        Self { expectations }
    }

    /// Number of expectations in the set
    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    /// Members of the set
    pub fn iter(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.iter()
    }

    /// Query every member once and combine the verdicts.
    ///
    /// Any unreachable lookup makes the observation retryable; otherwise any
    /// unsatisfied member makes it a failure. Every unsatisfied member is
    /// named in the reason.
    pub async fn observe(&self, reader: &dyn ConfigEntryReader) -> Observation {
        let mut mismatches = Vec::new();
        let mut unavailable = Vec::new();

        for expectation in &self.expectations {
            match expectation.check(reader).await {
                Verdict::Satisfied => {}
                Verdict::Mismatch(reason) => {
                    mismatches.push(format!("{}: {}", expectation.label(), reason))
                }
                Verdict::Unavailable(reason) => {
                    unavailable.push(format!("{}: {}", expectation.label(), reason))
                }
            }
        }

        if !unavailable.is_empty() {
            unavailable.extend(mismatches);
            Observation::Retryable(unavailable.join("; "))
        } else if !mismatches.is_empty() {
            Observation::Fail(mismatches.join("; "))
        } else {
            Observation::Pass
        }
    }
}

/// Namespace the entry of `kind` is looked up in
pub fn lookup_namespace(kind: RecordKind, backing: &BackingNamespace) -> BackingNamespace {
    match kind {
        RecordKind::ProxyDefaults => BackingNamespace::new(GLOBAL_NAMESPACE),
        _ => backing.clone(),
    }
}

/// State right after the fixtures are created
pub fn created(backing: &BackingNamespace) -> ExpectationSet {
    ExpectationSet::new(vec![
        present(RecordKind::ServiceDefaults, backing, protocol_is("http")),
        present(RecordKind::ServiceResolver, backing, redirect_is("bar")),
        present(
            RecordKind::ProxyDefaults,
            backing,
            mesh_gateway_is(MeshGatewayMode::Local),
        ),
        present(RecordKind::ServiceRouter, backing, path_prefix_is("/foo")),
        present(
            RecordKind::ServiceSplitter,
            backing,
            splits_are(&[(100.0, None)]),
        ),
        present(
            RecordKind::ServiceIntentions,
            backing,
            first_source_action_is(IntentionAction::Allow),
        ),
    ])
}

/// State after every fixture has been patched
pub fn updated(backing: &BackingNamespace) -> ExpectationSet {
    ExpectationSet::new(vec![
        present(RecordKind::ServiceDefaults, backing, protocol_is("tcp")),
        present(RecordKind::ServiceResolver, backing, redirect_is("baz")),
        present(
            RecordKind::ProxyDefaults,
            backing,
            mesh_gateway_is(MeshGatewayMode::Remote),
        ),
        present(RecordKind::ServiceRouter, backing, path_prefix_is("/baz")),
        present(
            RecordKind::ServiceSplitter,
            backing,
            splits_are(&[(50.0, None), (50.0, Some("other-splitter"))]),
        ),
        present(
            RecordKind::ServiceIntentions,
            backing,
            first_source_action_is(IntentionAction::Deny),
        ),
    ])
}

/// State after every fixture has been deleted
pub fn deleted(backing: &BackingNamespace) -> ExpectationSet {
    ExpectationSet::new(
        RecordKind::ALL
            .into_iter()
            .map(|kind| {
                Expectation::absent(kind, record_name(kind), lookup_namespace(kind, backing))
            })
            .collect(),
    )
}

fn present<F>(kind: RecordKind, backing: &BackingNamespace, check: F) -> Expectation
where
    F: Fn(&ConfigEntry) -> Result<(), String> + Send + Sync + 'static,
{
    Expectation::present(
        kind,
        record_name(kind),
        lookup_namespace(kind, backing),
        check,
    )
}

fn field_eq<T: PartialEq + Debug>(field: &str, got: T, want: T) -> Result<(), String> {
    if got == want {
        Ok(())
    } else {
        Err(format!("{field}: got {got:?}, want {want:?}"))
    }
}

fn wrong_kind(expected: RecordKind, entry: &ConfigEntry) -> String {
    format!("expected a {expected} entry, got {}", entry.kind())
}

fn protocol_is(want: &'static str) -> impl Fn(&ConfigEntry) -> Result<(), String> {
    move |entry| match entry {
        ConfigEntry::ServiceDefaults(e) => field_eq("Protocol", e.protocol.as_str(), want),
        other => Err(wrong_kind(RecordKind::ServiceDefaults, other)),
    }
}

fn redirect_is(want: &'static str) -> impl Fn(&ConfigEntry) -> Result<(), String> {
    move |entry| match entry {
        ConfigEntry::ServiceResolver(e) => field_eq(
            "Redirect.Service",
            e.redirect.as_ref().map(|r| r.service.as_str()),
            Some(want),
        ),
        other => Err(wrong_kind(RecordKind::ServiceResolver, other)),
    }
}

fn mesh_gateway_is(want: MeshGatewayMode) -> impl Fn(&ConfigEntry) -> Result<(), String> {
    move |entry| match entry {
        ConfigEntry::ProxyDefaults(e) => field_eq("MeshGateway.Mode", e.mesh_gateway.mode, want),
        other => Err(wrong_kind(RecordKind::ProxyDefaults, other)),
    }
}

fn path_prefix_is(want: &'static str) -> impl Fn(&ConfigEntry) -> Result<(), String> {
    move |entry| match entry {
        ConfigEntry::ServiceRouter(e) => field_eq(
            "Routes[0].Match.HTTP.PathPrefix",
            e.routes.first().and_then(|r| r.path_prefix()),
            Some(want),
        ),
        other => Err(wrong_kind(RecordKind::ServiceRouter, other)),
    }
}

/// Checks the leading splits; a `None` service isn't compared.
fn splits_are(
    want: &'static [(f32, Option<&'static str>)],
) -> impl Fn(&ConfigEntry) -> Result<(), String> {
    move |entry| match entry {
        ConfigEntry::ServiceSplitter(e) => {
            if e.splits.len() < want.len() {
                return Err(format!(
                    "Splits: got {} splits, want at least {}",
                    e.splits.len(),
                    want.len()
                ));
            }
            for (i, (split, (weight, service))) in e.splits.iter().zip(want).enumerate() {
                field_eq(&format!("Splits[{i}].Weight"), split.weight, *weight)?;
                if let Some(service) = service {
                    field_eq(
                        &format!("Splits[{i}].Service"),
                        split.service.as_str(),
                        *service,
                    )?;
                }
            }
            Ok(())
        }
        other => Err(wrong_kind(RecordKind::ServiceSplitter, other)),
    }
}

fn first_source_action_is(want: IntentionAction) -> impl Fn(&ConfigEntry) -> Result<(), String> {
    move |entry| match entry {
        ConfigEntry::ServiceIntentions(e) => field_eq(
            "Sources[0].Action",
            e.sources.first().and_then(|s| s.action),
            Some(want),
        ),
        other => Err(wrong_kind(RecordKind::ServiceIntentions, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use entrywatch_consul::entry::{
        MeshGatewayConfig, ProxyDefaultsEntry, ServiceDefaultsEntry, ServiceIntentionsEntry,
        ServiceResolverEntry, ServiceResolverRedirect, ServiceRoute, ServiceRouteHttpMatch,
        ServiceRouteMatch, ServiceRouterEntry, ServiceSplit, ServiceSplitterEntry,
        SourceIntention,
    };
    use entrywatch_consul::ConsulError;

    #[derive(Default)]
    struct TableReader {
        entries: Mutex<HashMap<(String, RecordKind, String), ConfigEntry>>,
        down: bool,
    }

    impl TableReader {
        fn put(&self, ns: &str, entry: ConfigEntry) {
            self.entries.lock().unwrap().insert(
                (ns.to_string(), entry.kind(), entry.name().to_string()),
                entry,
            );
        }
    }

    #[async_trait]
    impl ConfigEntryReader for TableReader {
        async fn get(
            &self,
            namespace: &BackingNamespace,
            kind: RecordKind,
            name: &str,
        ) -> Result<ConfigEntry, ConsulError> {
            if self.down {
                return Err(ConsulError::transport("connection refused"));
            }
            self.entries
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), kind, name.to_string()))
                .cloned()
                .ok_or_else(|| ConsulError::NotFound {
                    kind,
                    name: name.to_string(),
                    namespace: namespace.clone(),
                    message: "Config entry not found".to_string(),
                })
        }
    }

    fn created_entries(reader: &TableReader, ns: &str) {
        reader.put(
            ns,
            ConfigEntry::ServiceDefaults(ServiceDefaultsEntry {
                name: "defaults".into(),
                protocol: "http".into(),
                ..Default::default()
            }),
        );
        reader.put(
            ns,
            ConfigEntry::ServiceResolver(ServiceResolverEntry {
                name: "resolver".into(),
                redirect: Some(ServiceResolverRedirect {
                    service: "bar".into(),
                }),
                ..Default::default()
            }),
        );
        reader.put(
            GLOBAL_NAMESPACE,
            ConfigEntry::ProxyDefaults(ProxyDefaultsEntry {
                name: "global".into(),
                mesh_gateway: MeshGatewayConfig {
                    mode: MeshGatewayMode::Local,
                },
                ..Default::default()
            }),
        );
        reader.put(
            ns,
            ConfigEntry::ServiceRouter(ServiceRouterEntry {
                name: "router".into(),
                routes: vec![ServiceRoute {
                    route_match: Some(ServiceRouteMatch {
                        http: Some(ServiceRouteHttpMatch {
                            path_prefix: "/foo".into(),
                        }),
                    }),
                }],
                ..Default::default()
            }),
        );
        reader.put(
            ns,
            ConfigEntry::ServiceSplitter(ServiceSplitterEntry {
                name: "splitter".into(),
                splits: vec![ServiceSplit {
                    weight: 100.0,
                    service: String::new(),
                }],
                ..Default::default()
            }),
        );
        reader.put(
            ns,
            ConfigEntry::ServiceIntentions(ServiceIntentionsEntry {
                name: "svc1".into(),
                sources: vec![SourceIntention {
                    name: "svc2".into(),
                    action: Some(IntentionAction::Allow),
                }],
                ..Default::default()
            }),
        );
    }

    #[tokio::test]
    async fn all_six_satisfied_passes() {
        let reader = TableReader::default();
        created_entries(&reader, "from-k8s");
        let set = created(&BackingNamespace::new("from-k8s"));
        assert_eq!(set.len(), 6);
        assert_eq!(set.observe(&reader).await, Observation::Pass);
    }

    #[tokio::test]
    async fn partial_match_fails_and_names_the_mismatch() {
        let reader = TableReader::default();
        created_entries(&reader, "ns1");
        reader.put(
            "ns1",
            ConfigEntry::ServiceDefaults(ServiceDefaultsEntry {
                name: "defaults".into(),
                protocol: "tcp".into(),
                ..Default::default()
            }),
        );

        let observation = created(&BackingNamespace::new("ns1")).observe(&reader).await;
        let Observation::Fail(reason) = observation else {
            panic!("expected a failed observation");
        };
        assert!(reason.contains("service-defaults"), "{reason}");
        assert!(reason.contains(r#"Protocol: got "tcp", want "http""#), "{reason}");
        assert!(!reason.contains("service-router"), "{reason}");
    }

    #[tokio::test]
    async fn entries_in_wrong_namespace_do_not_count() {
        let reader = TableReader::default();
        created_entries(&reader, "ns1");
        let obs = created(&BackingNamespace::new("from-k8s"))
            .observe(&reader)
            .await;
        let reason = match obs {
            Observation::Fail(reason) => reason,
            other => panic!("expected a failed observation, got {other:?}"),
        };
        assert!(reason.contains("not found"));
        // proxy-defaults lives in the global namespace and is satisfied
        assert!(!reason.contains("proxy-defaults"), "{reason}");
    }

    #[tokio::test]
    async fn unreachable_backend_is_retryable() {
        let reader = TableReader {
            down: true,
            ..Default::default()
        };
        let obs = deleted(&BackingNamespace::new("ns1")).observe(&reader).await;
        assert!(matches!(obs, Observation::Retryable(ref r) if r.contains("connection refused")));
    }

    #[tokio::test]
    async fn deletion_passes_only_when_all_gone() {
        let reader = TableReader::default();
        let set = deleted(&BackingNamespace::new("ns1"));
        assert_eq!(set.observe(&reader).await, Observation::Pass);

        reader.put(
            GLOBAL_NAMESPACE,
            ConfigEntry::ProxyDefaults(ProxyDefaultsEntry {
                name: "global".into(),
                ..Default::default()
            }),
        );
        let obs = set.observe(&reader).await;
        assert!(matches!(obs, Observation::Fail(ref r) if r.contains("still present")));
    }

    #[test]
    fn proxy_defaults_always_uses_global_namespace() {
        for backing in ["ns1", "from-k8s"] {
            let backing = BackingNamespace::new(backing);
            for set in [created(&backing), updated(&backing), deleted(&backing)] {
                for e in set.iter() {
                    let want = if e.kind == RecordKind::ProxyDefaults {
                        BackingNamespace::new(GLOBAL_NAMESPACE)
                    } else {
                        backing.clone()
                    };
                    assert_eq!(e.namespace, want, "{}", e.kind);
                }
            }
        }
    }

    #[test]
    fn split_check_compares_services_when_given() {
        let check = splits_are(&[(50.0, None), (50.0, Some("other-splitter"))]);
        let entry = ConfigEntry::ServiceSplitter(ServiceSplitterEntry {
            name: "splitter".into(),
            splits: vec![
                ServiceSplit {
                    weight: 50.0,
                    service: String::new(),
                },
                ServiceSplit {
                    weight: 50.0,
                    service: "splitter".into(),
                },
            ],
            ..Default::default()
        });
        let err = check(&entry).unwrap_err();
        assert!(err.starts_with("Splits[1].Service"), "{err}");
    }

    #[test]
    fn checks_reject_wrong_kind() {
        let entry = ConfigEntry::ServiceDefaults(ServiceDefaultsEntry::default());
        let err = redirect_is("bar")(&entry).unwrap_err();
        assert!(err.contains("expected a service-resolver entry"));
    }
}
