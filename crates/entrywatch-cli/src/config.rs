//! Run configuration loaded from YAML
//!
//! One file describes the whole matrix: poll budgets, cleanup behavior, and
//! the deployments to verify. Each scenario names its tenant, the routing
//! policy and security mode the deployment was installed with, how to reach
//! its Kubernetes API, and how to reach its Consul HTTP API.
//!
//! ```yaml
//! cold_start: { max_attempts: 60, interval_ms: 1000 }
//! steady_state: { max_attempts: 10, interval_ms: 500 }
//! no_cleanup_on_failure: false
//! scenarios:
//!   - name: mirror-secure
//!     tenant: ns1
//!     routing: { mode: mirror }
//!     security: secured
//!     kube_context: kind-mirror-secure
//!     consul:
//!       address: https://127.0.0.1:8501
//!       token_secret: { namespace: default, name: consul-bootstrap-acl-token, key: token }
//!       ca_file: /tmp/consul-ca.pem
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use entrywatch_common::poll::PollConfig;
use entrywatch_common::{RoutingPolicy, Tenant, DEFAULT_FIXED_DESTINATION, DEFAULT_TENANT};
use entrywatch_consul::ConsulClientConfig;
use serde::{Deserialize, Serialize};

use crate::scenario::{PollTimings, ScenarioParams, SecurityMode};
use crate::{Error, Result};

/// Environment variable holding the config path when `--config` is absent
pub const CONFIG_ENV: &str = "ENTRYWATCH_CONFIG";

/// First Consul HTTP port of the reference matrix; HTTPS is the next port up
const REFERENCE_BASE_PORT: u16 = 8500;
/// Port distance between reference matrix deployments
const REFERENCE_PORT_STRIDE: u16 = 10;

/// Top-level run configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Budget for the first verify phase
    #[serde(default = "PollConfig::cold_start")]
    pub cold_start: PollConfig,
    /// Budget for the verify phases after update and delete
    #[serde(default = "PollConfig::steady_state")]
    pub steady_state: PollConfig,
    /// Leave a failed scenario's tenant in place for inspection
    #[serde(default)]
    pub no_cleanup_on_failure: bool,
    /// Deployments to verify
    pub scenarios: Vec<ScenarioConfig>,
}

/// One deployment under test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default = "default_tenant")]
    pub tenant: Tenant,
    #[serde(default)]
    pub routing: RoutingPolicy,
    #[serde(default)]
    pub security: SecurityMode,
    /// Kubeconfig file; kube defaults when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    /// Context within the kubeconfig; current context when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
    pub consul: ConsulConfig,
}

/// How to reach a deployment's Consul HTTP API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsulConfig {
    pub address: String,
    /// Environment variable holding the ACL token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    /// Kubernetes secret holding the ACL token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<SecretRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// Key within a Kubernetes secret
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

fn default_tenant() -> Tenant {
    Tenant::new(DEFAULT_TENANT)
}

impl RunConfig {
    /// Read, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::command_failed(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&data)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked before touching a cluster
    pub fn validate(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(Error::validation("no scenarios configured"));
        }
        for (label, budget) in [
            ("cold_start", &self.cold_start),
            ("steady_state", &self.steady_state),
        ] {
            if budget.max_attempts == 0 {
                return Err(Error::validation(format!(
                    "{label}.max_attempts must be at least 1"
                )));
            }
        }

        // Concurrent scenarios must not share a Consul or a tenant on one cluster
        let mut names = HashSet::new();
        let mut addresses = HashMap::new();
        let mut tenants = HashMap::new();
        for scenario in &self.scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate scenario name: {}",
                    scenario.name
                )));
            }
            scenario.validate()?;

            let address = scenario.consul.address.trim_end_matches('/');
            if let Some(other) = addresses.insert(address, scenario.name.as_str()) {
                return Err(Error::validation(format!(
                    "scenarios {other} and {} share consul.address {address}",
                    scenario.name
                )));
            }

            let tenant = (
                scenario.kubeconfig.as_deref(),
                scenario.kube_context.as_deref(),
                scenario.tenant.as_str(),
            );
            if let Some(other) = tenants.insert(tenant, scenario.name.as_str()) {
                return Err(Error::validation(format!(
                    "scenarios {other} and {} share tenant {} on the same cluster",
                    scenario.name, scenario.tenant
                )));
            }
        }
        Ok(())
    }

    /// Scenarios whose names appear in `only`, or all of them when it is empty
    pub fn select(&self, only: &[String]) -> Result<Vec<&ScenarioConfig>> {
        if only.is_empty() {
            return Ok(self.scenarios.iter().collect());
        }
        only.iter()
            .map(|name| {
                self.scenarios
                    .iter()
                    .find(|s| &s.name == name)
                    .ok_or_else(|| Error::validation(format!("unknown scenario: {name}")))
            })
            .collect()
    }

    pub fn timings(&self) -> PollTimings {
        PollTimings {
            cold_start: self.cold_start,
            steady_state: self.steady_state,
        }
    }

    /// The four-way matrix of routing policy and security mode.
    ///
    /// Each scenario gets its own cluster context and Consul port, and
    /// secured scenarios verify the server against a CA bundle.
    pub fn reference_matrix() -> Self {
        let mut scenarios = Vec::new();
        let mut port = REFERENCE_BASE_PORT;
        for (routing, mode_label) in [
            (RoutingPolicy::fixed(DEFAULT_FIXED_DESTINATION), "fixed"),
            (RoutingPolicy::Mirror, "mirror"),
        ] {
            for security in [SecurityMode::Secured, SecurityMode::Open] {
                let name = format!("{mode_label}-{security}");
                let consul = match security {
                    SecurityMode::Secured => ConsulConfig {
                        address: format!("https://127.0.0.1:{}", port + 1),
                        token_env: None,
                        token_secret: Some(SecretRef {
                            namespace: "default".to_string(),
                            name: "consul-bootstrap-acl-token".to_string(),
                            key: "token".to_string(),
                        }),
                        ca_file: Some(PathBuf::from(format!("/tmp/consul-ca-{name}.pem"))),
                        insecure_skip_verify: false,
                    },
                    SecurityMode::Open => ConsulConfig {
                        address: format!("http://127.0.0.1:{port}"),
                        token_env: None,
                        token_secret: None,
                        ca_file: None,
                        insecure_skip_verify: false,
                    },
                };
                port += REFERENCE_PORT_STRIDE;
                scenarios.push(ScenarioConfig {
                    kube_context: Some(format!("kind-{name}")),
                    name,
                    tenant: default_tenant(),
                    routing: routing.clone(),
                    security,
                    kubeconfig: None,
                    consul,
                });
            }
        }
        Self {
            cold_start: PollConfig::cold_start(),
            steady_state: PollConfig::steady_state(),
            no_cleanup_on_failure: false,
            scenarios,
        }
    }
}

impl ScenarioConfig {
    fn validate(&self) -> Result<()> {
        let field = |f: &str| format!("scenario {}: {f}", self.name);

        if self.name.trim().is_empty() {
            return Err(Error::validation("scenario name must not be empty"));
        }
        if self.tenant.as_str().trim().is_empty() {
            return Err(Error::validation(field("tenant must not be empty")));
        }
        if let RoutingPolicy::FixedDestination { destination } = &self.routing {
            if destination.as_str().trim().is_empty() {
                return Err(Error::validation(field(
                    "fixed routing requires a non-empty destination",
                )));
            }
        }

        let address = self.consul.address.as_str();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(Error::validation(field(
                "consul.address must start with http:// or https://",
            )));
        }
        if self.security == SecurityMode::Secured {
            if !address.starts_with("https://") {
                return Err(Error::validation(field(
                    "secured mode requires an https consul.address",
                )));
            }
            if self.consul.token_env.is_none() && self.consul.token_secret.is_none() {
                return Err(Error::validation(field(
                    "secured mode requires consul.token_env or consul.token_secret",
                )));
            }
        }
        Ok(())
    }

    pub fn params(&self) -> ScenarioParams {
        ScenarioParams {
            name: self.name.clone(),
            tenant: self.tenant.clone(),
            policy: self.routing.clone(),
            security: self.security,
        }
    }

    /// Client settings for this scenario's Consul, with the resolved token
    pub fn client_config(&self, token: Option<String>) -> ConsulClientConfig {
        let mut config = ConsulClientConfig::new(&self.consul.address);
        config.token = token;
        config.ca_file = self.consul.ca_file.clone();
        config.insecure_skip_verify = self.consul.insecure_skip_verify;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const MINIMAL: &str = r#"
scenarios:
  - name: mirror
    routing: { mode: mirror }
    consul:
      address: http://127.0.0.1:8500
"#;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = RunConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.cold_start, PollConfig::cold_start());
        assert_eq!(config.steady_state, PollConfig::steady_state());
        assert!(!config.no_cleanup_on_failure);

        let scenario = &config.scenarios[0];
        assert_eq!(scenario.tenant.as_str(), "ns1");
        assert_eq!(scenario.security, SecurityMode::Open);
        assert_eq!(scenario.routing, RoutingPolicy::Mirror);
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
cold_start: { max_attempts: 30, interval_ms: 2000 }
steady_state: { max_attempts: 5, interval_ms: 250 }
no_cleanup_on_failure: true
scenarios:
  - name: fixed-secure
    tenant: team-a
    routing: { mode: fixed, destination: from-k8s }
    security: secured
    kube_context: kind-a
    consul:
      address: https://127.0.0.1:8501
      token_secret: { namespace: default, name: bootstrap, key: token }
      ca_file: /tmp/ca.pem
"#;
        let config = RunConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.cold_start, PollConfig::new(30, Duration::from_secs(2)));
        assert_eq!(
            config.steady_state,
            PollConfig::new(5, Duration::from_millis(250))
        );
        assert!(config.no_cleanup_on_failure);

        let s = &config.scenarios[0];
        assert_eq!(s.routing, RoutingPolicy::fixed("from-k8s"));
        assert_eq!(s.kube_context.as_deref(), Some("kind-a"));
        assert_eq!(s.consul.token_secret.as_ref().unwrap().name, "bootstrap");

        let params = s.params();
        assert_eq!(params.tenant.as_str(), "team-a");
        assert_eq!(params.policy.resolve(&params.tenant).as_str(), "from-k8s");

        let client = s.client_config(Some("secret".to_string()));
        assert_eq!(client.token.as_deref(), Some("secret"));
        assert_eq!(client.ca_file, Some(PathBuf::from("/tmp/ca.pem")));
    }

    #[test]
    fn rejects_duplicate_names() {
        let yaml = r#"
scenarios:
  - name: a
    consul: { address: http://x:8500 }
  - name: a
    consul: { address: http://y:8500 }
"#;
        let err = RunConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate scenario name: a"));
    }

    #[test]
    fn rejects_secured_over_http() {
        let yaml = r#"
scenarios:
  - name: s
    security: secured
    consul: { address: http://x:8500, token_env: CONSUL_HTTP_TOKEN }
"#;
        let err = RunConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("https"));
    }

    #[test]
    fn rejects_secured_without_token_source() {
        let yaml = r#"
scenarios:
  - name: s
    security: secured
    consul: { address: https://x:8501 }
"#;
        let err = RunConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("token_env or consul.token_secret"));
    }

    #[test]
    fn rejects_empty_fixed_destination() {
        let yaml = r#"
scenarios:
  - name: f
    routing: { mode: fixed, destination: "" }
    consul: { address: http://x:8500 }
"#;
        assert!(RunConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_zero_attempts_and_empty_list() {
        let zero = format!("steady_state: {{ max_attempts: 0, interval_ms: 10 }}\n{MINIMAL}");
        assert!(RunConfig::from_yaml(&zero)
            .unwrap_err()
            .to_string()
            .contains("steady_state.max_attempts"));

        assert!(RunConfig::from_yaml("scenarios: []").is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let yaml = r#"
scenarios:
  - name: m
    consul: { address: http://x:8500 }
    colour: blue
"#;
        assert!(matches!(RunConfig::from_yaml(yaml), Err(Error::Yaml(_))));
    }

    #[test]
    fn select_filters_and_rejects_unknown() {
        let config = RunConfig::reference_matrix();
        assert_eq!(config.select(&[]).unwrap().len(), 4);

        let picked = config.select(&["mirror-open".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].routing, RoutingPolicy::Mirror);

        assert!(config.select(&["nope".to_string()]).is_err());
    }

    #[test]
    fn reference_matrix_is_valid_and_round_trips() {
        let config = RunConfig::reference_matrix();
        config.validate().unwrap();

        let names: Vec<_> = config.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["fixed-secured", "fixed-open", "mirror-secured", "mirror-open"]
        );

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(RunConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.scenarios.len(), 1);

        let missing = RunConfig::load("/nonexistent/entrywatch.yaml").unwrap_err();
        assert!(missing.to_string().contains("failed to read"));
    }

    #[test]
    fn reference_matrix_isolates_deployments() {
        let config = RunConfig::reference_matrix();

        let addresses: HashSet<_> = config
            .scenarios
            .iter()
            .map(|s| s.consul.address.as_str())
            .collect();
        assert_eq!(addresses.len(), 4);

        let contexts: HashSet<_> = config
            .scenarios
            .iter()
            .map(|s| s.kube_context.as_deref())
            .collect();
        assert_eq!(contexts.len(), 4);

        for s in &config.scenarios {
            if s.security == SecurityMode::Secured {
                assert!(s.consul.address.starts_with("https://"), "{}", s.name);
                assert!(s.consul.ca_file.is_some(), "{}", s.name);
                assert!(!s.consul.insecure_skip_verify, "{}", s.name);
            }
        }
    }

    #[test]
    fn rejects_shared_consul_address() {
        let yaml = r#"
scenarios:
  - name: fixed-open
    routing: { mode: fixed, destination: from-k8s }
    kube_context: kind-a
    consul: { address: http://127.0.0.1:8500 }
  - name: mirror-open
    kube_context: kind-b
    consul: { address: "http://127.0.0.1:8500/" }
"#;
        let err = RunConfig::from_yaml(yaml).unwrap_err();
        assert!(
            err.to_string()
                .contains("scenarios fixed-open and mirror-open share consul.address"),
            "{err}"
        );
    }

    #[test]
    fn rejects_shared_tenant_on_one_cluster() {
        let yaml = r#"
scenarios:
  - name: a
    kube_context: kind-a
    consul: { address: http://127.0.0.1:8500 }
  - name: b
    kube_context: kind-a
    consul: { address: http://127.0.0.1:8510 }
"#;
        let err = RunConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("share tenant ns1"), "{err}");
    }

    #[test]
    fn same_tenant_on_separate_clusters_is_fine() {
        let yaml = r#"
scenarios:
  - name: a
    kube_context: kind-a
    consul: { address: http://127.0.0.1:8500 }
  - name: b
    kube_context: kind-b
    consul: { address: http://127.0.0.1:8510 }
  - name: c
    kube_context: kind-a
    tenant: ns2
    consul: { address: http://127.0.0.1:8520 }
"#;
        assert_eq!(RunConfig::from_yaml(yaml).unwrap().scenarios.len(), 3);
    }
}
