//! HTTP client over the Consul config-entry API

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use entrywatch_common::{BackingNamespace, RecordKind};
use reqwest::StatusCode;
use tracing::trace;

use crate::{ConfigEntry, ConsulError};

/// Header carrying the ACL token
pub const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Single-shot lookup of one config entry
///
/// Implementations must not retry: a transport failure is reported as
/// [`ConsulError::Transport`] and the poller decides what to do with it.
#[async_trait]
pub trait ConfigEntryReader: Send + Sync {
    /// Fetch entry `name` of `kind` from `namespace`
    async fn get(
        &self,
        namespace: &BackingNamespace,
        kind: RecordKind,
        name: &str,
    ) -> Result<ConfigEntry, ConsulError>;
}

/// Connection settings for [`ConsulClient`]
#[derive(Clone, Debug)]
pub struct ConsulClientConfig {
    /// Base address, e.g. `https://127.0.0.1:8501`
    pub address: String,
    /// ACL token sent with every request
    pub token: Option<String>,
    /// PEM bundle trusted in addition to the system roots
    pub ca_file: Option<PathBuf>,
    /// Skip server certificate verification
    pub insecure_skip_verify: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ConsulClientConfig {
    /// Config for a plain address with no ACLs or custom TLS
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            ca_file: None,
            insecure_skip_verify: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Attach an ACL token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// [`ConfigEntryReader`] backed by the Consul HTTP API
#[derive(Clone, Debug)]
pub struct ConsulClient {
    http: reqwest::Client,
    address: String,
    token: Option<String>,
}

impl ConsulClient {
    /// Build a client from its configuration
    pub fn new(config: ConsulClientConfig) -> Result<Self, ConsulError> {
        if !config.address.starts_with("http://") && !config.address.starts_with("https://") {
            return Err(ConsulError::config(format!(
                "address must start with http:// or https://: {}",
                config.address
            )));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify);

        if let Some(path) = &config.ca_file {
            let pem = std::fs::read(path).map_err(|e| {
                ConsulError::config(format!("failed to read {}: {}", path.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ConsulError::config(format!("invalid CA bundle {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| ConsulError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    /// Base address requests are sent to
    pub fn address(&self) -> &str {
        &self.address
    }

    fn entry_url(&self, kind: RecordKind, name: &str) -> String {
        format!("{}/v1/config/{}/{}", self.address, kind.as_str(), name)
    }
}

#[async_trait]
impl ConfigEntryReader for ConsulClient {
    async fn get(
        &self,
        namespace: &BackingNamespace,
        kind: RecordKind,
        name: &str,
    ) -> Result<ConfigEntry, ConsulError> {
        let url = self.entry_url(kind, name);
        trace!(url = %url, namespace = %namespace, "reading config entry");

        let mut request = self.http.get(&url).query(&[("ns", namespace.as_str())]);
        if let Some(token) = &self.token {
            request = request.header(CONSUL_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConsulError::transport(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let message = response.text().await.unwrap_or_default();
            return Err(ConsulError::NotFound {
                kind,
                name: name.to_string(),
                namespace: namespace.clone(),
                message: message.trim().to_string(),
            });
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsulError::transport(format!(
                "GET {}: HTTP {} ({})",
                url,
                status.as_u16(),
                body.trim()
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsulError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ConsulError::transport(format!("GET {}: {}", url, e)))?;

        let entry: ConfigEntry =
            serde_json::from_slice(&body).map_err(|e| ConsulError::Decode {
                kind,
                name: name.to_string(),
                message: e.to_string(),
            })?;

        if entry.kind() != kind {
            return Err(ConsulError::Decode {
                kind,
                name: name.to_string(),
                message: format!("response has kind {}", entry.kind()),
            });
        }

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_address_without_scheme() {
        let err = ConsulClient::new(ConsulClientConfig::new("127.0.0.1:8500")).unwrap_err();
        assert!(matches!(err, ConsulError::Config { .. }));
    }

    #[test]
    fn rejects_unreadable_ca_file() {
        let mut config = ConsulClientConfig::new("https://127.0.0.1:8501");
        config.ca_file = Some(PathBuf::from("/nonexistent/ca.pem"));
        let err = ConsulClient::new(config).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ca.pem"));
    }

    #[test]
    fn builds_entry_urls() {
        let client = ConsulClient::new(ConsulClientConfig::new("http://consul:8500/")).unwrap();
        assert_eq!(client.address(), "http://consul:8500");
        assert_eq!(
            client.entry_url(RecordKind::ServiceIntentions, "svc1"),
            "http://consul:8500/v1/config/service-intentions/svc1"
        );
    }
}
