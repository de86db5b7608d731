//! Errors returned by config-entry lookups

use entrywatch_common::{BackingNamespace, RecordKind};
use thiserror::Error;

/// Error returned by a single config-entry lookup
#[derive(Debug, Error)]
pub enum ConsulError {
    /// The entry doesn't exist (HTTP 404)
    ///
    /// Expected after a deletion and while a creation hasn't converged yet.
    #[error("{kind} {name:?} in namespace {namespace}: unexpected response code: 404 ({message})")]
    NotFound {
        /// Kind that was looked up
        kind: RecordKind,
        /// Entry name that was looked up
        name: String,
        /// Namespace that was searched
        namespace: BackingNamespace,
        /// Response body as returned by Consul
        message: String,
    },

    /// Consul couldn't be reached or answered with a server error
    #[error("transport error: {message}")]
    Transport {
        /// Description of what failed
        message: String,
    },

    /// Consul rejected the request (e.g., 403 from ACLs)
    #[error("unexpected response code: {status} ({body})")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The response body didn't decode as the requested kind
    #[error("failed to decode {kind} {name:?}: {message}")]
    Decode {
        /// Kind that was looked up
        kind: RecordKind,
        /// Entry name that was looked up
        name: String,
        /// Decoder message
        message: String,
    },

    /// The client couldn't be built (bad CA bundle, bad address)
    #[error("invalid consul client configuration: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },
}

impl ConsulError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the entry is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether asking again later might give a different answer
    ///
    /// Not-found is excluded: it's a definite answer about the entry, and
    /// callers decide themselves whether it means "not yet" or "gone".
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> ConsulError {
        ConsulError::NotFound {
            kind: RecordKind::ServiceDefaults,
            name: "defaults".into(),
            namespace: BackingNamespace::new("ns1"),
            message: r#"Config entry not found for "service-defaults" / "defaults""#.into(),
        }
    }

    #[test]
    fn not_found_display_keeps_consul_marker() {
        let err = not_found();
        assert!(err.to_string().contains("404 (Config entry not found"));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_and_status_are_retryable() {
        assert!(ConsulError::transport("connection refused").is_retryable());
        assert!(ConsulError::Status {
            status: 403,
            body: "ACL not found".into()
        }
        .is_retryable());
        assert!(!ConsulError::config("bad ca").is_retryable());
    }
}
