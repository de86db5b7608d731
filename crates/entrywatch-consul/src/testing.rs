//! In-process fake Consul for tests
//!
//! Serves `GET /v1/config/{kind}/{name}?ns=...` from an in-memory table.
//! Tests write entries into the [`FakeStore`] the way the reconciler would,
//! and can make the server return 503s or demand an ACL token.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use entrywatch_common::{BackingNamespace, RecordKind, GLOBAL_NAMESPACE};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::{ConfigEntry, CONSUL_TOKEN_HEADER};

type EntryKey = (String, RecordKind, String);

/// Shared in-memory table behind a [`FakeConsul`]
#[derive(Clone, Debug, Default)]
pub struct FakeStore {
    entries: Arc<RwLock<HashMap<EntryKey, ConfigEntry>>>,
    unavailable: Arc<AtomicU32>,
    requests: Arc<AtomicUsize>,
    token: Arc<RwLock<Option<String>>>,
}

impl FakeStore {
    /// Insert or replace an entry in `namespace`
    pub fn put(&self, namespace: &BackingNamespace, entry: ConfigEntry) {
        let key = (
            namespace.as_str().to_string(),
            entry.kind(),
            entry.name().to_string(),
        );
        self.write().insert(key, entry);
    }

    /// Remove an entry, returning it if it existed
    pub fn remove(
        &self,
        namespace: &BackingNamespace,
        kind: RecordKind,
        name: &str,
    ) -> Option<ConfigEntry> {
        self.write()
            .remove(&(namespace.as_str().to_string(), kind, name.to_string()))
    }

    /// Look up an entry without going through HTTP
    pub fn get(
        &self,
        namespace: &BackingNamespace,
        kind: RecordKind,
        name: &str,
    ) -> Option<ConfigEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(namespace.as_str().to_string(), kind, name.to_string()))
            .cloned()
    }

    /// Number of entries across all namespaces
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Answer the next `count` requests with 503
    pub fn fail_next(&self, count: u32) {
        self.unavailable.store(count, Ordering::SeqCst);
    }

    /// Reject requests that don't carry `token`
    pub fn require_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    /// Number of HTTP requests served so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EntryKey, ConfigEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn take_unavailable(&self) -> bool {
        self.unavailable
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A running fake server; stops when dropped
pub struct FakeConsul {
    addr: SocketAddr,
    store: FakeStore,
    handle: JoinHandle<()>,
}

impl FakeConsul {
    /// Bind to an ephemeral localhost port and start serving
    pub async fn start() -> std::io::Result<Self> {
        let store = FakeStore::default();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = Router::new()
            .route("/v1/config/{kind}/{name}", get(get_entry))
            .with_state(store.clone());

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            store,
            handle,
        })
    }

    /// `http://` address of the server
    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The table served by this instance
    pub fn store(&self) -> &FakeStore {
        &self.store
    }
}

impl Drop for FakeConsul {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Deserialize)]
struct NamespaceQuery {
    ns: Option<String>,
}

async fn get_entry(
    State(store): State<FakeStore>,
    Path((kind, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
    headers: HeaderMap,
) -> Response {
    store.requests.fetch_add(1, Ordering::SeqCst);

    if store.take_unavailable() {
        return (StatusCode::SERVICE_UNAVAILABLE, "No cluster leader").into_response();
    }

    let required = store
        .token
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Some(required) = required {
        let presented = headers
            .get(CONSUL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(required.as_str()) {
            return (StatusCode::FORBIDDEN, "ACL not found").into_response();
        }
    }

    let Ok(record_kind) = kind.parse::<RecordKind>() else {
        return (
            StatusCode::BAD_REQUEST,
            format!("invalid config entry kind: {kind}"),
        )
            .into_response();
    };

    let namespace = BackingNamespace::new(query.ns.as_deref().unwrap_or(GLOBAL_NAMESPACE));
    match store.get(&namespace, record_kind, &name) {
        Some(entry) => Json(entry).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            format!("Config entry not found for {kind:?} / {name:?}"),
        )
            .into_response(),
    }
}
