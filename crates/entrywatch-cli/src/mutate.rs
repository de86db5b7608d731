//! Writes to the system under test
//!
//! The scenario never writes config entries itself; it changes source custom
//! resources and lets the reconciler do the rest. [`SourceMutator`] is that
//! write path, implemented over the Kubernetes API by [`KubeMutator`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams,
};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use entrywatch_common::retry::{retry_with_backoff, RetryConfig};
use entrywatch_common::{RecordKind, Tenant, FIELD_MANAGER, SOURCE_API_GROUP, SOURCE_API_VERSION};

use crate::fixtures::SourceObject;
use crate::{Error, Result};

/// Mutations of source objects, fire-and-forget from the scenario's view
///
/// Success means the API server accepted the change, not that any config
/// entry reflects it yet.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceMutator: Send + Sync {
    /// Create the tenant namespace; an existing namespace is fine
    async fn ensure_tenant(&self, tenant: &Tenant) -> Result<()>;

    /// Create or update a source object in the tenant
    async fn apply(&self, tenant: &Tenant, object: &SourceObject) -> Result<()>;

    /// Merge-patch a source object
    async fn patch(
        &self,
        tenant: &Tenant,
        kind: RecordKind,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<()>;

    /// Delete a source object
    async fn delete(&self, tenant: &Tenant, kind: RecordKind, name: &str) -> Result<()>;

    /// Delete the tenant namespace and everything in it
    async fn delete_tenant(&self, tenant: &Tenant) -> Result<()>;
}

/// [`SourceMutator`] over the Kubernetes API
#[derive(Clone)]
pub struct KubeMutator {
    client: Client,
    apply_retry: RetryConfig,
}

impl KubeMutator {
    /// Mutator using `client`
    pub fn new(client: Client) -> Self {
        Self {
            client,
            apply_retry: RetryConfig::with_max_attempts(10),
        }
    }

    fn objects(&self, tenant: &Tenant, kind: RecordKind) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), tenant.as_str(), &api_resource(kind))
    }
}

/// API resource of the custom resource producing `kind`
pub fn api_resource(kind: RecordKind) -> ApiResource {
    let gvk = GroupVersionKind::gvk(SOURCE_API_GROUP, SOURCE_API_VERSION, kind.source_kind());
    ApiResource::from_gvk_with_plural(&gvk, kind.source_plural())
}

/// Whether a failed write may succeed if repeated.
///
/// Server errors cover the admission webhook refusing connections while the
/// reconciler starts up.
pub fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(resp) => resp.code >= 500 || resp.code == 429,
        kube::Error::HyperError(_) | kube::Error::Service(_) => true,
        _ => false,
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == code)
}

#[async_trait]
impl SourceMutator for KubeMutator {
    async fn ensure_tenant(&self, tenant: &Tenant) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(tenant.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match namespaces.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                info!(tenant = %tenant, "created tenant namespace");
                Ok(())
            }
            Err(e) if is_status(&e, 409) => {
                debug!(tenant = %tenant, "tenant namespace already exists");
                Ok(())
            }
            Err(e) => Err(Error::mutation("create namespace", tenant.as_str(), e)),
        }
    }

    async fn apply(&self, tenant: &Tenant, object: &SourceObject) -> Result<()> {
        let target = format!("{}/{}", object.kind.source_plural(), object.name);
        let manifest: DynamicObject = serde_json::from_value(object.manifest(tenant))?;
        let api = &self.objects(tenant, object.kind);
        let params = &PatchParams::apply(FIELD_MANAGER).force();
        let manifest = &manifest;
        let name = object.name;

        retry_with_backoff(
            &self.apply_retry,
            &format!("apply_{}", name),
            is_transient,
            || async move { api.patch(name, params, &Patch::Apply(manifest)).await },
        )
        .await
        .map_err(|e| Error::mutation("apply", target.as_str(), e))?;

        debug!(tenant = %tenant, object = %target, "applied source object");
        Ok(())
    }

    async fn patch(
        &self,
        tenant: &Tenant,
        kind: RecordKind,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        self.objects(tenant, kind)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| {
                Error::mutation("patch", format!("{}/{}", kind.source_plural(), name), e)
            })?;
        debug!(tenant = %tenant, kind = %kind, name, "patched source object");
        Ok(())
    }

    async fn delete(&self, tenant: &Tenant, kind: RecordKind, name: &str) -> Result<()> {
        match self
            .objects(tenant, kind)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!(tenant = %tenant, kind = %kind, name, "deleted source object");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(Error::mutation(
                "delete",
                format!("{}/{}", kind.source_plural(), name),
                e,
            )),
        }
    }

    async fn delete_tenant(&self, tenant: &Tenant) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.delete(tenant.as_str(), &DeleteParams::default()).await {
            Ok(_) => {
                info!(tenant = %tenant, "deleted tenant namespace");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(Error::mutation("delete namespace", tenant.as_str(), e)),
        }
    }
}
