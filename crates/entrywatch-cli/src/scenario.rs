//! Scenario driver
//!
//! A scenario walks one tenant through create, update and delete of the six
//! fixtures. After each batch of mutations it polls the config-entry store
//! until every derived entry reflects the batch:
//!
//! ```text
//! setup -> create -> verify create (cold start budget)
//!       -> update -> verify update (steady state budget)
//!       -> delete -> verify delete (steady state budget)
//! ```
//!
//! The routing policy is resolved to a backing namespace once, in
//! [`Scenario::new`], and that value is used for every lookup.

use std::fmt;
use std::sync::Arc;

use entrywatch_common::poll::{poll_until, PollConfig};
use entrywatch_common::{BackingNamespace, RecordKind, RoutingPolicy, Tenant};
use entrywatch_consul::ConfigEntryReader;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::expectation::{self, ExpectationSet};
use crate::fixtures::{object_name, source_objects, source_patches};
use crate::mutate::SourceMutator;
use crate::{Error, Result};

/// Step of a scenario, used to attribute failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Tenant namespace creation
    Setup,
    /// Applying the fixtures
    Create,
    /// Waiting for entries with creation-time values
    VerifyCreate,
    /// Patching the fixtures
    Update,
    /// Waiting for entries with patched values
    VerifyUpdate,
    /// Deleting the fixtures
    Delete,
    /// Waiting for entries to disappear
    VerifyDelete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Setup => "setup",
            Phase::Create => "create",
            Phase::VerifyCreate => "verify create",
            Phase::Update => "update",
            Phase::VerifyUpdate => "verify update",
            Phase::Delete => "delete",
            Phase::VerifyDelete => "verify delete",
        };
        f.write_str(s)
    }
}

/// Whether the deployment under test runs with ACLs and TLS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No ACLs, plain HTTP
    #[default]
    Open,
    /// ACLs enforced and HTTPS only
    Secured,
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityMode::Open => f.write_str("open"),
            SecurityMode::Secured => f.write_str("secured"),
        }
    }
}

/// Identity and routing of one scenario
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenarioParams {
    /// Name used in logs and the report
    pub name: String,
    /// Tenant namespace the fixtures are created in
    pub tenant: Tenant,
    /// Routing policy the deployment was installed with
    pub policy: RoutingPolicy,
    /// Security mode the deployment was installed with
    pub security: SecurityMode,
}

/// Poll budgets for the verify phases
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollTimings {
    /// Budget for the first convergence after startup
    pub cold_start: PollConfig,
    /// Budget for convergence after an incremental change
    pub steady_state: PollConfig,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            cold_start: PollConfig::cold_start(),
            steady_state: PollConfig::steady_state(),
        }
    }
}

/// One create/update/delete run against one deployment
pub struct Scenario {
    params: ScenarioParams,
    backing: BackingNamespace,
    mutator: Arc<dyn SourceMutator>,
    reader: Arc<dyn ConfigEntryReader>,
    timings: PollTimings,
}

impl Scenario {
    /// Prepare a scenario, resolving its backing namespace
    pub fn new(
        params: ScenarioParams,
        mutator: Arc<dyn SourceMutator>,
        reader: Arc<dyn ConfigEntryReader>,
        timings: PollTimings,
    ) -> Self {
        let backing = params.policy.resolve(&params.tenant);
        Self {
            params,
            backing,
            mutator,
            reader,
            timings,
        }
    }

    /// Scenario parameters
    pub fn params(&self) -> &ScenarioParams {
        &self.params
    }

    /// Namespace the scenario's entries are expected in
    pub fn backing_namespace(&self) -> &BackingNamespace {
        &self.backing
    }

    /// Run every phase in order, stopping at the first failure
    pub async fn run(&self) -> Result<()> {
        info!(
            scenario = %self.params.name,
            tenant = %self.params.tenant,
            policy = %self.params.policy,
            backing = %self.backing,
            security = %self.params.security,
            "starting scenario"
        );

        self.setup()
            .await
            .map_err(|e| Error::in_phase(Phase::Setup, e))?;

        self.create()
            .await
            .map_err(|e| Error::in_phase(Phase::Create, e))?;
        self.verify(
            Phase::VerifyCreate,
            expectation::created(&self.backing),
            &self.timings.cold_start,
        )
        .await?;

        self.update()
            .await
            .map_err(|e| Error::in_phase(Phase::Update, e))?;
        self.verify(
            Phase::VerifyUpdate,
            expectation::updated(&self.backing),
            &self.timings.steady_state,
        )
        .await?;

        self.delete()
            .await
            .map_err(|e| Error::in_phase(Phase::Delete, e))?;
        self.verify(
            Phase::VerifyDelete,
            expectation::deleted(&self.backing),
            &self.timings.steady_state,
        )
        .await?;

        info!(scenario = %self.params.name, "scenario passed");
        Ok(())
    }

    /// Remove the tenant namespace; failures are logged, not returned
    pub async fn cleanup(&self) {
        if let Err(e) = self.mutator.delete_tenant(&self.params.tenant).await {
            warn!(scenario = %self.params.name, error = %e, "cleanup failed");
        }
    }

    async fn setup(&self) -> Result<()> {
        info!(scenario = %self.params.name, tenant = %self.params.tenant, "creating tenant");
        self.mutator.ensure_tenant(&self.params.tenant).await
    }

    async fn create(&self) -> Result<()> {
        for object in source_objects() {
            info!(
                scenario = %self.params.name,
                kind = %object.kind,
                name = object.name,
                "creating source object"
            );
            self.mutator.apply(&self.params.tenant, &object).await?;
        }
        Ok(())
    }

    async fn update(&self) -> Result<()> {
        for patch in source_patches() {
            info!(
                scenario = %self.params.name,
                kind = %patch.kind,
                name = patch.name,
                "patching source object"
            );
            self.mutator
                .patch(&self.params.tenant, patch.kind, patch.name, &patch.patch)
                .await?;
        }
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        for kind in RecordKind::ALL {
            let name = object_name(kind);
            info!(scenario = %self.params.name, kind = %kind, name, "deleting source object");
            self.mutator.delete(&self.params.tenant, kind, name).await?;
        }
        Ok(())
    }

    async fn verify(&self, phase: Phase, set: ExpectationSet, budget: &PollConfig) -> Result<()> {
        let description = format!("{} ({})", phase, self.params.name);
        let reader = self.reader.as_ref();
        let set = &set;

        poll_until(budget, &description, || set.observe(reader))
            .await
            .map(|_| ())
            .map_err(|e| Error::in_phase(phase, e.into()))
    }
}
