//! `entrywatch run` - verify convergence across the configured scenarios
//!
//! Every selected scenario runs concurrently against its own cluster and
//! Consul endpoint. The command fails if any scenario fails.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use futures::future::join_all;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tokio::time::Instant;
use tracing::{info, warn};

use entrywatch_consul::ConsulClient;

use crate::config::{ConsulConfig, RunConfig, ScenarioConfig, CONFIG_ENV};
use crate::mutate::KubeMutator;
use crate::report::RunReport;
use crate::scenario::{PollTimings, Scenario};
use crate::{Error, Result};

/// Run the scenario matrix
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the run configuration
    #[arg(short, long, env = CONFIG_ENV)]
    pub config: PathBuf,

    /// Run only the named scenario (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,
}

/// Run the run command
pub async fn run(args: RunArgs) -> Result<()> {
    let config = RunConfig::load(&args.config)?;
    let selected = config.select(&args.only)?;
    let timings = config.timings();

    info!(
        scenarios = selected.len(),
        config = %args.config.display(),
        "running scenarios"
    );

    let report = RunReport::new("entrywatch");
    join_all(
        selected
            .into_iter()
            .map(|sc| run_scenario(sc, timings, config.no_cleanup_on_failure, &report)),
    )
    .await;

    report.finish()
}

async fn run_scenario(
    config: &ScenarioConfig,
    timings: PollTimings,
    no_cleanup_on_failure: bool,
    report: &RunReport,
) {
    let start = Instant::now();
    let scenario = match build_scenario(config, timings).await {
        Ok(s) => s,
        Err(e) => {
            report.record(&config.name, false, start.elapsed(), Some(e.to_string()));
            return;
        }
    };

    let passed = report.run(&config.name, scenario.run()).await;

    if !passed && no_cleanup_on_failure {
        warn!(
            scenario = %config.name,
            tenant = %config.tenant,
            "leaving tenant in place for inspection"
        );
        return;
    }
    scenario.cleanup().await;
}

async fn build_scenario(config: &ScenarioConfig, timings: PollTimings) -> Result<Scenario> {
    let client = super::kube_client(config.kubeconfig.as_deref(), config.kube_context.as_deref())
        .await?;
    let token = resolve_token(&client, &config.consul).await?;
    let reader = ConsulClient::new(config.client_config(token))?;

    Ok(Scenario::new(
        config.params(),
        Arc::new(KubeMutator::new(client)),
        Arc::new(reader),
        timings,
    ))
}

/// ACL token from the configured environment variable or Kubernetes secret
async fn resolve_token(client: &Client, consul: &ConsulConfig) -> Result<Option<String>> {
    if let Some(var) = &consul.token_env {
        return std::env::var(var)
            .map(Some)
            .map_err(|_| Error::validation(format!("environment variable {var} is not set")));
    }

    let Some(secret_ref) = &consul.token_secret else {
        return Ok(None);
    };

    let secrets: Api<Secret> = Api::namespaced(client.clone(), &secret_ref.namespace);
    let secret = secrets.get(&secret_ref.name).await?;
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(&secret_ref.key))
        .ok_or_else(|| {
            Error::command_failed(format!(
                "secret {}/{} has no key {}",
                secret_ref.namespace, secret_ref.name, secret_ref.key
            ))
        })?;

    let token = String::from_utf8(value.0.clone()).map_err(|e| {
        Error::command_failed(format!(
            "secret {}/{} key {} is not utf-8: {}",
            secret_ref.namespace, secret_ref.name, secret_ref.key, e
        ))
    })?;
    Ok(Some(token.trim().to_string()))
}
