//! Live-cluster run of the configured scenario matrix
//!
//! Needs `ENTRYWATCH_CONFIG` pointing at a config whose scenarios target
//! reachable clusters with the reconciler installed:
//!
//! ```bash
//! entrywatch matrix > matrix.yaml
//! ENTRYWATCH_CONFIG=matrix.yaml cargo test -p entrywatch-cli --features cluster-e2e
//! ```
#![cfg(feature = "cluster-e2e")]

use entrywatch_cli::commands::run::{run, RunArgs};
use entrywatch_cli::config::CONFIG_ENV;
use entrywatch_common::telemetry::{init_tracing, LogFormat};

#[tokio::test]
async fn configured_matrix_converges() {
    let _ = init_tracing(LogFormat::Pretty);
    let config = std::env::var(CONFIG_ENV)
        .unwrap_or_else(|_| panic!("{CONFIG_ENV} must point at a run configuration"));

    run(RunArgs {
        config: config.into(),
        only: Vec::new(),
    })
    .await
    .unwrap();
}
