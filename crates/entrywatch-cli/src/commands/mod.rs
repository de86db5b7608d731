//! CLI commands

use std::fmt::Display;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::{Error, Result};

pub mod get;
pub mod matrix;
pub mod resolve;
pub mod run;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Build a kube [`Client`] for a scenario.
///
/// With neither a kubeconfig path nor a context, kube's defaults apply
/// (`KUBECONFIG`, `~/.kube/config`, in-cluster).
pub async fn kube_client(kubeconfig: Option<&str>, context: Option<&str>) -> Result<Client> {
    if kubeconfig.is_none() && context.is_none() {
        return Client::try_default().await.cmd_err();
    }

    let kc = match kubeconfig {
        Some(path) => Kubeconfig::read_from(path).map_err(|e| {
            Error::command_failed(format!("failed to read kubeconfig {}: {}", path, e))
        })?,
        None => Kubeconfig::read()
            .map_err(|e| Error::command_failed(format!("failed to read kubeconfig: {}", e)))?,
    };
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let config = Config::from_custom_kubeconfig(kc, &options)
        .await
        .cmd_err()?;
    Client::try_from(config).cmd_err()
}
