//! `entrywatch get` - one-shot config entry lookup

use std::path::PathBuf;

use clap::Args;

use entrywatch_common::{BackingNamespace, RecordKind, GLOBAL_NAMESPACE};
use entrywatch_consul::{ConfigEntryReader, ConsulClient, ConsulClientConfig};

use crate::Result;

/// Fetch one config entry and print it as JSON
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Consul HTTP address
    #[arg(long, env = "CONSUL_HTTP_ADDR", default_value = "http://127.0.0.1:8500")]
    pub address: String,

    /// Consul namespace to query
    #[arg(long, default_value = GLOBAL_NAMESPACE)]
    pub namespace: String,

    /// Entry kind, e.g. service-defaults or ServiceDefaults
    #[arg(long)]
    pub kind: RecordKind,

    /// Entry name
    #[arg(long)]
    pub name: String,

    /// ACL token
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// PEM CA bundle for HTTPS
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Skip TLS certificate verification (for development)
    #[arg(long, default_value = "false")]
    pub insecure: bool,
}

/// Run the get command
pub async fn run(args: GetArgs) -> Result<()> {
    let mut config = ConsulClientConfig::new(args.address);
    config.token = args.token;
    config.ca_file = args.ca_file;
    config.insecure_skip_verify = args.insecure;
    let client = ConsulClient::new(config)?;

    let entry = client
        .get(&BackingNamespace::new(args.namespace), args.kind, &args.name)
        .await?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}
